//! Editor error types

use folio_engine::EngineError;
use thiserror::Error;

use crate::element::ElementId;
use crate::ocr::OcrError;
use crate::redaction_store::StoreError;

/// Rejected input; the session state is left unchanged
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("page {page} is outside 1..={page_count}")]
    PageOutOfRange { page: u32, page_count: u32 },

    #[error("invalid page range {input:?}: {reason}")]
    InvalidRange { input: String, reason: String },

    #[error("invalid color {0:?}")]
    Color(String),

    #[error("rotation must be a multiple of 90 degrees, got {0}")]
    Rotation(i32),

    #[error("unknown element {0}")]
    UnknownElement(ElementId),

    #[error("patch does not match element {0}")]
    PatchMismatch(ElementId),

    #[error("unsupported image data: {0}")]
    Image(String),

    #[error("element is too small to keep")]
    BelowMinimumSize,
}

/// Errors surfaced by the editing session
#[derive(Debug, Error)]
pub enum EditorError {
    #[error("failed to load document: {0}")]
    Load(#[source] EngineError),

    #[error("failed to render page {page}: {source}")]
    Render {
        page: u32,
        #[source]
        source: EngineError,
    },

    /// A render finished after it was superseded; its result was dropped
    #[error("render cancelled")]
    RenderCancelled,

    #[error("failed to export element {id}: {source}")]
    ExportElement {
        id: ElementId,
        #[source]
        source: EngineError,
    },

    #[error("export failed: {0}")]
    ExportFatal(#[source] EngineError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Storage(#[from] StoreError),

    #[error(transparent)]
    Ocr(#[from] OcrError),
}

pub type EditorResult<T> = Result<T, EditorError>;
