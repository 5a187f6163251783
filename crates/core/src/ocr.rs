//! OCR promotion
//!
//! Recognition itself is pluggable through [`OcrEngine`]. The session starts
//! an [`OcrJob`] bound to the current page and viewport; the recognizer runs
//! against a rendered raster and reports blocks in render space. When the job
//! is still current, the blocks are converted to document space and promoted
//! to text boxes in a single history entry.

use folio_engine::RgbaImage;
use folio_scheduler::{CancellationToken, TaskTicket};
use thiserror::Error;

use crate::element::{TextBox, TextStyle};
use crate::transform::{DocRect, RenderRect, Viewport};

/// Font size relative to the recognized line height
const LINE_HEIGHT_TO_FONT: f32 = 0.8;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum OcrError {
    #[error("recognition cancelled")]
    Cancelled,

    #[error("recognition failed: {0}")]
    Engine(String),

    /// The session moved to another page or tool before the result arrived
    #[error("recognition result is stale")]
    Stale,
}

/// One recognized run of text, in render-space pixels
#[derive(Debug, Clone, PartialEq)]
pub struct OcrBlock {
    pub text: String,
    pub rect: RenderRect,

    /// 0.0 to 1.0
    pub confidence: f32,
}

impl OcrBlock {
    pub fn new(text: impl Into<String>, rect: RenderRect, confidence: f32) -> Self {
        Self {
            text: text.into(),
            rect,
            confidence,
        }
    }
}

/// Text recognizer
pub trait OcrEngine {
    /// Recognize text in `image`
    ///
    /// Implementations call `progress` with values in `0.0..=1.0` and should
    /// return [`OcrError::Cancelled`] promptly once `token` is cancelled.
    fn recognize(
        &mut self,
        image: &RgbaImage,
        progress: &mut dyn FnMut(f32),
        token: &CancellationToken,
    ) -> Result<Vec<OcrBlock>, OcrError>;
}

/// A recognition request bound to the page and viewport it was started on
#[derive(Debug, Clone)]
pub struct OcrJob {
    pub(crate) ticket: TaskTicket,
    pub token: CancellationToken,
    pub page: u32,
    pub viewport: Viewport,

    /// Restrict promotion to blocks overlapping this document-space region
    pub region: Option<DocRect>,
}

impl OcrJob {
    pub fn ticket(&self) -> TaskTicket {
        self.ticket
    }

    /// Run `engine` over `image`, forwarding progress
    pub fn run(
        &self,
        engine: &mut dyn OcrEngine,
        image: &RgbaImage,
        progress: &mut dyn FnMut(f32),
    ) -> Result<Vec<OcrBlock>, OcrError> {
        if self.token.is_cancelled() {
            return Err(OcrError::Cancelled);
        }
        let blocks = engine.recognize(image, progress, &self.token)?;
        if self.token.is_cancelled() {
            return Err(OcrError::Cancelled);
        }
        tracing::debug!(page = self.page, blocks = blocks.len(), "recognition finished");
        Ok(blocks)
    }
}

/// Convert recognized blocks into text boxes on `page`
///
/// Blank text, blocks under `min_confidence` and blocks outside `region`
/// are dropped.
pub fn blocks_to_text_boxes(
    blocks: &[OcrBlock],
    page: u32,
    viewport: &Viewport,
    region: Option<&DocRect>,
    min_confidence: f32,
    base_style: &TextStyle,
) -> Vec<TextBox> {
    blocks
        .iter()
        .filter(|block| block.confidence >= min_confidence && !block.text.trim().is_empty())
        .filter_map(|block| {
            let rect = viewport.to_document_rect(&block.rect);
            if region.is_some_and(|region| !region.intersects(&rect)) {
                return None;
            }
            let style = TextStyle {
                font_size: (rect.height * LINE_HEIGHT_TO_FONT).max(1.0),
                ..base_style.clone()
            };
            Some(TextBox::new(page, rect, block.text.trim(), style))
        })
        .collect()
}
