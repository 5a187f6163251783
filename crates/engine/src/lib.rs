//! Folio Engine Library
//!
//! Collaborators that read and write PDF files:
//! - [`Renderer`]: page sizes, rasters, text runs and form widgets
//! - [`Writer`] / [`WriterDocument`]: drawing, fonts, images, forms and saving
//! - [`merge_documents`] / [`extract_pages`]: whole-document page operations
//!
//! The default backends use `lopdf`. With the `pdfium` feature,
//! `PdfiumRenderer` produces real page pixels.

mod error;
mod form;
mod geometry;
mod lopdf_writer;
mod objects;
mod pages;
mod renderer;
mod truetype;
mod writer;

#[cfg(any(test, feature = "test-support"))]
pub mod fixtures;

#[cfg(feature = "pdfium")]
pub mod pdfium;

pub use error::{EngineError, EngineResult};
pub use geometry::{PageSize, PageViewport, Rotation};
pub use lopdf_writer::{LopdfDocument, LopdfWriter};
pub use pages::{extract_pages, merge_documents};
pub use renderer::{
    DocumentHandle, LopdfRenderer, Renderer, RgbaImage, TextItem, WidgetAnnotation, WidgetKind,
};
pub use writer::{
    EllipseOp, FieldSpec, FieldValue, FontClass, FontData, FontHandle, ImageHandle, ImageOp,
    LineOp, Pivot, PolylineOp, RectOp, RgbColor, StandardFont, Stroke, TextOp, Writer,
    WriterDocument,
};

/// Renderer used when no other backend is configured
pub fn default_renderer() -> LopdfRenderer {
    LopdfRenderer::new()
}
