//! Folio editor core
//!
//! Editing model for PDF documents: element layers with undo history,
//! pointer tools and keyboard shortcuts, page compositing and export back to
//! PDF through a [`folio_engine::Writer`].

pub mod compose;
pub mod config;
pub mod element;
pub mod error;
pub mod export;
pub mod fonts;
pub mod handles;
pub mod history;
pub mod ink;
pub mod layers;
pub mod ocr;
pub mod ranges;
pub mod redaction_store;
pub mod selection;
pub mod session;
pub mod tools;
pub mod transform;

pub use compose::{
    Compositor, Preview, Primitive, RasterSurface, RecordingSurface, RenderRequest, Surface,
    SurfaceHandle, SurfaceState,
};
pub use config::{ConfigError, EditorConfig};
pub use element::{
    Color, Element, ElementId, ElementPatch, FieldOrigin, FormField, FormFieldKind,
    ImageElement, ImageKind, InkStroke, LayerKind, RedactionBlock, ShapeAnnotation,
    ShapeGeometry, TextAlign, TextBox, TextStyle,
};
pub use error::{EditorError, EditorResult, ValidationError};
pub use export::{export, ExportFailure, ExportReport};
pub use fonts::{FontFetcher, FontService};
pub use history::History;
pub use layers::ElementLayers;
pub use ocr::{OcrBlock, OcrEngine, OcrError, OcrJob};
pub use ranges::{expand, parse_page_ranges, PageRange};
pub use redaction_store::{FileKeyValueStore, MemoryKeyValueStore, RedactionStore};
pub use selection::Selection;
pub use session::{PointerOutcome, Session};
pub use tools::{Command, Cursor, Key, KeyInput, ToolKind, ToolSettings};
pub use transform::{DocPoint, DocRect, PointerPoint, Viewport};
