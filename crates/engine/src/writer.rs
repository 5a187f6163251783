//! Writer collaborator: loads a document, draws onto pages, fills forms and saves
//!
//! All coordinates handed to a [`WriterDocument`] are PDF user space in points
//! with the origin at the bottom-left corner of the page.

use std::sync::Arc;

use crate::error::EngineResult;
use crate::geometry::PageSize;

/// RGB color with components in `0.0..=1.0`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RgbColor {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl RgbColor {
    pub const BLACK: RgbColor = RgbColor::new(0.0, 0.0, 0.0);
    pub const WHITE: RgbColor = RgbColor::new(1.0, 1.0, 1.0);

    pub const fn new(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    pub fn from_rgb8(r: u8, g: u8, b: u8) -> Self {
        Self::new(r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0)
    }
}

/// The standard 14 fonts minus Symbol and ZapfDingbats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StandardFont {
    Helvetica,
    HelveticaBold,
    HelveticaOblique,
    HelveticaBoldOblique,
    TimesRoman,
    TimesBold,
    TimesItalic,
    TimesBoldItalic,
    Courier,
    CourierBold,
    CourierOblique,
    CourierBoldOblique,
}

/// Generic font family used to pick a standard font
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FontClass {
    Serif,
    SansSerif,
    Monospace,
}

impl StandardFont {
    /// Pick the standard font of `class` matching the requested style
    ///
    /// # Example
    ///
    /// ```
    /// use folio_engine::{FontClass, StandardFont};
    ///
    /// let font = StandardFont::styled(FontClass::Serif, true, false);
    /// assert_eq!(font.base_font(), "Times-Bold");
    /// ```
    pub fn styled(class: FontClass, bold: bool, italic: bool) -> Self {
        use StandardFont::*;
        match (class, bold, italic) {
            (FontClass::SansSerif, false, false) => Helvetica,
            (FontClass::SansSerif, true, false) => HelveticaBold,
            (FontClass::SansSerif, false, true) => HelveticaOblique,
            (FontClass::SansSerif, true, true) => HelveticaBoldOblique,
            (FontClass::Serif, false, false) => TimesRoman,
            (FontClass::Serif, true, false) => TimesBold,
            (FontClass::Serif, false, true) => TimesItalic,
            (FontClass::Serif, true, true) => TimesBoldItalic,
            (FontClass::Monospace, false, false) => Courier,
            (FontClass::Monospace, true, false) => CourierBold,
            (FontClass::Monospace, false, true) => CourierOblique,
            (FontClass::Monospace, true, true) => CourierBoldOblique,
        }
    }

    /// PostScript name used as `/BaseFont`
    pub fn base_font(self) -> &'static str {
        match self {
            StandardFont::Helvetica => "Helvetica",
            StandardFont::HelveticaBold => "Helvetica-Bold",
            StandardFont::HelveticaOblique => "Helvetica-Oblique",
            StandardFont::HelveticaBoldOblique => "Helvetica-BoldOblique",
            StandardFont::TimesRoman => "Times-Roman",
            StandardFont::TimesBold => "Times-Bold",
            StandardFont::TimesItalic => "Times-Italic",
            StandardFont::TimesBoldItalic => "Times-BoldItalic",
            StandardFont::Courier => "Courier",
            StandardFont::CourierBold => "Courier-Bold",
            StandardFont::CourierOblique => "Courier-Oblique",
            StandardFont::CourierBoldOblique => "Courier-BoldOblique",
        }
    }
}

/// Font program handed to [`WriterDocument::embed_font`]
#[derive(Debug, Clone, PartialEq)]
pub enum FontData {
    Standard(StandardFont),

    /// Raw TrueType (`glyf`) font file
    TrueType(Arc<[u8]>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FontHandle(pub(crate) u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageHandle(pub(crate) u32);

impl FontHandle {
    /// Construct a handle for an alternative [`WriterDocument`] implementation
    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }
}

impl ImageHandle {
    /// Construct a handle for an alternative [`WriterDocument`] implementation
    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }
}

/// Rotation about a pivot, counter-clockwise in degrees (PDF convention)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pivot {
    pub x: f32,
    pub y: f32,
    pub degrees: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stroke {
    pub color: RgbColor,
    pub width: f32,
}

/// One line of text; `y` is the baseline
#[derive(Debug, Clone, PartialEq)]
pub struct TextOp {
    pub x: f32,
    pub y: f32,
    pub text: String,
    pub font: FontHandle,
    pub size: f32,
    pub color: RgbColor,
    pub opacity: f32,
    pub rotation: Option<Pivot>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RectOp {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub stroke: Option<Stroke>,
    pub fill: Option<RgbColor>,
    pub opacity: f32,
    pub rotation: Option<Pivot>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EllipseOp {
    pub cx: f32,
    pub cy: f32,
    pub rx: f32,
    pub ry: f32,
    pub stroke: Option<Stroke>,
    pub fill: Option<RgbColor>,
    pub opacity: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LineOp {
    pub start: (f32, f32),
    pub end: (f32, f32),
    pub stroke: Stroke,
    pub opacity: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PolylineOp {
    pub points: Vec<(f32, f32)>,
    pub stroke: Stroke,
    pub opacity: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageOp {
    pub image: ImageHandle,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub opacity: f32,
    pub rotation: Option<Pivot>,
}

/// Value of a form field created or filled by the writer
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text { value: String, multiline: bool },
    Checkbox(bool),
    Choice {
        options: Vec<String>,
        selected: Option<String>,
    },
}

/// A new form field; `rect` is `[x0, y0, x1, y1]` in PDF user space
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub name: String,
    pub page: u32,
    pub rect: [f32; 4],
    pub value: FieldValue,
    pub font_size: f32,
}

/// Loads documents for writing
pub trait Writer {
    type Document: WriterDocument;

    fn load(&self, bytes: &[u8]) -> EngineResult<Self::Document>;
}

/// A document open for modification. Page numbers are 1-based.
pub trait WriterDocument {
    fn page_count(&self) -> u32;
    fn page_size(&self, page: u32) -> EngineResult<PageSize>;

    fn embed_font(&mut self, font: &FontData) -> EngineResult<FontHandle>;

    /// Embed an encoded PNG or JPEG image
    fn embed_image(&mut self, bytes: &[u8]) -> EngineResult<ImageHandle>;

    fn draw_text(&mut self, page: u32, op: &TextOp) -> EngineResult<()>;
    fn draw_rectangle(&mut self, page: u32, op: &RectOp) -> EngineResult<()>;
    fn draw_ellipse(&mut self, page: u32, op: &EllipseOp) -> EngineResult<()>;
    fn draw_line(&mut self, page: u32, op: &LineOp) -> EngineResult<()>;
    fn draw_polyline(&mut self, page: u32, op: &PolylineOp) -> EngineResult<()>;
    fn draw_image(&mut self, page: u32, op: &ImageOp) -> EngineResult<()>;

    /// Set the page's `/Rotate` entry (a multiple of 90)
    fn set_rotation(&mut self, page: u32, degrees: u16) -> EngineResult<()>;

    fn field_names(&self) -> Vec<String>;
    fn set_text_field(&mut self, name: &str, value: &str) -> EngineResult<()>;
    fn set_checkbox(&mut self, name: &str, checked: bool) -> EngineResult<()>;
    fn set_choice(&mut self, name: &str, value: &str) -> EngineResult<()>;
    fn create_field(&mut self, spec: &FieldSpec) -> EngineResult<()>;

    /// Burn widget appearances into page content and drop the interactive form
    fn flatten_form(&mut self) -> EngineResult<()>;

    fn save(self) -> EngineResult<Vec<u8>>
    where
        Self: Sized;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_styled_fonts() {
        assert_eq!(
            StandardFont::styled(FontClass::SansSerif, false, false),
            StandardFont::Helvetica
        );
        assert_eq!(
            StandardFont::styled(FontClass::Monospace, true, true).base_font(),
            "Courier-BoldOblique"
        );
        assert_eq!(
            StandardFont::styled(FontClass::Serif, false, true).base_font(),
            "Times-Italic"
        );
    }

    #[test]
    fn test_rgb8_conversion() {
        let color = RgbColor::from_rgb8(255, 0, 51);
        assert_eq!(color, RgbColor::new(1.0, 0.0, 0.2));
    }
}
