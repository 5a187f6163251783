//! Editable elements placed on top of document pages
//!
//! Six element types live in six independent layers. Every element carries a
//! session-unique id, a 1-based page number and document-space geometry.

use std::fmt;
use std::sync::Arc;

use folio_engine::RgbColor;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;
use crate::ink;
use crate::transform::{DocPoint, DocRect};

/// Unique identifier for an element
pub type ElementId = Uuid;

/// RGBA color representation
///
/// Serialized as `#rrggbb` or `#rrggbbaa`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Create an opaque color
    pub fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    /// Parse `#rgb`, `#rrggbb` or `#rrggbbaa`
    pub fn from_hex(input: &str) -> Result<Self, ValidationError> {
        let invalid = || ValidationError::Color(input.to_string());
        let hex = input.trim().strip_prefix('#').ok_or_else(invalid)?;
        if !hex.is_ascii() {
            return Err(invalid());
        }
        let byte = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| invalid());

        match hex.len() {
            3 => {
                let nibble = |i: usize| {
                    u8::from_str_radix(&hex[i..i + 1], 16)
                        .map(|v| v * 17)
                        .map_err(|_| invalid())
                };
                Ok(Self::rgb(nibble(0)?, nibble(1)?, nibble(2)?))
            }
            6 => Ok(Self::rgb(byte(0)?, byte(2)?, byte(4)?)),
            8 => Ok(Self::new(byte(0)?, byte(2)?, byte(4)?, byte(6)?)),
            _ => Err(invalid()),
        }
    }

    pub fn to_hex(&self) -> String {
        if self.a == 255 {
            format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
        } else {
            format!("#{:02x}{:02x}{:02x}{:02x}", self.r, self.g, self.b, self.a)
        }
    }

    /// Convert to normalized RGBA values (0.0 to 1.0)
    pub fn to_normalized(&self) -> (f32, f32, f32, f32) {
        (
            self.r as f32 / 255.0,
            self.g as f32 / 255.0,
            self.b as f32 / 255.0,
            self.a as f32 / 255.0,
        )
    }

    /// Color for the writer; alpha is carried separately as opacity
    pub fn to_rgb(&self) -> RgbColor {
        RgbColor::from_rgb8(self.r, self.g, self.b)
    }

    pub fn alpha(&self) -> f32 {
        self.a as f32 / 255.0
    }
}

/// Common element colors
impl Color {
    pub const RED: Color = Color { r: 255, g: 0, b: 0, a: 255 };
    pub const BLUE: Color = Color { r: 0, g: 0, b: 255, a: 255 };
    pub const YELLOW: Color = Color { r: 255, g: 235, b: 59, a: 255 };
    pub const BLACK: Color = Color { r: 0, g: 0, b: 0, a: 255 };
    pub const WHITE: Color = Color { r: 255, g: 255, b: 255, a: 255 };
}

impl TryFrom<String> for Color {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Color::from_hex(&value)
    }
}

impl From<Color> for String {
    fn from(color: Color) -> Self {
        color.to_hex()
    }
}

/// The six element layers, in back-to-front paint order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LayerKind {
    Redaction,
    Shape,
    Ink,
    Text,
    Image,
    FormField,
}

impl LayerKind {
    /// Back-to-front paint order
    pub const Z_ORDER: [LayerKind; 6] = [
        LayerKind::Redaction,
        LayerKind::Shape,
        LayerKind::Ink,
        LayerKind::Text,
        LayerKind::Image,
        LayerKind::FormField,
    ];

    pub fn name(self) -> &'static str {
        match self {
            LayerKind::Redaction => "redaction",
            LayerKind::Shape => "shape",
            LayerKind::Ink => "ink",
            LayerKind::Text => "text",
            LayerKind::Image => "image",
            LayerKind::FormField => "form-field",
        }
    }
}

impl fmt::Display for LayerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Behaviour shared by every element type stored in a [`Layer`](crate::layers::Layer)
pub trait LayerElement: Clone {
    const KIND: LayerKind;

    /// Partial update accepted by [`LayerElement::apply`]
    type Patch;

    fn id(&self) -> ElementId;
    fn page(&self) -> u32;
    fn bounds(&self) -> DocRect;
    fn translate(&mut self, dx: f32, dy: f32);
    fn apply(&mut self, patch: &Self::Patch);

    /// Point hit-test; bounding-box containment unless overridden
    fn hit(&self, point: DocPoint, tolerance: f32) -> bool {
        self.bounds().contains(point, tolerance)
    }

    /// Distance from `point` to the element's defining point, used by the
    /// eraser; the top-left corner unless overridden
    fn distance_to(&self, point: DocPoint) -> f32 {
        point.distance_to(&self.bounds().top_left())
    }

    /// Whether the element is large enough to commit, given the layer minimum
    fn meets_minimum(&self, _minimum: f32) -> bool {
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextAlign {
    #[default]
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextStyle {
    pub font_family: String,
    pub font_size: f32,
    pub color: Color,
    pub bold: bool,
    pub italic: bool,
    pub align: TextAlign,
}

impl Default for TextStyle {
    fn default() -> Self {
        Self {
            font_family: "Helvetica".to_string(),
            font_size: 14.0,
            color: Color::BLACK,
            bold: false,
            italic: false,
            align: TextAlign::Left,
        }
    }
}

/// Free text box
#[derive(Debug, Clone, PartialEq)]
pub struct TextBox {
    pub id: ElementId,
    pub page: u32,
    pub rect: DocRect,
    pub text: String,
    pub style: TextStyle,

    /// Clockwise rotation in degrees about the box centre
    pub rotation: f32,
    pub opacity: f32,
}

impl TextBox {
    pub fn new(page: u32, rect: DocRect, text: impl Into<String>, style: TextStyle) -> Self {
        Self {
            id: Uuid::new_v4(),
            page,
            rect,
            text: text.into(),
            style,
            rotation: 0.0,
            opacity: 1.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextBoxPatch {
    pub rect: Option<DocRect>,
    pub text: Option<String>,
    pub style: Option<TextStyle>,
    pub rotation: Option<f32>,
    pub opacity: Option<f32>,
}

impl LayerElement for TextBox {
    const KIND: LayerKind = LayerKind::Text;
    type Patch = TextBoxPatch;

    fn id(&self) -> ElementId {
        self.id
    }

    fn page(&self) -> u32 {
        self.page
    }

    fn bounds(&self) -> DocRect {
        self.rect
    }

    fn translate(&mut self, dx: f32, dy: f32) {
        self.rect = self.rect.translate(dx, dy);
    }

    fn apply(&mut self, patch: &TextBoxPatch) {
        if let Some(rect) = patch.rect {
            self.rect = rect.normalized();
        }
        if let Some(text) = &patch.text {
            self.text = text.clone();
        }
        if let Some(style) = &patch.style {
            self.style = style.clone();
        }
        if let Some(rotation) = patch.rotation {
            self.rotation = rotation;
        }
        if let Some(opacity) = patch.opacity {
            self.opacity = opacity.clamp(0.0, 1.0);
        }
    }
}

/// Geometry of a vector annotation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ShapeGeometry {
    Rectangle { rect: DocRect },
    Ellipse { rect: DocRect },
    Highlight { rect: DocRect },
    Line { start: DocPoint, end: DocPoint },
}

impl ShapeGeometry {
    pub fn bounds(&self) -> DocRect {
        match self {
            ShapeGeometry::Rectangle { rect }
            | ShapeGeometry::Ellipse { rect }
            | ShapeGeometry::Highlight { rect } => *rect,
            ShapeGeometry::Line { start, end } => DocRect::from_corners(*start, *end),
        }
    }

    fn translate(&self, dx: f32, dy: f32) -> Self {
        match *self {
            ShapeGeometry::Rectangle { rect } => ShapeGeometry::Rectangle {
                rect: rect.translate(dx, dy),
            },
            ShapeGeometry::Ellipse { rect } => ShapeGeometry::Ellipse {
                rect: rect.translate(dx, dy),
            },
            ShapeGeometry::Highlight { rect } => ShapeGeometry::Highlight {
                rect: rect.translate(dx, dy),
            },
            ShapeGeometry::Line { start, end } => ShapeGeometry::Line {
                start: start.offset(dx, dy),
                end: end.offset(dx, dy),
            },
        }
    }

    /// The same kind of geometry fitted to a new rectangle
    pub fn with_rect(&self, rect: DocRect) -> Self {
        match self {
            ShapeGeometry::Rectangle { .. } => ShapeGeometry::Rectangle { rect },
            ShapeGeometry::Ellipse { .. } => ShapeGeometry::Ellipse { rect },
            ShapeGeometry::Highlight { .. } => ShapeGeometry::Highlight { rect },
            ShapeGeometry::Line { .. } => ShapeGeometry::Line {
                start: rect.top_left(),
                end: rect.bottom_right(),
            },
        }
    }
}

/// Rectangle, ellipse, highlight or line annotation
#[derive(Debug, Clone, PartialEq)]
pub struct ShapeAnnotation {
    pub id: ElementId,
    pub page: u32,
    pub geometry: ShapeGeometry,
    pub stroke: Color,
    pub fill: Option<Color>,
    pub stroke_width: f32,
    pub opacity: f32,
}

impl ShapeAnnotation {
    pub fn new(page: u32, geometry: ShapeGeometry, stroke: Color, stroke_width: f32) -> Self {
        Self {
            id: Uuid::new_v4(),
            page,
            geometry,
            stroke,
            fill: None,
            stroke_width,
            opacity: 1.0,
        }
    }

    /// Translucent filled highlight
    pub fn highlight(page: u32, rect: DocRect, color: Color) -> Self {
        Self {
            fill: Some(color),
            opacity: 0.35,
            ..Self::new(page, ShapeGeometry::Highlight { rect }, color, 0.0)
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShapePatch {
    pub geometry: Option<ShapeGeometry>,
    pub stroke: Option<Color>,
    pub fill: Option<Option<Color>>,
    pub stroke_width: Option<f32>,
    pub opacity: Option<f32>,
}

impl LayerElement for ShapeAnnotation {
    const KIND: LayerKind = LayerKind::Shape;
    type Patch = ShapePatch;

    fn id(&self) -> ElementId {
        self.id
    }

    fn page(&self) -> u32 {
        self.page
    }

    fn bounds(&self) -> DocRect {
        self.geometry.bounds()
    }

    fn translate(&mut self, dx: f32, dy: f32) {
        self.geometry = self.geometry.translate(dx, dy);
    }

    fn apply(&mut self, patch: &ShapePatch) {
        if let Some(geometry) = patch.geometry {
            self.geometry = geometry;
        }
        if let Some(stroke) = patch.stroke {
            self.stroke = stroke;
        }
        if let Some(fill) = patch.fill {
            self.fill = fill;
        }
        if let Some(width) = patch.stroke_width {
            self.stroke_width = width.max(0.0);
        }
        if let Some(opacity) = patch.opacity {
            self.opacity = opacity.clamp(0.0, 1.0);
        }
    }

    fn hit(&self, point: DocPoint, tolerance: f32) -> bool {
        match self.geometry {
            ShapeGeometry::Line { start, end } => {
                ink::distance_to_segment(point, start, end) <= self.stroke_width / 2.0 + tolerance
            }
            _ => self.bounds().contains(point, tolerance),
        }
    }

    /// Lines are defined by their nearer endpoint
    fn distance_to(&self, point: DocPoint) -> f32 {
        match self.geometry {
            ShapeGeometry::Line { start, end } => {
                point.distance_to(&start).min(point.distance_to(&end))
            }
            _ => point.distance_to(&self.bounds().top_left()),
        }
    }
}

/// Freehand stroke
#[derive(Debug, Clone, PartialEq)]
pub struct InkStroke {
    pub id: ElementId,
    pub page: u32,
    pub points: Vec<DocPoint>,
    pub color: Color,
    pub width: f32,
    pub opacity: f32,
}

impl InkStroke {
    pub fn new(page: u32, points: Vec<DocPoint>, color: Color, width: f32) -> Self {
        Self {
            id: Uuid::new_v4(),
            page,
            points,
            color,
            width,
            opacity: 1.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InkPatch {
    pub points: Option<Vec<DocPoint>>,
    pub color: Option<Color>,
    pub width: Option<f32>,
    pub opacity: Option<f32>,
}

impl LayerElement for InkStroke {
    const KIND: LayerKind = LayerKind::Ink;
    type Patch = InkPatch;

    fn id(&self) -> ElementId {
        self.id
    }

    fn page(&self) -> u32 {
        self.page
    }

    fn bounds(&self) -> DocRect {
        ink::bounds(&self.points).unwrap_or_default()
    }

    fn translate(&mut self, dx: f32, dy: f32) {
        for point in &mut self.points {
            *point = point.offset(dx, dy);
        }
    }

    fn apply(&mut self, patch: &InkPatch) {
        if let Some(points) = &patch.points {
            self.points = points.clone();
        }
        if let Some(color) = patch.color {
            self.color = color;
        }
        if let Some(width) = patch.width {
            self.width = width.max(0.0);
        }
        if let Some(opacity) = patch.opacity {
            self.opacity = opacity.clamp(0.0, 1.0);
        }
    }

    fn hit(&self, point: DocPoint, tolerance: f32) -> bool {
        ink::distance_to_polyline(point, &self.points) <= self.width / 2.0 + tolerance
    }

    /// Nearest recorded vertex
    fn distance_to(&self, point: DocPoint) -> f32 {
        self.points
            .iter()
            .map(|vertex| point.distance_to(vertex))
            .fold(f32::INFINITY, f32::min)
    }

    fn meets_minimum(&self, minimum: f32) -> bool {
        self.points.len() >= 2 && self.bounds().max_side() > minimum
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageKind {
    #[default]
    Picture,
    Signature,
}

/// Placed raster image or signature
#[derive(Debug, Clone, PartialEq)]
pub struct ImageElement {
    pub id: ElementId,
    pub page: u32,
    pub rect: DocRect,

    /// Encoded PNG or JPEG bytes, shared between snapshots
    pub data: Arc<[u8]>,
    pub kind: ImageKind,

    /// Clockwise rotation in degrees about the image centre
    pub rotation: f32,
    pub opacity: f32,
}

impl ImageElement {
    pub fn new(page: u32, rect: DocRect, data: Arc<[u8]>, kind: ImageKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            page,
            rect,
            data,
            kind,
            rotation: 0.0,
            opacity: 1.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImagePatch {
    pub rect: Option<DocRect>,
    pub rotation: Option<f32>,
    pub opacity: Option<f32>,
}

impl LayerElement for ImageElement {
    const KIND: LayerKind = LayerKind::Image;
    type Patch = ImagePatch;

    fn id(&self) -> ElementId {
        self.id
    }

    fn page(&self) -> u32 {
        self.page
    }

    fn bounds(&self) -> DocRect {
        self.rect
    }

    fn translate(&mut self, dx: f32, dy: f32) {
        self.rect = self.rect.translate(dx, dy);
    }

    fn apply(&mut self, patch: &ImagePatch) {
        if let Some(rect) = patch.rect {
            self.rect = rect.normalized();
        }
        if let Some(rotation) = patch.rotation {
            self.rotation = rotation;
        }
        if let Some(opacity) = patch.opacity {
            self.opacity = opacity.clamp(0.0, 1.0);
        }
    }
}

/// Opaque block hiding page content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedactionBlock {
    pub id: ElementId,
    pub page: u32,
    pub rect: DocRect,
    pub fill: Color,
}

impl RedactionBlock {
    pub fn new(page: u32, rect: DocRect) -> Self {
        Self {
            id: Uuid::new_v4(),
            page,
            rect,
            fill: Color::BLACK,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RedactionPatch {
    pub rect: Option<DocRect>,
    pub fill: Option<Color>,
}

impl LayerElement for RedactionBlock {
    const KIND: LayerKind = LayerKind::Redaction;
    type Patch = RedactionPatch;

    fn id(&self) -> ElementId {
        self.id
    }

    fn page(&self) -> u32 {
        self.page
    }

    fn bounds(&self) -> DocRect {
        self.rect
    }

    fn translate(&mut self, dx: f32, dy: f32) {
        self.rect = self.rect.translate(dx, dy);
    }

    fn apply(&mut self, patch: &RedactionPatch) {
        if let Some(rect) = patch.rect {
            self.rect = rect.normalized();
        }
        if let Some(fill) = patch.fill {
            self.fill = fill;
        }
    }

    fn meets_minimum(&self, minimum: f32) -> bool {
        self.rect.width > minimum && self.rect.height > minimum
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FormFieldKind {
    Text {
        #[serde(default)]
        value: String,
        #[serde(default)]
        multiline: bool,
    },
    Checkbox {
        #[serde(default)]
        checked: bool,
    },
    Choice {
        options: Vec<String>,
        #[serde(default)]
        selected: Option<String>,
    },
}

/// Where a form field came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldOrigin {
    /// Seeded from a widget already in the document
    Detected,

    /// Drawn by the user; written as a new field on export
    Created,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FormField {
    pub id: ElementId,
    pub page: u32,
    pub rect: DocRect,
    pub name: String,
    pub kind: FormFieldKind,
    pub font_size: f32,
    pub origin: FieldOrigin,
}

impl FormField {
    pub fn new(page: u32, rect: DocRect, name: impl Into<String>, kind: FormFieldKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            page,
            rect,
            name: name.into(),
            kind,
            font_size: 12.0,
            origin: FieldOrigin::Created,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormFieldPatch {
    pub rect: Option<DocRect>,
    pub name: Option<String>,
    pub kind: Option<FormFieldKind>,
    pub font_size: Option<f32>,
}

impl LayerElement for FormField {
    const KIND: LayerKind = LayerKind::FormField;
    type Patch = FormFieldPatch;

    fn id(&self) -> ElementId {
        self.id
    }

    fn page(&self) -> u32 {
        self.page
    }

    fn bounds(&self) -> DocRect {
        self.rect
    }

    fn translate(&mut self, dx: f32, dy: f32) {
        self.rect = self.rect.translate(dx, dy);
    }

    fn apply(&mut self, patch: &FormFieldPatch) {
        if let Some(rect) = patch.rect {
            self.rect = rect.normalized();
        }
        if let Some(name) = &patch.name {
            self.name = name.clone();
        }
        if let Some(kind) = &patch.kind {
            self.kind = kind.clone();
        }
        if let Some(size) = patch.font_size {
            self.font_size = size;
        }
    }
}

/// Any element, tagged with its layer
#[derive(Debug, Clone, PartialEq)]
pub enum Element {
    Text(TextBox),
    Shape(ShapeAnnotation),
    Ink(InkStroke),
    Image(ImageElement),
    Redaction(RedactionBlock),
    FormField(FormField),
}

macro_rules! element_from {
    ($($variant:ident($ty:ty)),* $(,)?) => {
        $(impl From<$ty> for Element {
            fn from(element: $ty) -> Self {
                Element::$variant(element)
            }
        })*
    };
}

element_from!(
    Text(TextBox),
    Shape(ShapeAnnotation),
    Ink(InkStroke),
    Image(ImageElement),
    Redaction(RedactionBlock),
    FormField(FormField),
);

macro_rules! each_element {
    ($value:expr, $inner:ident => $body:expr) => {
        match $value {
            Element::Text($inner) => $body,
            Element::Shape($inner) => $body,
            Element::Ink($inner) => $body,
            Element::Image($inner) => $body,
            Element::Redaction($inner) => $body,
            Element::FormField($inner) => $body,
        }
    };
}

impl Element {
    pub fn id(&self) -> ElementId {
        each_element!(self, e => e.id())
    }

    pub fn page(&self) -> u32 {
        each_element!(self, e => e.page())
    }

    pub fn bounds(&self) -> DocRect {
        each_element!(self, e => e.bounds())
    }

    pub fn kind(&self) -> LayerKind {
        match self {
            Element::Text(_) => LayerKind::Text,
            Element::Shape(_) => LayerKind::Shape,
            Element::Ink(_) => LayerKind::Ink,
            Element::Image(_) => LayerKind::Image,
            Element::Redaction(_) => LayerKind::Redaction,
            Element::FormField(_) => LayerKind::FormField,
        }
    }

    pub fn translate(&mut self, dx: f32, dy: f32) {
        each_element!(self, e => e.translate(dx, dy))
    }

    /// Copy with a fresh id, moved to `page` and offset by `(dx, dy)`
    pub fn duplicate(&self, page: u32, dx: f32, dy: f32) -> Element {
        let mut copy = self.clone();
        each_element!(&mut copy, e => {
            e.id = Uuid::new_v4();
            e.page = page;
        });
        copy.translate(dx, dy);
        copy
    }
}

/// Partial update for any element type
#[derive(Debug, Clone, PartialEq)]
pub enum ElementPatch {
    Text(TextBoxPatch),
    Shape(ShapePatch),
    Ink(InkPatch),
    Image(ImagePatch),
    Redaction(RedactionPatch),
    FormField(FormFieldPatch),
}

impl ElementPatch {
    pub fn kind(&self) -> LayerKind {
        match self {
            ElementPatch::Text(_) => LayerKind::Text,
            ElementPatch::Shape(_) => LayerKind::Shape,
            ElementPatch::Ink(_) => LayerKind::Ink,
            ElementPatch::Image(_) => LayerKind::Image,
            ElementPatch::Redaction(_) => LayerKind::Redaction,
            ElementPatch::FormField(_) => LayerKind::FormField,
        }
    }
}
