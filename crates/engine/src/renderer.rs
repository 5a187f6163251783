//! Renderer collaborator: page metadata, rasters, text and widgets

use std::collections::HashMap;

use folio_scheduler::CancellationToken;
use image::{ImageBuffer, Rgba};
use lopdf::content::Content;
use lopdf::{Document, Object, ObjectId};

use crate::error::{EngineError, EngineResult};
use crate::geometry::{PageSize, PageViewport, Rotation};
use crate::objects::{self, decode_text, inherited, object_text, obj_to_f32, rect_from};

pub type RgbaImage = ImageBuffer<Rgba<u8>, Vec<u8>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DocumentHandle(u64);

impl DocumentHandle {
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// A run of text shown on a page
///
/// Coordinates are PDF user space: `y` is the baseline measured from the
/// bottom edge.
#[derive(Debug, Clone, PartialEq)]
pub struct TextItem {
    pub text: String,
    pub x: f32,
    pub y: f32,
    pub font_size: f32,

    /// Approximate advance width (half an em per character)
    pub width: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WidgetKind {
    Text { multiline: bool },
    Checkbox,
    Choice { options: Vec<String> },
    Signature,
    Button,
}

/// An interactive form widget found on a page
#[derive(Debug, Clone, PartialEq)]
pub struct WidgetAnnotation {
    /// Fully qualified field name (`parent.child`)
    pub name: String,
    pub kind: WidgetKind,

    /// `[x0, y0, x1, y1]` in PDF user space (bottom-left origin)
    pub rect: [f32; 4],
    pub value: Option<String>,
    pub checked: bool,
    pub font_size: f32,
}

/// Turns documents into page metadata and pixels
///
/// Page numbers are 1-based.
pub trait Renderer {
    fn load_document(&mut self, bytes: &[u8]) -> EngineResult<DocumentHandle>;
    fn page_count(&self, handle: DocumentHandle) -> EngineResult<u32>;
    fn page_size(&self, handle: DocumentHandle, page: u32) -> EngineResult<PageSize>;

    fn viewport(
        &self,
        handle: DocumentHandle,
        page: u32,
        scale: f32,
        rotation: Rotation,
    ) -> EngineResult<PageViewport> {
        Ok(PageViewport::new(self.page_size(handle, page)?, scale, rotation))
    }

    /// Render a page; returns [`EngineError::Cancelled`] once `token` fires
    fn render_page(
        &self,
        handle: DocumentHandle,
        page: u32,
        viewport: &PageViewport,
        token: &CancellationToken,
    ) -> EngineResult<RgbaImage>;

    fn text_content(&self, handle: DocumentHandle, page: u32) -> EngineResult<Vec<TextItem>>;
    fn annotations(&self, handle: DocumentHandle, page: u32)
        -> EngineResult<Vec<WidgetAnnotation>>;
    fn close(&mut self, handle: DocumentHandle) -> EngineResult<()>;
}

#[derive(Debug)]
struct DocumentRecord {
    document: Document,
    page_ids: Vec<ObjectId>,
    page_sizes: Vec<PageSize>,
}

/// Pure-Rust renderer backed by lopdf
///
/// Page metadata, text and widgets are read from the document. Rasters are
/// placeholders: a white page with a border and grey bars where text runs sit,
/// which is enough for layout previews and tests. Enable the `pdfium` feature
/// for real page pixels.
#[derive(Debug, Default)]
pub struct LopdfRenderer {
    next_handle: u64,
    docs: HashMap<DocumentHandle, DocumentRecord>,
}

const BORDER: Rgba<u8> = Rgba([220, 220, 220, 255]);
const TEXT_BAR: Rgba<u8> = Rgba([200, 200, 200, 255]);

impl LopdfRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, handle: DocumentHandle) -> EngineResult<&DocumentRecord> {
        self.docs
            .get(&handle)
            .ok_or(EngineError::InvalidHandle(handle.raw()))
    }

    fn page_id(&self, handle: DocumentHandle, page: u32) -> EngineResult<(&Document, ObjectId)> {
        let record = self.record(handle)?;
        let index = page.checked_sub(1).ok_or(EngineError::PageOutOfRange {
            page,
            page_count: record.page_ids.len() as u32,
        })?;
        let id = record
            .page_ids
            .get(index as usize)
            .copied()
            .ok_or(EngineError::PageOutOfRange {
                page,
                page_count: record.page_ids.len() as u32,
            })?;
        Ok((&record.document, id))
    }
}

impl Renderer for LopdfRenderer {
    fn load_document(&mut self, bytes: &[u8]) -> EngineResult<DocumentHandle> {
        objects::reject_encrypted(bytes)?;
        let document = Document::load_mem(bytes)?;

        let page_ids: Vec<ObjectId> = document.get_pages().into_values().collect();
        if page_ids.is_empty() {
            return Err(EngineError::Backend("document has no pages".to_owned()));
        }
        let page_sizes = page_ids
            .iter()
            .map(|id| objects::page_size(&document, *id))
            .collect();

        self.next_handle += 1;
        let handle = DocumentHandle(self.next_handle);
        tracing::debug!(handle = handle.raw(), pages = page_ids.len(), "document loaded");
        self.docs.insert(
            handle,
            DocumentRecord {
                document,
                page_ids,
                page_sizes,
            },
        );
        Ok(handle)
    }

    fn page_count(&self, handle: DocumentHandle) -> EngineResult<u32> {
        Ok(self.record(handle)?.page_sizes.len() as u32)
    }

    fn page_size(&self, handle: DocumentHandle, page: u32) -> EngineResult<PageSize> {
        let record = self.record(handle)?;
        page.checked_sub(1)
            .and_then(|index| record.page_sizes.get(index as usize))
            .copied()
            .ok_or(EngineError::PageOutOfRange {
                page,
                page_count: record.page_sizes.len() as u32,
            })
    }

    fn render_page(
        &self,
        handle: DocumentHandle,
        page: u32,
        viewport: &PageViewport,
        token: &CancellationToken,
    ) -> EngineResult<RgbaImage> {
        if token.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        let (width, height) = viewport.pixel_size();
        let mut image = RgbaImage::from_pixel(width, height, Rgba([255, 255, 255, 255]));

        if width >= 4 && height >= 4 {
            for x in 0..width {
                image.put_pixel(x, 0, BORDER);
                image.put_pixel(x, height - 1, BORDER);
            }
            for y in 0..height {
                image.put_pixel(0, y, BORDER);
                image.put_pixel(width - 1, y, BORDER);
            }
        }

        let page_height = viewport.page_size.height_pt;
        for item in self.text_content(handle, page)? {
            if token.is_cancelled() {
                return Err(EngineError::Cancelled);
            }
            // Bar from baseline up to the cap height, in top-down page units
            let top = page_height - item.y - item.font_size * 0.7;
            let [x0, y0, x1, y1] = rotate_rect(
                viewport,
                item.x,
                top,
                item.width,
                item.font_size * 0.7,
            );
            fill_rect(&mut image, x0, y0, x1, y1, TEXT_BAR);
        }

        if token.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        Ok(image)
    }

    fn text_content(&self, handle: DocumentHandle, page: u32) -> EngineResult<Vec<TextItem>> {
        let (document, page_id) = self.page_id(handle, page)?;
        let data = document.get_page_content(page_id)?;
        let content = Content::decode(&data)?;
        Ok(extract_text(&content))
    }

    fn annotations(
        &self,
        handle: DocumentHandle,
        page: u32,
    ) -> EngineResult<Vec<WidgetAnnotation>> {
        let (document, page_id) = self.page_id(handle, page)?;
        let page_dict = document.get_dictionary(page_id)?;
        let annots = match page_dict.get(b"Annots") {
            Ok(obj) => objects::reference_array(document, obj),
            Err(_) => return Ok(Vec::new()),
        };

        let widgets = annots
            .into_iter()
            .filter_map(|id| read_widget(document, id))
            .collect();
        Ok(widgets)
    }

    fn close(&mut self, handle: DocumentHandle) -> EngineResult<()> {
        self.docs
            .remove(&handle)
            .map(|_| ())
            .ok_or(EngineError::InvalidHandle(handle.raw()))
    }
}

/// Map a top-down page rectangle into viewport pixels
fn rotate_rect(viewport: &PageViewport, x: f32, y: f32, w: f32, h: f32) -> [i64; 4] {
    let s = viewport.scale;
    let pw = viewport.page_size.width_pt;
    let ph = viewport.page_size.height_pt;
    let (rx, ry, rw, rh) = match viewport.rotation {
        Rotation::Deg0 => (x, y, w, h),
        Rotation::Deg90 => (ph - y - h, x, h, w),
        Rotation::Deg180 => (pw - x - w, ph - y - h, w, h),
        Rotation::Deg270 => (y, pw - x - w, h, w),
    };
    [
        (rx * s).floor() as i64,
        (ry * s).floor() as i64,
        ((rx + rw) * s).ceil() as i64,
        ((ry + rh) * s).ceil() as i64,
    ]
}

fn fill_rect(image: &mut RgbaImage, x0: i64, y0: i64, x1: i64, y1: i64, color: Rgba<u8>) {
    let (width, height) = (image.width() as i64, image.height() as i64);
    for y in y0.max(1)..y1.min(height - 1) {
        for x in x0.max(1)..x1.min(width - 1) {
            image.put_pixel(x as u32, y as u32, color);
        }
    }
}

/// Walk text operators and collect shown strings with their positions
fn extract_text(content: &Content) -> Vec<TextItem> {
    let mut items = Vec::new();
    let mut font_size = 12.0f32;
    let mut leading = 0.0f32;
    let (mut line_x, mut line_y) = (0.0f32, 0.0f32);

    let operand = |operands: &[Object], index: usize| -> f32 {
        operands.get(index).and_then(obj_to_f32).unwrap_or(0.0)
    };

    for op in &content.operations {
        let shown = match op.operator.as_str() {
            "BT" => {
                line_x = 0.0;
                line_y = 0.0;
                None
            }
            "Tf" => {
                let size = operand(&op.operands, 1);
                if size > 0.0 {
                    font_size = size;
                }
                None
            }
            "TL" => {
                leading = operand(&op.operands, 0);
                None
            }
            "Td" | "TD" => {
                let ty = operand(&op.operands, 1);
                line_x += operand(&op.operands, 0);
                line_y += ty;
                if op.operator == "TD" {
                    leading = -ty;
                }
                None
            }
            "Tm" => {
                line_x = operand(&op.operands, 4);
                line_y = operand(&op.operands, 5);
                None
            }
            "T*" => {
                line_y -= leading;
                None
            }
            "Tj" | "'" | "\"" => {
                if op.operator != "Tj" {
                    line_y -= leading;
                }
                op.operands.last().and_then(string_operand)
            }
            "TJ" => op.operands.first().and_then(|array| match array {
                Object::Array(parts) => {
                    let text: String = parts.iter().filter_map(string_operand).collect();
                    Some(text)
                }
                _ => None,
            }),
            _ => None,
        };

        if let Some(text) = shown.filter(|text| !text.trim().is_empty()) {
            let width = text.chars().count() as f32 * font_size * 0.5;
            items.push(TextItem {
                text,
                x: line_x,
                y: line_y,
                font_size,
                width,
            });
        }
    }
    items
}

fn string_operand(obj: &Object) -> Option<String> {
    match obj {
        Object::String(bytes, _) => Some(decode_text(bytes)),
        _ => None,
    }
}

const FF_MULTILINE: i64 = 1 << 12;
const FF_RADIO: i64 = 1 << 15;
const FF_PUSHBUTTON: i64 = 1 << 16;

fn read_widget(document: &Document, id: ObjectId) -> Option<WidgetAnnotation> {
    let dict = document.get_dictionary(id).ok()?;
    let subtype = dict.get(b"Subtype").and_then(Object::as_name).ok()?;
    if subtype != b"Widget" {
        return None;
    }

    let rect = dict.get(b"Rect").ok().and_then(|obj| rect_from(document, obj))?;
    let field_type = inherited(document, id, b"FT").and_then(|obj| obj.as_name().ok())?;
    let flags = inherited(document, id, b"Ff")
        .and_then(|obj| obj.as_i64().ok())
        .unwrap_or(0);
    let value = inherited(document, id, b"V").and_then(|obj| object_text(document, obj));

    let kind = match field_type {
        b"Tx" => WidgetKind::Text {
            multiline: flags & FF_MULTILINE != 0,
        },
        b"Btn" if flags & FF_PUSHBUTTON != 0 => WidgetKind::Button,
        b"Btn" => WidgetKind::Checkbox,
        b"Ch" => WidgetKind::Choice {
            options: choice_options(document, id),
        },
        b"Sig" => WidgetKind::Signature,
        _ => return None,
    };

    let checked = match kind {
        WidgetKind::Checkbox => {
            let state = dict
                .get(b"AS")
                .ok()
                .and_then(|obj| object_text(document, obj))
                .or_else(|| value.clone());
            state.is_some_and(|state| state != "Off")
        }
        _ => false,
    };
    if matches!(kind, WidgetKind::Checkbox) && flags & FF_RADIO != 0 {
        tracing::trace!(?id, "radio button exposed as checkbox");
    }

    Some(WidgetAnnotation {
        name: qualified_name(document, id),
        kind,
        rect,
        value,
        checked,
        font_size: inherited(document, id, b"DA")
            .and_then(|obj| object_text(document, obj))
            .and_then(|da| font_size_from_da(&da))
            .unwrap_or(12.0),
    })
}

/// Join `/T` entries from the field hierarchy with dots
pub(crate) fn qualified_name(document: &Document, id: ObjectId) -> String {
    let mut parts = Vec::new();
    let mut current = Some(id);
    let mut depth = 0;
    while let Some(id) = current {
        let Ok(dict) = document.get_dictionary(id) else {
            break;
        };
        if let Some(name) = dict.get(b"T").ok().and_then(|obj| object_text(document, obj)) {
            parts.push(name);
        }
        current = dict.get(b"Parent").and_then(Object::as_reference).ok();
        depth += 1;
        if depth > 64 {
            break;
        }
    }
    parts.reverse();
    parts.join(".")
}

fn choice_options(document: &Document, id: ObjectId) -> Vec<String> {
    let Some(Object::Array(items)) = inherited(document, id, b"Opt") else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| match objects::resolve(document, item) {
            // [export, display] pairs show the display string
            Object::Array(pair) => pair.last().and_then(|obj| object_text(document, obj)),
            other => object_text(document, other),
        })
        .collect()
}

/// Extract the size operand of `Tf` from a default appearance string
pub(crate) fn font_size_from_da(da: &str) -> Option<f32> {
    let tokens: Vec<&str> = da.split_whitespace().collect();
    let position = tokens.iter().position(|token| *token == "Tf")?;
    let size: f32 = tokens.get(position.checked_sub(1)?)?.parse().ok()?;
    (size > 0.0).then_some(size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::DocumentBuilder;

    fn sample() -> Vec<u8> {
        DocumentBuilder::new()
            .page(612.0, 792.0)
            .text(72.0, 720.0, 18.0, "Quarterly report")
            .text_field("customer.name", [100.0, 600.0, 300.0, 620.0], "Ada")
            .checkbox("approved", [100.0, 560.0, 114.0, 574.0], true)
            .page(300.0, 400.0)
            .build()
            .expect("fixture should build")
    }

    #[test]
    fn test_opens_pdf_and_reads_pages() {
        let mut renderer = LopdfRenderer::new();
        let handle = renderer.load_document(&sample()).expect("load should succeed");

        assert_eq!(renderer.page_count(handle).expect("count"), 2);
        assert_eq!(
            renderer.page_size(handle, 2).expect("size"),
            PageSize::new(300.0, 400.0)
        );
    }

    #[test]
    fn test_page_zero_is_out_of_range() {
        let mut renderer = LopdfRenderer::new();
        let handle = renderer.load_document(&sample()).expect("load");
        let err = renderer.page_size(handle, 0).expect_err("page 0 is invalid");
        assert!(matches!(err, EngineError::PageOutOfRange { page: 0, page_count: 2 }));
    }

    #[test]
    fn test_text_content_reports_baseline() {
        let mut renderer = LopdfRenderer::new();
        let handle = renderer.load_document(&sample()).expect("load");

        let items = renderer.text_content(handle, 1).expect("text");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].text, "Quarterly report");
        assert_eq!((items[0].x, items[0].y), (72.0, 720.0));
        assert_eq!(items[0].font_size, 18.0);
    }

    #[test]
    fn test_annotations_expose_widgets() {
        let mut renderer = LopdfRenderer::new();
        let handle = renderer.load_document(&sample()).expect("load");

        let widgets = renderer.annotations(handle, 1).expect("widgets");
        assert_eq!(widgets.len(), 2);

        let name = widgets.iter().find(|w| w.name == "customer.name").expect("text field");
        assert_eq!(name.kind, WidgetKind::Text { multiline: false });
        assert_eq!(name.value.as_deref(), Some("Ada"));
        assert_eq!(name.rect, [100.0, 600.0, 300.0, 620.0]);

        let approved = widgets.iter().find(|w| w.name == "approved").expect("checkbox");
        assert_eq!(approved.kind, WidgetKind::Checkbox);
        assert!(approved.checked);

        assert!(renderer.annotations(handle, 2).expect("widgets").is_empty());
    }

    #[test]
    fn test_render_respects_viewport_and_cancellation() {
        let mut renderer = LopdfRenderer::new();
        let handle = renderer.load_document(&sample()).expect("load");
        let viewport = renderer
            .viewport(handle, 2, 0.5, Rotation::Deg90)
            .expect("viewport");

        let token = CancellationToken::new();
        let image = renderer.render_page(handle, 2, &viewport, &token).expect("render");
        assert_eq!((image.width(), image.height()), (200, 150));

        token.cancel();
        let err = renderer
            .render_page(handle, 2, &viewport, &token)
            .expect_err("cancelled render");
        assert!(matches!(err, EngineError::Cancelled));
    }

    #[test]
    fn test_invalid_handle_returns_error() {
        let renderer = LopdfRenderer::new();
        let err = renderer
            .page_count(DocumentHandle(999))
            .expect_err("should fail for unknown handle");
        assert!(matches!(err, EngineError::InvalidHandle(999)));
    }

    #[test]
    fn test_garbage_bytes_fail_to_load() {
        let mut renderer = LopdfRenderer::new();
        assert!(renderer.load_document(b"not a pdf").is_err());
    }

    #[test]
    fn test_default_appearance_font_size() {
        assert_eq!(font_size_from_da("/Helv 9 Tf 0 g"), Some(9.0));
        assert_eq!(font_size_from_da("/Helv 0 Tf 0 g"), None);
        assert_eq!(font_size_from_da("0 g"), None);
    }
}
