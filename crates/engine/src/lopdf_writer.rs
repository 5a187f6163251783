//! [`Writer`] implementation on top of lopdf
//!
//! Every draw call appends a self-contained content stream (`q ... Q`) to the
//! page. The page's original content is wrapped in its own `q`/`Q` pair the
//! first time we draw, so graphics state left behind by the original producer
//! cannot leak into our marks.

use std::collections::{HashMap, HashSet};

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream, StringFormat};

use crate::error::{EngineError, EngineResult};
use crate::geometry::PageSize;
use crate::objects::{self, set_page_resource, winansi_bytes};
use crate::truetype;
use crate::writer::{
    EllipseOp, FieldSpec, FontData, FontHandle, ImageHandle, ImageOp, LineOp, Pivot, PolylineOp,
    RectOp, RgbColor, StandardFont, Stroke, TextOp, Writer, WriterDocument,
};

/// Bezier control distance for a quarter ellipse
const KAPPA: f32 = 0.552_284_8;

/// Loads documents into [`LopdfDocument`]
#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfWriter;

impl LopdfWriter {
    pub fn new() -> Self {
        Self
    }
}

impl Writer for LopdfWriter {
    type Document = LopdfDocument;

    fn load(&self, bytes: &[u8]) -> EngineResult<LopdfDocument> {
        LopdfDocument::load(bytes)
    }
}

#[derive(Debug, Clone)]
pub(crate) struct ResourceEntry {
    pub name: String,
    pub id: ObjectId,
}

/// A document open for modification
#[derive(Debug)]
pub struct LopdfDocument {
    pub(crate) doc: Document,
    pub(crate) page_ids: Vec<ObjectId>,
    fonts: Vec<ResourceEntry>,
    standard_fonts: HashMap<StandardFont, FontHandle>,
    images: Vec<ResourceEntry>,
    isolated: HashSet<ObjectId>,
    pub(crate) form_font: Option<ObjectId>,
    pub(crate) next_xobject: u32,
}

pub(crate) fn real(value: f32) -> Object {
    Object::Real(value.into())
}

fn name(value: &str) -> Object {
    Object::Name(value.as_bytes().to_vec())
}

pub(crate) fn op(operator: &str, operands: Vec<Object>) -> Operation {
    Operation::new(operator, operands)
}

fn fill_color(color: RgbColor) -> Operation {
    op("rg", vec![real(color.r), real(color.g), real(color.b)])
}

fn stroke_ops(stroke: Stroke) -> Vec<Operation> {
    vec![
        op(
            "RG",
            vec![real(stroke.color.r), real(stroke.color.g), real(stroke.color.b)],
        ),
        op("w", vec![real(stroke.width.max(0.0))]),
    ]
}

/// `cm` rotating about the pivot
fn pivot_ops(pivot: Option<Pivot>) -> Vec<Operation> {
    let Some(pivot) = pivot.filter(|p| p.degrees.rem_euclid(360.0) != 0.0) else {
        return Vec::new();
    };
    let (sin, cos) = pivot.degrees.to_radians().sin_cos();
    let e = pivot.x - cos * pivot.x + sin * pivot.y;
    let f = pivot.y - sin * pivot.x - cos * pivot.y;
    vec![op(
        "cm",
        vec![real(cos), real(sin), real(-sin), real(cos), real(e), real(f)],
    )]
}

/// Painting operator for a closed path
fn paint_operator(stroke: bool, fill: bool) -> &'static str {
    match (stroke, fill) {
        (true, true) => "B",
        (false, true) => "f",
        (true, false) => "S",
        (false, false) => "n",
    }
}

impl LopdfDocument {
    pub fn load(bytes: &[u8]) -> EngineResult<Self> {
        objects::reject_encrypted(bytes)?;
        let doc = Document::load_mem(bytes)?;
        Ok(Self::from_document(doc))
    }

    pub(crate) fn from_document(doc: Document) -> Self {
        let page_ids = doc.get_pages().into_values().collect();
        Self {
            doc,
            page_ids,
            fonts: Vec::new(),
            standard_fonts: HashMap::new(),
            images: Vec::new(),
            isolated: HashSet::new(),
            form_font: None,
            next_xobject: 0,
        }
    }

    pub(crate) fn page_id(&self, page: u32) -> EngineResult<ObjectId> {
        page.checked_sub(1)
            .and_then(|index| self.page_ids.get(index as usize))
            .copied()
            .ok_or(EngineError::PageOutOfRange {
                page,
                page_count: self.page_ids.len() as u32,
            })
    }

    /// Wrap the original page content in `q`/`Q` once
    fn isolate(&mut self, page_id: ObjectId) -> EngineResult<()> {
        if !self.isolated.insert(page_id) {
            return Ok(());
        }

        let existing = self
            .doc
            .get_dictionary(page_id)?
            .get(b"Contents")
            .ok()
            .cloned();
        let mut streams = match existing {
            Some(Object::Array(items)) => items,
            Some(reference @ Object::Reference(_)) => vec![reference],
            _ => return Ok(()),
        };

        let open = self.doc.add_object(Stream::new(dictionary! {}, b"q\n".to_vec()));
        let close = self.doc.add_object(Stream::new(dictionary! {}, b"\nQ\n".to_vec()));
        streams.insert(0, Object::Reference(open));
        streams.push(Object::Reference(close));

        let page = self.doc.get_object_mut(page_id).and_then(Object::as_dict_mut)?;
        page.set("Contents", Object::Array(streams));
        Ok(())
    }

    /// Append `operations` to the page inside a `q`/`Q` pair
    pub(crate) fn append(
        &mut self,
        page_id: ObjectId,
        operations: Vec<Operation>,
    ) -> EngineResult<()> {
        self.isolate(page_id)?;

        let mut wrapped = Vec::with_capacity(operations.len() + 2);
        wrapped.push(op("q", vec![]));
        wrapped.extend(operations);
        wrapped.push(op("Q", vec![]));

        let bytes = Content { operations: wrapped }.encode()?;
        self.doc.add_page_contents(page_id, bytes)?;
        Ok(())
    }

    /// Graphics state selecting constant alpha, registered on the page
    fn opacity_ops(&mut self, page_id: ObjectId, opacity: f32) -> EngineResult<Vec<Operation>> {
        let opacity = opacity.clamp(0.0, 1.0);
        if opacity >= 1.0 {
            return Ok(Vec::new());
        }

        let resource = format!("GS{}", (opacity * 1000.0).round() as u32);
        let state = dictionary! {
            "Type" => "ExtGState",
            "ca" => real(opacity),
            "CA" => real(opacity),
        };
        set_page_resource(
            &mut self.doc,
            page_id,
            b"ExtGState",
            &resource,
            Object::Dictionary(state),
        )?;
        Ok(vec![op("gs", vec![name(&resource)])])
    }

    fn font(&self, handle: FontHandle) -> EngineResult<ResourceEntry> {
        self.fonts
            .get(handle.0 as usize)
            .cloned()
            .ok_or(EngineError::UnknownResource(handle.0))
    }

    fn image(&self, handle: ImageHandle) -> EngineResult<ResourceEntry> {
        self.images
            .get(handle.0 as usize)
            .cloned()
            .ok_or(EngineError::UnknownResource(handle.0))
    }

    fn register_font(&mut self, id: ObjectId) -> FontHandle {
        let handle = FontHandle(self.fonts.len() as u32);
        self.fonts.push(ResourceEntry {
            name: format!("FolioF{}", handle.0),
            id,
        });
        handle
    }

    fn embed_standard(&mut self, font: StandardFont) -> FontHandle {
        if let Some(handle) = self.standard_fonts.get(&font) {
            return *handle;
        }
        let id = self.doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => font.base_font(),
            "Encoding" => "WinAnsiEncoding",
        });
        let handle = self.register_font(id);
        self.standard_fonts.insert(font, handle);
        handle
    }

    fn embed_truetype(&mut self, data: &[u8]) -> EngineResult<FontHandle> {
        let fallback = format!("FolioEmbedded{}", self.fonts.len());
        let metrics = truetype::parse_metrics(data, &fallback)?;

        let file_id = self.doc.add_object(Stream::new(
            dictionary! { "Length1" => data.len() as i64 },
            data.to_vec(),
        ));
        let descriptor_id = self.doc.add_object(dictionary! {
            "Type" => "FontDescriptor",
            "FontName" => name(&metrics.name),
            "Flags" => metrics.flags,
            "FontBBox" => metrics.bbox.iter().map(|v| Object::Integer(*v)).collect::<Vec<_>>(),
            "ItalicAngle" => 0,
            "Ascent" => metrics.ascent,
            "Descent" => metrics.descent,
            "CapHeight" => metrics.cap_height,
            "StemV" => 80,
            "FontFile2" => file_id,
        });
        let font_id = self.doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "TrueType",
            "BaseFont" => name(&metrics.name),
            "FirstChar" => i64::from(truetype::FIRST_CHAR),
            "LastChar" => i64::from(truetype::LAST_CHAR),
            "Widths" => metrics.widths.iter().map(|w| Object::Integer(*w)).collect::<Vec<_>>(),
            "FontDescriptor" => descriptor_id,
            "Encoding" => "WinAnsiEncoding",
        });

        tracing::debug!(font = %metrics.name, "embedded TrueType font");
        Ok(self.register_font(font_id))
    }

    fn ellipse_path(ellipse: &EllipseOp) -> Vec<Operation> {
        let (cx, cy, rx, ry) = (ellipse.cx, ellipse.cy, ellipse.rx.abs(), ellipse.ry.abs());
        let (kx, ky) = (rx * KAPPA, ry * KAPPA);
        vec![
            op("m", vec![real(cx + rx), real(cy)]),
            op(
                "c",
                vec![real(cx + rx), real(cy + ky), real(cx + kx), real(cy + ry), real(cx), real(cy + ry)],
            ),
            op(
                "c",
                vec![real(cx - kx), real(cy + ry), real(cx - rx), real(cy + ky), real(cx - rx), real(cy)],
            ),
            op(
                "c",
                vec![real(cx - rx), real(cy - ky), real(cx - kx), real(cy - ry), real(cx), real(cy - ry)],
            ),
            op(
                "c",
                vec![real(cx + kx), real(cy - ry), real(cx + rx), real(cy - ky), real(cx + rx), real(cy)],
            ),
            op("h", vec![]),
        ]
    }
}

impl WriterDocument for LopdfDocument {
    fn page_count(&self) -> u32 {
        self.page_ids.len() as u32
    }

    fn page_size(&self, page: u32) -> EngineResult<PageSize> {
        let page_id = self.page_id(page)?;
        Ok(objects::page_size(&self.doc, page_id))
    }

    fn embed_font(&mut self, font: &FontData) -> EngineResult<FontHandle> {
        match font {
            FontData::Standard(font) => Ok(self.embed_standard(*font)),
            FontData::TrueType(data) => self.embed_truetype(data),
        }
    }

    fn embed_image(&mut self, bytes: &[u8]) -> EngineResult<ImageHandle> {
        let img = image::load_from_memory(bytes)?.to_rgba8();
        let (width, height) = img.dimensions();
        let mut rgb = Vec::with_capacity((width * height * 3) as usize);
        let mut alpha = Vec::with_capacity((width * height) as usize);
        for pixel in img.pixels() {
            rgb.extend_from_slice(&pixel.0[..3]);
            alpha.push(pixel.0[3]);
        }

        let mut image_dict = dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => i64::from(width),
            "Height" => i64::from(height),
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
        };
        if alpha.iter().any(|a| *a != 255) {
            let smask_id = self.doc.add_object(Stream::new(
                dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Image",
                    "Width" => i64::from(width),
                    "Height" => i64::from(height),
                    "ColorSpace" => "DeviceGray",
                    "BitsPerComponent" => 8,
                },
                alpha,
            ));
            image_dict.set("SMask", smask_id);
        }
        let id = self.doc.add_object(Stream::new(image_dict, rgb));

        let handle = ImageHandle(self.images.len() as u32);
        self.images.push(ResourceEntry {
            name: format!("FolioIm{}", handle.0),
            id,
        });
        Ok(handle)
    }

    fn draw_text(&mut self, page: u32, text: &TextOp) -> EngineResult<()> {
        let page_id = self.page_id(page)?;
        let font = self.font(text.font)?;
        set_page_resource(
            &mut self.doc,
            page_id,
            b"Font",
            &font.name,
            Object::Reference(font.id),
        )?;

        let mut ops = self.opacity_ops(page_id, text.opacity)?;
        ops.extend(pivot_ops(text.rotation));
        ops.extend([
            op("BT", vec![]),
            op("Tf", vec![name(&font.name), real(text.size)]),
            fill_color(text.color),
            op("Td", vec![real(text.x), real(text.y)]),
            op(
                "Tj",
                vec![Object::String(winansi_bytes(&text.text), StringFormat::Literal)],
            ),
            op("ET", vec![]),
        ]);
        self.append(page_id, ops)
    }

    fn draw_rectangle(&mut self, page: u32, rect: &RectOp) -> EngineResult<()> {
        let page_id = self.page_id(page)?;
        let mut ops = self.opacity_ops(page_id, rect.opacity)?;
        ops.extend(pivot_ops(rect.rotation));
        if let Some(fill) = rect.fill {
            ops.push(fill_color(fill));
        }
        if let Some(stroke) = rect.stroke {
            ops.extend(stroke_ops(stroke));
        }
        ops.push(op(
            "re",
            vec![real(rect.x), real(rect.y), real(rect.width), real(rect.height)],
        ));
        ops.push(op(
            paint_operator(rect.stroke.is_some(), rect.fill.is_some()),
            vec![],
        ));
        self.append(page_id, ops)
    }

    fn draw_ellipse(&mut self, page: u32, ellipse: &EllipseOp) -> EngineResult<()> {
        let page_id = self.page_id(page)?;
        let mut ops = self.opacity_ops(page_id, ellipse.opacity)?;
        if let Some(fill) = ellipse.fill {
            ops.push(fill_color(fill));
        }
        if let Some(stroke) = ellipse.stroke {
            ops.extend(stroke_ops(stroke));
        }
        ops.extend(Self::ellipse_path(ellipse));
        ops.push(op(
            paint_operator(ellipse.stroke.is_some(), ellipse.fill.is_some()),
            vec![],
        ));
        self.append(page_id, ops)
    }

    fn draw_line(&mut self, page: u32, line: &LineOp) -> EngineResult<()> {
        let page_id = self.page_id(page)?;
        let mut ops = self.opacity_ops(page_id, line.opacity)?;
        ops.extend(stroke_ops(line.stroke));
        ops.extend([
            op("J", vec![Object::Integer(1)]),
            op("m", vec![real(line.start.0), real(line.start.1)]),
            op("l", vec![real(line.end.0), real(line.end.1)]),
            op("S", vec![]),
        ]);
        self.append(page_id, ops)
    }

    fn draw_polyline(&mut self, page: u32, polyline: &PolylineOp) -> EngineResult<()> {
        let page_id = self.page_id(page)?;
        let Some((first, rest)) = polyline.points.split_first() else {
            return Err(EngineError::Backend("polyline has no points".to_owned()));
        };
        if rest.is_empty() {
            return Err(EngineError::Backend(
                "polyline needs at least two points".to_owned(),
            ));
        }

        let mut ops = self.opacity_ops(page_id, polyline.opacity)?;
        ops.extend(stroke_ops(polyline.stroke));
        ops.push(op("J", vec![Object::Integer(1)]));
        ops.push(op("j", vec![Object::Integer(1)]));
        ops.push(op("m", vec![real(first.0), real(first.1)]));
        ops.extend(rest.iter().map(|(x, y)| op("l", vec![real(*x), real(*y)])));
        ops.push(op("S", vec![]));
        self.append(page_id, ops)
    }

    fn draw_image(&mut self, page: u32, placed: &ImageOp) -> EngineResult<()> {
        let page_id = self.page_id(page)?;
        let image = self.image(placed.image)?;
        set_page_resource(
            &mut self.doc,
            page_id,
            b"XObject",
            &image.name,
            Object::Reference(image.id),
        )?;

        let mut ops = self.opacity_ops(page_id, placed.opacity)?;
        ops.extend(pivot_ops(placed.rotation));
        ops.push(op(
            "cm",
            vec![
                real(placed.width),
                real(0.0),
                real(0.0),
                real(placed.height),
                real(placed.x),
                real(placed.y),
            ],
        ));
        ops.push(op("Do", vec![name(&image.name)]));
        self.append(page_id, ops)
    }

    fn set_rotation(&mut self, page: u32, degrees: u16) -> EngineResult<()> {
        if degrees % 90 != 0 {
            return Err(EngineError::Backend(format!(
                "page rotation must be a multiple of 90, got {degrees}"
            )));
        }
        let page_id = self.page_id(page)?;
        let page = self.doc.get_object_mut(page_id).and_then(Object::as_dict_mut)?;
        page.set("Rotate", Object::Integer(i64::from(degrees % 360)));
        Ok(())
    }

    fn field_names(&self) -> Vec<String> {
        self.terminal_fields()
            .into_iter()
            .map(|(name, _)| name)
            .collect()
    }

    fn set_text_field(&mut self, name: &str, value: &str) -> EngineResult<()> {
        self.fill_text(name, value)
    }

    fn set_checkbox(&mut self, name: &str, checked: bool) -> EngineResult<()> {
        self.fill_checkbox(name, checked)
    }

    fn set_choice(&mut self, name: &str, value: &str) -> EngineResult<()> {
        self.fill_choice(name, value)
    }

    fn create_field(&mut self, spec: &FieldSpec) -> EngineResult<()> {
        self.add_field(spec)
    }

    fn flatten_form(&mut self) -> EngineResult<()> {
        self.flatten()
    }

    fn save(mut self) -> EngineResult<Vec<u8>> {
        objects::save_document(&mut self.doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::DocumentBuilder;
    use crate::renderer::{LopdfRenderer, Renderer};

    fn blank(pages: usize) -> LopdfDocument {
        let mut builder = DocumentBuilder::new();
        for _ in 0..pages {
            builder = builder.page(612.0, 792.0);
        }
        LopdfWriter::new()
            .load(&builder.build().expect("fixture"))
            .expect("load")
    }

    fn operations(document: &LopdfDocument, page: u32) -> Vec<Operation> {
        let page_id = document.page_id(page).expect("page");
        let bytes = document.doc.get_page_content(page_id).expect("content");
        Content::decode(&bytes).expect("decode").operations
    }

    fn find<'a>(ops: &'a [Operation], operator: &str) -> &'a Operation {
        ops.iter()
            .find(|op| op.operator == operator)
            .unwrap_or_else(|| panic!("missing {operator} operator"))
    }

    fn numbers(op: &Operation) -> Vec<f32> {
        op.operands.iter().filter_map(objects::obj_to_f32).collect()
    }

    #[test]
    fn test_draw_text_uses_baseline_and_font() {
        let mut document = blank(1);
        let font = document
            .embed_font(&FontData::Standard(StandardFont::Helvetica))
            .expect("font");
        document
            .draw_text(
                1,
                &TextOp {
                    x: 100.0,
                    y: 80.0,
                    text: "Hello".to_owned(),
                    font,
                    size: 12.0,
                    color: RgbColor::BLACK,
                    opacity: 1.0,
                    rotation: None,
                },
            )
            .expect("draw");

        let ops = operations(&document, 1);
        let tf = find(&ops, "Tf");
        assert_eq!(tf.operands[0].as_name().ok(), Some(&b"FolioF0"[..]));
        assert_eq!(numbers(tf), vec![12.0]);
        assert_eq!(numbers(find(&ops, "Td")), vec![100.0, 80.0]);
        assert!(matches!(
            &find(&ops, "Tj").operands[0],
            Object::String(bytes, _) if bytes == b"Hello"
        ));
    }

    #[test]
    fn test_standard_fonts_are_deduplicated() {
        let mut document = blank(1);
        let a = document
            .embed_font(&FontData::Standard(StandardFont::TimesBold))
            .expect("font");
        let b = document
            .embed_font(&FontData::Standard(StandardFont::TimesBold))
            .expect("font");
        assert_eq!(a, b);
    }

    #[test]
    fn test_unknown_font_handle_is_rejected() {
        let mut document = blank(1);
        let err = document
            .draw_text(
                1,
                &TextOp {
                    x: 0.0,
                    y: 0.0,
                    text: "x".to_owned(),
                    font: FontHandle(7),
                    size: 10.0,
                    color: RgbColor::BLACK,
                    opacity: 1.0,
                    rotation: None,
                },
            )
            .expect_err("no such font");
        assert!(matches!(err, EngineError::UnknownResource(7)));
    }

    #[test]
    fn test_rectangle_with_opacity_registers_ext_gstate() {
        let mut document = blank(1);
        document
            .draw_rectangle(
                1,
                &RectOp {
                    x: 50.0,
                    y: 702.0,
                    width: 100.0,
                    height: 40.0,
                    stroke: Some(Stroke {
                        color: RgbColor::new(1.0, 0.0, 0.0),
                        width: 2.0,
                    }),
                    fill: None,
                    opacity: 0.5,
                    rotation: None,
                },
            )
            .expect("draw");

        let ops = operations(&document, 1);
        assert_eq!(find(&ops, "gs").operands[0].as_name().ok(), Some(&b"GS500"[..]));
        assert_eq!(numbers(find(&ops, "re")), vec![50.0, 702.0, 100.0, 40.0]);
        find(&ops, "S");
        assert_eq!(ops.last().map(|op| op.operator.as_str()), Some("Q"));
    }

    #[test]
    fn test_polyline_requires_two_points() {
        let mut document = blank(1);
        let result = document.draw_polyline(
            1,
            &PolylineOp {
                points: vec![(1.0, 1.0)],
                stroke: Stroke {
                    color: RgbColor::BLACK,
                    width: 1.0,
                },
                opacity: 1.0,
            },
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_draw_on_missing_page_fails() {
        let mut document = blank(2);
        let err = document
            .set_rotation(3, 90)
            .expect_err("page 3 does not exist");
        assert!(matches!(err, EngineError::PageOutOfRange { page: 3, page_count: 2 }));
    }

    #[test]
    fn test_saved_document_round_trips_through_renderer() {
        let mut document = blank(2);
        document.set_rotation(2, 90).expect("rotate");
        document
            .draw_ellipse(
                1,
                &EllipseOp {
                    cx: 100.0,
                    cy: 100.0,
                    rx: 20.0,
                    ry: 10.0,
                    stroke: None,
                    fill: Some(RgbColor::WHITE),
                    opacity: 1.0,
                },
            )
            .expect("ellipse");
        let bytes = document.save().expect("save");

        let mut renderer = LopdfRenderer::new();
        let handle = renderer.load_document(&bytes).expect("reload");
        assert_eq!(renderer.page_count(handle).expect("count"), 2);

        let reloaded = LopdfDocument::load(&bytes).expect("reload");
        let page_id = reloaded.page_id(2).expect("page");
        let rotate = reloaded
            .doc
            .get_dictionary(page_id)
            .and_then(|page| page.get(b"Rotate"))
            .and_then(Object::as_i64)
            .expect("rotate entry");
        assert_eq!(rotate, 90);
    }

    #[test]
    fn test_embed_image_adds_soft_mask_only_for_transparency() {
        let mut document = blank(1);

        let mut png = Vec::new();
        let image = image::RgbaImage::from_pixel(2, 2, image::Rgba([10, 20, 30, 128]));
        image
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .expect("encode png");

        let handle = document.embed_image(&png).expect("embed");
        let entry = document.image(handle).expect("entry");
        let stream = document
            .doc
            .get_object(entry.id)
            .and_then(Object::as_stream)
            .expect("image stream");
        assert!(stream.dict.has(b"SMask"));

        document
            .draw_image(
                1,
                &ImageOp {
                    image: handle,
                    x: 10.0,
                    y: 20.0,
                    width: 30.0,
                    height: 40.0,
                    opacity: 1.0,
                    rotation: None,
                },
            )
            .expect("draw image");
        let ops = operations(&document, 1);
        assert_eq!(find(&ops, "Do").operands[0].as_name().ok(), Some(&b"FolioIm0"[..]));
        assert_eq!(numbers(find(&ops, "cm")), vec![30.0, 0.0, 0.0, 40.0, 10.0, 20.0]);
    }

    #[test]
    fn test_invalid_image_bytes_fail() {
        let mut document = blank(1);
        assert!(matches!(
            document.embed_image(b"nope"),
            Err(EngineError::Image(_))
        ));
    }
}
