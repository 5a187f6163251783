//! Serialization of a session into a new document
//!
//! The original bytes are loaded into a [`Writer`], every element layer is
//! drawn page by page in z-order, page rotations are applied, form field
//! values are written and the form is flattened. A failing element is logged
//! and reported without aborting the export; failures to load or save the
//! document are fatal.

use std::sync::Arc;

use folio_engine::{
    EllipseOp, EngineResult, FieldSpec, FieldValue, FontClass, FontData, FontHandle, ImageHandle,
    ImageOp, LineOp, Pivot, PolylineOp, RectOp, Renderer, RgbColor, StandardFont, Stroke, TextOp,
    Writer, WriterDocument,
};

use crate::element::{
    Color, Element, ElementId, FieldOrigin, FormField, FormFieldKind, ImageElement, InkStroke,
    LayerKind, RedactionBlock, ShapeAnnotation, ShapeGeometry, TextAlign, TextBox,
};
use crate::error::{EditorError, EditorResult};
use crate::fonts::FontService;
use crate::layers::ElementLayers;
use crate::session::Session;
use crate::transform::{DocPoint, DocRect};

/// Baseline distance between lines of a text box, relative to font size
const LINE_SPACING: f32 = 1.2;

/// Approximate advance of one character, relative to font size
const CHAR_WIDTH: f32 = 0.5;

/// One element that could not be written
#[derive(Debug, Clone, PartialEq)]
pub struct ExportFailure {
    pub element: ElementId,
    pub kind: LayerKind,
    pub page: u32,
    pub message: String,
}

/// Output of [`export`]
#[derive(Debug, Clone)]
pub struct ExportReport {
    pub bytes: Vec<u8>,
    pub file_name: String,
    pub failures: Vec<ExportFailure>,
}

impl ExportReport {
    /// Every element was written
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Write the session's edits over its original bytes
///
/// A text box being edited is committed first.
pub fn export<R, W>(session: &mut Session<R>, writer: &W) -> EditorResult<ExportReport>
where
    R: Renderer,
    W: Writer,
{
    let file_name = session.export_filename();
    let parts = session.export_parts();
    let mut doc = writer.load(parts.source).map_err(EditorError::ExportFatal)?;

    let mut painter = Painter {
        fonts: parts.fonts,
        embedded_fonts: Vec::new(),
        embedded_images: Vec::new(),
    };
    let mut failures = Vec::new();

    for page in 1..=doc.page_count() {
        let height = doc.page_size(page).map_err(EditorError::ExportFatal)?.height_pt;
        for element in page_elements(parts.layers, page) {
            if let Err(err) = painter.draw(&mut doc, page, height, &element) {
                let failure = ExportFailure {
                    element: element.id(),
                    kind: element.kind(),
                    page,
                    message: err.to_string(),
                };
                tracing::warn!(
                    page,
                    kind = failure.kind.name(),
                    element = %failure.element,
                    error = %err,
                    "failed to export element"
                );
                failures.push(failure);
            }
        }
    }

    for (page, rotation) in parts.rotations {
        doc.set_rotation(*page, rotation.degrees())
            .map_err(EditorError::ExportFatal)?;
    }

    for field in parts.layers.fields.iter() {
        if let Err(err) = write_field(&mut doc, field) {
            tracing::warn!(field = %field.name, error = %err, "failed to export form field");
            failures.push(ExportFailure {
                element: field.id,
                kind: LayerKind::FormField,
                page: field.page,
                message: err.to_string(),
            });
        }
    }

    doc.flatten_form().map_err(EditorError::ExportFatal)?;
    let bytes = doc.save().map_err(EditorError::ExportFatal)?;

    tracing::info!(
        file_name = %file_name,
        bytes = bytes.len(),
        failures = failures.len(),
        "export finished"
    );
    Ok(ExportReport {
        bytes,
        file_name,
        failures,
    })
}

/// Drawable elements of `page` in z-order; form fields are written separately
fn page_elements(layers: &ElementLayers, page: u32) -> Vec<Element> {
    let mut elements = Vec::new();
    elements.extend(layers.redactions.for_page(page).iter().cloned().map(Element::Redaction));
    elements.extend(layers.shapes.for_page(page).iter().cloned().map(Element::Shape));
    elements.extend(layers.ink.for_page(page).iter().cloned().map(Element::Ink));
    elements.extend(layers.text.for_page(page).iter().cloned().map(Element::Text));
    elements.extend(layers.images.for_page(page).iter().cloned().map(Element::Image));
    elements
}

struct Painter<'a> {
    fonts: &'a mut FontService,
    embedded_fonts: Vec<(FontData, FontHandle)>,
    embedded_images: Vec<(Arc<[u8]>, ImageHandle)>,
}

impl Painter<'_> {
    fn draw<D: WriterDocument>(
        &mut self,
        doc: &mut D,
        page: u32,
        height: f32,
        element: &Element,
    ) -> EngineResult<()> {
        match element {
            Element::Redaction(block) => draw_redaction(doc, page, height, block),
            Element::Shape(shape) => draw_shape(doc, page, height, shape),
            Element::Ink(stroke) => draw_ink(doc, page, height, stroke),
            Element::Text(text) => self.draw_text(doc, page, height, text),
            Element::Image(image) => self.draw_image(doc, page, height, image),
            Element::FormField(_) => Ok(()),
        }
    }

    fn font<D: WriterDocument>(
        &mut self,
        doc: &mut D,
        data: &FontData,
    ) -> EngineResult<FontHandle> {
        if let Some((_, handle)) = self.embedded_fonts.iter().find(|(known, _)| known == data) {
            return Ok(*handle);
        }
        let handle = doc.embed_font(data)?;
        self.embedded_fonts.push((data.clone(), handle));
        Ok(handle)
    }

    fn draw_text<D: WriterDocument>(
        &mut self,
        doc: &mut D,
        page: u32,
        height: f32,
        text: &TextBox,
    ) -> EngineResult<()> {
        let style = &text.style;
        let resolved = self.fonts.resolve(&style.font_family, style.bold, style.italic);
        let font = match self.font(doc, &resolved.data) {
            Ok(font) => font,
            Err(err) => {
                tracing::warn!(
                    family = %style.font_family,
                    error = %err,
                    "font could not be embedded, using a standard font"
                );
                let fallback = StandardFont::styled(FontClass::SansSerif, style.bold, style.italic);
                self.font(doc, &FontData::Standard(fallback))?
            }
        };

        let size = style.font_size;
        let rect = text.rect;
        let rotation = pivot(&rect, height, text.rotation);
        for (i, line) in text.text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let width = line.chars().count() as f32 * size * CHAR_WIDTH;
            let x = match style.align {
                TextAlign::Left => rect.x,
                TextAlign::Center => rect.x + (rect.width - width) / 2.0,
                TextAlign::Right => rect.x + rect.width - width,
            };
            let op = TextOp {
                x,
                y: height - rect.y - size - i as f32 * size * LINE_SPACING,
                text: line.to_string(),
                font,
                size,
                color: style.color.to_rgb(),
                opacity: text.opacity * style.color.alpha(),
                rotation,
            };
            doc.draw_text(page, &op)?;
        }
        Ok(())
    }

    fn draw_image<D: WriterDocument>(
        &mut self,
        doc: &mut D,
        page: u32,
        height: f32,
        image: &ImageElement,
    ) -> EngineResult<()> {
        let handle = match self
            .embedded_images
            .iter()
            .find(|(data, _)| Arc::ptr_eq(data, &image.data))
        {
            Some((_, handle)) => *handle,
            None => {
                let handle = doc.embed_image(&image.data)?;
                self.embedded_images.push((image.data.clone(), handle));
                handle
            }
        };

        let rect = image.rect;
        let op = ImageOp {
            image: handle,
            x: rect.x,
            y: flip(&rect, height),
            width: rect.width,
            height: rect.height,
            opacity: image.opacity,
            rotation: pivot(&rect, height, image.rotation),
        };
        doc.draw_image(page, &op)
    }
}

/// Bottom edge of `rect` in writer space
fn flip(rect: &DocRect, height: f32) -> f32 {
    height - rect.y - rect.height
}

fn point(p: DocPoint, height: f32) -> (f32, f32) {
    (p.x, height - p.y)
}

/// Counter-clockwise writer rotation about the centre of `rect`
fn pivot(rect: &DocRect, height: f32, clockwise_degrees: f32) -> Option<Pivot> {
    if clockwise_degrees.rem_euclid(360.0) == 0.0 {
        return None;
    }
    let center = rect.center();
    Some(Pivot {
        x: center.x,
        y: height - center.y,
        degrees: -clockwise_degrees,
    })
}

fn rgb(color: Color) -> RgbColor {
    color.to_rgb()
}

fn draw_redaction<D: WriterDocument>(
    doc: &mut D,
    page: u32,
    height: f32,
    block: &RedactionBlock,
) -> EngineResult<()> {
    let rect = block.rect;
    doc.draw_rectangle(
        page,
        &RectOp {
            x: rect.x,
            y: flip(&rect, height),
            width: rect.width,
            height: rect.height,
            stroke: None,
            fill: Some(rgb(block.fill)),
            opacity: 1.0,
            rotation: None,
        },
    )
}

fn draw_shape<D: WriterDocument>(
    doc: &mut D,
    page: u32,
    height: f32,
    shape: &ShapeAnnotation,
) -> EngineResult<()> {
    let stroke = (shape.stroke_width > 0.0).then(|| Stroke {
        color: rgb(shape.stroke),
        width: shape.stroke_width,
    });
    let opacity = shape.opacity * shape.stroke.alpha();

    match shape.geometry {
        ShapeGeometry::Rectangle { rect } => doc.draw_rectangle(
            page,
            &RectOp {
                x: rect.x,
                y: flip(&rect, height),
                width: rect.width,
                height: rect.height,
                stroke,
                fill: shape.fill.map(rgb),
                opacity,
                rotation: None,
            },
        ),
        ShapeGeometry::Highlight { rect } => doc.draw_rectangle(
            page,
            &RectOp {
                x: rect.x,
                y: flip(&rect, height),
                width: rect.width,
                height: rect.height,
                stroke: None,
                fill: Some(rgb(shape.fill.unwrap_or(shape.stroke))),
                opacity: shape.opacity,
                rotation: None,
            },
        ),
        ShapeGeometry::Ellipse { rect } => doc.draw_ellipse(
            page,
            &EllipseOp {
                cx: rect.x + rect.width / 2.0,
                cy: height - (rect.y + rect.height / 2.0),
                rx: rect.width / 2.0,
                ry: rect.height / 2.0,
                stroke,
                fill: shape.fill.map(rgb),
                opacity,
            },
        ),
        ShapeGeometry::Line { start, end } => doc.draw_line(
            page,
            &LineOp {
                start: point(start, height),
                end: point(end, height),
                stroke: Stroke {
                    color: rgb(shape.stroke),
                    width: shape.stroke_width.max(0.1),
                },
                opacity,
            },
        ),
    }
}

fn draw_ink<D: WriterDocument>(
    doc: &mut D,
    page: u32,
    height: f32,
    stroke: &InkStroke,
) -> EngineResult<()> {
    doc.draw_polyline(
        page,
        &PolylineOp {
            points: stroke.points.iter().map(|p| point(*p, height)).collect(),
            stroke: Stroke {
                color: rgb(stroke.color),
                width: stroke.width,
            },
            opacity: stroke.opacity * stroke.color.alpha(),
        },
    )
}

/// Fill a detected field or create a new one
fn write_field<D: WriterDocument>(doc: &mut D, field: &FormField) -> EngineResult<()> {
    match field.origin {
        FieldOrigin::Detected => match &field.kind {
            FormFieldKind::Text { value, .. } => doc.set_text_field(&field.name, value),
            FormFieldKind::Checkbox { checked } => doc.set_checkbox(&field.name, *checked),
            FormFieldKind::Choice {
                selected: Some(selected),
                ..
            } => doc.set_choice(&field.name, selected),
            FormFieldKind::Choice { selected: None, .. } => Ok(()),
        },
        FieldOrigin::Created => {
            let height = doc.page_size(field.page)?.height_pt;
            let rect = field.rect;
            let value = match &field.kind {
                FormFieldKind::Text { value, multiline } => FieldValue::Text {
                    value: value.clone(),
                    multiline: *multiline,
                },
                FormFieldKind::Checkbox { checked } => FieldValue::Checkbox(*checked),
                FormFieldKind::Choice { options, selected } => FieldValue::Choice {
                    options: options.clone(),
                    selected: selected.clone(),
                },
            };
            doc.create_field(&FieldSpec {
                name: field.name.clone(),
                page: field.page,
                rect: [rect.x, height - rect.y - rect.height, rect.right(), height - rect.y],
                value,
                font_size: field.font_size,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::config::EditorConfig;
    use crate::element::{ImageKind, TextStyle};
    use crate::tools::ToolKind;
    use crate::transform::PointerPoint;
    use folio_engine::fixtures::DocumentBuilder;
    use folio_engine::{EngineError, LopdfRenderer, LopdfWriter, PageSize, Rotation};

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Text(u32, TextOp),
        Rect(u32, RectOp),
        Ellipse(u32, EllipseOp),
        Line(u32, LineOp),
        Polyline(u32, PolylineOp),
        Image(u32, ImageOp),
        Rotation(u32, u16),
        SetText(String, String),
        SetCheckbox(String, bool),
        SetChoice(String, String),
        Create(FieldSpec),
        Flatten,
    }

    type Log = Rc<RefCell<Vec<Call>>>;

    /// Writer that records every call into a shared log
    #[derive(Default)]
    struct RecordingWriter {
        pages: usize,
        log: Log,
        fail_images: bool,
        fail_save: bool,
    }

    struct RecordingDocument {
        pages: usize,
        log: Log,
        fonts: u32,
        images: u32,
        fail_images: bool,
        fail_save: bool,
    }

    impl RecordingWriter {
        fn letter(pages: usize) -> Self {
            Self {
                pages,
                ..Self::default()
            }
        }

        fn calls(&self) -> Vec<Call> {
            self.log.borrow().clone()
        }
    }

    impl Writer for RecordingWriter {
        type Document = RecordingDocument;

        fn load(&self, _bytes: &[u8]) -> EngineResult<RecordingDocument> {
            Ok(RecordingDocument {
                pages: self.pages,
                log: Rc::clone(&self.log),
                fonts: 0,
                images: 0,
                fail_images: self.fail_images,
                fail_save: self.fail_save,
            })
        }
    }

    impl RecordingDocument {
        fn record(&mut self, call: Call) -> EngineResult<()> {
            self.log.borrow_mut().push(call);
            Ok(())
        }
    }

    impl WriterDocument for RecordingDocument {
        fn page_count(&self) -> u32 {
            self.pages as u32
        }

        fn page_size(&self, page: u32) -> EngineResult<PageSize> {
            if page == 0 || page as usize > self.pages {
                return Err(EngineError::PageOutOfRange {
                    page,
                    page_count: self.pages as u32,
                });
            }
            Ok(PageSize::LETTER)
        }

        fn embed_font(&mut self, _font: &FontData) -> EngineResult<FontHandle> {
            self.fonts += 1;
            Ok(FontHandle::from_raw(self.fonts))
        }

        fn embed_image(&mut self, _bytes: &[u8]) -> EngineResult<ImageHandle> {
            if self.fail_images {
                return Err(EngineError::Backend("corrupt image".into()));
            }
            self.images += 1;
            Ok(ImageHandle::from_raw(self.images))
        }

        fn draw_text(&mut self, page: u32, op: &TextOp) -> EngineResult<()> {
            self.record(Call::Text(page, op.clone()))
        }

        fn draw_rectangle(&mut self, page: u32, op: &RectOp) -> EngineResult<()> {
            self.record(Call::Rect(page, op.clone()))
        }

        fn draw_ellipse(&mut self, page: u32, op: &EllipseOp) -> EngineResult<()> {
            self.record(Call::Ellipse(page, op.clone()))
        }

        fn draw_line(&mut self, page: u32, op: &LineOp) -> EngineResult<()> {
            self.record(Call::Line(page, op.clone()))
        }

        fn draw_polyline(&mut self, page: u32, op: &PolylineOp) -> EngineResult<()> {
            self.record(Call::Polyline(page, op.clone()))
        }

        fn draw_image(&mut self, page: u32, op: &ImageOp) -> EngineResult<()> {
            self.record(Call::Image(page, op.clone()))
        }

        fn set_rotation(&mut self, page: u32, degrees: u16) -> EngineResult<()> {
            self.record(Call::Rotation(page, degrees))
        }

        fn field_names(&self) -> Vec<String> {
            Vec::new()
        }

        fn set_text_field(&mut self, name: &str, value: &str) -> EngineResult<()> {
            self.record(Call::SetText(name.into(), value.into()))
        }

        fn set_checkbox(&mut self, name: &str, checked: bool) -> EngineResult<()> {
            self.record(Call::SetCheckbox(name.into(), checked))
        }

        fn set_choice(&mut self, name: &str, value: &str) -> EngineResult<()> {
            self.record(Call::SetChoice(name.into(), value.into()))
        }

        fn create_field(&mut self, spec: &FieldSpec) -> EngineResult<()> {
            self.record(Call::Create(spec.clone()))
        }

        fn flatten_form(&mut self) -> EngineResult<()> {
            self.record(Call::Flatten)
        }

        fn save(self) -> EngineResult<Vec<u8>> {
            if self.fail_save {
                return Err(EngineError::Backend("disk full".into()));
            }
            Ok(b"%PDF-recorded".to_vec())
        }
    }

    fn session_with(bytes: Vec<u8>, file_name: &str) -> Session<LopdfRenderer> {
        Session::open(
            LopdfRenderer::new(),
            bytes,
            file_name,
            EditorConfig::default(),
            FontService::new(),
        )
        .unwrap()
    }

    fn letter_session(pages: usize) -> Session<LopdfRenderer> {
        let mut builder = DocumentBuilder::new();
        for _ in 0..pages {
            builder = builder.page(612.0, 792.0);
        }
        session_with(builder.build().unwrap(), "contract.pdf")
    }

    fn drawings(calls: &[Call]) -> Vec<&Call> {
        calls
            .iter()
            .filter(|call| !matches!(call, Call::Flatten))
            .collect()
    }

    #[test]
    fn test_text_baseline_is_flipped() {
        let mut session = letter_session(1);
        let style = TextStyle {
            font_size: 14.0,
            ..TextStyle::default()
        };
        session
            .add_element(Element::Text(TextBox::new(
                1,
                DocRect::new(100.0, 700.0, 200.0, 40.0),
                "Hello\nWorld",
                style,
            )))
            .unwrap();

        let writer = RecordingWriter::letter(1);
        let report = export(&mut session, &writer).unwrap();
        assert!(report.is_complete());

        let calls = writer.calls();
        let texts: Vec<&TextOp> = calls
            .iter()
            .filter_map(|call| match call {
                Call::Text(1, op) => Some(op),
                _ => None,
            })
            .collect();
        assert_eq!(texts.len(), 2);
        assert_eq!(texts[0].x, 100.0);
        assert_eq!(texts[0].y, 78.0);
        assert!((texts[1].y - (78.0 - 14.0 * LINE_SPACING)).abs() < 1e-4);
        assert_eq!(texts[0].rotation, None);
        assert_eq!(texts[0].font, texts[1].font);
    }

    #[test]
    fn test_alignment_uses_estimated_width() {
        let mut session = letter_session(1);
        let style = TextStyle {
            font_size: 10.0,
            align: TextAlign::Right,
            ..TextStyle::default()
        };
        session
            .add_element(Element::Text(TextBox::new(
                1,
                DocRect::new(0.0, 0.0, 100.0, 20.0),
                "abcd",
                style,
            )))
            .unwrap();

        let writer = RecordingWriter::letter(1);
        export(&mut session, &writer).unwrap();
        let Some(Call::Text(_, op)) = writer.calls().first().cloned() else {
            panic!("expected a text draw");
        };
        assert_eq!(op.x, 80.0);
    }

    #[test]
    fn test_rotated_text_pivots_about_its_centre() {
        let mut session = letter_session(1);
        let mut text = TextBox::new(
            1,
            DocRect::new(100.0, 100.0, 100.0, 20.0),
            "tilted",
            TextStyle::default(),
        );
        text.rotation = 30.0;
        session.add_element(Element::Text(text)).unwrap();

        let writer = RecordingWriter::letter(1);
        export(&mut session, &writer).unwrap();
        let Some(Call::Text(_, op)) = writer.calls().first().cloned() else {
            panic!("expected a text draw");
        };
        assert_eq!(
            op.rotation,
            Some(Pivot {
                x: 150.0,
                y: 792.0 - 110.0,
                degrees: -30.0,
            })
        );
    }

    #[test]
    fn test_three_page_scenario_with_undo() {
        let mut session = letter_session(3);

        session.set_page(2).unwrap();
        session.activate_tool(ToolKind::Rectangle);
        session.pointer_down(PointerPoint::new(50.0, 50.0));
        session.pointer_up(PointerPoint::new(150.0, 90.0));

        session.rotate_clockwise();
        session.activate_tool(ToolKind::Highlight);
        session.pointer_down(PointerPoint::new(300.0, 200.0));
        session.pointer_up(PointerPoint::new(400.0, 260.0));
        assert!(session.undo());

        let writer = RecordingWriter::letter(3);
        let report = export(&mut session, &writer).unwrap();
        assert_eq!(report.file_name, "contract_edited.pdf");

        let calls = writer.calls();
        let drawn = drawings(&calls);
        assert_eq!(drawn.len(), 1, "unexpected calls {calls:?}");
        let Call::Rect(2, op) = drawn[0] else {
            panic!("expected one rectangle on page 2, got {calls:?}");
        };
        assert_eq!(
            (op.x, op.y, op.width, op.height),
            (50.0, 792.0 - 50.0 - 40.0, 100.0, 40.0)
        );
        assert!(op.stroke.is_some());

        let exported = export(&mut session, &LopdfWriter::new()).unwrap();
        let mut renderer = LopdfRenderer::new();
        let handle = renderer.load_document(&exported.bytes).unwrap();
        assert_eq!(renderer.page_count(handle).unwrap(), 3);
    }

    #[test]
    fn test_shapes_ink_and_redactions() {
        let mut session = letter_session(1);
        session
            .add_element(Element::Shape(ShapeAnnotation::new(
                1,
                ShapeGeometry::Ellipse {
                    rect: DocRect::new(100.0, 100.0, 40.0, 20.0),
                },
                Color::RED,
                1.0,
            )))
            .unwrap();
        session
            .add_element(Element::Shape(ShapeAnnotation::new(
                1,
                ShapeGeometry::Line {
                    start: DocPoint::new(0.0, 0.0),
                    end: DocPoint::new(10.0, 20.0),
                },
                Color::BLUE,
                2.0,
            )))
            .unwrap();
        session
            .add_element(Element::Ink(InkStroke::new(
                1,
                vec![DocPoint::new(0.0, 0.0), DocPoint::new(30.0, 30.0)],
                Color::BLUE,
                3.0,
            )))
            .unwrap();
        session
            .add_element(Element::Redaction(RedactionBlock::new(
                1,
                DocRect::new(10.0, 10.0, 20.0, 20.0),
            )))
            .unwrap();

        let writer = RecordingWriter::letter(1);
        export(&mut session, &writer).unwrap();
        let calls = writer.calls();
        let drawn = drawings(&calls);
        assert_eq!(drawn.len(), 4);

        // Redactions sit at the bottom of the stack
        let Call::Rect(1, redaction) = drawn[0] else {
            panic!("expected the redaction first, got {calls:?}");
        };
        assert_eq!(redaction.fill, Some(RgbColor::BLACK));
        assert_eq!(redaction.y, 792.0 - 30.0);

        assert!(calls.iter().any(|call| matches!(call,
            Call::Ellipse(1, op) if op.cx == 120.0 && op.cy == 792.0 - 110.0 && op.rx == 20.0)));
        assert!(calls.iter().any(|call| matches!(call,
            Call::Line(1, op) if op.start == (0.0, 792.0) && op.end == (10.0, 772.0))));
        assert!(calls.iter().any(|call| matches!(call,
            Call::Polyline(1, op) if op.points == vec![(0.0, 792.0), (30.0, 762.0)])));
    }

    #[test]
    fn test_failed_image_is_reported() {
        let mut session = letter_session(1);
        let mut png = Vec::new();
        image::RgbaImage::new(1, 1)
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();
        let id = session
            .insert_image(1, DocRect::new(0.0, 0.0, 50.0, 50.0), png, ImageKind::Picture)
            .unwrap();

        let writer = RecordingWriter {
            fail_images: true,
            ..RecordingWriter::letter(1)
        };
        let report = export(&mut session, &writer).unwrap();
        assert!(!report.is_complete());
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].element, id);
        assert_eq!(report.failures[0].kind, LayerKind::Image);
        assert_eq!(report.failures[0].page, 1);
        assert_eq!(writer.calls().last(), Some(&Call::Flatten));
    }

    #[test]
    fn test_save_failure_is_fatal() {
        let mut session = letter_session(1);
        let writer = RecordingWriter {
            fail_save: true,
            ..RecordingWriter::letter(1)
        };
        assert!(matches!(
            export(&mut session, &writer),
            Err(EditorError::ExportFatal(_))
        ));
    }

    #[test]
    fn test_rotation_and_fields_follow_drawing() {
        let bytes = DocumentBuilder::new()
            .page(612.0, 792.0)
            .text_field("name", [100.0, 700.0, 300.0, 720.0], "")
            .build()
            .unwrap();
        let mut session = session_with(bytes, "form.pdf");
        let detected = session.field_by_name("name").unwrap().id;
        session
            .set_field_value(
                detected,
                FormFieldKind::Text {
                    value: "Ada".into(),
                    multiline: false,
                },
            )
            .unwrap();
        session
            .add_element(Element::FormField(FormField::new(
                1,
                DocRect::new(10.0, 20.0, 100.0, 30.0),
                "created",
                FormFieldKind::Checkbox { checked: true },
            )))
            .unwrap();
        session
            .add_element(Element::Redaction(RedactionBlock::new(
                1,
                DocRect::new(0.0, 0.0, 20.0, 20.0),
            )))
            .unwrap();
        session.rotate_page(1, Rotation::Deg90).unwrap();

        let writer = RecordingWriter::letter(1);
        export(&mut session, &writer).unwrap();
        let calls = writer.calls();

        let position = |wanted: &dyn Fn(&Call) -> bool| calls.iter().position(|c| wanted(c));
        let drawn = position(&|c| matches!(c, Call::Rect(..))).unwrap();
        let rotated = position(&|c| *c == Call::Rotation(1, 90)).unwrap();
        let filled = position(&|c| *c == Call::SetText("name".into(), "Ada".into())).unwrap();
        let flattened = position(&|c| *c == Call::Flatten).unwrap();
        assert!(drawn < rotated && rotated < filled && filled < flattened);

        let created = calls.iter().find_map(|call| match call {
            Call::Create(spec) => Some(spec.clone()),
            _ => None,
        });
        let created = created.unwrap();
        assert_eq!(created.name, "created");
        assert_eq!(created.rect, [10.0, 742.0, 110.0, 772.0]);
        assert_eq!(created.value, FieldValue::Checkbox(true));
    }

    #[test]
    fn test_unselected_choice_is_left_alone() {
        let mut session = letter_session(1);
        let mut field = FormField::new(
            1,
            DocRect::new(10.0, 20.0, 100.0, 30.0),
            "pick",
            FormFieldKind::Choice {
                options: vec!["a".into(), "b".into()],
                selected: None,
            },
        );
        field.origin = FieldOrigin::Detected;
        session.add_element(Element::FormField(field)).unwrap();

        let writer = RecordingWriter::letter(1);
        let report = export(&mut session, &writer).unwrap();
        assert!(report.is_complete());
        assert_eq!(writer.calls(), vec![Call::Flatten]);
    }

    #[test]
    fn test_lopdf_round_trip_keeps_text() {
        let mut session = letter_session(1);
        session
            .add_element(Element::Text(TextBox::new(
                1,
                DocRect::new(72.0, 72.0, 200.0, 20.0),
                "Exported",
                TextStyle::default(),
            )))
            .unwrap();
        let report = export(&mut session, &LopdfWriter::new()).unwrap();
        assert!(report.is_complete());

        let mut renderer = LopdfRenderer::new();
        let handle = renderer.load_document(&report.bytes).unwrap();
        let items = renderer.text_content(handle, 1).unwrap();
        assert!(items.iter().any(|item| item.text.contains("Exported")));
    }
}
