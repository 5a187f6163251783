//! AcroForm filling, field creation and flattening for [`LopdfDocument`]

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Object, ObjectId, Stream, StringFormat};

use crate::error::{EngineError, EngineResult};
use crate::lopdf_writer::{op, real, LopdfDocument};
use crate::objects::{
    self, object_text, rect_from, reference_array, set_page_resource, text_string, winansi_bytes,
};
use crate::renderer::{font_size_from_da, qualified_name};
use crate::writer::{FieldSpec, FieldValue};

const FF_MULTILINE: i64 = 1 << 12;
const FF_COMBO: i64 = 1 << 17;
const ANNOT_HIDDEN: i64 = 1 << 1;
const ANNOT_PRINT: i64 = 1 << 2;

const FORM_FONT: &str = "Helv";
const DEFAULT_FONT_SIZE: f32 = 12.0;
const ON_STATE: &str = "Yes";

impl LopdfDocument {
    fn root_id(&self) -> EngineResult<ObjectId> {
        Ok(self.doc.trailer.get(b"Root").and_then(Object::as_reference)?)
    }

    /// Top-level `/Fields` of the AcroForm, empty when the document has no form
    pub(crate) fn top_level_fields(&self) -> Vec<ObjectId> {
        let Ok(catalog) = self.doc.catalog() else {
            return Vec::new();
        };
        let Ok(acroform) = catalog.get(b"AcroForm") else {
            return Vec::new();
        };
        match objects::resolve(&self.doc, acroform).as_dict() {
            Ok(form) => form
                .get(b"Fields")
                .map(|fields| reference_array(&self.doc, fields))
                .unwrap_or_default(),
            Err(_) => Vec::new(),
        }
    }

    /// Fields that carry values, with their fully qualified names
    pub(crate) fn terminal_fields(&self) -> Vec<(String, ObjectId)> {
        let mut out = Vec::new();
        let mut stack: Vec<ObjectId> = self.top_level_fields();
        stack.reverse();
        let mut visited = 0usize;

        while let Some(id) = stack.pop() {
            visited += 1;
            if visited > 10_000 {
                break;
            }
            let Ok(dict) = self.doc.get_dictionary(id) else {
                continue;
            };
            let child_fields: Vec<ObjectId> = dict
                .get(b"Kids")
                .map(|kids| reference_array(&self.doc, kids))
                .unwrap_or_default()
                .into_iter()
                .filter(|kid| {
                    self.doc
                        .get_dictionary(*kid)
                        .map(|kid| kid.has(b"T"))
                        .unwrap_or(false)
                })
                .collect();

            if child_fields.is_empty() {
                out.push((qualified_name(&self.doc, id), id));
            } else {
                stack.extend(child_fields.into_iter().rev());
            }
        }
        out
    }

    fn find_field(&self, name: &str) -> EngineResult<ObjectId> {
        self.terminal_fields()
            .into_iter()
            .find(|(qualified, _)| qualified == name)
            .map(|(_, id)| id)
            .ok_or_else(|| EngineError::FieldNotFound(name.to_owned()))
    }

    /// Widget annotations of a terminal field (the field itself when merged)
    fn widgets(&self, field: ObjectId) -> Vec<ObjectId> {
        let kids = self
            .doc
            .get_dictionary(field)
            .ok()
            .and_then(|dict| dict.get(b"Kids").ok())
            .map(|kids| reference_array(&self.doc, kids))
            .unwrap_or_default();
        if kids.is_empty() {
            vec![field]
        } else {
            kids
        }
    }

    fn dict_mut(&mut self, id: ObjectId) -> EngineResult<&mut Dictionary> {
        Ok(self.doc.get_object_mut(id).and_then(Object::as_dict_mut)?)
    }

    /// Helvetica font object shared by generated appearance streams
    fn form_font_id(&mut self) -> ObjectId {
        if let Some(id) = self.form_font {
            return id;
        }
        let id = self.doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
        });
        self.form_font = Some(id);
        id
    }

    fn field_font_size(&self, widget: ObjectId) -> f32 {
        objects::inherited(&self.doc, widget, b"DA")
            .and_then(|da| object_text(&self.doc, da))
            .and_then(|da| font_size_from_da(&da))
            .unwrap_or(0.0)
    }

    fn is_multiline(&self, field: ObjectId) -> bool {
        objects::inherited(&self.doc, field, b"Ff")
            .and_then(|flags| flags.as_i64().ok())
            .is_some_and(|flags| flags & FF_MULTILINE != 0)
    }

    fn widget_rect(&self, widget: ObjectId) -> EngineResult<[f32; 4]> {
        self.doc
            .get_dictionary(widget)?
            .get(b"Rect")
            .ok()
            .and_then(|rect| rect_from(&self.doc, rect))
            .ok_or_else(|| EngineError::Backend(format!("widget {widget:?} has no /Rect")))
    }

    fn form_xobject(
        &mut self,
        width: f32,
        height: f32,
        resources: Dictionary,
        ops: Vec<Operation>,
    ) -> EngineResult<ObjectId> {
        let content = Content { operations: ops }.encode()?;
        let dict = dictionary! {
            "Type" => "XObject",
            "Subtype" => "Form",
            "BBox" => vec![real(0.0), real(0.0), real(width), real(height)],
            "Resources" => resources,
        };
        Ok(self.doc.add_object(Stream::new(dict, content)))
    }

    /// Appearance stream showing `value` inside a text or choice widget
    fn text_appearance(
        &mut self,
        rect: [f32; 4],
        value: &str,
        size: f32,
        multiline: bool,
    ) -> EngineResult<ObjectId> {
        let width = rect[2] - rect[0];
        let height = rect[3] - rect[1];
        let size = if size > 0.0 {
            size
        } else {
            (height * 0.7).clamp(4.0, DEFAULT_FONT_SIZE)
        };
        let font_id = self.form_font_id();

        let lines: Vec<String> = if multiline {
            value.lines().map(str::to_owned).collect()
        } else {
            vec![value.replace(['\r', '\n'], " ")]
        };
        let first_baseline = if multiline {
            height - 2.0 - size
        } else {
            (height - size) / 2.0 + size * 0.22
        };

        let mut ops = vec![
            op("BMC", vec![Object::Name(b"Tx".to_vec())]),
            op("q", vec![]),
            op("re", vec![real(1.0), real(1.0), real(width - 2.0), real(height - 2.0)]),
            op("W", vec![]),
            op("n", vec![]),
            op("BT", vec![]),
            op("Tf", vec![Object::Name(FORM_FONT.as_bytes().to_vec()), real(size)]),
            op("g", vec![real(0.0)]),
            op("Td", vec![real(2.0), real(first_baseline)]),
        ];
        for (index, line) in lines.iter().enumerate() {
            if index > 0 {
                ops.push(op("Td", vec![real(0.0), real(-size * 1.15)]));
            }
            ops.push(op(
                "Tj",
                vec![Object::String(winansi_bytes(line), StringFormat::Literal)],
            ));
        }
        ops.extend([op("ET", vec![]), op("Q", vec![]), op("EMC", vec![])]);

        let resources = dictionary! {
            "Font" => dictionary! { FORM_FONT => font_id },
        };
        self.form_xobject(width, height, resources, ops)
    }

    /// On and off appearance streams for a checkbox widget
    fn checkbox_appearances(&mut self, rect: [f32; 4]) -> EngineResult<(ObjectId, ObjectId)> {
        let width = rect[2] - rect[0];
        let height = rect[3] - rect[1];
        let inset = (width.min(height) * 0.2).max(1.0);

        let on = self.form_xobject(
            width,
            height,
            Dictionary::new(),
            vec![
                op("q", vec![]),
                op("G", vec![real(0.0)]),
                op("w", vec![real((width.min(height) * 0.1).max(0.5))]),
                op("J", vec![Object::Integer(1)]),
                op("m", vec![real(inset), real(inset)]),
                op("l", vec![real(width - inset), real(height - inset)]),
                op("m", vec![real(inset), real(height - inset)]),
                op("l", vec![real(width - inset), real(inset)]),
                op("S", vec![]),
                op("Q", vec![]),
            ],
        )?;
        let off = self.form_xobject(width, height, Dictionary::new(), Vec::new())?;
        Ok((on, off))
    }

    /// Name of the "on" appearance state of a checkbox widget
    fn on_state(&self, widget: ObjectId) -> Option<Vec<u8>> {
        let dict = self.doc.get_dictionary(widget).ok()?;
        let appearances = objects::resolve(&self.doc, dict.get(b"AP").ok()?).as_dict().ok()?;
        let normal = objects::resolve(&self.doc, appearances.get(b"N").ok()?).as_dict().ok()?;
        normal
            .iter()
            .map(|(key, _)| key.clone())
            .find(|key| key.as_slice() != b"Off")
    }

    fn set_value_appearance(&mut self, field: ObjectId, value: &str) -> EngineResult<()> {
        let multiline = self.is_multiline(field);
        for widget in self.widgets(field) {
            let rect = self.widget_rect(widget)?;
            let size = self.field_font_size(widget);
            let appearance = self.text_appearance(rect, value, size, multiline)?;
            self.dict_mut(widget)?
                .set("AP", dictionary! { "N" => appearance });
        }
        Ok(())
    }

    pub(crate) fn fill_text(&mut self, name: &str, value: &str) -> EngineResult<()> {
        let field = self.find_field(name)?;
        self.dict_mut(field)?.set("V", text_string(value));
        self.set_value_appearance(field, value)
    }

    pub(crate) fn fill_choice(&mut self, name: &str, value: &str) -> EngineResult<()> {
        let field = self.find_field(name)?;
        self.dict_mut(field)?.set("V", text_string(value));
        self.set_value_appearance(field, value)
    }

    pub(crate) fn fill_checkbox(&mut self, name: &str, checked: bool) -> EngineResult<()> {
        let field = self.find_field(name)?;
        let mut field_state = b"Off".to_vec();

        for widget in self.widgets(field) {
            let on = match self.on_state(widget) {
                Some(on) => on,
                None => {
                    let rect = self.widget_rect(widget)?;
                    let (on_id, off_id) = self.checkbox_appearances(rect)?;
                    self.dict_mut(widget)?.set(
                        "AP",
                        dictionary! {
                            "N" => dictionary! { ON_STATE => on_id, "Off" => off_id },
                        },
                    );
                    ON_STATE.as_bytes().to_vec()
                }
            };
            let state = if checked { on } else { b"Off".to_vec() };
            if checked {
                field_state = state.clone();
            }
            self.dict_mut(widget)?.set("AS", Object::Name(state));
        }

        self.dict_mut(field)?.set("V", Object::Name(field_state));
        Ok(())
    }

    /// Append `id` to the AcroForm's `/Fields`, creating the form if needed
    pub(crate) fn register_field(&mut self, id: ObjectId) -> EngineResult<()> {
        let root_id = self.root_id()?;
        let existing = self
            .doc
            .get_dictionary(root_id)?
            .get(b"AcroForm")
            .ok()
            .cloned();

        let form_id = match existing {
            Some(Object::Reference(form_id)) => form_id,
            Some(Object::Dictionary(inline)) => {
                let form_id = self.doc.add_object(inline);
                self.dict_mut(root_id)?.set("AcroForm", form_id);
                form_id
            }
            _ => {
                let font_id = self.form_font_id();
                let form_id = self.doc.add_object(dictionary! {
                    "Fields" => Vec::<Object>::new(),
                    "DA" => Object::string_literal("/Helv 0 Tf 0 g"),
                    "DR" => dictionary! {
                        "Font" => dictionary! { FORM_FONT => font_id },
                    },
                });
                self.dict_mut(root_id)?.set("AcroForm", form_id);
                form_id
            }
        };

        let fields = self.dict_mut(form_id)?.get(b"Fields").ok().cloned();
        match fields {
            Some(Object::Reference(array_id)) => {
                self.doc
                    .get_object_mut(array_id)
                    .and_then(Object::as_array_mut)?
                    .push(Object::Reference(id));
            }
            Some(Object::Array(mut items)) => {
                items.push(Object::Reference(id));
                self.dict_mut(form_id)?.set("Fields", items);
            }
            _ => {
                self.dict_mut(form_id)?
                    .set("Fields", vec![Object::Reference(id)]);
            }
        }
        Ok(())
    }

    /// Add an annotation reference to a page's `/Annots`
    fn attach_annotation(&mut self, page_id: ObjectId, id: ObjectId) -> EngineResult<()> {
        let annots = self.dict_mut(page_id)?.get(b"Annots").ok().cloned();
        match annots {
            Some(Object::Reference(array_id)) => {
                self.doc
                    .get_object_mut(array_id)
                    .and_then(Object::as_array_mut)?
                    .push(Object::Reference(id));
            }
            Some(Object::Array(mut items)) => {
                items.push(Object::Reference(id));
                self.dict_mut(page_id)?.set("Annots", items);
            }
            _ => {
                self.dict_mut(page_id)?
                    .set("Annots", vec![Object::Reference(id)]);
            }
        }
        Ok(())
    }

    pub(crate) fn add_field(&mut self, spec: &FieldSpec) -> EngineResult<()> {
        if spec.name.is_empty() || spec.name.contains('.') {
            return Err(EngineError::Backend(format!(
                "invalid field name {:?}",
                spec.name
            )));
        }
        if self.find_field(&spec.name).is_ok() {
            return Err(EngineError::Backend(format!(
                "field {:?} already exists",
                spec.name
            )));
        }
        let page_id = self.page_id(spec.page)?;
        let size = if spec.font_size > 0.0 {
            spec.font_size
        } else {
            DEFAULT_FONT_SIZE
        };

        let mut dict = dictionary! {
            "Type" => "Annot",
            "Subtype" => "Widget",
            "T" => text_string(&spec.name),
            "Rect" => objects::rect_object(spec.rect),
            "F" => ANNOT_PRINT,
            "P" => page_id,
            "DA" => Object::string_literal(format!("/{FORM_FONT} {size} Tf 0 g")),
        };
        match &spec.value {
            FieldValue::Text { multiline, .. } => {
                dict.set("FT", "Tx");
                if *multiline {
                    dict.set("Ff", FF_MULTILINE);
                }
            }
            FieldValue::Checkbox(_) => {
                dict.set("FT", "Btn");
            }
            FieldValue::Choice { options, .. } => {
                dict.set("FT", "Ch");
                dict.set("Ff", FF_COMBO);
                dict.set(
                    "Opt",
                    options.iter().map(|option| text_string(option)).collect::<Vec<_>>(),
                );
            }
        }

        let id = self.doc.add_object(dict);
        self.attach_annotation(page_id, id)?;
        self.register_field(id)?;
        match &spec.value {
            FieldValue::Text { value, .. } => self.fill_text(&spec.name, value),
            FieldValue::Checkbox(checked) => self.fill_checkbox(&spec.name, *checked),
            FieldValue::Choice { selected, .. } => {
                self.fill_choice(&spec.name, selected.as_deref().unwrap_or(""))
            }
        }
    }

    /// Normal appearance stream of a widget for its current state
    fn appearance_stream(&self, widget: &Dictionary) -> Option<ObjectId> {
        let appearances = objects::resolve(&self.doc, widget.get(b"AP").ok()?).as_dict().ok()?;
        match appearances.get(b"N").ok()? {
            Object::Reference(id) => match self.doc.get_object(*id).ok()? {
                Object::Stream(_) => Some(*id),
                Object::Dictionary(states) => {
                    let state = widget.get(b"AS").and_then(Object::as_name).ok()?;
                    states.get(state).and_then(Object::as_reference).ok()
                }
                _ => None,
            },
            Object::Dictionary(states) => {
                let state = widget.get(b"AS").and_then(Object::as_name).ok()?;
                states.get(state).and_then(Object::as_reference).ok()
            }
            _ => None,
        }
    }

    /// Draw each widget's appearance into its page and remove the form
    pub(crate) fn flatten(&mut self) -> EngineResult<()> {
        let mut flattened = 0usize;

        for page_id in self.page_ids.clone() {
            let annots = match self.doc.get_dictionary(page_id)?.get(b"Annots") {
                Ok(annots) => reference_array(&self.doc, annots),
                Err(_) => continue,
            };

            let mut kept = Vec::new();
            let mut placements = Vec::new();
            for annot in annots {
                let Ok(dict) = self.doc.get_dictionary(annot) else {
                    continue;
                };
                let is_widget = dict
                    .get(b"Subtype")
                    .and_then(Object::as_name)
                    .is_ok_and(|subtype| subtype == b"Widget");
                if !is_widget {
                    kept.push(Object::Reference(annot));
                    continue;
                }
                let hidden = dict
                    .get(b"F")
                    .and_then(Object::as_i64)
                    .is_ok_and(|flags| flags & ANNOT_HIDDEN != 0);
                if hidden {
                    continue;
                }
                if let (Some(stream), Some(rect)) = (
                    self.appearance_stream(dict),
                    dict.get(b"Rect").ok().and_then(|rect| rect_from(&self.doc, rect)),
                ) {
                    placements.push((stream, rect));
                }
            }

            let mut ops = Vec::new();
            for (stream_id, rect) in placements {
                let bbox = self.prepare_form_xobject(stream_id, rect)?;
                let resource = format!("FolioFx{}", self.next_xobject);
                self.next_xobject += 1;
                set_page_resource(
                    &mut self.doc,
                    page_id,
                    b"XObject",
                    &resource,
                    Object::Reference(stream_id),
                )?;

                let sx = (rect[2] - rect[0]) / (bbox[2] - bbox[0]).max(f32::EPSILON);
                let sy = (rect[3] - rect[1]) / (bbox[3] - bbox[1]).max(f32::EPSILON);
                ops.extend([
                    op("q", vec![]),
                    op(
                        "cm",
                        vec![
                            real(sx),
                            real(0.0),
                            real(0.0),
                            real(sy),
                            real(rect[0] - bbox[0] * sx),
                            real(rect[1] - bbox[1] * sy),
                        ],
                    ),
                    op("Do", vec![Object::Name(resource.into_bytes())]),
                    op("Q", vec![]),
                ]);
                flattened += 1;
            }
            if !ops.is_empty() {
                self.append(page_id, ops)?;
            }

            let page = self.dict_mut(page_id)?;
            if kept.is_empty() {
                page.remove(b"Annots");
            } else {
                page.set("Annots", kept);
            }
        }

        let root_id = self.root_id()?;
        self.dict_mut(root_id)?.remove(b"AcroForm");
        tracing::debug!(widgets = flattened, "form flattened");
        Ok(())
    }

    /// Make sure an appearance stream is a usable form XObject; returns its BBox
    fn prepare_form_xobject(
        &mut self,
        stream_id: ObjectId,
        rect: [f32; 4],
    ) -> EngineResult<[f32; 4]> {
        let stream = self
            .doc
            .get_object_mut(stream_id)
            .and_then(Object::as_stream_mut)?;
        stream.dict.set("Type", "XObject");
        stream.dict.set("Subtype", "Form");

        let bbox = stream
            .dict
            .get(b"BBox")
            .ok()
            .and_then(|obj| obj.as_array().ok())
            .filter(|array| array.len() == 4)
            .and_then(|array| {
                let values: Vec<f32> = array.iter().filter_map(objects::obj_to_f32).collect();
                <[f32; 4]>::try_from(values).ok()
            });

        Ok(match bbox {
            Some([x0, y0, x1, y1]) => [x0.min(x1), y0.min(y1), x0.max(x1), y0.max(y1)],
            None => {
                let fallback = [0.0, 0.0, rect[2] - rect[0], rect[3] - rect[1]];
                stream.dict.set("BBox", objects::rect_object(fallback));
                fallback
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::error::EngineError;
    use crate::fixtures::DocumentBuilder;
    use crate::lopdf_writer::LopdfWriter;
    use crate::renderer::{LopdfRenderer, Renderer, WidgetKind};
    use crate::writer::{FieldSpec, FieldValue, Writer, WriterDocument};

    fn form_document() -> Vec<u8> {
        DocumentBuilder::new()
            .page(612.0, 792.0)
            .text_field("applicant.name", [72.0, 700.0, 272.0, 720.0], "")
            .checkbox("agree", [72.0, 650.0, 86.0, 664.0], false)
            .build()
            .expect("fixture")
    }

    #[test]
    fn test_fills_fields_and_reports_names() {
        let writer = LopdfWriter::new();
        let mut document = writer.load(&form_document()).expect("load");

        let mut names = document.field_names();
        names.sort();
        assert_eq!(names, vec!["agree".to_owned(), "applicant.name".to_owned()]);

        document.set_text_field("applicant.name", "Grace").expect("text");
        document.set_checkbox("agree", true).expect("checkbox");
        let bytes = document.save().expect("save");

        let mut renderer = LopdfRenderer::new();
        let handle = renderer.load_document(&bytes).expect("reload");
        let widgets = renderer.annotations(handle, 1).expect("widgets");
        let name = widgets.iter().find(|w| w.name == "applicant.name").expect("name");
        assert_eq!(name.value.as_deref(), Some("Grace"));
        let agree = widgets.iter().find(|w| w.name == "agree").expect("agree");
        assert!(agree.checked);
    }

    #[test]
    fn test_unknown_field_is_reported() {
        let mut document = LopdfWriter::new().load(&form_document()).expect("load");
        let err = document
            .set_text_field("missing", "x")
            .expect_err("no such field");
        assert!(matches!(err, EngineError::FieldNotFound(name) if name == "missing"));
    }

    #[test]
    fn test_create_field_on_document_without_form() {
        let bytes = DocumentBuilder::new()
            .page(612.0, 792.0)
            .build()
            .expect("fixture");
        let mut document = LopdfWriter::new().load(&bytes).expect("load");
        document
            .create_field(&FieldSpec {
                name: "size".to_owned(),
                page: 1,
                rect: [100.0, 100.0, 200.0, 120.0],
                value: FieldValue::Choice {
                    options: vec!["S".to_owned(), "M".to_owned(), "L".to_owned()],
                    selected: Some("M".to_owned()),
                },
                font_size: 10.0,
            })
            .expect("create");
        assert_eq!(document.field_names(), vec!["size".to_owned()]);

        let duplicate = document.create_field(&FieldSpec {
            name: "size".to_owned(),
            page: 1,
            rect: [0.0, 0.0, 10.0, 10.0],
            value: FieldValue::Checkbox(true),
            font_size: 0.0,
        });
        assert!(duplicate.is_err());

        let bytes = document.save().expect("save");
        let mut renderer = LopdfRenderer::new();
        let handle = renderer.load_document(&bytes).expect("reload");
        let widgets = renderer.annotations(handle, 1).expect("widgets");
        assert_eq!(widgets.len(), 1);
        assert_eq!(
            widgets[0].kind,
            WidgetKind::Choice {
                options: vec!["S".to_owned(), "M".to_owned(), "L".to_owned()]
            }
        );
        assert_eq!(widgets[0].value.as_deref(), Some("M"));
    }

    #[test]
    fn test_flatten_removes_widgets_and_form() {
        let mut document = LopdfWriter::new().load(&form_document()).expect("load");
        document.set_text_field("applicant.name", "Grace").expect("text");
        document.flatten_form().expect("flatten");
        assert!(document.field_names().is_empty());

        let bytes = document.save().expect("save");
        let mut renderer = LopdfRenderer::new();
        let handle = renderer.load_document(&bytes).expect("reload");
        assert!(renderer.annotations(handle, 1).expect("widgets").is_empty());

        let reloaded = LopdfWriter::new().load(&bytes).expect("reload");
        let page_id = reloaded.page_id(1).expect("page");
        let content = reloaded.doc.get_page_content(page_id).expect("content");
        let ops = lopdf::content::Content::decode(&content).expect("decode").operations;
        let drawn = ops.iter().filter(|op| op.operator == "Do").count();
        assert_eq!(drawn, 2);
    }
}
