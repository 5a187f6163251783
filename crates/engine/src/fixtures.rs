//! Programmatic PDF fixtures for tests
//!
//! Available inside this crate's tests and, with the `test-support` feature,
//! to dependent crates.

use std::collections::HashMap;

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream, StringFormat};

use crate::error::EngineResult;
use crate::geometry::PageSize;
use crate::lopdf_writer::LopdfDocument;
use crate::objects::{rect_object, text_string, winansi_bytes};

#[derive(Debug, Clone)]
enum FixtureField {
    Text { name: String, rect: [f32; 4], value: String },
    Checkbox { name: String, rect: [f32; 4], checked: bool },
}

impl FixtureField {
    fn name(&self) -> &str {
        match self {
            FixtureField::Text { name, .. } | FixtureField::Checkbox { name, .. } => name,
        }
    }
}

#[derive(Debug, Clone)]
struct FixturePage {
    size: PageSize,
    texts: Vec<(f32, f32, f32, String)>,
    fields: Vec<FixtureField>,
}

/// Builds small multi-page PDFs with text and form widgets
#[derive(Debug, Clone, Default)]
pub struct DocumentBuilder {
    pages: Vec<FixturePage>,
}

/// Non-terminal fields created for dotted names
#[derive(Default)]
struct FieldTree {
    nodes: HashMap<String, ObjectId>,
    kids: HashMap<ObjectId, Vec<ObjectId>>,
    parents: HashMap<ObjectId, ObjectId>,
    roots: Vec<ObjectId>,
}

impl FieldTree {
    /// Object id of the field at `path`, creating ancestors as needed
    fn ensure(&mut self, doc: &mut Document, path: &str) -> ObjectId {
        if let Some(id) = self.nodes.get(path) {
            return *id;
        }
        let id = doc.new_object_id();
        match path.rsplit_once('.') {
            Some((parent_path, _)) => {
                let parent = self.ensure(doc, parent_path);
                self.adopt(parent, id);
            }
            None => self.roots.push(id),
        }
        self.nodes.insert(path.to_owned(), id);
        id
    }

    fn adopt(&mut self, parent: ObjectId, child: ObjectId) {
        self.kids.entry(parent).or_default().push(child);
        self.parents.insert(child, parent);
    }

    fn write(self, doc: &mut Document) {
        for (path, id) in &self.nodes {
            let partial = path.rsplit('.').next().unwrap_or(path);
            let mut dict = dictionary! {
                "T" => text_string(partial),
                "Kids" => self
                    .kids
                    .get(id)
                    .map(|kids| kids.iter().map(|kid| Object::Reference(*kid)).collect::<Vec<_>>())
                    .unwrap_or_default(),
            };
            if let Some(parent) = self.parents.get(id) {
                dict.set("Parent", *parent);
            }
            doc.objects.insert(*id, Object::Dictionary(dict));
        }
    }
}

impl DocumentBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new page
    pub fn page(mut self, width_pt: f32, height_pt: f32) -> Self {
        self.pages.push(FixturePage {
            size: PageSize::new(width_pt, height_pt),
            texts: Vec::new(),
            fields: Vec::new(),
        });
        self
    }

    fn current(&mut self) -> &mut FixturePage {
        if self.pages.is_empty() {
            self.pages.push(FixturePage {
                size: PageSize::LETTER,
                texts: Vec::new(),
                fields: Vec::new(),
            });
        }
        let last = self.pages.len() - 1;
        &mut self.pages[last]
    }

    /// Show `text` on the current page with its baseline at `(x, y)`
    pub fn text(mut self, x: f32, y: f32, size: f32, text: &str) -> Self {
        self.current().texts.push((x, y, size, text.to_owned()));
        self
    }

    /// Add a text field; dotted names create a field hierarchy
    pub fn text_field(mut self, name: &str, rect: [f32; 4], value: &str) -> Self {
        self.current().fields.push(FixtureField::Text {
            name: name.to_owned(),
            rect,
            value: value.to_owned(),
        });
        self
    }

    pub fn checkbox(mut self, name: &str, rect: [f32; 4], checked: bool) -> Self {
        self.current().fields.push(FixtureField::Checkbox {
            name: name.to_owned(),
            rect,
            checked,
        });
        self
    }

    pub fn build(self) -> EngineResult<Vec<u8>> {
        let mut doc = Document::with_version("1.7");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
        });

        let mut tree = FieldTree::default();
        let mut kids = Vec::with_capacity(self.pages.len());
        let mut fills = Vec::new();

        for page in &self.pages {
            let mut operations = Vec::new();
            for (x, y, size, text) in &page.texts {
                operations.extend([
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), Object::Real((*size).into())]),
                    Operation::new("Td", vec![Object::Real((*x).into()), Object::Real((*y).into())]),
                    Operation::new(
                        "Tj",
                        vec![Object::String(winansi_bytes(text), StringFormat::Literal)],
                    ),
                    Operation::new("ET", vec![]),
                ]);
            }
            let content = Content { operations }.encode()?;
            let content_id = doc.add_object(Stream::new(dictionary! {}, content));

            let page_id = doc.new_object_id();
            let mut annots = Vec::new();
            for field in &page.fields {
                let widget_id = tree.ensure(&mut doc, field.name());
                annots.push(Object::Reference(widget_id));
                fills.push(field.clone());

                let (field_type, rect) = match field {
                    FixtureField::Text { rect, .. } => ("Tx", rect),
                    FixtureField::Checkbox { rect, .. } => ("Btn", rect),
                };
                let mut widget = dictionary! {
                    "Type" => "Annot",
                    "Subtype" => "Widget",
                    "FT" => field_type,
                    "Rect" => rect_object(*rect),
                    "F" => 4,
                    "P" => page_id,
                    "DA" => Object::string_literal("/Helv 0 Tf 0 g"),
                };
                let partial = field.name().rsplit('.').next().unwrap_or(field.name());
                widget.set("T", text_string(partial));
                if let Some(parent) = tree.parents.get(&widget_id) {
                    widget.set("Parent", *parent);
                }
                // Terminal fields are written here, not by the tree
                tree.nodes.retain(|_, id| *id != widget_id);
                doc.objects.insert(widget_id, Object::Dictionary(widget));
            }

            let mut page_dict = dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => rect_object([0.0, 0.0, page.size.width_pt, page.size.height_pt]),
                "Resources" => dictionary! {
                    "Font" => dictionary! { "F1" => font_id },
                },
                "Contents" => content_id,
            };
            if !annots.is_empty() {
                page_dict.set("Annots", annots);
            }
            doc.objects.insert(page_id, Object::Dictionary(page_dict));
            kids.push(Object::Reference(page_id));
        }

        let page_count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => page_count,
            }),
        );

        let mut catalog = dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        };
        if !tree.roots.is_empty() {
            let fields: Vec<Object> = tree.roots.iter().map(|id| Object::Reference(*id)).collect();
            let form: Dictionary = dictionary! {
                "Fields" => fields,
                "DA" => Object::string_literal("/Helv 0 Tf 0 g"),
                "DR" => dictionary! {
                    "Font" => dictionary! { "Helv" => font_id },
                },
            };
            catalog.set("AcroForm", form);
        }
        tree.write(&mut doc);
        let catalog_id = doc.add_object(catalog);
        doc.trailer.set("Root", catalog_id);

        // Generate appearance streams through the regular form code
        let mut document = LopdfDocument::from_document(doc);
        for field in fills {
            match field {
                FixtureField::Text { name, value, .. } => document.fill_text(&name, &value)?,
                FixtureField::Checkbox { name, checked, .. } => {
                    document.fill_checkbox(&name, checked)?
                }
            }
        }
        crate::objects::save_document(&mut document.doc)
    }
}
