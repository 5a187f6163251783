//! Edit scripts for `folio apply`
//!
//! ```json
//! {
//!   "fonts": { "Inter": "fonts/Inter-Regular.ttf" },
//!   "elements": [
//!     { "type": "text", "page": 1, "rect": [72, 72, 200, 20], "text": "Approved",
//!       "style": { "font_family": "Inter", "font_size": 14 } },
//!     { "type": "highlight", "page": 1, "rect": [72, 120, 180, 14] },
//!     { "type": "image", "page": 2, "rect": [300, 650, 180, 60],
//!       "path": "signature.png", "kind": "signature" }
//!   ],
//!   "fields": { "name": "Ada Lovelace", "agree": true },
//!   "rotations": { "2": 90 }
//! }
//! ```
//!
//! Rectangles are `[x, y, width, height]` in points from the top-left corner
//! of the page. Relative paths resolve against the script's directory.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use folio_core::{
    Color, DocPoint, DocRect, Element, FormField, FormFieldKind, ImageElement,
    ImageKind, InkStroke, RedactionBlock, Session, ShapeAnnotation, ShapeGeometry, TextBox,
    TextStyle,
};
use folio_engine::Renderer;
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EditScript {
    /// Font family name to TrueType file
    #[serde(default)]
    pub fonts: BTreeMap<String, PathBuf>,

    #[serde(default)]
    pub elements: Vec<ElementSpec>,

    /// Values for form fields already in the document, by field name
    #[serde(default)]
    pub fields: BTreeMap<String, FieldInput>,

    /// Page number to clockwise degrees
    #[serde(default)]
    pub rotations: BTreeMap<u32, i32>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", deny_unknown_fields)]
pub enum ElementSpec {
    Text {
        page: u32,
        rect: [f32; 4],
        text: String,
        #[serde(default)]
        style: TextStyle,
        #[serde(default)]
        rotation: f32,
    },
    Rectangle {
        page: u32,
        rect: [f32; 4],
        #[serde(default = "default_stroke")]
        stroke: Color,
        #[serde(default)]
        fill: Option<Color>,
        #[serde(default = "default_stroke_width")]
        stroke_width: f32,
    },
    Ellipse {
        page: u32,
        rect: [f32; 4],
        #[serde(default = "default_stroke")]
        stroke: Color,
        #[serde(default)]
        fill: Option<Color>,
        #[serde(default = "default_stroke_width")]
        stroke_width: f32,
    },
    Highlight {
        page: u32,
        rect: [f32; 4],
        #[serde(default = "default_highlight")]
        color: Color,
    },
    Line {
        page: u32,
        start: [f32; 2],
        end: [f32; 2],
        #[serde(default = "default_stroke")]
        stroke: Color,
        #[serde(default = "default_stroke_width")]
        stroke_width: f32,
    },
    Ink {
        page: u32,
        points: Vec<[f32; 2]>,
        #[serde(default = "default_stroke")]
        color: Color,
        #[serde(default = "default_stroke_width")]
        width: f32,
    },
    Image {
        page: u32,
        rect: [f32; 4],
        path: PathBuf,
        #[serde(default)]
        kind: ImageKind,
    },
    Redaction {
        page: u32,
        rect: [f32; 4],
        #[serde(default = "default_redaction")]
        fill: Color,
    },
    Field {
        page: u32,
        rect: [f32; 4],
        name: String,
        kind: FormFieldKind,
    },
}

/// New value for an existing form field
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum FieldInput {
    Checked(bool),
    Value(String),
}

fn default_stroke() -> Color {
    Color::RED
}

fn default_stroke_width() -> f32 {
    2.0
}

fn default_highlight() -> Color {
    Color::YELLOW
}

fn default_redaction() -> Color {
    Color::BLACK
}

fn rect([x, y, width, height]: [f32; 4]) -> DocRect {
    DocRect::new(x, y, width, height)
}

fn point([x, y]: [f32; 2]) -> DocPoint {
    DocPoint::new(x, y)
}

impl EditScript {
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read edit script {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("invalid edit script {}", path.display()))
    }

    /// Register the script's fonts, rotate pages, fill fields and add elements
    ///
    /// Elements are added in one history entry; returns how many were added.
    pub fn apply<R: Renderer>(self, session: &mut Session<R>, base_dir: &Path) -> Result<usize> {
        for (family, path) in &self.fonts {
            let path = base_dir.join(path);
            let data = fs::read(&path)
                .with_context(|| format!("failed to read font {}", path.display()))?;
            session.fonts_mut().register(family.clone(), data);
        }

        for (page, degrees) in &self.rotations {
            session
                .rotate_page_degrees(*page, *degrees)
                .with_context(|| format!("cannot rotate page {page}"))?;
        }

        for (name, input) in &self.fields {
            fill_field(session, name, input)?;
        }

        let elements = self
            .elements
            .into_iter()
            .enumerate()
            .map(|(index, spec)| {
                spec.into_element(base_dir)
                    .with_context(|| format!("element {} in edit script", index + 1))
            })
            .collect::<Result<Vec<_>>>()?;
        let added = session
            .add_elements(elements)
            .context("edit script rejected")?
            .len();
        tracing::info!(added, "edit script applied");
        Ok(added)
    }
}

fn fill_field<R: Renderer>(session: &mut Session<R>, name: &str, input: &FieldInput) -> Result<()> {
    let Some(field) = session.field_by_name(name) else {
        bail!("no form field named {name:?}");
    };
    let kind = match (&field.kind, input) {
        (FormFieldKind::Text { multiline, .. }, FieldInput::Value(value)) => FormFieldKind::Text {
            value: value.clone(),
            multiline: *multiline,
        },
        (FormFieldKind::Checkbox { .. }, FieldInput::Checked(checked)) => {
            FormFieldKind::Checkbox { checked: *checked }
        }
        (FormFieldKind::Choice { options, .. }, FieldInput::Value(value)) => {
            if !options.contains(value) {
                bail!("{value:?} is not an option of field {name:?}");
            }
            FormFieldKind::Choice {
                options: options.clone(),
                selected: Some(value.clone()),
            }
        }
        (kind, input) => bail!("field {name:?} is {kind:?}, cannot set it to {input:?}"),
    };
    let id = field.id;
    session
        .set_field_value(id, kind)
        .with_context(|| format!("cannot fill field {name:?}"))
}

impl ElementSpec {
    fn into_element(self, base_dir: &Path) -> Result<Element> {
        let element = match self {
            ElementSpec::Text {
                page,
                rect: r,
                text,
                style,
                rotation,
            } => {
                let mut text = TextBox::new(page, rect(r), text, style);
                text.rotation = rotation;
                text.into()
            }
            ElementSpec::Rectangle {
                page,
                rect: r,
                stroke,
                fill,
                stroke_width,
            } => shape(page, ShapeGeometry::Rectangle { rect: rect(r) }, stroke, fill, stroke_width),
            ElementSpec::Ellipse {
                page,
                rect: r,
                stroke,
                fill,
                stroke_width,
            } => shape(page, ShapeGeometry::Ellipse { rect: rect(r) }, stroke, fill, stroke_width),
            ElementSpec::Highlight { page, rect: r, color } => {
                ShapeAnnotation::highlight(page, rect(r), color).into()
            }
            ElementSpec::Line {
                page,
                start,
                end,
                stroke,
                stroke_width,
            } => {
                let geometry = ShapeGeometry::Line {
                    start: point(start),
                    end: point(end),
                };
                shape(page, geometry, stroke, None, stroke_width)
            }
            ElementSpec::Ink {
                page,
                points,
                color,
                width,
            } => InkStroke::new(page, points.into_iter().map(point).collect(), color, width).into(),
            ElementSpec::Image {
                page,
                rect: r,
                path,
                kind,
            } => {
                let path = base_dir.join(path);
                let data = fs::read(&path)
                    .with_context(|| format!("failed to read image {}", path.display()))?;
                ImageElement::new(page, rect(r), data.into(), kind).into()
            }
            ElementSpec::Redaction { page, rect: r, fill } => {
                let mut block = RedactionBlock::new(page, rect(r));
                block.fill = fill;
                block.into()
            }
            ElementSpec::Field {
                page,
                rect: r,
                name,
                kind,
            } => FormField::new(page, rect(r), name, kind).into(),
        };
        Ok(element)
    }
}

fn shape(
    page: u32,
    geometry: ShapeGeometry,
    stroke: Color,
    fill: Option<Color>,
    stroke_width: f32,
) -> Element {
    let mut shape = ShapeAnnotation::new(page, geometry, stroke, stroke_width);
    shape.fill = fill;
    shape.into()
}
