//! Editing tools, their settings and keyboard shortcuts
//!
//! Tools are plain data: a lookup table of [`ToolDefinition`]s describes each
//! tool's name, shortcut, capability flags, default settings and settings panel.
//! [`ToolController`] tracks the active tool and the pointer gesture in progress.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::element::{Color, LayerKind, TextAlign};
use crate::ink::Smoothing;
use crate::transform::DocPoint;

/// The thirteen mutually exclusive tools
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ToolKind {
    Select,
    Text,
    Highlight,
    Rectangle,
    Circle,
    Line,
    Freeform,
    Eraser,
    Redaction,
    FormField,
    Signature,
    Image,
    Ocr,
}

impl ToolKind {
    pub const ALL: [ToolKind; 13] = [
        ToolKind::Select,
        ToolKind::Text,
        ToolKind::Highlight,
        ToolKind::Rectangle,
        ToolKind::Circle,
        ToolKind::Line,
        ToolKind::Freeform,
        ToolKind::Eraser,
        ToolKind::Redaction,
        ToolKind::FormField,
        ToolKind::Signature,
        ToolKind::Image,
        ToolKind::Ocr,
    ];

    pub fn definition(self) -> &'static ToolDefinition {
        &TOOLS[self as usize]
    }

    pub fn name(self) -> &'static str {
        self.definition().name
    }

    pub fn from_name(name: &str) -> Option<Self> {
        TOOLS.iter().find(|d| d.name == name).map(|d| d.kind)
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cursor {
    Default,
    Text,
    Crosshair,
    Eraser,
}

/// How a tool consumes pointer input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureStyle {
    /// Single click
    Click,

    /// Press, drag, release
    Drag,

    /// Every pointer position is recorded
    Stroke,
}

/// Kind of field the form-field tool creates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKindChoice {
    #[default]
    Text,
    Multiline,
    Checkbox,
    Choice,
}

/// Settings record of one tool
#[derive(Debug, Clone, PartialEq)]
pub struct ToolSettings {
    pub color: Color,
    pub fill: Option<Color>,
    pub stroke_width: f32,
    pub opacity: f32,
    pub font_family: String,
    pub font_size: f32,
    pub bold: bool,
    pub italic: bool,
    pub align: TextAlign,
    pub smoothing: Smoothing,
    pub field_kind: FieldKindChoice,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            color: Color::BLACK,
            fill: None,
            stroke_width: 2.0,
            opacity: 1.0,
            font_family: "Helvetica".to_string(),
            font_size: 14.0,
            bold: false,
            italic: false,
            align: TextAlign::Left,
            smoothing: Smoothing::Medium,
            field_kind: FieldKindChoice::Text,
        }
    }
}

/// One row of a tool's settings panel
#[derive(Debug, Clone, PartialEq)]
pub enum SettingRow {
    Color {
        label: &'static str,
        value: Color,
    },
    OptionalColor {
        label: &'static str,
        value: Option<Color>,
    },
    Slider {
        label: &'static str,
        value: f32,
        min: f32,
        max: f32,
    },
    Toggle {
        label: &'static str,
        value: bool,
    },
    Choice {
        label: &'static str,
        options: &'static [&'static str],
        selected: usize,
    },
    Font {
        family: String,
        size: f32,
    },
}

/// Static description of a tool
pub struct ToolDefinition {
    pub kind: ToolKind,
    pub name: &'static str,
    pub label: &'static str,
    pub shortcut: Option<char>,

    /// Layers this tool adds elements to
    pub writes: &'static [LayerKind],

    /// Clicking with this tool never selects existing elements
    pub blocks_selection: bool,
    pub cursor: Cursor,
    pub gesture: GestureStyle,
    pub defaults: fn() -> ToolSettings,
    pub panel: fn(&ToolSettings) -> Vec<SettingRow>,
}

impl fmt::Debug for ToolDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolDefinition")
            .field("kind", &self.kind)
            .field("shortcut", &self.shortcut)
            .field("writes", &self.writes)
            .finish_non_exhaustive()
    }
}

fn no_settings() -> ToolSettings {
    ToolSettings::default()
}

fn text_defaults() -> ToolSettings {
    ToolSettings::default()
}

fn highlight_defaults() -> ToolSettings {
    ToolSettings {
        color: Color::YELLOW,
        fill: Some(Color::YELLOW),
        stroke_width: 0.0,
        opacity: 0.35,
        ..ToolSettings::default()
    }
}

fn shape_defaults() -> ToolSettings {
    ToolSettings {
        color: Color::RED,
        ..ToolSettings::default()
    }
}

fn ink_defaults() -> ToolSettings {
    ToolSettings {
        color: Color::BLUE,
        stroke_width: 3.0,
        ..ToolSettings::default()
    }
}

fn eraser_defaults() -> ToolSettings {
    ToolSettings {
        stroke_width: 10.0,
        ..ToolSettings::default()
    }
}

fn field_defaults() -> ToolSettings {
    ToolSettings {
        font_size: 12.0,
        ..ToolSettings::default()
    }
}

const ALIGN_OPTIONS: &[&str] = &["left", "center", "right"];
const SMOOTHING_OPTIONS: &[&str] = &["none", "low", "medium", "high"];
const FIELD_OPTIONS: &[&str] = &["text", "multiline", "checkbox", "choice"];

fn empty_panel(_: &ToolSettings) -> Vec<SettingRow> {
    Vec::new()
}

fn text_panel(s: &ToolSettings) -> Vec<SettingRow> {
    vec![
        SettingRow::Font {
            family: s.font_family.clone(),
            size: s.font_size,
        },
        SettingRow::Color {
            label: "Color",
            value: s.color,
        },
        SettingRow::Toggle {
            label: "Bold",
            value: s.bold,
        },
        SettingRow::Toggle {
            label: "Italic",
            value: s.italic,
        },
        SettingRow::Choice {
            label: "Align",
            options: ALIGN_OPTIONS,
            selected: match s.align {
                TextAlign::Left => 0,
                TextAlign::Center => 1,
                TextAlign::Right => 2,
            },
        },
    ]
}

fn highlight_panel(s: &ToolSettings) -> Vec<SettingRow> {
    vec![
        SettingRow::Color {
            label: "Color",
            value: s.color,
        },
        opacity_row(s),
    ]
}

fn shape_panel(s: &ToolSettings) -> Vec<SettingRow> {
    vec![
        SettingRow::Color {
            label: "Stroke",
            value: s.color,
        },
        SettingRow::OptionalColor {
            label: "Fill",
            value: s.fill,
        },
        width_row(s, 20.0),
        opacity_row(s),
    ]
}

fn line_panel(s: &ToolSettings) -> Vec<SettingRow> {
    vec![
        SettingRow::Color {
            label: "Color",
            value: s.color,
        },
        width_row(s, 20.0),
        opacity_row(s),
    ]
}

fn ink_panel(s: &ToolSettings) -> Vec<SettingRow> {
    let mut rows = line_panel(s);
    rows.push(SettingRow::Choice {
        label: "Smoothing",
        options: SMOOTHING_OPTIONS,
        selected: match s.smoothing {
            Smoothing::None => 0,
            Smoothing::Low => 1,
            Smoothing::Medium => 2,
            Smoothing::High => 3,
        },
    });
    rows
}

fn eraser_panel(s: &ToolSettings) -> Vec<SettingRow> {
    vec![SettingRow::Slider {
        label: "Radius",
        value: s.stroke_width,
        min: 1.0,
        max: 50.0,
    }]
}

fn redaction_panel(s: &ToolSettings) -> Vec<SettingRow> {
    vec![SettingRow::Color {
        label: "Fill",
        value: s.color,
    }]
}

fn field_panel(s: &ToolSettings) -> Vec<SettingRow> {
    vec![
        SettingRow::Choice {
            label: "Field type",
            options: FIELD_OPTIONS,
            selected: match s.field_kind {
                FieldKindChoice::Text => 0,
                FieldKindChoice::Multiline => 1,
                FieldKindChoice::Checkbox => 2,
                FieldKindChoice::Choice => 3,
            },
        },
        SettingRow::Slider {
            label: "Font size",
            value: s.font_size,
            min: 6.0,
            max: 36.0,
        },
    ]
}

fn image_panel(s: &ToolSettings) -> Vec<SettingRow> {
    vec![opacity_row(s)]
}

fn opacity_row(s: &ToolSettings) -> SettingRow {
    SettingRow::Slider {
        label: "Opacity",
        value: s.opacity,
        min: 0.0,
        max: 1.0,
    }
}

fn width_row(s: &ToolSettings, max: f32) -> SettingRow {
    SettingRow::Slider {
        label: "Width",
        value: s.stroke_width,
        min: 0.5,
        max,
    }
}

/// Tool table, indexed by `ToolKind as usize`
pub static TOOLS: [ToolDefinition; 13] = [
    ToolDefinition {
        kind: ToolKind::Select,
        name: "select",
        label: "Select",
        shortcut: Some('v'),
        writes: &[],
        blocks_selection: false,
        cursor: Cursor::Default,
        gesture: GestureStyle::Drag,
        defaults: no_settings,
        panel: empty_panel,
    },
    ToolDefinition {
        kind: ToolKind::Text,
        name: "text",
        label: "Text",
        shortcut: Some('t'),
        writes: &[LayerKind::Text],
        blocks_selection: true,
        cursor: Cursor::Text,
        gesture: GestureStyle::Click,
        defaults: text_defaults,
        panel: text_panel,
    },
    ToolDefinition {
        kind: ToolKind::Highlight,
        name: "highlight",
        label: "Highlight",
        shortcut: Some('h'),
        writes: &[LayerKind::Shape],
        blocks_selection: true,
        cursor: Cursor::Crosshair,
        gesture: GestureStyle::Drag,
        defaults: highlight_defaults,
        panel: highlight_panel,
    },
    ToolDefinition {
        kind: ToolKind::Rectangle,
        name: "rectangle",
        label: "Rectangle",
        shortcut: Some('r'),
        writes: &[LayerKind::Shape],
        blocks_selection: true,
        cursor: Cursor::Crosshair,
        gesture: GestureStyle::Drag,
        defaults: shape_defaults,
        panel: shape_panel,
    },
    ToolDefinition {
        kind: ToolKind::Circle,
        name: "circle",
        label: "Circle",
        shortcut: Some('c'),
        writes: &[LayerKind::Shape],
        blocks_selection: true,
        cursor: Cursor::Crosshair,
        gesture: GestureStyle::Drag,
        defaults: shape_defaults,
        panel: shape_panel,
    },
    ToolDefinition {
        kind: ToolKind::Line,
        name: "line",
        label: "Line",
        shortcut: Some('l'),
        writes: &[LayerKind::Shape],
        blocks_selection: true,
        cursor: Cursor::Crosshair,
        gesture: GestureStyle::Drag,
        defaults: shape_defaults,
        panel: line_panel,
    },
    ToolDefinition {
        kind: ToolKind::Freeform,
        name: "freeform",
        label: "Draw",
        shortcut: Some('p'),
        writes: &[LayerKind::Ink],
        blocks_selection: true,
        cursor: Cursor::Crosshair,
        gesture: GestureStyle::Stroke,
        defaults: ink_defaults,
        panel: ink_panel,
    },
    ToolDefinition {
        kind: ToolKind::Eraser,
        name: "eraser",
        label: "Eraser",
        shortcut: Some('e'),
        writes: &[],
        blocks_selection: true,
        cursor: Cursor::Eraser,
        gesture: GestureStyle::Stroke,
        defaults: eraser_defaults,
        panel: eraser_panel,
    },
    ToolDefinition {
        kind: ToolKind::Redaction,
        name: "redaction",
        label: "Redact",
        shortcut: Some('x'),
        writes: &[LayerKind::Redaction],
        blocks_selection: true,
        cursor: Cursor::Crosshair,
        gesture: GestureStyle::Drag,
        defaults: no_settings,
        panel: redaction_panel,
    },
    ToolDefinition {
        kind: ToolKind::FormField,
        name: "form-field",
        label: "Form field",
        shortcut: Some('f'),
        writes: &[LayerKind::FormField],
        blocks_selection: true,
        cursor: Cursor::Crosshair,
        gesture: GestureStyle::Drag,
        defaults: field_defaults,
        panel: field_panel,
    },
    ToolDefinition {
        kind: ToolKind::Signature,
        name: "signature",
        label: "Signature",
        shortcut: Some('s'),
        writes: &[LayerKind::Image],
        blocks_selection: true,
        cursor: Cursor::Crosshair,
        gesture: GestureStyle::Drag,
        defaults: no_settings,
        panel: image_panel,
    },
    ToolDefinition {
        kind: ToolKind::Image,
        name: "image",
        label: "Image",
        shortcut: Some('i'),
        writes: &[LayerKind::Image],
        blocks_selection: true,
        cursor: Cursor::Crosshair,
        gesture: GestureStyle::Drag,
        defaults: no_settings,
        panel: image_panel,
    },
    ToolDefinition {
        kind: ToolKind::Ocr,
        name: "ocr",
        label: "Recognize text",
        shortcut: Some('o'),
        writes: &[LayerKind::Text],
        blocks_selection: true,
        cursor: Cursor::Crosshair,
        gesture: GestureStyle::Drag,
        defaults: no_settings,
        panel: empty_panel,
    },
];

/// Look up a tool's definition
pub fn definition(kind: ToolKind) -> &'static ToolDefinition {
    kind.definition()
}

/// Pointer gesture in progress, in document space
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Gesture {
    #[default]
    Idle,
    Drag {
        start: DocPoint,
        current: DocPoint,
    },
    Stroke {
        points: Vec<DocPoint>,
    },
}

/// A completed gesture
#[derive(Debug, Clone, PartialEq)]
pub enum GestureOutcome {
    Click(DocPoint),
    Drag { start: DocPoint, end: DocPoint },
    Stroke(Vec<DocPoint>),
}

/// Active tool, per-tool settings and the gesture in progress
#[derive(Debug, Clone)]
pub struct ToolController {
    active: ToolKind,

    /// Indexed by `ToolKind as usize`
    settings: [ToolSettings; 13],
    gesture: Gesture,
}

impl Default for ToolController {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolController {
    pub fn new() -> Self {
        let settings = ToolKind::ALL.map(|kind| (kind.definition().defaults)());
        Self {
            active: ToolKind::Select,
            settings,
            gesture: Gesture::Idle,
        }
    }

    pub fn active(&self) -> ToolKind {
        self.active
    }

    /// Switch tools; any gesture in progress is discarded
    ///
    /// Returns `true` if the active tool changed.
    pub fn activate(&mut self, kind: ToolKind) -> bool {
        if self.gesture != Gesture::Idle {
            tracing::debug!(from = %self.active, to = %kind, "discarding gesture on tool switch");
        }
        self.gesture = Gesture::Idle;
        let changed = self.active != kind;
        self.active = kind;
        changed
    }

    pub fn settings(&self, kind: ToolKind) -> &ToolSettings {
        &self.settings[kind as usize]
    }

    pub fn settings_mut(&mut self, kind: ToolKind) -> &mut ToolSettings {
        &mut self.settings[kind as usize]
    }

    pub fn active_settings(&self) -> &ToolSettings {
        self.settings(self.active)
    }

    /// Settings panel rows of the active tool
    pub fn panel(&self) -> Vec<SettingRow> {
        (self.active.definition().panel)(self.active_settings())
    }

    pub fn gesture(&self) -> &Gesture {
        &self.gesture
    }

    pub fn is_gesture_active(&self) -> bool {
        self.gesture != Gesture::Idle
    }

    pub fn pointer_down(&mut self, point: DocPoint) {
        self.gesture = match self.active.definition().gesture {
            GestureStyle::Click | GestureStyle::Drag => Gesture::Drag {
                start: point,
                current: point,
            },
            GestureStyle::Stroke => Gesture::Stroke {
                points: vec![point],
            },
        };
    }

    /// Track pointer movement; returns `false` when no gesture is active
    pub fn pointer_move(&mut self, point: DocPoint) -> bool {
        match &mut self.gesture {
            Gesture::Idle => false,
            Gesture::Drag { current, .. } => {
                *current = point;
                true
            }
            Gesture::Stroke { points } => {
                if points.last() != Some(&point) {
                    points.push(point);
                }
                true
            }
        }
    }

    /// Finish the gesture in progress
    pub fn pointer_up(&mut self, point: DocPoint) -> Option<GestureOutcome> {
        self.pointer_move(point);
        match std::mem::take(&mut self.gesture) {
            Gesture::Idle => None,
            Gesture::Drag { start, current } => {
                if start == current || self.active.definition().gesture == GestureStyle::Click {
                    Some(GestureOutcome::Click(current))
                } else {
                    Some(GestureOutcome::Drag {
                        start,
                        end: current,
                    })
                }
            }
            Gesture::Stroke { points } => Some(GestureOutcome::Stroke(points)),
        }
    }

    pub fn cancel_gesture(&mut self) {
        self.gesture = Gesture::Idle;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Char(char),
    Delete,
    Backspace,
    Escape,
    Enter,
    ArrowLeft,
    ArrowRight,
    ArrowUp,
    ArrowDown,
    Home,
    End,
}

/// A key press with modifier state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyInput {
    pub key: Key,
    pub ctrl: bool,
    pub meta: bool,
    pub shift: bool,
    pub alt: bool,

    /// Focus is in a text input (text box editing, field value)
    pub in_text_input: bool,
}

impl KeyInput {
    pub fn new(key: Key) -> Self {
        Self {
            key,
            ctrl: false,
            meta: false,
            shift: false,
            alt: false,
            in_text_input: false,
        }
    }

    pub fn ctrl(mut self) -> Self {
        self.ctrl = true;
        self
    }

    pub fn shift(mut self) -> Self {
        self.shift = true;
        self
    }

    pub fn in_text_input(mut self) -> Self {
        self.in_text_input = true;
        self
    }
}

/// Editor command produced by a key press
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Undo,
    Redo,
    Copy,
    Paste,
    Save,
    DeleteSelection,
    ActivateTool(ToolKind),
    PreviousPage,
    NextPage,
    FirstPage,
    LastPage,
}

/// Single-letter tool shortcuts
#[derive(Debug, Clone, PartialEq)]
pub struct ShortcutTable {
    bindings: HashMap<char, ToolKind>,
}

impl Default for ShortcutTable {
    fn default() -> Self {
        let bindings = TOOLS
            .iter()
            .filter_map(|d| d.shortcut.map(|key| (key, d.kind)))
            .collect();
        Self { bindings }
    }
}

impl ShortcutTable {
    /// Defaults with configured overrides applied
    pub fn with_overrides(overrides: &BTreeMap<String, ToolKind>) -> Self {
        let mut table = Self::default();
        for (key, tool) in overrides {
            if let Some(c) = key.chars().next() {
                table.bind(c, *tool);
            }
        }
        table
    }

    pub fn bind(&mut self, key: char, tool: ToolKind) {
        for lower in key.to_lowercase() {
            self.bindings.insert(lower, tool);
        }
    }

    pub fn lookup(&self, key: char) -> Option<ToolKind> {
        key.to_lowercase()
            .next()
            .and_then(|lower| self.bindings.get(&lower).copied())
    }
}

/// Resolve a key press into a command
///
/// Reserved combinations are matched first and never reach tool shortcuts.
/// Other keys are ignored while focus is in a text input.
pub fn resolve_key(input: &KeyInput, shortcuts: &ShortcutTable) -> Option<Command> {
    if input.ctrl || input.meta {
        return match input.key {
            Key::Char(c) => match c.to_ascii_lowercase() {
                'z' if input.shift => Some(Command::Redo),
                'z' => Some(Command::Undo),
                'y' => Some(Command::Redo),
                'c' if !input.in_text_input => Some(Command::Copy),
                'v' if !input.in_text_input => Some(Command::Paste),
                's' => Some(Command::Save),
                _ => None,
            },
            _ => None,
        };
    }

    if input.key == Key::Escape {
        return Some(Command::ActivateTool(ToolKind::Select));
    }
    if input.in_text_input {
        return None;
    }

    match input.key {
        Key::Delete | Key::Backspace => Some(Command::DeleteSelection),
        Key::ArrowLeft | Key::ArrowUp => Some(Command::PreviousPage),
        Key::ArrowRight | Key::ArrowDown => Some(Command::NextPage),
        Key::Home => Some(Command::FirstPage),
        Key::End => Some(Command::LastPage),
        Key::Char(c) if !input.alt => shortcuts.lookup(c).map(Command::ActivateTool),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_indexed_by_kind() {
        for kind in ToolKind::ALL {
            assert_eq!(kind.definition().kind, kind);
            assert_eq!(ToolKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(ToolKind::from_name("lasso"), None);
    }

    #[test]
    fn test_shortcuts_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for definition in TOOLS.iter() {
            if let Some(key) = definition.shortcut {
                assert!(seen.insert(key), "duplicate shortcut {key}");
            }
        }
    }

    #[test]
    fn test_tool_kind_serde_names() {
        let json = serde_json::to_string(&ToolKind::FormField).unwrap();
        assert_eq!(json, "\"form-field\"");
        assert_eq!(json.trim_matches('"'), ToolKind::FormField.name());
    }

    #[test]
    fn test_panels_are_pure_functions_of_settings() {
        let mut controller = ToolController::new();
        controller.activate(ToolKind::Text);
        let before = controller.panel();

        controller.settings_mut(ToolKind::Text).bold = true;
        let after = controller.panel();
        assert_ne!(before, after);
        assert!(after.contains(&SettingRow::Toggle {
            label: "Bold",
            value: true
        }));
        assert!(definition(ToolKind::Select).writes.is_empty());
    }

    #[test]
    fn test_drag_gesture() {
        let mut controller = ToolController::new();
        controller.activate(ToolKind::Rectangle);
        controller.pointer_down(DocPoint::new(1.0, 1.0));
        assert!(controller.pointer_move(DocPoint::new(5.0, 5.0)));

        let outcome = controller.pointer_up(DocPoint::new(10.0, 12.0));
        assert_eq!(
            outcome,
            Some(GestureOutcome::Drag {
                start: DocPoint::new(1.0, 1.0),
                end: DocPoint::new(10.0, 12.0)
            })
        );
        assert!(!controller.is_gesture_active());
    }

    #[test]
    fn test_click_tool_reports_click() {
        let mut controller = ToolController::new();
        controller.activate(ToolKind::Text);
        controller.pointer_down(DocPoint::new(1.0, 1.0));
        assert_eq!(
            controller.pointer_up(DocPoint::new(3.0, 1.0)),
            Some(GestureOutcome::Click(DocPoint::new(3.0, 1.0)))
        );
    }

    #[test]
    fn test_tool_switch_discards_stroke() {
        let mut controller = ToolController::new();
        controller.activate(ToolKind::Freeform);
        controller.pointer_down(DocPoint::new(0.0, 0.0));
        controller.pointer_move(DocPoint::new(4.0, 4.0));

        assert!(controller.activate(ToolKind::Select));
        assert_eq!(controller.gesture(), &Gesture::Idle);
        assert_eq!(controller.pointer_up(DocPoint::new(8.0, 8.0)), None);
    }

    #[test]
    fn test_stroke_skips_duplicate_points() {
        let mut controller = ToolController::new();
        controller.activate(ToolKind::Freeform);
        controller.pointer_down(DocPoint::new(0.0, 0.0));
        controller.pointer_move(DocPoint::new(0.0, 0.0));
        controller.pointer_move(DocPoint::new(1.0, 0.0));

        match controller.pointer_up(DocPoint::new(1.0, 0.0)) {
            Some(GestureOutcome::Stroke(points)) => assert_eq!(points.len(), 2),
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn test_reserved_combinations() {
        let table = ShortcutTable::default();
        let key = |c| KeyInput::new(Key::Char(c));

        assert_eq!(resolve_key(&key('z').ctrl(), &table), Some(Command::Undo));
        assert_eq!(resolve_key(&key('Z').ctrl().shift(), &table), Some(Command::Redo));
        assert_eq!(resolve_key(&key('y').ctrl(), &table), Some(Command::Redo));
        assert_eq!(resolve_key(&key('c').ctrl(), &table), Some(Command::Copy));
        assert_eq!(resolve_key(&key('v').ctrl(), &table), Some(Command::Paste));
        assert_eq!(resolve_key(&key('s').ctrl(), &table), Some(Command::Save));
        // Reserved combinations never fall through to tool shortcuts
        assert_eq!(resolve_key(&key('r').ctrl(), &table), None);
    }

    #[test]
    fn test_plain_keys() {
        let table = ShortcutTable::default();
        assert_eq!(
            resolve_key(&KeyInput::new(Key::Char('R')), &table),
            Some(Command::ActivateTool(ToolKind::Rectangle))
        );
        assert_eq!(
            resolve_key(&KeyInput::new(Key::Backspace), &table),
            Some(Command::DeleteSelection)
        );
        assert_eq!(
            resolve_key(&KeyInput::new(Key::Escape), &table),
            Some(Command::ActivateTool(ToolKind::Select))
        );
        assert_eq!(resolve_key(&KeyInput::new(Key::End), &table), Some(Command::LastPage));
        assert_eq!(resolve_key(&KeyInput::new(Key::Char('9')), &table), None);
    }

    #[test]
    fn test_text_input_suppresses_navigation() {
        let table = ShortcutTable::default();
        for key in [Key::ArrowLeft, Key::Home, Key::Backspace, Key::Char('r')] {
            assert_eq!(resolve_key(&KeyInput::new(key).in_text_input(), &table), None);
        }
        assert_eq!(
            resolve_key(&KeyInput::new(Key::Char('z')).ctrl().in_text_input(), &table),
            Some(Command::Undo)
        );
    }

    #[test]
    fn test_shortcut_overrides() {
        let mut overrides = BTreeMap::new();
        overrides.insert("q".to_string(), ToolKind::Rectangle);
        overrides.insert("t".to_string(), ToolKind::Ocr);
        let table = ShortcutTable::with_overrides(&overrides);

        assert_eq!(table.lookup('q'), Some(ToolKind::Rectangle));
        assert_eq!(table.lookup('T'), Some(ToolKind::Ocr));
        assert_eq!(table.lookup('r'), Some(ToolKind::Rectangle));
    }
}
