//! Editing session
//!
//! A [`Session`] owns one loaded document and everything edited on top of it:
//! the six element layers, undo history, selection, tool state, view state
//! (page, zoom, rotation) and the font service used on export. The original
//! bytes are kept untouched until export.
//!
//! Pointer input arrives in pointer space, is mapped into document space
//! through the current [`Viewport`] and routed to the active tool. History
//! entries are committed only when a gesture completes.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use folio_engine::{
    DocumentHandle, EngineError, PageSize, Renderer, Rotation, WidgetAnnotation, WidgetKind,
};
use folio_scheduler::TaskSlot;

use crate::compose::{scene_for_page, Preview, Primitive, SceneOverlay};
use crate::config::EditorConfig;
use crate::element::{
    Element, ElementId, ElementPatch, FieldOrigin, FormField, FormFieldKind, FormFieldPatch,
    ImageElement, ImageKind, InkStroke, LayerKind, RedactionBlock, ShapeAnnotation,
    ShapeGeometry, TextBox, TextBoxPatch, TextStyle,
};
use crate::error::{EditorError, EditorResult, ValidationError};
use crate::fonts::FontService;
use crate::handles::{generate_handles, hit_handle, HandleType, ManipulationState};
use crate::history::History;
use crate::ink;
use crate::layers::{ElementLayers, Snapshot};
use crate::ocr::{blocks_to_text_boxes, OcrBlock, OcrEngine, OcrError, OcrJob};
use crate::redaction_store::{document_key, KeyValueStore, RedactionStore};
use crate::selection::Selection;
use crate::tools::{
    resolve_key, Command, Cursor, FieldKindChoice, Gesture, GestureOutcome, KeyInput,
    ShortcutTable, ToolController, ToolKind, ToolSettings,
};
use crate::transform::{to_document, DocPoint, DocRect, PointerPoint, Viewport};

/// Width of a text box created by a click
const TEXT_BOX_WIDTH: f32 = 200.0;

/// Line height relative to font size
const LINE_SPACING: f32 = 1.2;

/// Size of an image placed by a click instead of a drag
const CLICK_IMAGE_SIZE: (f32, f32) = (200.0, 150.0);
const CLICK_SIGNATURE_SIZE: (f32, f32) = (180.0, 60.0);

/// What a pointer event did
#[derive(Debug, Clone, PartialEq)]
pub enum PointerOutcome {
    Ignored,

    /// A gesture is in progress; the live preview changed
    Preview,
    Selected(Option<ElementId>),
    Created(ElementId),
    Modified(ElementId),
    Erased(usize),
    EditingText(ElementId),

    /// The gesture produced nothing big enough to keep
    Discarded,

    /// The image or signature tool needs image data for this rectangle
    ImageRequested { rect: DocRect, kind: ImageKind },

    /// The OCR tool finished a gesture; `None` means the whole page
    OcrRequested(Option<DocRect>),
}

#[derive(Debug, Clone)]
struct TextEdit {
    id: ElementId,
    created: bool,
    original: String,
}

#[derive(Debug, Clone)]
struct PendingImage {
    data: Arc<[u8]>,
    kind: ImageKind,
}

/// One loaded document and its editing state
pub struct Session<R: Renderer> {
    renderer: R,
    document: DocumentHandle,
    source: Arc<[u8]>,
    file_name: String,
    page_sizes: Vec<PageSize>,

    current_page: u32,
    zoom: f32,
    rotation: Rotation,
    origin: PointerPoint,

    /// Document page rotations written on export; not part of undo history
    page_rotations: BTreeMap<u32, Rotation>,

    layers: ElementLayers,
    history: History<Snapshot>,
    selection: Selection,
    tools: ToolController,
    shortcuts: ShortcutTable,
    editing: Option<TextEdit>,
    manipulation: Option<ManipulationState>,
    erased: usize,
    pending_image: Option<PendingImage>,
    clipboard: Vec<Element>,

    fonts: FontService,
    config: EditorConfig,

    revision: u64,
    view_revision: u64,
    ocr: TaskSlot,
}

impl<R: Renderer> std::fmt::Debug for Session<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("file_name", &self.file_name)
            .field("page_count", &self.page_sizes.len())
            .field("current_page", &self.current_page)
            .field("zoom", &self.zoom)
            .field("rotation", &self.rotation)
            .field("tool", &self.tools.active())
            .field("elements", &self.layers.element_count())
            .field("revision", &self.revision)
            .finish()
    }
}

impl<R: Renderer> Session<R> {
    /// Load `bytes` and seed the form-field layer from the document's widgets
    pub fn open(
        mut renderer: R,
        bytes: impl Into<Arc<[u8]>>,
        file_name: impl Into<String>,
        config: EditorConfig,
        fonts: FontService,
    ) -> EditorResult<Self> {
        let source: Arc<[u8]> = bytes.into();
        let file_name = file_name.into();
        let document = renderer.load_document(&source).map_err(EditorError::Load)?;

        let page_count = renderer.page_count(document).map_err(EditorError::Load)?;
        if page_count == 0 {
            return Err(EditorError::Load(EngineError::Backend(
                "document has no pages".to_string(),
            )));
        }

        let mut page_sizes = Vec::with_capacity(page_count as usize);
        let mut layers = ElementLayers::new(config.min_redaction_size, config.min_ink_extent);
        for page in 1..=page_count {
            let size = renderer.page_size(document, page).map_err(EditorError::Load)?;
            let widgets = renderer.annotations(document, page).map_err(EditorError::Load)?;
            for widget in &widgets {
                if let Some(field) = detected_field(page, size, widget) {
                    layers.add(Element::FormField(field));
                }
            }
            page_sizes.push(size);
        }

        tracing::info!(
            file_name = %file_name,
            page_count,
            fields = layers.fields.len(),
            "document opened"
        );

        let history = History::new(layers.snapshot(), config.history_capacity);
        let shortcuts = ShortcutTable::with_overrides(&config.shortcuts);
        let mut tools = ToolController::new();
        tools.settings_mut(ToolKind::Text).font_family = config.default_font_family.clone();
        tools.settings_mut(ToolKind::Text).font_size = config.default_font_size;
        tools.settings_mut(ToolKind::Eraser).stroke_width = config.eraser_radius;

        Ok(Self {
            renderer,
            document,
            source,
            file_name,
            page_sizes,
            current_page: 1,
            zoom: 1.0,
            rotation: Rotation::Deg0,
            origin: PointerPoint::default(),
            page_rotations: BTreeMap::new(),
            layers,
            history,
            selection: Selection::new(),
            tools,
            shortcuts,
            editing: None,
            manipulation: None,
            erased: 0,
            pending_image: None,
            clipboard: Vec::new(),
            fonts,
            config,
            revision: 0,
            view_revision: 0,
            ocr: TaskSlot::new(),
        })
    }

    /// Release the document and hand back the renderer
    pub fn close(mut self) -> R {
        self.ocr.cancel();
        if let Err(err) = self.renderer.close(self.document) {
            tracing::warn!(error = %err, "failed to close document");
        }
        self.renderer
    }

    // --- document ---------------------------------------------------------

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn document(&self) -> DocumentHandle {
        self.document
    }

    /// The original bytes, unmodified
    pub fn source(&self) -> &[u8] {
        &self.source
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// `<stem>_edited.<ext>`
    pub fn export_filename(&self) -> String {
        let path = Path::new(&self.file_name);
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
            .unwrap_or("document");
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("pdf");
        format!("{stem}_edited.{ext}")
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn fonts(&self) -> &FontService {
        &self.fonts
    }

    pub fn fonts_mut(&mut self) -> &mut FontService {
        &mut self.fonts
    }

    pub fn page_count(&self) -> u32 {
        self.page_sizes.len() as u32
    }

    pub fn page_size(&self, page: u32) -> Result<PageSize, ValidationError> {
        self.check_page(page)?;
        Ok(self.page_sizes[page as usize - 1])
    }

    fn check_page(&self, page: u32) -> Result<(), ValidationError> {
        if page == 0 || page > self.page_count() {
            return Err(ValidationError::PageOutOfRange {
                page,
                page_count: self.page_count(),
            });
        }
        Ok(())
    }

    // --- view -------------------------------------------------------------

    pub fn current_page(&self) -> u32 {
        self.current_page
    }

    pub fn zoom(&self) -> f32 {
        self.zoom
    }

    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    /// Move to `page`; out-of-range pages are rejected without side effects
    pub fn set_page(&mut self, page: u32) -> Result<(), ValidationError> {
        self.check_page(page)?;
        if page == self.current_page {
            return Ok(());
        }
        self.interrupt();
        self.selection.clear();
        self.current_page = page;
        self.touch();
        tracing::debug!(page, "page changed");
        Ok(())
    }

    pub fn next_page(&mut self) -> bool {
        self.current_page < self.page_count() && self.set_page(self.current_page + 1).is_ok()
    }

    pub fn previous_page(&mut self) -> bool {
        self.current_page > 1 && self.set_page(self.current_page - 1).is_ok()
    }

    pub fn first_page(&mut self) -> bool {
        self.current_page != 1 && self.set_page(1).is_ok()
    }

    pub fn last_page(&mut self) -> bool {
        let last = self.page_count();
        self.current_page != last && self.set_page(last).is_ok()
    }

    /// Set the zoom factor, clamped to the configured range
    pub fn set_zoom(&mut self, zoom: f32) -> f32 {
        let zoom = self.config.clamp_zoom(zoom);
        if zoom != self.zoom {
            self.zoom = zoom;
            self.touch();
        }
        self.zoom
    }

    pub fn zoom_in(&mut self) -> f32 {
        self.set_zoom(self.zoom * self.config.zoom_step)
    }

    pub fn zoom_out(&mut self) -> f32 {
        self.set_zoom(self.zoom / self.config.zoom_step)
    }

    /// Rotate the view; element geometry is unaffected
    pub fn rotate_clockwise(&mut self) -> Rotation {
        self.set_rotation(self.rotation.clockwise())
    }

    pub fn rotate_counter_clockwise(&mut self) -> Rotation {
        self.set_rotation(self.rotation.counter_clockwise())
    }

    pub fn set_rotation(&mut self, rotation: Rotation) -> Rotation {
        if rotation != self.rotation {
            self.abort_gesture();
            self.rotation = rotation;
            self.touch();
        }
        self.rotation
    }

    /// Surface offset in pointer space
    pub fn set_origin(&mut self, origin: PointerPoint) {
        self.origin = origin;
    }

    /// Viewport of the current page
    pub fn viewport(&self) -> Viewport {
        Viewport::new(self.page_sizes[self.current_page as usize - 1], self.zoom, self.rotation)
            .with_origin(self.origin)
    }

    /// Viewport of any page at the current zoom and rotation
    pub fn viewport_for(&self, page: u32) -> Result<Viewport, ValidationError> {
        let size = self.page_size(page)?;
        Ok(Viewport::new(size, self.zoom, self.rotation).with_origin(self.origin))
    }

    /// Set the rotation written into the exported document for `page`
    pub fn rotate_page(&mut self, page: u32, rotation: Rotation) -> Result<(), ValidationError> {
        self.check_page(page)?;
        if rotation == Rotation::Deg0 {
            self.page_rotations.remove(&page);
        } else {
            self.page_rotations.insert(page, rotation);
        }
        Ok(())
    }

    /// Like [`Session::rotate_page`], from a degree value
    pub fn rotate_page_degrees(&mut self, page: u32, degrees: i32) -> Result<(), ValidationError> {
        let rotation = Rotation::from_degrees(degrees).ok_or(ValidationError::Rotation(degrees))?;
        self.rotate_page(page, rotation)
    }

    pub fn page_rotation(&self, page: u32) -> Rotation {
        self.page_rotations.get(&page).copied().unwrap_or_default()
    }

    pub fn page_rotations(&self) -> &BTreeMap<u32, Rotation> {
        &self.page_rotations
    }

    // --- state ------------------------------------------------------------

    pub fn layers(&self) -> &ElementLayers {
        &self.layers
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn tools(&self) -> &ToolController {
        &self.tools
    }

    /// Settings of `kind`; changing them never touches history
    pub fn tool_settings_mut(&mut self, kind: ToolKind) -> &mut ToolSettings {
        self.tools.settings_mut(kind)
    }

    pub fn active_tool(&self) -> ToolKind {
        self.tools.active()
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    /// Bumped on every committed mutation
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Bumped on every visible change, including live previews
    pub fn view_revision(&self) -> u64 {
        self.view_revision
    }

    /// Text box currently being edited
    pub fn editing_text(&self) -> Option<ElementId> {
        self.editing.as_ref().map(|edit| edit.id)
    }

    fn touch(&mut self) {
        self.view_revision += 1;
    }

    fn commit(&mut self, action: &'static str) {
        self.history.commit(self.layers.snapshot());
        self.revision += 1;
        self.touch();
        tracing::debug!(
            action,
            revision = self.revision,
            elements = self.layers.element_count(),
            "edit committed"
        );
    }

    /// Drop uncommitted layer changes by returning to the last history entry
    fn rollback(&mut self) {
        if let Some(snapshot) = self.history.current() {
            self.layers.restore(snapshot);
        }
        let layers = &self.layers;
        self.selection.retain(|id| layers.contains(id));
    }

    /// Discard the pointer gesture in progress, restoring anything it erased
    fn abort_gesture(&mut self) {
        if self.erased > 0 {
            self.rollback();
            self.touch();
        }
        self.tools.cancel_gesture();
        self.erased = 0;
        self.manipulation = None;
    }

    /// Stop whatever is in flight before the page or tool changes
    fn interrupt(&mut self) {
        self.commit_text();
        self.abort_gesture();
        if self.ocr.cancel() {
            tracing::debug!("in-flight recognition cancelled");
        }
    }

    // --- tools ------------------------------------------------------------

    /// Pointer cursor for the active tool
    pub fn cursor(&self) -> Cursor {
        self.tools.active().definition().cursor
    }

    /// Switch tools; clears the selection and discards the gesture in progress
    pub fn activate_tool(&mut self, kind: ToolKind) -> bool {
        self.interrupt();
        self.selection.clear();
        let changed = self.tools.activate(kind);
        self.touch();
        changed
    }

    /// Image data placed by the next image or signature gesture
    pub fn load_image(&mut self, data: impl Into<Arc<[u8]>>, kind: ImageKind) -> Result<(), ValidationError> {
        let data = data.into();
        check_image(&data)?;
        self.pending_image = Some(PendingImage { data, kind });
        Ok(())
    }

    pub fn pointer_down(&mut self, pointer: PointerPoint) -> PointerOutcome {
        let viewport = self.viewport();
        let point = to_document(pointer, &viewport);
        let tolerance = viewport.to_document_distance(self.config.hit_tolerance);

        let tool = self.tools.active();
        if !tool.definition().blocks_selection {
            return self.select_down(point, tolerance, &viewport);
        }
        match tool {
            ToolKind::Eraser => {
                self.erased = 0;
                self.tools.pointer_down(point);
                self.erase_at(point)
            }
            ToolKind::Text => {
                self.commit_text();
                self.tools.pointer_down(point);
                PointerOutcome::Ignored
            }
            _ => {
                self.tools.pointer_down(point);
                self.touch();
                PointerOutcome::Preview
            }
        }
    }

    pub fn pointer_move(&mut self, pointer: PointerPoint) -> PointerOutcome {
        let point = to_document(pointer, &self.viewport());

        if let Some(manipulation) = &mut self.manipulation {
            manipulation.update_position(point);
            self.touch();
            return PointerOutcome::Preview;
        }
        if !self.tools.pointer_move(point) {
            return PointerOutcome::Ignored;
        }
        match self.tools.active() {
            ToolKind::Eraser => self.erase_at(point),
            ToolKind::Text => PointerOutcome::Ignored,
            _ => {
                self.touch();
                PointerOutcome::Preview
            }
        }
    }

    pub fn pointer_up(&mut self, pointer: PointerPoint) -> PointerOutcome {
        let point = to_document(pointer, &self.viewport());

        if let Some(mut manipulation) = self.manipulation.take() {
            manipulation.update_position(point);
            return self.finish_manipulation(manipulation);
        }

        let tool = self.tools.active();
        if tool == ToolKind::Eraser {
            if !self.tools.is_gesture_active() {
                return PointerOutcome::Ignored;
            }
            self.tools.pointer_move(point);
            self.erase_at(point);
            self.tools.pointer_up(point);
            let erased = std::mem::take(&mut self.erased);
            if erased == 0 {
                return PointerOutcome::Ignored;
            }
            self.commit("erase");
            return PointerOutcome::Erased(erased);
        }

        let Some(outcome) = self.tools.pointer_up(point) else {
            return PointerOutcome::Ignored;
        };
        self.touch();
        let page = self.current_page;

        match (tool, outcome) {
            (ToolKind::Select, _) => PointerOutcome::Selected(None),
            (ToolKind::Text, GestureOutcome::Click(at)) => self.text_click(at),
            (ToolKind::Freeform, GestureOutcome::Stroke(points)) => {
                let settings = self.tools.settings(ToolKind::Freeform);
                let smoothed = ink::smooth(&points, settings.smoothing);
                let mut stroke = InkStroke::new(page, smoothed, settings.color, settings.stroke_width);
                stroke.opacity = settings.opacity;
                self.create(Element::Ink(stroke), "ink")
            }
            (ToolKind::Ocr, GestureOutcome::Drag { start, end }) => {
                PointerOutcome::OcrRequested(Some(DocRect::from_corners(start, end)))
            }
            (ToolKind::Ocr, _) => PointerOutcome::OcrRequested(None),
            (ToolKind::Image | ToolKind::Signature, outcome) => {
                let kind = if tool == ToolKind::Signature {
                    ImageKind::Signature
                } else {
                    ImageKind::Picture
                };
                let rect = match outcome {
                    GestureOutcome::Drag { start, end } => DocRect::from_corners(start, end),
                    GestureOutcome::Click(at) => {
                        let (w, h) = if kind == ImageKind::Signature {
                            CLICK_SIGNATURE_SIZE
                        } else {
                            CLICK_IMAGE_SIZE
                        };
                        DocRect::new(at.x, at.y, w, h)
                    }
                    GestureOutcome::Stroke(points) => {
                        ink::bounds(&points).unwrap_or_default()
                    }
                };
                match self.pending_image.take() {
                    Some(pending) if pending.kind == kind => {
                        let mut image = ImageElement::new(page, rect, pending.data, kind);
                        image.opacity = self.tools.settings(tool).opacity;
                        self.create(Element::Image(image), "image")
                    }
                    other => {
                        self.pending_image = other;
                        PointerOutcome::ImageRequested { rect, kind }
                    }
                }
            }
            (_, GestureOutcome::Drag { start, end }) => {
                match self.element_from_drag(tool, start, end) {
                    Some(element) if self.large_enough(&element) => self.create(element, "draw"),
                    _ => PointerOutcome::Discarded,
                }
            }
            _ => PointerOutcome::Discarded,
        }
    }

    fn select_down(&mut self, point: DocPoint, tolerance: f32, viewport: &Viewport) -> PointerOutcome {
        let page = self.current_page;

        if let Some((_, id)) = self.selection.single() {
            if let Some(element) = self.layers.get(id) {
                let size = viewport.to_document_distance(self.config.handle_size);
                let handles = generate_handles(&element, size);
                if let Some(handle) = hit_handle(&handles, &point, tolerance) {
                    self.manipulation = Some(ManipulationState::new(element, handle, point));
                    return PointerOutcome::Preview;
                }
            }
        }

        match self.layers.hit_test(page, point, tolerance) {
            Some((kind, id)) => {
                self.selection.select(page, kind, id);
                if let Some(element) = self.layers.get(id) {
                    self.manipulation =
                        Some(ManipulationState::new(element, HandleType::Move, point));
                }
                self.touch();
                PointerOutcome::Selected(Some(id))
            }
            None => {
                let had_selection = !self.selection.is_empty();
                self.selection.clear();
                if had_selection {
                    self.touch();
                }
                PointerOutcome::Selected(None)
            }
        }
    }

    fn finish_manipulation(&mut self, manipulation: ManipulationState) -> PointerOutcome {
        let id = manipulation.element_id;
        if !manipulation.has_moved() {
            return PointerOutcome::Selected(Some(id));
        }
        let element = manipulation.calculate();
        if !self.large_enough(&element) || !self.layers.replace(element) {
            self.touch();
            return PointerOutcome::Discarded;
        }
        self.commit("manipulate");
        PointerOutcome::Modified(id)
    }

    fn erase_at(&mut self, point: DocPoint) -> PointerOutcome {
        let radius = self.tools.settings(ToolKind::Eraser).stroke_width;
        let removed = self.layers.erase(self.current_page, point, radius);
        self.touch();
        if removed.is_empty() {
            return PointerOutcome::Preview;
        }
        self.erased += removed.len();
        self.selection.retain(|id| !removed.contains(&id));
        tracing::debug!(count = removed.len(), "erased elements");
        PointerOutcome::Erased(removed.len())
    }

    fn text_click(&mut self, at: DocPoint) -> PointerOutcome {
        let page = self.current_page;
        let tolerance = self.viewport().to_document_distance(self.config.hit_tolerance);

        if let Some(id) = self.layers.text.hit_test(page, at, tolerance) {
            let original = self
                .layers
                .text
                .get(id)
                .map(|text| text.text.clone())
                .unwrap_or_default();
            self.editing = Some(TextEdit {
                id,
                created: false,
                original,
            });
            self.selection.select(page, LayerKind::Text, id);
            return PointerOutcome::EditingText(id);
        }

        let style = text_style(self.tools.settings(ToolKind::Text));
        let rect = DocRect::new(at.x, at.y, TEXT_BOX_WIDTH, style.font_size * LINE_SPACING);
        let mut text = TextBox::new(page, rect, "", style);
        text.opacity = self.tools.settings(ToolKind::Text).opacity;
        let id = text.id;
        self.layers.add(Element::Text(text));
        self.editing = Some(TextEdit {
            id,
            created: true,
            original: String::new(),
        });
        self.selection.select(page, LayerKind::Text, id);
        PointerOutcome::EditingText(id)
    }

    /// Replace the text of the box being edited; not committed until blur
    pub fn set_text(&mut self, text: impl Into<String>) -> bool {
        let Some(edit) = &self.editing else {
            return false;
        };
        let text = text.into();
        let lines = text.lines().count().max(1) as f32;
        let id = edit.id;

        let Some(current) = self.layers.text.get(id) else {
            return false;
        };
        let min_height = current.style.font_size * LINE_SPACING * lines;
        let mut rect = current.rect;
        rect.height = rect.height.max(min_height);

        let patch = TextBoxPatch {
            text: Some(text),
            rect: Some(rect),
            ..TextBoxPatch::default()
        };
        self.layers.text.update(id, &patch);
        self.touch();
        true
    }

    /// Finish editing (text blur) and commit if anything changed
    ///
    /// A new box left empty is removed without a history entry.
    pub fn commit_text(&mut self) -> Option<ElementId> {
        let edit = self.editing.take()?;
        let text = self.layers.text.get(edit.id).map(|t| t.text.clone())?;

        if text.trim().is_empty() && edit.created {
            self.layers.text.remove(edit.id);
            self.selection.retain(|id| id != edit.id);
            self.touch();
            return None;
        }
        if text != edit.original || edit.created {
            self.commit("text");
        }
        Some(edit.id)
    }

    /// Abandon the current text edit
    pub fn cancel_text_edit(&mut self) {
        let Some(edit) = self.editing.take() else {
            return;
        };
        if edit.created {
            self.layers.text.remove(edit.id);
            self.selection.retain(|id| id != edit.id);
        } else {
            let patch = TextBoxPatch {
                text: Some(edit.original),
                ..TextBoxPatch::default()
            };
            self.layers.text.update(edit.id, &patch);
        }
        self.touch();
    }

    /// Element a drag with `tool` would create, used for both preview and commit
    fn element_from_drag(&self, tool: ToolKind, start: DocPoint, end: DocPoint) -> Option<Element> {
        let page = self.current_page;
        let settings = self.tools.settings(tool);
        let rect = DocRect::from_corners(start, end);

        let shape = |geometry: ShapeGeometry| {
            let mut shape = ShapeAnnotation::new(page, geometry, settings.color, settings.stroke_width);
            shape.fill = settings.fill;
            shape.opacity = settings.opacity;
            Element::Shape(shape)
        };

        let element = match tool {
            ToolKind::Rectangle => shape(ShapeGeometry::Rectangle { rect }),
            ToolKind::Circle => shape(ShapeGeometry::Ellipse { rect }),
            ToolKind::Line => shape(ShapeGeometry::Line { start, end }),
            ToolKind::Highlight => {
                let mut highlight = ShapeAnnotation::highlight(page, rect, settings.color);
                highlight.opacity = settings.opacity;
                Element::Shape(highlight)
            }
            ToolKind::Redaction => {
                let mut block = RedactionBlock::new(page, rect);
                block.fill = settings.color;
                Element::Redaction(block)
            }
            ToolKind::FormField => {
                let kind = match settings.field_kind {
                    FieldKindChoice::Text => FormFieldKind::Text {
                        value: String::new(),
                        multiline: false,
                    },
                    FieldKindChoice::Multiline => FormFieldKind::Text {
                        value: String::new(),
                        multiline: true,
                    },
                    FieldKindChoice::Checkbox => FormFieldKind::Checkbox { checked: false },
                    FieldKindChoice::Choice => FormFieldKind::Choice {
                        options: Vec::new(),
                        selected: None,
                    },
                };
                let mut field = FormField::new(page, rect, self.unique_field_name("field"), kind);
                field.font_size = settings.font_size;
                Element::FormField(field)
            }
            _ => return None,
        };
        Some(element)
    }

    /// Minimum-size rule for shapes and fields; layers enforce their own
    fn large_enough(&self, element: &Element) -> bool {
        let minimum = self.config.min_shape_size;
        match element {
            Element::Shape(shape) => match shape.geometry {
                ShapeGeometry::Line { start, end } => start.distance_to(&end) > minimum,
                geometry => geometry.bounds().max_side() > minimum,
            },
            Element::FormField(field) => field.rect.max_side() > minimum,
            Element::Redaction(block) => {
                block.rect.width > self.config.min_redaction_size
                    && block.rect.height > self.config.min_redaction_size
            }
            _ => true,
        }
    }

    fn unique_field_name(&self, base: &str) -> String {
        let taken = |name: &str| self.layers.fields.iter().any(|f| f.name == name);
        if !taken(base) && base != "field" {
            return base.to_string();
        }
        (1..)
            .map(|n| format!("{base}_{n}"))
            .find(|name| !taken(name))
            .unwrap_or_else(|| format!("{base}_{}", uuid::Uuid::new_v4().simple()))
    }

    fn create(&mut self, element: Element, action: &'static str) -> PointerOutcome {
        match self.layers.add(element) {
            Some(id) => {
                self.commit(action);
                PointerOutcome::Created(id)
            }
            None => PointerOutcome::Discarded,
        }
    }

    /// Live preview of the gesture in progress, in document space
    pub fn preview(&self) -> Option<Preview> {
        if let Some(manipulation) = &self.manipulation {
            return manipulation
                .has_moved()
                .then(|| Preview::Element(manipulation.calculate()));
        }

        let tool = self.tools.active();
        match self.tools.gesture() {
            Gesture::Idle => None,
            Gesture::Stroke { points } if tool == ToolKind::Eraser => {
                points.last().map(|center| Preview::Eraser {
                    center: *center,
                    radius: self.tools.settings(ToolKind::Eraser).stroke_width,
                })
            }
            Gesture::Stroke { points } => {
                let settings = self.tools.settings(tool);
                let mut stroke = InkStroke::new(
                    self.current_page,
                    points.clone(),
                    settings.color,
                    settings.stroke_width,
                );
                stroke.opacity = settings.opacity;
                Some(Preview::Element(Element::Ink(stroke)))
            }
            Gesture::Drag { start, current } => match tool {
                ToolKind::Select | ToolKind::Text => None,
                ToolKind::Image | ToolKind::Signature | ToolKind::Ocr => {
                    Some(Preview::Region(DocRect::from_corners(*start, *current)))
                }
                _ => self
                    .element_from_drag(tool, *start, *current)
                    .map(Preview::Element),
            },
        }
    }

    /// Render-space scene of `page`, with overlays when it is the current page
    pub fn scene(&self, page: u32) -> Result<Vec<Primitive>, ValidationError> {
        let viewport = self.viewport_for(page)?;
        let overlay = if page == self.current_page {
            SceneOverlay {
                selection: self.selection.ids().collect(),
                preview: self.preview(),
                handle_size: viewport.to_document_distance(self.config.handle_size),
            }
        } else {
            SceneOverlay::default()
        };
        Ok(scene_for_page(&self.layers, page, &viewport, &overlay))
    }

    // --- edits ------------------------------------------------------------

    /// Insert an element programmatically; one history entry
    pub fn add_element(&mut self, element: Element) -> EditorResult<ElementId> {
        self.check_page(element.page())?;
        if let Element::Image(image) = &element {
            check_image(&image.data)?;
        }
        if !self.large_enough(&element) {
            return Err(ValidationError::BelowMinimumSize.into());
        }
        let id = self
            .layers
            .add(element)
            .ok_or(ValidationError::BelowMinimumSize)?;
        self.commit("add");
        Ok(id)
    }

    /// Insert several elements as one history entry; nothing is added on error
    pub fn add_elements(&mut self, elements: Vec<Element>) -> EditorResult<Vec<ElementId>> {
        for element in &elements {
            self.check_page(element.page())?;
            if let Element::Image(image) = element {
                check_image(&image.data)?;
            }
            if !self.large_enough(element) {
                return Err(ValidationError::BelowMinimumSize.into());
            }
        }
        let before = self.layers.clone();
        let mut ids = Vec::with_capacity(elements.len());
        for element in elements {
            match self.layers.add(element) {
                Some(id) => ids.push(id),
                None => {
                    self.layers = before;
                    return Err(ValidationError::BelowMinimumSize.into());
                }
            }
        }
        if !ids.is_empty() {
            self.commit("add");
        }
        Ok(ids)
    }

    /// Place an image from encoded PNG or JPEG bytes
    pub fn insert_image(
        &mut self,
        page: u32,
        rect: DocRect,
        data: impl Into<Arc<[u8]>>,
        kind: ImageKind,
    ) -> EditorResult<ElementId> {
        let image = ImageElement::new(page, rect.normalized(), data.into(), kind);
        self.add_element(Element::Image(image))
    }

    pub fn update(&mut self, id: ElementId, patch: ElementPatch) -> EditorResult<()> {
        let kind = self
            .layers
            .kind_of(id)
            .ok_or(ValidationError::UnknownElement(id))?;
        if kind != patch.kind() {
            return Err(ValidationError::PatchMismatch(id).into());
        }
        let mut patched = self.layers.clone();
        if !patched.update(id, &patch) {
            return Err(ValidationError::BelowMinimumSize.into());
        }
        let element = patched.get(id).ok_or(ValidationError::UnknownElement(id))?;
        if !self.large_enough(&element) {
            return Err(ValidationError::BelowMinimumSize.into());
        }
        self.layers = patched;
        self.commit("update");
        Ok(())
    }

    /// Change a form field's value; undoable
    pub fn set_field_value(&mut self, id: ElementId, value: FormFieldKind) -> EditorResult<()> {
        let field = self
            .layers
            .fields
            .get(id)
            .ok_or(ValidationError::UnknownElement(id))?;
        if std::mem::discriminant(&field.kind) != std::mem::discriminant(&value) {
            return Err(ValidationError::PatchMismatch(id).into());
        }
        self.update(
            id,
            ElementPatch::FormField(FormFieldPatch {
                kind: Some(value),
                ..Default::default()
            }),
        )
    }

    pub fn field_by_name(&self, name: &str) -> Option<&FormField> {
        self.layers.fields.iter().find(|field| field.name == name)
    }

    /// Remove the selected elements; one history entry
    pub fn delete_selection(&mut self) -> usize {
        self.commit_text();
        let ids: Vec<ElementId> = self.selection.ids().collect();
        let removed = ids
            .into_iter()
            .filter(|id| self.layers.remove(*id).is_some())
            .count();
        self.selection.clear();
        if removed > 0 {
            self.commit("delete");
        }
        removed
    }

    pub fn remove(&mut self, id: ElementId) -> EditorResult<Element> {
        let element = self
            .layers
            .remove(id)
            .ok_or(ValidationError::UnknownElement(id))?;
        self.selection.retain(|selected| selected != id);
        self.commit("remove");
        Ok(element)
    }

    pub fn undo(&mut self) -> bool {
        self.commit_text();
        let Some(snapshot) = self.history.undo() else {
            return false;
        };
        self.layers.restore(snapshot);
        self.after_history_move();
        true
    }

    pub fn redo(&mut self) -> bool {
        self.commit_text();
        let Some(snapshot) = self.history.redo() else {
            return false;
        };
        self.layers.restore(snapshot);
        self.after_history_move();
        true
    }

    fn after_history_move(&mut self) {
        let layers = &self.layers;
        self.selection.retain(|id| layers.contains(id));
        self.manipulation = None;
        self.revision += 1;
        self.touch();
        tracing::debug!(revision = self.revision, "history moved");
    }

    /// Copy the selection to the session clipboard
    pub fn copy(&mut self) -> usize {
        self.clipboard = self
            .selection
            .ids()
            .filter_map(|id| self.layers.get(id))
            .collect();
        self.clipboard.len()
    }

    /// Paste the clipboard onto the current page, offset from the originals
    pub fn paste(&mut self) -> Vec<ElementId> {
        if self.clipboard.is_empty() {
            return Vec::new();
        }
        self.commit_text();
        let page = self.current_page;
        let offset = self.config.paste_offset;

        self.selection.clear();
        let mut pasted = Vec::with_capacity(self.clipboard.len());
        let mut ids = Vec::with_capacity(self.clipboard.len());
        for original in std::mem::take(&mut self.clipboard) {
            let mut copy = original.duplicate(page, offset, offset);
            if let Element::FormField(field) = &mut copy {
                field.origin = FieldOrigin::Created;
                field.name = self.unique_field_name(&field.name);
            }
            let kind = copy.kind();
            if let Some(id) = self.layers.add(copy.clone()) {
                self.selection.toggle(page, kind, id);
                ids.push(id);
            }
            pasted.push(copy);
        }
        // Repeated pastes cascade from the last copy
        self.clipboard = pasted;
        if !ids.is_empty() {
            self.commit("paste");
        }
        ids
    }

    /// Handle a key press; returns the command that was executed
    ///
    /// [`Command::Save`] is returned for the host to run the export.
    pub fn handle_key(&mut self, mut input: KeyInput) -> Option<Command> {
        if self.editing.is_some() {
            input.in_text_input = true;
        }
        let command = resolve_key(&input, &self.shortcuts)?;
        match command {
            Command::Undo => {
                self.undo();
            }
            Command::Redo => {
                self.redo();
            }
            Command::Copy => {
                self.copy();
            }
            Command::Paste => {
                self.paste();
            }
            Command::Save => {
                self.commit_text();
            }
            Command::DeleteSelection => {
                self.delete_selection();
            }
            Command::ActivateTool(kind) => {
                self.activate_tool(kind);
            }
            Command::PreviousPage => {
                self.previous_page();
            }
            Command::NextPage => {
                self.next_page();
            }
            Command::FirstPage => {
                self.first_page();
            }
            Command::LastPage => {
                self.last_page();
            }
        }
        Some(command)
    }

    // --- OCR --------------------------------------------------------------

    /// Start recognition on the current page, superseding any earlier job
    pub fn start_ocr(&mut self, region: Option<DocRect>) -> OcrJob {
        let (ticket, token) = self.ocr.begin();
        OcrJob {
            ticket,
            token,
            page: self.current_page,
            viewport: self.viewport(),
            region,
        }
    }

    /// Turn recognized blocks into text boxes in one history entry
    ///
    /// Fails with [`OcrError::Stale`] when the job was superseded or the page
    /// or tool changed since it started.
    pub fn promote_ocr(&mut self, job: &OcrJob, blocks: &[OcrBlock]) -> EditorResult<Vec<ElementId>> {
        if !self.ocr.finish(job.ticket()) || job.page != self.current_page {
            tracing::warn!(page = job.page, "discarding stale recognition result");
            return Err(OcrError::Stale.into());
        }

        let style = text_style(self.tools.settings(ToolKind::Text));
        let boxes = blocks_to_text_boxes(
            blocks,
            job.page,
            &job.viewport,
            job.region.as_ref(),
            self.config.ocr_min_confidence,
            &style,
        );
        let ids: Vec<ElementId> = boxes
            .into_iter()
            .filter_map(|text| self.layers.add(Element::Text(text)))
            .collect();
        if !ids.is_empty() {
            self.commit("ocr");
        }
        tracing::info!(page = job.page, promoted = ids.len(), "recognized text promoted");
        Ok(ids)
    }

    /// Render the current page, recognize it and promote the result
    pub fn recognize_page(
        &mut self,
        engine: &mut dyn OcrEngine,
        region: Option<DocRect>,
        progress: &mut dyn FnMut(f32),
    ) -> EditorResult<Vec<ElementId>> {
        let job = self.start_ocr(region);
        let image = self
            .renderer
            .render_page(self.document, job.page, &job.viewport.page_viewport(), &job.token)
            .map_err(|source| match source {
                EngineError::Cancelled => EditorError::Ocr(OcrError::Cancelled),
                source => EditorError::Render {
                    page: job.page,
                    source,
                },
            })?;
        let blocks = job.run(engine, &image, progress)?;
        self.promote_ocr(&job, &blocks)
    }

    // --- redaction debug store -------------------------------------------

    pub fn redactions(&self) -> Vec<RedactionBlock> {
        self.layers.redactions.iter().cloned().collect()
    }

    /// Replace the redaction layer; one history entry
    ///
    /// Blocks at or under the minimum redaction size are dropped; returns how
    /// many were restored.
    pub fn restore_redactions(&mut self, blocks: Vec<RedactionBlock>) -> EditorResult<usize> {
        for block in &blocks {
            self.check_page(block.page)?;
        }
        let count = self.layers.redactions.replace_all(blocks);
        self.commit("restore redactions");
        Ok(count)
    }

    pub fn save_redactions<S: KeyValueStore>(&self, store: &mut RedactionStore<S>) -> EditorResult<()> {
        store.save(&self.document_key(), &self.redactions())?;
        Ok(())
    }

    /// Load previously saved redactions; returns how many were restored
    pub fn load_redactions<S: KeyValueStore>(&mut self, store: &RedactionStore<S>) -> EditorResult<usize> {
        let blocks = store.load(&self.document_key())?;
        if blocks.is_empty() {
            return Ok(0);
        }
        self.restore_redactions(blocks)
    }

    pub fn document_key(&self) -> String {
        document_key(&self.file_name, &self.source)
    }

    // --- export -----------------------------------------------------------

    pub(crate) fn export_parts(&mut self) -> ExportParts<'_> {
        self.commit_text();
        ExportParts {
            source: &self.source,
            layers: &self.layers,
            rotations: &self.page_rotations,
            fonts: &mut self.fonts,
        }
    }
}

/// Borrowed session state consumed by the export pipeline
pub(crate) struct ExportParts<'a> {
    pub source: &'a [u8],
    pub layers: &'a ElementLayers,
    pub rotations: &'a BTreeMap<u32, Rotation>,
    pub fonts: &'a mut FontService,
}

fn text_style(settings: &ToolSettings) -> TextStyle {
    TextStyle {
        font_family: settings.font_family.clone(),
        font_size: settings.font_size,
        color: settings.color,
        bold: settings.bold,
        italic: settings.italic,
        align: settings.align,
    }
}

fn check_image(data: &[u8]) -> Result<(), ValidationError> {
    match image::guess_format(data) {
        Ok(image::ImageFormat::Png | image::ImageFormat::Jpeg) => Ok(()),
        Ok(format) => Err(ValidationError::Image(format!("{format:?} is not supported"))),
        Err(err) => Err(ValidationError::Image(err.to_string())),
    }
}

/// Form field for a widget already in the document
///
/// Signature and button widgets are not editable fields.
fn detected_field(page: u32, size: PageSize, widget: &WidgetAnnotation) -> Option<FormField> {
    let kind = match &widget.kind {
        WidgetKind::Text { multiline } => FormFieldKind::Text {
            value: widget.value.clone().unwrap_or_default(),
            multiline: *multiline,
        },
        WidgetKind::Checkbox => FormFieldKind::Checkbox {
            checked: widget.checked,
        },
        WidgetKind::Choice { options } => FormFieldKind::Choice {
            options: options.clone(),
            selected: widget.value.clone(),
        },
        WidgetKind::Signature | WidgetKind::Button => return None,
    };

    let [x0, y0, x1, y1] = widget.rect;
    let rect = DocRect::new(
        x0.min(x1),
        size.height_pt - y0.max(y1),
        (x1 - x0).abs(),
        (y1 - y0).abs(),
    );
    let mut field = FormField::new(page, rect, widget.name.clone(), kind);
    field.origin = FieldOrigin::Detected;
    if widget.font_size > 0.0 {
        field.font_size = widget.font_size;
    }
    Some(field)
}
