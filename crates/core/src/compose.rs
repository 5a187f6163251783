//! Page composition
//!
//! Each visible page is a stack: the engine raster at the bottom, then the
//! six element layers in z-order, then selection chrome and the live gesture
//! preview. [`scene_for_page`] flattens that stack into render-space
//! [`Primitive`]s; a [`Surface`] paints them over the cached raster.
//!
//! The [`Compositor`] owns the raster cache and one render slot per mounted
//! surface. Starting a render for a surface supersedes the one in flight, and
//! a superseded result is dropped rather than painted.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use folio_cache::{CacheStats, CachedRaster, MemoryMonitor, MemoryReport, RasterCache, RasterKey};
use folio_engine::{EngineError, EngineResult, PageViewport, Renderer, RgbaImage};
use folio_scheduler::{CancellationToken, PageWindow, TaskSlot, TaskTicket};
use tiny_skia::{
    ColorU8, FillRule, FilterQuality, LineCap, LineJoin, Paint, Path, PathBuilder, Pixmap,
    PixmapPaint, Rect, Stroke, Transform,
};

use crate::config::EditorConfig;
use crate::element::{
    Color, Element, ElementId, LayerElement, LayerKind, ShapeGeometry, TextAlign,
};
use crate::error::{EditorError, EditorResult};
use crate::handles::{generate_handles, HandleType};
use crate::layers::{ElementLayers, Layer};
use crate::session::Session;
use crate::transform::{DocPoint, DocRect, RenderPoint, RenderRect, Viewport};

/// In-progress gesture feedback, in document space
#[derive(Debug, Clone, PartialEq)]
pub enum Preview {
    /// The element the gesture would commit; replaces a committed element
    /// with the same id while it is being manipulated
    Element(Element),

    /// Region picked for an image, signature or OCR
    Region(DocRect),
    Eraser { center: DocPoint, radius: f32 },
}

/// One drawable item in render-space pixels
#[derive(Debug, Clone, PartialEq)]
pub enum Primitive {
    Redaction {
        id: ElementId,
        rect: RenderRect,
        fill: Color,
    },
    Rectangle {
        id: ElementId,
        rect: RenderRect,
        stroke: Color,
        fill: Option<Color>,
        stroke_width: f32,
        opacity: f32,
    },
    Ellipse {
        id: ElementId,
        rect: RenderRect,
        stroke: Color,
        fill: Option<Color>,
        stroke_width: f32,
        opacity: f32,
    },
    Highlight {
        id: ElementId,
        rect: RenderRect,
        color: Color,
        opacity: f32,
    },
    Line {
        id: ElementId,
        start: RenderPoint,
        end: RenderPoint,
        color: Color,
        width: f32,
        opacity: f32,
    },
    Ink {
        id: ElementId,
        points: Vec<RenderPoint>,
        color: Color,
        width: f32,
        opacity: f32,
    },
    Text {
        id: ElementId,
        rect: RenderRect,
        lines: Vec<String>,

        /// Already multiplied by the view scale
        font_size: f32,
        color: Color,
        align: TextAlign,

        /// Clockwise degrees, element rotation plus view rotation
        rotation: f32,
        opacity: f32,
    },
    Image {
        id: ElementId,
        rect: RenderRect,
        data: Arc<[u8]>,
        rotation: f32,
        opacity: f32,
    },
    FieldOutline {
        id: ElementId,
        rect: RenderRect,
        name: String,
    },
    SelectionOutline {
        id: ElementId,
        rect: RenderRect,
    },
    Handle {
        rect: RenderRect,
        rotate: bool,
    },
    Region {
        rect: RenderRect,
    },
    EraserCursor {
        center: RenderPoint,
        radius: f32,
    },
}

impl Primitive {
    /// Layer the primitive was built from; `None` for overlays
    pub fn layer(&self) -> Option<LayerKind> {
        match self {
            Primitive::Redaction { .. } => Some(LayerKind::Redaction),
            Primitive::Rectangle { .. }
            | Primitive::Ellipse { .. }
            | Primitive::Highlight { .. }
            | Primitive::Line { .. } => Some(LayerKind::Shape),
            Primitive::Ink { .. } => Some(LayerKind::Ink),
            Primitive::Text { .. } => Some(LayerKind::Text),
            Primitive::Image { .. } => Some(LayerKind::Image),
            Primitive::FieldOutline { .. } => Some(LayerKind::FormField),
            _ => None,
        }
    }

    pub fn element_id(&self) -> Option<ElementId> {
        match self {
            Primitive::Redaction { id, .. }
            | Primitive::Rectangle { id, .. }
            | Primitive::Ellipse { id, .. }
            | Primitive::Highlight { id, .. }
            | Primitive::Line { id, .. }
            | Primitive::Ink { id, .. }
            | Primitive::Text { id, .. }
            | Primitive::Image { id, .. }
            | Primitive::FieldOutline { id, .. }
            | Primitive::SelectionOutline { id, .. } => Some(*id),
            _ => None,
        }
    }
}

/// Map one element into render space
pub fn element_primitive(element: &Element, viewport: &Viewport) -> Primitive {
    let view_degrees = f32::from(viewport.rotation.degrees());
    match element {
        Element::Redaction(block) => Primitive::Redaction {
            id: block.id,
            rect: viewport.to_render_rect(&block.rect),
            fill: block.fill,
        },
        Element::Shape(shape) => {
            let stroke_width = viewport.to_render_distance(shape.stroke_width);
            match shape.geometry {
                ShapeGeometry::Rectangle { rect } => Primitive::Rectangle {
                    id: shape.id,
                    rect: viewport.to_render_rect(&rect),
                    stroke: shape.stroke,
                    fill: shape.fill,
                    stroke_width,
                    opacity: shape.opacity,
                },
                ShapeGeometry::Ellipse { rect } => Primitive::Ellipse {
                    id: shape.id,
                    rect: viewport.to_render_rect(&rect),
                    stroke: shape.stroke,
                    fill: shape.fill,
                    stroke_width,
                    opacity: shape.opacity,
                },
                ShapeGeometry::Highlight { rect } => Primitive::Highlight {
                    id: shape.id,
                    rect: viewport.to_render_rect(&rect),
                    color: shape.fill.unwrap_or(shape.stroke),
                    opacity: shape.opacity,
                },
                ShapeGeometry::Line { start, end } => Primitive::Line {
                    id: shape.id,
                    start: viewport.to_render_point(start),
                    end: viewport.to_render_point(end),
                    color: shape.stroke,
                    width: stroke_width,
                    opacity: shape.opacity,
                },
            }
        }
        Element::Ink(stroke) => Primitive::Ink {
            id: stroke.id,
            points: stroke
                .points
                .iter()
                .map(|p| viewport.to_render_point(*p))
                .collect(),
            color: stroke.color,
            width: viewport.to_render_distance(stroke.width),
            opacity: stroke.opacity,
        },
        Element::Text(text) => Primitive::Text {
            id: text.id,
            rect: viewport.to_render_rect(&text.rect),
            lines: text.text.lines().map(str::to_string).collect(),
            font_size: viewport.to_render_distance(text.style.font_size),
            color: text.style.color,
            align: text.style.align,
            rotation: (text.rotation + view_degrees).rem_euclid(360.0),
            opacity: text.opacity,
        },
        Element::Image(image) => Primitive::Image {
            id: image.id,
            rect: viewport.to_render_rect(&image.rect),
            data: image.data.clone(),
            rotation: (image.rotation + view_degrees).rem_euclid(360.0),
            opacity: image.opacity,
        },
        Element::FormField(field) => Primitive::FieldOutline {
            id: field.id,
            rect: viewport.to_render_rect(&field.rect),
            name: field.name.clone(),
        },
    }
}

/// Chrome drawn above the element layers of the current page
#[derive(Debug, Clone, Default)]
pub struct SceneOverlay {
    pub selection: Vec<ElementId>,
    pub preview: Option<Preview>,

    /// Handle edge length in document units
    pub handle_size: f32,
}

/// Flatten `page` into primitives, bottom to top
pub fn scene_for_page(
    layers: &ElementLayers,
    page: u32,
    viewport: &Viewport,
    overlay: &SceneOverlay,
) -> Vec<Primitive> {
    let replaced = match &overlay.preview {
        Some(Preview::Element(element)) => Some(element.id()),
        _ => None,
    };

    let mut scene = Vec::new();
    for kind in LayerKind::Z_ORDER {
        match kind {
            LayerKind::Redaction => push_layer(&mut scene, &layers.redactions, page, viewport, replaced),
            LayerKind::Shape => push_layer(&mut scene, &layers.shapes, page, viewport, replaced),
            LayerKind::Ink => push_layer(&mut scene, &layers.ink, page, viewport, replaced),
            LayerKind::Text => push_layer(&mut scene, &layers.text, page, viewport, replaced),
            LayerKind::Image => push_layer(&mut scene, &layers.images, page, viewport, replaced),
            LayerKind::FormField => push_layer(&mut scene, &layers.fields, page, viewport, replaced),
        }
    }

    let manipulated = match &overlay.preview {
        Some(Preview::Element(element)) if layers.contains(element.id()) => Some(element),
        _ => None,
    };
    for id in &overlay.selection {
        let element = match manipulated {
            Some(element) if element.id() == *id => Some(element.clone()),
            _ => layers.get(*id),
        };
        let Some(element) = element.filter(|e| e.page() == page) else {
            continue;
        };
        scene.push(Primitive::SelectionOutline {
            id: *id,
            rect: viewport.to_render_rect(&element.bounds()),
        });
        if overlay.selection.len() == 1 {
            for handle in generate_handles(&element, overlay.handle_size) {
                let half = handle.size / 2.0;
                let rect = DocRect::new(
                    handle.position.x - half,
                    handle.position.y - half,
                    handle.size,
                    handle.size,
                );
                scene.push(Primitive::Handle {
                    rect: viewport.to_render_rect(&rect),
                    rotate: handle.handle_type == HandleType::Rotate,
                });
            }
        }
    }

    match &overlay.preview {
        Some(Preview::Element(element)) if element.page() == page => {
            scene.push(element_primitive(element, viewport));
        }
        Some(Preview::Region(rect)) => scene.push(Primitive::Region {
            rect: viewport.to_render_rect(rect),
        }),
        Some(Preview::Eraser { center, radius }) => scene.push(Primitive::EraserCursor {
            center: viewport.to_render_point(*center),
            radius: viewport.to_render_distance(*radius),
        }),
        _ => {}
    }
    scene
}

fn push_layer<T>(
    scene: &mut Vec<Primitive>,
    layer: &Layer<T>,
    page: u32,
    viewport: &Viewport,
    skip: Option<ElementId>,
) where
    T: LayerElement + Clone + Into<Element>,
{
    for element in layer.for_page(page) {
        if Some(element.id()) == skip {
            continue;
        }
        scene.push(element_primitive(&element.clone().into(), viewport));
    }
}

/// Paint target for one page
pub trait Surface {
    /// Replace the surface contents with `base` overlaid by `scene`
    fn paint(&mut self, base: Option<&CachedRaster>, scene: &[Primitive]);

    /// Drop decoded resources kept between paints; returns how many were released
    fn release_caches(&mut self) -> usize {
        0
    }
}

/// Surface that records what it was asked to paint
#[derive(Debug, Default, Clone)]
pub struct RecordingSurface {
    pub frames: Vec<Vec<Primitive>>,
    pub bases: Vec<Option<RasterKey>>,
}

impl RecordingSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_frame(&self) -> Option<&[Primitive]> {
        self.frames.last().map(Vec::as_slice)
    }
}

impl Surface for RecordingSurface {
    fn paint(&mut self, base: Option<&CachedRaster>, scene: &[Primitive]) {
        self.bases.push(base.map(|raster| raster.key));
        self.frames.push(scene.to_vec());
    }
}

/// Software surface backed by a `tiny-skia` pixmap
///
/// Text is drawn as greeked bars, one per line.
#[derive(Debug, Clone)]
pub struct RasterSurface {
    pixmap: Pixmap,
    decoded: HashMap<ElementId, Option<Pixmap>>,
}

impl RasterSurface {
    /// A white surface, or `None` when the size is too large for a pixmap
    ///
    /// Zero dimensions are raised to one pixel.
    pub fn new(width: u32, height: u32) -> Option<Self> {
        Some(Self {
            pixmap: blank_pixmap(width, height)?,
            decoded: HashMap::new(),
        })
    }

    pub fn pixmap(&self) -> &Pixmap {
        &self.pixmap
    }

    /// Painted pixels as straight (non-premultiplied) RGBA
    pub fn to_image(&self) -> RgbaImage {
        let data = self
            .pixmap
            .pixels()
            .iter()
            .flat_map(|pixel| {
                let color = pixel.demultiply();
                [color.red(), color.green(), color.blue(), color.alpha()]
            })
            .collect();
        RgbaImage::from_raw(self.pixmap.width(), self.pixmap.height(), data)
            .unwrap_or_else(|| RgbaImage::new(self.pixmap.width(), self.pixmap.height()))
    }

    fn draw(&mut self, primitive: &Primitive) {
        let selection = Color::BLUE;
        let pixmap = &mut self.pixmap;
        match primitive {
            Primitive::Redaction { rect, fill, .. } => fill_rect(pixmap, rect, *fill, 1.0),
            Primitive::Rectangle {
                rect,
                stroke,
                fill,
                stroke_width,
                opacity,
                ..
            } => {
                if let Some(fill) = fill {
                    fill_rect(pixmap, rect, *fill, *opacity);
                }
                if let Some(path) = skia_rect(rect).map(PathBuilder::from_rect) {
                    stroke_path(pixmap, &path, *stroke, *stroke_width, *opacity);
                }
            }
            Primitive::Ellipse {
                rect,
                stroke,
                fill,
                stroke_width,
                opacity,
                ..
            } => {
                if let Some(path) = skia_rect(rect).and_then(PathBuilder::from_oval) {
                    if let Some(fill) = fill {
                        let paint = paint(*fill, *opacity);
                        pixmap.fill_path(&path, &paint, FillRule::Winding, Transform::identity(), None);
                    }
                    stroke_path(pixmap, &path, *stroke, *stroke_width, *opacity);
                }
            }
            Primitive::Highlight {
                rect,
                color,
                opacity,
                ..
            } => fill_rect(pixmap, rect, *color, *opacity),
            Primitive::Line {
                start,
                end,
                color,
                width,
                opacity,
                ..
            } => {
                if let Some(path) = polyline(&[*start, *end]) {
                    stroke_path(pixmap, &path, *color, *width, *opacity);
                }
            }
            Primitive::Ink {
                points,
                color,
                width,
                opacity,
                ..
            } => {
                if let Some(path) = polyline(points) {
                    stroke_path(pixmap, &path, *color, *width, *opacity);
                }
            }
            Primitive::Text {
                rect,
                lines,
                font_size,
                color,
                align,
                opacity,
                ..
            } => {
                for (i, line) in lines.iter().enumerate() {
                    let width = (line.chars().count() as f32 * font_size * 0.5).min(rect.width);
                    let x = match align {
                        TextAlign::Left => rect.x,
                        TextAlign::Center => rect.x + (rect.width - width) / 2.0,
                        TextAlign::Right => rect.x + rect.width - width,
                    };
                    let y = rect.y + i as f32 * font_size * 1.2 + font_size * 0.2;
                    let bar = RenderRect::new(x, y, width, font_size * 0.6);
                    fill_rect(pixmap, &bar, *color, *opacity * 0.6);
                }
            }
            Primitive::Image {
                id,
                rect,
                data,
                rotation,
                opacity,
            } => {
                let decoded = self.decoded.entry(*id).or_insert_with(|| {
                    image::load_from_memory(data)
                        .map_err(|err| tracing::warn!(error = %err, "failed to decode image"))
                        .ok()
                        .and_then(|img| pixmap_from_rgba(&img.to_rgba8()))
                });
                if let Some(source) = decoded {
                    draw_image(pixmap, source, rect, *rotation, *opacity);
                }
            }
            Primitive::FieldOutline { rect, .. } => {
                if let Some(path) = skia_rect(rect).map(PathBuilder::from_rect) {
                    stroke_path(pixmap, &path, selection, 1.0, 0.6);
                }
            }
            Primitive::SelectionOutline { rect, .. } | Primitive::Region { rect } => {
                if let Some(path) = skia_rect(rect).map(PathBuilder::from_rect) {
                    stroke_path(pixmap, &path, selection, 1.0, 1.0);
                }
            }
            Primitive::Handle { rect, .. } => {
                fill_rect(pixmap, rect, Color::WHITE, 1.0);
                if let Some(path) = skia_rect(rect).map(PathBuilder::from_rect) {
                    stroke_path(pixmap, &path, selection, 1.0, 1.0);
                }
            }
            Primitive::EraserCursor { center, radius } => {
                let circle = PathBuilder::from_circle(center.x, center.y, *radius);
                if let Some(path) = circle {
                    stroke_path(pixmap, &path, Color::BLACK, 1.0, 0.8);
                }
            }
        }
    }
}

impl Surface for RasterSurface {
    fn paint(&mut self, base: Option<&CachedRaster>, scene: &[Primitive]) {
        let base = base
            .and_then(|raster| RgbaImage::from_raw(raster.width, raster.height, raster.pixels.clone()))
            .and_then(|image| pixmap_from_rgba(&image));
        match base {
            Some(pixmap) => self.pixmap = pixmap,
            None => self.pixmap.fill(tiny_skia::Color::WHITE),
        }

        let live: Vec<ElementId> = scene.iter().filter_map(Primitive::element_id).collect();
        self.decoded.retain(|id, _| live.contains(id));

        for primitive in scene {
            self.draw(primitive);
        }
    }

    fn release_caches(&mut self) -> usize {
        let released = self.decoded.len();
        self.decoded.clear();
        released
    }
}

fn blank_pixmap(width: u32, height: u32) -> Option<Pixmap> {
    let mut pixmap = Pixmap::new(width.max(1), height.max(1))?;
    pixmap.fill(tiny_skia::Color::WHITE);
    Some(pixmap)
}

/// Straight RGBA into a premultiplied pixmap
fn pixmap_from_rgba(image: &RgbaImage) -> Option<Pixmap> {
    let mut pixmap = Pixmap::new(image.width(), image.height())?;
    for (dst, src) in pixmap.pixels_mut().iter_mut().zip(image.pixels()) {
        let [r, g, b, a] = src.0;
        *dst = ColorU8::from_rgba(r, g, b, a).premultiply();
    }
    Some(pixmap)
}

fn paint(color: Color, opacity: f32) -> Paint<'static> {
    let alpha = (color.alpha() * opacity).clamp(0.0, 1.0);
    let mut paint = Paint::default();
    paint.set_color(tiny_skia::Color::from_rgba8(color.r, color.g, color.b, (alpha * 255.0).round() as u8));
    paint.anti_alias = true;
    paint
}

fn skia_rect(rect: &RenderRect) -> Option<Rect> {
    Rect::from_xywh(rect.x, rect.y, rect.width, rect.height)
}

fn polyline(points: &[RenderPoint]) -> Option<Path> {
    let (first, rest) = points.split_first()?;
    let mut builder = PathBuilder::new();
    builder.move_to(first.x, first.y);
    for point in rest {
        builder.line_to(point.x, point.y);
    }
    builder.finish()
}

fn fill_rect(pixmap: &mut Pixmap, rect: &RenderRect, color: Color, opacity: f32) {
    if let Some(rect) = skia_rect(rect) {
        pixmap.fill_rect(rect, &paint(color, opacity), Transform::identity(), None);
    }
}

fn stroke_path(pixmap: &mut Pixmap, path: &Path, color: Color, width: f32, opacity: f32) {
    if width <= 0.0 {
        return;
    }
    let stroke = Stroke {
        width,
        line_cap: LineCap::Round,
        line_join: LineJoin::Round,
        ..Stroke::default()
    };
    pixmap.stroke_path(path, &paint(color, opacity), &stroke, Transform::identity(), None);
}

/// Scale `source` into `rect`, rotated clockwise about the rect's centre
fn draw_image(pixmap: &mut Pixmap, source: &Pixmap, rect: &RenderRect, rotation: f32, opacity: f32) {
    if rect.width <= 0.0 || rect.height <= 0.0 {
        return;
    }
    let center = rect.center();
    let transform = Transform::from_scale(
        rect.width / source.width() as f32,
        rect.height / source.height() as f32,
    )
    .post_translate(rect.x, rect.y)
    .post_rotate_at(rotation, center.x, center.y);
    let paint = PixmapPaint {
        opacity: opacity.clamp(0.0, 1.0),
        quality: FilterQuality::Bilinear,
        ..PixmapPaint::default()
    };
    pixmap.draw_pixmap(0, 0, source.as_ref(), &paint, transform, None);
}

/// Mounted surface id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceHandle(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceState {
    Idle,
    Rendering { key: RasterKey },

    /// Painted at this session view revision over this raster
    Painted { revision: u64, key: RasterKey },
}

/// A page raster request handed to a renderer
#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub surface: SurfaceHandle,
    pub page: u32,
    pub viewport: PageViewport,
    pub key: RasterKey,
    pub token: CancellationToken,
    ticket: TaskTicket,
}

struct Mounted<S> {
    page: u32,
    surface: S,
    slot: TaskSlot,
    state: SurfaceState,
}

/// Drives rendering and painting for a set of page surfaces
pub struct Compositor<S: Surface> {
    surfaces: HashMap<SurfaceHandle, Mounted<S>>,
    next_handle: u64,
    cache: RasterCache,
    monitor: MemoryMonitor,
    window_radius: u32,
}

impl<S: Surface> std::fmt::Debug for Compositor<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Compositor")
            .field("surfaces", &self.surfaces.len())
            .field("cache", &self.cache.stats())
            .field("window_radius", &self.window_radius)
            .finish()
    }
}

impl<S: Surface> Compositor<S> {
    pub fn new(config: &EditorConfig) -> Self {
        Self {
            surfaces: HashMap::new(),
            next_handle: 0,
            cache: RasterCache::with_mb_limit(config.raster_cache_mb),
            monitor: MemoryMonitor::new(config.memory_budget()),
            window_radius: config.render_window,
        }
    }

    /// Attach a surface that shows `page`
    pub fn mount(&mut self, page: u32, surface: S) -> SurfaceHandle {
        self.next_handle += 1;
        let handle = SurfaceHandle(self.next_handle);
        self.surfaces.insert(
            handle,
            Mounted {
                page,
                surface,
                slot: TaskSlot::new(),
                state: SurfaceState::Idle,
            },
        );
        handle
    }

    /// Detach a surface, cancelling its render in flight
    pub fn unmount(&mut self, handle: SurfaceHandle) -> Option<S> {
        let mut mounted = self.surfaces.remove(&handle)?;
        if mounted.slot.cancel() {
            tracing::debug!(page = mounted.page, "render cancelled on unmount");
        }
        Some(mounted.surface)
    }

    pub fn surface(&self, handle: SurfaceHandle) -> Option<&S> {
        self.surfaces.get(&handle).map(|m| &m.surface)
    }

    pub fn state(&self, handle: SurfaceHandle) -> Option<SurfaceState> {
        self.surfaces.get(&handle).map(|m| m.state)
    }

    /// Show a different page on a mounted surface
    pub fn set_page(&mut self, handle: SurfaceHandle, page: u32) {
        if let Some(mounted) = self.surfaces.get_mut(&handle) {
            if mounted.page != page {
                mounted.slot.cancel();
                mounted.page = page;
                mounted.state = SurfaceState::Idle;
            }
        }
    }

    /// Start a raster render for a surface, superseding its previous one
    pub fn request_render(&mut self, handle: SurfaceHandle, viewport: &Viewport) -> Option<RenderRequest> {
        let mounted = self.surfaces.get_mut(&handle)?;
        let key = raster_key(mounted.page, viewport);
        let (ticket, token) = mounted.slot.begin();
        mounted.state = SurfaceState::Rendering { key };
        Some(RenderRequest {
            surface: handle,
            page: mounted.page,
            viewport: viewport.page_viewport(),
            key,
            token,
            ticket,
        })
    }

    /// Accept the outcome of a render request
    ///
    /// Results for superseded or unmounted requests are dropped with
    /// [`EditorError::RenderCancelled`].
    pub fn complete_render(&mut self, request: RenderRequest, result: EngineResult<RgbaImage>) -> EditorResult<()> {
        let Some(mounted) = self.surfaces.get_mut(&request.surface) else {
            tracing::debug!(page = request.page, "render finished for unmounted surface");
            return Err(EditorError::RenderCancelled);
        };
        if !mounted.slot.finish(request.ticket) {
            tracing::debug!(page = request.page, "dropping superseded render");
            return Err(EditorError::RenderCancelled);
        }
        mounted.state = SurfaceState::Idle;

        match result {
            Ok(image) => {
                let (width, height) = image.dimensions();
                self.cache.put(request.key, image.into_raw(), width, height);
                Ok(())
            }
            Err(EngineError::Cancelled) => Err(EditorError::RenderCancelled),
            Err(source) => {
                tracing::warn!(page = request.page, error = %source, "page render failed");
                Err(EditorError::Render {
                    page: request.page,
                    source,
                })
            }
        }
    }

    /// Whether the surface shows something other than `revision` over `key`
    pub fn needs_repaint(&self, handle: SurfaceHandle, revision: u64, key: RasterKey) -> bool {
        self.state(handle) != Some(SurfaceState::Painted { revision, key })
    }

    /// Bring a surface up to date with `session`
    ///
    /// Renders the page raster on a cache miss, then paints the scene.
    /// Returns `false` when the surface was already current.
    pub fn render<R: Renderer>(&mut self, handle: SurfaceHandle, session: &Session<R>) -> EditorResult<bool> {
        let Some(page) = self.surfaces.get(&handle).map(|m| m.page) else {
            return Ok(false);
        };
        let viewport = session.viewport_for(page)?;
        let key = raster_key(page, &viewport);
        let revision = session.view_revision();
        if !self.needs_repaint(handle, revision, key) {
            return Ok(false);
        }

        if !self.cache.contains(key) {
            if let Some(request) = self.request_render(handle, &viewport) {
                let result = session.renderer().render_page(
                    session.document(),
                    page,
                    &request.viewport,
                    &request.token,
                );
                self.complete_render(request, result)?;
            }
        }

        let scene = session.scene(page)?;
        let Self { surfaces, cache, .. } = self;
        let Some(mounted) = surfaces.get_mut(&handle) else {
            return Ok(false);
        };
        mounted.surface.paint(cache.get(key), &scene);
        mounted.state = SurfaceState::Painted { revision, key };
        Ok(true)
    }

    /// Drop rasters outside the render window around `current`
    ///
    /// Returns the bytes released.
    pub fn evict_outside_window(&mut self, current: u32, page_count: u32) -> usize {
        let window = PageWindow::new(current, page_count, self.window_radius);
        let pages = window.evictable(self.cache.cached_pages());
        if pages.is_empty() {
            return 0;
        }
        for mounted in self.surfaces.values_mut() {
            if pages.contains(&mounted.page) && mounted.slot.cancel() {
                mounted.state = SurfaceState::Idle;
            }
        }
        let released = self.cache.evict_pages(&pages);
        tracing::debug!(?pages, released, "evicted rasters outside window");
        released
    }

    /// Sample memory use; reports at most once per check interval
    ///
    /// The host offers [`Compositor::cleanup`] when `offer_cleanup` is set.
    pub fn check_memory(&mut self, now: Instant) -> Option<MemoryReport> {
        self.monitor.check(now, self.cache.memory_used())
    }

    /// Release every cached raster; surfaces repaint on their next render
    pub fn cleanup(&mut self) -> usize {
        let released = self.cache.clear();
        let mut decoded = 0;
        for mounted in self.surfaces.values_mut() {
            mounted.slot.cancel();
            mounted.state = SurfaceState::Idle;
            decoded += mounted.surface.release_caches();
        }
        tracing::info!(released, decoded, "raster cache cleared");
        released
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }
}

fn raster_key(page: u32, viewport: &Viewport) -> RasterKey {
    RasterKey::new(page, viewport.scale, viewport.rotation.degrees())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{
        FormField, FormFieldKind, RedactionBlock, ShapeAnnotation, TextBox, TextStyle,
    };
    use crate::fonts::FontService;
    use crate::handles::ManipulationState;
    use crate::tools::ToolKind;
    use crate::transform::PointerPoint;
    use folio_engine::fixtures::DocumentBuilder;
    use folio_engine::{LopdfRenderer, PageSize, Rotation};
    use image::Rgba;
    use uuid::Uuid;

    fn viewport() -> Viewport {
        Viewport::new(PageSize::LETTER, 1.0, Rotation::Deg0)
    }

    fn sample_layers() -> (ElementLayers, [ElementId; 4]) {
        let mut layers = ElementLayers::new(5.0, 2.0);
        let field = layers
            .add(Element::FormField(FormField::new(
                1,
                DocRect::new(10.0, 10.0, 100.0, 20.0),
                "name",
                FormFieldKind::Checkbox { checked: false },
            )))
            .unwrap();
        let text = layers
            .add(Element::Text(TextBox::new(
                1,
                DocRect::new(10.0, 50.0, 100.0, 20.0),
                "Hi",
                TextStyle::default(),
            )))
            .unwrap();
        let shape = layers
            .add(Element::Shape(ShapeAnnotation::new(
                1,
                ShapeGeometry::Rectangle {
                    rect: DocRect::new(20.0, 20.0, 50.0, 50.0),
                },
                Color::RED,
                2.0,
            )))
            .unwrap();
        let redaction = layers
            .add(Element::Redaction(RedactionBlock::new(1, DocRect::new(0.0, 0.0, 30.0, 30.0))))
            .unwrap();
        (layers, [redaction, shape, text, field])
    }

    #[test]
    fn test_scene_follows_z_order() {
        let (layers, ids) = sample_layers();
        let scene = scene_for_page(&layers, 1, &viewport(), &SceneOverlay::default());

        let order: Vec<ElementId> = scene.iter().filter_map(Primitive::element_id).collect();
        assert_eq!(order, ids.to_vec());
        assert_eq!(scene[0].layer(), Some(LayerKind::Redaction));
        assert!(scene_for_page(&layers, 2, &viewport(), &SceneOverlay::default()).is_empty());
    }

    #[test]
    fn test_manipulation_preview_replaces_element() {
        let (layers, [_, shape, _, _]) = sample_layers();
        let original = layers.get(shape).unwrap();
        let mut state = ManipulationState::new(original, HandleType::Move, DocPoint::new(30.0, 30.0));
        state.update_position(DocPoint::new(40.0, 30.0));

        let overlay = SceneOverlay {
            selection: vec![shape],
            preview: Some(Preview::Element(state.calculate())),
            handle_size: 6.0,
        };
        let scene = scene_for_page(&layers, 1, &viewport(), &overlay);

        let drawn: Vec<&Primitive> = scene
            .iter()
            .filter(|p| matches!(p, Primitive::Rectangle { .. }))
            .collect();
        assert_eq!(drawn.len(), 1);
        let Primitive::Rectangle { rect, .. } = drawn[0] else {
            unreachable!()
        };
        assert_eq!(*rect, RenderRect::new(30.0, 20.0, 50.0, 50.0));

        // Outline follows the previewed geometry, with handles for a single selection
        assert!(scene.contains(&Primitive::SelectionOutline {
            id: shape,
            rect: RenderRect::new(30.0, 20.0, 50.0, 50.0),
        }));
        assert!(scene.iter().any(|p| matches!(p, Primitive::Handle { rotate: false, .. })));
    }

    #[test]
    fn test_text_scales_with_view() {
        let text = TextBox::new(1, DocRect::new(10.0, 10.0, 100.0, 40.0), "a\nb", TextStyle::default());
        let size = text.style.font_size;
        let vp = Viewport::new(PageSize::LETTER, 2.0, Rotation::Deg90);

        let Primitive::Text {
            lines,
            font_size,
            rotation,
            ..
        } = element_primitive(&Element::Text(text), &vp)
        else {
            panic!("expected text");
        };
        assert_eq!(lines, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(font_size, size * 2.0);
        assert_eq!(rotation, 90.0);
    }

    #[test]
    fn test_raster_surface_paints_layers() {
        let (layers, _) = sample_layers();
        let scene = scene_for_page(&layers, 1, &viewport(), &SceneOverlay::default());
        let mut surface = RasterSurface::new(200, 200).unwrap();
        surface.paint(None, &scene);
        let image = surface.to_image();

        // Redaction is opaque black, the rectangle stroke red, empty space white
        assert_eq!(image.get_pixel(5, 5), &Rgba([0, 0, 0, 255]));
        assert_eq!(image.get_pixel(60, 20), &Rgba([255, 0, 0, 255]));
        assert_eq!(image.get_pixel(190, 190), &Rgba([255, 255, 255, 255]));
    }

    fn close_to(actual: &Rgba<u8>, expected: [u8; 4]) -> bool {
        actual.0.iter().zip(expected).all(|(a, e)| a.abs_diff(e) <= 2)
    }

    #[test]
    fn test_raster_surface_blends_by_opacity() {
        let mut surface = RasterSurface::new(40, 40).unwrap();
        let highlight = Primitive::Highlight {
            id: Uuid::new_v4(),
            rect: RenderRect::new(0.0, 0.0, 20.0, 20.0),
            color: Color::YELLOW,
            opacity: 0.5,
        };
        surface.paint(None, &[highlight]);
        let image = surface.to_image();

        assert!(close_to(image.get_pixel(10, 10), [255, 245, 157, 255]), "{:?}", image.get_pixel(10, 10));
        assert_eq!(image.get_pixel(30, 30), &Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn test_raster_surface_rotates_images_about_center() {
        let source = RgbaImage::from_fn(20, 10, |x, _| {
            if x < 10 {
                Rgba([255, 0, 0, 255])
            } else {
                Rgba([0, 0, 255, 255])
            }
        });
        let mut png = Vec::new();
        source
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();
        let data: Arc<[u8]> = png.into();
        let image_at = |rotation: f32| Primitive::Image {
            id: Uuid::new_v4(),
            rect: RenderRect::new(50.0, 50.0, 40.0, 20.0),
            data: data.clone(),
            rotation,
            opacity: 1.0,
        };

        let mut surface = RasterSurface::new(140, 120).unwrap();
        surface.paint(None, &[image_at(0.0)]);
        let upright = surface.to_image();
        assert!(close_to(upright.get_pixel(55, 60), [255, 0, 0, 255]));
        assert!(close_to(upright.get_pixel(85, 60), [0, 0, 255, 255]));

        surface.paint(None, &[image_at(180.0)]);
        let flipped = surface.to_image();
        assert!(close_to(flipped.get_pixel(55, 60), [0, 0, 255, 255]));
        assert!(close_to(flipped.get_pixel(85, 60), [255, 0, 0, 255]));
        assert_eq!(surface.release_caches(), 1);
    }

    #[test]
    fn test_raster_surface_paints_over_base_raster() {
        let key = RasterKey::new(1, 1.0, 0);
        let base = CachedRaster {
            key,
            width: 4,
            height: 4,
            pixels: [10u8, 20, 30, 255].repeat(16),
        };
        let mut surface = RasterSurface::new(4, 4).unwrap();
        surface.paint(Some(&base), &[]);
        assert_eq!(surface.to_image().get_pixel(2, 2), &Rgba([10, 20, 30, 255]));
    }

    fn session() -> Session<LopdfRenderer> {
        let bytes = DocumentBuilder::new()
            .page(612.0, 792.0)
            .page(612.0, 792.0)
            .page(612.0, 792.0)
            .page(612.0, 792.0)
            .build()
            .unwrap();
        Session::open(
            LopdfRenderer::new(),
            bytes,
            "doc.pdf",
            EditorConfig::default(),
            FontService::new(),
        )
        .unwrap()
    }

    #[test]
    fn test_render_paints_once_per_revision() {
        let mut session = session();
        let mut compositor = Compositor::new(session.config());
        let handle = compositor.mount(1, RecordingSurface::new());

        assert!(compositor.render(handle, &session).unwrap());
        assert!(!compositor.render(handle, &session).unwrap());
        assert_eq!(compositor.cache_stats().raster_count, 1);

        session.set_zoom(2.0);
        assert!(compositor.render(handle, &session).unwrap());
        assert_eq!(compositor.cache_stats().raster_count, 2);

        let surface = compositor.surface(handle).unwrap();
        assert_eq!(surface.frames.len(), 2);
        assert!(surface.bases.iter().all(Option::is_some));
    }

    #[test]
    fn test_preview_matches_committed_element() {
        let mut session = session();
        let mut compositor = Compositor::new(session.config());
        let handle = compositor.mount(1, RecordingSurface::new());

        session.activate_tool(ToolKind::Rectangle);
        session.pointer_down(PointerPoint::new(50.0, 50.0));
        session.pointer_move(PointerPoint::new(150.0, 90.0));
        compositor.render(handle, &session).unwrap();
        let preview = compositor.surface(handle).unwrap().last_frame().unwrap().to_vec();

        session.pointer_up(PointerPoint::new(150.0, 90.0));
        compositor.render(handle, &session).unwrap();
        let committed = compositor.surface(handle).unwrap().last_frame().unwrap().to_vec();

        let rect_of = |scene: &[Primitive]| {
            scene.iter().find_map(|p| match p {
                Primitive::Rectangle { rect, .. } => Some(*rect),
                _ => None,
            })
        };
        assert_eq!(rect_of(&preview), Some(RenderRect::new(50.0, 50.0, 100.0, 40.0)));
        assert_eq!(rect_of(&preview), rect_of(&committed));
    }

    #[test]
    fn test_stale_render_is_dropped() {
        let session = session();
        let mut compositor: Compositor<RecordingSurface> = Compositor::new(session.config());
        let handle = compositor.mount(1, RecordingSurface::new());
        let viewport = session.viewport();

        let first = compositor.request_render(handle, &viewport).unwrap();
        let second = compositor.request_render(handle, &viewport).unwrap();
        assert!(first.token.is_cancelled());

        let result = compositor.complete_render(first, Ok(RgbaImage::new(2, 2)));
        assert!(matches!(result, Err(EditorError::RenderCancelled)));
        assert_eq!(compositor.cache_stats().raster_count, 0);

        compositor.complete_render(second, Ok(RgbaImage::new(2, 2))).unwrap();
        assert_eq!(compositor.cache_stats().raster_count, 1);
    }

    #[test]
    fn test_render_error_is_reported() {
        let session = session();
        let mut compositor: Compositor<RecordingSurface> = Compositor::new(session.config());
        let handle = compositor.mount(2, RecordingSurface::new());

        let request = compositor.request_render(handle, &session.viewport()).unwrap();
        let result = compositor.complete_render(request, Err(EngineError::Backend("boom".into())));
        assert!(matches!(result, Err(EditorError::Render { page: 2, .. })));
        assert_eq!(compositor.state(handle), Some(SurfaceState::Idle));
    }

    #[test]
    fn test_unmount_cancels_render() {
        let session = session();
        let mut compositor: Compositor<RecordingSurface> = Compositor::new(session.config());
        let handle = compositor.mount(1, RecordingSurface::new());
        let request = compositor.request_render(handle, &session.viewport()).unwrap();

        assert!(compositor.unmount(handle).is_some());
        assert!(request.token.is_cancelled());
        assert!(matches!(
            compositor.complete_render(request, Ok(RgbaImage::new(1, 1))),
            Err(EditorError::RenderCancelled)
        ));
    }

    #[test]
    fn test_eviction_and_cleanup() {
        let session = session();
        let config = EditorConfig::default().with_render_window(1);
        let mut compositor = Compositor::new(&config);
        let handles: Vec<SurfaceHandle> = (1..=4)
            .map(|page| compositor.mount(page, RecordingSurface::new()))
            .collect();
        for handle in &handles {
            compositor.render(*handle, &session).unwrap();
        }
        assert_eq!(compositor.cache_stats().raster_count, 4);

        assert!(compositor.evict_outside_window(1, 4) > 0);
        assert_eq!(compositor.cache_stats().raster_count, 2);

        assert!(compositor.cleanup() > 0);
        assert_eq!(compositor.cache_stats().raster_count, 0);
        assert_eq!(compositor.state(handles[0]), Some(SurfaceState::Idle));
    }

    #[test]
    fn test_memory_check_reports() {
        let session = session();
        let mut compositor = Compositor::new(session.config());
        let handle = compositor.mount(1, RecordingSurface::new());
        compositor.render(handle, &session).unwrap();

        let report = compositor.check_memory(Instant::now()).unwrap();
        assert!(report.used > 0);
        assert!(!report.offer_cleanup);
    }
}
