//! Coordinate spaces and the transforms between them
//!
//! - **Document space**: unrotated, unscaled page points. `y` grows downward from
//!   the top edge of the page. Every element stores its geometry here.
//! - **Render space**: pixels of the preview surface, top-left origin, scaled by
//!   the zoom factor and rotated clockwise so the rotated page starts at (0, 0).
//! - **Pointer space**: raw input coordinates; render space shifted by the
//!   surface origin.
//!
//! Both directions go through one rotation table, so converting back and forth
//! never accumulates drift.

use folio_engine::{PageSize, PageViewport, Rotation};
use serde::{Deserialize, Serialize};

/// A point in document space
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DocPoint {
    pub x: f32,
    pub y: f32,
}

impl DocPoint {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: &DocPoint) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn offset(&self, dx: f32, dy: f32) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }
}

/// An axis-aligned rectangle in document space; `(x, y)` is the top-left corner
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DocRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl DocRect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
        .normalized()
    }

    /// Rectangle spanned by two opposite corners in any order
    pub fn from_corners(a: DocPoint, b: DocPoint) -> Self {
        Self {
            x: a.x.min(b.x),
            y: a.y.min(b.y),
            width: (a.x - b.x).abs(),
            height: (a.y - b.y).abs(),
        }
    }

    /// Flip negative extents so width and height are non-negative
    pub fn normalized(self) -> Self {
        let (x, width) = if self.width < 0.0 {
            (self.x + self.width, -self.width)
        } else {
            (self.x, self.width)
        };
        let (y, height) = if self.height < 0.0 {
            (self.y + self.height, -self.height)
        } else {
            (self.y, self.height)
        };
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn center(&self) -> DocPoint {
        DocPoint::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn top_left(&self) -> DocPoint {
        DocPoint::new(self.x, self.y)
    }

    pub fn bottom_right(&self) -> DocPoint {
        DocPoint::new(self.right(), self.bottom())
    }

    /// Containment with `tolerance` of slack on every side
    pub fn contains(&self, point: DocPoint, tolerance: f32) -> bool {
        point.x >= self.x - tolerance
            && point.x <= self.right() + tolerance
            && point.y >= self.y - tolerance
            && point.y <= self.bottom() + tolerance
    }

    pub fn translate(&self, dx: f32, dy: f32) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
            ..*self
        }
    }

    /// Grow by `amount` on every side
    pub fn inflate(&self, amount: f32) -> Self {
        Self {
            x: self.x - amount,
            y: self.y - amount,
            width: self.width + 2.0 * amount,
            height: self.height + 2.0 * amount,
        }
    }

    /// Smallest rectangle covering both
    pub fn union(&self, other: &DocRect) -> Self {
        Self::from_corners(
            DocPoint::new(self.x.min(other.x), self.y.min(other.y)),
            DocPoint::new(self.right().max(other.right()), self.bottom().max(other.bottom())),
        )
    }

    pub fn intersects(&self, other: &DocRect) -> bool {
        self.x <= other.right()
            && other.x <= self.right()
            && self.y <= other.bottom()
            && other.y <= self.bottom()
    }

    pub fn max_side(&self) -> f32 {
        self.width.max(self.height)
    }
}

/// A point in render space (pixels)
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RenderPoint {
    pub x: f32,
    pub y: f32,
}

impl RenderPoint {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// An axis-aligned rectangle in render space
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RenderRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl RenderRect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    fn spanning(a: RenderPoint, b: RenderPoint) -> Self {
        Self {
            x: a.x.min(b.x),
            y: a.y.min(b.y),
            width: (a.x - b.x).abs(),
            height: (a.y - b.y).abs(),
        }
    }

    pub fn center(&self) -> RenderPoint {
        RenderPoint::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

/// A raw input coordinate
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PointerPoint {
    pub x: f32,
    pub y: f32,
}

impl PointerPoint {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Everything needed to map between document, render and pointer space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub scale: f32,
    pub rotation: Rotation,
    pub page_width: f32,
    pub page_height: f32,

    /// Position of the surface's top-left corner in pointer space
    pub origin: PointerPoint,
}

impl Viewport {
    pub fn new(page: PageSize, scale: f32, rotation: Rotation) -> Self {
        Self {
            scale: if scale > 0.0 { scale } else { 1.0 },
            rotation,
            page_width: page.width_pt,
            page_height: page.height_pt,
            origin: PointerPoint::default(),
        }
    }

    pub fn with_origin(mut self, origin: PointerPoint) -> Self {
        self.origin = origin;
        self
    }

    pub fn page_size(&self) -> PageSize {
        PageSize::new(self.page_width, self.page_height)
    }

    /// Renderer-facing viewport with the same scale and rotation
    pub fn page_viewport(&self) -> PageViewport {
        PageViewport::new(self.page_size(), self.scale, self.rotation)
    }

    /// Size of the rendered page in pixels, width and height swapped on quarter turns
    pub fn render_size(&self) -> (f32, f32) {
        let (w, h) = if self.rotation.is_quarter_turn() {
            (self.page_height, self.page_width)
        } else {
            (self.page_width, self.page_height)
        };
        (w * self.scale, h * self.scale)
    }

    pub fn pointer_to_render(&self, point: PointerPoint) -> RenderPoint {
        RenderPoint::new(point.x - self.origin.x, point.y - self.origin.y)
    }

    pub fn render_to_pointer(&self, point: RenderPoint) -> PointerPoint {
        PointerPoint::new(point.x + self.origin.x, point.y + self.origin.y)
    }

    pub fn to_render_point(&self, point: DocPoint) -> RenderPoint {
        let (w, h) = (self.page_width, self.page_height);
        let (x, y) = match self.rotation {
            Rotation::Deg0 => (point.x, point.y),
            Rotation::Deg90 => (h - point.y, point.x),
            Rotation::Deg180 => (w - point.x, h - point.y),
            Rotation::Deg270 => (point.y, w - point.x),
        };
        RenderPoint::new(x * self.scale, y * self.scale)
    }

    pub fn to_document_point(&self, point: RenderPoint) -> DocPoint {
        let (w, h) = (self.page_width, self.page_height);
        let (rx, ry) = (point.x / self.scale, point.y / self.scale);
        let (x, y) = match self.rotation {
            Rotation::Deg0 => (rx, ry),
            Rotation::Deg90 => (ry, h - rx),
            Rotation::Deg180 => (w - rx, h - ry),
            Rotation::Deg270 => (w - ry, rx),
        };
        DocPoint::new(x, y)
    }

    pub fn to_render_rect(&self, rect: &DocRect) -> RenderRect {
        RenderRect::spanning(
            self.to_render_point(rect.top_left()),
            self.to_render_point(rect.bottom_right()),
        )
    }

    pub fn to_document_rect(&self, rect: &RenderRect) -> DocRect {
        DocRect::from_corners(
            self.to_document_point(RenderPoint::new(rect.x, rect.y)),
            self.to_document_point(RenderPoint::new(rect.x + rect.width, rect.y + rect.height)),
        )
    }

    pub fn to_render_distance(&self, distance: f32) -> f32 {
        distance * self.scale
    }

    pub fn to_document_distance(&self, distance: f32) -> f32 {
        distance / self.scale
    }
}

/// Map a pointer position to document space
pub fn to_document(pointer: PointerPoint, viewport: &Viewport) -> DocPoint {
    viewport.to_document_point(viewport.pointer_to_render(pointer))
}

/// Map a document point to pointer space
pub fn to_pointer(point: DocPoint, viewport: &Viewport) -> PointerPoint {
    viewport.render_to_pointer(viewport.to_render_point(point))
}

/// Map a document rectangle to render space
pub fn to_render(rect: &DocRect, viewport: &Viewport) -> RenderRect {
    viewport.to_render_rect(rect)
}
