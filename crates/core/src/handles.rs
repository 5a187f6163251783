//! Element manipulation handles and drag operations
//!
//! Provides handles for moving, resizing and rotating the selected element.
//! Handles are small control points on the element's bounding box, in document
//! space.

use crate::element::{Element, ElementId, ShapeGeometry};
use crate::ink;
use crate::transform::{DocPoint, DocRect};

/// Distance of the rotation handle above the top edge
const ROTATE_OFFSET: f32 = 24.0;

/// Type of manipulation handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleType {
    /// Corner handles for resizing
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,

    /// Edge handles for resizing in one dimension
    Top,
    Bottom,
    Left,
    Right,

    /// Rotation handle above text boxes and images
    Rotate,

    /// Drag anywhere inside the element
    Move,
}

/// Manipulation handle with position and type
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ManipulationHandle {
    pub handle_type: HandleType,

    /// Position in document space
    pub position: DocPoint,

    /// Radius of the hit area in document units
    pub size: f32,

    pub element_id: ElementId,
}

impl ManipulationHandle {
    pub fn new(handle_type: HandleType, position: DocPoint, size: f32, element_id: ElementId) -> Self {
        Self {
            handle_type,
            position,
            size,
            element_id,
        }
    }

    /// Check if a point hits this handle
    pub fn hit_test(&self, point: &DocPoint, tolerance: f32) -> bool {
        point.distance_to(&self.position) <= self.size + tolerance
    }
}

fn box_handles(rect: &DocRect, size: f32, id: ElementId, rotatable: bool) -> Vec<ManipulationHandle> {
    let center = rect.center();
    let mut handles = vec![
        ManipulationHandle::new(HandleType::TopLeft, rect.top_left(), size, id),
        ManipulationHandle::new(HandleType::TopRight, DocPoint::new(rect.right(), rect.y), size, id),
        ManipulationHandle::new(HandleType::BottomLeft, DocPoint::new(rect.x, rect.bottom()), size, id),
        ManipulationHandle::new(HandleType::BottomRight, rect.bottom_right(), size, id),
        ManipulationHandle::new(HandleType::Top, DocPoint::new(center.x, rect.y), size, id),
        ManipulationHandle::new(HandleType::Bottom, DocPoint::new(center.x, rect.bottom()), size, id),
        ManipulationHandle::new(HandleType::Left, DocPoint::new(rect.x, center.y), size, id),
        ManipulationHandle::new(HandleType::Right, DocPoint::new(rect.right(), center.y), size, id),
    ];
    if rotatable {
        handles.push(ManipulationHandle::new(
            HandleType::Rotate,
            DocPoint::new(center.x, rect.y - ROTATE_OFFSET),
            size,
            id,
        ));
    }
    handles
}

/// Generate manipulation handles for an element
pub fn generate_handles(element: &Element, handle_size: f32) -> Vec<ManipulationHandle> {
    let id = element.id();
    match element {
        Element::Shape(shape) => match shape.geometry {
            ShapeGeometry::Line { start, end } => vec![
                ManipulationHandle::new(HandleType::TopLeft, start, handle_size, id),
                ManipulationHandle::new(HandleType::BottomRight, end, handle_size, id),
            ],
            _ => box_handles(&shape.geometry.bounds(), handle_size, id, false),
        },
        Element::Ink(stroke) => {
            let rect = ink::bounds(&stroke.points).unwrap_or_default();
            box_handles(&rect, handle_size, id, false)
                .into_iter()
                .filter(|h| {
                    matches!(
                        h.handle_type,
                        HandleType::TopLeft
                            | HandleType::TopRight
                            | HandleType::BottomLeft
                            | HandleType::BottomRight
                    )
                })
                .collect()
        }
        Element::Text(text) => box_handles(&text.rect, handle_size, id, true),
        Element::Image(image) => box_handles(&image.rect, handle_size, id, true),
        Element::Redaction(block) => box_handles(&block.rect, handle_size, id, false),
        Element::FormField(field) => box_handles(&field.rect, handle_size, id, false),
    }
}

/// First handle under `point`, if any
pub fn hit_handle(handles: &[ManipulationHandle], point: &DocPoint, tolerance: f32) -> Option<HandleType> {
    handles
        .iter()
        .find(|h| h.hit_test(point, tolerance))
        .map(|h| h.handle_type)
}

/// Resize `rect` by dragging one of its handles by `(dx, dy)`
fn resize_rect(rect: &DocRect, handle: HandleType, dx: f32, dy: f32) -> DocRect {
    let (mut left, mut top, mut right, mut bottom) = (rect.x, rect.y, rect.right(), rect.bottom());
    match handle {
        HandleType::TopLeft => {
            left += dx;
            top += dy;
        }
        HandleType::TopRight => {
            right += dx;
            top += dy;
        }
        HandleType::BottomLeft => {
            left += dx;
            bottom += dy;
        }
        HandleType::BottomRight => {
            right += dx;
            bottom += dy;
        }
        HandleType::Top => top += dy,
        HandleType::Bottom => bottom += dy,
        HandleType::Left => left += dx,
        HandleType::Right => right += dx,
        HandleType::Move => return rect.translate(dx, dy),
        HandleType::Rotate => return *rect,
    }
    DocRect::from_corners(DocPoint::new(left, top), DocPoint::new(right, bottom))
}

/// Map `points` from the `from` box onto the `to` box
fn rescale_points(points: &[DocPoint], from: &DocRect, to: &DocRect) -> Vec<DocPoint> {
    let sx = if from.width > 0.0 { to.width / from.width } else { 1.0 };
    let sy = if from.height > 0.0 { to.height / from.height } else { 1.0 };
    points
        .iter()
        .map(|p| DocPoint::new(to.x + (p.x - from.x) * sx, to.y + (p.y - from.y) * sy))
        .collect()
}

/// Clockwise angle in degrees from "straight up" around `center` to `point`
fn angle_from(center: DocPoint, point: DocPoint) -> f32 {
    let degrees = (point.x - center.x).atan2(center.y - point.y).to_degrees();
    degrees.rem_euclid(360.0)
}

/// Active manipulation state
#[derive(Debug, Clone)]
pub struct ManipulationState {
    pub element_id: ElementId,
    pub handle_type: HandleType,

    /// Element as it was when the drag started
    pub original: Element,

    /// Drag start position in document space
    pub drag_start: DocPoint,

    pub current_position: DocPoint,
}

impl ManipulationState {
    pub fn new(original: Element, handle_type: HandleType, drag_start: DocPoint) -> Self {
        Self {
            element_id: original.id(),
            handle_type,
            original,
            drag_start,
            current_position: drag_start,
        }
    }

    pub fn update_position(&mut self, position: DocPoint) {
        self.current_position = position;
    }

    /// Whether the pointer has moved since the drag started
    pub fn has_moved(&self) -> bool {
        self.current_position != self.drag_start
    }

    /// The element with the manipulation applied
    pub fn calculate(&self) -> Element {
        let dx = self.current_position.x - self.drag_start.x;
        let dy = self.current_position.y - self.drag_start.y;
        let handle = self.handle_type;
        let mut element = self.original.clone();

        if handle == HandleType::Move {
            element.translate(dx, dy);
            return element;
        }

        match &mut element {
            Element::Shape(shape) => {
                shape.geometry = match shape.geometry {
                    ShapeGeometry::Line { start, end } => match handle {
                        HandleType::TopLeft => ShapeGeometry::Line {
                            start: start.offset(dx, dy),
                            end,
                        },
                        HandleType::BottomRight => ShapeGeometry::Line {
                            start,
                            end: end.offset(dx, dy),
                        },
                        _ => shape.geometry,
                    },
                    geometry => geometry.with_rect(resize_rect(&geometry.bounds(), handle, dx, dy)),
                };
            }
            Element::Ink(stroke) => {
                if let Some(from) = ink::bounds(&stroke.points) {
                    let to = resize_rect(&from, handle, dx, dy);
                    stroke.points = rescale_points(&stroke.points, &from, &to);
                }
            }
            Element::Text(text) => {
                if handle == HandleType::Rotate {
                    text.rotation = angle_from(text.rect.center(), self.current_position);
                } else {
                    text.rect = resize_rect(&text.rect, handle, dx, dy);
                }
            }
            Element::Image(image) => {
                if handle == HandleType::Rotate {
                    image.rotation = angle_from(image.rect.center(), self.current_position);
                } else {
                    image.rect = resize_rect(&image.rect, handle, dx, dy);
                }
            }
            Element::Redaction(block) => block.rect = resize_rect(&block.rect, handle, dx, dy),
            Element::FormField(field) => field.rect = resize_rect(&field.rect, handle, dx, dy),
        }
        element
    }
}
