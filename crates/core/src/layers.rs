//! Per-page element collections
//!
//! Each element type lives in its own [`Layer`]. [`ElementLayers`] aggregates the
//! six of them and is the unit that snapshots, restores and paints.

use std::collections::BTreeMap;

use crate::element::{
    Element, ElementId, ElementPatch, FormField, ImageElement, InkStroke, LayerElement, LayerKind,
    RedactionBlock, ShapeAnnotation, TextBox,
};
use crate::transform::DocPoint;

/// Elements of one type grouped by page, in insertion order
#[derive(Debug, Clone, PartialEq)]
pub struct Layer<T> {
    pages: BTreeMap<u32, Vec<T>>,

    /// Size an element must exceed to be added (interpretation per type)
    min_extent: f32,
}

impl<T> Default for Layer<T> {
    fn default() -> Self {
        Self {
            pages: BTreeMap::new(),
            min_extent: 0.0,
        }
    }
}

impl<T: LayerElement> Layer<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_min_extent(min_extent: f32) -> Self {
        Self {
            pages: BTreeMap::new(),
            min_extent,
        }
    }

    pub fn min_extent(&self) -> f32 {
        self.min_extent
    }

    /// Add an element; returns `None` when it is below the layer minimum
    pub fn add(&mut self, element: T) -> Option<ElementId> {
        if !element.meets_minimum(self.min_extent) {
            tracing::debug!(layer = T::KIND.name(), "element below minimum size, discarded");
            return None;
        }
        let id = element.id();
        self.pages.entry(element.page()).or_default().push(element);
        Some(id)
    }

    /// Apply `patch` to element `id`
    ///
    /// Returns `false`, leaving the element untouched, if it does not exist or
    /// the patched element would fall below the layer minimum.
    pub fn update(&mut self, id: ElementId, patch: &T::Patch) -> bool {
        let minimum = self.min_extent;
        let Some(element) = self.get_mut(id) else {
            return false;
        };
        let mut patched = element.clone();
        patched.apply(patch);
        if !patched.meets_minimum(minimum) {
            tracing::debug!(layer = T::KIND.name(), "patch would shrink element below minimum");
            return false;
        }
        *element = patched;
        true
    }

    pub fn remove(&mut self, id: ElementId) -> Option<T> {
        let (page, index) = self.position(id)?;
        let elements = self.pages.get_mut(&page)?;
        let removed = elements.remove(index);
        if elements.is_empty() {
            self.pages.remove(&page);
        }
        Some(removed)
    }

    pub fn get(&self, id: ElementId) -> Option<&T> {
        self.pages.values().flatten().find(|e| e.id() == id)
    }

    pub fn get_mut(&mut self, id: ElementId) -> Option<&mut T> {
        self.pages.values_mut().flatten().find(|e| e.id() == id)
    }

    pub fn contains(&self, id: ElementId) -> bool {
        self.get(id).is_some()
    }

    fn position(&self, id: ElementId) -> Option<(u32, usize)> {
        self.pages.iter().find_map(|(page, elements)| {
            elements
                .iter()
                .position(|e| e.id() == id)
                .map(|index| (*page, index))
        })
    }

    /// Topmost (most recently added) element under `point`
    pub fn hit_test(&self, page: u32, point: DocPoint, tolerance: f32) -> Option<ElementId> {
        self.for_page(page)
            .iter()
            .rev()
            .find(|e| e.hit(point, tolerance))
            .map(|e| e.id())
    }

    /// Elements on `page` within `radius` of `point`
    pub fn within(&self, page: u32, point: DocPoint, radius: f32) -> Vec<ElementId> {
        self.for_page(page)
            .iter()
            .filter(|e| e.distance_to(point) <= radius)
            .map(|e| e.id())
            .collect()
    }

    pub fn for_page(&self, page: u32) -> &[T] {
        self.pages.get(&page).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.pages.values().flatten()
    }

    /// Pages that hold at least one element
    pub fn pages(&self) -> impl Iterator<Item = u32> + '_ {
        self.pages.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.pages.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Replace every element, keeping the minimum size setting
    ///
    /// Elements below the minimum are dropped; returns how many were kept.
    pub fn replace_all(&mut self, elements: impl IntoIterator<Item = T>) -> usize {
        self.pages.clear();
        let mut kept = 0;
        for element in elements {
            if !element.meets_minimum(self.min_extent) {
                tracing::warn!(
                    layer = T::KIND.name(),
                    page = element.page(),
                    "dropping element below minimum size"
                );
                continue;
            }
            self.pages.entry(element.page()).or_default().push(element);
            kept += 1;
        }
        kept
    }
}

/// Immutable copy of all six layers, used as one undo/redo step
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot(ElementLayers);

impl Snapshot {
    pub fn layers(&self) -> &ElementLayers {
        &self.0
    }
}

/// The six element layers of a session
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ElementLayers {
    pub redactions: Layer<RedactionBlock>,
    pub shapes: Layer<ShapeAnnotation>,
    pub ink: Layer<InkStroke>,
    pub text: Layer<TextBox>,
    pub images: Layer<ImageElement>,
    pub fields: Layer<FormField>,
}

impl ElementLayers {
    /// Layers with the minimum sizes for redactions and ink strokes
    pub fn new(min_redaction_size: f32, min_ink_extent: f32) -> Self {
        Self {
            redactions: Layer::with_min_extent(min_redaction_size),
            ink: Layer::with_min_extent(min_ink_extent),
            ..Default::default()
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot(self.clone())
    }

    /// Replace all six layers with the snapshot's contents
    pub fn restore(&mut self, snapshot: &Snapshot) {
        *self = snapshot.0.clone();
    }

    pub fn add(&mut self, element: Element) -> Option<ElementId> {
        match element {
            Element::Text(e) => self.text.add(e),
            Element::Shape(e) => self.shapes.add(e),
            Element::Ink(e) => self.ink.add(e),
            Element::Image(e) => self.images.add(e),
            Element::Redaction(e) => self.redactions.add(e),
            Element::FormField(e) => self.fields.add(e),
        }
    }

    /// Apply a patch; `false` when the id is unknown to the patch's layer
    pub fn update(&mut self, id: ElementId, patch: &ElementPatch) -> bool {
        match patch {
            ElementPatch::Text(p) => self.text.update(id, p),
            ElementPatch::Shape(p) => self.shapes.update(id, p),
            ElementPatch::Ink(p) => self.ink.update(id, p),
            ElementPatch::Image(p) => self.images.update(id, p),
            ElementPatch::Redaction(p) => self.redactions.update(id, p),
            ElementPatch::FormField(p) => self.fields.update(id, p),
        }
    }

    pub fn remove(&mut self, id: ElementId) -> Option<Element> {
        if let Some(e) = self.text.remove(id) {
            return Some(Element::Text(e));
        }
        if let Some(e) = self.shapes.remove(id) {
            return Some(Element::Shape(e));
        }
        if let Some(e) = self.ink.remove(id) {
            return Some(Element::Ink(e));
        }
        if let Some(e) = self.images.remove(id) {
            return Some(Element::Image(e));
        }
        if let Some(e) = self.redactions.remove(id) {
            return Some(Element::Redaction(e));
        }
        self.fields.remove(id).map(Element::FormField)
    }

    pub fn get(&self, id: ElementId) -> Option<Element> {
        self.text
            .get(id)
            .cloned()
            .map(Element::Text)
            .or_else(|| self.shapes.get(id).cloned().map(Element::Shape))
            .or_else(|| self.ink.get(id).cloned().map(Element::Ink))
            .or_else(|| self.images.get(id).cloned().map(Element::Image))
            .or_else(|| self.redactions.get(id).cloned().map(Element::Redaction))
            .or_else(|| self.fields.get(id).cloned().map(Element::FormField))
    }

    /// Put an edited copy of an existing element back in place
    pub fn replace(&mut self, element: Element) -> bool {
        fn swap<T: LayerElement>(layer: &mut Layer<T>, element: T) -> bool {
            match layer.get_mut(element.id()) {
                Some(slot) => {
                    *slot = element;
                    true
                }
                None => false,
            }
        }

        match element {
            Element::Text(e) => swap(&mut self.text, e),
            Element::Shape(e) => swap(&mut self.shapes, e),
            Element::Ink(e) => swap(&mut self.ink, e),
            Element::Image(e) => swap(&mut self.images, e),
            Element::Redaction(e) => swap(&mut self.redactions, e),
            Element::FormField(e) => swap(&mut self.fields, e),
        }
    }

    pub fn contains(&self, id: ElementId) -> bool {
        self.kind_of(id).is_some()
    }

    pub fn kind_of(&self, id: ElementId) -> Option<LayerKind> {
        if self.redactions.contains(id) {
            Some(LayerKind::Redaction)
        } else if self.shapes.contains(id) {
            Some(LayerKind::Shape)
        } else if self.ink.contains(id) {
            Some(LayerKind::Ink)
        } else if self.text.contains(id) {
            Some(LayerKind::Text)
        } else if self.images.contains(id) {
            Some(LayerKind::Image)
        } else if self.fields.contains(id) {
            Some(LayerKind::FormField)
        } else {
            None
        }
    }

    /// Topmost element under `point`, searching front to back
    pub fn hit_test(
        &self,
        page: u32,
        point: DocPoint,
        tolerance: f32,
    ) -> Option<(LayerKind, ElementId)> {
        LayerKind::Z_ORDER.iter().rev().find_map(|kind| {
            let hit = match kind {
                LayerKind::Redaction => self.redactions.hit_test(page, point, tolerance),
                LayerKind::Shape => self.shapes.hit_test(page, point, tolerance),
                LayerKind::Ink => self.ink.hit_test(page, point, tolerance),
                LayerKind::Text => self.text.hit_test(page, point, tolerance),
                LayerKind::Image => self.images.hit_test(page, point, tolerance),
                LayerKind::FormField => self.fields.hit_test(page, point, tolerance),
            };
            hit.map(|id| (*kind, id))
        })
    }

    /// Delete every spatial element on `page` within `radius` of `point`
    ///
    /// Form fields are never erased. Returns the removed ids.
    pub fn erase(&mut self, page: u32, point: DocPoint, radius: f32) -> Vec<ElementId> {
        let mut doomed = Vec::new();
        doomed.extend(self.text.within(page, point, radius));
        doomed.extend(self.shapes.within(page, point, radius));
        doomed.extend(self.ink.within(page, point, radius));
        doomed.extend(self.images.within(page, point, radius));
        doomed.extend(self.redactions.within(page, point, radius));

        for id in &doomed {
            self.remove(*id);
        }
        doomed
    }

    pub fn element_count(&self) -> usize {
        self.redactions.len()
            + self.shapes.len()
            + self.ink.len()
            + self.text.len()
            + self.images.len()
            + self.fields.len()
    }

    pub fn count_for_page(&self, page: u32) -> usize {
        self.redactions.for_page(page).len()
            + self.shapes.for_page(page).len()
            + self.ink.for_page(page).len()
            + self.text.for_page(page).len()
            + self.images.for_page(page).len()
            + self.fields.for_page(page).len()
    }

    pub fn is_empty(&self) -> bool {
        self.element_count() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{Color, FormFieldKind, ShapeGeometry, TextStyle};
    use crate::transform::DocRect;

    fn rect_shape(page: u32, rect: DocRect) -> ShapeAnnotation {
        ShapeAnnotation::new(page, ShapeGeometry::Rectangle { rect }, Color::RED, 2.0)
    }

    #[test]
    fn test_add_and_for_page() {
        let mut layer = Layer::new();
        let a = layer.add(rect_shape(1, DocRect::new(0.0, 0.0, 10.0, 10.0)));
        let b = layer.add(rect_shape(2, DocRect::new(0.0, 0.0, 10.0, 10.0)));

        assert!(a.is_some() && b.is_some());
        assert_eq!(layer.for_page(1).len(), 1);
        assert_eq!(layer.for_page(3).len(), 0);
        assert_eq!(layer.len(), 2);
    }

    #[test]
    fn test_small_redaction_never_added() {
        let mut layers = ElementLayers::new(5.0, 2.0);
        let thin = RedactionBlock::new(1, DocRect::new(10.0, 10.0, 100.0, 5.0));
        let narrow = RedactionBlock::new(1, DocRect::new(10.0, 10.0, 4.0, 100.0));
        let ok = RedactionBlock::new(1, DocRect::new(10.0, 10.0, 6.0, 6.0));

        assert_eq!(layers.add(Element::Redaction(thin)), None);
        assert_eq!(layers.add(Element::Redaction(narrow)), None);
        assert!(layers.add(Element::Redaction(ok)).is_some());
        assert_eq!(layers.redactions.len(), 1);
    }

    #[test]
    fn test_update_and_remove() {
        let mut layer = Layer::new();
        let id = layer
            .add(RedactionBlock::new(1, DocRect::new(0.0, 0.0, 10.0, 10.0)))
            .unwrap();

        let patch = crate::element::RedactionPatch {
            fill: Some(Color::WHITE),
            ..Default::default()
        };
        assert!(layer.update(id, &patch));
        assert_eq!(layer.get(id).map(|r| r.fill), Some(Color::WHITE));
        assert!(!layer.update(uuid::Uuid::new_v4(), &patch));

        let shrink = crate::element::RedactionPatch {
            rect: Some(DocRect::new(0.0, 0.0, 2.0, 2.0)),
            ..Default::default()
        };
        let mut guarded = Layer::with_min_extent(5.0);
        let kept = guarded
            .add(RedactionBlock::new(1, DocRect::new(0.0, 0.0, 10.0, 10.0)))
            .unwrap();
        assert!(!guarded.update(kept, &shrink));
        assert_eq!(guarded.get(kept).map(|r| r.rect.width), Some(10.0));

        assert!(layer.remove(id).is_some());
        assert!(layer.is_empty());
        assert!(layer.remove(id).is_none());
    }

    #[test]
    fn test_hit_test_prefers_topmost() {
        let mut layers = ElementLayers::default();
        let shape = layers
            .add(Element::Shape(rect_shape(1, DocRect::new(0.0, 0.0, 100.0, 100.0))))
            .unwrap();
        let text = layers
            .add(Element::Text(TextBox::new(
                1,
                DocRect::new(10.0, 10.0, 50.0, 20.0),
                "hi",
                TextStyle::default(),
            )))
            .unwrap();

        let point = DocPoint::new(20.0, 15.0);
        assert_eq!(layers.hit_test(1, point, 0.0), Some((LayerKind::Text, text)));
        assert_eq!(
            layers.hit_test(1, DocPoint::new(90.0, 90.0), 0.0),
            Some((LayerKind::Shape, shape))
        );
        assert_eq!(layers.hit_test(2, point, 0.0), None);
    }

    #[test]
    fn test_erase_skips_form_fields() {
        let mut layers = ElementLayers::default();
        let rect = DocRect::new(0.0, 0.0, 20.0, 20.0);
        layers.add(Element::Shape(rect_shape(1, rect)));
        layers.add(Element::Redaction(RedactionBlock::new(1, rect)));
        layers.add(Element::FormField(FormField::new(
            1,
            rect,
            "name",
            FormFieldKind::Checkbox { checked: false },
        )));
        layers.add(Element::Shape(rect_shape(2, rect)));
        let far = layers
            .add(Element::Shape(rect_shape(1, DocRect::new(200.0, 200.0, 10.0, 10.0))))
            .unwrap();

        let erased = layers.erase(1, DocPoint::new(3.0, 4.0), 6.0);
        assert_eq!(erased.len(), 2);
        assert_eq!(layers.fields.len(), 1);
        assert_eq!(layers.shapes.for_page(2).len(), 1);
        assert!(layers.contains(far));
    }

    #[test]
    fn test_erase_measures_from_defining_point() {
        let mut layers = ElementLayers::default();
        let large = layers
            .add(Element::Shape(rect_shape(1, DocRect::new(0.0, 0.0, 200.0, 200.0))))
            .unwrap();
        let stroke = layers
            .add(Element::Ink(InkStroke::new(
                1,
                vec![DocPoint::new(300.0, 0.0), DocPoint::new(300.0, 100.0)],
                Color::RED,
                2.0,
            )))
            .unwrap();

        // Inside the rectangle and on the stroke's path, but far from either
        // the rectangle's corner or any stroke vertex
        assert!(layers.erase(1, DocPoint::new(100.0, 100.0), 10.0).is_empty());
        assert!(layers.erase(1, DocPoint::new(300.0, 50.0), 10.0).is_empty());

        assert_eq!(layers.erase(1, DocPoint::new(4.0, 3.0), 10.0), vec![large]);
        assert_eq!(layers.erase(1, DocPoint::new(305.0, 98.0), 10.0), vec![stroke]);
    }

    #[test]
    fn test_snapshot_restore_covers_all_layers() {
        let mut layers = ElementLayers::new(5.0, 2.0);
        let rect = DocRect::new(0.0, 0.0, 20.0, 20.0);
        layers.add(Element::Shape(rect_shape(1, rect)));
        let snapshot = layers.snapshot();

        layers.add(Element::Redaction(RedactionBlock::new(1, rect)));
        layers.add(Element::Text(TextBox::new(1, rect, "x", TextStyle::default())));
        assert_eq!(layers.element_count(), 3);

        layers.restore(&snapshot);
        assert_eq!(layers.element_count(), 1);
        assert_eq!(&layers, snapshot.layers());
        assert_eq!(layers.redactions.min_extent(), 5.0);
    }

    #[test]
    fn test_replace_and_kind_of() {
        let mut layers = ElementLayers::default();
        let mut block = RedactionBlock::new(3, DocRect::new(0.0, 0.0, 20.0, 20.0));
        let id = layers.add(Element::Redaction(block.clone())).unwrap();
        assert_eq!(layers.kind_of(id), Some(LayerKind::Redaction));

        block.rect = DocRect::new(5.0, 5.0, 20.0, 20.0);
        assert!(layers.replace(Element::Redaction(block)));
        assert_eq!(layers.get(id).map(|e| e.bounds().x), Some(5.0));
        assert_eq!(layers.count_for_page(3), 1);
    }
}
