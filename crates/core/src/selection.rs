//! Selected elements on the current page

use crate::element::{ElementId, LayerKind};

/// Ordered set of selected elements, all on one page
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selection {
    page: Option<u32>,
    items: Vec<(LayerKind, ElementId)>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the selection with a single element
    pub fn select(&mut self, page: u32, kind: LayerKind, id: ElementId) {
        self.page = Some(page);
        self.items.clear();
        self.items.push((kind, id));
    }

    /// Add or remove one element; a different page starts a fresh selection
    pub fn toggle(&mut self, page: u32, kind: LayerKind, id: ElementId) {
        if self.page != Some(page) {
            self.select(page, kind, id);
            return;
        }
        if let Some(index) = self.items.iter().position(|(_, item)| *item == id) {
            self.items.remove(index);
            if self.items.is_empty() {
                self.page = None;
            }
        } else {
            self.items.push((kind, id));
        }
    }

    pub fn clear(&mut self) {
        self.page = None;
        self.items.clear();
    }

    pub fn contains(&self, id: ElementId) -> bool {
        self.items.iter().any(|(_, item)| *item == id)
    }

    pub fn items(&self) -> &[(LayerKind, ElementId)] {
        &self.items
    }

    pub fn ids(&self) -> impl Iterator<Item = ElementId> + '_ {
        self.items.iter().map(|(_, id)| *id)
    }

    /// The single selected element, if exactly one is selected
    pub fn single(&self) -> Option<(LayerKind, ElementId)> {
        match self.items.as_slice() {
            [only] => Some(*only),
            _ => None,
        }
    }

    pub fn page(&self) -> Option<u32> {
        self.page
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Drop ids for which `keep` returns false (e.g. after undo)
    pub fn retain(&mut self, mut keep: impl FnMut(ElementId) -> bool) {
        self.items.retain(|(_, id)| keep(*id));
        if self.items.is_empty() {
            self.page = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_select_replaces() {
        let mut selection = Selection::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        selection.select(1, LayerKind::Shape, a);
        selection.select(1, LayerKind::Text, b);

        assert_eq!(selection.single(), Some((LayerKind::Text, b)));
        assert!(!selection.contains(a));
    }

    #[test]
    fn test_toggle_across_pages_resets() {
        let mut selection = Selection::new();
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        selection.toggle(1, LayerKind::Shape, a);
        selection.toggle(1, LayerKind::Ink, b);
        assert_eq!(selection.len(), 2);

        selection.toggle(2, LayerKind::Ink, c);
        assert_eq!(selection.len(), 1);
        assert_eq!(selection.page(), Some(2));

        selection.toggle(2, LayerKind::Ink, c);
        assert!(selection.is_empty());
        assert_eq!(selection.page(), None);
    }

    #[test]
    fn test_retain() {
        let mut selection = Selection::new();
        let a = Uuid::new_v4();
        selection.select(1, LayerKind::Shape, a);
        selection.retain(|id| id != a);
        assert!(selection.is_empty());
        assert_eq!(selection.page(), None);
    }
}
