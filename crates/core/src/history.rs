//! Bounded undo/redo history of immutable snapshots
//!
//! Entries form a linear log with a cursor. Committing truncates everything after
//! the cursor; once the log exceeds its capacity the oldest entry is dropped.

use std::collections::VecDeque;

/// Linear undo/redo log
///
/// # Example
///
/// ```
/// use folio_core::History;
///
/// let mut history = History::new("empty", 50);
/// history.commit("one");
/// history.commit("two");
///
/// assert_eq!(history.undo(), Some(&"one"));
/// assert_eq!(history.redo(), Some(&"two"));
/// assert_eq!(history.redo(), None);
/// ```
#[derive(Debug, Clone)]
pub struct History<T> {
    entries: VecDeque<T>,
    cursor: usize,
    capacity: usize,
}

impl<T> History<T> {
    /// Start a history whose first entry is `initial`
    ///
    /// `capacity` counts every entry including the initial one, and is at least 1.
    pub fn new(initial: T, capacity: usize) -> Self {
        let mut entries = VecDeque::with_capacity(capacity.clamp(1, 64));
        entries.push_back(initial);
        Self {
            entries,
            cursor: 0,
            capacity: capacity.max(1),
        }
    }

    /// Record a new state after the cursor, discarding any redo entries
    pub fn commit(&mut self, state: T) {
        self.entries.truncate(self.cursor + 1);
        self.entries.push_back(state);

        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
        self.cursor = self.entries.len() - 1;
        tracing::debug!(cursor = self.cursor, len = self.entries.len(), "history commit");
    }

    /// Step back; `None` (and no change) at the oldest entry
    pub fn undo(&mut self) -> Option<&T> {
        if self.cursor == 0 {
            return None;
        }
        self.cursor -= 1;
        self.entries.get(self.cursor)
    }

    /// Step forward; `None` (and no change) at the newest entry
    pub fn redo(&mut self) -> Option<&T> {
        if self.cursor + 1 >= self.entries.len() {
            return None;
        }
        self.cursor += 1;
        self.entries.get(self.cursor)
    }

    pub fn current(&self) -> Option<&T> {
        self.entries.get(self.cursor)
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor + 1 < self.entries.len()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop every entry and start over from `initial`
    pub fn reset(&mut self, initial: T) {
        self.entries.clear();
        self.entries.push_back(initial);
        self.cursor = 0;
    }
}
