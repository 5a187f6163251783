//! Cancellation tokens for cooperative tasks
//!
//! Page renders, font fetches and OCR runs are suspension points. Each one holds a
//! [`CancellationToken`] and checks it between units of work. A [`TaskSlot`] tracks
//! the single in-flight task of one kind (for example the render for one surface)
//! and cancels it as soon as a newer task is started.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Cancellation token for cooperative task cancellation
///
/// Multiple clones share the same underlying flag.
///
/// # Example
///
/// ```
/// use folio_scheduler::CancellationToken;
///
/// let token = CancellationToken::new();
/// let task_token = token.clone();
///
/// token.cancel();
/// assert!(task_token.is_cancelled());
/// ```
#[derive(Debug, Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a new token in the non-cancelled state
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Cancel this token and every clone of it. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Returns `true` once `cancel()` has been called on this token or any clone
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Identifies one task started through a [`TaskSlot`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskTicket {
    generation: u64,
}

impl TaskTicket {
    /// Monotonic generation number of the task
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Latest-wins slot for a single kind of in-flight task
///
/// Starting a task cancels whatever was running before. A finished task only
/// "counts" if its ticket is still the current one and it was not cancelled, so a
/// stale result can never overwrite newer state.
///
/// # Example
///
/// ```
/// use folio_scheduler::TaskSlot;
///
/// let mut slot = TaskSlot::new();
/// let (first, first_token) = slot.begin();
/// let (second, _) = slot.begin();
///
/// assert!(first_token.is_cancelled());
/// assert!(!slot.finish(first));
/// assert!(slot.finish(second));
/// ```
#[derive(Debug, Default)]
pub struct TaskSlot {
    next_generation: u64,
    current: Option<(TaskTicket, CancellationToken)>,
}

impl TaskSlot {
    /// Create an empty slot
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new task, cancelling the one in flight (if any)
    pub fn begin(&mut self) -> (TaskTicket, CancellationToken) {
        if let Some((ticket, token)) = self.current.take() {
            tracing::trace!(generation = ticket.generation, "superseding in-flight task");
            token.cancel();
        }

        self.next_generation += 1;
        let ticket = TaskTicket {
            generation: self.next_generation,
        };
        let token = CancellationToken::new();
        self.current = Some((ticket, token.clone()));
        (ticket, token)
    }

    /// Returns `true` if `ticket` is the live task and has not been cancelled
    pub fn is_current(&self, ticket: TaskTicket) -> bool {
        matches!(&self.current, Some((live, token)) if *live == ticket && !token.is_cancelled())
    }

    /// Mark a task finished
    ///
    /// Returns `true` if its result should be applied. The slot is emptied only when
    /// the ticket matches the live task.
    pub fn finish(&mut self, ticket: TaskTicket) -> bool {
        let accepted = self.is_current(ticket);
        if matches!(&self.current, Some((live, _)) if *live == ticket) {
            self.current = None;
        }
        accepted
    }

    /// Cancel the in-flight task. Returns `true` if there was one.
    pub fn cancel(&mut self) -> bool {
        match self.current.take() {
            Some((_, token)) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Returns `true` while a task is in flight
    pub fn in_flight(&self) -> bool {
        self.current.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancellation_token_basic() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());

        token.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_cancellation_token_clone() {
        let token1 = CancellationToken::new();
        let token2 = token1.clone();

        token1.cancel();
        assert!(token1.is_cancelled());
        assert!(token2.is_cancelled());
    }

    #[test]
    fn test_cancellation_token_idempotent() {
        let token = CancellationToken::default();
        token.cancel();
        token.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_slot_begin_cancels_previous() {
        let mut slot = TaskSlot::new();
        let (_, first) = slot.begin();
        let (_, second) = slot.begin();

        assert!(first.is_cancelled());
        assert!(!second.is_cancelled());
    }

    #[test]
    fn test_slot_stale_ticket_rejected() {
        let mut slot = TaskSlot::new();
        let (stale, _) = slot.begin();
        let (live, _) = slot.begin();

        assert!(!slot.is_current(stale));
        assert!(!slot.finish(stale));
        // The stale finish must not clear the live task
        assert!(slot.in_flight());
        assert!(slot.finish(live));
        assert!(!slot.in_flight());
    }

    #[test]
    fn test_slot_cancel() {
        let mut slot = TaskSlot::new();
        assert!(!slot.cancel());

        let (ticket, token) = slot.begin();
        assert!(slot.cancel());
        assert!(token.is_cancelled());
        assert!(!slot.finish(ticket));
    }

    #[test]
    fn test_slot_generations_increase() {
        let mut slot = TaskSlot::new();
        let (a, _) = slot.begin();
        let (b, _) = slot.begin();
        assert!(b.generation() > a.generation());
    }
}
