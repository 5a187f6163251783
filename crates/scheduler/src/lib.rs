//! Folio Scheduler Library
//!
//! Cooperative task primitives for the editor's single event loop.
//!
//! Rendering, font fetching and OCR are interleaved tasks rather than parallel
//! threads. This crate provides the pieces those tasks share:
//! - [`CancellationToken`]: checked by a task between units of work
//! - [`TaskSlot`]: latest-wins tracking so a stale result is discarded
//! - [`PageWindow`]: render priority around the current page
//!
//! # Example
//!
//! ```
//! use folio_scheduler::{PageWindow, TaskSlot};
//!
//! let mut renders = TaskSlot::new();
//! let (ticket, token) = renders.begin();
//!
//! // ... render page, checking token.is_cancelled() along the way ...
//! if renders.finish(ticket) {
//!     // apply the result
//! }
//!
//! let window = PageWindow::new(3, 10, 2);
//! assert!(window.contains(5));
//! # let _ = token;
//! ```

mod cancel;
mod window;

pub use cancel::{CancellationToken, TaskSlot, TaskTicket};
pub use window::{PagePriority, PageWindow};
