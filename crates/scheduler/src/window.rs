//! Page priority window for lazy rendering
//!
//! Rendering is prioritised around the current page:
//! 1. The current page - highest priority
//! 2. Adjacent pages - prefetched for fast page switching
//! 3. Pages inside the window radius - rendered when idle
//! 4. Pages outside the window - never rendered ahead, their rasters are evictable

/// Priority of a page relative to the current page
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PagePriority {
    /// Outside the render window (evictable)
    Outside = 0,

    /// Inside the window but not adjacent
    Window = 1,

    /// Directly before or after the current page
    Adjacent = 2,

    /// The page being viewed
    Current = 3,
}

/// Window of pages around the current page (1-based page numbers)
///
/// # Example
///
/// ```
/// use folio_scheduler::{PagePriority, PageWindow};
///
/// let window = PageWindow::new(5, 10, 2);
/// assert_eq!(window.pages(), vec![5, 6, 4, 7, 3]);
/// assert_eq!(window.priority(9), PagePriority::Outside);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    current: u32,
    page_count: u32,
    radius: u32,
}

impl PageWindow {
    /// Create a window centered on `current` with the given radius
    pub fn new(current: u32, page_count: u32, radius: u32) -> Self {
        Self {
            current: current.clamp(1, page_count.max(1)),
            page_count,
            radius,
        }
    }

    /// Current page at the centre of the window
    pub fn current(&self) -> u32 {
        self.current
    }

    /// Priority of `page` relative to the window
    pub fn priority(&self, page: u32) -> PagePriority {
        if page == 0 || page > self.page_count {
            return PagePriority::Outside;
        }

        match page.abs_diff(self.current) {
            0 => PagePriority::Current,
            1 if self.radius >= 1 => PagePriority::Adjacent,
            d if d <= self.radius => PagePriority::Window,
            _ => PagePriority::Outside,
        }
    }

    /// Returns `true` if the page is inside the window
    pub fn contains(&self, page: u32) -> bool {
        self.priority(page) != PagePriority::Outside
    }

    /// Pages in render order: current first, then alternating after/before
    pub fn pages(&self) -> Vec<u32> {
        let mut pages = Vec::with_capacity(self.radius as usize * 2 + 1);
        if self.page_count == 0 {
            return pages;
        }

        pages.push(self.current);
        for distance in 1..=self.radius {
            if let Some(after) = self.current.checked_add(distance) {
                if after <= self.page_count {
                    pages.push(after);
                }
            }
            if distance < self.current {
                pages.push(self.current - distance);
            }
        }
        pages
    }

    /// Filter `cached` down to the pages that fall outside the window
    pub fn evictable<I>(&self, cached: I) -> Vec<u32>
    where
        I: IntoIterator<Item = u32>,
    {
        let mut pages: Vec<u32> = cached.into_iter().filter(|page| !self.contains(*page)).collect();
        pages.sort_unstable();
        pages.dedup();
        pages
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_priorities() {
        let window = PageWindow::new(5, 10, 2);
        assert_eq!(window.priority(5), PagePriority::Current);
        assert_eq!(window.priority(4), PagePriority::Adjacent);
        assert_eq!(window.priority(6), PagePriority::Adjacent);
        assert_eq!(window.priority(7), PagePriority::Window);
        assert_eq!(window.priority(3), PagePriority::Window);
        assert_eq!(window.priority(8), PagePriority::Outside);
        assert_eq!(window.priority(0), PagePriority::Outside);
        assert_eq!(window.priority(11), PagePriority::Outside);
    }

    #[test]
    fn test_window_pages_clamped_at_edges() {
        let window = PageWindow::new(1, 3, 2);
        assert_eq!(window.pages(), vec![1, 2, 3]);

        let window = PageWindow::new(3, 3, 1);
        assert_eq!(window.pages(), vec![3, 2]);
    }

    #[test]
    fn test_window_zero_radius() {
        let window = PageWindow::new(2, 3, 0);
        assert_eq!(window.pages(), vec![2]);
        assert_eq!(window.priority(1), PagePriority::Outside);
    }

    #[test]
    fn test_window_evictable() {
        let window = PageWindow::new(5, 20, 1);
        assert_eq!(window.evictable([1, 4, 5, 6, 9, 9]), vec![1, 9]);
    }

    #[test]
    fn test_window_clamps_current() {
        let window = PageWindow::new(42, 3, 1);
        assert_eq!(window.current(), 3);
    }
}
