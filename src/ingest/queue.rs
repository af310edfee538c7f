//! Shared page queue for the page worker pool.

use std::sync::atomic::{AtomicU64, Ordering};

/// One unit of outer-level work: a page index and its size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageTask {
    pub page: u32,
    pub per_page: u32,
}

/// Hands out each page of an inclusive range exactly once, to whichever
/// worker asks first.
#[derive(Debug)]
pub struct PageQueue {
    next: AtomicU64,
    end: u64,
    per_page: u32,
}

impl PageQueue {
    /// Queue for `[start_page, end_page]`. `start_page > end_page` is empty.
    pub fn new(start_page: u32, end_page: u32, per_page: u32) -> Self {
        Self {
            next: AtomicU64::new(u64::from(start_page)),
            end: u64::from(end_page),
            per_page,
        }
    }

    /// Claim the next page, or `None` once the range is exhausted.
    pub fn next(&self) -> Option<PageTask> {
        let page = self.next.fetch_add(1, Ordering::Relaxed);
        if page > self.end {
            return None;
        }
        Some(PageTask {
            // page <= end <= u32::MAX
            page: page as u32,
            per_page: self.per_page,
        })
    }

    /// Pages not yet claimed.
    pub fn len(&self) -> usize {
        let next = self.next.load(Ordering::Relaxed);
        (self.end + 1).saturating_sub(next) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
