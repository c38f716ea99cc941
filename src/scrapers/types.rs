use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use std::time::Duration;

use crate::models::{BrowserCookie, Category, Listing};

/// How a listing page is harvested
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum HarvestMode {
    /// Read every field off the listing cards in one pass
    #[default]
    ListOnly,
    /// Collect permalinks and cookies, then fetch each detail page over HTTP
    Detail,
}

/// What one listing page produced
#[derive(Debug, Clone, PartialEq)]
pub enum PageHarvest {
    /// Ready-to-persist rows from the fast path
    Rows(Vec<Listing>),
    /// Detail permalinks in first-seen order, with the browser's cookies
    Links {
        links: Vec<String>,
        cookies: Vec<BrowserCookie>,
    },
    /// No pagination scheme rendered the listing grid
    Skipped,
}

/// Parameters of one category run
#[derive(Debug, Clone)]
pub struct ScrapeRequest {
    pub category: Category,
    pub start_page: u32,
    pub end_page: u32,
    pub mode: HarvestMode,
    /// Width of the detail-fetch worker pool
    pub workers: usize,
    /// Randomized pause between pages, in milliseconds
    pub pause_ms: (u64, u64),
    /// Only add unseen links, never refresh stored rows
    pub insert_only: bool,
}

impl ScrapeRequest {
    pub fn new(category: Category, pages: RangeInclusive<u32>) -> Self {
        Self {
            category,
            start_page: (*pages.start()).max(1),
            end_page: *pages.end(),
            mode: HarvestMode::default(),
            workers: 12,
            pause_ms: (120, 350),
            insert_only: false,
        }
    }

    pub fn pages(&self) -> RangeInclusive<u32> {
        self.start_page..=self.end_page
    }

    /// Pick a pause inside the configured bounds
    pub fn pause(&self) -> Duration {
        let (low, high) = self.pause_ms;
        let millis = if high > low {
            fastrand::u64(low..=high)
        } else {
            low
        };
        Duration::from_millis(millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pages_start_at_one() {
        let request = ScrapeRequest::new(Category::Chiens, 0..=3);
        assert_eq!(request.pages(), 1..=3);
    }

    #[test]
    fn pause_stays_in_bounds() {
        let request = ScrapeRequest {
            pause_ms: (10, 20),
            ..ScrapeRequest::new(Category::Chiens, 1..=1)
        };
        for _ in 0..50 {
            let pause = request.pause();
            assert!(pause >= Duration::from_millis(10) && pause <= Duration::from_millis(20));
        }
    }
}
