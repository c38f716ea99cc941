//! Scrape-and-persist driver for one category run.

use serde::Serialize;
use std::fmt;
use tracing::{info, warn};

use crate::error::Result;
use crate::models::UpsertStats;
use crate::scrapers::traits::{DetailSource, PageSource};
use crate::scrapers::types::{PageHarvest, ScrapeRequest};
use crate::storage::ListingStore;

/// Outcome of a category run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub pages: u32,
    pub skipped_pages: u32,
    /// Records produced before persistence, null links included
    pub candidates: u64,
    pub stats: UpsertStats,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} pages ({} skipped), {} candidates: {}",
            self.pages, self.skipped_pages, self.candidates, self.stats
        )
    }
}

/// Walk the requested pages in order, persisting each page as its own batch.
///
/// Page-level failures are counted and skipped. Only errors from the page
/// source itself (a dead browser session) or from opening a storage batch
/// end the run early; batches already written stay written.
pub async fn scrape_and_persist(
    source: &mut dyn PageSource,
    details: &dyn DetailSource,
    store: &ListingStore,
    request: &ScrapeRequest,
) -> Result<RunSummary> {
    let category = request.category;
    let mut summary = RunSummary::default();
    info!(
        "Scraping {} pages {}-{} from {} ({:?})",
        category,
        request.start_page,
        request.end_page,
        source.source_name(),
        request.mode
    );

    for page in request.pages() {
        if page > request.start_page {
            tokio::time::sleep(request.pause()).await;
        }
        summary.pages += 1;

        let listings = match source.fetch_page(category, page, request.mode)? {
            PageHarvest::Rows(rows) => rows,
            PageHarvest::Links { links, cookies } => {
                if links.is_empty() {
                    Vec::new()
                } else {
                    details.fetch_details(category, page, links, &cookies).await
                }
            }
            PageHarvest::Skipped => {
                summary.skipped_pages += 1;
                continue;
            }
        };
        if listings.is_empty() {
            warn!("Page {} of {} produced no listings", page, category);
            continue;
        }

        summary.candidates += listings.len() as u64;
        let stats = if request.insert_only {
            store.insert_if_absent(&listings).await?
        } else {
            store.upsert(&listings).await?
        };
        info!("Page {}: {}", page, stats);
        summary.stats.merge(stats);
    }

    info!("{} done: {}", category, summary);
    Ok(summary)
}
