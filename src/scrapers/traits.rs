use crate::error::Result;
use crate::models::{BrowserCookie, Category, Listing};
use crate::scrapers::types::{HarvestMode, PageHarvest};
use async_trait::async_trait;

/// Produces the listings shown on one category index page.
///
/// Implementations own a single browser session and are driven one page at
/// a time, so the trait takes `&mut self` and is not async.
pub trait PageSource {
    /// Open `page` of `category` and harvest it according to `mode`.
    ///
    /// A page that cannot be rendered is reported as [`PageHarvest::Skipped`]
    /// as long as the session still responds. A session that no longer
    /// responds is returned as `Err` and ends the run.
    fn fetch_page(
        &mut self,
        category: Category,
        page: u32,
        mode: HarvestMode,
    ) -> Result<PageHarvest>;

    /// Get the name of the backing source
    fn source_name(&self) -> &'static str;
}

/// Turns detail permalinks into listings
#[async_trait]
pub trait DetailSource: Send + Sync {
    /// Returns exactly one listing per link, in completion order. Failed
    /// fetches yield a listing with only `link` set.
    async fn fetch_details(
        &self,
        category: Category,
        page: u32,
        links: Vec<String>,
        cookies: &[BrowserCookie],
    ) -> Vec<Listing>;
}
