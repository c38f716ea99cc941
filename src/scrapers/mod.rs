pub mod browser;
pub mod detail;
pub mod fetcher;
pub mod http;
pub mod pipeline;
pub mod selectors;
pub mod traits;
pub mod types;

pub use browser::ListingBrowser;
pub use fetcher::DetailFetcher;
pub use pipeline::scrape_and_persist;
pub use types::{HarvestMode, ScrapeRequest};
