//! Concurrent detail-page fetcher.
//!
//! Every link gets its own task and its own HTTP client built from a copy
//! of the browser cookies, so tasks share nothing mutable.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::models::{BrowserCookie, Category, DetailFields, Listing};
use crate::scrapers::detail::parse_detail;
use crate::scrapers::http::{build_client, get_text, SessionConfig};
use crate::scrapers::traits::DetailSource;

pub const DEFAULT_WORKERS: usize = 12;

/// Fetches detail pages over plain HTTP with a bounded worker pool
#[derive(Debug, Clone)]
pub struct DetailFetcher {
    session: SessionConfig,
    workers: usize,
}

impl Default for DetailFetcher {
    fn default() -> Self {
        Self::new(SessionConfig::default(), DEFAULT_WORKERS)
    }
}

impl DetailFetcher {
    pub fn new(session: SessionConfig, workers: usize) -> Self {
        Self {
            session,
            workers: workers.max(1),
        }
    }

    #[cfg(test)]
    fn workers(&self) -> usize {
        self.workers
    }

    async fn fetch_one(
        &self,
        category: Category,
        cookies: &[BrowserCookie],
        link: &str,
    ) -> Result<DetailFields> {
        let client = build_client(&self.session, cookies)?;
        let html = get_text(&client, link, self.session.retry).await?;
        Ok(parse_detail(&html, category.label()))
    }
}

#[async_trait]
impl DetailSource for DetailFetcher {
    async fn fetch_details(
        &self,
        category: Category,
        page: u32,
        links: Vec<String>,
        cookies: &[BrowserCookie],
    ) -> Vec<Listing> {
        let total = links.len();

        let listings: Vec<Listing> = stream::iter(links)
            .map(|link| async move {
                match self.fetch_one(category, cookies, &link).await {
                    Ok(fields) => {
                        debug!("Fetched {}", link);
                        Listing::from_detail(category, page, link, fields)
                    }
                    Err(e) => {
                        warn!("Detail fetch failed for {}: {}", link, e);
                        Listing::unresolved(category, page, link)
                    }
                }
            })
            .buffer_unordered(self.workers)
            .collect()
            .await;

        let failed = listings.iter().filter(|l| l.is_blank()).count();
        info!(
            "Fetched {} detail pages for page {} ({} without data)",
            total, page, failed
        );
        listings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scrapers::http::RetryPolicy;
    use std::collections::HashSet;
    use std::time::Duration;
    use wiremock::matchers::{method, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn detail_html(n: usize) -> String {
        format!(
            r#"<html><body><div class="hide-on-med-and-down">
                <h1>Berger allemand {n}</h1>
                <p class="price">{n}0 000 CFA</p>
                <div data-address><span>Dakar - Almadies</span></div>
            </div></body></html>"#
        )
    }

    fn fast_fetcher(workers: usize) -> DetailFetcher {
        DetailFetcher::new(
            SessionConfig {
                timeout: Duration::from_secs(5),
                retry: RetryPolicy {
                    retries: 2,
                    backoff: Duration::from_millis(1),
                },
                ..SessionConfig::default()
            },
            workers,
        )
    }

    #[tokio::test]
    async fn failed_fetches_keep_their_links() {
        let server = MockServer::start().await;
        for n in 0..10 {
            let response = if n % 3 == 0 && n > 0 {
                ResponseTemplate::new(500)
            } else {
                ResponseTemplate::new(200).set_body_string(detail_html(n))
            };
            Mock::given(method("GET"))
                .and(path_regex(format!("^/annonce/chiens/{n}$")))
                .respond_with(response)
                .mount(&server)
                .await;
        }

        let links: Vec<String> = (0..10)
            .map(|n| format!("{}/annonce/chiens/{}", server.uri(), n))
            .collect();
        let listings = fast_fetcher(4)
            .fetch_details(Category::Chiens, 1, links.clone(), &[])
            .await;

        assert_eq!(listings.len(), 10);
        let blank: Vec<_> = listings.iter().filter(|l| l.is_blank()).collect();
        assert_eq!(blank.len(), 3);
        assert!(blank.iter().all(|l| l.link.is_some()));

        let returned: HashSet<_> = listings.iter().filter_map(|l| l.link.clone()).collect();
        assert_eq!(returned, links.into_iter().collect());

        let good = listings
            .iter()
            .find(|l| l.link.as_deref().is_some_and(|link| link.ends_with("/annonce/chiens/4")))
            .unwrap();
        assert_eq!(good.title.as_deref(), Some("Berger allemand 4"));
        assert_eq!(good.price_raw.as_deref(), Some("40 000 CFA"));
        assert_eq!(good.address_raw.as_deref(), Some("Dakar - Almadies"));
    }

    #[tokio::test]
    async fn unreachable_host_yields_blank_listing() {
        let listings = fast_fetcher(2)
            .fetch_details(
                Category::Moutons,
                3,
                vec!["http://127.0.0.1:9/annonce/moutons/1".to_string()],
                &[],
            )
            .await;
        assert_eq!(listings.len(), 1);
        assert!(listings[0].is_blank());
        assert_eq!(listings[0].page, 3);
    }

    #[test]
    fn worker_pool_is_never_empty() {
        assert_eq!(DetailFetcher::new(SessionConfig::default(), 0).workers(), 1);
    }
}
