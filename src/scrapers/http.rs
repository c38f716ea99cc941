//! HTTP session factory for static detail pages.
//!
//! Each client carries a copy of the browser cookies, a desktop browser
//! header set and a connection pool. Transient server errors are retried a
//! couple of times with exponential backoff, GET only.

use std::sync::Arc;
use std::time::Duration;

use reqwest::cookie::Jar;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client, StatusCode, Url};
use tracing::debug;

use crate::error::{Result, ScoutError};
use crate::models::BrowserCookie;
use crate::scrapers::selectors::SITE_HOST;

pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0 Safari/537.36";

const RETRY_STATUSES: [StatusCode; 5] = [
    StatusCode::TOO_MANY_REQUESTS,
    StatusCode::INTERNAL_SERVER_ERROR,
    StatusCode::BAD_GATEWAY,
    StatusCode::SERVICE_UNAVAILABLE,
    StatusCode::GATEWAY_TIMEOUT,
];

/// Retry behaviour for transient server errors
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub retries: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 2,
            backoff: Duration::from_millis(200),
        }
    }
}

impl RetryPolicy {
    fn delay(&self, attempt: u32) -> Duration {
        self.backoff * 2u32.saturating_pow(attempt)
    }
}

/// Settings shared by every client the factory builds
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub timeout: Duration,
    pub pool_max_idle_per_host: usize,
    pub retry: RetryPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(12),
            pool_max_idle_per_host: 32,
            retry: RetryPolicy::default(),
        }
    }
}

fn default_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::ACCEPT,
        HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
    );
    headers.insert(
        header::ACCEPT_LANGUAGE,
        HeaderValue::from_static("fr-FR,fr;q=0.9,en;q=0.8"),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(header::REFERER, HeaderValue::from_static("https://sn.coinafrique.com/"));
    headers
}

/// Load cookie copies into a fresh jar. Cookies without a domain are
/// scoped to the marketplace host.
pub fn cookie_jar(cookies: &[BrowserCookie]) -> Jar {
    let jar = Jar::default();
    for cookie in cookies {
        let domain = cookie
            .domain
            .as_deref()
            .map(|d| d.trim_start_matches('.'))
            .filter(|d| !d.is_empty())
            .unwrap_or(SITE_HOST);
        let Ok(url) = Url::parse(&format!("https://{}/", domain)) else {
            debug!("Skipping cookie {} with unusable domain {}", cookie.name, domain);
            continue;
        };
        jar.add_cookie_str(
            &format!("{}={}; Domain={}; Path=/", cookie.name, cookie.value, domain),
            &url,
        );
    }
    jar
}

/// Build an isolated client seeded with a copy of `cookies`.
pub fn build_client(config: &SessionConfig, cookies: &[BrowserCookie]) -> Result<Client> {
    let client = Client::builder()
        .user_agent(USER_AGENT)
        .default_headers(default_headers())
        .cookie_provider(Arc::new(cookie_jar(cookies)))
        .timeout(config.timeout)
        .pool_max_idle_per_host(config.pool_max_idle_per_host)
        .build()?;
    Ok(client)
}

/// GET `url`, retrying transient statuses and connection failures, and
/// return the body of a 2xx response.
pub async fn get_text(client: &Client, url: &str, retry: RetryPolicy) -> Result<String> {
    let mut attempt = 0;
    loop {
        match client.get(url).send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    return Ok(response.text().await?);
                }
                if attempt < retry.retries && RETRY_STATUSES.contains(&status) {
                    debug!("{} returned {}, retry {}", url, status, attempt + 1);
                } else {
                    return Err(ScoutError::Status {
                        url: url.to_string(),
                        status: status.as_u16(),
                    });
                }
            }
            Err(e) if attempt < retry.retries && e.is_connect() => {
                debug!("Connection to {} failed ({}), retry {}", url, e, attempt + 1);
            }
            Err(e) => return Err(e.into()),
        }
        tokio::time::sleep(retry.delay(attempt)).await;
        attempt += 1;
    }
}
