use crate::error::{Result, ScoutError};
use crate::models::{BrowserCookie, Category, Listing, Source};
use crate::scrapers::http::USER_AGENT;
use crate::scrapers::selectors::{
    clean_image_url, normalize_url, PageScheme, DETAIL_LINK_MARKER, LISTING_READY,
};
use crate::scrapers::traits::PageSource;
use crate::scrapers::types::{HarvestMode, PageHarvest};
use anyhow::Context;
use headless_chrome::protocol::cdp::Page;
use headless_chrome::{Browser, LaunchOptions, Tab};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Reads every listing card in a single round-trip and returns it as JSON
const CARD_SCRIPT: &str = r#"
(() => {
  const cards = Array.from(document.querySelectorAll('div.col.s6.m4.l3'));
  function pickImg(el) {
    const img = el.querySelector('img.ad__card-img') || el.querySelector('a.card-image img');
    if (!img) {
      const a = el.querySelector('a.card-image');
      if (a && a.style && a.style.backgroundImage) {
        const m = a.style.backgroundImage.match(/url\(['"]?(.*?)['"]?\)/);
        return m ? m[1] : null;
      }
      return null;
    }
    return img.getAttribute('data-src') || img.getAttribute('data-lazy') ||
           img.getAttribute('data-original') || (img.getAttribute('srcset') || '').split(' ')[0] ||
           img.getAttribute('src');
  }
  return JSON.stringify(cards.map(c => {
    const text = (sel) => ((c.querySelector(sel) || {}).innerText || '').trim();
    const a = c.querySelector('.ad__card-description a[href], a.card-image[href]');
    return {
      name: text('p.ad__card-description'),
      price: text('p.ad__card-price'),
      addr: text('p.ad__card-location span'),
      link: a ? a.href : null,
      img: pickImg(c),
    };
  }));
})()
"#;

const LINK_SCRIPT: &str = r#"
JSON.stringify(Array.from(document.querySelectorAll('.ad__card-description a[href]')).map(a => a.href || ''))
"#;

const CHROME_NAMES: [&str; 4] = [
    "google-chrome",
    "google-chrome-stable",
    "chromium",
    "chromium-browser",
];

const CHROME_FIXED_PATHS: [&str; 3] = [
    "/usr/bin/google-chrome",
    "/usr/bin/chromium",
    "/usr/bin/chromium-browser",
];

/// Driver and browser caches left behind by earlier automation tooling,
/// relative to the home directory
const DRIVER_CACHE_DIRS: [&str; 3] = [".wdm", ".cache/selenium", ".local/share/headless-chrome"];

/// One listing card as returned by [`CARD_SCRIPT`]
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CardData {
    pub name: Option<String>,
    pub price: Option<String>,
    pub addr: Option<String>,
    pub link: Option<String>,
    pub img: Option<String>,
}

/// Launch settings for the listing browser
#[derive(Debug, Clone)]
pub struct BrowserOptions {
    pub headless: bool,
    pub chrome_path: Option<PathBuf>,
    /// Upper bound on waiting for the listing grid to render
    pub page_wait: Duration,
    /// When set, each rendered page's HTML and a screenshot are saved here
    pub debug_dir: Option<PathBuf>,
}

impl Default for BrowserOptions {
    fn default() -> Self {
        Self {
            headless: true,
            chrome_path: None,
            page_wait: Duration::from_secs(8),
            debug_dir: None,
        }
    }
}

/// A browser binary to try, `None` meaning headless_chrome's own detection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendCandidate {
    pub label: String,
    pub path: Option<PathBuf>,
}

/// Ordered browser candidates: explicit path, `CHROME_PATH`, `PATH`
/// lookups, fixed install locations, then auto-detection.
pub fn backend_candidates(configured: Option<&Path>) -> Vec<BackendCandidate> {
    let mut paths: Vec<(String, PathBuf)> = Vec::new();
    if let Some(path) = configured {
        paths.push(("configured".to_string(), path.to_path_buf()));
    }
    if let Some(path) = std::env::var_os("CHROME_PATH") {
        paths.push(("CHROME_PATH".to_string(), PathBuf::from(path)));
    }
    for name in CHROME_NAMES {
        if let Some(path) = find_on_path(name) {
            paths.push((name.to_string(), path));
        }
    }
    for fixed in CHROME_FIXED_PATHS {
        paths.push((fixed.to_string(), PathBuf::from(fixed)));
    }

    let mut seen = HashSet::new();
    let mut candidates: Vec<BackendCandidate> = paths
        .into_iter()
        .filter(|(_, path)| path.is_file() && seen.insert(path.clone()))
        .map(|(label, path)| BackendCandidate {
            label,
            path: Some(path),
        })
        .collect();
    candidates.push(BackendCandidate {
        label: "auto-detect".to_string(),
        path: None,
    });
    candidates
}

fn find_on_path(name: &str) -> Option<PathBuf> {
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}

/// Try each candidate in order; the first one that launches wins.
pub fn launch_first<T, F>(candidates: &[BackendCandidate], mut launch: F) -> Result<(T, String)>
where
    F: FnMut(&BackendCandidate) -> anyhow::Result<T>,
{
    let mut failures = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        match launch(candidate) {
            Ok(value) => return Ok((value, candidate.label.clone())),
            Err(e) => {
                debug!("Browser backend {} failed: {:#}", candidate.label, e);
                failures.push(format!("{}: {:#}", candidate.label, e));
            }
        }
    }
    Err(ScoutError::BrowserUnavailable(failures))
}

fn launch_chrome(options: &BrowserOptions, candidate: &BackendCandidate) -> anyhow::Result<Browser> {
    let args: Vec<&OsStr> = [
        "--disable-dev-shm-usage",
        "--disable-gpu",
        "--disable-extensions",
        "--disable-blink-features=AutomationControlled",
        "--blink-settings=imagesEnabled=false",
    ]
    .iter()
    .map(OsStr::new)
    .collect();

    let launch = LaunchOptions::default_builder()
        .headless(options.headless)
        .sandbox(false)
        .window_size(Some((1600, 1200)))
        .path(candidate.path.clone())
        .args(args)
        .idle_browser_timeout(Duration::from_secs(120))
        .build()
        .map_err(|e| anyhow::anyhow!("invalid launch options: {}", e))?;

    Browser::new(launch).context("Failed to launch Chrome browser")
}

/// A browser process and its single working tab. Dropping the session
/// closes the tab and shuts the browser down.
pub struct BrowserSession {
    tab: Arc<Tab>,
    // Held for its Drop, which terminates the browser process
    _browser: Browser,
    backend: String,
}

impl BrowserSession {
    pub fn open(options: &BrowserOptions) -> Result<Self> {
        info!("Launching headless Chrome...");
        let candidates = backend_candidates(options.chrome_path.as_deref());
        let (browser, backend) = launch_first(&candidates, |c| launch_chrome(options, c))?;

        let tab = browser.new_tab().map_err(ScoutError::browser)?;
        tab.set_default_timeout(options.page_wait);
        tab.set_user_agent(USER_AGENT, Some("fr-FR,fr;q=0.9,en;q=0.8"), None)
            .map_err(ScoutError::browser)?;

        info!("Browser ready ({})", backend);
        Ok(Self {
            tab,
            _browser: browser,
            backend,
        })
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        debug!("Closing browser session ({})", self.backend);
        if let Err(e) = self.tab.close(false) {
            debug!("Tab close failed: {}", e);
        }
    }
}

/// Browser-driven listing source for the marketplace category pages
pub struct ListingBrowser {
    session: BrowserSession,
    options: BrowserOptions,
    /// Pagination scheme that last rendered, per category
    learned: HashMap<Category, PageScheme>,
}

impl ListingBrowser {
    /// Launch a browser session. Fails only when no backend can be started.
    pub fn new(options: BrowserOptions) -> Result<Self> {
        let session = BrowserSession::open(&options)?;
        Ok(Self {
            session,
            options,
            learned: HashMap::new(),
        })
    }

    fn tab(&self) -> &Arc<Tab> {
        &self.session.tab
    }

    fn try_open(&self, url: &str) -> anyhow::Result<()> {
        let tab = self.tab();
        tab.navigate_to(url)?;
        tab.wait_until_navigated()?;
        tab.wait_for_element_with_custom_timeout(LISTING_READY, self.options.page_wait)
            .context("listing grid did not render")?;
        Ok(())
    }

    /// Probe pagination schemes until one renders the listing grid.
    fn open_listing(&mut self, category: Category, page: u32) -> Option<PageScheme> {
        let preferred = self.learned.get(&category).copied();
        for scheme in PageScheme::probe_order(page, preferred) {
            let url = scheme.url(category, page);
            debug!("Opening {}", url);
            match self.try_open(&url) {
                Ok(()) => {
                    if scheme != PageScheme::Bare {
                        self.learned.insert(category, scheme);
                    }
                    return Some(scheme);
                }
                Err(e) => debug!("{:?} scheme failed for {}: {:#}", scheme, url, e),
            }
        }
        None
    }

    /// Cheap round-trip telling a slow page apart from a dead browser
    fn health_check(&self) -> anyhow::Result<()> {
        self.tab().evaluate("1", false)?;
        Ok(())
    }

    fn evaluate_json<T: serde::de::DeserializeOwned>(&self, script: &str) -> anyhow::Result<T> {
        let result = self.tab().evaluate(script, false)?;
        let json = result
            .value
            .as_ref()
            .and_then(|v| v.as_str())
            .context("script returned no JSON string")?;
        Ok(serde_json::from_str(json)?)
    }

    fn cookies(&self) -> Vec<BrowserCookie> {
        match self.tab().get_cookies() {
            Ok(cookies) => cookies
                .into_iter()
                .map(|c| BrowserCookie {
                    name: c.name,
                    value: c.value,
                    domain: Some(c.domain).filter(|d| !d.is_empty()),
                })
                .collect(),
            Err(e) => {
                warn!("Could not read browser cookies: {}", e);
                Vec::new()
            }
        }
    }

    fn dump_page(&self, category: Category, page: u32) -> anyhow::Result<()> {
        let Some(dir) = &self.options.debug_dir else {
            return Ok(());
        };
        std::fs::create_dir_all(dir)?;
        let stem = format!("{}_p{}", category.file_stem(), page);

        let html = self.tab().get_content()?;
        std::fs::write(dir.join(format!("{}.html", stem)), &html)?;

        let screenshot = self.tab().capture_screenshot(
            Page::CaptureScreenshotFormatOption::Png,
            None,
            None,
            true,
        )?;
        std::fs::write(dir.join(format!("{}.png", stem)), screenshot)?;
        debug!("Saved {} page dump to {}", stem, dir.display());
        Ok(())
    }
}

impl PageSource for ListingBrowser {
    fn fetch_page(
        &mut self,
        category: Category,
        page: u32,
        mode: HarvestMode,
    ) -> Result<PageHarvest> {
        let Some(scheme) = self.open_listing(category, page) else {
            return skip_or_abort(category, page, self.health_check());
        };
        debug!("Page {} of {} opened with {:?} scheme", page, category, scheme);

        if let Err(e) = self.dump_page(category, page) {
            warn!("Page dump failed: {:#}", e);
        }

        let harvest = match mode {
            HarvestMode::ListOnly => {
                let cards: Vec<CardData> = self.evaluate_json(CARD_SCRIPT).unwrap_or_else(|e| {
                    warn!("Card extraction failed on page {}: {:#}", page, e);
                    Vec::new()
                });
                info!("Found {} listing cards on page {}", cards.len(), page);
                PageHarvest::Rows(cards_to_listings(category, page, cards))
            }
            HarvestMode::Detail => {
                let hrefs: Vec<String> = self.evaluate_json(LINK_SCRIPT).unwrap_or_else(|e| {
                    warn!("Link extraction failed on page {}: {:#}", page, e);
                    Vec::new()
                });
                let links = detail_links(hrefs);
                info!("Found {} detail links on page {}", links.len(), page);
                PageHarvest::Links {
                    links,
                    cookies: self.cookies(),
                }
            }
        };
        Ok(harvest)
    }

    fn source_name(&self) -> &'static str {
        Source::CoinAfrique.as_str()
    }
}

/// A page no scheme could render is skipped while the browser still answers;
/// once it stops answering the run is over.
fn skip_or_abort(category: Category, page: u32, health: anyhow::Result<()>) -> Result<PageHarvest> {
    match health {
        Ok(()) => {
            warn!("Page {} of {} did not render under any scheme, skipping", page, category);
            Ok(PageHarvest::Skipped)
        }
        Err(e) => Err(ScoutError::browser(format!(
            "browser stopped responding on page {} of {}: {:#}",
            page, category, e
        ))),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Turn extracted cards into listings, blanking empty fields and
/// blocklisted images.
pub fn cards_to_listings(category: Category, page: u32, cards: Vec<CardData>) -> Vec<Listing> {
    cards
        .into_iter()
        .map(|card| Listing {
            source: Source::CoinAfrique,
            category,
            title: non_empty(card.name),
            price_raw: non_empty(card.price),
            address_raw: non_empty(card.addr),
            image_url: clean_image_url(card.img.as_deref()),
            link: normalize_url(card.link.as_deref()),
            page,
        })
        .collect()
}

/// Keep only listing-detail permalinks, first occurrence wins.
pub fn detail_links(hrefs: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    hrefs
        .into_iter()
        .filter(|href| href.contains(DETAIL_LINK_MARKER))
        .filter(|href| seen.insert(href.clone()))
        .collect()
}

/// Remove driver caches under `home`, returning the directories removed.
pub fn purge_caches_under(home: &Path) -> Vec<PathBuf> {
    DRIVER_CACHE_DIRS
        .iter()
        .map(|rel| home.join(rel))
        .filter(|dir| dir.exists())
        .filter(|dir| match std::fs::remove_dir_all(dir) {
            Ok(()) => true,
            Err(e) => {
                warn!("Could not remove {}: {}", dir.display(), e);
                false
            }
        })
        .collect()
}

/// Explicit setup step clearing stale driver caches in the user's home.
pub fn purge_driver_caches() -> Vec<PathBuf> {
    match dirs::home_dir() {
        Some(home) => purge_caches_under(&home),
        None => {
            warn!("No home directory, nothing to purge");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card(link: &str) -> CardData {
        CardData {
            name: Some("  Bélier Touabire ".into()),
            price: Some("125 000 FCFA".into()),
            addr: Some("Thiès".into()),
            link: Some(link.into()),
            img: Some("//images.coinafrique.com/b.jpg".into()),
        }
    }

    #[test]
    fn cards_become_listings() {
        let rows = cards_to_listings(
            Category::Moutons,
            2,
            vec![
                card("https://sn.coinafrique.com/annonce/moutons/belier-1"),
                CardData {
                    name: Some(String::new()),
                    img: Some("/static/images/countries/sn.png".into()),
                    ..CardData::default()
                },
            ],
        );
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].title.as_deref(), Some("Bélier Touabire"));
        assert_eq!(rows[0].image_url.as_deref(), Some("https://images.coinafrique.com/b.jpg"));
        assert_eq!(rows[0].page, 2);
        assert_eq!(rows[0].source, Source::CoinAfrique);
        assert!(rows[1].is_blank());
        assert_eq!(rows[1].link, None);
    }

    #[test]
    fn card_json_tolerates_nulls() {
        let cards: Vec<CardData> = serde_json::from_str(
            r#"[{"name":"Chiot","price":"","addr":"","link":null,"img":null}]"#,
        )
        .unwrap();
        let rows = cards_to_listings(Category::Chiens, 1, cards);
        assert_eq!(rows[0].title.as_deref(), Some("Chiot"));
        assert_eq!(rows[0].price_raw, None);
    }

    #[test]
    fn unrendered_page_skips_only_while_browser_answers() {
        assert_eq!(
            skip_or_abort(Category::Chiens, 3, Ok(())).unwrap(),
            PageHarvest::Skipped
        );
        let err = skip_or_abort(
            Category::Chiens,
            4,
            Err(anyhow::anyhow!("The connection is closed")),
        )
        .unwrap_err();
        match err {
            ScoutError::Browser(message) => {
                assert!(message.contains("page 4 of Chiens"));
                assert!(message.contains("connection is closed"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn detail_links_filter_and_dedupe_in_order() {
        let links = detail_links(vec![
            "https://sn.coinafrique.com/annonce/chiens/b".into(),
            "https://sn.coinafrique.com/categorie/chiens".into(),
            "https://sn.coinafrique.com/annonce/chiens/a".into(),
            "https://sn.coinafrique.com/annonce/chiens/b".into(),
        ]);
        assert_eq!(
            links,
            vec![
                "https://sn.coinafrique.com/annonce/chiens/b".to_string(),
                "https://sn.coinafrique.com/annonce/chiens/a".to_string(),
            ]
        );
    }

    #[test]
    fn first_working_backend_wins() {
        let candidates = vec![
            BackendCandidate { label: "one".into(), path: None },
            BackendCandidate { label: "two".into(), path: None },
            BackendCandidate { label: "three".into(), path: None },
        ];
        let mut tried = Vec::new();
        let (value, label) = launch_first(&candidates, |c| {
            tried.push(c.label.clone());
            if c.label == "two" {
                Ok(2)
            } else {
                anyhow::bail!("not installed")
            }
        })
        .unwrap();
        assert_eq!((value, label.as_str()), (2, "two"));
        assert_eq!(tried, vec!["one", "two"]);
    }

    #[test]
    fn exhausted_backends_report_every_failure() {
        let candidates = vec![
            BackendCandidate { label: "chromium".into(), path: None },
            BackendCandidate { label: "auto-detect".into(), path: None },
        ];
        let err = launch_first::<(), _>(&candidates, |_| anyhow::bail!("missing")).unwrap_err();
        match err {
            ScoutError::BrowserUnavailable(failures) => {
                assert_eq!(failures.len(), 2);
                assert!(failures[0].starts_with("chromium"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn candidates_end_with_auto_detection() {
        let candidates = backend_candidates(Some(Path::new("/definitely/not/chrome")));
        let last = candidates.last().unwrap();
        assert_eq!(last.path, None);
        assert!(candidates
            .iter()
            .all(|c| c.path.as_deref() != Some(Path::new("/definitely/not/chrome"))));
    }

    #[test]
    fn purge_removes_only_known_cache_dirs() {
        let home = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(home.path().join(".wdm/drivers")).unwrap();
        std::fs::create_dir_all(home.path().join(".cache/selenium")).unwrap();
        std::fs::create_dir_all(home.path().join(".cache/other")).unwrap();

        let removed = purge_caches_under(home.path());
        assert_eq!(removed.len(), 2);
        assert!(!home.path().join(".wdm").exists());
        assert!(!home.path().join(".cache/selenium").exists());
        assert!(home.path().join(".cache/other").exists());
    }
}
