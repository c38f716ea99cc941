//! Runtime settings, read from an optional `scout.toml`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{Result, ScoutError};
use crate::scrapers::browser::BrowserOptions;
use crate::scrapers::fetcher::DEFAULT_WORKERS;

pub const DEFAULT_CONFIG_FILE: &str = "scout.toml";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ScoutConfig {
    pub db_path: PathBuf,
    pub data_dir: PathBuf,
    pub workers: usize,
    pub detail_timeout_secs: u64,
    pub page_wait_secs: u64,
    /// Randomised pause between listing pages, `[min, max]` milliseconds
    pub pause_ms: (u64, u64),
    pub headless: bool,
    pub chrome_path: Option<PathBuf>,
    /// Remove stale driver caches before launching a browser
    pub purge_driver_caches: bool,
    /// Save each rendered listing page's HTML and a screenshot here
    pub debug_dir: Option<PathBuf>,
}

impl Default for ScoutConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("data/coinafrique.db"),
            data_dir: PathBuf::from("data"),
            workers: DEFAULT_WORKERS,
            detail_timeout_secs: 12,
            page_wait_secs: 8,
            pause_ms: (120, 350),
            headless: true,
            chrome_path: None,
            purge_driver_caches: false,
            debug_dir: None,
        }
    }
}

impl ScoutConfig {
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path`, falling back to defaults when it is absent or invalid.
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            debug!("No config at {}, using defaults", path.display());
            return Self::default();
        }
        std::fs::read_to_string(path)
            .map_err(ScoutError::from)
            .and_then(|text| Self::from_toml(&text))
            .unwrap_or_else(|e| {
                warn!("Failed to load config from {}: {}", path.display(), e);
                warn!("Using default configuration.");
                Self::default()
            })
    }

    fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(ScoutError::config("workers must be at least 1"));
        }
        if self.pause_ms.0 > self.pause_ms.1 {
            return Err(ScoutError::config(format!(
                "pause_ms range is inverted: {:?}",
                self.pause_ms
            )));
        }
        Ok(())
    }

    pub fn detail_timeout(&self) -> Duration {
        Duration::from_secs(self.detail_timeout_secs)
    }

    pub fn browser_options(&self) -> BrowserOptions {
        BrowserOptions {
            headless: self.headless,
            chrome_path: self.chrome_path.clone(),
            page_wait: Duration::from_secs(self.page_wait_secs),
            debug_dir: self.debug_dir.clone(),
        }
    }
}
