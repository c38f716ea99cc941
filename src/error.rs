//! Error taxonomy for the scrape-and-persist pipeline.

use thiserror::Error;

/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, ScoutError>;

#[derive(Error, Debug)]
pub enum ScoutError {
    /// Every browser backend candidate failed to launch. Aborts a category run.
    #[error("no usable browser backend ({})", .0.join("; "))]
    BrowserUnavailable(Vec<String>),

    /// Browser session failed after launch
    #[error("browser error: {0}")]
    Browser(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-2xx response after retries were exhausted
    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("unknown category '{0}'")]
    UnknownCategory(String),
}

impl ScoutError {
    pub fn browser(message: impl std::fmt::Display) -> Self {
        Self::Browser(message.to_string())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}
