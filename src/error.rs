use std::time::Duration;

use thiserror::Error;

pub type Result<T> = core::result::Result<T, Error>;

/// Failures while walking the listing. Any of these aborts the whole walk.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Unexpected HTTP status {status} from {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Parse error: {0}")]
    Parse(String),
}

impl ScrapeError {
    /// Network level failure or a non-success status.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::HttpStatus { .. })
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("Scrape failed: {0}")]
    Scrape(#[from] ScrapeError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] sqlx::Error),
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Update run exceeded {0:?}")]
    Timeout(Duration),
}
