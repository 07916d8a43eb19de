//! Remote file access used to resolve per-commit configuration.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    /// The file does not exist at that commit. Repositories opt in by adding
    /// one, so this is an expected outcome.
    #[error("not found: {0}")]
    NotFound(String),

    #[error("unexpected status {status} fetching {url}")]
    Status { url: String, status: u16 },

    #[error("config host unavailable: {0}")]
    Unavailable(String),
}

impl FetchError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, FetchError::NotFound(_))
    }
}

#[async_trait]
pub trait ConfigFetcher: Send + Sync {
    /// Fetch the file at `url` as UTF-8 text.
    async fn fetch(&self, url: &str) -> Result<String, FetchError>;
}
