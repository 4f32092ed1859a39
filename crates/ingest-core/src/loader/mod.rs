mod http;
mod retry;

pub use http::HttpFetcher;
pub use retry::{retry, RetryBudget};

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// Failure of a single GET attempt.
#[derive(Debug, Clone, Error)]
pub enum LoadError {
    #[error("HTTP error {status} fetching {url}: {message}")]
    Http {
        url: String,
        status: u16,
        message: String,
    },
    #[error("Network error fetching {url}: {reason}")]
    Network { url: String, reason: String },
    #[error("Timeout fetching {url}")]
    Timeout { url: String },
}

impl LoadError {
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Definitive outcome of a retried fetch.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("Gave up on {url} after {attempts} attempts: {last}")]
    RetriesExhausted {
        url: String,
        attempts: u32,
        #[source]
        last: LoadError,
    },
    #[error("Fetch of {url} cancelled")]
    Cancelled { url: String },
}

impl FetchError {
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::RetriesExhausted { last, .. } => last.status_code(),
            Self::Cancelled { .. } => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

/// Retrying GET for manifests and media segments.
///
/// Implementations own their retry budget and cancellation; callers only see
/// the final body or a definitive [`FetchError`].
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Bytes, FetchError>;

    /// Fetch a newline-delimited manifest.
    async fn fetch_text(&self, url: &str) -> Result<String, FetchError> {
        let body = self.fetch(url).await?;
        Ok(String::from_utf8_lossy(&body).into_owned())
    }
}
