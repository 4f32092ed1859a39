use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{retry, FetchError, Fetcher, LoadError, RetryBudget};
use crate::config::IngestConfig;
use crate::observer::{IngestObserver, NoopObserver};

/// HTTP fetcher with connection pooling and fixed-interval retries.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
    budget: RetryBudget,
    cancel: CancellationToken,
    observer: Arc<dyn IngestObserver>,
}

impl HttpFetcher {
    pub fn new(timeout: Duration, budget: RetryBudget) -> reqwest::Result<Self> {
        let client = Self::build_client(timeout)?;
        Ok(Self::with_client(client, budget))
    }

    pub fn with_client(client: Client, budget: RetryBudget) -> Self {
        Self {
            client,
            budget,
            cancel: CancellationToken::new(),
            observer: Arc::new(NoopObserver),
        }
    }

    pub fn from_config(config: &IngestConfig) -> reqwest::Result<Self> {
        Self::new(config.request_timeout, config.retry_budget())
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn IngestObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn budget(&self) -> &RetryBudget {
        &self.budget
    }

    pub fn build_client(timeout: Duration) -> reqwest::Result<Client> {
        Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(5))
            .pool_max_idle_per_host(4)
            .gzip(true)
            .build()
    }

    async fn attempt(&self, url: &str) -> Result<Bytes, LoadError> {
        let response = self.client.get(url).send().await.map_err(|e| classify(url, e))?;

        let status = response.status();
        if !status.is_success() {
            warn!(url, status = status.as_u16(), "Fetch returned error status");
            return Err(LoadError::Http {
                url: url.to_string(),
                status: status.as_u16(),
                message: status.canonical_reason().unwrap_or("Unknown").to_string(),
            });
        }

        let body = response.bytes().await.map_err(|e| classify(url, e))?;
        debug!(url, bytes = body.len(), "Fetched");
        Ok(body)
    }
}

fn classify(url: &str, e: reqwest::Error) -> LoadError {
    if e.is_timeout() {
        warn!(url, "Fetch timed out");
        LoadError::Timeout {
            url: url.to_string(),
        }
    } else {
        warn!(url, error = %e, "Fetch network error");
        LoadError::Network {
            url: url.to_string(),
            reason: e.to_string(),
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Bytes, FetchError> {
        retry(url, &self.budget, &self.cancel, self.observer.as_ref(), move || {
            self.attempt(url)
        })
        .await
    }
}
