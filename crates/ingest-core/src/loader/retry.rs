use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{FetchError, LoadError};
use crate::ingest::event::IngestEvent;
use crate::observer::IngestObserver;

/// How persistently a single fetch is retried. Not shared between fetches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryBudget {
    max_retries: Option<u32>,
    interval: Duration,
}

impl RetryBudget {
    pub fn new(max_retries: Option<u32>, interval: Duration) -> Self {
        Self {
            max_retries,
            interval,
        }
    }

    pub fn unbounded(interval: Duration) -> Self {
        Self::new(None, interval)
    }

    pub fn max_retries(&self) -> Option<u32> {
        self.max_retries
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_unbounded(&self) -> bool {
        self.max_retries.is_none()
    }

    /// Whether `failures` consecutive failures use up the budget.
    fn exhausted_by(&self, failures: u32) -> bool {
        self.max_retries.is_some_and(|max| failures > max)
    }
}

/// Run `attempt` until it succeeds, the budget is spent, or `cancel` fires.
///
/// Every failure is reported to `observer` before the fixed interval sleep.
/// The sleep races the cancellation token, so an unbounded budget never
/// outlives a stop request.
pub async fn retry<T, F, Fut>(
    url: &str,
    budget: &RetryBudget,
    cancel: &CancellationToken,
    observer: &dyn IngestObserver,
    mut attempt: F,
) -> Result<T, FetchError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LoadError>>,
{
    let mut failures: u32 = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled {
                url: url.to_string(),
            });
        }

        let err = match attempt().await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        failures = failures.saturating_add(1);
        observer.notify(&IngestEvent::FetchAttemptFailed {
            url: url.to_string(),
            attempt: failures,
            max_retries: budget.max_retries,
            reason: err.to_string(),
        });

        if budget.exhausted_by(failures) {
            return Err(FetchError::RetriesExhausted {
                url: url.to_string(),
                attempts: failures,
                last: err,
            });
        }

        debug!(url, attempt = failures, interval_ms = budget.interval.as_millis(), "Retrying fetch");
        tokio::select! {
            _ = tokio::time::sleep(budget.interval) => {}
            _ = cancel.cancelled() => {
                return Err(FetchError::Cancelled { url: url.to_string() });
            }
        }
    }
}
