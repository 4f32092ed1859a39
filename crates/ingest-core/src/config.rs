use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::loader::RetryBudget;

pub const DEFAULT_HOST: &str = "video.deldot.gov";

/// Configuration for a single camera ingester.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Camera identifier, e.g. `NCAM070`.
    pub camera_id: String,
    /// Host serving `/live/<camera_id>.stream`.
    pub host: String,
    /// Full stream base URL. Overrides `host` when set.
    pub base_url: Option<String>,
    /// Directory completed segments are written to.
    pub output_dir: PathBuf,
    /// Retries after the first failed attempt. `None` retries until cancelled.
    pub max_retries: Option<u32>,
    /// Fixed wait between attempts of a single fetch.
    pub retry_interval: Duration,
    /// Time between polls, roughly the stream's segment cadence.
    pub poll_interval: Duration,
    /// HTTP request timeout for a single attempt.
    pub request_timeout: Duration,
    /// Emit informational and warning notifications.
    pub verbose: bool,
    /// Maximum number of errors to retain (ring buffer capacity).
    pub error_limit: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            camera_id: String::new(),
            host: DEFAULT_HOST.to_string(),
            base_url: None,
            output_dir: PathBuf::from("buffer"),
            max_retries: Some(3),
            retry_interval: Duration::from_secs(10),
            poll_interval: Duration::from_secs(7),
            request_timeout: Duration::from_secs(10),
            verbose: false,
            error_limit: 100,
        }
    }
}

impl IngestConfig {
    pub fn new(camera_id: impl Into<String>) -> Self {
        Self {
            camera_id: camera_id.into(),
            ..Self::default()
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn with_max_retries(mut self, max_retries: Option<u32>) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_error_limit(mut self, limit: usize) -> Self {
        self.error_limit = limit.max(1);
        self
    }

    pub fn retry_budget(&self) -> RetryBudget {
        RetryBudget::new(self.max_retries, self.retry_interval)
    }
}

/// Identity of one camera stream. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraSource {
    camera_id: String,
    base_url: String,
}

impl CameraSource {
    pub fn new(camera_id: impl Into<String>, host: &str) -> Self {
        let camera_id = camera_id.into();
        let base_url = format!("https://{}/live/{}.stream", host, camera_id);
        Self { camera_id, base_url }
    }

    pub fn with_base_url(camera_id: impl Into<String>, base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            camera_id: camera_id.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &IngestConfig) -> Self {
        match config.base_url {
            Some(ref url) => Self::with_base_url(&config.camera_id, url),
            None => Self::new(&config.camera_id, &config.host),
        }
    }

    pub fn camera_id(&self) -> &str {
        &self.camera_id
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn playlist_url(&self) -> String {
        self.resolve("playlist.m3u8")
    }

    /// URL of a chunklist or segment named relative to the stream.
    pub fn resolve(&self, name: &str) -> String {
        if name.starts_with("http://") || name.starts_with("https://") {
            return name.to_string();
        }
        format!("{}/{}", self.base_url, name)
    }
}
