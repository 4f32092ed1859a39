//! TOML configuration file schema and parsing.
//!
//! Example config file:
//!
//! ```toml
//! [logging]
//! format = "json"
//!
//! [ingest]
//! camera_id = "NCAM070"
//! output_dir = "buffer"
//! retries = -1            # retry forever
//! retry_interval_secs = 10
//! poll_interval_secs = 7
//! verbose = true
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use ingest_core::config::DEFAULT_HOST;
use ingest_core::IngestConfig;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub ingest: IngestSection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: default_log_format(),
        }
    }
}

fn default_log_format() -> String {
    "pretty".into()
}

#[derive(Debug, Clone, Deserialize)]
pub struct IngestSection {
    #[serde(default)]
    pub camera_id: Option<String>,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default)]
    pub base_url: Option<String>,

    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Retries per fetch; negative means unbounded.
    #[serde(default = "default_retries")]
    pub retries: i64,

    #[serde(default = "default_retry_interval_secs")]
    pub retry_interval_secs: u64,

    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default)]
    pub verbose: bool,
}

impl Default for IngestSection {
    fn default() -> Self {
        Self {
            camera_id: None,
            host: default_host(),
            base_url: None,
            output_dir: default_output_dir(),
            retries: default_retries(),
            retry_interval_secs: default_retry_interval_secs(),
            poll_interval_secs: default_poll_interval_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            verbose: false,
        }
    }
}

fn default_host() -> String {
    DEFAULT_HOST.into()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("buffer")
}

fn default_retries() -> i64 {
    3
}

fn default_retry_interval_secs() -> u64 {
    10
}

fn default_poll_interval_secs() -> u64 {
    7
}

fn default_request_timeout_secs() -> u64 {
    10
}

/// `-1` (or any negative count) means retry until stopped.
pub fn retries_from_count(count: i64) -> Option<u32> {
    if count < 0 {
        None
    } else {
        Some(u32::try_from(count).unwrap_or(u32::MAX))
    }
}

impl IngestSection {
    pub fn to_ingest_config(&self, camera_id: &str) -> IngestConfig {
        let mut c = IngestConfig::new(camera_id)
            .with_host(&self.host)
            .with_output_dir(&self.output_dir)
            .with_max_retries(retries_from_count(self.retries))
            .with_retry_interval(Duration::from_secs(self.retry_interval_secs))
            .with_poll_interval(Duration::from_secs(self.poll_interval_secs))
            .with_request_timeout(Duration::from_secs(self.request_timeout_secs))
            .with_verbose(self.verbose);
        if let Some(ref url) = self.base_url {
            c = c.with_base_url(url);
        }
        c
    }
}

/// Checks shared by the config file and command-line overrides.
pub fn validate_source(host: &str, base_url: Option<&str>) -> Result<(), String> {
    if let Some(base) = base_url {
        let parsed =
            url::Url::parse(base).map_err(|e| format!("Invalid base URL: {} ({})", base, e))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(format!("Base URL must use http or https: {}", base));
        }
    }

    if host.trim().is_empty() {
        return Err("Host must not be empty".into());
    }
    Ok(())
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {}", path.display(), e))?;

        let config: AppConfig = toml::from_str(&content)
            .map_err(|e| format!("Failed to parse config file {}: {}", path.display(), e))?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), String> {
        if let Some(ref id) = self.ingest.camera_id {
            if id.trim().is_empty() {
                return Err("Camera ID must not be empty".into());
            }
            if id.contains('/') {
                return Err(format!("Camera ID must not contain '/': {}", id));
            }
        }

        validate_source(&self.ingest.host, self.ingest.base_url.as_deref())?;

        if self.ingest.poll_interval_secs == 0 {
            return Err("poll_interval_secs must be at least 1".into());
        }

        match self.logging.format.as_str() {
            "pretty" | "json" => {}
            other => {
                return Err(format!(
                    "Invalid logging format '{}': must be 'pretty' or 'json'",
                    other
                ));
            }
        }

        Ok(())
    }
}
