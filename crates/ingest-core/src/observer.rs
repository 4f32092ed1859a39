//! Pluggable notification sink for ingestion progress.
//!
//! The ingestion core never writes to the console. Everything a verbose run
//! would report goes through an [`IngestObserver`]; the quiet mode is simply
//! [`NoopObserver`]. Observers must not influence control flow.

use std::sync::Arc;

use tracing::{info, warn};

use crate::ingest::event::IngestEvent;

pub trait IngestObserver: Send + Sync {
    fn notify(&self, event: &IngestEvent);
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl IngestObserver for NoopObserver {
    fn notify(&self, _event: &IngestEvent) {}
}

/// Renders events through `tracing`, warnings at WARN and the rest at INFO.
#[derive(Debug, Clone)]
pub struct LogObserver {
    camera_id: String,
}

impl LogObserver {
    pub fn new(camera_id: impl Into<String>) -> Self {
        Self {
            camera_id: camera_id.into(),
        }
    }
}

impl IngestObserver for LogObserver {
    fn notify(&self, event: &IngestEvent) {
        if event.is_warning() {
            warn!(camera_id = %self.camera_id, "{}", event);
        } else {
            info!(camera_id = %self.camera_id, "{}", event);
        }
    }
}

/// Observer matching the verbose/quiet switch.
pub fn observer_for(verbose: bool, camera_id: &str) -> Arc<dyn IngestObserver> {
    if verbose {
        Arc::new(LogObserver::new(camera_id))
    } else {
        Arc::new(NoopObserver)
    }
}
