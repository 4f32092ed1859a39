use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::change::{detect, Change};
use super::error::{ErrorRing, ErrorType, IngestError};
use super::event::IngestEvent;
use super::state::{CycleOutcome, CycleReport, IngestionState, LoopPhase};
use crate::config::{CameraSource, IngestConfig};
use crate::loader::{Fetcher, HttpFetcher};
use crate::manifest::{parse_chunklist, parse_playlist};
use crate::observer::{observer_for, IngestObserver};
use crate::segment::{resolve, Clock, LocalSegmentName, SystemClock};
use crate::store::{AcquiredSegment, SegmentFailure, SegmentStore, StoreError};

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Ingester for {camera_id} was stopped and cannot be restarted")]
    AlreadyStopped { camera_id: String },
}

/// One poll cycle's collaborators. Holds no mutable state of its own.
#[derive(Clone)]
struct Cycle {
    source: CameraSource,
    fetcher: Arc<dyn Fetcher>,
    store: Arc<SegmentStore>,
    observer: Arc<dyn IngestObserver>,
    clock: Arc<dyn Clock>,
}

impl Cycle {
    /// Playlist -> change gate -> chunklist -> identities -> store pass.
    async fn run(&self, latest_chunklist: Option<&str>) -> CycleReport {
        let mut errors = Vec::new();

        let playlist_url = self.source.playlist_url();
        let playlist = match self.fetcher.fetch_text(&playlist_url).await {
            Ok(body) => body,
            Err(e) => {
                if !e.is_cancelled() {
                    warn!(url = %playlist_url, error = %e, "Playlist unavailable this cycle");
                    errors.push(IngestError::from_fetch(ErrorType::PlaylistFetch, &playlist_url, &e));
                }
                return CycleReport::failed(errors);
            }
        };

        let chunklist = match parse_playlist(&playlist) {
            Ok(name) => name,
            Err(e) => {
                warn!(url = %playlist_url, error = %e, "Playlist has no chunklist");
                errors.push(IngestError::new(ErrorType::PlaylistParse, &playlist_url, e.to_string()));
                return CycleReport::failed(errors);
            }
        };

        if detect(&chunklist, latest_chunklist) == Change::Unchanged {
            debug!(chunklist = %chunklist, "Playlist unchanged");
            self.observer.notify(&IngestEvent::PlaylistUnchanged { chunklist });
            return CycleReport::unchanged();
        }

        let chunklist_url = self.source.resolve(&chunklist);
        let body = match self.fetcher.fetch_text(&chunklist_url).await {
            Ok(body) => body,
            Err(e) => {
                if !e.is_cancelled() {
                    warn!(url = %chunklist_url, error = %e, "Chunklist unavailable this cycle");
                    errors.push(IngestError::from_fetch(ErrorType::ChunklistFetch, &chunklist_url, &e));
                }
                return CycleReport::failed(errors);
            }
        };

        let segments = parse_chunklist(&body);
        self.observer.notify(&IngestEvent::ChunklistLoaded {
            chunklist: chunklist.clone(),
            segments: segments.clone(),
        });

        if let Err(e) = self.store.ensure_dir().await {
            warn!(error = %e, "Segment directory unavailable");
            errors.push(IngestError::new(
                ErrorType::Directory,
                self.store.dir().display().to_string(),
                e.to_string(),
            ));
            return CycleReport::failed(errors);
        }

        let today = self.clock.today();
        let mut resolved = Vec::with_capacity(segments.len());
        for segment in segments {
            match resolve(&segment, today) {
                Ok(local_name) => resolved.push(AcquiredSegment::new(segment, local_name)),
                Err(e) => {
                    warn!(segment = %segment, "Skipping malformed segment id");
                    self.observer.notify(&IngestEvent::SegmentIdMalformed {
                        segment: segment.clone(),
                    });
                    errors.push(IngestError::new(ErrorType::SegmentId, segment, e.to_string()));
                }
            }
        }

        let pass = self
            .store
            .acquire_missing(&resolved, |segment| self.source.resolve(segment))
            .await;

        for (item, failure) in &pass.failures {
            let error = match failure {
                SegmentFailure::Fetch(e) if e.is_cancelled() => continue,
                SegmentFailure::Fetch(e) => {
                    IngestError::from_fetch(ErrorType::SegmentDownload, &item.segment, e)
                }
                SegmentFailure::Store(e @ StoreError::WriteFailed { .. }) => {
                    IngestError::new(ErrorType::SegmentWrite, &item.segment, e.to_string())
                }
                SegmentFailure::Store(e) => {
                    IngestError::new(ErrorType::Directory, &item.segment, e.to_string())
                }
            };
            errors.push(error);
        }

        match self.store.directory_size().await {
            Ok(bytes) => self.observer.notify(&IngestEvent::DirectorySize {
                path: self.store.dir().to_path_buf(),
                bytes,
            }),
            Err(e) => debug!(error = %e, "Could not size segment directory"),
        }

        info!(
            chunklist = %chunklist,
            acquired = pass.acquired.len(),
            skipped = pass.skipped,
            failed = pass.failures.len(),
            "Processed chunklist"
        );

        CycleReport {
            outcome: CycleOutcome::Acquired {
                chunklist,
                segments: pass.acquired,
            },
            errors,
        }
    }
}

/// Fold a cycle into shared state. The state lock is held only for the
/// append, never across network I/O; `exclusive` keeps cycles from
/// overlapping so no segment is fetched or appended twice.
async fn poll_and_apply(
    cycle: &Cycle,
    exclusive: &Mutex<()>,
    state: &Mutex<IngestionState>,
    errors: &Mutex<ErrorRing>,
) -> CycleReport {
    let _running = exclusive.lock().await;
    let latest = state.lock().await.latest_chunklist.clone();
    let report = cycle.run(latest.as_deref()).await;

    state.lock().await.apply(&report.outcome);
    if !report.errors.is_empty() {
        let mut ring = errors.lock().await;
        for e in &report.errors {
            ring.push(e.clone());
        }
    }
    report
}

async fn set_phase(phase: &RwLock<LoopPhase>, target: LoopPhase) {
    let mut current = phase.write().await;
    if current.can_transition_to(target) {
        *current = target;
    }
}

/// Ingests one camera's live stream into a local directory.
///
/// The producer side is a spawned polling loop ([`start`](Self::start)); the
/// consumer side is [`next_segment`](Self::next_segment), safe to call from
/// another task while the loop runs.
pub struct Ingester {
    config: IngestConfig,
    cycle: Cycle,
    exclusive: Arc<Mutex<()>>,
    state: Arc<Mutex<IngestionState>>,
    errors: Arc<Mutex<ErrorRing>>,
    phase: Arc<RwLock<LoopPhase>>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Ingester {
    pub fn new(
        config: IngestConfig,
        fetcher: Arc<dyn Fetcher>,
        observer: Arc<dyn IngestObserver>,
        cancel: CancellationToken,
    ) -> Self {
        let source = CameraSource::from_config(&config);
        let store = Arc::new(SegmentStore::new(
            config.output_dir.clone(),
            Arc::clone(&fetcher),
            Arc::clone(&observer),
        ));
        let errors = ErrorRing::new(config.error_limit);
        Self {
            cycle: Cycle {
                source,
                fetcher,
                store,
                observer,
                clock: Arc::new(SystemClock),
            },
            config,
            exclusive: Arc::new(Mutex::new(())),
            state: Arc::new(Mutex::new(IngestionState::new())),
            errors: Arc::new(Mutex::new(errors)),
            phase: Arc::new(RwLock::new(LoopPhase::Idle)),
            cancel,
            task: Mutex::new(None),
        }
    }

    /// HTTP-backed ingester whose fetches stop when `cancel` fires.
    pub fn from_config(config: IngestConfig, cancel: CancellationToken) -> reqwest::Result<Self> {
        let observer = observer_for(config.verbose, &config.camera_id);
        let fetcher = HttpFetcher::from_config(&config)?
            .with_cancellation(cancel.clone())
            .with_observer(Arc::clone(&observer));
        Ok(Self::new(config, Arc::new(fetcher), observer, cancel))
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.cycle.clock = clock;
        self
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    pub fn source(&self) -> &CameraSource {
        &self.cycle.source
    }

    pub fn store(&self) -> &SegmentStore {
        &self.cycle.store
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub async fn phase(&self) -> LoopPhase {
        *self.phase.read().await
    }

    /// Spawn the polling loop. Calling it while running is a no-op.
    pub async fn start(&self) -> Result<(), LifecycleError> {
        {
            let mut phase = self.phase.write().await;
            match *phase {
                LoopPhase::Idle => *phase = LoopPhase::Polling,
                LoopPhase::Stopped => {
                    return Err(LifecycleError::AlreadyStopped {
                        camera_id: self.config.camera_id.clone(),
                    })
                }
                LoopPhase::Polling | LoopPhase::Sleeping => return Ok(()),
            }
        }

        info!(camera_id = %self.config.camera_id, base_url = %self.cycle.source.base_url(), "Starting ingester");

        let cycle = self.cycle.clone();
        let exclusive = Arc::clone(&self.exclusive);
        let state = Arc::clone(&self.state);
        let errors = Arc::clone(&self.errors);
        let phase = Arc::clone(&self.phase);
        let cancel = self.cancel.clone();
        let poll_interval = self.config.poll_interval;

        let handle = tokio::spawn(async move {
            loop {
                if cancel.is_cancelled() {
                    break;
                }
                set_phase(&phase, LoopPhase::Polling).await;
                let report = poll_and_apply(&cycle, &exclusive, &state, &errors).await;
                debug!(
                    acquired = report.acquired_count(),
                    errors = report.errors.len(),
                    "Poll cycle finished"
                );

                set_phase(&phase, LoopPhase::Sleeping).await;
                tokio::select! {
                    _ = tokio::time::sleep(poll_interval) => {}
                    _ = cancel.cancelled() => break,
                }
            }
            set_phase(&phase, LoopPhase::Stopped).await;
            info!("Ingester stopped");
        });

        *self.task.lock().await = Some(handle);
        Ok(())
    }

    /// Cancel the loop and any in-flight retries, then wait for it to finish.
    pub async fn stop(&self) {
        info!(camera_id = %self.config.camera_id, "Stopping ingester");
        self.cancel.cancel();
        if let Some(handle) = self.task.lock().await.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "Ingester task ended abnormally");
            }
        }
        set_phase(&self.phase, LoopPhase::Stopped).await;
    }

    /// Run exactly one poll cycle inline. Waits for any cycle already in flight.
    pub async fn poll_once(&self) -> CycleReport {
        poll_and_apply(&self.cycle, &self.exclusive, &self.state, &self.errors).await
    }

    /// Next acquired segment name in arrival order, or `None` when caught up.
    pub async fn next_segment(&self) -> Option<LocalSegmentName> {
        self.state.lock().await.next_segment()
    }

    pub async fn acquired_segments(&self) -> Vec<AcquiredSegment> {
        self.state.lock().await.acquired.clone()
    }

    pub async fn latest_chunklist(&self) -> Option<String> {
        self.state.lock().await.latest_chunklist.clone()
    }

    /// Recent recovered errors, newest first.
    pub async fn errors(&self) -> Vec<IngestError> {
        self.errors.lock().await.list()
    }

    pub async fn clear_errors(&self) {
        self.errors.lock().await.clear();
    }

    /// Completed segment files on disk, oldest first.
    pub async fn list_segments(&self) -> Result<Vec<PathBuf>, StoreError> {
        self.cycle.store.list_segments().await
    }

    /// Delete every file in the output directory. In-memory state is kept.
    pub async fn clear_segments(&self) -> Result<usize, StoreError> {
        self.cycle.store.clear().await
    }
}
