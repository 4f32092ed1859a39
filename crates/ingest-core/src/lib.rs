#![forbid(unsafe_code)]

pub mod config;
pub mod ingest;
pub mod loader;
pub mod manifest;
pub mod observer;
pub mod segment;
pub mod store;

pub use config::{CameraSource, IngestConfig};
pub use ingest::{
    detect, Change, CycleOutcome, CycleReport, ErrorRing, ErrorType, IngestError, IngestEvent,
    Ingester, IngestionState, LifecycleError, LoopPhase,
};
pub use loader::{FetchError, Fetcher, HttpFetcher, LoadError, RetryBudget};
pub use manifest::{parse_chunklist, parse_playlist, ParseError};
pub use observer::{observer_for, IngestObserver, LogObserver, NoopObserver};
pub use segment::{resolve, Clock, FixedClock, LocalSegmentName, SystemClock};
pub use store::{AcquiredSegment, SegmentStore, StoreError};
