pub mod change;
pub mod engine;
pub mod error;
pub mod event;
pub mod state;

pub use change::{detect, Change};
pub use engine::{Ingester, LifecycleError};
pub use error::{ErrorRing, ErrorType, IngestError};
pub use event::IngestEvent;
pub use state::{CycleOutcome, CycleReport, IngestionState, LoopPhase};
