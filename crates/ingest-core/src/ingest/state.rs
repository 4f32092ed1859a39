use serde::{Deserialize, Serialize};

use super::error::IngestError;
use crate::segment::LocalSegmentName;
use crate::store::AcquiredSegment;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopPhase {
    Idle,
    Polling,
    Sleeping,
    Stopped,
}

impl LoopPhase {
    pub fn can_transition_to(self, target: LoopPhase) -> bool {
        matches!(
            (self, target),
            (LoopPhase::Idle, LoopPhase::Polling)
                | (LoopPhase::Polling, LoopPhase::Sleeping)
                | (LoopPhase::Sleeping, LoopPhase::Polling)
                | (LoopPhase::Idle, LoopPhase::Stopped)
                | (LoopPhase::Polling, LoopPhase::Stopped)
                | (LoopPhase::Sleeping, LoopPhase::Stopped)
        )
    }
}

impl std::fmt::Display for LoopPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Polling => write!(f, "polling"),
            Self::Sleeping => write!(f, "sleeping"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// What a single poll cycle achieved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The playlist still names the chunklist processed last time.
    Unchanged,
    /// Playlist or chunklist could not be obtained; nothing changes this cycle.
    Failed,
    /// A new chunklist was processed. `segments` holds only the newly written ones.
    Acquired {
        chunklist: String,
        segments: Vec<AcquiredSegment>,
    },
}

#[derive(Debug, Clone)]
pub struct CycleReport {
    pub outcome: CycleOutcome,
    pub errors: Vec<IngestError>,
}

impl CycleReport {
    pub fn unchanged() -> Self {
        Self {
            outcome: CycleOutcome::Unchanged,
            errors: Vec::new(),
        }
    }

    pub fn failed(errors: Vec<IngestError>) -> Self {
        Self {
            outcome: CycleOutcome::Failed,
            errors,
        }
    }

    pub fn acquired_count(&self) -> usize {
        match &self.outcome {
            CycleOutcome::Acquired { segments, .. } => segments.len(),
            _ => 0,
        }
    }
}

/// Per-ingester record of what has been fetched and consumed.
///
/// Lives for the process lifetime and is never persisted; after a restart the
/// on-disk file names alone decide what gets downloaded again.
#[derive(Debug, Clone, Default)]
pub struct IngestionState {
    pub latest_chunklist: Option<String>,
    pub acquired: Vec<AcquiredSegment>,
    pub cursor: usize,
}

impl IngestionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a cycle outcome in. Returns how many segments were appended.
    pub fn apply(&mut self, outcome: &CycleOutcome) -> usize {
        match outcome {
            CycleOutcome::Acquired {
                chunklist,
                segments,
            } => {
                self.latest_chunklist = Some(chunklist.clone());
                self.acquired.extend(segments.iter().cloned());
                segments.len()
            }
            CycleOutcome::Unchanged | CycleOutcome::Failed => 0,
        }
    }

    /// Next acquired segment in arrival order, each returned exactly once.
    pub fn next_segment(&mut self) -> Option<LocalSegmentName> {
        let next = self.acquired.get(self.cursor)?.local_name.clone();
        self.cursor += 1;
        Some(next)
    }

    /// Acquired segments not yet handed out by [`next_segment`](Self::next_segment).
    pub fn pending(&self) -> usize {
        self.acquired.len() - self.cursor
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::segment::resolve;

    fn acquired(segment: &str) -> AcquiredSegment {
        let date = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        AcquiredSegment::new(segment, resolve(segment, date).unwrap())
    }

    #[test]
    fn valid_phase_transitions() {
        assert!(LoopPhase::Idle.can_transition_to(LoopPhase::Polling));
        assert!(LoopPhase::Polling.can_transition_to(LoopPhase::Sleeping));
        assert!(LoopPhase::Sleeping.can_transition_to(LoopPhase::Polling));
        assert!(LoopPhase::Sleeping.can_transition_to(LoopPhase::Stopped));
        assert!(LoopPhase::Polling.can_transition_to(LoopPhase::Stopped));
    }

    #[test]
    fn invalid_phase_transitions() {
        assert!(!LoopPhase::Idle.can_transition_to(LoopPhase::Sleeping));
        assert!(!LoopPhase::Stopped.can_transition_to(LoopPhase::Polling));
        assert!(!LoopPhase::Polling.can_transition_to(LoopPhase::Idle));
        assert!(!LoopPhase::Sleeping.can_transition_to(LoopPhase::Sleeping));
    }

    #[test]
    fn next_segment_on_empty_state() {
        let mut state = IngestionState::new();
        assert_eq!(state.next_segment(), None);
        assert_eq!(state.next_segment(), None);
        assert_eq!(state.cursor, 0);
    }

    #[test]
    fn next_segment_yields_each_once_in_order() {
        let mut state = IngestionState::new();
        state.apply(&CycleOutcome::Acquired {
            chunklist: "chunk1.m3u8".into(),
            segments: vec![acquired("media_w1_1.ts"), acquired("media_w1_2.ts")],
        });

        assert_eq!(state.next_segment().unwrap().as_str(), "media_2024-3-5_1.ts");
        assert_eq!(state.next_segment().unwrap().as_str(), "media_2024-3-5_2.ts");
        assert_eq!(state.next_segment(), None);

        state.apply(&CycleOutcome::Acquired {
            chunklist: "chunk2.m3u8".into(),
            segments: vec![acquired("media_w1_3.ts")],
        });
        assert_eq!(state.pending(), 1);
        assert_eq!(state.next_segment().unwrap().as_str(), "media_2024-3-5_3.ts");
        assert_eq!(state.next_segment(), None);
    }

    #[test]
    fn apply_tracks_latest_chunklist_only_on_acquire() {
        let mut state = IngestionState::new();
        assert_eq!(state.apply(&CycleOutcome::Failed), 0);
        assert_eq!(state.latest_chunklist, None);

        let appended = state.apply(&CycleOutcome::Acquired {
            chunklist: "chunk17.m3u8".into(),
            segments: vec![],
        });
        assert_eq!(appended, 0);
        assert_eq!(state.latest_chunklist.as_deref(), Some("chunk17.m3u8"));

        state.apply(&CycleOutcome::Unchanged);
        assert_eq!(state.latest_chunklist.as_deref(), Some("chunk17.m3u8"));
    }
}
