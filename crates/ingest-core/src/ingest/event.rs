use std::fmt;
use std::path::PathBuf;

/// Notable things that happen during ingestion, delivered to an
/// [`IngestObserver`](crate::observer::IngestObserver).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestEvent {
    FetchAttemptFailed {
        url: String,
        attempt: u32,
        max_retries: Option<u32>,
        reason: String,
    },
    PlaylistUnchanged {
        chunklist: String,
    },
    ChunklistLoaded {
        chunklist: String,
        segments: Vec<String>,
    },
    SegmentDownloading {
        segment: String,
    },
    SegmentDownloaded {
        segment: String,
        local_name: String,
        bytes: usize,
    },
    SegmentAlreadyPresent {
        segment: String,
        local_name: String,
    },
    SegmentFailed {
        segment: String,
        reason: String,
    },
    SegmentIdMalformed {
        segment: String,
    },
    DirectoryCreated {
        path: PathBuf,
    },
    DirectoryCleared {
        path: PathBuf,
        removed: usize,
    },
    DirectorySize {
        path: PathBuf,
        bytes: u64,
    },
}

impl IngestEvent {
    /// Whether the event reports something going wrong.
    pub fn is_warning(&self) -> bool {
        matches!(
            self,
            Self::FetchAttemptFailed { .. } | Self::SegmentFailed { .. } | Self::SegmentIdMalformed { .. }
        )
    }
}

impl fmt::Display for IngestEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FetchAttemptFailed { url, attempt, max_retries: Some(max), reason } => write!(
                f,
                "Failed to fetch {url} ({reason}), attempt {attempt}/{}",
                u64::from(*max) + 1
            ),
            Self::FetchAttemptFailed { url, attempt, max_retries: None, reason } => {
                write!(f, "Failed to fetch {url} ({reason}), currently at {attempt} attempts")
            }
            Self::PlaylistUnchanged { chunklist } => {
                write!(f, "Playlist has not advanced past {chunklist}; no new chunklist")
            }
            Self::ChunklistLoaded { chunklist, segments } if segments.is_empty() => {
                write!(f, "Loaded {chunklist}, but it does not list any media")
            }
            Self::ChunklistLoaded { chunklist, segments } => {
                write!(f, "Loaded {chunklist}, containing {}", segments.join(", "))
            }
            Self::SegmentDownloading { segment } => write!(f, "Downloading media segment {segment}"),
            Self::SegmentDownloaded { segment, local_name, bytes } => {
                write!(f, "Got media segment {segment} as {local_name} ({bytes} bytes)")
            }
            Self::SegmentAlreadyPresent { segment, local_name } => {
                write!(f, "Segment {segment} already stored as {local_name}, skipping")
            }
            Self::SegmentFailed { segment, reason } => {
                write!(f, "Failed to get media segment {segment}: {reason}")
            }
            Self::SegmentIdMalformed { segment } => {
                write!(f, "Segment {segment} has no numeric id, skipping")
            }
            Self::DirectoryCreated { path } => {
                write!(f, "Created segment directory {}", path.display())
            }
            Self::DirectoryCleared { path, removed } => {
                write!(f, "Cleared {removed} files from {}", path.display())
            }
            Self::DirectorySize { path, bytes } => write!(
                f,
                "Segment directory {} is now {bytes} bytes ({:.2} megabytes)",
                path.display(),
                *bytes as f64 / 1_000_000.0
            ),
        }
    }
}
