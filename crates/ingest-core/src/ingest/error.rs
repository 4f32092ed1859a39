use std::collections::VecDeque;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::loader::FetchError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    PlaylistFetch,
    PlaylistParse,
    ChunklistFetch,
    SegmentId,
    SegmentDownload,
    SegmentWrite,
    Directory,
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PlaylistFetch => write!(f, "Playlist Fetch"),
            Self::PlaylistParse => write!(f, "Playlist Parse"),
            Self::ChunklistFetch => write!(f, "Chunklist Fetch"),
            Self::SegmentId => write!(f, "Segment Id"),
            Self::SegmentDownload => write!(f, "Segment Download"),
            Self::SegmentWrite => write!(f, "Segment Write"),
            Self::Directory => write!(f, "Directory"),
        }
    }
}

/// A recovered failure from one poll cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestError {
    pub timestamp: DateTime<Utc>,
    pub error_type: ErrorType,
    /// URL or segment the error is about.
    pub subject: String,
    pub details: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
}

impl IngestError {
    pub fn new(error_type: ErrorType, subject: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            error_type,
            subject: subject.into(),
            details: details.into(),
            status_code: None,
        }
    }

    pub fn from_fetch(error_type: ErrorType, subject: impl Into<String>, err: &FetchError) -> Self {
        let error = Self::new(error_type, subject, err.to_string());
        match err.status_code() {
            Some(code) => error.with_status_code(code),
            None => error,
        }
    }

    pub fn with_status_code(mut self, code: u16) -> Self {
        self.status_code = Some(code);
        self
    }
}

/// Fixed-capacity circular buffer for recent errors. O(1) insert, evicts oldest when full.
#[derive(Debug, Clone)]
pub struct ErrorRing {
    buffer: VecDeque<IngestError>,
    capacity: usize,
}

impl ErrorRing {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            buffer: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, error: IngestError) {
        if self.buffer.len() >= self.capacity {
            self.buffer.pop_front();
        }
        self.buffer.push_back(error);
    }

    /// Newest first.
    pub fn list(&self) -> Vec<IngestError> {
        self.buffer.iter().rev().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}
