//! Output directory holding completed segment files.
//!
//! The presence of a file under its [`LocalSegmentName`] is the only dedup
//! signal; there is no index. Bodies are written to a `.part` sibling and
//! renamed into place once complete, so a partially written segment never
//! satisfies the existence check or shows up in [`SegmentStore::list_segments`].

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::ingest::event::IngestEvent;
use crate::loader::{FetchError, Fetcher};
use crate::observer::IngestObserver;
use crate::segment::LocalSegmentName;

const PARTIAL_SUFFIX: &str = "part";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to create segment directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to write segment {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to read segment directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to remove {path}: {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// A remote segment paired with the local name it is stored under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcquiredSegment {
    pub segment: String,
    pub local_name: LocalSegmentName,
}

impl AcquiredSegment {
    pub fn new(segment: impl Into<String>, local_name: LocalSegmentName) -> Self {
        Self {
            segment: segment.into(),
            local_name,
        }
    }
}

/// Why a single segment was left out of a store pass.
#[derive(Debug, Error)]
pub enum SegmentFailure {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result of one pass over a chunklist's segments.
#[derive(Debug, Default)]
pub struct StorePass {
    /// Newly written segments, in input order.
    pub acquired: Vec<AcquiredSegment>,
    /// Segments already on disk; no request was made for these.
    pub skipped: usize,
    pub failures: Vec<(AcquiredSegment, SegmentFailure)>,
}

pub struct SegmentStore {
    dir: PathBuf,
    fetcher: Arc<dyn Fetcher>,
    observer: Arc<dyn IngestObserver>,
}

impl SegmentStore {
    pub fn new(
        dir: impl Into<PathBuf>,
        fetcher: Arc<dyn Fetcher>,
        observer: Arc<dyn IngestObserver>,
    ) -> Self {
        Self {
            dir: dir.into(),
            fetcher,
            observer,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_of(&self, name: &LocalSegmentName) -> PathBuf {
        self.dir.join(name.as_str())
    }

    /// Create the output directory (and parents) if missing. Idempotent.
    /// Fails when the path exists but is not a directory.
    pub async fn ensure_dir(&self) -> Result<(), StoreError> {
        match tokio::fs::metadata(&self.dir).await {
            Ok(meta) if meta.is_dir() => return Ok(()),
            Ok(_) => {
                return Err(StoreError::CreateDir {
                    path: self.dir.clone(),
                    source: io::Error::new(io::ErrorKind::AlreadyExists, "path is not a directory"),
                })
            }
            Err(_) => {}
        }
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| StoreError::CreateDir {
                path: self.dir.clone(),
                source,
            })?;
        self.observer.notify(&IngestEvent::DirectoryCreated {
            path: self.dir.clone(),
        });
        Ok(())
    }

    pub async fn contains(&self, name: &LocalSegmentName) -> bool {
        tokio::fs::metadata(self.path_of(name))
            .await
            .map(|m| m.is_file())
            .unwrap_or(false)
    }

    /// Download every segment whose local name is absent.
    ///
    /// `url_of` maps a remote segment id to its URL. Segments are handled
    /// strictly one after another so arrival order is preserved. A failed
    /// segment is reported and skipped; it never aborts the pass.
    pub async fn acquire_missing<F>(&self, segments: &[AcquiredSegment], url_of: F) -> StorePass
    where
        F: Fn(&str) -> String,
    {
        let mut pass = StorePass::default();

        for item in segments {
            if self.contains(&item.local_name).await {
                debug!(segment = %item.segment, local_name = %item.local_name, "Segment already stored");
                self.observer.notify(&IngestEvent::SegmentAlreadyPresent {
                    segment: item.segment.clone(),
                    local_name: item.local_name.to_string(),
                });
                pass.skipped += 1;
                continue;
            }

            self.observer.notify(&IngestEvent::SegmentDownloading {
                segment: item.segment.clone(),
            });

            match self.download(item, &url_of(&item.segment)).await {
                Ok(bytes) => {
                    self.observer.notify(&IngestEvent::SegmentDownloaded {
                        segment: item.segment.clone(),
                        local_name: item.local_name.to_string(),
                        bytes,
                    });
                    pass.acquired.push(item.clone());
                }
                Err(e) => {
                    warn!(segment = %item.segment, error = %e, "Skipping segment");
                    self.observer.notify(&IngestEvent::SegmentFailed {
                        segment: item.segment.clone(),
                        reason: e.to_string(),
                    });
                    pass.failures.push((item.clone(), e));
                }
            }
        }

        pass
    }

    async fn download(&self, item: &AcquiredSegment, url: &str) -> Result<usize, SegmentFailure> {
        let body = self.fetcher.fetch(url).await?;
        self.write_atomic(&item.local_name, &body).await?;
        Ok(body.len())
    }

    async fn write_atomic(&self, name: &LocalSegmentName, body: &[u8]) -> Result<(), StoreError> {
        let path = self.path_of(name);
        let partial = partial_path(&path);

        if let Err(source) = tokio::fs::write(&partial, body).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(StoreError::WriteFailed { path, source });
        }
        if let Err(source) = tokio::fs::rename(&partial, &path).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(StoreError::WriteFailed { path, source });
        }
        Ok(())
    }

    /// Completed segment files ordered by acquisition date, then numeric id.
    ///
    /// This is the read side handed to downstream consumers: partial writes
    /// and files not named like segments are ignored.
    pub async fn list_segments(&self) -> Result<Vec<PathBuf>, StoreError> {
        let mut keyed = Vec::new();
        for (path, meta) in self.read_dir().await? {
            if !meta.is_file() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if let Some(key) = LocalSegmentName::parse_key(name) {
                keyed.push((key, path));
            }
        }
        keyed.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(keyed.into_iter().map(|(_, path)| path).collect())
    }

    /// Total size in bytes of regular files in the directory.
    pub async fn directory_size(&self) -> Result<u64, StoreError> {
        Ok(self
            .read_dir()
            .await?
            .iter()
            .filter(|(_, meta)| meta.is_file())
            .map(|(_, meta)| meta.len())
            .sum())
    }

    /// Remove every regular file in the directory. A missing directory is a no-op.
    pub async fn clear(&self) -> Result<usize, StoreError> {
        if !tokio::fs::try_exists(&self.dir).await.unwrap_or(false) {
            return Ok(0);
        }

        let mut removed = 0;
        for (path, meta) in self.read_dir().await? {
            if !meta.is_file() {
                continue;
            }
            tokio::fs::remove_file(&path)
                .await
                .map_err(|source| StoreError::Remove {
                    path: path.clone(),
                    source,
                })?;
            removed += 1;
        }

        self.observer.notify(&IngestEvent::DirectoryCleared {
            path: self.dir.clone(),
            removed,
        });
        Ok(removed)
    }

    async fn read_dir(&self) -> Result<Vec<(PathBuf, std::fs::Metadata)>, StoreError> {
        let read_err = |source: io::Error| StoreError::ReadDir {
            path: self.dir.clone(),
            source,
        };
        let mut entries = tokio::fs::read_dir(&self.dir).await.map_err(read_err)?;
        let mut out = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(read_err)? {
            let meta = entry.metadata().await.map_err(read_err)?;
            out.push((entry.path(), meta));
        }
        Ok(out)
    }
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".");
    name.push(PARTIAL_SUFFIX);
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use bytes::Bytes;
    use chrono::NaiveDate;

    use super::*;
    use crate::loader::LoadError;
    use crate::observer::testing::RecordingObserver;
    use crate::observer::NoopObserver;
    use crate::segment::resolve;

    #[derive(Default)]
    struct MapFetcher {
        bodies: HashMap<String, Vec<u8>>,
        calls: Mutex<Vec<String>>,
    }

    impl MapFetcher {
        fn with(mut self, url: &str, body: &[u8]) -> Self {
            self.bodies.insert(url.to_string(), body.to_vec());
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Fetcher for MapFetcher {
        async fn fetch(&self, url: &str) -> Result<Bytes, FetchError> {
            self.calls.lock().unwrap().push(url.to_string());
            match self.bodies.get(url) {
                Some(body) => Ok(Bytes::from(body.clone())),
                None => Err(FetchError::RetriesExhausted {
                    url: url.to_string(),
                    attempts: 1,
                    last: LoadError::Http {
                        url: url.to_string(),
                        status: 404,
                        message: "Not Found".into(),
                    },
                }),
            }
        }
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 5).unwrap()
    }

    fn item(segment: &str) -> AcquiredSegment {
        AcquiredSegment::new(segment, resolve(segment, date()).unwrap())
    }

    fn url(segment: &str) -> String {
        format!("http://cam/{}", segment)
    }

    #[tokio::test]
    async fn ensure_dir_creates_nested_and_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("a/b/buffer");
        let observer = Arc::new(RecordingObserver::default());
        let store = SegmentStore::new(&dir, Arc::new(MapFetcher::default()), observer.clone());

        store.ensure_dir().await.unwrap();
        store.ensure_dir().await.unwrap();
        assert!(dir.is_dir());

        let created = observer
            .events()
            .into_iter()
            .filter(|e| matches!(e, IngestEvent::DirectoryCreated { .. }))
            .count();
        assert_eq!(created, 1);
    }

    #[tokio::test]
    async fn downloads_missing_in_order_and_skips_present() {
        let tmp = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(
            MapFetcher::default()
                .with(&url("media_w1_1001.ts"), b"one")
                .with(&url("media_w1_1002.ts"), b"two"),
        );
        let store = SegmentStore::new(tmp.path(), fetcher.clone(), Arc::new(NoopObserver));
        let items = vec![item("media_w1_1001.ts"), item("media_w1_1002.ts")];

        let first = store.acquire_missing(&items, url).await;
        assert_eq!(first.acquired, items);
        assert_eq!(
            std::fs::read(tmp.path().join("media_2024-3-5_1001.ts")).unwrap(),
            b"one"
        );
        assert_eq!(fetcher.calls().len(), 2);

        let second = store.acquire_missing(&items, url).await;
        assert!(second.acquired.is_empty());
        assert_eq!(second.skipped, 2);
        assert_eq!(fetcher.calls().len(), 2);
    }

    #[tokio::test]
    async fn failed_download_is_skipped_and_siblings_continue() {
        let tmp = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(
            MapFetcher::default().with(&url("media_w1_3.ts"), b"three"),
        );
        let observer = Arc::new(RecordingObserver::default());
        let store = SegmentStore::new(tmp.path(), fetcher, observer.clone());
        let items = vec![item("media_w1_2.ts"), item("media_w1_3.ts")];

        let pass = store.acquire_missing(&items, url).await;
        assert_eq!(pass.acquired, vec![item("media_w1_3.ts")]);
        assert_eq!(pass.failures.len(), 1);
        assert!(matches!(pass.failures[0].1, SegmentFailure::Fetch(_)));
        assert!(!store.contains(&item("media_w1_2.ts").local_name).await);
        assert!(observer
            .events()
            .iter()
            .any(|e| matches!(e, IngestEvent::SegmentFailed { segment, .. } if segment == "media_w1_2.ts")));
    }

    #[tokio::test]
    async fn write_failure_is_reported_per_segment() {
        let tmp = tempfile::tempdir().unwrap();
        let missing_dir = tmp.path().join("never-created");
        let fetcher = Arc::new(MapFetcher::default().with(&url("media_w1_9.ts"), b"nine"));
        let store = SegmentStore::new(&missing_dir, fetcher, Arc::new(NoopObserver));

        let pass = store.acquire_missing(&[item("media_w1_9.ts")], url).await;
        assert!(pass.acquired.is_empty());
        assert!(matches!(
            pass.failures[0].1,
            SegmentFailure::Store(StoreError::WriteFailed { .. })
        ));
    }

    #[tokio::test]
    async fn ensure_dir_rejects_regular_file() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("buffer");
        std::fs::write(&file, b"not a dir").unwrap();
        let store = SegmentStore::new(&file, Arc::new(MapFetcher::default()), Arc::new(NoopObserver));

        let err = store.ensure_dir().await.unwrap_err();
        assert!(matches!(err, StoreError::CreateDir { ref path, .. } if *path == file));
        assert!(err.to_string().contains("not a directory"));
    }

    #[tokio::test]
    async fn partial_file_does_not_count_as_present() {
        let tmp = tempfile::tempdir().unwrap();
        let name = item("media_w1_5.ts").local_name;
        std::fs::write(tmp.path().join(format!("{}.part", name)), b"half").unwrap();

        let fetcher = Arc::new(MapFetcher::default().with(&url("media_w1_5.ts"), b"whole"));
        let store = SegmentStore::new(tmp.path(), fetcher, Arc::new(NoopObserver));
        assert!(!store.contains(&name).await);

        let pass = store.acquire_missing(&[item("media_w1_5.ts")], url).await;
        assert_eq!(pass.acquired.len(), 1);
        assert_eq!(std::fs::read(store.path_of(&name)).unwrap(), b"whole");
        assert!(!tmp.path().join(format!("{}.part", name)).exists());
    }

    #[tokio::test]
    async fn list_segments_orders_by_date_then_id() {
        let tmp = tempfile::tempdir().unwrap();
        for name in [
            "media_2024-3-10_5.ts",
            "media_2024-3-9_700.ts",
            "media_2024-3-9_80.ts",
            "media_2024-3-9_81.ts.part",
            "notes.txt",
        ] {
            std::fs::write(tmp.path().join(name), b"x").unwrap();
        }
        std::fs::create_dir(tmp.path().join("media_2024-3-9_1.ts")).unwrap();

        let store = SegmentStore::new(tmp.path(), Arc::new(MapFetcher::default()), Arc::new(NoopObserver));
        let names: Vec<String> = store
            .list_segments()
            .await
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec!["media_2024-3-9_80.ts", "media_2024-3-9_700.ts", "media_2024-3-10_5.ts"]
        );
    }

    #[tokio::test]
    async fn clear_removes_all_files_and_reports_size() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("media_2024-3-5_1.ts"), vec![0u8; 100]).unwrap();
        std::fs::write(tmp.path().join("media_2024-3-5_2.ts.part"), vec![0u8; 20]).unwrap();
        let observer = Arc::new(RecordingObserver::default());
        let store = SegmentStore::new(tmp.path(), Arc::new(MapFetcher::default()), observer.clone());

        assert_eq!(store.directory_size().await.unwrap(), 120);
        assert_eq!(store.clear().await.unwrap(), 2);
        assert_eq!(store.directory_size().await.unwrap(), 0);
        assert!(tmp.path().is_dir());
        assert!(observer
            .events()
            .contains(&IngestEvent::DirectoryCleared { path: tmp.path().to_path_buf(), removed: 2 }));
    }

    #[tokio::test]
    async fn clear_missing_directory_is_noop() {
        let tmp = tempfile::tempdir().unwrap();
        let store = SegmentStore::new(
            tmp.path().join("absent"),
            Arc::new(MapFetcher::default()),
            Arc::new(NoopObserver),
        );
        assert_eq!(store.clear().await.unwrap(), 0);
    }

    #[test]
    fn partial_path_appends_suffix() {
        assert_eq!(
            partial_path(Path::new("buffer/media_2024-3-5_1.ts")),
            PathBuf::from("buffer/media_2024-3-5_1.ts.part")
        );
    }
}
