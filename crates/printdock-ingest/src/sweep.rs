// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Periodic sweeps over the watched tree.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use futures_util::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;

use printdock_core::error::{PrintDockError, Result};
use printdock_core::types::FileId;
use printdock_store::FileFilter;

use crate::pipeline::{IngestOutcome, IngestPipeline};

/// Paths classified concurrently during a full sweep.
const SWEEP_CONCURRENCY: usize = 4;

/// Result of one full sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepSummary {
    pub scanned: usize,
    pub registered: usize,
    pub discarded: usize,
    pub failed: usize,
    /// Records dropped because their canonical file is gone.
    pub orphaned: usize,
}

/// Result of one retention sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetentionSummary {
    pub deleted_files: usize,
    pub deleted_records: usize,
}

impl IngestPipeline {
    /// Walk the whole tree through the pipeline, then drop unprinted records
    /// whose canonical file has disappeared.
    #[instrument(skip(self), fields(root = %self.root().display()))]
    pub async fn full_sweep(&self) -> Result<SweepSummary> {
        let paths = list_files(self.root().to_path_buf()).await?;
        let mut summary = SweepSummary {
            scanned: paths.len(),
            ..SweepSummary::default()
        };

        let outcomes: Vec<_> = stream::iter(paths)
            .map(|path| async move { (self.process_path(&path).await, path) })
            .buffer_unordered(SWEEP_CONCURRENCY)
            .collect()
            .await;
        for (outcome, path) in outcomes {
            match outcome {
                Ok(IngestOutcome::Registered(_)) => summary.registered += 1,
                Ok(IngestOutcome::Discarded) => summary.discarded += 1,
                Ok(IngestOutcome::Failed(_)) => summary.failed += 1,
                Ok(_) => {}
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "sweep could not process path");
                    summary.failed += 1;
                }
            }
        }

        let unprinted = FileFilter {
            printed: Some(false),
            ..FileFilter::default()
        };
        for record in self.files().list_files(unprinted).await? {
            if self.is_in_flight(&record.path) {
                continue;
            }
            if tokio::fs::try_exists(&record.path).await.unwrap_or(true) {
                continue;
            }
            if self.files().soft_delete_file(record.id).await? {
                info!(file_id = %record.id, path = %record.path.display(), "canonical file missing, record dropped");
                summary.orphaned += 1;
            }
        }

        debug!(?summary, "full sweep finished");
        Ok(summary)
    }

    /// Delete every file older than the retention period.
    pub async fn retention_sweep(&self) -> Result<RetentionSummary> {
        self.retention_sweep_at(SystemTime::now()).await
    }

    /// [`Self::retention_sweep`] evaluated as if the time were `now`.
    #[instrument(skip(self), fields(root = %self.root().display()))]
    pub async fn retention_sweep_at(&self, now: SystemTime) -> Result<RetentionSummary> {
        let max_age = self.config().retention_age();
        let mut summary = RetentionSummary::default();

        for path in list_files(self.root().to_path_buf()).await? {
            let modified = match tokio::fs::metadata(&path).await.and_then(|m| m.modified()) {
                Ok(t) => t,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "mtime unavailable, skipping");
                    continue;
                }
            };
            let expired = now
                .duration_since(modified)
                .is_ok_and(|age| age > max_age);
            if !expired {
                continue;
            }

            match tokio::fs::remove_file(&path).await {
                Ok(()) => summary.deleted_files += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "expired file not removed");
                    continue;
                }
            }

            if let Some(id) = tracked_stem(&path) {
                if self.files().soft_delete_file(id).await? {
                    summary.deleted_records += 1;
                }
            }
        }

        if summary.deleted_files > 0 {
            info!(
                files = summary.deleted_files,
                records = summary.deleted_records,
                "retention sweep removed expired files"
            );
        }
        Ok(summary)
    }
}

fn tracked_stem(path: &Path) -> Option<FileId> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .and_then(FileId::parse)
}

/// Every regular file below `root`.  A missing root yields nothing.
async fn list_files(root: PathBuf) -> Result<Vec<PathBuf>> {
    tokio::task::spawn_blocking(move || {
        WalkDir::new(&root)
            .min_depth(1)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .collect()
    })
    .await
    .map_err(|e| PrintDockError::Watch(format!("directory walk failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::tests::{drop_pdf, watch_config};
    use printdock_core::types::{FileRecord, PrinterId};
    use printdock_store::{FileRepository, SqliteStore};
    use std::sync::Arc;
    use std::time::Duration;

    const DAY: Duration = Duration::from_secs(24 * 60 * 60);

    fn pipeline(root: &Path) -> (Arc<SqliteStore>, IngestPipeline) {
        let store = Arc::new(SqliteStore::open_in_memory().expect("store"));
        let pipeline = IngestPipeline::new(store.clone(), watch_config(root));
        (store, pipeline)
    }

    #[tokio::test]
    async fn full_sweep_registers_and_is_idempotent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (store, pipeline) = pipeline(dir.path());
        drop_pdf(&dir.path().join("a"), "one.pdf", 1);
        drop_pdf(&dir.path().join("b"), "two.pdf", 2);
        std::fs::write(dir.path().join("a").join("junk.docx"), b"x").expect("write");
        drop_pdf(dir.path(), "stray.pdf", 1);

        let first = pipeline.full_sweep().await.expect("sweep");
        assert_eq!(first.scanned, 4);
        assert_eq!(first.registered, 2);
        assert_eq!(first.discarded, 1);

        let second = pipeline.full_sweep().await.expect("sweep again");
        assert_eq!(second.registered, 0);
        assert_eq!(second.orphaned, 0);
        assert_eq!(
            store.list_files(FileFilter::default()).await.expect("list").len(),
            2
        );
        assert!(dir.path().join("stray.pdf").exists());
    }

    #[tokio::test]
    async fn full_sweep_drops_orphaned_records() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (store, pipeline) = pipeline(dir.path());
        let tenant = dir.path().join("t");
        std::fs::create_dir_all(&tenant).expect("mkdir");

        let gone = FileRecord::new(FileId::new(), "gone.pdf".into(), 1, tenant.join("gone.pdf"));
        let printed = FileRecord::new(FileId::new(), "done.pdf".into(), 1, tenant.join("done.pdf"));
        store.insert_file(&gone).await.expect("insert");
        store.insert_file(&printed).await.expect("insert");
        store
            .mark_printed(printed.id, &PrinterId::from("p1"))
            .await
            .expect("mark");

        let summary = pipeline.full_sweep().await.expect("sweep");
        assert_eq!(summary.orphaned, 1);
        assert!(store.get_file(gone.id).await.expect("get").is_none());
        assert!(store.get_file(printed.id).await.expect("get").is_some());
    }

    /// File store whose inserts take a while to return.
    struct SlowInsertStore {
        inner: Arc<SqliteStore>,
        delay: Duration,
    }

    #[async_trait::async_trait]
    impl FileRepository for SlowInsertStore {
        async fn insert_file(&self, record: &FileRecord) -> Result<()> {
            self.inner.insert_file(record).await?;
            tokio::time::sleep(self.delay).await;
            Ok(())
        }
        async fn get_file(&self, id: FileId) -> Result<Option<FileRecord>> {
            self.inner.get_file(id).await
        }
        async fn find_file_by_path(&self, path: &Path) -> Result<Option<FileRecord>> {
            self.inner.find_file_by_path(path).await
        }
        async fn list_files(&self, filter: FileFilter) -> Result<Vec<FileRecord>> {
            self.inner.list_files(filter).await
        }
        async fn mark_printed(&self, id: FileId, asset_id: &PrinterId) -> Result<()> {
            self.inner.mark_printed(id, asset_id).await
        }
        async fn mark_synced(&self, id: FileId) -> Result<()> {
            self.inner.mark_synced(id).await
        }
        async fn soft_delete_file(&self, id: FileId) -> Result<bool> {
            self.inner.soft_delete_file(id).await
        }
        async fn purge_file(&self, id: FileId) -> Result<()> {
            self.inner.purge_file(id).await
        }
    }

    #[tokio::test]
    async fn sweep_during_registration_keeps_the_new_record() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Arc::new(SqliteStore::open_in_memory().expect("store"));
        let slow = Arc::new(SlowInsertStore {
            inner: store.clone(),
            delay: Duration::from_millis(400),
        });
        let pipeline = Arc::new(IngestPipeline::new(slow, watch_config(dir.path())));
        let source = drop_pdf(&dir.path().join("t"), "race.pdf", 1);

        let registering = {
            let pipeline = pipeline.clone();
            let source = source.clone();
            tokio::spawn(async move { pipeline.process_path(&source).await })
        };
        tokio::time::sleep(Duration::from_millis(200)).await;

        let during = pipeline.full_sweep().await.expect("sweep during insert");
        assert_eq!(during.registered, 0);
        assert_eq!(during.orphaned, 0);

        let record = match registering.await.expect("join").expect("process") {
            IngestOutcome::Registered(record) => record,
            other => panic!("expected registration, got {other:?}"),
        };
        assert!(store.get_file(record.id).await.expect("get").is_some());

        let after = pipeline.full_sweep().await.expect("sweep after insert");
        assert_eq!(after.registered, 0);
        assert_eq!(after.orphaned, 0);
        let all = store.list_files(FileFilter::default()).await.expect("list");
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, record.id);
    }

    #[tokio::test]
    async fn sweep_of_missing_root_is_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (_store, pipeline) = pipeline(&dir.path().join("absent"));
        let summary = pipeline.full_sweep().await.expect("sweep");
        assert_eq!(summary, SweepSummary::default());
    }

    #[tokio::test]
    async fn retention_removes_expired_files_and_records() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (store, pipeline) = pipeline(dir.path());
        let tenant = dir.path().join("t");
        let source = drop_pdf(&tenant, "old.pdf", 1);
        let record = match pipeline.process_path(&source).await.expect("process") {
            IngestOutcome::Registered(record) => record,
            other => panic!("expected registration, got {other:?}"),
        };
        let stray = drop_pdf(dir.path(), "stray.pdf", 1);

        let fresh = pipeline.retention_sweep().await.expect("now");
        assert_eq!(fresh, RetentionSummary::default());
        assert!(record.path.exists());

        let later = SystemTime::now() + 8 * DAY;
        let expired = pipeline.retention_sweep_at(later).await.expect("later");
        assert_eq!(expired.deleted_files, 2);
        assert_eq!(expired.deleted_records, 1);
        assert!(!record.path.exists());
        assert!(!stray.exists());
        assert!(store.get_file(record.id).await.expect("get").is_none());
    }

    #[tokio::test]
    async fn retention_keeps_files_inside_the_window() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (_store, pipeline) = pipeline(dir.path());
        let kept = drop_pdf(&dir.path().join("t"), "recent.pdf", 1);

        let summary = pipeline
            .retention_sweep_at(SystemTime::now() + 6 * DAY)
            .await
            .expect("sweep");
        assert_eq!(summary.deleted_files, 0);
        assert!(kept.exists());
    }
}
