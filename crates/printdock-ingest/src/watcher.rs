// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Recursive watch on the shared folder.
//
// notify-debouncer-mini coalesces bursts of events per path; each surviving
// path is handed to the pipeline on its own task.  Paths that still exist are
// ingested, paths that are gone are treated as removals.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use notify::RecursiveMode;
use notify_debouncer_mini::{DebounceEventResult, new_debouncer};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use printdock_core::error::{PrintDockError, Result};

use crate::pipeline::IngestPipeline;

/// Feeds filesystem events under the watch root into the pipeline.
pub struct FolderWatcher {
    pipeline: Arc<IngestPipeline>,
}

impl FolderWatcher {
    pub fn new(pipeline: Arc<IngestPipeline>) -> Self {
        Self { pipeline }
    }

    /// Start watching.  The returned task runs until `shutdown` turns `true`
    /// or its sender is dropped.
    pub async fn start(&self, mut shutdown: watch::Receiver<bool>) -> Result<JoinHandle<()>> {
        let root = self.pipeline.root().to_path_buf();
        tokio::fs::create_dir_all(&root).await?;

        let (tx, mut rx) = mpsc::unbounded_channel::<DebounceEventResult>();
        let debounce = self.pipeline.config().debounce();
        let mut debouncer = new_debouncer(debounce, move |result: DebounceEventResult| {
            // The receiver only goes away during shutdown.
            let _ = tx.send(result);
        })
        .map_err(|e| PrintDockError::Watch(format!("failed to create watcher: {e}")))?;

        debouncer
            .watcher()
            .watch(&root, RecursiveMode::Recursive)
            .map_err(|e| PrintDockError::Watch(format!("watch {}: {e}", root.display())))?;
        info!(root = %root.display(), "watching shared folder");

        let pipeline = self.pipeline.clone();
        Ok(tokio::spawn(async move {
            let _debouncer = debouncer;
            loop {
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                    received = rx.recv() => match received {
                        Some(Ok(events)) => {
                            let paths: HashSet<PathBuf> =
                                events.into_iter().map(|event| event.path).collect();
                            for path in paths {
                                tokio::spawn(handle_path(pipeline.clone(), path));
                            }
                        }
                        Some(Err(e)) => warn!(error = ?e, "watch error"),
                        None => break,
                    },
                }
            }
            info!("folder watcher stopped");
        }))
    }
}

async fn handle_path(pipeline: Arc<IngestPipeline>, path: PathBuf) {
    match tokio::fs::try_exists(&path).await {
        Ok(true) => {
            // Outcomes and errors are logged by the pipeline.
            let _ = pipeline.process_path(&path).await;
        }
        Ok(false) => {
            if let Err(e) = pipeline.handle_removed(&path).await {
                warn!(path = %path.display(), error = %e, "removal not recorded");
            }
        }
        Err(e) => debug!(path = %path.display(), error = %e, "path not accessible"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::tests::{drop_pdf, watch_config};
    use printdock_store::{FileFilter, FileRepository, SqliteStore};
    use std::time::Duration;

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn dropped_pdf_is_picked_up_and_watcher_stops() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Arc::new(SqliteStore::open_in_memory().expect("store"));
        let pipeline = Arc::new(IngestPipeline::new(store.clone(), watch_config(dir.path())));
        let (stop_tx, stop_rx) = watch::channel(false);
        let tenant = dir.path().join("tenant");
        std::fs::create_dir_all(&tenant).expect("mkdir");

        let handle = FolderWatcher::new(pipeline)
            .start(stop_rx)
            .await
            .expect("start watcher");

        drop_pdf(&tenant, "scan.pdf", 2);

        let mut files = Vec::new();
        for _ in 0..100 {
            files = store.list_files(FileFilter::default()).await.expect("list");
            if !files.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].pages, 2);
        assert_eq!(files[0].file_name, "scan.pdf");

        stop_tx.send(true).expect("signal");
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("watcher stopped in time")
            .expect("watcher task");
    }

    #[tokio::test]
    async fn missing_root_is_created() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path().join("shared");
        let store = Arc::new(SqliteStore::open_in_memory().expect("store"));
        let pipeline = Arc::new(IngestPipeline::new(store, watch_config(&root)));
        let (stop_tx, stop_rx) = watch::channel(false);

        let handle = FolderWatcher::new(pipeline).start(stop_rx).await.expect("start");
        assert!(root.is_dir());

        drop(stop_tx);
        handle.await.expect("watcher task");
    }
}
