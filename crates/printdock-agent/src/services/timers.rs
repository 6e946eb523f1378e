// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Periodic full and retention sweeps.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{error, info};

use printdock_ingest::IngestPipeline;

/// Run both sweeps on their intervals until `shutdown` turns `true`.  The
/// first full sweep runs immediately.
pub fn spawn_sweeps(
    pipeline: Arc<IngestPipeline>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    let mut full = interval(pipeline.config().full_sweep_interval());
    full.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut retention = interval(pipeline.config().retention_sweep_interval());
    retention.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tokio::spawn(async move {
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = full.tick() => match pipeline.full_sweep().await {
                    Ok(summary) if summary.registered + summary.orphaned > 0 => {
                        info!(registered = summary.registered, orphaned = summary.orphaned, "full sweep")
                    }
                    Ok(_) => {}
                    Err(e) => error!(error = %e, "full sweep failed"),
                },
                _ = retention.tick() => {
                    if let Err(e) = pipeline.retention_sweep().await {
                        error!(error = %e, "retention sweep failed");
                    }
                }
            }
        }
        info!("sweeps stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use printdock_core::config::WatchConfig;
    use printdock_document::pdf::writer::blank_pdf;
    use printdock_store::{FileFilter, FileRepository, SqliteStore};
    use std::time::Duration;

    #[tokio::test]
    async fn first_sweep_runs_at_startup_and_stops_on_signal() {
        let dir = tempfile::tempdir().expect("tempdir");
        let tenant = dir.path().join("t");
        std::fs::create_dir_all(&tenant).expect("mkdir");
        std::fs::write(tenant.join("early.pdf"), blank_pdf(1).expect("pdf")).expect("write");

        let store = Arc::new(SqliteStore::open_in_memory().expect("store"));
        let config = WatchConfig {
            root: dir.path().to_path_buf(),
            debounce_ms: 10,
            ..WatchConfig::default()
        };
        let pipeline = Arc::new(IngestPipeline::new(store.clone(), config));
        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = spawn_sweeps(pipeline, stop_rx);

        let mut registered = 0;
        for _ in 0..100 {
            registered = store.list_files(FileFilter::default()).await.expect("list").len();
            if registered > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(registered, 1);

        stop_tx.send(true).expect("signal");
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("stopped in time")
            .expect("sweep task");
    }
}
