// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Central service layer: opens the store and wires every subsystem the HTTP
// handlers and background tasks share.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::info;

use printdock_core::config::AgentConfig;
use printdock_core::error::Result;
use printdock_ingest::{CompanionNotifier, IngestPipeline, PeerNotifier};
use printdock_print::{
    ConnectivityProbe, CupsAdapter, FleetOptions, FleetReconciler, NetworkProbe, PrintDispatcher,
    PrinterControl,
};
use printdock_store::{FileRepository, PrinterRepository, SqliteStore};

/// Shared services.  Cheap to clone; every field is behind an `Arc`.
#[derive(Clone)]
pub struct AgentServices {
    pub config: Arc<AgentConfig>,
    pub files: Arc<dyn FileRepository>,
    pub printers: Arc<dyn PrinterRepository>,
    pub control: Arc<dyn PrinterControl>,
    pub pipeline: Arc<IngestPipeline>,
    pub dispatcher: Arc<PrintDispatcher>,
    /// Sync requests run one at a time.
    pub reconciler: Arc<Mutex<FleetReconciler>>,
}

impl AgentServices {
    /// Open the database and build the production collaborators.
    pub fn init(config: AgentConfig) -> Result<Self> {
        let store = Arc::new(SqliteStore::open(&config.database_path)?);
        let control = Arc::new(CupsAdapter::new(config.cups.clone(), config.probe.clone())?);
        let probe = Arc::new(NetworkProbe::new(config.probe.clone())?);
        let notifier: Option<Arc<dyn PeerNotifier>> = if config.companion.enabled {
            Some(Arc::new(CompanionNotifier::new(config.companion.clone())?))
        } else {
            None
        };

        info!(
            database = %config.database_path.display(),
            watch_root = %config.watch.root.display(),
            "agent services initialised"
        );
        Ok(Self::from_parts(config, store, control, probe, notifier))
    }

    /// Wire services from already-built collaborators.
    pub fn from_parts(
        config: AgentConfig,
        store: Arc<SqliteStore>,
        control: Arc<dyn PrinterControl>,
        probe: Arc<dyn ConnectivityProbe>,
        notifier: Option<Arc<dyn PeerNotifier>>,
    ) -> Self {
        let files: Arc<dyn FileRepository> = store.clone();
        let printers: Arc<dyn PrinterRepository> = store;

        let mut pipeline = IngestPipeline::new(files.clone(), config.watch.clone());
        if let Some(notifier) = notifier {
            pipeline = pipeline.with_notifier(notifier);
        }

        let dispatcher = PrintDispatcher::new(
            files.clone(),
            printers.clone(),
            control.clone(),
            Duration::from_secs(config.print_cleanup_delay_secs),
        );
        let reconciler = FleetReconciler::new(
            printers.clone(),
            control.clone(),
            probe,
            FleetOptions {
                full_sync: config.fleet.full_sync,
            },
        );

        Self {
            config: Arc::new(config),
            files,
            printers,
            control,
            pipeline: Arc::new(pipeline),
            dispatcher: Arc::new(dispatcher),
            reconciler: Arc::new(Mutex::new(reconciler)),
        }
    }
}
