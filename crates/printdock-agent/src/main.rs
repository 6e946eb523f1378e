// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Printdock agent.
//
// Entry point. Initialises logging, loads the configuration, wires the
// services, and runs the folder watcher, the sweeps and the HTTP API until
// Ctrl-C or SIGTERM.

mod http;
mod services;

use std::process::ExitCode;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};

use printdock_core::config::AgentConfig;
use printdock_core::error::{PrintDockError, Result};
use printdock_ingest::FolderWatcher;

use services::agent_services::AgentServices;
use services::{data_dir, timers};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "Printdock starting");

    match run().await {
        Ok(()) => {
            info!("Printdock stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "Printdock failed");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<()> {
    let dir = data_dir::data_dir();
    let mut config = AgentConfig::load(&data_dir::config_path(&dir))?;
    config.database_path = data_dir::resolve(&dir, &config.database_path);

    let services = AgentServices::init(config)?;
    let (stop_tx, stop_rx) = watch::channel(false);

    let watcher = FolderWatcher::new(services.pipeline.clone())
        .start(stop_rx.clone())
        .await?;
    let sweeps = timers::spawn_sweeps(services.pipeline.clone(), stop_rx);

    let listener = TcpListener::bind(&services.config.listen_addr)
        .await
        .map_err(|e| {
            PrintDockError::Config(format!("bind {}: {e}", services.config.listen_addr))
        })?;
    info!(addr = %services.config.listen_addr, "HTTP API listening");

    let app = http::router(services);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            wait_for_shutdown_signal().await;
            info!("shutdown requested");
            let _ = stop_tx.send(true);
        })
        .await?;

    for (name, task) in [("watcher", watcher), ("sweeps", sweeps)] {
        if let Err(e) = task.await {
            warn!(task = name, error = %e, "background task ended abnormally");
        }
    }
    Ok(())
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = sigterm.recv() => {}
                    _ = tokio::signal::ctrl_c() => {}
                }
            }
            Err(e) => {
                warn!(error = %e, "SIGTERM handler unavailable, waiting for Ctrl-C only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
