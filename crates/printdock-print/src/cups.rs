// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// CUPS control adapter.
//
// The agent never speaks the print protocol itself: queues are created and
// removed with `lpadmin`, jobs submitted with `lp`, and drivers listed with
// `lpinfo`.  Every operation is idempotent from CUPS's point of view:
// `lpadmin -p` on an existing queue reconfigures it, and removing a queue
// that does not exist is treated as success.

use std::net::IpAddr;
use std::path::Path;
use std::process::Output;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

use printdock_core::config::{CupsConfig, ProbeConfig};
use printdock_core::error::{PrintDockError, Result};
use printdock_core::types::{DEFAULT_DRIVER, PrinterSpec, Protocol};

use crate::probe::{self, EndpointCheck};

/// CUPS rejects queue names longer than this.
const MAX_QUEUE_NAME: usize = 127;

/// PPD used for the `generic` driver.
const GENERIC_MODEL: &str = "drv:///sample.drv/generic.ppd";

/// Operations the agent needs from the OS print subsystem.
#[async_trait]
pub trait PrinterControl: Send + Sync {
    /// Create the queue, or reconfigure it if it already exists.
    async fn configure(&self, spec: &PrinterSpec) -> Result<()>;

    /// Remove the queue.  Removing a missing queue succeeds.
    async fn remove(&self, name: &str) -> Result<()>;

    /// Submit `path` to queue `name` and return the CUPS request id.
    async fn print(&self, name: &str, path: &Path) -> Result<String>;

    async fn list_drivers(&self) -> Result<Vec<String>>;

    async fn test_endpoint(&self, protocol: Protocol, ip: IpAddr, port: u16) -> EndpointCheck;
}

/// [`PrinterControl`] over the CUPS command-line tools.
pub struct CupsAdapter {
    tools: CupsConfig,
    probe: ProbeConfig,
    http: reqwest::Client,
}

impl CupsAdapter {
    pub fn new(tools: CupsConfig, probe: ProbeConfig) -> Result<Self> {
        let http = probe::probe_http_client(&probe)?;
        Ok(Self { tools, probe, http })
    }

    async fn run(&self, program: &str, args: &[String]) -> Result<Output> {
        debug!(program, ?args, "running CUPS tool");
        let output = Command::new(program)
            .args(args)
            .output()
            .await
            .map_err(|e| PrintDockError::Adapter(format!("{program} could not run: {e}")))?;
        Ok(output)
    }
}

#[async_trait]
impl PrinterControl for CupsAdapter {
    #[instrument(skip(self, spec), fields(name = %spec.name, uri = %spec.uri))]
    async fn configure(&self, spec: &PrinterSpec) -> Result<()> {
        let output = self.run(&self.tools.lpadmin, &configure_args(spec)).await?;
        if !output.status.success() {
            return Err(command_error(&self.tools.lpadmin, &output));
        }
        info!("CUPS queue configured");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn remove(&self, name: &str) -> Result<()> {
        let args = vec!["-x".to_string(), name.to_string()];
        let output = self.run(&self.tools.lpadmin, &args).await?;
        if output.status.success() {
            info!("CUPS queue removed");
            return Ok(());
        }
        if is_missing_queue(&output) {
            debug!("CUPS queue already absent");
            return Ok(());
        }
        Err(command_error(&self.tools.lpadmin, &output))
    }

    #[instrument(skip(self), fields(path = %path.display()))]
    async fn print(&self, name: &str, path: &Path) -> Result<String> {
        let title = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "printdock".into());
        let args = vec![
            "-d".to_string(),
            name.to_string(),
            "-t".to_string(),
            title,
            "--".to_string(),
            path.to_string_lossy().into_owned(),
        ];
        let output = self.run(&self.tools.lp, &args).await?;
        if !output.status.success() {
            return Err(command_error(&self.tools.lp, &output));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let request_id = parse_request_id(&stdout).ok_or_else(|| {
            PrintDockError::Adapter(format!("unexpected {} output: {}", self.tools.lp, stdout.trim()))
        })?;
        info!(%request_id, "job submitted to CUPS");
        Ok(request_id)
    }

    async fn list_drivers(&self) -> Result<Vec<String>> {
        let output = self.run(&self.tools.lpinfo, &["-m".to_string()]).await?;
        if !output.status.success() {
            return Err(command_error(&self.tools.lpinfo, &output));
        }
        let drivers = parse_driver_list(&String::from_utf8_lossy(&output.stdout));
        debug!(count = drivers.len(), "drivers listed");
        Ok(drivers)
    }

    async fn test_endpoint(&self, protocol: Protocol, ip: IpAddr, port: u16) -> EndpointCheck {
        probe::check_endpoint(&self.http, &self.probe, protocol, ip, port).await
    }
}

// ---------------------------------------------------------------------------
// Pure helpers
// ---------------------------------------------------------------------------

/// Turn a display name into a name CUPS accepts: no whitespace, `/`, `\`,
/// `#`, quotes or control characters, at most 127 bytes.
pub fn queue_name(name: &str) -> String {
    let mut normalized: String = name
        .trim()
        .chars()
        .map(|c| {
            if c.is_whitespace()
                || c.is_control()
                || matches!(c, '/' | '\\' | '#' | '\'' | '"' | '?' | ',')
            {
                '_'
            } else {
                c
            }
        })
        .collect();

    if normalized.len() > MAX_QUEUE_NAME {
        let mut cut = MAX_QUEUE_NAME;
        while !normalized.is_char_boundary(cut) {
            cut -= 1;
        }
        normalized.truncate(cut);
    }
    normalized
}

/// `lpadmin -m` model for a driver name.
pub fn driver_model(driver: &str) -> &str {
    let driver = driver.trim();
    if driver.is_empty() || driver.eq_ignore_ascii_case(DEFAULT_DRIVER) {
        GENERIC_MODEL
    } else {
        driver
    }
}

/// Arguments for `lpadmin` creating or reconfiguring a queue.
pub fn configure_args(spec: &PrinterSpec) -> Vec<String> {
    let mut args = vec![
        "-p".to_string(),
        spec.name.clone(),
        "-E".to_string(),
        "-v".to_string(),
        spec.uri.clone(),
        "-m".to_string(),
        driver_model(&spec.driver).to_string(),
    ];
    if let Some(description) = &spec.description {
        args.push("-D".into());
        args.push(description.clone());
    }
    if let Some(location) = &spec.location {
        args.push("-L".into());
        args.push(location.clone());
    }
    args
}

/// Extract `Lab-42` from `request id is Lab-42 (1 file(s))`.
pub fn parse_request_id(stdout: &str) -> Option<String> {
    let (_, rest) = stdout.split_once("request id is ")?;
    rest.split_whitespace().next().map(String::from)
}

/// First column of `lpinfo -m`, one model per line.
pub fn parse_driver_list(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .map(String::from)
        .collect()
}

fn is_missing_queue(output: &Output) -> bool {
    let stderr = String::from_utf8_lossy(&output.stderr).to_ascii_lowercase();
    stderr.contains("does not exist") || stderr.contains("not found")
}

fn command_error(program: &str, output: &Output) -> PrintDockError {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stdout = String::from_utf8_lossy(&output.stdout);
    let message = if stderr.trim().is_empty() {
        stdout.trim().to_string()
    } else {
        stderr.trim().to_string()
    };
    warn!(program, status = %output.status, %message, "CUPS tool failed");
    PrintDockError::Adapter(format!("{program} exited with {}: {message}", output.status))
}
