// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Printer fleet reconciliation.
//
// The upstream service periodically sends the complete list of printers this
// site should have.  Each descriptor is diffed against the store and turned
// into CUPS configuration, one at a time:
//
//   validate → probe → (create saga | update saga | unchanged)
//
// The invariant is that a change accepted into the store always corresponds
// to an applied CUPS configuration.  Creating configures CUPS first and
// removes the queue again if the insert fails; updating remembers the old
// configuration and restores it if CUPS rejects the new one.

use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tracing::{error, info, instrument, warn};

use printdock_core::error::{PrintDockError, Result};
use printdock_core::types::{
    DEFAULT_DRIVER, Lifecycle, PrinterDescriptor, PrinterId, PrinterRecord, Protocol,
    ValidDescriptor,
};
use printdock_store::PrinterRepository;

use crate::cups::{self, PrinterControl};
use crate::probe::{Connectivity, ConnectivityProbe};
use crate::saga::{Compensation, Saga};

/// IPP resource path assumed when none was verified.
const DEFAULT_IPP_PATH: &str = "/ipp/print";

#[derive(Debug, Clone, Copy, Default)]
pub struct FleetOptions {
    /// Remove active printers that are missing from the batch.
    pub full_sync: bool,
}

/// One per-printer problem in a sync response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncIssue {
    pub printer_id: String,
    pub name: Option<String>,
    pub message: String,
}

impl SyncIssue {
    fn new(printer_id: impl Into<String>, name: Option<String>, message: impl Into<String>) -> Self {
        Self {
            printer_id: printer_id.into(),
            name,
            message: message.into(),
        }
    }
}

/// Outcome counts of one sync batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncSummary {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub deleted: usize,
    pub skipped: usize,
    pub errors: Vec<SyncIssue>,
    pub warnings: Vec<SyncIssue>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Created,
    Updated,
    Unchanged,
}

pub struct FleetReconciler {
    printers: Arc<dyn PrinterRepository>,
    control: Arc<dyn PrinterControl>,
    probe: Arc<dyn ConnectivityProbe>,
    options: FleetOptions,
}

impl FleetReconciler {
    pub fn new(
        printers: Arc<dyn PrinterRepository>,
        control: Arc<dyn PrinterControl>,
        probe: Arc<dyn ConnectivityProbe>,
        options: FleetOptions,
    ) -> Self {
        Self {
            printers,
            control,
            probe,
            options,
        }
    }

    /// Reconcile one batch.  Never fails as a whole; every problem is
    /// reported per printer in the summary.
    pub async fn sync(&self, batch: &[PrinterDescriptor]) -> SyncSummary {
        self.sync_entries(batch.iter().cloned().map(Ok).collect()).await
    }

    /// [`Self::sync`] over raw JSON items.  An item that does not decode as a
    /// descriptor is skipped with an error; the rest of the batch proceeds.
    pub async fn sync_json(&self, batch: &[Value]) -> SyncSummary {
        self.sync_entries(batch.iter().map(decode_descriptor).collect()).await
    }

    #[instrument(skip_all, fields(batch = entries.len(), full_sync = self.options.full_sync))]
    async fn sync_entries(
        &self,
        entries: Vec<std::result::Result<PrinterDescriptor, Malformed>>,
    ) -> SyncSummary {
        let mut summary = SyncSummary::default();
        let mut seen: HashSet<PrinterId> = HashSet::new();
        let mut listed: HashSet<PrinterId> = HashSet::new();

        for entry in entries {
            let descriptor = match entry {
                Ok(descriptor) => descriptor,
                Err(malformed) => {
                    // Still listed: a bad field must not get the printer removed.
                    if let Some(id) = &malformed.id {
                        listed.insert(PrinterId::from(id.as_str()));
                    }
                    let printer_id = malformed.id.unwrap_or_else(|| "<missing id>".into());
                    warn!(%printer_id, reason = %malformed.reason, "descriptor not decoded");
                    summary.skipped += 1;
                    summary
                        .errors
                        .push(SyncIssue::new(printer_id, malformed.name, malformed.reason));
                    continue;
                }
            };
            let descriptor = &descriptor;

            if let Some(id) = descriptor.id.as_deref().map(str::trim).filter(|id| !id.is_empty()) {
                listed.insert(PrinterId::from(id));
            }

            let valid = match descriptor.validate() {
                Ok(valid) => valid,
                Err(e) => {
                    warn!(printer_id = %descriptor.display_id(), error = %e, "descriptor rejected");
                    summary.skipped += 1;
                    summary.errors.push(SyncIssue::new(
                        descriptor.display_id(),
                        descriptor.name.clone(),
                        e.to_string(),
                    ));
                    continue;
                }
            };

            if !seen.insert(valid.id.clone()) {
                warn!(printer_id = %valid.id, "duplicate printer id in batch");
                summary.skipped += 1;
                summary.errors.push(SyncIssue::new(
                    valid.id.as_str(),
                    Some(valid.name.clone()),
                    "duplicate printer id in batch",
                ));
                continue;
            }

            let connectivity = match self.reconcile(&valid).await {
                Ok((outcome, connectivity)) => {
                    match outcome {
                        Outcome::Created => summary.created += 1,
                        Outcome::Updated => summary.updated += 1,
                        Outcome::Unchanged => summary.unchanged += 1,
                    }
                    connectivity
                }
                Err(e) => {
                    warn!(printer_id = %valid.id, error = %e, "printer not reconciled");
                    summary.errors.push(SyncIssue::new(
                        valid.id.as_str(),
                        Some(valid.name.clone()),
                        e.to_string(),
                    ));
                    continue;
                }
            };

            if !connectivity.reachable {
                summary.warnings.push(SyncIssue::new(
                    valid.id.as_str(),
                    Some(valid.name.clone()),
                    unreachable_message(&connectivity),
                ));
            }
        }

        if self.options.full_sync {
            self.remove_absent(&listed, &mut summary).await;
        }

        info!(
            created = summary.created,
            updated = summary.updated,
            unchanged = summary.unchanged,
            deleted = summary.deleted,
            skipped = summary.skipped,
            errors = summary.errors.len(),
            warnings = summary.warnings.len(),
            "fleet sync finished"
        );
        summary
    }

    async fn reconcile(&self, valid: &ValidDescriptor) -> Result<(Outcome, Connectivity)> {
        let queue = cups::queue_name(&valid.name);

        if let Some(holder) = self.printers.find_printer_by_name(&queue).await? {
            if holder.id != valid.id {
                return Err(PrintDockError::Conflict(format!(
                    "queue name '{queue}' is already used by printer {}",
                    holder.id
                )));
            }
        }

        let connectivity = self.probe.assess(valid).await;

        let outcome = match self.printers.get_printer(&valid.id).await? {
            None => {
                let record = new_record(valid, &queue, &connectivity)?;
                self.create(&record).await?;
                Outcome::Created
            }
            Some(existing) => {
                let merged = merge(&existing, valid, &queue, &connectivity);
                let changed = changed_fields(&existing, &merged);
                if changed.is_empty() {
                    Outcome::Unchanged
                } else {
                    info!(printer_id = %existing.id, ?changed, "printer changed");
                    self.update(&existing, &merged).await?;
                    Outcome::Updated
                }
            }
        };
        Ok((outcome, connectivity))
    }

    /// Configure CUPS, then persist.  A failed insert removes the queue again.
    #[instrument(skip_all, fields(printer_id = %record.id, name = %record.name))]
    async fn create(&self, record: &PrinterRecord) -> Result<()> {
        let mut saga = Saga::new(format!("create {}", record.id));

        self.control.configure(&record.spec()).await?;
        saga.record(Compensation::RemoveQueue(record.name.clone()));

        if let Err(e) = self.printers.insert_printer(record).await {
            let failures = saga.compensate(self.control.as_ref()).await;
            return Err(with_rollback_failures(e, failures));
        }

        saga.commit();
        info!("printer created");
        Ok(())
    }

    /// Reconfigure CUPS (removing the old queue on rename), then persist.  If
    /// CUPS rejects the new configuration the old one is restored.
    #[instrument(skip_all, fields(printer_id = %existing.id, name = %merged.name))]
    async fn update(&self, existing: &PrinterRecord, merged: &PrinterRecord) -> Result<()> {
        let mut saga = Saga::new(format!("update {}", existing.id));
        let renamed = existing.name != merged.name;

        if renamed {
            if let Err(e) = self.control.remove(&existing.name).await {
                warn!(old_name = %existing.name, error = %e, "old queue not removed before rename");
            }
        }
        saga.record(Compensation::RestoreQueue(existing.spec()));

        if let Err(e) = self.control.configure(&merged.spec()).await {
            if renamed {
                saga.record(Compensation::RemoveQueue(merged.name.clone()));
            }
            let failures = saga.compensate(self.control.as_ref()).await;
            return Err(with_rollback_failures(e, failures));
        }
        saga.commit();

        if let Err(e) = self.printers.update_printer(merged).await {
            error!(
                error = %e,
                "CUPS queue reconfigured but the store update failed, queue and record disagree"
            );
            return Err(e);
        }
        info!("printer updated");
        Ok(())
    }

    async fn remove_absent(&self, listed: &HashSet<PrinterId>, summary: &mut SyncSummary) {
        let active = match self.printers.list_printers().await {
            Ok(active) => active,
            Err(e) => {
                error!(error = %e, "full sync could not list printers");
                summary
                    .errors
                    .push(SyncIssue::new("*", None, format!("full sync skipped: {e}")));
                return;
            }
        };

        for printer in active.into_iter().filter(|p| !listed.contains(&p.id)) {
            if let Err(e) = self.control.remove(&printer.name).await {
                summary.warnings.push(SyncIssue::new(
                    printer.id.as_str(),
                    Some(printer.name.clone()),
                    format!("CUPS queue not removed: {e}"),
                ));
            }
            match self.printers.soft_delete_printer(&printer.id).await {
                Ok(_) => {
                    info!(printer_id = %printer.id, name = %printer.name, "printer removed by full sync");
                    summary.deleted += 1;
                }
                Err(e) => summary.errors.push(SyncIssue::new(
                    printer.id.as_str(),
                    Some(printer.name.clone()),
                    e.to_string(),
                )),
            }
        }
    }
}

/// A batch item that is not a descriptor, with whatever id and name could be
/// read from it.
struct Malformed {
    id: Option<String>,
    name: Option<String>,
    reason: String,
}

fn decode_descriptor(item: &Value) -> std::result::Result<PrinterDescriptor, Malformed> {
    serde_json::from_value(item.clone()).map_err(|e| Malformed {
        id: item.get("id").and_then(scalar_text),
        name: item.get("name").and_then(scalar_text),
        reason: format!("malformed descriptor: {e}"),
    })
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_owned()).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Record construction
// ---------------------------------------------------------------------------

fn new_record(
    valid: &ValidDescriptor,
    queue: &str,
    connectivity: &Connectivity,
) -> Result<PrinterRecord> {
    let protocol = valid.protocol_or_default();
    let ip_address = connectivity.ip.or(valid.ip_address);
    let uri = match &valid.uri {
        Some(uri) => uri.clone(),
        None => synthesize_uri(
            protocol,
            ip_address,
            valid.port,
            connectivity.verified_path.as_deref(),
            queue,
        )
        .ok_or_else(|| {
            PrintDockError::Validation(format!(
                "cannot build a {} device URI without an IP address",
                protocol.as_str()
            ))
        })?,
    };

    let now = Utc::now();
    Ok(PrinterRecord {
        id: valid.id.clone(),
        name: queue.to_owned(),
        status: valid.status.unwrap_or_default(),
        protocol,
        driver: valid
            .driver
            .clone()
            .unwrap_or_else(|| DEFAULT_DRIVER.to_owned()),
        uri: Some(uri),
        description: valid.description.clone(),
        location: valid.location.clone(),
        ip_address,
        mac_address: valid.mac_address.clone(),
        port: valid.port,
        created_at: now,
        updated_at: now,
        lifecycle: Lifecycle::Active,
    })
}

/// Descriptor values win; absent descriptor fields keep the stored value.
fn merge(
    existing: &PrinterRecord,
    valid: &ValidDescriptor,
    queue: &str,
    connectivity: &Connectivity,
) -> PrinterRecord {
    let protocol = valid.protocol.unwrap_or(existing.protocol);
    let ip_address = connectivity
        .ip
        .or(valid.ip_address)
        .or(existing.ip_address);
    let port = match valid.port {
        Some(port) => Some(port),
        None if protocol == existing.protocol => existing.port,
        None => None,
    };

    let endpoint_unchanged = protocol == existing.protocol
        && ip_address == existing.ip_address
        && port == existing.port;
    let uri = match &valid.uri {
        Some(uri) => Some(uri.clone()),
        None if endpoint_unchanged && connectivity.verified_path.is_none() => existing.uri.clone(),
        None => synthesize_uri(
            protocol,
            ip_address,
            port,
            connectivity.verified_path.as_deref(),
            queue,
        )
        .or_else(|| existing.uri.clone()),
    };

    let mut merged = PrinterRecord {
        name: queue.to_owned(),
        status: valid.status.unwrap_or(existing.status),
        protocol,
        driver: valid.driver.clone().unwrap_or_else(|| existing.driver.clone()),
        uri,
        description: valid.description.clone().or_else(|| existing.description.clone()),
        location: valid.location.clone().or_else(|| existing.location.clone()),
        ip_address,
        mac_address: valid.mac_address.clone().or_else(|| existing.mac_address.clone()),
        port,
        ..existing.clone()
    };
    if !changed_fields(existing, &merged).is_empty() {
        merged.updated_at = Utc::now();
    }
    merged
}

/// Names of the compared fields that differ.
fn changed_fields(old: &PrinterRecord, new: &PrinterRecord) -> Vec<&'static str> {
    let mut changed = Vec::new();
    if old.name != new.name {
        changed.push("name");
    }
    if old.status != new.status {
        changed.push("status");
    }
    if old.protocol != new.protocol {
        changed.push("protocol");
    }
    if old.mac_address != new.mac_address {
        changed.push("mac_address");
    }
    if old.driver != new.driver {
        changed.push("driver");
    }
    if old.uri != new.uri {
        changed.push("uri");
    }
    if old.description != new.description {
        changed.push("description");
    }
    if old.location != new.location {
        changed.push("location");
    }
    if old.ip_address != new.ip_address {
        changed.push("ip_address");
    }
    if old.port != new.port {
        changed.push("port");
    }
    changed
}

/// Device URI for a protocol and address.  `dnssd` printers have no
/// address-based URI and need one supplied upstream.
pub fn synthesize_uri(
    protocol: Protocol,
    ip: Option<IpAddr>,
    port: Option<u16>,
    verified_path: Option<&str>,
    queue: &str,
) -> Option<String> {
    let ip = ip?;
    let port = port.or_else(|| protocol.default_port());
    let authority = match port {
        Some(port) => SocketAddr::new(ip, port).to_string(),
        None if ip.is_ipv6() => format!("[{ip}]"),
        None => ip.to_string(),
    };

    let uri = match protocol {
        Protocol::Socket => format!("socket://{authority}"),
        Protocol::Ipp | Protocol::Ipps => format!(
            "{}://{authority}{}",
            protocol.as_str(),
            verified_path.unwrap_or(DEFAULT_IPP_PATH)
        ),
        Protocol::Lpd => format!("lpd://{authority}/{queue}"),
        Protocol::Http | Protocol::Https => format!(
            "{}://{authority}{}",
            protocol.as_str(),
            verified_path.unwrap_or("/")
        ),
        Protocol::Smb => {
            let host = if ip.is_ipv6() { format!("[{ip}]") } else { ip.to_string() };
            format!("smb://{host}/{queue}")
        }
        Protocol::Dnssd => return None,
    };
    Some(uri)
}

fn with_rollback_failures(err: PrintDockError, failures: Vec<String>) -> PrintDockError {
    if failures.is_empty() {
        return err;
    }
    PrintDockError::Adapter(format!("{err}; rollback incomplete: {}", failures.join(", ")))
}

fn unreachable_message(connectivity: &Connectivity) -> String {
    if connectivity.detail.is_empty() {
        "saved, but the printer is not reachable".into()
    } else {
        format!("saved, but the printer is not reachable: {}", connectivity.detail)
    }
}
