// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Test doubles for the print subsystem seams: a recording `PrinterControl`,
// a fixed-answer `ConnectivityProbe`, and a `PrinterRepository` whose writes
// can be made to fail.

use std::collections::HashSet;
use std::net::IpAddr;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use printdock_core::error::{PrintDockError, Result};
use printdock_core::types::{PrinterId, PrinterRecord, PrinterSpec, Protocol, ValidDescriptor};
use printdock_store::{PrinterRepository, SqliteStore};

use crate::cups::PrinterControl;
use crate::probe::{Connectivity, ConnectivityProbe, EndpointCheck};

/// Records every call as `"<op> <queue>"`.
#[derive(Debug, Default)]
pub struct RecordingControl {
    calls: Mutex<Vec<String>>,
    failing_configure: Mutex<HashSet<String>>,
    fail_remove: AtomicBool,
    fail_print: AtomicBool,
}

impl RecordingControl {
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn clear(&self) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Make `configure` fail for queue `name`.
    pub fn fail_configure_for(&self, name: &str) {
        self.failing_configure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_owned());
    }

    pub fn fail_remove(&self, fail: bool) {
        self.fail_remove.store(fail, Ordering::SeqCst);
    }

    pub fn fail_print(&self, fail: bool) {
        self.fail_print.store(fail, Ordering::SeqCst);
    }

    fn log(&self, call: String) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
    }
}

#[async_trait]
impl PrinterControl for RecordingControl {
    async fn configure(&self, spec: &PrinterSpec) -> Result<()> {
        self.log(format!("configure {}", spec.name));
        let failing = self
            .failing_configure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&spec.name);
        if failing {
            return Err(PrintDockError::Adapter(format!("lpadmin rejected {}", spec.name)));
        }
        Ok(())
    }

    async fn remove(&self, name: &str) -> Result<()> {
        self.log(format!("remove {name}"));
        if self.fail_remove.load(Ordering::SeqCst) {
            return Err(PrintDockError::Adapter(format!("lpadmin -x {name} failed")));
        }
        Ok(())
    }

    async fn print(&self, name: &str, path: &Path) -> Result<String> {
        self.log(format!("print {name} {}", path.display()));
        if self.fail_print.load(Ordering::SeqCst) {
            return Err(PrintDockError::Adapter("lp: printer is stopped".into()));
        }
        Ok(format!("{name}-1"))
    }

    async fn list_drivers(&self) -> Result<Vec<String>> {
        Ok(vec!["drv:///sample.drv/generic.ppd".into(), "everywhere".into()])
    }

    async fn test_endpoint(&self, _protocol: Protocol, _ip: IpAddr, _port: u16) -> EndpointCheck {
        EndpointCheck {
            valid: true,
            path: None,
            error: None,
        }
    }
}

/// Answers every assessment the same way, echoing the descriptor's IP.
#[derive(Debug, Clone, Default)]
pub struct FixedProbe {
    pub reachable: bool,
    pub verified_path: Option<String>,
    /// Returned as the resolved address when the descriptor has none.
    pub resolved_ip: Option<IpAddr>,
}

impl FixedProbe {
    pub fn reachable() -> Self {
        Self {
            reachable: true,
            ..Self::default()
        }
    }

    pub fn unreachable() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConnectivityProbe for FixedProbe {
    async fn assess(&self, descriptor: &ValidDescriptor) -> Connectivity {
        let resolved_from_mac = descriptor.ip_address.is_none() && self.resolved_ip.is_some();
        Connectivity {
            reachable: descriptor.reachable.unwrap_or(self.reachable),
            ip: descriptor.ip_address.or(self.resolved_ip),
            verified_path: self.verified_path.clone(),
            resolved_from_mac,
            detail: if self.reachable {
                String::new()
            } else {
                "port closed".into()
            },
        }
    }
}

/// In-memory printer store whose inserts and updates can be made to fail.
pub struct FlakyPrinterStore {
    inner: SqliteStore,
    fail_insert: AtomicBool,
    fail_update: AtomicBool,
}

impl FlakyPrinterStore {
    pub fn new() -> Self {
        Self {
            inner: SqliteStore::open_in_memory().unwrap_or_else(|e| panic!("in-memory store: {e}")),
            fail_insert: AtomicBool::new(false),
            fail_update: AtomicBool::new(false),
        }
    }

    pub fn fail_insert(&self, fail: bool) {
        self.fail_insert.store(fail, Ordering::SeqCst);
    }

    pub fn fail_update(&self, fail: bool) {
        self.fail_update.store(fail, Ordering::SeqCst);
    }
}

impl Default for FlakyPrinterStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PrinterRepository for FlakyPrinterStore {
    async fn get_printer(&self, id: &PrinterId) -> Result<Option<PrinterRecord>> {
        self.inner.get_printer(id).await
    }

    async fn find_printer_by_name(&self, name: &str) -> Result<Option<PrinterRecord>> {
        self.inner.find_printer_by_name(name).await
    }

    async fn list_printers(&self) -> Result<Vec<PrinterRecord>> {
        self.inner.list_printers().await
    }

    async fn insert_printer(&self, record: &PrinterRecord) -> Result<()> {
        if self.fail_insert.load(Ordering::SeqCst) {
            return Err(PrintDockError::Database("disk I/O error".into()));
        }
        self.inner.insert_printer(record).await
    }

    async fn update_printer(&self, record: &PrinterRecord) -> Result<()> {
        if self.fail_update.load(Ordering::SeqCst) {
            return Err(PrintDockError::Database("disk I/O error".into()));
        }
        self.inner.update_printer(record).await
    }

    async fn soft_delete_printer(&self, id: &PrinterId) -> Result<bool> {
        self.inner.soft_delete_printer(id).await
    }
}
