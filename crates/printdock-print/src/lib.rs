// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// printdock-print: everything that talks to printers, from CUPS queue
// control and connectivity probing to fleet reconciliation with compensating
// rollback and print dispatch.

pub mod cups;
pub mod discovery;
pub mod dispatch;
pub mod fleet;
pub mod ipp_client;
pub mod probe;
pub mod saga;
#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use cups::{CupsAdapter, PrinterControl};
pub use discovery::{DiscoveredService, ServiceBrowser};
pub use dispatch::{PrintDispatcher, PrintReceipt};
pub use fleet::{FleetOptions, FleetReconciler, SyncIssue, SyncSummary};
pub use ipp_client::IppClient;
pub use probe::{Connectivity, ConnectivityProbe, EndpointCheck, NetworkProbe};
pub use saga::{Compensation, Saga};
