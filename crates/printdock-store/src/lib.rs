// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// printdock-store: persistence for tracked files and the printer fleet.
//
// Callers depend on the `FileRepository` / `PrinterRepository` traits; the
// agent wires in `SqliteStore`, tests may substitute their own.

pub mod repository;
pub mod sqlite;

pub use repository::{FileFilter, FileRepository, PrinterRepository};
pub use sqlite::SqliteStore;
