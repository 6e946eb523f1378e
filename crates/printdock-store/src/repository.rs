// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Repository traits.
//
// Every read returns active records only; soft-deleted rows are kept for the
// audit trail but are invisible through these interfaces.

use std::path::Path;

use async_trait::async_trait;
use printdock_core::error::Result;
use printdock_core::types::{FileId, FileRecord, PrinterId, PrinterRecord};

/// Optional flag filters for [`FileRepository::list_files`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileFilter {
    pub printed: Option<bool>,
    pub synced: Option<bool>,
}

/// Storage of [`FileRecord`]s.
#[async_trait]
pub trait FileRepository: Send + Sync {
    /// Insert a new record.  A second active record for the same path is a
    /// `Conflict`.
    async fn insert_file(&self, record: &FileRecord) -> Result<()>;

    async fn get_file(&self, id: FileId) -> Result<Option<FileRecord>>;

    /// The active record whose canonical path is `path`, if any.
    async fn find_file_by_path(&self, path: &Path) -> Result<Option<FileRecord>>;

    /// Active records, newest first.
    async fn list_files(&self, filter: FileFilter) -> Result<Vec<FileRecord>>;

    /// Set `printed = true` and the owning printer.  `NotFound` when no active
    /// record exists.
    async fn mark_printed(&self, id: FileId, asset_id: &PrinterId) -> Result<()>;

    /// Record the upstream sync acknowledgement.
    async fn mark_synced(&self, id: FileId) -> Result<()>;

    /// Soft-delete.  Returns whether an active record was deleted.
    async fn soft_delete_file(&self, id: FileId) -> Result<bool>;

    /// Remove the row entirely.  Only used to roll back a registration whose
    /// file never materialised.
    async fn purge_file(&self, id: FileId) -> Result<()>;
}

/// Storage of [`PrinterRecord`]s.
#[async_trait]
pub trait PrinterRepository: Send + Sync {
    async fn get_printer(&self, id: &PrinterId) -> Result<Option<PrinterRecord>>;

    async fn find_printer_by_name(&self, name: &str) -> Result<Option<PrinterRecord>>;

    /// Active printers ordered by queue name.
    async fn list_printers(&self) -> Result<Vec<PrinterRecord>>;

    /// Insert a printer.  An id that was previously soft-deleted is revived;
    /// an id or queue name held by an active printer is a `Conflict`.
    async fn insert_printer(&self, record: &PrinterRecord) -> Result<()>;

    /// Overwrite an active printer.  `NotFound` when no active record exists.
    async fn update_printer(&self, record: &PrinterRecord) -> Result<()>;

    /// Soft-delete.  Returns whether an active record was deleted.
    async fn soft_delete_printer(&self, id: &PrinterId) -> Result<bool>;
}
