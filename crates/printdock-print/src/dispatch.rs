// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Print dispatch: send a tracked file to a configured printer.

use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};

use printdock_core::error::{PrintDockError, Result};
use printdock_core::types::{FileId, PrinterId};
use printdock_store::{FileRepository, PrinterRepository};

use crate::cups::PrinterControl;

/// What the caller gets back for an accepted job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrintReceipt {
    pub file_id: FileId,
    pub printer_id: PrinterId,
    pub queue: String,
    pub request_id: String,
}

pub struct PrintDispatcher {
    files: Arc<dyn FileRepository>,
    printers: Arc<dyn PrinterRepository>,
    control: Arc<dyn PrinterControl>,
    cleanup_delay: Duration,
}

impl PrintDispatcher {
    pub fn new(
        files: Arc<dyn FileRepository>,
        printers: Arc<dyn PrinterRepository>,
        control: Arc<dyn PrinterControl>,
        cleanup_delay: Duration,
    ) -> Self {
        Self {
            files,
            printers,
            control,
            cleanup_delay,
        }
    }

    /// Print `file_id` on `printer_id`.
    ///
    /// The file is marked printed before CUPS is invoked and stays marked if
    /// CUPS fails: a job that may have reached the printer must not be offered
    /// again.  On success the file is deleted from disk after the cleanup
    /// delay.
    #[instrument(skip(self), fields(file_id = %file_id, printer_id = %printer_id))]
    pub async fn print(&self, file_id: FileId, printer_id: &PrinterId) -> Result<PrintReceipt> {
        let file = self
            .files
            .get_file(file_id)
            .await?
            .ok_or_else(|| PrintDockError::NotFound(format!("file {file_id}")))?;
        let printer = self
            .printers
            .get_printer(printer_id)
            .await?
            .ok_or_else(|| PrintDockError::NotFound(format!("printer {printer_id}")))?;

        match tokio::fs::metadata(&file.path).await {
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!(path = %file.path.display(), "file vanished from disk, dropping record");
                self.files.soft_delete_file(file_id).await?;
                return Err(PrintDockError::NotFound(format!(
                    "file {file_id} is no longer on disk"
                )));
            }
            Err(e) => return Err(e.into()),
        }

        self.files.mark_printed(file_id, printer_id).await?;

        let request_id = self
            .control
            .print(&printer.name, &file.path)
            .await
            .map_err(|e| {
                error!(queue = %printer.name, error = %e, "print job not accepted");
                match e {
                    PrintDockError::Adapter(_) => e,
                    other => PrintDockError::Adapter(other.to_string()),
                }
            })?;

        info!(queue = %printer.name, %request_id, pages = file.pages, "file sent to printer");
        schedule_cleanup(file.path.clone(), self.cleanup_delay);

        Ok(PrintReceipt {
            file_id,
            printer_id: printer_id.clone(),
            queue: printer.name,
            request_id,
        })
    }
}

/// Delete a printed file after `delay`.  Errors are only logged.
fn schedule_cleanup(path: PathBuf, delay: Duration) {
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => debug!(path = %path.display(), "printed file removed"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), error = %e, "printed file not removed"),
        }
    });
}
