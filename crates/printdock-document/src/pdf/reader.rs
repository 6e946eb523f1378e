// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF reader: opens a dropped PDF with `lopdf` and reports what the ingestion
// pipeline needs to know about it.

use std::path::Path;

use lopdf::Document;
use printdock_core::error::PrintDockError;
use tracing::{debug, info, instrument};

/// Facts about a PDF gathered at ingestion time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdfSummary {
    /// Number of leaf pages in the page tree.  Always positive.
    pub pages: u32,
    /// Header version, e.g. `"1.7"`.
    pub version: String,
    pub encrypted: bool,
}

/// A parsed PDF.  Parsing is synchronous; async callers run it under
/// `spawn_blocking`.
pub struct PdfReader {
    document: Document,
    /// Shown in error messages.
    label: String,
}

impl PdfReader {
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PrintDockError> {
        let path = path.as_ref();
        let document = Document::load(path).map_err(|err| {
            PrintDockError::PdfError(format!("cannot parse {}: {err}", path.display()))
        })?;
        debug!(objects = document.objects.len(), "PDF parsed");
        Ok(Self {
            document,
            label: path.display().to_string(),
        })
    }

    /// Parse a PDF held in memory.
    pub fn from_bytes(data: &[u8]) -> Result<Self, PrintDockError> {
        let document = Document::load_mem(data).map_err(|err| {
            PrintDockError::PdfError(format!("cannot parse in-memory PDF: {err}"))
        })?;
        Ok(Self {
            document,
            label: format!("<{} bytes>", data.len()),
        })
    }

    /// Facts about the document.  An empty page tree is an error: a record
    /// with zero pages cannot be printed.
    pub fn summary(&self) -> Result<PdfSummary, PrintDockError> {
        let leaves = self.document.get_pages().len();
        if leaves == 0 {
            return Err(PrintDockError::PdfError(format!("{} has no pages", self.label)));
        }
        let pages = u32::try_from(leaves)
            .map_err(|_| PrintDockError::PdfError(format!("page count {leaves} out of range")))?;

        Ok(PdfSummary {
            pages,
            version: self.document.version.clone(),
            encrypted: self.document.is_encrypted(),
        })
    }
}

/// Open `path` and summarise it in one step.
pub fn inspect(path: impl AsRef<Path>) -> Result<PdfSummary, PrintDockError> {
    let summary = PdfReader::open(path.as_ref())?.summary()?;
    info!(
        path = %path.as_ref().display(),
        pages = summary.pages,
        version = %summary.version,
        "PDF inspected"
    );
    Ok(summary)
}
