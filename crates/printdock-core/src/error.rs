// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Printdock.

use thiserror::Error;

/// Top-level error type for all Printdock operations.
#[derive(Debug, Error)]
pub enum PrintDockError {
    // -- Request / record errors --
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    // -- Print subsystem --
    #[error("printer control failed: {0}")]
    Adapter(String),

    #[error("network probe failed: {0}")]
    Probe(String),

    #[error("companion discovery failed: {0}")]
    Discovery(String),

    #[error("HTTP request failed: {0}")]
    Http(String),

    // -- Documents / filesystem --
    #[error("PDF operation failed: {0}")]
    PdfError(String),

    #[error("file watch failed: {0}")]
    Watch(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    // -- Storage / configuration --
    #[error("database error: {0}")]
    Database(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PrintDockError {
    /// Whether the caller asked for something that does not exist (or no
    /// longer exists).  Used by the HTTP layer to pick a 404.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Whether the error was caused by the request itself rather than by the
    /// agent or one of its collaborators.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::NotFound(_) | Self::Conflict(_))
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, PrintDockError>;
