// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// printdock-document: document handling for the Printdock print agent.
//
// Provides PDF inspection (page count, version, encryption flag) and the
// display-name sanitization applied to every dropped file.

pub mod naming;
pub mod pdf;

pub use naming::sanitize_file_name;
pub use pdf::reader::{PdfReader, PdfSummary};
