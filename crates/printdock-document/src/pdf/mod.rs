// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF module: inspects dropped PDFs, plus fixture generation for tests.

pub mod reader;
#[cfg(any(test, feature = "test-util"))]
pub mod writer;

pub use reader::{PdfReader, PdfSummary};
