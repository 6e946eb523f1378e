// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// printdock-core: core types, configuration, caches, and error definitions shared
// across all crates.

pub mod cache;
pub mod config;
pub mod error;
pub mod types;

pub use cache::{Clock, ManualClock, SystemClock, TtlCache};
pub use config::AgentConfig;
pub use error::PrintDockError;
pub use types::*;
