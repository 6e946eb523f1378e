// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// printdock-ingest: turns PDFs dropped into the shared folder into tracked,
// canonically named files.
//
// Events from the recursive watch and the periodic sweeps all go through
// `IngestPipeline::process_path`, which is idempotent per path.

pub mod notifier;
pub mod pipeline;
pub mod sweep;
pub mod watcher;

pub use notifier::{CompanionNotifier, PeerNotifier};
pub use pipeline::{IngestOutcome, IngestPipeline};
pub use sweep::{RetentionSummary, SweepSummary};
pub use watcher::FolderWatcher;
