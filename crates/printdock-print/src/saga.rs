// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Compensating actions for multi-step printer changes.
//
// A saga records one compensation per completed step.  When a later step
// fails the compensations run newest first.  A compensation that itself
// fails is logged at error level: CUPS and the store have diverged and an
// operator has to look.

use tracing::{error, info};

use printdock_core::types::PrinterSpec;

use crate::cups::PrinterControl;

/// Undo action for one completed step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Compensation {
    /// Remove a queue that this saga created.
    RemoveQueue(String),
    /// Put a queue back the way it was before this saga touched it.
    RestoreQueue(PrinterSpec),
}

impl Compensation {
    async fn apply(&self, control: &dyn PrinterControl) -> printdock_core::error::Result<()> {
        match self {
            Self::RemoveQueue(name) => control.remove(name).await,
            Self::RestoreQueue(spec) => control.configure(spec).await,
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::RemoveQueue(name) => format!("remove queue {name}"),
            Self::RestoreQueue(spec) => format!("restore queue {}", spec.name),
        }
    }
}

/// Ordered list of compensations for one printer change.
#[derive(Debug, Default)]
pub struct Saga {
    label: String,
    compensations: Vec<Compensation>,
}

impl Saga {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            compensations: Vec::new(),
        }
    }

    pub fn record(&mut self, compensation: Compensation) {
        self.compensations.push(compensation);
    }

    pub fn compensations(&self) -> &[Compensation] {
        &self.compensations
    }

    /// Run every recorded compensation, newest first.  Returns the
    /// descriptions of the ones that failed.
    pub async fn compensate(self, control: &dyn PrinterControl) -> Vec<String> {
        let mut failures = Vec::new();
        for compensation in self.compensations.iter().rev() {
            match compensation.apply(control).await {
                Ok(()) => info!(saga = %self.label, action = %compensation.describe(), "compensated"),
                Err(e) => {
                    error!(
                        saga = %self.label,
                        action = %compensation.describe(),
                        error = %e,
                        "compensation failed, CUPS and the store may disagree"
                    );
                    failures.push(format!("{}: {e}", compensation.describe()));
                }
            }
        }
        failures
    }

    /// The saga completed; nothing needs undoing.
    pub fn commit(self) {
        info!(saga = %self.label, steps = self.compensations.len(), "saga committed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingControl;
    use printdock_core::types::DEFAULT_DRIVER;

    fn spec(name: &str) -> PrinterSpec {
        PrinterSpec {
            name: name.into(),
            uri: "socket://10.0.0.5:9100".into(),
            driver: DEFAULT_DRIVER.into(),
            description: None,
            location: None,
        }
    }

    #[tokio::test]
    async fn compensations_run_in_reverse() {
        let control = RecordingControl::default();
        let mut saga = Saga::new("update p1");
        saga.record(Compensation::RestoreQueue(spec("Old")));
        saga.record(Compensation::RemoveQueue("New".into()));

        let failures = saga.compensate(&control).await;
        assert!(failures.is_empty());
        assert_eq!(control.calls(), vec!["remove New", "configure Old"]);
    }

    #[tokio::test]
    async fn failed_compensation_is_reported() {
        let control = RecordingControl::default();
        control.fail_remove(true);
        let mut saga = Saga::new("create p1");
        saga.record(Compensation::RemoveQueue("Lab".into()));

        let failures = saga.compensate(&control).await;
        assert_eq!(failures.len(), 1);
        assert!(failures[0].contains("remove queue Lab"));
    }
}
