// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// IPP status queries.
//
// Jobs themselves go through CUPS; the agent only speaks IPP directly to ask
// a printer how it is doing (Get-Printer-Attributes, RFC 8011 §4.2.5).

use std::collections::HashMap;
use std::time::Duration;

use ipp::prelude::*;
use tracing::{debug, instrument, warn};

use printdock_core::error::{PrintDockError, Result};

/// Flattened attribute-name → display-value map.
pub type PrinterAttributes = HashMap<String, String>;

/// The parts of a Get-Printer-Attributes response the probe reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrinterState {
    /// `printer-state` keyword or enum value (idle, processing, stopped).
    pub state: String,
    /// `printer-state-reasons`, comma separated.
    pub reasons: String,
    pub make_and_model: Option<String>,
}

impl PrinterState {
    fn from_attributes(attrs: &PrinterAttributes) -> Self {
        Self {
            state: attrs
                .get("printer-state")
                .cloned()
                .unwrap_or_else(|| "unknown".into()),
            reasons: attrs
                .get("printer-state-reasons")
                .cloned()
                .unwrap_or_else(|| "none".into()),
            make_and_model: attrs.get("printer-make-and-model").cloned(),
        }
    }

    /// One-line summary for probe details.
    pub fn summary(&self) -> String {
        match &self.make_and_model {
            Some(model) => format!("{model}: {} ({})", self.state, self.reasons),
            None => format!("{} ({})", self.state, self.reasons),
        }
    }
}

/// Async IPP client bound to one printer URI.
pub struct IppClient {
    uri: Uri,
    timeout: Duration,
}

impl IppClient {
    /// Create a client for an `ipp://` or `ipps://` URI.
    pub fn new(uri: &str, timeout: Duration) -> Result<Self> {
        let parsed: Uri = uri
            .parse()
            .map_err(|e| PrintDockError::Probe(format!("invalid URI '{uri}': {e}")))?;
        Ok(Self {
            uri: parsed,
            timeout,
        })
    }

    /// Send Get-Printer-Attributes and flatten the response.
    #[instrument(skip(self), fields(printer = %self.uri))]
    pub async fn fetch_attributes(&self) -> Result<PrinterAttributes> {
        let request = IppOperationBuilder::get_printer_attributes(self.uri.clone()).build();
        let response = tokio::time::timeout(
            self.timeout,
            AsyncIppClient::new(self.uri.clone()).send(request),
        )
        .await
        .map_err(|_| {
            PrintDockError::Probe(format!(
                "Get-Printer-Attributes timed out after {:?}",
                self.timeout
            ))
        })?
        .map_err(|e| PrintDockError::Probe(format!("Get-Printer-Attributes: {e}")))?;

        let status = response.header().status_code();
        if !status.is_success() {
            warn!(?status, "printer refused Get-Printer-Attributes");
            return Err(PrintDockError::Probe(format!("printer answered {status:?}")));
        }

        let attrs = flatten_attributes(response.attributes());
        debug!(attributes = attrs.len(), "printer attributes fetched");
        Ok(attrs)
    }

    /// Query and summarise the printer's state.
    pub async fn printer_state(&self) -> Result<PrinterState> {
        self.fetch_attributes()
            .await
            .map(|attrs| PrinterState::from_attributes(&attrs))
    }
}

/// Multi-valued attributes are rendered by the `ipp` crate's `Display`.
fn flatten_attributes(attrs: &IppAttributes) -> PrinterAttributes {
    attrs
        .groups()
        .iter()
        .flat_map(|group| group.attributes())
        .map(|(name, attr)| (name.clone(), attr.value().to_string()))
        .collect()
}
