// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Printer fleet endpoints.

use std::net::IpAddr;

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use serde::Deserialize;
use serde_json::Value;
use tracing::instrument;

use printdock_core::error::PrintDockError;
use printdock_core::types::{PrinterRecord, Protocol};
use printdock_print::{EndpointCheck, SyncSummary};

use super::envelope::{ApiResult, Envelope, ok};
use crate::services::agent_services::AgentServices;

/// `GET /api/printers`
pub async fn list_printers(State(services): State<AgentServices>) -> ApiResult<Vec<PrinterRecord>> {
    let printers = services.printers.list_printers().await?;
    ok(format!("{} printer(s)", printers.len()), printers)
}

/// `GET /api/printers/drivers`
pub async fn list_drivers(State(services): State<AgentServices>) -> ApiResult<Vec<String>> {
    let drivers = services.control.list_drivers().await?;
    ok(format!("{} driver(s)", drivers.len()), drivers)
}

/// `POST /api/printers/sync` with a JSON array of descriptors.
///
/// Only a body that is not a JSON array is rejected.  Items are decoded one
/// by one, so per-printer failures (including undecodable items) are in the
/// summary and clear `success`.
#[instrument(skip_all)]
pub async fn sync_printers(
    State(services): State<AgentServices>,
    payload: Result<Json<Vec<Value>>, JsonRejection>,
) -> ApiResult<SyncSummary> {
    let Json(batch) = payload.map_err(|e| PrintDockError::Validation(e.body_text()))?;
    let summary = services.reconciler.lock().await.sync_json(&batch).await;

    let message = format!(
        "created {}, updated {}, unchanged {}, deleted {}, skipped {}",
        summary.created, summary.updated, summary.unchanged, summary.deleted, summary.skipped
    );
    Ok(Json(Envelope {
        success: summary.errors.is_empty(),
        message,
        data: Some(summary),
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointRequest {
    pub protocol: String,
    #[serde(alias = "ip_address")]
    pub ip_address: String,
    #[serde(default)]
    pub port: Option<u16>,
}

/// `POST /api/printers/test-endpoint` with `{ protocol, ipAddress, port }`.
///
/// `success` mirrors whether the device answered; the port defaults to the
/// protocol's usual one.
#[instrument(skip_all)]
pub async fn test_endpoint(
    State(services): State<AgentServices>,
    payload: Result<Json<EndpointRequest>, JsonRejection>,
) -> ApiResult<EndpointCheck> {
    let Json(request) = payload.map_err(|e| PrintDockError::Validation(e.body_text()))?;
    let protocol: Protocol = request.protocol.parse()?;
    let ip: IpAddr = request.ip_address.trim().parse().map_err(|_| {
        PrintDockError::Validation(format!("invalid ipAddress '{}'", request.ip_address))
    })?;
    let port = request
        .port
        .or_else(|| protocol.default_port())
        .filter(|port| *port != 0)
        .ok_or_else(|| {
            PrintDockError::Validation(format!("a port is required for {}", protocol.as_str()))
        })?;

    let check = services.control.test_endpoint(protocol, ip, port).await;
    let message = match (&check.error, check.valid) {
        (_, true) => format!("{ip}:{port} answered"),
        (Some(error), false) => error.clone(),
        (None, false) => format!("{ip}:{port} did not answer"),
    };
    Ok(Json(Envelope {
        success: check.valid,
        message,
        data: Some(check),
    }))
}
