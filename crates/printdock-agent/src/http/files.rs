// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Tracked-file endpoints and the print request.

use std::io::ErrorKind;

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use serde::Deserialize;
use tracing::{info, instrument};

use printdock_core::error::PrintDockError;
use printdock_core::types::{FileId, FileRecord, PrinterId};
use printdock_print::PrintReceipt;
use printdock_store::FileFilter;

use super::envelope::{ApiResult, ok};
use crate::services::agent_services::AgentServices;

#[derive(Debug, Default, Deserialize)]
pub struct FileQuery {
    pub printed: Option<bool>,
    pub synced: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrintRequest {
    #[serde(alias = "file_id")]
    pub file_id: String,
    #[serde(alias = "asset_id")]
    pub asset_id: String,
}

fn parse_file_id(raw: &str) -> Result<FileId, PrintDockError> {
    FileId::parse(raw).ok_or_else(|| PrintDockError::Validation(format!("invalid file id '{raw}'")))
}

/// `GET /api/files?printed=&synced=`
pub async fn list_files(
    State(services): State<AgentServices>,
    query: Result<Query<FileQuery>, QueryRejection>,
) -> ApiResult<Vec<FileRecord>> {
    let Query(query) = query.map_err(|e| PrintDockError::Validation(e.body_text()))?;
    let files = services
        .files
        .list_files(FileFilter {
            printed: query.printed,
            synced: query.synced,
        })
        .await?;
    ok(format!("{} file(s)", files.len()), files)
}

/// `DELETE /api/files/:id`: remove the file from disk and drop its record.
#[instrument(skip_all)]
pub async fn delete_file(
    State(services): State<AgentServices>,
    Path(id): Path<String>,
) -> ApiResult<FileId> {
    let id = parse_file_id(&id)?;
    let record = services
        .files
        .get_file(id)
        .await?
        .ok_or_else(|| PrintDockError::NotFound(format!("file {id}")))?;

    match tokio::fs::remove_file(&record.path).await {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => return Err(PrintDockError::from(e).into()),
    }
    services.files.soft_delete_file(id).await?;
    info!(file_id = %id, "file deleted on request");
    ok("file deleted", id)
}

/// `POST /api/files/:id/synced`
#[instrument(skip_all)]
pub async fn mark_synced(
    State(services): State<AgentServices>,
    Path(id): Path<String>,
) -> ApiResult<FileId> {
    let id = parse_file_id(&id)?;
    services.files.mark_synced(id).await?;
    ok("file marked synced", id)
}

/// `POST /api/print` with `{ fileId, assetId }`.
#[instrument(skip_all)]
pub async fn print_file(
    State(services): State<AgentServices>,
    payload: Result<Json<PrintRequest>, JsonRejection>,
) -> ApiResult<PrintReceipt> {
    let Json(request) = payload.map_err(|e| PrintDockError::Validation(e.body_text()))?;
    let file_id = parse_file_id(&request.file_id)?;
    if request.asset_id.trim().is_empty() {
        return Err(PrintDockError::Validation("assetId is required".into()).into());
    }
    let printer_id = PrinterId::from(request.asset_id.trim());

    let receipt = services.dispatcher.print(file_id, &printer_id).await?;
    ok(format!("sent to {}", receipt.queue), receipt)
}
