// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// `files` table queries.

use std::path::{Path, PathBuf};

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, info};

use printdock_core::error::{PrintDockError, Result};
use printdock_core::types::{FileId, FileRecord, Lifecycle, PrinterId};

use super::{conversion_error, db_error, parse_optional_timestamp, parse_timestamp};
use crate::repository::FileFilter;

const SELECT_COLUMNS: &str = "SELECT id, asset_id, file_name, pages, path, printed, synced,
        created_at, deleted_at FROM files";

pub(super) fn insert(conn: &Connection, record: &FileRecord) -> Result<()> {
    conn.execute(
        "INSERT INTO files (id, asset_id, file_name, pages, path, printed, synced,
         created_at, deleted_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            record.id.to_string(),
            record.asset_id.as_ref().map(PrinterId::as_str),
            record.file_name,
            record.pages,
            record.path.to_string_lossy(),
            record.printed,
            record.synced,
            record.created_at.to_rfc3339(),
            record.lifecycle.deleted_at().map(|at| at.to_rfc3339()),
        ],
    )
    .map_err(|e| db_error("insert file", e))?;

    info!(file_id = %record.id, path = %record.path.display(), "file record inserted");
    Ok(())
}

pub(super) fn get(conn: &Connection, id: FileId) -> Result<Option<FileRecord>> {
    conn.query_row(
        &format!("{SELECT_COLUMNS} WHERE id = ?1 AND deleted_at IS NULL"),
        params![id.to_string()],
        row_to_file,
    )
    .optional()
    .map_err(|e| db_error("get file", e))
}

pub(super) fn find_by_path(conn: &Connection, path: &Path) -> Result<Option<FileRecord>> {
    conn.query_row(
        &format!("{SELECT_COLUMNS} WHERE path = ?1 AND deleted_at IS NULL"),
        params![path.to_string_lossy()],
        row_to_file,
    )
    .optional()
    .map_err(|e| db_error("find file by path", e))
}

pub(super) fn list(conn: &Connection, filter: FileFilter) -> Result<Vec<FileRecord>> {
    let mut stmt = conn
        .prepare(&format!(
            "{SELECT_COLUMNS} WHERE deleted_at IS NULL
             AND (?1 IS NULL OR printed = ?1)
             AND (?2 IS NULL OR synced = ?2)
             ORDER BY created_at DESC"
        ))
        .map_err(|e| db_error("prepare list files", e))?;

    let records = stmt
        .query_map(params![filter.printed, filter.synced], row_to_file)
        .map_err(|e| db_error("query list files", e))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| db_error("collect rows", e))?;

    debug!(count = records.len(), ?filter, "listed files");
    Ok(records)
}

pub(super) fn mark_printed(conn: &Connection, id: FileId, asset_id: &PrinterId) -> Result<()> {
    let rows = conn
        .execute(
            "UPDATE files SET printed = 1, asset_id = ?1
             WHERE id = ?2 AND deleted_at IS NULL",
            params![asset_id.as_str(), id.to_string()],
        )
        .map_err(|e| db_error("mark printed", e))?;

    if rows == 0 {
        return Err(PrintDockError::NotFound(format!("file {id}")));
    }
    info!(file_id = %id, printer_id = %asset_id, "file marked printed");
    Ok(())
}

pub(super) fn mark_synced(conn: &Connection, id: FileId) -> Result<()> {
    let rows = conn
        .execute(
            "UPDATE files SET synced = 1 WHERE id = ?1 AND deleted_at IS NULL",
            params![id.to_string()],
        )
        .map_err(|e| db_error("mark synced", e))?;

    if rows == 0 {
        return Err(PrintDockError::NotFound(format!("file {id}")));
    }
    debug!(file_id = %id, "file marked synced");
    Ok(())
}

pub(super) fn soft_delete(conn: &Connection, id: FileId) -> Result<bool> {
    let rows = conn
        .execute(
            "UPDATE files SET deleted_at = ?1 WHERE id = ?2 AND deleted_at IS NULL",
            params![Utc::now().to_rfc3339(), id.to_string()],
        )
        .map_err(|e| db_error("soft delete file", e))?;

    if rows > 0 {
        info!(file_id = %id, "file record soft-deleted");
    }
    Ok(rows > 0)
}

pub(super) fn purge(conn: &Connection, id: FileId) -> Result<()> {
    conn.execute("DELETE FROM files WHERE id = ?1", params![id.to_string()])
        .map_err(|e| db_error("purge file", e))?;
    info!(file_id = %id, "file record purged");
    Ok(())
}

/// Column indices must match [`SELECT_COLUMNS`].
fn row_to_file(row: &rusqlite::Row<'_>) -> rusqlite::Result<FileRecord> {
    let id_str: String = row.get(0)?;
    let asset_id: Option<String> = row.get(1)?;
    let file_name: String = row.get(2)?;
    let pages: u32 = row.get(3)?;
    let path: String = row.get(4)?;
    let printed: bool = row.get(5)?;
    let synced: bool = row.get(6)?;
    let created_at: String = row.get(7)?;
    let deleted_at: Option<String> = row.get(8)?;

    let uuid = uuid::Uuid::parse_str(&id_str).map_err(|e| conversion_error(0, e))?;

    Ok(FileRecord {
        id: FileId(uuid),
        asset_id: asset_id.map(PrinterId),
        file_name,
        pages,
        path: PathBuf::from(path),
        printed,
        synced,
        created_at: parse_timestamp(7, &created_at)?,
        lifecycle: Lifecycle::from_deleted_at(parse_optional_timestamp(8, deleted_at)?),
    })
}
