// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// `printers` table queries.

use std::net::IpAddr;

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, info};

use printdock_core::error::{PrintDockError, Result};
use printdock_core::types::{Lifecycle, PrinterId, PrinterRecord, PrinterStatus, Protocol};

use super::{conversion_error, db_error, parse_optional_timestamp, parse_timestamp};

const SELECT_COLUMNS: &str = "SELECT id, name, status, protocol, driver, uri, description,
        location, ip_address, mac_address, port, created_at, updated_at, deleted_at
        FROM printers";

pub(super) fn get(conn: &Connection, id: &PrinterId) -> Result<Option<PrinterRecord>> {
    conn.query_row(
        &format!("{SELECT_COLUMNS} WHERE id = ?1 AND deleted_at IS NULL"),
        params![id.as_str()],
        row_to_printer,
    )
    .optional()
    .map_err(|e| db_error("get printer", e))
}

pub(super) fn find_by_name(conn: &Connection, name: &str) -> Result<Option<PrinterRecord>> {
    conn.query_row(
        &format!("{SELECT_COLUMNS} WHERE name = ?1 AND deleted_at IS NULL"),
        params![name],
        row_to_printer,
    )
    .optional()
    .map_err(|e| db_error("find printer by name", e))
}

pub(super) fn list(conn: &Connection) -> Result<Vec<PrinterRecord>> {
    let mut stmt = conn
        .prepare(&format!(
            "{SELECT_COLUMNS} WHERE deleted_at IS NULL ORDER BY name ASC"
        ))
        .map_err(|e| db_error("prepare list printers", e))?;

    let printers = stmt
        .query_map([], row_to_printer)
        .map_err(|e| db_error("query list printers", e))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| db_error("collect rows", e))?;

    debug!(count = printers.len(), "listed printers");
    Ok(printers)
}

/// Insert, reviving a soft-deleted row with the same id.  The upsert's `WHERE`
/// leaves an active row untouched, which shows up as zero changed rows.
pub(super) fn insert(conn: &Connection, record: &PrinterRecord) -> Result<()> {
    let rows = conn
        .execute(
            "INSERT INTO printers (id, name, status, protocol, driver, uri, description,
             location, ip_address, mac_address, port, created_at, updated_at, deleted_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, NULL)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                status = excluded.status,
                protocol = excluded.protocol,
                driver = excluded.driver,
                uri = excluded.uri,
                description = excluded.description,
                location = excluded.location,
                ip_address = excluded.ip_address,
                mac_address = excluded.mac_address,
                port = excluded.port,
                created_at = excluded.created_at,
                updated_at = excluded.updated_at,
                deleted_at = NULL
             WHERE printers.deleted_at IS NOT NULL",
            params![
                record.id.as_str(),
                record.name,
                record.status.as_str(),
                record.protocol.as_str(),
                record.driver,
                record.uri,
                record.description,
                record.location,
                record.ip_address.map(|ip| ip.to_string()),
                record.mac_address,
                record.port,
                record.created_at.to_rfc3339(),
                record.updated_at.to_rfc3339(),
            ],
        )
        .map_err(|e| db_error("insert printer", e))?;

    if rows == 0 {
        return Err(PrintDockError::Conflict(format!(
            "printer {} already exists",
            record.id
        )));
    }
    info!(printer_id = %record.id, name = %record.name, "printer record inserted");
    Ok(())
}

pub(super) fn update(conn: &Connection, record: &PrinterRecord) -> Result<()> {
    let rows = conn
        .execute(
            "UPDATE printers SET name = ?1, status = ?2, protocol = ?3, driver = ?4,
                uri = ?5, description = ?6, location = ?7, ip_address = ?8,
                mac_address = ?9, port = ?10, updated_at = ?11
             WHERE id = ?12 AND deleted_at IS NULL",
            params![
                record.name,
                record.status.as_str(),
                record.protocol.as_str(),
                record.driver,
                record.uri,
                record.description,
                record.location,
                record.ip_address.map(|ip| ip.to_string()),
                record.mac_address,
                record.port,
                record.updated_at.to_rfc3339(),
                record.id.as_str(),
            ],
        )
        .map_err(|e| db_error("update printer", e))?;

    if rows == 0 {
        return Err(PrintDockError::NotFound(format!("printer {}", record.id)));
    }
    info!(printer_id = %record.id, name = %record.name, "printer record updated");
    Ok(())
}

pub(super) fn soft_delete(conn: &Connection, id: &PrinterId) -> Result<bool> {
    let rows = conn
        .execute(
            "UPDATE printers SET deleted_at = ?1 WHERE id = ?2 AND deleted_at IS NULL",
            params![Utc::now().to_rfc3339(), id.as_str()],
        )
        .map_err(|e| db_error("soft delete printer", e))?;

    if rows > 0 {
        info!(printer_id = %id, "printer record soft-deleted");
    }
    Ok(rows > 0)
}

/// Column indices must match [`SELECT_COLUMNS`].
fn row_to_printer(row: &rusqlite::Row<'_>) -> rusqlite::Result<PrinterRecord> {
    let id: String = row.get(0)?;
    let name: String = row.get(1)?;
    let status: String = row.get(2)?;
    let protocol: String = row.get(3)?;
    let driver: String = row.get(4)?;
    let uri: Option<String> = row.get(5)?;
    let description: Option<String> = row.get(6)?;
    let location: Option<String> = row.get(7)?;
    let ip_address: Option<String> = row.get(8)?;
    let mac_address: Option<String> = row.get(9)?;
    let port: Option<u16> = row.get(10)?;
    let created_at: String = row.get(11)?;
    let updated_at: String = row.get(12)?;
    let deleted_at: Option<String> = row.get(13)?;

    let status = status
        .parse::<PrinterStatus>()
        .map_err(|e| conversion_error(2, e))?;
    let protocol = protocol
        .parse::<Protocol>()
        .map_err(|e| conversion_error(3, e))?;
    let ip_address = ip_address
        .map(|raw| raw.parse::<IpAddr>())
        .transpose()
        .map_err(|e| conversion_error(8, e))?;

    Ok(PrinterRecord {
        id: PrinterId(id),
        name,
        status,
        protocol,
        driver,
        uri,
        description,
        location,
        ip_address,
        mac_address,
        port,
        created_at: parse_timestamp(11, &created_at)?,
        updated_at: parse_timestamp(12, &updated_at)?,
        lifecycle: Lifecycle::from_deleted_at(parse_optional_timestamp(13, deleted_at)?),
    })
}
