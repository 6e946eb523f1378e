// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// SQLite implementation of the repository traits.
//
// `rusqlite` is synchronous, so the connection lives behind a mutex and every
// trait method hops onto the blocking pool with `spawn_blocking`.

mod files;
mod printers;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tracing::{debug, info, instrument};

use printdock_core::error::{PrintDockError, Result};
use printdock_core::types::{FileId, FileRecord, PrinterId, PrinterRecord};

use crate::repository::{FileFilter, FileRepository, PrinterRepository};

/// Schema for both tables.  Partial unique indexes enforce "one active record
/// per canonical path" and "one active printer per queue name".
const SCHEMA_SQL: &str = r#"
    CREATE TABLE IF NOT EXISTS files (
        id TEXT PRIMARY KEY,
        asset_id TEXT,
        file_name TEXT NOT NULL,
        pages INTEGER NOT NULL,
        path TEXT NOT NULL,
        printed INTEGER NOT NULL DEFAULT 0,
        synced INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        deleted_at TEXT
    );
    CREATE UNIQUE INDEX IF NOT EXISTS files_active_path
        ON files(path) WHERE deleted_at IS NULL;

    CREATE TABLE IF NOT EXISTS printers (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        status TEXT NOT NULL,
        protocol TEXT NOT NULL,
        driver TEXT NOT NULL,
        uri TEXT,
        description TEXT,
        location TEXT,
        ip_address TEXT,
        mac_address TEXT,
        port INTEGER,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        deleted_at TEXT
    );
    CREATE UNIQUE INDEX IF NOT EXISTS printers_active_name
        ON printers(name) WHERE deleted_at IS NULL;
"#;

/// File and printer store backed by one SQLite database.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    path: Option<PathBuf>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").field("path", &self.path).finish()
    }
}

impl SqliteStore {
    /// Open (or create) the database at `path` in WAL mode.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)
            .map_err(|e| PrintDockError::Database(format!("open: {e}")))?;

        // The HTTP handlers read while the watcher writes.
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| PrintDockError::Database(format!("WAL pragma: {e}")))?;

        conn.execute_batch(SCHEMA_SQL)
            .map_err(|e| PrintDockError::Database(format!("create schema: {e}")))?;

        info!("store database opened");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: Some(path.to_path_buf()),
        })
    }

    /// Open an in-memory database (useful for tests).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| PrintDockError::Database(format!("open in-memory: {e}")))?;

        conn.execute_batch(SCHEMA_SQL)
            .map_err(|e| PrintDockError::Database(format!("create schema: {e}")))?;

        debug!("in-memory store database opened");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: None,
        })
    }

    /// Run `op` against the connection on the blocking pool.
    async fn blocking<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock().unwrap_or_else(PoisonError::into_inner);
            op(&guard)
        })
        .await
        .map_err(|e| PrintDockError::Database(format!("store task failed: {e}")))?
    }
}

// ---------------------------------------------------------------------------
// Trait implementations
// ---------------------------------------------------------------------------

#[async_trait]
impl FileRepository for SqliteStore {
    #[instrument(skip(self, record), fields(file_id = %record.id))]
    async fn insert_file(&self, record: &FileRecord) -> Result<()> {
        let record = record.clone();
        self.blocking(move |conn| files::insert(conn, &record)).await
    }

    async fn get_file(&self, id: FileId) -> Result<Option<FileRecord>> {
        self.blocking(move |conn| files::get(conn, id)).await
    }

    async fn find_file_by_path(&self, path: &Path) -> Result<Option<FileRecord>> {
        let path = path.to_path_buf();
        self.blocking(move |conn| files::find_by_path(conn, &path)).await
    }

    async fn list_files(&self, filter: FileFilter) -> Result<Vec<FileRecord>> {
        self.blocking(move |conn| files::list(conn, filter)).await
    }

    #[instrument(skip(self), fields(file_id = %id, printer_id = %asset_id))]
    async fn mark_printed(&self, id: FileId, asset_id: &PrinterId) -> Result<()> {
        let asset_id = asset_id.clone();
        self.blocking(move |conn| files::mark_printed(conn, id, &asset_id))
            .await
    }

    #[instrument(skip(self), fields(file_id = %id))]
    async fn mark_synced(&self, id: FileId) -> Result<()> {
        self.blocking(move |conn| files::mark_synced(conn, id)).await
    }

    #[instrument(skip(self), fields(file_id = %id))]
    async fn soft_delete_file(&self, id: FileId) -> Result<bool> {
        self.blocking(move |conn| files::soft_delete(conn, id)).await
    }

    #[instrument(skip(self), fields(file_id = %id))]
    async fn purge_file(&self, id: FileId) -> Result<()> {
        self.blocking(move |conn| files::purge(conn, id)).await
    }
}

#[async_trait]
impl PrinterRepository for SqliteStore {
    async fn get_printer(&self, id: &PrinterId) -> Result<Option<PrinterRecord>> {
        let id = id.clone();
        self.blocking(move |conn| printers::get(conn, &id)).await
    }

    async fn find_printer_by_name(&self, name: &str) -> Result<Option<PrinterRecord>> {
        let name = name.to_owned();
        self.blocking(move |conn| printers::find_by_name(conn, &name))
            .await
    }

    async fn list_printers(&self) -> Result<Vec<PrinterRecord>> {
        self.blocking(printers::list).await
    }

    #[instrument(skip(self, record), fields(printer_id = %record.id, name = %record.name))]
    async fn insert_printer(&self, record: &PrinterRecord) -> Result<()> {
        let record = record.clone();
        self.blocking(move |conn| printers::insert(conn, &record)).await
    }

    #[instrument(skip(self, record), fields(printer_id = %record.id, name = %record.name))]
    async fn update_printer(&self, record: &PrinterRecord) -> Result<()> {
        let record = record.clone();
        self.blocking(move |conn| printers::update(conn, &record)).await
    }

    #[instrument(skip(self), fields(printer_id = %id))]
    async fn soft_delete_printer(&self, id: &PrinterId) -> Result<bool> {
        let id = id.clone();
        self.blocking(move |conn| printers::soft_delete(conn, &id)).await
    }
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// Map a rusqlite error, turning constraint violations into `Conflict`.
fn db_error(context: &str, err: rusqlite::Error) -> PrintDockError {
    if let rusqlite::Error::SqliteFailure(ref failure, _) = err {
        if failure.code == rusqlite::ErrorCode::ConstraintViolation {
            return PrintDockError::Conflict(format!("{context}: {err}"));
        }
    }
    PrintDockError::Database(format!("{context}: {err}"))
}

fn conversion_error<E>(column: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(err))
}

fn parse_timestamp(column: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(column, e))
}

fn parse_optional_timestamp(
    column: usize,
    raw: Option<String>,
) -> rusqlite::Result<Option<DateTime<Utc>>> {
    raw.map(|raw| parse_timestamp(column, &raw)).transpose()
}
