// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Per-path ingestion.
//
// A path moves through: claim → stat → classify (root / extension) → dedup
// → wait until stable → count pages → register → materialize → notify.
// Every step that fails before materialization leaves the source where it
// is, so the next sweep retries it.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tracing::{debug, error, info, instrument, warn};

use printdock_core::cache::TtlCache;
use printdock_core::config::WatchConfig;
use printdock_core::error::{PrintDockError, Result};
use printdock_core::types::{FileId, FileRecord};
use printdock_document::naming::sanitize_file_name;
use printdock_document::pdf::reader;
use printdock_store::FileRepository;

use crate::notifier::PeerNotifier;

/// Stat polls before a still-changing file is given up on until the next
/// sweep.
const STABILITY_ATTEMPTS: u32 = 5;

/// What happened to one path.
#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    /// A new record was created and the file now lives at its canonical path.
    Registered(FileRecord),
    /// Already tracked under this id.
    AlreadyTracked(FileId),
    /// Not a PDF; the file was deleted.
    Discarded,
    /// Left in place and not registered.
    Rejected(String),
    /// Still being written after every stability check.
    Unstable,
    /// Registration failed; the source is kept for the next sweep.
    Failed(String),
    /// Another task is already working on this path.
    Busy,
    /// The path disappeared before it could be handled.
    Vanished,
}

/// The ingestion pipeline shared by the watcher and the sweeps.
pub struct IngestPipeline {
    files: Arc<dyn FileRepository>,
    config: WatchConfig,
    in_flight: TtlCache<PathBuf, ()>,
    notifier: Option<Arc<dyn PeerNotifier>>,
}

impl IngestPipeline {
    pub fn new(files: Arc<dyn FileRepository>, config: WatchConfig) -> Self {
        let in_flight = TtlCache::new(Duration::from_secs(config.in_flight_ttl_secs));
        Self {
            files,
            config,
            in_flight,
            notifier: None,
        }
    }

    /// Tell `notifier` about every registered file.
    pub fn with_notifier(mut self, notifier: Arc<dyn PeerNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn config(&self) -> &WatchConfig {
        &self.config
    }

    pub fn root(&self) -> &Path {
        &self.config.root
    }

    pub(crate) fn files(&self) -> &Arc<dyn FileRepository> {
        &self.files
    }

    /// Run `path` through the pipeline.  Safe to call repeatedly and from
    /// concurrent tasks: overlapping calls for one path return `Busy`.
    #[instrument(skip(self), fields(path = %path.display()))]
    pub async fn process_path(&self, path: &Path) -> Result<IngestOutcome> {
        if !self.in_flight.insert_if_absent(path.to_path_buf(), ()) {
            debug!("path already in flight");
            return Ok(IngestOutcome::Busy);
        }
        let outcome = self.process_claimed(path).await;
        self.in_flight.remove(&path.to_path_buf());
        self.in_flight.purge_expired();

        match &outcome {
            Ok(IngestOutcome::Registered(record)) => {
                info!(file_id = %record.id, pages = record.pages, name = %record.file_name, "file registered")
            }
            Ok(IngestOutcome::Failed(reason)) => warn!(%reason, "registration failed, source kept"),
            Ok(IngestOutcome::Rejected(reason)) => debug!(%reason, "file left in place"),
            Ok(other) => debug!(outcome = ?other, "path handled"),
            Err(e) => error!(error = %e, "ingestion error"),
        }
        outcome
    }

    async fn process_claimed(&self, path: &Path) -> Result<IngestOutcome> {
        let metadata = match tokio::fs::metadata(path).await {
            Ok(m) => m,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(IngestOutcome::Vanished),
            Err(e) => return Err(e.into()),
        };
        if !metadata.is_file() {
            return Ok(IngestOutcome::Rejected("not a regular file".into()));
        }

        if self.config.require_subdirectory && path.parent() == Some(self.config.root.as_path()) {
            return Ok(IngestOutcome::Rejected(
                "files must be dropped into a subfolder".into(),
            ));
        }

        if !is_pdf(path) {
            return match tokio::fs::remove_file(path).await {
                Ok(()) => {
                    info!(path = %path.display(), "non-PDF file deleted");
                    Ok(IngestOutcome::Discarded)
                }
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(IngestOutcome::Vanished),
                Err(e) => Err(e.into()),
            };
        }

        if let Some(id) = self.tracked_id(path).await? {
            return Ok(IngestOutcome::AlreadyTracked(id));
        }

        let source_len = match self.wait_until_stable(path).await? {
            Stability::Stable(len) => len,
            Stability::Changing => return Ok(IngestOutcome::Unstable),
            Stability::Gone => return Ok(IngestOutcome::Vanished),
        };

        let pages = match count_pages(path.to_path_buf()).await {
            Ok(pages) => pages,
            Err(e) => return Ok(IngestOutcome::Failed(format!("unreadable PDF: {e}"))),
        };

        let id = FileId::new();
        let Some(dir) = path.parent() else {
            return Ok(IngestOutcome::Rejected("path has no parent directory".into()));
        };
        let canonical = dir.join(id.canonical_file_name());
        let original_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let record = FileRecord::new(id, sanitize_file_name(&original_name), pages, canonical);

        // The canonical path stays claimed while the record exists without
        // its file, so the orphan check leaves it alone.
        self.in_flight.insert(record.path.clone(), ());
        let registered = self.register(path, &record, source_len).await;
        self.in_flight.remove(&record.path);
        if let Err(reason) = registered {
            return Ok(IngestOutcome::Failed(reason));
        }

        if let Err(e) = tokio::fs::remove_file(path).await {
            if e.kind() != ErrorKind::NotFound {
                error!(
                    path = %path.display(),
                    file_id = %record.id,
                    error = %e,
                    "original not removed after materialization"
                );
            }
        }

        self.notify(&record);
        Ok(IngestOutcome::Registered(record))
    }

    /// Insert `record` and copy `source` to its canonical path.  A failed
    /// copy removes the record again.
    async fn register(
        &self,
        source: &Path,
        record: &FileRecord,
        source_len: u64,
    ) -> std::result::Result<(), String> {
        if let Err(e) = self.files.insert_file(record).await {
            return Err(format!("record not stored: {e}"));
        }
        if let Err(e) = materialize(source, &record.path, source_len).await {
            self.roll_back(record).await;
            return Err(format!("copy failed: {e}"));
        }
        Ok(())
    }

    /// Whether `path` is claimed by a running registration.
    pub(crate) fn is_in_flight(&self, path: &Path) -> bool {
        self.in_flight.get(&path.to_path_buf()).is_some()
    }

    /// Id of the live record this path already belongs to: either the file
    /// is named after a tracked id, or a record claims the exact path.
    async fn tracked_id(&self, path: &Path) -> Result<Option<FileId>> {
        if let Some(id) = path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(FileId::parse)
        {
            if self.files.get_file(id).await?.is_some() {
                return Ok(Some(id));
            }
        }
        Ok(self.files.find_file_by_path(path).await?.map(|r| r.id))
    }

    /// Poll length and mtime until two consecutive reads agree.
    async fn wait_until_stable(&self, path: &Path) -> Result<Stability> {
        let interval = self.config.debounce();
        let mut previous = match snapshot(path).await? {
            Some(s) => s,
            None => return Ok(Stability::Gone),
        };
        for _ in 0..STABILITY_ATTEMPTS {
            tokio::time::sleep(interval).await;
            let current = match snapshot(path).await? {
                Some(s) => s,
                None => return Ok(Stability::Gone),
            };
            if current == previous {
                return Ok(Stability::Stable(current.0));
            }
            previous = current;
        }
        Ok(Stability::Changing)
    }

    async fn roll_back(&self, record: &FileRecord) {
        if let Err(e) = self.files.purge_file(record.id).await {
            error!(file_id = %record.id, error = %e, "registration not rolled back, record points at a missing file");
        }
        match tokio::fs::remove_file(&record.path).await {
            Ok(()) => debug!(path = %record.path.display(), "partial copy removed"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(path = %record.path.display(), error = %e, "partial copy not removed"),
        }
    }

    fn notify(&self, record: &FileRecord) {
        let Some(notifier) = self.notifier.clone() else {
            return;
        };
        let record = record.clone();
        tokio::spawn(async move {
            if let Err(e) = notifier.notify(&record).await {
                warn!(file_id = %record.id, error = %e, "companion not notified");
            }
        });
    }

    /// A watched file disappeared.  Unprinted records for canonical files are
    /// soft-deleted; printed ones are kept.  Returns whether a record was
    /// dropped.
    #[instrument(skip(self), fields(path = %path.display()))]
    pub async fn handle_removed(&self, path: &Path) -> Result<bool> {
        let Some(id) = path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(FileId::parse)
        else {
            return Ok(false);
        };
        let Some(record) = self.files.get_file(id).await? else {
            return Ok(false);
        };
        if record.path != path || record.printed {
            return Ok(false);
        }
        if tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Ok(false);
        }
        let deleted = self.files.soft_delete_file(id).await?;
        if deleted {
            info!(file_id = %id, "canonical file removed, record dropped");
        }
        Ok(deleted)
    }
}

enum Stability {
    Stable(u64),
    Changing,
    Gone,
}

fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"))
}

async fn snapshot(path: &Path) -> Result<Option<(u64, Option<SystemTime>)>> {
    match tokio::fs::metadata(path).await {
        Ok(m) => Ok(Some((m.len(), m.modified().ok()))),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn count_pages(path: PathBuf) -> Result<u32> {
    tokio::task::spawn_blocking(move || reader::inspect(&path))
        .await
        .map_err(|e| PrintDockError::PdfError(format!("page count task failed: {e}")))?
        .map(|summary| summary.pages)
}

/// Copy `source` to `target` and check the copy is complete.
async fn materialize(source: &Path, target: &Path, expected: u64) -> Result<()> {
    let copied = tokio::fs::copy(source, target).await?;
    let written = tokio::fs::metadata(target).await?.len();
    if copied != expected || written != expected {
        return Err(PrintDockError::Io(std::io::Error::other(format!(
            "expected {expected} bytes, copied {copied}, found {written}"
        ))));
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use printdock_document::pdf::writer::blank_pdf;
    use printdock_store::{FileFilter, SqliteStore};
    use std::sync::Mutex;

    pub(crate) fn watch_config(root: &Path) -> WatchConfig {
        WatchConfig {
            root: root.to_path_buf(),
            debounce_ms: 10,
            ..WatchConfig::default()
        }
    }

    pub(crate) fn drop_pdf(dir: &Path, name: &str, pages: u32) -> PathBuf {
        std::fs::create_dir_all(dir).expect("mkdir");
        let path = dir.join(name);
        std::fs::write(&path, blank_pdf(pages).expect("pdf")).expect("write pdf");
        path
    }

    #[derive(Default)]
    struct RecordingNotifier {
        seen: Mutex<Vec<FileId>>,
    }

    #[async_trait::async_trait]
    impl PeerNotifier for RecordingNotifier {
        async fn notify(&self, record: &FileRecord) -> Result<()> {
            self.seen.lock().expect("lock").push(record.id);
            Ok(())
        }
    }

    fn pipeline(root: &Path) -> (Arc<SqliteStore>, IngestPipeline) {
        let store = Arc::new(SqliteStore::open_in_memory().expect("store"));
        let pipeline = IngestPipeline::new(store.clone(), watch_config(root));
        (store, pipeline)
    }

    fn registered(outcome: IngestOutcome) -> FileRecord {
        match outcome {
            IngestOutcome::Registered(record) => record,
            other => panic!("expected registration, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn report_with_three_pages_is_registered() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (store, pipeline) = pipeline(dir.path());
        let tenant = dir.path().join("tenant-a");
        let source = drop_pdf(&tenant, "report.pdf", 3);

        let record = registered(pipeline.process_path(&source).await.expect("process"));

        assert_eq!(record.pages, 3);
        assert_eq!(record.file_name, "report.pdf");
        assert_eq!(record.path, tenant.join(record.id.canonical_file_name()));
        assert!(record.path.exists());
        assert!(!source.exists());
        assert!(!record.printed);

        let stored = store.get_file(record.id).await.expect("get").expect("stored");
        assert_eq!(stored.path, record.path);
    }

    #[tokio::test]
    async fn reprocessing_is_a_no_op() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (store, pipeline) = pipeline(dir.path());
        let source = drop_pdf(&dir.path().join("t"), "a.pdf", 1);

        let record = registered(pipeline.process_path(&source).await.expect("first"));
        assert_eq!(
            pipeline.process_path(&record.path).await.expect("canonical"),
            IngestOutcome::AlreadyTracked(record.id)
        );
        assert_eq!(
            pipeline.process_path(&source).await.expect("original"),
            IngestOutcome::Vanished
        );

        let all = store.list_files(FileFilter::default()).await.expect("list");
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn decorated_names_are_sanitized() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (_store, pipeline) = pipeline(dir.path());
        let source = drop_pdf(
            &dir.path().join("t"),
            "Microsoft Word - Relat\u{00c3}\u{00b3}rio_final-job_42.pdf",
            2,
        );

        let record = registered(pipeline.process_path(&source).await.expect("process"));
        assert_eq!(record.file_name, "Relat\u{00f3}rio final.pdf");
    }

    #[tokio::test]
    async fn non_pdf_is_deleted_without_record() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (store, pipeline) = pipeline(dir.path());
        let tenant = dir.path().join("t");
        std::fs::create_dir_all(&tenant).expect("mkdir");
        let junk = tenant.join("notes.txt");
        std::fs::write(&junk, b"hello").expect("write");

        assert_eq!(
            pipeline.process_path(&junk).await.expect("process"),
            IngestOutcome::Discarded
        );
        assert!(!junk.exists());
        assert!(store.list_files(FileFilter::default()).await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn uppercase_extension_counts_as_pdf() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (_store, pipeline) = pipeline(dir.path());
        let source = drop_pdf(&dir.path().join("t"), "SCAN.PDF", 1);

        let record = registered(pipeline.process_path(&source).await.expect("process"));
        assert_eq!(record.file_name, "SCAN.PDF");
    }

    #[tokio::test]
    async fn root_level_files_are_left_alone() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (store, pipeline) = pipeline(dir.path());
        let source = drop_pdf(dir.path(), "stray.pdf", 1);

        let outcome = pipeline.process_path(&source).await.expect("process");
        assert!(matches!(outcome, IngestOutcome::Rejected(_)));
        assert!(source.exists());
        assert!(store.list_files(FileFilter::default()).await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn root_level_files_accepted_without_tenant_layout() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Arc::new(SqliteStore::open_in_memory().expect("store"));
        let config = WatchConfig {
            require_subdirectory: false,
            ..watch_config(dir.path())
        };
        let pipeline = IngestPipeline::new(store, config);
        let source = drop_pdf(dir.path(), "flat.pdf", 1);

        let record = registered(pipeline.process_path(&source).await.expect("process"));
        assert_eq!(record.path.parent(), Some(dir.path()));
    }

    #[tokio::test]
    async fn unreadable_pdf_is_kept_for_the_next_sweep() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (store, pipeline) = pipeline(dir.path());
        let tenant = dir.path().join("t");
        std::fs::create_dir_all(&tenant).expect("mkdir");
        let broken = tenant.join("broken.pdf");
        std::fs::write(&broken, b"%PDF-1.7 truncated").expect("write");

        let outcome = pipeline.process_path(&broken).await.expect("process");
        assert!(matches!(outcome, IngestOutcome::Failed(_)));
        assert!(broken.exists());
        assert!(store.list_files(FileFilter::default()).await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn failed_copy_purges_the_record() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (store, pipeline) = pipeline(dir.path());
        let source = drop_pdf(&dir.path().join("t"), "a.pdf", 1);
        let id = FileId::new();
        let record = FileRecord::new(id, "a.pdf".into(), 1, dir.path().join("missing").join("x.pdf"));
        store.insert_file(&record).await.expect("insert");

        // Target directory does not exist, so the copy fails.
        let err = materialize(&source, &record.path, 1).await;
        assert!(err.is_err());
        pipeline.roll_back(&record).await;

        assert!(store.get_file(id).await.expect("get").is_none());
        assert!(source.exists());
    }

    #[tokio::test]
    async fn materialize_detects_short_copies() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source = dir.path().join("a.pdf");
        std::fs::write(&source, b"12345").expect("write");
        let target = dir.path().join("b.pdf");

        assert!(materialize(&source, &target, 6).await.is_err());
        assert!(materialize(&source, &target, 5).await.is_ok());
    }

    #[tokio::test]
    async fn claimed_path_is_busy() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (_store, pipeline) = pipeline(dir.path());
        let source = drop_pdf(&dir.path().join("t"), "a.pdf", 1);

        assert!(pipeline.in_flight.insert_if_absent(source.clone(), ()));
        assert_eq!(
            pipeline.process_path(&source).await.expect("process"),
            IngestOutcome::Busy
        );
        assert!(source.exists());
    }

    #[tokio::test]
    async fn file_named_after_tracked_id_is_skipped() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (store, pipeline) = pipeline(dir.path());
        let tenant = dir.path().join("t");
        let id = FileId::new();
        let elsewhere = dir.path().join("u").join(id.canonical_file_name());
        store
            .insert_file(&FileRecord::new(id, "x.pdf".into(), 1, elsewhere))
            .await
            .expect("insert");
        let copy = drop_pdf(&tenant, &id.canonical_file_name(), 1);

        assert_eq!(
            pipeline.process_path(&copy).await.expect("process"),
            IngestOutcome::AlreadyTracked(id)
        );
        assert!(copy.exists());
    }

    #[tokio::test]
    async fn registration_notifies_the_companion() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Arc::new(SqliteStore::open_in_memory().expect("store"));
        let notifier = Arc::new(RecordingNotifier::default());
        let pipeline =
            IngestPipeline::new(store, watch_config(dir.path())).with_notifier(notifier.clone());
        let source = drop_pdf(&dir.path().join("t"), "a.pdf", 1);

        let record = registered(pipeline.process_path(&source).await.expect("process"));
        for _ in 0..50 {
            if !notifier.seen.lock().expect("lock").is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(*notifier.seen.lock().expect("lock"), vec![record.id]);
    }

    #[tokio::test]
    async fn removal_drops_unprinted_records_only() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (store, pipeline) = pipeline(dir.path());
        let tenant = dir.path().join("t");
        let first = registered(
            pipeline
                .process_path(&drop_pdf(&tenant, "a.pdf", 1))
                .await
                .expect("a"),
        );
        let second = registered(
            pipeline
                .process_path(&drop_pdf(&tenant, "b.pdf", 1))
                .await
                .expect("b"),
        );
        store
            .mark_printed(second.id, &printdock_core::types::PrinterId::from("p1"))
            .await
            .expect("mark");

        std::fs::remove_file(&first.path).expect("rm a");
        std::fs::remove_file(&second.path).expect("rm b");

        assert!(pipeline.handle_removed(&first.path).await.expect("a"));
        assert!(!pipeline.handle_removed(&second.path).await.expect("b"));
        assert!(store.get_file(first.id).await.expect("get").is_none());
        assert!(store.get_file(second.id).await.expect("get").is_some());
        assert!(!pipeline.handle_removed(&tenant.join("other.pdf")).await.expect("untracked"));
    }
}
