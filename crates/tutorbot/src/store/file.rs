//! File-based record storage.
//!
//! Record sets are CSV files at `{root}/{dir}/{name}.csv`. Whole-set writes go
//! through a temp file and a rename; appends are serialized per file.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

use super::error::{StorageError, StorageResult};
use super::{AppendOutcome, Record, RecordDir, RecordKey, RecordStore, Table};
use crate::sync::KeyedLocks;

/// How long a file lock may sit unused before it is dropped.
const LOCK_IDLE: Duration = Duration::from_secs(3600);

/// CSV-file implementation of [`RecordStore`].
#[derive(Clone)]
pub struct FileRecordStore {
    root: PathBuf,
    /// Per-file locks to serialize read-check-append sequences.
    locks: KeyedLocks<PathBuf>,
}

impl FileRecordStore {
    /// Create a store rooted at `root` (the data directory).
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: KeyedLocks::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute location of a record set.
    pub fn path_for(&self, key: &RecordKey) -> PathBuf {
        self.root.join(key.relative_path())
    }

    /// Lock for one file. Idle locks of older files are dropped on the way.
    fn lock_for(&self, path: &Path) -> Arc<Mutex<()>> {
        self.locks.cleanup_stale(LOCK_IDLE);
        self.locks.get(path.to_path_buf())
    }

    async fn ensure_dir(&self, dir: RecordDir) -> StorageResult<()> {
        let path = self.root.join(dir.as_str());
        fs::create_dir_all(&path)
            .await
            .map_err(|e| StorageError::file_io(&path, e))
    }

    /// Read and parse a file; `Ok(None)` if it does not exist or is empty.
    async fn load(&self, path: &Path) -> StorageResult<Option<Table>> {
        let content = match fs::read(path).await {
            Ok(c) if c.is_empty() => return Ok(None),
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StorageError::file_io(path, e)),
        };
        parse_table(path, &content).map(Some)
    }
}

#[async_trait]
impl RecordStore for FileRecordStore {
    async fn write_table(&self, key: &RecordKey, table: &Table) -> StorageResult<PathBuf> {
        let path = self.path_for(key);
        let lock = self.lock_for(&path);
        let _guard = lock.lock().await;

        self.ensure_dir(key.dir).await?;

        let mut rows = Vec::with_capacity(table.rows.len() + 1);
        rows.push(table.header.clone());
        rows.extend(table.rows.iter().cloned());
        let bytes = encode_rows(&path, &rows)?;

        let temp_path = path.with_extension("csv.tmp");
        atomic_write_file(&temp_path, &path, &bytes).await?;

        debug!(path = %path.display(), rows = table.rows.len(), "Wrote record set");
        Ok(path)
    }

    async fn append_unique(
        &self,
        key: &RecordKey,
        record: &Record,
        unique_column: &str,
    ) -> StorageResult<AppendOutcome> {
        let path = self.path_for(key);
        let lock = self.lock_for(&path);
        let _guard = lock.lock().await;

        self.ensure_dir(key.dir).await?;

        let identity = record.get(unique_column).unwrap_or_default();
        let existing = self.load(&path).await?;

        let (header, write_header) = match &existing {
            Some(table) => {
                if table
                    .column(unique_column)
                    .is_some_and(|values| values.contains(&identity))
                {
                    debug!(path = %path.display(), identity, "Skipping duplicate record");
                    return Ok(AppendOutcome::Duplicate);
                }
                (table.header.clone(), false)
            }
            None => (record.columns().map(str::to_string).collect::<Vec<_>>(), true),
        };

        if let Some(column) = record.columns().find(|c| !header.iter().any(|h| h == c)) {
            return Err(StorageError::UnknownColumn {
                path,
                column: column.to_string(),
            });
        }

        let row: Vec<String> = header
            .iter()
            .map(|h| record.get(h).unwrap_or_default().to_string())
            .collect();

        let mut rows = Vec::with_capacity(2);
        if write_header {
            rows.push(header);
        }
        rows.push(row);
        let bytes = encode_rows(&path, &rows)?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| StorageError::file_io(&path, e))?;
        file.write_all(&bytes)
            .await
            .map_err(|e| StorageError::file_io(&path, e))?;
        file.flush()
            .await
            .map_err(|e| StorageError::file_io(&path, e))?;

        Ok(AppendOutcome::Appended)
    }

    async fn read_table(&self, key: &RecordKey) -> StorageResult<Table> {
        let path = self.path_for(key);
        let lock = self.lock_for(&path);
        let _guard = lock.lock().await;

        self.load(&path)
            .await?
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn list(&self, dir: RecordDir) -> StorageResult<Vec<String>> {
        let path = self.root.join(dir.as_str());
        let mut entries = match fs::read_dir(&path).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::file_io(&path, e)),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StorageError::file_io(&path, e))?
        {
            let file_path = entry.path();
            if file_path.extension().is_some_and(|ext| ext == "csv")
                && let Some(stem) = file_path.file_stem().and_then(|s| s.to_str())
            {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn encode_rows(path: &Path, rows: &[Vec<String>]) -> StorageResult<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .flexible(true)
        .from_writer(Vec::new());
    for row in rows {
        writer
            .write_record(row)
            .map_err(|e| StorageError::malformed(path, e))?;
    }
    writer
        .into_inner()
        .map_err(|e| StorageError::malformed(path, e.error()))
}

fn parse_table(path: &Path, content: &[u8]) -> StorageResult<Table> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(content);

    let header = reader
        .headers()
        .map_err(|e| StorageError::malformed(path, e))?
        .iter()
        .map(str::to_string)
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| StorageError::malformed(path, e))?;
        rows.push(record.iter().map(str::to_string).collect());
    }

    Ok(Table { header, rows })
}

/// Write `content` to `temp_path`, fsync it, then rename over `path`.
async fn atomic_write_file(temp_path: &Path, path: &Path, content: &[u8]) -> StorageResult<()> {
    let mut file = fs::File::create(temp_path)
        .await
        .map_err(|e| StorageError::file_io(temp_path, e))?;
    file.write_all(content)
        .await
        .map_err(|e| StorageError::file_io(temp_path, e))?;
    file.sync_all()
        .await
        .map_err(|e| StorageError::file_io(temp_path, e))?;
    drop(file);

    fs::rename(temp_path, path)
        .await
        .map_err(|e| StorageError::file_io(path, e))
}
