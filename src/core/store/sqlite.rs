//! SQLite store backend for persistent storage.

use super::{
    days_to_secs, file_mtime, CacheStore, FileRecord, OperationType, ProcessingStatus,
    RecordStore, StoreStats,
};
use crate::core::metadata::Metadata;
use crate::error::StoreError;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

const RECORD_COLUMNS: &str = "source_path, dest_path, raw_backup_path, sha256_hash, \
     perceptual_hash, file_size, file_mtime, created_date, processed_date, camera_model, \
     lens_model, device_code, operation_type, processing_status";

const UPSERT_RECORD: &str = "INSERT OR REPLACE INTO file_records
     (source_path, dest_path, raw_backup_path, sha256_hash, perceptual_hash,
      file_size, file_mtime, created_date, processed_date, camera_model,
      lens_model, device_code, operation_type, processing_status)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)";

/// SQLite-backed persistent store
///
/// Uses WAL (Write-Ahead Logging) mode. Every operation takes the connection
/// lock for its own scope, so no transaction spans more than one call.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl SqliteStore {
    /// Open or create a store at the given path
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| StoreError::OpenFailed {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                })?;
            }
        }

        let conn = Connection::open(path).map_err(|e| StoreError::OpenFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        info!(path = %path.display(), "opened ingest store");

        let store = Self {
            conn: Mutex::new(conn),
            db_path: path.to_path_buf(),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Path of the backing database file
    pub fn path(&self) -> &Path {
        &self.db_path
    }

    /// Create tables and indexes if missing. Safe to call repeatedly.
    pub fn init_schema(&self) -> Result<(), StoreError> {
        let conn = self.lock()?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS file_records (
                id INTEGER PRIMARY KEY,
                source_path TEXT NOT NULL,
                dest_path TEXT,
                raw_backup_path TEXT,
                sha256_hash TEXT NOT NULL,
                perceptual_hash TEXT,
                file_size INTEGER NOT NULL,
                file_mtime INTEGER NOT NULL,
                created_date TEXT NOT NULL,
                processed_date TEXT NOT NULL,
                camera_model TEXT,
                lens_model TEXT,
                device_code TEXT,
                operation_type TEXT NOT NULL,
                processing_status TEXT NOT NULL DEFAULT 'completed',
                UNIQUE(sha256_hash)
            );

            CREATE TABLE IF NOT EXISTS metadata_cache (
                id INTEGER PRIMARY KEY,
                file_path TEXT NOT NULL,
                file_mtime INTEGER NOT NULL,
                payload TEXT NOT NULL,
                cached_at INTEGER NOT NULL,
                UNIQUE(file_path, file_mtime)
            );

            CREATE TABLE IF NOT EXISTS directory_cache (
                id INTEGER PRIMARY KEY,
                directory_path TEXT NOT NULL,
                scan_timestamp INTEGER NOT NULL,
                file_count INTEGER NOT NULL,
                last_modified INTEGER NOT NULL,
                UNIQUE(directory_path)
            );

            CREATE INDEX IF NOT EXISTS idx_sha256 ON file_records(sha256_hash);
            CREATE INDEX IF NOT EXISTS idx_perceptual ON file_records(perceptual_hash);
            CREATE INDEX IF NOT EXISTS idx_size_mtime ON file_records(file_size, file_mtime);
            CREATE INDEX IF NOT EXISTS idx_device_date ON file_records(device_code, created_date);
            CREATE INDEX IF NOT EXISTS idx_source_mtime ON file_records(source_path, file_mtime);
            CREATE INDEX IF NOT EXISTS idx_metadata_path_mtime ON metadata_cache(file_path, file_mtime);
            CREATE INDEX IF NOT EXISTS idx_dir_path ON directory_cache(directory_path);",
        )?;

        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned {
            path: self.db_path.clone(),
        })
    }

    fn query_records(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<FileRecord>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(sql)?;
        let records = stmt
            .query_map(params, record_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    fn count(conn: &Connection, sql: &str) -> Result<usize, StoreError> {
        let count: i64 = conn.query_row(sql, [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

fn path_str(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn text_conversion_error(
    idx: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

#[derive(Debug)]
struct UnknownVariant(String);

impl std::fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown value {:?}", self.0)
    }
}

impl std::error::Error for UnknownVariant {}

fn timestamp_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| text_conversion_error(idx, e))
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<FileRecord> {
    let operation: String = row.get(12)?;
    let status: String = row.get(13)?;

    Ok(FileRecord {
        source_path: PathBuf::from(row.get::<_, String>(0)?),
        dest_path: row.get::<_, Option<String>>(1)?.map(PathBuf::from),
        raw_backup_path: row.get::<_, Option<String>>(2)?.map(PathBuf::from),
        sha256: row.get(3)?,
        perceptual_hash: row.get(4)?,
        file_size: row.get::<_, i64>(5)? as u64,
        file_mtime: row.get(6)?,
        created_at: timestamp_at(row, 7)?,
        processed_at: timestamp_at(row, 8)?,
        camera_model: row.get(9)?,
        lens_model: row.get(10)?,
        device_code: row.get(11)?,
        operation_type: OperationType::parse(&operation)
            .ok_or_else(|| text_conversion_error(12, UnknownVariant(operation.clone())))?,
        processing_status: ProcessingStatus::parse(&status)
            .ok_or_else(|| text_conversion_error(13, UnknownVariant(status.clone())))?,
    })
}

fn upsert(conn: &Connection, record: &FileRecord) -> rusqlite::Result<usize> {
    conn.execute(
        UPSERT_RECORD,
        params![
            path_str(&record.source_path),
            record.dest_path.as_deref().map(path_str),
            record.raw_backup_path.as_deref().map(path_str),
            record.sha256,
            record.perceptual_hash,
            record.file_size as i64,
            record.file_mtime,
            record.created_at.to_rfc3339(),
            record.processed_at.to_rfc3339(),
            record.camera_model,
            record.lens_model,
            record.device_code,
            record.operation_type.as_str(),
            record.processing_status.as_str(),
        ],
    )
}

impl RecordStore for SqliteStore {
    fn record_by_hash(&self, sha256: &str) -> Result<Option<FileRecord>, StoreError> {
        let conn = self.lock()?;
        let record = conn
            .query_row(
                &format!("SELECT {RECORD_COLUMNS} FROM file_records WHERE sha256_hash = ?1"),
                [sha256],
                record_from_row,
            )
            .optional()?;
        Ok(record)
    }

    fn records_by_size_range(&self, min: u64, max: u64) -> Result<Vec<FileRecord>, StoreError> {
        self.query_records(
            &format!(
                "SELECT {RECORD_COLUMNS} FROM file_records
                 WHERE file_size BETWEEN ?1 AND ?2 ORDER BY id"
            ),
            params![min as i64, max as i64],
        )
    }

    fn records_by_perceptual_hash(&self, hash: &str) -> Result<Vec<FileRecord>, StoreError> {
        self.query_records(
            &format!(
                "SELECT {RECORD_COLUMNS} FROM file_records
                 WHERE perceptual_hash = ?1 ORDER BY id"
            ),
            [hash],
        )
    }

    fn record_by_path_and_mtime(
        &self,
        path: &Path,
        mtime: i64,
    ) -> Result<Option<FileRecord>, StoreError> {
        let conn = self.lock()?;
        let record = conn
            .query_row(
                &format!(
                    "SELECT {RECORD_COLUMNS} FROM file_records
                     WHERE source_path = ?1 AND file_mtime = ?2 ORDER BY id LIMIT 1"
                ),
                params![path_str(path), mtime],
                record_from_row,
            )
            .optional()?;
        Ok(record)
    }

    fn is_unchanged(&self, path: &Path, mtime: i64) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let found = conn
            .query_row(
                "SELECT 1 FROM file_records WHERE source_path = ?1 AND file_mtime = ?2 LIMIT 1",
                params![path_str(path), mtime],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn insert_record(&self, record: &FileRecord) -> Result<(), StoreError> {
        let conn = self.lock()?;
        upsert(&conn, record)?;
        Ok(())
    }

    fn batch_insert_records(&self, records: &[FileRecord]) -> Result<(), StoreError> {
        if records.is_empty() {
            return Ok(());
        }

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        for record in records {
            upsert(&tx, record)?;
        }
        tx.commit()?;

        debug!(count = records.len(), "committed record batch");
        Ok(())
    }

    fn stats(&self) -> Result<StoreStats, StoreError> {
        let conn = self.lock()?;

        Ok(StoreStats {
            file_records: Self::count(&conn, "SELECT COUNT(*) FROM file_records")?,
            metadata_cache_entries: Self::count(&conn, "SELECT COUNT(*) FROM metadata_cache")?,
            directory_cache_entries: Self::count(&conn, "SELECT COUNT(*) FROM directory_cache")?,
            unique_devices: Self::count(
                &conn,
                "SELECT COUNT(DISTINCT device_code) FROM file_records",
            )?,
            duplicate_groups: Self::count(
                &conn,
                "SELECT COUNT(*) FROM (
                    SELECT sha256_hash FROM file_records
                    GROUP BY sha256_hash HAVING COUNT(*) > 1
                )",
            )?,
            records_with_perceptual_hash: Self::count(
                &conn,
                "SELECT COUNT(*) FROM file_records WHERE perceptual_hash IS NOT NULL",
            )?,
        })
    }
}

impl CacheStore for SqliteStore {
    fn cached_metadata(&self, path: &Path) -> Result<Option<Metadata>, StoreError> {
        let mtime = match file_mtime(path) {
            Ok(mtime) => mtime,
            Err(_) => return Ok(None),
        };

        let conn = self.lock()?;
        let payload: Option<String> = conn
            .query_row(
                "SELECT payload FROM metadata_cache WHERE file_path = ?1 AND file_mtime = ?2",
                params![path_str(path), mtime],
                |row| row.get(0),
            )
            .optional()?;

        let Some(payload) = payload else {
            return Ok(None);
        };

        match serde_json::from_str(&payload) {
            Ok(metadata) => Ok(Some(metadata)),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring corrupt cached metadata");
                Ok(None)
            }
        }
    }

    fn cache_metadata(&self, path: &Path, metadata: &Metadata) -> Result<(), StoreError> {
        let mtime = match file_mtime(path) {
            Ok(mtime) => mtime,
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "cannot read mtime, skipping metadata cache"
                );
                return Ok(());
            }
        };

        let payload = serde_json::to_string(metadata)
            .map_err(|e| StoreError::SerializationFailed(e.to_string()))?;

        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO metadata_cache (file_path, file_mtime, payload, cached_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![path_str(path), mtime, payload, Utc::now().timestamp()],
        )?;
        Ok(())
    }

    fn is_directory_changed(&self, dir: &Path) -> Result<bool, StoreError> {
        let current = match file_mtime(dir) {
            Ok(mtime) => mtime,
            Err(_) => return Ok(true),
        };

        let conn = self.lock()?;
        let cached: Option<i64> = conn
            .query_row(
                "SELECT last_modified FROM directory_cache WHERE directory_path = ?1",
                [path_str(dir)],
                |row| row.get(0),
            )
            .optional()?;

        Ok(cached.map_or(true, |last| current > last))
    }

    fn update_directory_cache(&self, dir: &Path, file_count: usize) -> Result<(), StoreError> {
        let mtime = match file_mtime(dir) {
            Ok(mtime) => mtime,
            Err(e) => {
                warn!(
                    path = %dir.display(),
                    error = %e,
                    "cannot read mtime, skipping directory cache"
                );
                return Ok(());
            }
        };

        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO directory_cache
             (directory_path, scan_timestamp, file_count, last_modified)
             VALUES (?1, ?2, ?3, ?4)",
            params![path_str(dir), Utc::now().timestamp(), file_count as i64, mtime],
        )?;
        Ok(())
    }

    fn cleanup_cache(&self, days_old: u32) -> Result<usize, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let removed = if days_old == 0 {
            tx.execute("DELETE FROM metadata_cache", [])?
                + tx.execute("DELETE FROM directory_cache", [])?
        } else {
            let cutoff = Utc::now().timestamp() - days_to_secs(days_old);
            tx.execute("DELETE FROM metadata_cache WHERE cached_at < ?1", [cutoff])?
                + tx.execute(
                    "DELETE FROM directory_cache WHERE scan_timestamp < ?1",
                    [cutoff],
                )?
        };
        tx.commit()?;

        info!(days_old, removed, "cleaned ingest caches");
        Ok(removed)
    }
}
