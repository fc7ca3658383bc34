//! Store trait definitions.

use super::{FileRecord, StoreStats};
use crate::core::metadata::Metadata;
use crate::error::StoreError;
use std::path::Path;

/// Queries and writes over ingested file records
pub trait RecordStore: Send + Sync {
    /// Look up the record holding this content hash
    fn record_by_hash(&self, sha256: &str) -> Result<Option<FileRecord>, StoreError>;

    /// Records whose size lies in `min..=max`, in store iteration order
    fn records_by_size_range(&self, min: u64, max: u64) -> Result<Vec<FileRecord>, StoreError>;

    /// Records whose perceptual hash string equals `hash` exactly
    fn records_by_perceptual_hash(&self, hash: &str) -> Result<Vec<FileRecord>, StoreError>;

    /// Record previously written for this exact path and mtime
    fn record_by_path_and_mtime(
        &self,
        path: &Path,
        mtime: i64,
    ) -> Result<Option<FileRecord>, StoreError>;

    /// Whether a record exists for this exact path and mtime
    fn is_unchanged(&self, path: &Path, mtime: i64) -> Result<bool, StoreError> {
        Ok(self.record_by_path_and_mtime(path, mtime)?.is_some())
    }

    /// Upsert a single record by content hash
    fn insert_record(&self, record: &FileRecord) -> Result<(), StoreError>;

    /// Upsert many records in one transaction.
    ///
    /// Either every record is visible afterwards or none is.
    fn batch_insert_records(&self, records: &[FileRecord]) -> Result<(), StoreError>;

    /// Aggregate counts
    fn stats(&self) -> Result<StoreStats, StoreError>;
}

/// Ephemeral caches: extracted metadata and directory scans
pub trait CacheStore: Send + Sync {
    /// Cached metadata for `path`, only if cached under its current mtime.
    ///
    /// An unreadable mtime or a corrupt payload is a miss, not an error.
    fn cached_metadata(&self, path: &Path) -> Result<Option<Metadata>, StoreError>;

    /// Cache metadata under the file's current mtime.
    ///
    /// Silently does nothing when the mtime cannot be read.
    fn cache_metadata(&self, path: &Path, metadata: &Metadata) -> Result<(), StoreError>;

    /// True if the directory was never scanned or has a newer mtime
    fn is_directory_changed(&self, dir: &Path) -> Result<bool, StoreError>;

    /// Remember a scan of `dir` that found `file_count` files
    fn update_directory_cache(&self, dir: &Path, file_count: usize) -> Result<(), StoreError>;

    /// Drop cache rows older than `days_old` days; `0` drops all of them.
    ///
    /// File records are never touched. Returns the number of rows removed.
    fn cleanup_cache(&self, days_old: u32) -> Result<usize, StoreError>;
}

/// Everything the ingest core needs from a backend
pub trait IngestStore: RecordStore + CacheStore {}

impl<T: RecordStore + CacheStore> IngestStore for T {}
