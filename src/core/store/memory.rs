//! In-memory store backend for testing.

use super::{
    days_to_secs, file_mtime, CacheStore, DirectoryCacheEntry, FileRecord, RecordStore,
    StoreStats,
};
use crate::core::metadata::Metadata;
use crate::error::StoreError;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

struct CachedMetadata {
    metadata: Metadata,
    cached_at: i64,
}

/// In-memory store backend
///
/// Useful for testing and scenarios where persistence isn't needed.
/// Records keep insertion order; replacing a hash moves it to the end,
/// the same as a fresh row in the SQLite backend.
pub struct InMemoryStore {
    records: RwLock<Vec<FileRecord>>,
    metadata: RwLock<HashMap<(PathBuf, i64), CachedMetadata>>,
    directories: RwLock<HashMap<PathBuf, DirectoryCacheEntry>>,
}

impl InMemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            records: RwLock::new(Vec::new()),
            metadata: RwLock::new(HashMap::new()),
            directories: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned() -> StoreError {
    StoreError::Poisoned {
        path: PathBuf::from("memory"),
    }
}

fn read<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>, StoreError> {
    lock.read().map_err(|_| poisoned())
}

fn write<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>, StoreError> {
    lock.write().map_err(|_| poisoned())
}

fn upsert(records: &mut Vec<FileRecord>, record: &FileRecord) {
    records.retain(|r| r.sha256 != record.sha256);
    records.push(record.clone());
}

impl RecordStore for InMemoryStore {
    fn record_by_hash(&self, sha256: &str) -> Result<Option<FileRecord>, StoreError> {
        let records = read(&self.records)?;
        Ok(records.iter().find(|r| r.sha256 == sha256).cloned())
    }

    fn records_by_size_range(&self, min: u64, max: u64) -> Result<Vec<FileRecord>, StoreError> {
        let records = read(&self.records)?;
        Ok(records
            .iter()
            .filter(|r| (min..=max).contains(&r.file_size))
            .cloned()
            .collect())
    }

    fn records_by_perceptual_hash(&self, hash: &str) -> Result<Vec<FileRecord>, StoreError> {
        let records = read(&self.records)?;
        Ok(records
            .iter()
            .filter(|r| r.perceptual_hash.as_deref() == Some(hash))
            .cloned()
            .collect())
    }

    fn record_by_path_and_mtime(
        &self,
        path: &Path,
        mtime: i64,
    ) -> Result<Option<FileRecord>, StoreError> {
        let records = read(&self.records)?;
        Ok(records
            .iter()
            .find(|r| r.source_path == path && r.file_mtime == mtime)
            .cloned())
    }

    fn insert_record(&self, record: &FileRecord) -> Result<(), StoreError> {
        let mut records = write(&self.records)?;
        upsert(&mut records, record);
        Ok(())
    }

    fn batch_insert_records(&self, batch: &[FileRecord]) -> Result<(), StoreError> {
        // One write guard for the whole batch keeps it atomic to readers
        let mut records = write(&self.records)?;
        for record in batch {
            upsert(&mut records, record);
        }
        Ok(())
    }

    fn stats(&self) -> Result<StoreStats, StoreError> {
        let records = read(&self.records)?;
        let devices: HashSet<&str> = records
            .iter()
            .filter_map(|r| r.device_code.as_deref())
            .collect();

        Ok(StoreStats {
            file_records: records.len(),
            metadata_cache_entries: read(&self.metadata)?.len(),
            directory_cache_entries: read(&self.directories)?.len(),
            unique_devices: devices.len(),
            duplicate_groups: 0,
            records_with_perceptual_hash: records
                .iter()
                .filter(|r| r.perceptual_hash.is_some())
                .count(),
        })
    }
}

impl CacheStore for InMemoryStore {
    fn cached_metadata(&self, path: &Path) -> Result<Option<Metadata>, StoreError> {
        let Ok(mtime) = file_mtime(path) else {
            return Ok(None);
        };

        let cache = read(&self.metadata)?;
        Ok(cache
            .get(&(path.to_path_buf(), mtime))
            .map(|entry| entry.metadata.clone()))
    }

    fn cache_metadata(&self, path: &Path, metadata: &Metadata) -> Result<(), StoreError> {
        let Ok(mtime) = file_mtime(path) else {
            return Ok(());
        };

        let mut cache = write(&self.metadata)?;
        cache.insert(
            (path.to_path_buf(), mtime),
            CachedMetadata {
                metadata: metadata.clone(),
                cached_at: Utc::now().timestamp(),
            },
        );
        Ok(())
    }

    fn is_directory_changed(&self, dir: &Path) -> Result<bool, StoreError> {
        let Ok(current) = file_mtime(dir) else {
            return Ok(true);
        };

        let directories = read(&self.directories)?;
        Ok(directories
            .get(dir)
            .map_or(true, |entry| current > entry.last_modified))
    }

    fn update_directory_cache(&self, dir: &Path, file_count: usize) -> Result<(), StoreError> {
        let Ok(last_modified) = file_mtime(dir) else {
            return Ok(());
        };

        let mut directories = write(&self.directories)?;
        directories.insert(
            dir.to_path_buf(),
            DirectoryCacheEntry {
                directory: dir.to_path_buf(),
                scan_timestamp: Utc::now().timestamp(),
                file_count,
                last_modified,
            },
        );
        Ok(())
    }

    fn cleanup_cache(&self, days_old: u32) -> Result<usize, StoreError> {
        let mut metadata = write(&self.metadata)?;
        let mut directories = write(&self.directories)?;
        let before = metadata.len() + directories.len();

        if days_old == 0 {
            metadata.clear();
            directories.clear();
        } else {
            let cutoff = Utc::now().timestamp() - days_to_secs(days_old);
            metadata.retain(|_, entry| entry.cached_at >= cutoff);
            directories.retain(|_, entry| entry.scan_timestamp >= cutoff);
        }

        Ok(before - metadata.len() - directories.len())
    }
}
