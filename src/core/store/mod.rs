//! # Store Module
//!
//! Durable record of ingested content plus the ephemeral caches that make
//! rescans cheap.
//!
//! ## Tables
//! - `file_records` - one row per distinct content hash; the system of
//!   record for "this content has been ingested"
//! - `metadata_cache` - normalized metadata keyed by (path, mtime)
//! - `directory_cache` - last scan of each directory
//!
//! ## Backends
//! - `SqliteStore` - Persistent storage using SQLite
//! - `InMemoryStore` - For testing and throwaway runs

mod memory;
mod sqlite;
mod traits;

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{CacheStore, IngestStore, RecordStore};

use crate::core::hasher::FileHashes;
use crate::error::HashError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

/// What the organizer did with an ingested file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    /// Copied into the organized archive
    Organized,
    /// Copied into the raw backup only
    RawBackup,
    /// Both of the above
    Both,
}

impl OperationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::Organized => "organized",
            OperationType::RawBackup => "raw_backup",
            OperationType::Both => "both",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "organized" => Some(OperationType::Organized),
            "raw_backup" => Some(OperationType::RawBackup),
            "both" => Some(OperationType::Both),
            _ => None,
        }
    }
}

impl std::fmt::Display for OperationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of processing a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    #[default]
    Completed,
    Failed,
    Skipped,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStatus::Completed => "completed",
            ProcessingStatus::Failed => "failed",
            ProcessingStatus::Skipped => "skipped",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "completed" => Some(ProcessingStatus::Completed),
            "failed" => Some(ProcessingStatus::Failed),
            "skipped" => Some(ProcessingStatus::Skipped),
            _ => None,
        }
    }
}

/// A file whose content has been ingested
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Where the content was ingested from
    pub source_path: PathBuf,
    /// Organized copy, if any
    pub dest_path: Option<PathBuf>,
    /// Raw backup copy, if any
    pub raw_backup_path: Option<PathBuf>,
    /// Lowercase hex SHA-256 of the content (unique across records)
    pub sha256: String,
    pub perceptual_hash: Option<String>,
    pub file_size: u64,
    /// Source mtime in epoch seconds when the record was written
    pub file_mtime: i64,
    pub created_at: DateTime<Utc>,
    pub processed_at: DateTime<Utc>,
    pub camera_model: Option<String>,
    pub lens_model: Option<String>,
    pub device_code: Option<String>,
    pub operation_type: OperationType,
    pub processing_status: ProcessingStatus,
}

impl FileRecord {
    /// Build a completed record for a freshly hashed file
    pub fn new(
        source_path: impl Into<PathBuf>,
        hashes: &FileHashes,
        file_mtime: i64,
        operation_type: OperationType,
    ) -> Self {
        let now = Utc::now();
        Self {
            source_path: source_path.into(),
            dest_path: None,
            raw_backup_path: None,
            sha256: hashes.sha256().to_string(),
            perceptual_hash: hashes.perceptual().map(str::to_string),
            file_size: hashes.size(),
            file_mtime,
            created_at: now,
            processed_at: now,
            camera_model: None,
            lens_model: None,
            device_code: None,
            operation_type,
            processing_status: ProcessingStatus::Completed,
        }
    }

    pub fn with_destination(mut self, dest: impl Into<PathBuf>) -> Self {
        self.dest_path = Some(dest.into());
        self
    }

    pub fn with_raw_backup(mut self, backup: impl Into<PathBuf>) -> Self {
        self.raw_backup_path = Some(backup.into());
        self
    }

    pub fn with_camera(mut self, model: Option<String>, lens: Option<String>) -> Self {
        self.camera_model = model;
        self.lens_model = lens;
        self
    }

    pub fn with_device_code(mut self, code: impl Into<String>) -> Self {
        self.device_code = Some(code.into());
        self
    }

    /// Rebuild the validated hash value object from the stored columns
    pub fn hashes(&self) -> Result<FileHashes, HashError> {
        FileHashes::new(
            self.sha256.clone(),
            self.file_size as i64,
            self.perceptual_hash.clone(),
        )
    }
}

/// Cached result of scanning one directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryCacheEntry {
    pub directory: PathBuf,
    /// When the scan ran, epoch seconds
    pub scan_timestamp: i64,
    pub file_count: usize,
    /// Directory mtime observed during the scan, epoch seconds
    pub last_modified: i64,
}

/// Aggregate counts over the store
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub file_records: usize,
    pub metadata_cache_entries: usize,
    pub directory_cache_entries: usize,
    pub unique_devices: usize,
    /// Content hashes held by more than one record
    pub duplicate_groups: usize,
    pub records_with_perceptual_hash: usize,
}

/// Modification time of a stat result in whole epoch seconds
pub fn mtime_secs(metadata: &fs::Metadata) -> io::Result<i64> {
    let modified = metadata.modified()?;
    let secs = match modified.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_secs() as i64,
        Err(e) => -(e.duration().as_secs() as i64),
    };
    Ok(secs)
}

/// Modification time of a path in whole epoch seconds
pub fn file_mtime(path: &Path) -> io::Result<i64> {
    mtime_secs(&fs::metadata(path)?)
}

/// Seconds in `days` days
pub(crate) fn days_to_secs(days: u32) -> i64 {
    i64::from(days) * 24 * 60 * 60
}
