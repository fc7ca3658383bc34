//! # Scanner Module
//!
//! Lists candidate media files under source directories.
//!
//! ## File Types
//! - **Raw** - nef, cr3, cr2, arw, dng, orf, raf, rw2
//! - **Jpeg** - jpg, jpeg, heic, heif
//! - **Video** - mp4, mov, avi, mkv
//!
//! The mapping is configurable through `FileTypes`.
//!
//! ## Incremental Scans
//! With a store attached and `incremental` on, files directly inside a
//! directory whose mtime has not advanced since the last scan are skipped.
//! Subdirectories are still visited, since their own mtimes are tracked
//! separately.
//!
//! Scanning never writes the directory cache. The caller decides which
//! directories are done (`ScanResult::settled_directories`) once their files
//! have been dealt with, and hands those to
//! `WalkDirScanner::remember_directories`. A directory with a failed or
//! unrecorded file is left unmarked and is listed again next time.
//!
//! ## Example
//! ```rust,ignore
//! use photo_ingest::core::scanner::{FileLister, ScanConfig, WalkDirScanner};
//!
//! let scanner = WalkDirScanner::new(ScanConfig::default()).with_store(store);
//! let result = scanner.scan(&["/Volumes/CARD/DCIM".into()])?;
//! ```

mod filter;
mod walker;

pub use filter::CandidateFilter;
pub use walker::{ScanConfig, WalkDirScanner};

use crate::core::config::FileType;
use crate::error::ScanError;
use crate::events::EventSender;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A file the ingest core may be asked about
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateFile {
    pub path: PathBuf,
    /// Size in bytes
    pub size: u64,
    /// Modification time, epoch seconds
    pub mtime: i64,
    pub file_type: FileType,
    /// Lowercase, no dot
    pub extension: String,
}

/// A directory whose immediate contents were listed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedDirectory {
    pub path: PathBuf,
    /// Candidates directly inside, including skipped ones
    pub file_count: usize,
    /// Files were skipped because the directory cache says unchanged
    pub skipped: bool,
}

/// Result of a scan operation
#[derive(Debug, Default)]
pub struct ScanResult {
    /// Candidates found, in walk order
    pub files: Vec<CandidateFile>,
    /// Errors that occurred during scanning (non-fatal)
    pub errors: Vec<ScanError>,
    /// Directories whose contents were listed, in walk order
    pub directories: Vec<ScannedDirectory>,
    pub directories_scanned: usize,
    /// Directories whose files were skipped as unchanged
    pub directories_skipped: usize,
}

impl ScanResult {
    pub fn paths(&self) -> Vec<PathBuf> {
        self.files.iter().map(|f| f.path.clone()).collect()
    }

    /// Listed directories that can be marked as seen.
    ///
    /// A directory qualifies when it was not skipped, no scan error points
    /// at it or at an entry inside it, and `is_settled` holds for every
    /// candidate found directly inside it.
    pub fn settled_directories<F>(&self, is_settled: F) -> Vec<&ScannedDirectory>
    where
        F: Fn(&Path) -> bool,
    {
        let in_dir = |path: &Path, dir: &Path| path == dir || path.parent() == Some(dir);

        self.directories
            .iter()
            .filter(|d| !d.skipped)
            .filter(|d| !self.errors.iter().any(|e| in_dir(e.path(), d.path.as_path())))
            .filter(|d| {
                self.files
                    .iter()
                    .filter(|f| f.path.parent() == Some(d.path.as_path()))
                    .all(|f| is_settled(&f.path))
            })
            .collect()
    }
}

/// Trait for file listers
///
/// Implement this trait to feed candidates from somewhere other than a
/// directory walk (e.g., for testing).
pub trait FileLister: Send + Sync {
    /// Scan directories and return discovered candidates
    fn scan(&self, roots: &[PathBuf]) -> Result<ScanResult, ScanError>;

    /// Scan with progress reporting via events
    fn scan_with_events(
        &self,
        roots: &[PathBuf],
        events: &EventSender,
    ) -> Result<ScanResult, ScanError>;
}
