//! Directory walking implementation using walkdir.

use super::filter::{is_hidden, CandidateFilter};
use super::{CandidateFile, FileLister, ScanResult, ScannedDirectory};
use crate::core::config::FileTypes;
use crate::core::store::{mtime_secs, IngestStore};
use crate::error::ScanError;
use crate::events::{null_sender, EventSender, ScanEvent, ScanProgress};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

/// Configuration for the directory scanner
#[derive(Debug, Clone, Default)]
pub struct ScanConfig {
    /// Whether to follow symbolic links
    pub follow_symlinks: bool,
    /// Whether to include hidden files and directories
    pub include_hidden: bool,
    /// Maximum directory depth (None = unlimited)
    pub max_depth: Option<usize>,
    /// Skip files in directories the store reports unchanged
    pub incremental: bool,
    /// Extension to type mapping
    pub file_types: FileTypes,
}

/// Per-scan bookkeeping for the directory cache
#[derive(Default)]
struct DirectoryTally {
    /// Listed directories, in visit order
    listed: Vec<ScannedDirectory>,
    index: HashMap<PathBuf, usize>,
    unchanged: HashSet<PathBuf>,
}

impl DirectoryTally {
    fn visit(&mut self, dir: &Path, skipped: bool) {
        self.index.insert(dir.to_path_buf(), self.listed.len());
        self.listed.push(ScannedDirectory {
            path: dir.to_path_buf(),
            file_count: 0,
            skipped,
        });
        if skipped {
            self.unchanged.insert(dir.to_path_buf());
        }
    }

    fn count_file_in(&mut self, dir: &Path) {
        if let Some(&i) = self.index.get(dir) {
            self.listed[i].file_count += 1;
        }
    }
}

/// Scanner implementation using the walkdir crate
pub struct WalkDirScanner {
    config: ScanConfig,
    filter: CandidateFilter,
    store: Option<Arc<dyn IngestStore>>,
}

impl WalkDirScanner {
    /// Create a new scanner with the given configuration
    pub fn new(config: ScanConfig) -> Self {
        let filter =
            CandidateFilter::new(config.file_types.clone()).with_hidden(config.include_hidden);

        Self {
            config,
            filter,
            store: None,
        }
    }

    /// Attach the store that backs incremental scans
    pub fn with_store(mut self, store: Arc<dyn IngestStore>) -> Self {
        self.store = Some(store);
        self
    }

    fn incremental_store(&self) -> Option<&Arc<dyn IngestStore>> {
        self.store.as_ref().filter(|_| self.config.incremental)
    }

    fn directory_unchanged(&self, dir: &Path) -> bool {
        let Some(store) = self.incremental_store() else {
            return false;
        };
        match store.is_directory_changed(dir) {
            Ok(changed) => !changed,
            Err(e) => {
                warn!(
                    path = %dir.display(),
                    error = %e,
                    "directory cache lookup failed, rescanning"
                );
                false
            }
        }
    }

    /// Mark directories as seen in the directory cache.
    ///
    /// Does nothing unless a store is attached and `incremental` is on.
    /// Returns how many directories were written.
    pub fn remember_directories(&self, directories: &[&ScannedDirectory]) -> usize {
        let Some(store) = self.incremental_store() else {
            return 0;
        };

        let mut written = 0;
        for dir in directories {
            match store.update_directory_cache(&dir.path, dir.file_count) {
                Ok(()) => written += 1,
                Err(e) => warn!(
                    path = %dir.path.display(),
                    error = %e,
                    "failed to update directory cache"
                ),
            }
        }
        debug!(written, "remembered scanned directories");
        written
    }

    fn keep_entry(&self, entry: &DirEntry) -> bool {
        entry.depth() == 0
            || self.config.include_hidden
            || !(entry.file_type().is_dir() && is_hidden(entry.path()))
    }

    /// Scan a single root
    fn scan_directory(
        &self,
        root: &Path,
        events: &EventSender,
        result: &mut ScanResult,
    ) -> Result<(), ScanError> {
        if !root.is_dir() {
            return Err(ScanError::DirectoryNotFound {
                path: root.to_path_buf(),
            });
        }

        let mut tally = DirectoryTally::default();

        let mut walker = WalkDir::new(root).follow_links(self.config.follow_symlinks);
        if let Some(depth) = self.config.max_depth {
            walker = walker.max_depth(depth);
        }

        for entry_result in walker.into_iter().filter_entry(|e| self.keep_entry(e)) {
            let entry = match entry_result {
                Ok(entry) => entry,
                Err(e) => {
                    let error = walk_error(e);
                    events.scan(ScanEvent::Error {
                        path: error.path().to_path_buf(),
                        message: error.to_string(),
                    });
                    result.errors.push(error);
                    continue;
                }
            };
            let path = entry.path();

            if entry.file_type().is_dir() {
                result.directories_scanned += 1;

                // At the depth limit a directory's own files are never listed
                let listed = self.config.max_depth.map_or(true, |max| entry.depth() < max);
                if !listed {
                    continue;
                }

                let unchanged = self.directory_unchanged(path);
                tally.visit(path, unchanged);
                if unchanged {
                    debug!(path = %path.display(), "directory unchanged, skipping its files");
                    result.directories_skipped += 1;
                    events.scan(ScanEvent::DirectorySkipped {
                        path: path.to_path_buf(),
                    });
                }

                events.scan(ScanEvent::Progress(ScanProgress {
                    directories_scanned: result.directories_scanned,
                    files_found: result.files.len(),
                    current_path: path.to_path_buf(),
                }));
                continue;
            }

            if !entry.file_type().is_file() {
                continue;
            }

            let Some(file_type) = self.filter.classify(path) else {
                continue;
            };

            let parent = path.parent().unwrap_or(root);
            tally.count_file_in(parent);
            if tally.unchanged.contains(parent) {
                continue;
            }

            let stat = match entry.metadata() {
                Ok(stat) => stat,
                Err(e) => {
                    let error = walk_error(e);
                    events.scan(ScanEvent::Error {
                        path: path.to_path_buf(),
                        message: error.to_string(),
                    });
                    result.errors.push(error);
                    continue;
                }
            };
            let mtime = match mtime_secs(&stat) {
                Ok(mtime) => mtime,
                Err(e) => {
                    let error = ScanError::ReadEntry {
                        path: path.to_path_buf(),
                        source: e,
                    };
                    events.scan(ScanEvent::Error {
                        path: path.to_path_buf(),
                        message: error.to_string(),
                    });
                    result.errors.push(error);
                    continue;
                }
            };

            let extension = path
                .extension()
                .and_then(|e| e.to_str())
                .map(str::to_ascii_lowercase)
                .unwrap_or_default();

            events.scan(ScanEvent::FileFound {
                path: path.to_path_buf(),
            });
            result.files.push(CandidateFile {
                path: path.to_path_buf(),
                size: stat.len(),
                mtime,
                file_type,
                extension,
            });
        }

        result.directories.extend(tally.listed);
        Ok(())
    }
}

fn walk_error(e: walkdir::Error) -> ScanError {
    let path = e.path().map(Path::to_path_buf).unwrap_or_default();
    if e.io_error().map(|io| io.kind()) == Some(std::io::ErrorKind::PermissionDenied) {
        ScanError::PermissionDenied { path }
    } else {
        ScanError::ReadEntry {
            path,
            source: e.into(),
        }
    }
}

impl FileLister for WalkDirScanner {
    fn scan(&self, roots: &[PathBuf]) -> Result<ScanResult, ScanError> {
        self.scan_with_events(roots, &null_sender())
    }

    fn scan_with_events(
        &self,
        roots: &[PathBuf],
        events: &EventSender,
    ) -> Result<ScanResult, ScanError> {
        events.scan(ScanEvent::Started {
            paths: roots.to_vec(),
        });

        let mut result = ScanResult::default();

        for root in roots {
            if let Err(e) = self.scan_directory(root, events, &mut result) {
                warn!(path = %root.display(), error = %e, "skipping source root");
                events.scan(ScanEvent::Error {
                    path: root.clone(),
                    message: e.to_string(),
                });
                result.errors.push(e);
            }
        }

        events.scan(ScanEvent::Completed {
            total_files: result.files.len(),
            directories_skipped: result.directories_skipped,
        });

        Ok(result)
    }
}
