//! # Batch Module
//!
//! Runs extraction, hashing and duplicate checks over many files, and
//! groups record writes into transactions.
//!
//! ## Concurrency
//! Each batch call with more than one path and `parallel_workers > 1`
//! builds its own rayon pool of that size and drops it on return. Files
//! are independent; a failure is recorded against its path and the rest
//! of the batch carries on. Result maps have no meaningful order.
//!
//! ## Write Buffering
//! Staged records are held in memory until `batch_size` of them are
//! waiting, then committed in one transaction. `flush` commits whatever is
//! left; dropping the coordinator flushes too, logging any failure.

use crate::core::config::{Capabilities, PerformanceConfig};
use crate::core::dedup::{DuplicateCheckResult, DuplicateResolver, DuplicateStatus};
use crate::core::hasher::{FileHashes, HashingEngine};
use crate::core::metadata::{Metadata, MetadataExtractor};
use crate::core::store::{file_mtime, FileRecord, IngestStore, OperationType};
use crate::error::{IngestError, StoreError};
use crate::events::{null_sender, BatchEvent, BatchOperation, BatchProgress, EventSender};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, error, info, warn};

/// A file that failed inside a batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchFailure {
    pub path: PathBuf,
    pub message: String,
}

/// Output of `batch_hash`
#[derive(Debug, Default)]
pub struct HashBatch {
    pub hashes: HashMap<PathBuf, FileHashes>,
    pub errors: Vec<BatchFailure>,
}

/// Output of `batch_check`
#[derive(Debug, Default)]
pub struct CheckBatch {
    pub results: HashMap<PathBuf, DuplicateCheckResult>,
    pub errors: Vec<BatchFailure>,
}

impl CheckBatch {
    /// Collapse repeats of the same new content within this batch.
    ///
    /// Checks run independently, so two copies of unseen content both come
    /// back `New`. The first path per SHA-256 (in path order) stays `New`;
    /// the rest become `Duplicate` of it. Returns how many were collapsed.
    pub fn collapse_repeats(&mut self) -> usize {
        let mut new_paths: Vec<PathBuf> = self
            .results
            .iter()
            .filter(|(_, r)| r.status == DuplicateStatus::New)
            .map(|(p, _)| p.clone())
            .collect();
        new_paths.sort();

        let mut first_by_hash: HashMap<String, PathBuf> = HashMap::new();
        let mut collapsed = 0;
        for path in new_paths {
            let Some(result) = self.results.get_mut(&path) else {
                continue;
            };
            match first_by_hash.get(result.hashes.sha256()) {
                Some(first) => {
                    debug!(
                        path = %path.display(),
                        first = %first.display(),
                        "repeat within batch"
                    );
                    let hashes = result.hashes.clone();
                    *result = DuplicateCheckResult::duplicate_of(first.clone(), hashes);
                    collapsed += 1;
                }
                None => {
                    first_by_hash.insert(result.hashes.sha256().to_string(), path.clone());
                }
            }
        }
        collapsed
    }
}

/// What happened to an ingested file, for its record
#[derive(Debug, Clone, Default)]
pub struct RecordDetails {
    pub dest_path: Option<PathBuf>,
    pub raw_backup_path: Option<PathBuf>,
    pub camera_model: Option<String>,
    pub lens_model: Option<String>,
    pub device_code: Option<String>,
}

impl RecordDetails {
    /// Camera and lens taken from extracted metadata
    pub fn from_metadata(metadata: &Metadata) -> Self {
        Self {
            camera_model: metadata.model.clone(),
            lens_model: metadata.lens_model.clone(),
            ..Self::default()
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

    pub fn with_device_code(mut self, code: impl Into<String>) -> Self {
        self.device_code = Some(code.into());
        self
    }

    /// Organized when there is a destination, raw backup otherwise
    pub fn operation_type(&self) -> OperationType {
        match (&self.dest_path, &self.raw_backup_path) {
            (Some(_), Some(_)) => OperationType::Both,
            (Some(_), None) => OperationType::Organized,
            (None, _) => OperationType::RawBackup,
        }
    }
}

/// Drives the ingest core over many files
pub struct BatchCoordinator {
    store: Arc<dyn IngestStore>,
    config: PerformanceConfig,
    engine: Arc<HashingEngine>,
    extractor: MetadataExtractor,
    resolver: DuplicateResolver,
    pending: Mutex<Vec<FileRecord>>,
    events: EventSender,
}

impl BatchCoordinator {
    /// Wire up the engine, extractor and resolver over `store`
    pub fn new(
        store: Arc<dyn IngestStore>,
        config: PerformanceConfig,
        capabilities: Capabilities,
    ) -> Result<Self, IngestError> {
        config.validate()?;

        let engine = Arc::new(HashingEngine::new(config.clone(), capabilities));
        let extractor = MetadataExtractor::new(Arc::clone(&store), &config, capabilities);
        let resolver = DuplicateResolver::new(Arc::clone(&store), Arc::clone(&engine));

        Ok(Self {
            store,
            engine,
            extractor,
            resolver,
            pending: Mutex::new(Vec::with_capacity(config.batch_size)),
            config,
            events: null_sender(),
        })
    }

    /// Report progress on `events`
    pub fn with_events(mut self, events: EventSender) -> Self {
        self.events = events;
        self
    }

    pub fn config(&self) -> &PerformanceConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn IngestStore> {
        &self.store
    }

    pub fn engine(&self) -> &HashingEngine {
        &self.engine
    }

    pub fn extractor(&self) -> &MetadataExtractor {
        &self.extractor
    }

    pub fn resolver(&self) -> &DuplicateResolver {
        &self.resolver
    }

    /// Extract metadata for every path. Extraction cannot fail, so every
    /// path is present in the result.
    pub fn batch_extract(&self, paths: &[PathBuf]) -> HashMap<PathBuf, Metadata> {
        let outcomes = self.run(BatchOperation::Extract, paths, |path| {
            Ok::<_, IngestError>(self.extractor.extract(path))
        });

        outcomes
            .into_iter()
            .filter_map(|(path, outcome)| outcome.ok().map(|metadata| (path, metadata)))
            .collect()
    }

    /// Hash every path
    pub fn batch_hash(&self, paths: &[PathBuf]) -> HashBatch {
        let outcomes = self.run(BatchOperation::Hash, paths, |path| self.engine.hash(path));

        let mut batch = HashBatch::default();
        for (path, outcome) in outcomes {
            match outcome {
                Ok(hashes) => {
                    batch.hashes.insert(path, hashes);
                }
                Err(message) => batch.errors.push(BatchFailure { path, message }),
            }
        }
        batch
    }

    /// Duplicate-check every path
    pub fn batch_check(&self, paths: &[PathBuf]) -> CheckBatch {
        let outcomes = self.run(BatchOperation::Check, paths, |path| self.resolver.check(path));

        let mut batch = CheckBatch::default();
        for (path, outcome) in outcomes {
            match outcome {
                Ok(result) => {
                    batch.results.insert(path, result);
                }
                Err(message) => batch.errors.push(BatchFailure { path, message }),
            }
        }
        batch
    }

    /// Build a record for a freshly ingested file and stage it.
    ///
    /// Returns `false` without staging when the file's mtime can no longer
    /// be read.
    pub fn record_ingested(
        &self,
        path: &Path,
        hashes: &FileHashes,
        details: RecordDetails,
    ) -> Result<bool, StoreError> {
        let mtime = match file_mtime(path) {
            Ok(mtime) => mtime,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot read mtime, record not stored");
                return Ok(false);
            }
        };

        let mut record = FileRecord::new(path, hashes, mtime, details.operation_type())
            .with_camera(details.camera_model, details.lens_model);
        record.dest_path = details.dest_path;
        record.raw_backup_path = details.raw_backup_path;
        record.device_code = details.device_code;

        self.stage_record(record)?;
        Ok(true)
    }

    /// Buffer a record, committing the buffer once it holds `batch_size`
    pub fn stage_record(&self, record: FileRecord) -> Result<(), StoreError> {
        let mut pending = self.pending();
        pending.push(record);

        if pending.len() >= self.config.batch_size {
            self.commit(&mut pending)?;
        }
        Ok(())
    }

    /// Commit every staged record. Returns how many were written.
    pub fn flush(&self) -> Result<usize, StoreError> {
        let mut pending = self.pending();
        self.commit(&mut pending)
    }

    /// Records staged but not yet committed
    pub fn pending_records(&self) -> usize {
        self.pending().len()
    }

    fn pending(&self) -> MutexGuard<'_, Vec<FileRecord>> {
        // A panic mid-push leaves the Vec itself intact
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn commit(&self, pending: &mut Vec<FileRecord>) -> Result<usize, StoreError> {
        if pending.is_empty() {
            return Ok(0);
        }

        // Failed batches stay buffered for the next flush
        self.store.batch_insert_records(pending)?;

        let written = pending.len();
        pending.clear();
        debug!(records = written, "flushed staged records");
        self.events.batch(BatchEvent::Flushed { records: written });
        Ok(written)
    }

    fn run<T, E, F>(
        &self,
        operation: BatchOperation,
        paths: &[PathBuf],
        work: F,
    ) -> Vec<(PathBuf, Result<T, String>)>
    where
        T: Send,
        E: std::fmt::Display,
        F: Fn(&Path) -> Result<T, E> + Sync,
    {
        let total = paths.len();
        self.events.batch(BatchEvent::Started { operation, total });

        let completed = AtomicUsize::new(0);
        let process = |path: &PathBuf| {
            let outcome = work(path).map_err(|e| e.to_string());

            if let Err(message) = &outcome {
                warn!(path = %path.display(), error = %message, "{} failed", operation);
                self.events.batch(BatchEvent::Error {
                    path: path.clone(),
                    message: message.clone(),
                });
            }
            self.events.batch(BatchEvent::Progress(BatchProgress {
                operation,
                completed: completed.fetch_add(1, Ordering::SeqCst) + 1,
                total,
                current_path: path.clone(),
            }));

            (path.clone(), outcome)
        };

        let workers = self.config.parallel_workers;
        let outcomes: Vec<_> = if total > 1 && workers > 1 {
            match rayon::ThreadPoolBuilder::new().num_threads(workers).build() {
                Ok(pool) => pool.install(|| paths.par_iter().map(process).collect()),
                Err(e) => {
                    error!(error = %e, "failed to build worker pool, running sequentially");
                    paths.iter().map(process).collect()
                }
            }
        } else {
            paths.iter().map(process).collect()
        };

        let failed = outcomes.iter().filter(|(_, o)| o.is_err()).count();
        info!(%operation, total, failed, "batch finished");
        self.events.batch(BatchEvent::Completed {
            operation,
            succeeded: total - failed,
            failed,
        });

        outcomes
    }
}

impl Drop for BatchCoordinator {
    fn drop(&mut self) {
        let pending = self.pending_records();
        if pending == 0 {
            return;
        }
        match self.flush() {
            Ok(written) => debug!(records = written, "flushed staged records on drop"),
            Err(e) => error!(records = pending, error = %e, "staged records lost on drop"),
        }
    }
}
