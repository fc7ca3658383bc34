//! # Dedup Module
//!
//! Decides whether a candidate's content has already been ingested.
//!
//! ## Stages (strictly in order)
//! 1. **Fast path** - a record with this exact path and mtime exists;
//!    nothing is read or hashed
//! 2. **Size filter** - no record of the same size means the content is
//!    new; hash once and stop
//! 3. **Content** - SHA-256 against every same-size record, then an exact
//!    perceptual-hash match among them
//!
//! Only SHA-256 equality yields `Duplicate`. A perceptual match is
//! reported as `Similar` and must never be treated as safe to discard.

use crate::core::hasher::{FileHashes, HashingEngine};
use crate::core::store::{mtime_secs, IngestStore};
use crate::error::{HashError, Result};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Score reported for a perceptual match. Exact string equality of the
/// hashes is all that is checked, so this is a fixed value rather than a
/// measured distance.
pub const SIMILARITY_PLACEHOLDER: f64 = 0.9;

/// Verdict for one candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicateStatus {
    /// Content not seen before
    New,
    /// Byte-identical content already ingested
    Duplicate,
    /// Visually identical by perceptual hash, bytes differ
    Similar,
}

impl DuplicateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DuplicateStatus::New => "new",
            DuplicateStatus::Duplicate => "duplicate",
            DuplicateStatus::Similar => "similar",
        }
    }
}

impl std::fmt::Display for DuplicateStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of checking one file
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DuplicateCheckResult {
    pub status: DuplicateStatus,
    /// Source path of the matching record
    pub existing_file: Option<PathBuf>,
    pub similarity_score: Option<f64>,
    pub hashes: FileHashes,
}

impl DuplicateCheckResult {
    fn new_content(hashes: FileHashes) -> Self {
        Self {
            status: DuplicateStatus::New,
            existing_file: None,
            similarity_score: None,
            hashes,
        }
    }

    pub(crate) fn duplicate_of(existing: PathBuf, hashes: FileHashes) -> Self {
        Self {
            status: DuplicateStatus::Duplicate,
            existing_file: Some(existing),
            similarity_score: None,
            hashes,
        }
    }

    fn similar_to(existing: PathBuf, hashes: FileHashes) -> Self {
        Self {
            status: DuplicateStatus::Similar,
            existing_file: Some(existing),
            similarity_score: Some(SIMILARITY_PLACEHOLDER),
            hashes,
        }
    }

    pub fn is_duplicate(&self) -> bool {
        self.status == DuplicateStatus::Duplicate
    }
}

/// Snapshot of the resolver's work counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ResolverCounters {
    /// Checks answered from path + mtime without hashing
    pub fast_path_hits: usize,
    /// Files hashed
    pub hashes_computed: usize,
    /// SHA-256 equality tests against stored records
    pub sha256_comparisons: usize,
}

/// Staged duplicate detection against the store
pub struct DuplicateResolver {
    store: Arc<dyn IngestStore>,
    engine: Arc<HashingEngine>,
    fast_path_hits: AtomicUsize,
    hashes_computed: AtomicUsize,
    sha256_comparisons: AtomicUsize,
}

impl DuplicateResolver {
    pub fn new(store: Arc<dyn IngestStore>, engine: Arc<HashingEngine>) -> Self {
        Self {
            store,
            engine,
            fast_path_hits: AtomicUsize::new(0),
            hashes_computed: AtomicUsize::new(0),
            sha256_comparisons: AtomicUsize::new(0),
        }
    }

    /// Classify `path` as new, duplicate or similar
    pub fn check(&self, path: &Path) -> Result<DuplicateCheckResult> {
        let stat = fs::metadata(path).map_err(|e| HashError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let size = stat.len();
        let mtime = mtime_secs(&stat).map_err(|e| HashError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        if let Some(record) = self.store.record_by_path_and_mtime(path, mtime)? {
            self.fast_path_hits.fetch_add(1, Ordering::Relaxed);
            debug!(path = %path.display(), "unchanged since ingest, skipping hash");
            let hashes = record.hashes()?;
            return Ok(DuplicateCheckResult::duplicate_of(record.source_path, hashes));
        }

        let candidates = self.store.records_by_size_range(size, size)?;
        let hashes = self.hash(path)?;

        if candidates.is_empty() {
            debug!(path = %path.display(), size, "no record of this size");
            return Ok(DuplicateCheckResult::new_content(hashes));
        }

        for record in &candidates {
            self.sha256_comparisons.fetch_add(1, Ordering::Relaxed);
            if record.sha256 == hashes.sha256() {
                debug!(
                    path = %path.display(),
                    existing = %record.source_path.display(),
                    "exact duplicate"
                );
                return Ok(DuplicateCheckResult::duplicate_of(
                    record.source_path.clone(),
                    hashes,
                ));
            }
        }

        if let Some(perceptual) = hashes.perceptual() {
            let similar = candidates
                .iter()
                .find(|r| r.perceptual_hash.as_deref() == Some(perceptual));
            if let Some(record) = similar {
                debug!(
                    path = %path.display(),
                    existing = %record.source_path.display(),
                    "perceptual match"
                );
                return Ok(DuplicateCheckResult::similar_to(
                    record.source_path.clone(),
                    hashes,
                ));
            }
        }

        Ok(DuplicateCheckResult::new_content(hashes))
    }

    /// Current counter values
    pub fn counters(&self) -> ResolverCounters {
        ResolverCounters {
            fast_path_hits: self.fast_path_hits.load(Ordering::Relaxed),
            hashes_computed: self.hashes_computed.load(Ordering::Relaxed),
            sha256_comparisons: self.sha256_comparisons.load(Ordering::Relaxed),
        }
    }

    pub fn reset_counters(&self) {
        self.fast_path_hits.store(0, Ordering::Relaxed);
        self.hashes_computed.store(0, Ordering::Relaxed);
        self.sha256_comparisons.store(0, Ordering::Relaxed);
    }

    fn hash(&self, path: &Path) -> std::result::Result<FileHashes, HashError> {
        let hashes = self.engine.hash(path)?;
        self.hashes_computed.fetch_add(1, Ordering::Relaxed);
        Ok(hashes)
    }
}
