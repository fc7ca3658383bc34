//! # Hasher Module
//!
//! Computes the identity of a file's content.
//!
//! ## Hashes
//! - **SHA-256** - full content, the only thing equality decisions rest on
//! - **aHash (Average Hash)** - optional, still images only; a hint for
//!   visually similar content, never used for data-loss decisions
//!
//! ## Performance
//! - Files above `mmap_threshold` are hashed through `memmap2`
//! - Smaller files stream through a `read_buffer_size` buffer
//!
//! ## Example
//! ```rust,ignore
//! use photo_ingest::core::config::{Capabilities, PerformanceConfig};
//! use photo_ingest::core::hasher::HashingEngine;
//!
//! let engine = HashingEngine::new(PerformanceConfig::default(), Capabilities::detect());
//! let hashes = engine.hash(&path)?;
//! println!("{} ({} bytes)", hashes.sha256(), hashes.size());
//! ```

mod content;
mod perceptual;

pub use perceptual::{is_still_image, AverageHasher, STILL_IMAGE_EXTENSIONS};

use crate::core::config::{Capabilities, PerformanceConfig};
use crate::error::HashError;
use serde::Serialize;
use std::fs::File;
use std::path::Path;
use tracing::debug;

/// Validated hashes of one file. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct FileHashes {
    sha256: String,
    size: u64,
    perceptual: Option<String>,
}

impl FileHashes {
    /// Build from raw parts.
    ///
    /// `sha256` must be exactly 64 lowercase hex characters and `size` must
    /// not be negative.
    pub fn new(sha256: String, size: i64, perceptual: Option<String>) -> Result<Self, HashError> {
        let valid = sha256.len() == 64
            && sha256
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if !valid {
            return Err(HashError::InvalidDigest { value: sha256 });
        }
        if size < 0 {
            return Err(HashError::NegativeSize { size });
        }

        Ok(Self {
            sha256,
            size: size as u64,
            perceptual,
        })
    }

    pub fn sha256(&self) -> &str {
        &self.sha256
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn perceptual(&self) -> Option<&str> {
        self.perceptual.as_deref()
    }
}

/// Computes `FileHashes` for files on disk
pub struct HashingEngine {
    config: PerformanceConfig,
    capabilities: Capabilities,
    average: AverageHasher,
}

impl HashingEngine {
    pub fn new(config: PerformanceConfig, capabilities: Capabilities) -> Self {
        Self {
            config,
            capabilities,
            average: AverageHasher::new(),
        }
    }

    pub fn config(&self) -> &PerformanceConfig {
        &self.config
    }

    /// Hash the file at `path`.
    ///
    /// I/O failures on the file itself are errors. Perceptual hashing is
    /// best effort: a failure is logged and leaves the hash absent.
    pub fn hash(&self, path: &Path) -> Result<FileHashes, HashError> {
        let mut file = File::open(path).map_err(|e| content::io_error(path, e))?;
        let size = file
            .metadata()
            .map_err(|e| content::io_error(path, e))?
            .len();

        let sha256 = content::sha256_file(path, &mut file, size, &self.config)?;
        drop(file);

        let perceptual = if self.capabilities.perceptual_hash && is_still_image(path) {
            match self.average.hash_file(path) {
                Ok(hash) => Some(hash),
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "perceptual hash unavailable");
                    None
                }
            }
        } else {
            None
        };

        debug!(path = %path.display(), size, sha256 = %sha256, "hashed file");
        FileHashes::new(sha256, size as i64, perceptual)
    }
}
