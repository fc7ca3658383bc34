//! # Error Module
//!
//! Error types for the ingest core.
//!
//! ## Design Principles
//! - **Never panic** on user data - return errors instead
//! - **Include context** - paths, hash values, what went wrong
//! - **Recovery hints** - suggest how to fix when possible
//!
//! Best-effort paths (metadata cache writes, perceptual hashing, metadata
//! fallback tiers) log and swallow their errors; everything else surfaces
//! one of these types to the caller.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Top-level error for the ingest core
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Scanning error: {0}")]
    Scan(#[from] ScanError),

    #[error("Hashing error: {0}")]
    Hash(#[from] HashError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Metadata error: {0}")]
    Metadata(#[from] MetadataError),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Errors that occur while listing candidate files
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Directory not found: {path}")]
    DirectoryNotFound { path: PathBuf },

    #[error("Permission denied accessing: {path}")]
    PermissionDenied { path: PathBuf },

    #[error("Failed to read {path}: {source}")]
    ReadEntry {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ScanError {
    /// Path the error is about
    pub fn path(&self) -> &Path {
        match self {
            ScanError::DirectoryNotFound { path }
            | ScanError::PermissionDenied { path }
            | ScanError::ReadEntry { path, .. } => path,
        }
    }
}

/// Errors that occur while hashing a file
#[derive(Error, Debug)]
pub enum HashError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid SHA-256 digest {value:?}: expected 64 lowercase hex characters")]
    InvalidDigest { value: String },

    #[error("Invalid file size {size}: size cannot be negative")]
    NegativeSize { size: i64 },

    #[error("Failed to decode image {path}: {reason}")]
    DecodeError { path: PathBuf, reason: String },
}

/// Errors raised by the persistent store
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to open store at {path}: {reason}")]
    OpenFailed { path: PathBuf, reason: String },

    #[error("Database query failed: {0}")]
    QueryFailed(String),

    #[error("Store at {path} is unusable (a previous operation panicked). Reopen it and try again.")]
    Poisoned { path: PathBuf },

    #[error("Failed to serialize cache payload: {0}")]
    SerializationFailed(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(error: rusqlite::Error) -> Self {
        StoreError::QueryFailed(error.to_string())
    }
}

/// Errors from a single metadata source. These never escape the fallback
/// chain; they only decide whether the next source is tried.
#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("{source_name} is not available")]
    Unavailable { source_name: &'static str },

    #[error("Failed to run {tool} on {path}: {reason}")]
    ToolFailed {
        tool: &'static str,
        path: PathBuf,
        reason: String,
    },

    #[error("Malformed metadata for {path}: {reason}")]
    Malformed { path: PathBuf, reason: String },

    #[error("No metadata found in {path}")]
    Empty { path: PathBuf },

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Convenience Result type alias
pub type Result<T> = std::result::Result<T, IngestError>;
