//! # Core Module
//!
//! The ingest engine.
//!
//! ## Modules
//! - `store` - Durable file records plus metadata and directory caches
//! - `hasher` - SHA-256 and perceptual hashes
//! - `metadata` - Fallback-chain metadata extraction
//! - `dedup` - New / duplicate / similar verdicts
//! - `batch` - Parallel batches and buffered record writes
//! - `scanner` - Lists candidate files
//! - `config` - Performance settings, file types, capabilities

pub mod batch;
pub mod config;
pub mod dedup;
pub mod hasher;
pub mod metadata;
pub mod scanner;
pub mod store;

// Re-export commonly used types
pub use batch::{BatchCoordinator, RecordDetails};
pub use config::{Capabilities, FileType, FileTypes, PerformanceConfig};
pub use dedup::{DuplicateCheckResult, DuplicateResolver, DuplicateStatus};
pub use hasher::{FileHashes, HashingEngine};
pub use metadata::{Metadata, MetadataExtractor};
pub use scanner::CandidateFile;
pub use store::{FileRecord, IngestStore, InMemoryStore, SqliteStore, StoreStats};
