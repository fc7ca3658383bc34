//! # Photo Ingest
//!
//! Content-addressable deduplication and metadata caching for photo and
//! video ingest.
//!
//! ## Core Guarantees
//! - **No false duplicates** - only byte-identical content (SHA-256) is
//!   ever reported as a duplicate
//! - **No silent re-imports** - every ingested hash is recorded durably
//! - **Cheap rescans** - unchanged files and directories are recognized
//!   by path and mtime without rereading them
//!
//! ## Architecture
//! - `core` - store, hashing, metadata, duplicate resolution, batching
//! - `events` - Channel-based progress reporting
//! - `error` - Error types with recovery hints

pub mod core;
pub mod error;
pub mod events;

// Re-export commonly used types at the crate root
pub use error::{IngestError, Result};

use tracing_subscriber::EnvFilter;

/// Initialize tracing for the application
///
/// Called by the binary, never by the library. `RUST_LOG` wins when set;
/// otherwise the filter is `debug` with `verbose` and `warn` without.
/// Logs go to stderr so JSON on stdout stays clean.
pub fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();

    // A second call (e.g. from tests) keeps the first subscriber
    let _ = tracing::subscriber::set_global_default(subscriber);
}
