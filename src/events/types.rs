//! Event type definitions for progress reporting.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// All events emitted by the ingest core
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    /// File listing events
    Scan(ScanEvent),
    /// Batch hashing, extraction and checking events
    Batch(BatchEvent),
}

/// Events during file listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ScanEvent {
    /// Scanning has started
    Started { paths: Vec<PathBuf> },
    /// Progress update during scanning
    Progress(ScanProgress),
    /// A candidate file was found
    FileFound { path: PathBuf },
    /// A directory's files were skipped because it is unchanged
    DirectorySkipped { path: PathBuf },
    /// An error occurred but scanning continues
    Error { path: PathBuf, message: String },
    /// Scanning completed
    Completed {
        total_files: usize,
        directories_skipped: usize,
    },
}

/// Progress information during scanning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanProgress {
    /// Number of directories scanned so far
    pub directories_scanned: usize,
    /// Number of candidate files found so far
    pub files_found: usize,
    /// Current directory being scanned
    pub current_path: PathBuf,
}

/// Which batch operation an event belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchOperation {
    Extract,
    Hash,
    Check,
}

impl std::fmt::Display for BatchOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BatchOperation::Extract => write!(f, "Extracting metadata"),
            BatchOperation::Hash => write!(f, "Hashing"),
            BatchOperation::Check => write!(f, "Checking duplicates"),
        }
    }
}

/// Events from the batch coordinator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BatchEvent {
    /// A batch has started
    Started {
        operation: BatchOperation,
        total: usize,
    },
    /// One file finished (successfully or not)
    Progress(BatchProgress),
    /// A file failed; the batch continues
    Error { path: PathBuf, message: String },
    /// A batch finished
    Completed {
        operation: BatchOperation,
        succeeded: usize,
        failed: usize,
    },
    /// Buffered records were committed to the store
    Flushed { records: usize },
}

/// Progress information during a batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchProgress {
    pub operation: BatchOperation,
    /// Files finished so far
    pub completed: usize,
    /// Files in the batch
    pub total: usize,
    /// File that just finished
    pub current_path: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_are_serializable() {
        let event = Event::Scan(ScanEvent::Progress(ScanProgress {
            directories_scanned: 10,
            files_found: 50,
            current_path: PathBuf::from("/photos"),
        }));

        let json = serde_json::to_string(&event).unwrap();
        let deserialized: Event = serde_json::from_str(&json).unwrap();

        match deserialized {
            Event::Scan(ScanEvent::Progress(p)) => {
                assert_eq!(p.files_found, 50);
            }
            _ => panic!("Wrong event type"),
        }
    }

    #[test]
    fn batch_operation_display() {
        assert_eq!(BatchOperation::Hash.to_string(), "Hashing");
        assert_eq!(BatchOperation::Check.to_string(), "Checking duplicates");
    }
}
