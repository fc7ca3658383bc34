//! File filtering logic for the scanner.

use crate::core::config::{FileType, FileTypes};
use std::path::Path;

/// Decides which files are candidates and what type they are
pub struct CandidateFilter {
    file_types: FileTypes,
    /// Whether to include hidden files
    include_hidden: bool,
}

impl CandidateFilter {
    pub fn new(file_types: FileTypes) -> Self {
        Self {
            file_types,
            include_hidden: false,
        }
    }

    /// Include hidden files (starting with .)
    pub fn with_hidden(mut self, include: bool) -> Self {
        self.include_hidden = include;
        self
    }

    /// Type of `path` if it should be included
    pub fn classify(&self, path: &Path) -> Option<FileType> {
        if !self.include_hidden && is_hidden(path) {
            return None;
        }

        path.extension()
            .and_then(|e| e.to_str())
            .and_then(|ext| self.file_types.classify(ext))
    }
}

impl Default for CandidateFilter {
    fn default() -> Self {
        Self::new(FileTypes::default())
    }
}

pub(crate) fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|name| name.starts_with('.'))
        .unwrap_or(false)
}
