//! Performance settings, file-type mapping and optional-capability flags.
//!
//! Capabilities are detected once at startup and handed to the components
//! that need them, so no component re-checks for external tools per file.

use crate::error::IngestError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use tracing::{info, warn};

/// Files above this size are hashed through a memory map (1 MiB)
pub const DEFAULT_MMAP_THRESHOLD: u64 = 1024 * 1024;

/// Read buffer for streaming hashes (64 KiB)
pub const DEFAULT_READ_BUFFER: usize = 64 * 1024;

/// Name of the external metadata tool
pub const EXIFTOOL_BINARY: &str = "exiftool";

/// Where the store lives unless told otherwise:
/// `<data dir>/photo-ingest/hashes.sqlite`
pub fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("photo-ingest")
        .join("hashes.sqlite")
}

/// Tuning knobs for hashing, extraction and batched writes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    /// Worker threads per batch (1 = sequential)
    pub parallel_workers: usize,
    /// Records buffered before a group commit
    pub batch_size: usize,
    /// Consult and populate the metadata cache
    pub cache_metadata: bool,
    /// Skip files in directories the store reports unchanged
    pub incremental_processing: bool,
    /// Hash large files through a memory map
    pub memory_mapped_hashing: bool,
    /// Size above which memory-mapped hashing kicks in
    pub mmap_threshold: u64,
    /// Buffer size for streaming reads
    pub read_buffer_size: usize,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            parallel_workers: 4,
            batch_size: 100,
            cache_metadata: true,
            incremental_processing: true,
            memory_mapped_hashing: true,
            mmap_threshold: DEFAULT_MMAP_THRESHOLD,
            read_buffer_size: DEFAULT_READ_BUFFER,
        }
    }
}

impl PerformanceConfig {
    /// Create a configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parallel_workers(mut self, workers: usize) -> Self {
        self.parallel_workers = workers;
        self
    }

    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    pub fn cache_metadata(mut self, enabled: bool) -> Self {
        self.cache_metadata = enabled;
        self
    }

    pub fn incremental_processing(mut self, enabled: bool) -> Self {
        self.incremental_processing = enabled;
        self
    }

    pub fn memory_mapped_hashing(mut self, enabled: bool) -> Self {
        self.memory_mapped_hashing = enabled;
        self
    }

    pub fn mmap_threshold(mut self, bytes: u64) -> Self {
        self.mmap_threshold = bytes;
        self
    }

    pub fn read_buffer_size(mut self, bytes: usize) -> Self {
        self.read_buffer_size = bytes;
        self
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.parallel_workers == 0 {
            return Err(IngestError::Config(
                "parallel_workers must be positive".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(IngestError::Config(
                "batch_size must be positive".to_string(),
            ));
        }
        if self.read_buffer_size == 0 {
            return Err(IngestError::Config(
                "read_buffer_size must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Broad media category of a candidate file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Raw,
    Jpeg,
    Video,
}

impl FileType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileType::Raw => "raw",
            FileType::Jpeg => "jpeg",
            FileType::Video => "video",
        }
    }
}

impl std::fmt::Display for FileType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Extensions (lowercase, no dot) recognized for each file type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileTypes {
    pub raw: Vec<String>,
    pub jpeg: Vec<String>,
    pub video: Vec<String>,
}

fn owned(extensions: &[&str]) -> Vec<String> {
    extensions.iter().map(|e| e.to_string()).collect()
}

impl Default for FileTypes {
    fn default() -> Self {
        Self {
            raw: owned(&["nef", "cr3", "cr2", "arw", "dng", "orf", "raf", "rw2"]),
            jpeg: owned(&["jpg", "jpeg", "heic", "heif"]),
            video: owned(&["mp4", "mov", "avi", "mkv"]),
        }
    }
}

impl FileTypes {
    /// Type for an extension, ignoring case and a leading dot
    pub fn classify(&self, extension: &str) -> Option<FileType> {
        let ext = extension.trim_start_matches('.').to_ascii_lowercase();
        let has = |list: &[String]| list.iter().any(|e| e.eq_ignore_ascii_case(&ext));

        if has(&self.raw) {
            Some(FileType::Raw)
        } else if has(&self.jpeg) {
            Some(FileType::Jpeg)
        } else if has(&self.video) {
            Some(FileType::Video)
        } else {
            None
        }
    }
}

/// Optional capabilities available to this process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    /// The `exiftool` binary answered `-ver`
    pub exiftool: bool,
    /// Perceptual hashing of still images
    pub perceptual_hash: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            exiftool: false,
            perceptual_hash: true,
        }
    }
}

impl Capabilities {
    /// Probe the environment once
    pub fn detect() -> Self {
        let exiftool = match exiftool_version() {
            Some(version) => {
                info!(version = %version, "exiftool available");
                true
            }
            None => {
                warn!("exiftool binary not found, falling back to embedded EXIF reader");
                false
            }
        };

        Self {
            exiftool,
            perceptual_hash: true,
        }
    }

    /// Only in-process capabilities; never shells out
    pub fn embedded_only() -> Self {
        Self::default()
    }

    pub fn with_exiftool(mut self, available: bool) -> Self {
        self.exiftool = available;
        self
    }

    pub fn with_perceptual_hash(mut self, available: bool) -> Self {
        self.perceptual_hash = available;
        self
    }
}

fn exiftool_version() -> Option<String> {
    let output = Command::new(EXIFTOOL_BINARY)
        .arg("-ver")
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()
        .ok()?;

    if !output.status.success() {
        return None;
    }

    Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = PerformanceConfig::default();
        assert_eq!(config.parallel_workers, 4);
        assert_eq!(config.batch_size, 100);
        assert_eq!(config.mmap_threshold, 1024 * 1024);
        assert!(config.memory_mapped_hashing);
        assert!(config.cache_metadata);
    }

    #[test]
    fn builder_overrides_fields() {
        let config = PerformanceConfig::new()
            .parallel_workers(8)
            .batch_size(10)
            .memory_mapped_hashing(false);

        assert_eq!(config.parallel_workers, 8);
        assert_eq!(config.batch_size, 10);
        assert!(!config.memory_mapped_hashing);
    }

    #[test]
    fn zero_workers_is_rejected() {
        let config = PerformanceConfig::new().parallel_workers(0);
        assert!(matches!(config.validate(), Err(IngestError::Config(_))));
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let config = PerformanceConfig::new().batch_size(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: PerformanceConfig =
            serde_json::from_str(r#"{"parallel_workers": 2}"#).unwrap();
        assert_eq!(config.parallel_workers, 2);
        assert_eq!(config.batch_size, 100);
    }

    #[test]
    fn file_types_classify_case_insensitively() {
        let types = FileTypes::default();
        assert_eq!(types.classify("NEF"), Some(FileType::Raw));
        assert_eq!(types.classify(".heic"), Some(FileType::Jpeg));
        assert_eq!(types.classify("mov"), Some(FileType::Video));
        assert_eq!(types.classify("txt"), None);
    }

    #[test]
    fn custom_file_types_from_json() {
        let types: FileTypes = serde_json::from_str(r#"{"raw": ["3fr"]}"#).unwrap();
        assert_eq!(types.classify("3FR"), Some(FileType::Raw));
        assert_eq!(types.classify("nef"), None);
        assert_eq!(types.classify("jpg"), Some(FileType::Jpeg));
    }

    #[test]
    fn default_database_path_names_the_file() {
        let path = default_database_path();
        assert!(path.ends_with("photo-ingest/hashes.sqlite"));
    }

    #[test]
    fn embedded_only_never_uses_exiftool() {
        let caps = Capabilities::embedded_only();
        assert!(!caps.exiftool);
        assert!(caps.perceptual_hash);
    }
}
