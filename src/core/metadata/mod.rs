//! # Metadata Module
//!
//! Extracts normalized photo/video metadata through an ordered fallback
//! chain, cached per (path, mtime) in the store.
//!
//! ## Sources (tried in order)
//! 1. `ExifToolSource` - `exiftool` subprocess, the richest reader, only
//!    when the binary was detected at startup
//! 2. `EmbeddedExifSource` - kamadak-exif, in process
//! 3. `FilesystemSource` - mtime, size and extension; never fails
//!
//! ## Canonical Fields
//! `Make`, `Model`, `LensModel`, `DateTime` (ISO-8601 local, no zone),
//! `ISO`, `FNumber`, `ExposureTime`, `FocalLength`, `GPSLatitude`,
//! `GPSLongitude`, `FileSize`, `FileType`, `ImageWidth`, `ImageHeight`.
//! Every field is optional; unparsable values are absent.

mod embedded;
mod exiftool;
mod filesystem;
pub mod normalize;

pub use embedded::EmbeddedExifSource;
pub use exiftool::ExifToolSource;
pub use filesystem::{minimal, FilesystemSource};

use crate::core::config::{Capabilities, PerformanceConfig};
use crate::core::store::IngestStore;
use crate::error::MetadataError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// Normalized metadata for one file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(rename = "Make", default, skip_serializing_if = "Option::is_none")]
    pub make: Option<String>,
    #[serde(rename = "Model", default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(rename = "LensModel", default, skip_serializing_if = "Option::is_none")]
    pub lens_model: Option<String>,
    /// Capture time, `YYYY-MM-DDTHH:MM:SS`
    #[serde(rename = "DateTime", default, skip_serializing_if = "Option::is_none")]
    pub date_time: Option<String>,
    #[serde(rename = "ISO", default, skip_serializing_if = "Option::is_none")]
    pub iso: Option<i64>,
    #[serde(rename = "FNumber", default, skip_serializing_if = "Option::is_none")]
    pub f_number: Option<f64>,
    /// Seconds
    #[serde(rename = "ExposureTime", default, skip_serializing_if = "Option::is_none")]
    pub exposure_time: Option<f64>,
    /// Millimetres
    #[serde(rename = "FocalLength", default, skip_serializing_if = "Option::is_none")]
    pub focal_length: Option<f64>,
    #[serde(rename = "GPSLatitude", default, skip_serializing_if = "Option::is_none")]
    pub gps_latitude: Option<f64>,
    #[serde(rename = "GPSLongitude", default, skip_serializing_if = "Option::is_none")]
    pub gps_longitude: Option<f64>,
    #[serde(rename = "FileSize", default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
    #[serde(rename = "FileType", default, skip_serializing_if = "Option::is_none")]
    pub file_type: Option<String>,
    #[serde(rename = "ImageWidth", default, skip_serializing_if = "Option::is_none")]
    pub image_width: Option<u32>,
    #[serde(rename = "ImageHeight", default, skip_serializing_if = "Option::is_none")]
    pub image_height: Option<u32>,
}

impl Metadata {
    /// Check if any camera-level metadata was extracted
    pub fn has_camera_data(&self) -> bool {
        self.make.is_some()
            || self.model.is_some()
            || self.lens_model.is_some()
            || self.iso.is_some()
            || self.f_number.is_some()
    }

    /// Get a display string for the camera
    pub fn camera_display(&self) -> Option<String> {
        match (&self.make, &self.model) {
            (Some(make), Some(model)) => {
                // Avoid duplication like "Canon Canon EOS R5"
                if model.starts_with(make.as_str()) {
                    Some(model.clone())
                } else {
                    Some(format!("{} {}", make, model))
                }
            }
            (None, Some(model)) => Some(model.clone()),
            (Some(make), None) => Some(make.clone()),
            (None, None) => None,
        }
    }
}

/// Lowercase extension without the dot
pub(crate) fn file_type_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty())
        .map(str::to_ascii_lowercase)
}

/// One tier of the fallback chain
pub trait MetadataSource: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Extract normalized metadata, or explain why this tier cannot
    fn try_extract(&self, path: &Path) -> Result<Metadata, MetadataError>;
}

/// Cache-backed metadata extraction
pub struct MetadataExtractor {
    store: Arc<dyn IngestStore>,
    sources: Vec<Box<dyn MetadataSource>>,
    use_cache: bool,
}

impl MetadataExtractor {
    /// Standard three-tier chain
    pub fn new(
        store: Arc<dyn IngestStore>,
        config: &PerformanceConfig,
        capabilities: Capabilities,
    ) -> Self {
        let sources: Vec<Box<dyn MetadataSource>> = vec![
            Box::new(ExifToolSource::new(capabilities.exiftool)),
            Box::new(EmbeddedExifSource),
            Box::new(FilesystemSource),
        ];
        Self::with_sources(store, config, sources)
    }

    /// Custom chain, tried in the given order
    pub fn with_sources(
        store: Arc<dyn IngestStore>,
        config: &PerformanceConfig,
        sources: Vec<Box<dyn MetadataSource>>,
    ) -> Self {
        Self {
            store,
            sources,
            use_cache: config.cache_metadata,
        }
    }

    /// Names of the configured sources, in order
    pub fn source_names(&self) -> Vec<&'static str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    /// Extract metadata for `path`. Never fails: when every source fails
    /// the result is `minimal(path)`.
    pub fn extract(&self, path: &Path) -> Metadata {
        if self.use_cache {
            match self.store.cached_metadata(path) {
                Ok(Some(metadata)) => {
                    debug!(path = %path.display(), "metadata cache hit");
                    return metadata;
                }
                Ok(None) => debug!(path = %path.display(), "metadata cache miss"),
                Err(e) => warn!(path = %path.display(), error = %e, "metadata cache read failed"),
            }
        }

        let metadata = self.extract_uncached(path);

        if self.use_cache {
            if let Err(e) = self.store.cache_metadata(path, &metadata) {
                warn!(path = %path.display(), error = %e, "failed to cache metadata");
            }
        }

        metadata
    }

    fn extract_uncached(&self, path: &Path) -> Metadata {
        for source in &self.sources {
            match source.try_extract(path) {
                Ok(metadata) => {
                    debug!(path = %path.display(), source = source.name(), "extracted metadata");
                    return metadata;
                }
                Err(e) => {
                    debug!(
                        path = %path.display(),
                        source = source.name(),
                        error = %e,
                        "falling back"
                    );
                }
            }
        }

        warn!(path = %path.display(), "all metadata sources failed, using minimal metadata");
        minimal(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::{CacheStore, InMemoryStore};
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixed {
        name: &'static str,
        result: Option<Metadata>,
        calls: Arc<AtomicUsize>,
    }

    impl MetadataSource for Fixed {
        fn name(&self) -> &'static str {
            self.name
        }

        fn try_extract(&self, path: &Path) -> Result<Metadata, MetadataError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result.clone().ok_or_else(|| MetadataError::Empty {
                path: path.to_path_buf(),
            })
        }
    }

    fn fixed(
        name: &'static str,
        result: Option<Metadata>,
    ) -> (Box<dyn MetadataSource>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let source = Fixed {
            name,
            result,
            calls: Arc::clone(&calls),
        };
        (Box::new(source), calls)
    }

    fn canon() -> Metadata {
        Metadata {
            make: Some("Canon".into()),
            model: Some("EOS R5".into()),
            ..Metadata::default()
        }
    }

    #[test]
    fn serializes_with_canonical_keys() {
        let metadata = Metadata {
            make: Some("Canon".into()),
            gps_latitude: Some(1.5),
            iso: Some(100),
            ..Metadata::default()
        };
        let json = serde_json::to_value(&metadata).unwrap();

        assert_eq!(json["Make"], "Canon");
        assert_eq!(json["GPSLatitude"], 1.5);
        assert_eq!(json["ISO"], 100);
        assert!(json.get("Model").is_none());
    }

    #[test]
    fn first_successful_source_wins() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("a.jpg");
        fs::write(&path, b"x").unwrap();

        let (failing, failing_calls) = fixed("failing", None);
        let (good, _) = fixed("good", Some(canon()));
        let (never, never_calls) = fixed("never", Some(Metadata::default()));
        let extractor = MetadataExtractor::with_sources(
            Arc::new(InMemoryStore::new()),
            &PerformanceConfig::default(),
            vec![failing, good, never],
        );

        assert_eq!(extractor.extract(&path), canon());
        assert_eq!(failing_calls.load(Ordering::SeqCst), 1);
        assert_eq!(never_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn second_extract_is_served_from_cache() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("a.jpg");
        fs::write(&path, b"x").unwrap();

        let store = Arc::new(InMemoryStore::new());
        let (good, calls) = fixed("good", Some(canon()));
        let extractor = MetadataExtractor::with_sources(
            store.clone(),
            &PerformanceConfig::default(),
            vec![good],
        );

        extractor.extract(&path);
        extractor.extract(&path);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.cached_metadata(&path).unwrap(), Some(canon()));
    }

    #[test]
    fn cache_disabled_always_extracts() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("a.jpg");
        fs::write(&path, b"x").unwrap();

        let store = Arc::new(InMemoryStore::new());
        let (good, calls) = fixed("good", Some(canon()));
        let config = PerformanceConfig::default().cache_metadata(false);
        let extractor = MetadataExtractor::with_sources(store.clone(), &config, vec![good]);

        extractor.extract(&path);
        extractor.extract(&path);

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(store.cached_metadata(&path).unwrap().is_none());
    }

    #[test]
    fn all_sources_failing_gives_minimal() {
        let (failing, _) = fixed("failing", None);
        let extractor = MetadataExtractor::with_sources(
            Arc::new(InMemoryStore::new()),
            &PerformanceConfig::default(),
            vec![failing],
        );

        let metadata = extractor.extract(Path::new("/nonexistent/IMG_2.CR3"));
        assert_eq!(metadata.file_size, Some(0));
        assert_eq!(metadata.file_type.as_deref(), Some("cr3"));
    }

    #[test]
    fn default_chain_without_exiftool_reaches_filesystem() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("clip.mp4");
        fs::write(&path, vec![1u8; 64]).unwrap();

        let extractor = MetadataExtractor::new(
            Arc::new(InMemoryStore::new()),
            &PerformanceConfig::default(),
            Capabilities::embedded_only(),
        );

        assert_eq!(
            extractor.source_names(),
            vec!["exiftool", "embedded-exif", "filesystem"]
        );
        let metadata = extractor.extract(&path);
        assert_eq!(metadata.file_size, Some(64));
        assert_eq!(metadata.file_type.as_deref(), Some("mp4"));
        assert!(!metadata.has_camera_data());
    }

    #[test]
    fn camera_display_avoids_duplication() {
        let metadata = Metadata {
            make: Some("Apple".into()),
            model: Some("Apple iPhone 15 Pro".into()),
            ..Metadata::default()
        };
        assert_eq!(metadata.camera_display().as_deref(), Some("Apple iPhone 15 Pro"));
    }
}
