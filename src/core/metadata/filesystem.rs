//! Last-resort source: what the filesystem alone can tell us.

use super::normalize::ISO_FORMAT;
use super::{file_type_of, Metadata, MetadataSource};
use crate::error::MetadataError;
use chrono::{DateTime, Local};
use std::fs;
use std::path::Path;
use std::time::SystemTime;

/// mtime as `DateTime`, size, and extension as `FileType`
pub struct FilesystemSource;

impl MetadataSource for FilesystemSource {
    fn name(&self) -> &'static str {
        "filesystem"
    }

    fn try_extract(&self, path: &Path) -> Result<Metadata, MetadataError> {
        match fs::metadata(path) {
            Ok(stat) => Ok(Metadata {
                date_time: stat.modified().ok().map(local_iso),
                file_size: Some(stat.len()),
                file_type: file_type_of(path),
                ..Metadata::default()
            }),
            Err(_) => Ok(minimal(path)),
        }
    }
}

/// Metadata for a file nothing could be read from: current time, the
/// extension, and a zero size
pub fn minimal(path: &Path) -> Metadata {
    Metadata {
        date_time: Some(local_iso(SystemTime::now())),
        file_size: Some(0),
        file_type: file_type_of(path),
        ..Metadata::default()
    }
}

fn local_iso(time: SystemTime) -> String {
    DateTime::<Local>::from(time).format(ISO_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_size_type_and_mtime() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("clip.MOV");
        fs::write(&path, vec![0u8; 1234]).unwrap();

        let metadata = FilesystemSource.try_extract(&path).unwrap();
        assert_eq!(metadata.file_size, Some(1234));
        assert_eq!(metadata.file_type.as_deref(), Some("mov"));
        assert_eq!(metadata.date_time.as_ref().map(String::len), Some(19));
    }

    #[test]
    fn unreadable_file_yields_minimal() {
        let metadata = FilesystemSource
            .try_extract(Path::new("/nonexistent/IMG_1.HEIC"))
            .unwrap();
        assert_eq!(metadata.file_size, Some(0));
        assert_eq!(metadata.file_type.as_deref(), Some("heic"));
        assert!(metadata.date_time.is_some());
    }
}
