//! `exiftool` subprocess source.
//!
//! Runs `exiftool -json -G -n <path>`: group-prefixed keys (`EXIF:Make`)
//! and numeric values, so no locale-formatted strings need parsing.

use super::normalize::{float_value, int_value, parse_datetime, text_value};
use super::{Metadata, MetadataSource};
use crate::core::config::EXIFTOOL_BINARY;
use crate::error::MetadataError;
use serde_json::{Map, Value};
use std::path::Path;
use std::process::{Command, Stdio};
use tracing::debug;

const MAKE: &[&str] = &["EXIF:Make", "QuickTime:Make", "Make"];
const MODEL: &[&str] = &["EXIF:Model", "QuickTime:Model", "Model"];
const LENS: &[&str] = &["EXIF:LensModel", "LensModel", "EXIF:Lens", "Lens"];
const DATES: &[&str] = &[
    "EXIF:DateTimeOriginal",
    "EXIF:CreateDate",
    "EXIF:DateTime",
    "QuickTime:CreateDate",
    "QuickTime:MediaCreateDate",
    "DateTimeOriginal",
    "CreateDate",
    "DateTime",
];
const ISO: &[&str] = &["EXIF:ISO", "ISO"];
const FNUMBER: &[&str] = &["EXIF:FNumber", "FNumber"];
const EXPOSURE: &[&str] = &["EXIF:ExposureTime", "ExposureTime"];
const FOCAL: &[&str] = &["EXIF:FocalLength", "FocalLength"];
const LATITUDE: &[&str] = &["EXIF:GPSLatitude", "Composite:GPSLatitude", "GPSLatitude"];
const LONGITUDE: &[&str] = &["EXIF:GPSLongitude", "Composite:GPSLongitude", "GPSLongitude"];
const FILE_SIZE: &[&str] = &["File:FileSize", "FileSize"];
const FILE_TYPE: &[&str] = &["File:FileType", "FileType"];
const WIDTH: &[&str] = &[
    "EXIF:ImageWidth",
    "File:ImageWidth",
    "QuickTime:ImageWidth",
    "ImageWidth",
];
const HEIGHT: &[&str] = &[
    "EXIF:ImageHeight",
    "File:ImageHeight",
    "QuickTime:ImageHeight",
    "ImageHeight",
];

/// Out-of-process extraction through the `exiftool` binary
pub struct ExifToolSource {
    available: bool,
}

impl ExifToolSource {
    /// `available` comes from `Capabilities::exiftool`; when false the
    /// source never spawns a process.
    pub fn new(available: bool) -> Self {
        Self { available }
    }
}

impl MetadataSource for ExifToolSource {
    fn name(&self) -> &'static str {
        "exiftool"
    }

    fn try_extract(&self, path: &Path) -> Result<Metadata, MetadataError> {
        if !self.available {
            return Err(MetadataError::Unavailable {
                source_name: self.name(),
            });
        }

        let output = Command::new(EXIFTOOL_BINARY)
            .args(["-json", "-G", "-n"])
            .arg(path)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| MetadataError::ToolFailed {
                tool: EXIFTOOL_BINARY,
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            debug!(
                file_path = ?path,
                status = ?output.status,
                stderr = %stderr.trim(),
                "exiftool exited with failure"
            );
            return Err(MetadataError::ToolFailed {
                tool: EXIFTOOL_BINARY,
                path: path.to_path_buf(),
                reason: format!("exit status {}", output.status),
            });
        }

        parse_document(path, &output.stdout)
    }
}

/// Parse exiftool's JSON output (an array with one object per file)
pub(crate) fn parse_document(path: &Path, stdout: &[u8]) -> Result<Metadata, MetadataError> {
    let json: Value = serde_json::from_slice(stdout).map_err(|e| MetadataError::Malformed {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let object = match &json {
        Value::Array(items) => items.first().and_then(Value::as_object),
        Value::Object(object) => Some(object),
        _ => None,
    };

    match object {
        Some(object) if !object.is_empty() => Ok(normalize(object)),
        _ => Err(MetadataError::Empty {
            path: path.to_path_buf(),
        }),
    }
}

fn lookup<'a>(raw: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| raw.get(*key))
        .find(|value| match value {
            Value::Null => false,
            Value::String(s) => !s.trim().is_empty(),
            _ => true,
        })
}

fn normalize(raw: &Map<String, Value>) -> Metadata {
    let date_time = DATES
        .iter()
        .filter_map(|key| raw.get(*key))
        .filter_map(text_value)
        .find_map(|s| parse_datetime(&s));

    // Coordinates only make sense as a pair
    let (gps_latitude, gps_longitude) = match (
        lookup(raw, LATITUDE).and_then(float_value),
        lookup(raw, LONGITUDE).and_then(float_value),
    ) {
        (Some(lat), Some(lon)) => (Some(lat), Some(lon)),
        _ => (None, None),
    };

    Metadata {
        make: lookup(raw, MAKE).and_then(text_value),
        model: lookup(raw, MODEL).and_then(text_value),
        lens_model: lookup(raw, LENS).and_then(text_value),
        date_time,
        iso: lookup(raw, ISO).and_then(int_value),
        f_number: lookup(raw, FNUMBER).and_then(float_value),
        exposure_time: lookup(raw, EXPOSURE).and_then(float_value),
        focal_length: lookup(raw, FOCAL).and_then(float_value),
        gps_latitude,
        gps_longitude,
        file_size: lookup(raw, FILE_SIZE)
            .and_then(int_value)
            .and_then(|n| u64::try_from(n).ok()),
        file_type: lookup(raw, FILE_TYPE).and_then(text_value),
        image_width: lookup(raw, WIDTH)
            .and_then(int_value)
            .and_then(|n| u32::try_from(n).ok()),
        image_height: lookup(raw, HEIGHT)
            .and_then(int_value)
            .and_then(|n| u32::try_from(n).ok()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"[{
        "SourceFile": "/photos/DSC_0001.NEF",
        "File:FileSize": 25165824,
        "File:FileType": "NEF",
        "EXIF:Make": "NIKON CORPORATION",
        "EXIF:Model": "NIKON Z 6_2",
        "EXIF:LensModel": "NIKKOR Z 24-70mm f/4 S",
        "EXIF:DateTimeOriginal": "2024:03:02 14:05:33",
        "EXIF:ISO": 800,
        "EXIF:FNumber": 4,
        "EXIF:ExposureTime": 0.004,
        "EXIF:FocalLength": 35,
        "EXIF:ImageWidth": 6048,
        "EXIF:ImageHeight": 4024,
        "Composite:GPSLatitude": 51.5007,
        "Composite:GPSLongitude": -0.1246
    }]"#;

    #[test]
    fn normalizes_grouped_keys() {
        let metadata = parse_document(Path::new("a.nef"), SAMPLE.as_bytes()).unwrap();

        assert_eq!(metadata.make.as_deref(), Some("NIKON CORPORATION"));
        assert_eq!(metadata.model.as_deref(), Some("NIKON Z 6_2"));
        assert_eq!(metadata.lens_model.as_deref(), Some("NIKKOR Z 24-70mm f/4 S"));
        assert_eq!(metadata.date_time.as_deref(), Some("2024-03-02T14:05:33"));
        assert_eq!(metadata.iso, Some(800));
        assert_eq!(metadata.f_number, Some(4.0));
        assert_eq!(metadata.exposure_time, Some(0.004));
        assert_eq!(metadata.focal_length, Some(35.0));
        assert_eq!(metadata.gps_latitude, Some(51.5007));
        assert_eq!(metadata.gps_longitude, Some(-0.1246));
        assert_eq!(metadata.file_size, Some(25_165_824));
        assert_eq!(metadata.file_type.as_deref(), Some("NEF"));
        assert_eq!(metadata.image_width, Some(6048));
        assert_eq!(metadata.image_height, Some(4024));
    }

    #[test]
    fn falls_back_to_ungrouped_keys_and_fractions() {
        let doc = br#"[{"Make": "Canon", "FNumber": "28/10", "CreateDate": "2022:01:01 10:00:00"}]"#;
        let metadata = parse_document(Path::new("a.jpg"), doc).unwrap();

        assert_eq!(metadata.make.as_deref(), Some("Canon"));
        assert_eq!(metadata.f_number, Some(2.8));
        assert_eq!(metadata.date_time.as_deref(), Some("2022-01-01T10:00:00"));
    }

    #[test]
    fn reads_quicktime_groups_for_video() {
        let doc = br#"[{
            "SourceFile": "clip.mov",
            "File:FileSize": 1048576,
            "File:FileType": "MOV",
            "QuickTime:CreateDate": "2023:07:14 18:30:00",
            "QuickTime:Make": "Apple",
            "QuickTime:Model": "iPhone 14 Pro",
            "QuickTime:ImageWidth": 3840,
            "QuickTime:ImageHeight": 2160
        }]"#;
        let metadata = parse_document(Path::new("clip.mov"), doc).unwrap();

        assert_eq!(metadata.date_time.as_deref(), Some("2023-07-14T18:30:00"));
        assert_eq!(metadata.make.as_deref(), Some("Apple"));
        assert_eq!(metadata.model.as_deref(), Some("iPhone 14 Pro"));
        assert_eq!(metadata.image_width, Some(3840));
        assert_eq!(metadata.image_height, Some(2160));
    }

    #[test]
    fn unset_quicktime_date_falls_through_to_media_date() {
        let doc = br#"[{
            "QuickTime:CreateDate": "0000:00:00 00:00:00",
            "QuickTime:MediaCreateDate": "2023:07:14 18:30:05"
        }]"#;
        let metadata = parse_document(Path::new("clip.mp4"), doc).unwrap();

        assert_eq!(metadata.date_time.as_deref(), Some("2023-07-14T18:30:05"));
    }

    #[test]
    fn skips_unparsable_dates_for_later_ones() {
        let doc = br#"[{"EXIF:DateTimeOriginal": "0000:00:00 00:00:00", "EXIF:DateTime": "2021:05:06 07:08:09"}]"#;
        let metadata = parse_document(Path::new("a.jpg"), doc).unwrap();

        assert_eq!(metadata.date_time.as_deref(), Some("2021-05-06T07:08:09"));
    }

    #[test]
    fn lone_coordinate_is_dropped() {
        let doc = br#"[{"EXIF:Make": "Sony", "EXIF:GPSLatitude": 10.5}]"#;
        let metadata = parse_document(Path::new("a.arw"), doc).unwrap();

        assert_eq!(metadata.gps_latitude, None);
        assert_eq!(metadata.gps_longitude, None);
    }

    #[test]
    fn malformed_json_is_an_error() {
        let result = parse_document(Path::new("a.jpg"), b"Error: file not found");
        assert!(matches!(result, Err(MetadataError::Malformed { .. })));
    }

    #[test]
    fn empty_document_is_an_error() {
        assert!(matches!(
            parse_document(Path::new("a.jpg"), b"[]"),
            Err(MetadataError::Empty { .. })
        ));
        assert!(matches!(
            parse_document(Path::new("a.jpg"), b"[{}]"),
            Err(MetadataError::Empty { .. })
        ));
    }

    #[test]
    fn unavailable_source_never_spawns() {
        let source = ExifToolSource::new(false);
        assert!(matches!(
            source.try_extract(Path::new("/does/not/matter.jpg")),
            Err(MetadataError::Unavailable { .. })
        ));
    }
}
