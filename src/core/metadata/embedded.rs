//! In-process EXIF reader built on kamadak-exif.

use super::normalize::{non_empty, parse_datetime};
use super::{file_type_of, Metadata, MetadataSource};
use crate::error::MetadataError;
use exif::{Exif, In, Reader, Tag, Value};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::debug;

/// Reads the EXIF block embedded in JPEG, TIFF, HEIF and most RAW containers
pub struct EmbeddedExifSource;

impl MetadataSource for EmbeddedExifSource {
    fn name(&self) -> &'static str {
        "embedded-exif"
    }

    fn try_extract(&self, path: &Path) -> Result<Metadata, MetadataError> {
        let file = File::open(path).map_err(|e| MetadataError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let file_size = file.metadata().ok().map(|m| m.len());

        let mut bufreader = BufReader::new(file);
        let exif = Reader::new()
            .read_from_container(&mut bufreader)
            .map_err(|e| {
                debug!(file_path = ?path, error = %e, "no EXIF block");
                MetadataError::Empty {
                    path: path.to_path_buf(),
                }
            })?;

        let mut metadata = from_exif(&exif);
        metadata.file_size = file_size;
        metadata.file_type = file_type_of(path);

        // Container dimensions beat missing tags
        if metadata.image_width.is_none() || metadata.image_height.is_none() {
            if let Ok((width, height)) = image::image_dimensions(path) {
                metadata.image_width = Some(width);
                metadata.image_height = Some(height);
            }
        }

        Ok(metadata)
    }
}

fn from_exif(exif: &Exif) -> Metadata {
    let field = |tag: Tag| exif.get_field(tag, In::PRIMARY).map(|f| &f.value);

    let date_time = [Tag::DateTimeOriginal, Tag::DateTimeDigitized, Tag::DateTime]
        .into_iter()
        .filter_map(field)
        .filter_map(string_value)
        .find_map(|s| parse_datetime(&s));

    let (gps_latitude, gps_longitude) = match (
        coordinate(exif, Tag::GPSLatitude, Tag::GPSLatitudeRef, 'S'),
        coordinate(exif, Tag::GPSLongitude, Tag::GPSLongitudeRef, 'W'),
    ) {
        (Some(lat), Some(lon)) => (Some(lat), Some(lon)),
        _ => (None, None),
    };

    Metadata {
        make: field(Tag::Make).and_then(string_value),
        model: field(Tag::Model).and_then(string_value),
        lens_model: field(Tag::LensModel).and_then(string_value),
        date_time,
        iso: field(Tag::PhotographicSensitivity)
            .and_then(|v| v.get_uint(0))
            .map(i64::from),
        f_number: field(Tag::FNumber).and_then(rational_value),
        exposure_time: field(Tag::ExposureTime).and_then(rational_value),
        focal_length: field(Tag::FocalLength).and_then(rational_value),
        gps_latitude,
        gps_longitude,
        file_size: None,
        file_type: None,
        image_width: field(Tag::PixelXDimension)
            .or_else(|| field(Tag::ImageWidth))
            .and_then(|v| v.get_uint(0)),
        image_height: field(Tag::PixelYDimension)
            .or_else(|| field(Tag::ImageLength))
            .and_then(|v| v.get_uint(0)),
    }
}

/// Helper to extract string from EXIF ASCII value
fn string_value(value: &Value) -> Option<String> {
    match value {
        Value::Ascii(vec) => vec
            .first()
            .and_then(|bytes| std::str::from_utf8(bytes).ok())
            .and_then(non_empty),
        _ => None,
    }
}

fn rational_value(value: &Value) -> Option<f64> {
    let ratio = match value {
        Value::Rational(v) => v.first().map(|r| (r.num as f64, r.denom as f64)),
        Value::SRational(v) => v.first().map(|r| (r.num as f64, r.denom as f64)),
        _ => None,
    };
    match ratio {
        Some((_, den)) if den == 0.0 => None,
        Some((num, den)) => Some(num / den),
        None => None,
    }
}

fn coordinate(exif: &Exif, tag: Tag, ref_tag: Tag, negative: char) -> Option<f64> {
    let Value::Rational(parts) = &exif.get_field(tag, In::PRIMARY)?.value else {
        return None;
    };
    if parts.len() < 3 || parts.iter().any(|r| r.denom == 0) {
        return None;
    }

    let degrees = parts[0].to_f64() + parts[1].to_f64() / 60.0 + parts[2].to_f64() / 3600.0;
    let is_negative = exif
        .get_field(ref_tag, In::PRIMARY)
        .map(|f| f.display_value().to_string().contains(negative))
        .unwrap_or(false);

    Some(if is_negative { -degrees } else { degrees })
}

#[cfg(test)]
mod tests {
    use super::*;
    use exif::Rational;

    #[test]
    fn string_value_trims_nul_padding() {
        let value = Value::Ascii(vec![b"Canon\0\0".to_vec()]);
        assert_eq!(string_value(&value).as_deref(), Some("Canon"));
    }

    #[test]
    fn blank_string_is_absent() {
        let value = Value::Ascii(vec![b"   ".to_vec()]);
        assert_eq!(string_value(&value), None);
    }

    #[test]
    fn rational_divides() {
        let value = Value::Rational(vec![Rational { num: 28, denom: 10 }]);
        assert_eq!(rational_value(&value), Some(2.8));
    }

    #[test]
    fn zero_denominator_is_absent() {
        let value = Value::Rational(vec![Rational { num: 1, denom: 0 }]);
        assert_eq!(rational_value(&value), None);
    }

    #[test]
    fn file_without_exif_falls_through() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("plain.jpg");
        std::fs::write(&path, b"no exif here").unwrap();

        assert!(matches!(
            EmbeddedExifSource.try_extract(&path),
            Err(MetadataError::Empty { .. })
        ));
    }

    #[test]
    fn missing_file_is_io_error() {
        assert!(matches!(
            EmbeddedExifSource.try_extract(Path::new("/nonexistent/file.jpg")),
            Err(MetadataError::Io { .. })
        ));
    }
}
