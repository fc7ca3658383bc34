//! Average hash (aHash) for still images.
//!
//! The image is shrunk to 8x8 grayscale and each bit records whether a
//! pixel is brighter than the mean. Uses the image_hasher crate.

use crate::error::HashError;
use image::DynamicImage;
use image_hasher::{HashAlg, Hasher, HasherConfig};
use std::path::Path;

/// Hash edge length in pixels
pub const HASH_SIZE: u32 = 8;

/// Extensions the perceptual hasher will attempt
pub const STILL_IMAGE_EXTENSIONS: &[&str] =
    &["jpg", "jpeg", "png", "bmp", "tiff", "tif", "heic", "heif"];

/// Whether `path` has a still-image extension (case-insensitive)
pub fn is_still_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let lower = e.to_ascii_lowercase();
            STILL_IMAGE_EXTENSIONS.contains(&lower.as_str())
        })
        .unwrap_or(false)
}

/// Mean-hash generator
pub struct AverageHasher {
    hasher: Hasher,
}

impl AverageHasher {
    pub fn new() -> Self {
        let hasher = HasherConfig::new()
            .hash_size(HASH_SIZE, HASH_SIZE)
            .hash_alg(HashAlg::Mean)
            .to_hasher();

        Self { hasher }
    }

    /// Hash an already decoded image as lowercase hex
    pub fn hash_image(&self, image: &DynamicImage) -> String {
        self.hasher
            .hash_image(image)
            .as_bytes()
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect()
    }

    /// Decode and hash the file at `path`
    pub fn hash_file(&self, path: &Path) -> Result<String, HashError> {
        let image = image::open(path).map_err(|e| HashError::DecodeError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        Ok(self.hash_image(&image))
    }
}

impl Default for AverageHasher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};

    fn half_and_half(left: u8, right: u8) -> DynamicImage {
        let img = ImageBuffer::from_fn(64, 64, |x, _| {
            let v = if x < 32 { left } else { right };
            Rgb([v, v, v])
        });
        DynamicImage::ImageRgb8(img)
    }

    #[test]
    fn hash_is_sixteen_hex_chars() {
        let hash = AverageHasher::new().hash_image(&half_and_half(0, 255));
        assert_eq!(hash.len(), 16);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn identical_images_hash_identically() {
        let hasher = AverageHasher::new();
        assert_eq!(
            hasher.hash_image(&half_and_half(10, 200)),
            hasher.hash_image(&half_and_half(10, 200))
        );
    }

    #[test]
    fn mirrored_images_hash_differently() {
        let hasher = AverageHasher::new();
        assert_ne!(
            hasher.hash_image(&half_and_half(0, 255)),
            hasher.hash_image(&half_and_half(255, 0))
        );
    }

    #[test]
    fn still_image_detection_ignores_case() {
        assert!(is_still_image(Path::new("/a/IMG_0001.JPG")));
        assert!(is_still_image(Path::new("b.heic")));
        assert!(!is_still_image(Path::new("c.nef")));
        assert!(!is_still_image(Path::new("d.mp4")));
        assert!(!is_still_image(Path::new("noext")));
    }

    #[test]
    fn undecodable_file_is_an_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("fake.jpg");
        std::fs::write(&path, b"not a jpeg").unwrap();

        assert!(matches!(
            AverageHasher::new().hash_file(&path),
            Err(HashError::DecodeError { .. })
        ));
    }
}
