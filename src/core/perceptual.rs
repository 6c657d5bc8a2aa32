//! Perceptual image signatures and their Hamming distance.
//!
//! A signature is a fixed-length bit string capturing coarse visual
//! structure. Two signatures are only comparable when they were produced with
//! the same hash size; comparing signatures of differing length is a
//! configuration error, never a silent "very different".

use image::{DynamicImage, ImageReader};
use image_hasher::{HashAlg, Hasher, HasherConfig};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PerceptualError {
    #[error("cannot open image {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot decode image {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: image::ImageError,
    },

    #[error("signatures have different lengths ({left} vs {right} bits)")]
    LengthMismatch { left: u32, right: u32 },

    #[error("invalid signature hex {hex:?} for {bits} bits")]
    InvalidHex { hex: String, bits: u32 },
}

/// Fixed-length perceptual signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PerceptualHash {
    bytes: Vec<u8>,
    bits: u32,
}

impl PerceptualHash {
    pub fn from_bytes(bytes: Vec<u8>, bits: u32) -> Self {
        Self { bytes, bits }
    }

    pub fn from_hex(hex: &str, bits: u32) -> Result<Self, PerceptualError> {
        let invalid = || PerceptualError::InvalidHex {
            hex: hex.to_string(),
            bits,
        };

        let expected_len = bits.div_ceil(8) as usize * 2;
        if hex.len() != expected_len || !hex.is_ascii() {
            return Err(invalid());
        }

        let bytes = (0..hex.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&hex[i..i + 2], 16))
            .collect::<Result<Vec<u8>, _>>()
            .map_err(|_| invalid())?;

        Ok(Self { bytes, bits })
    }

    pub fn to_hex(&self) -> String {
        self.bytes.iter().map(|b| format!("{:02x}", b)).collect()
    }

    /// Signature length in bits.
    pub fn bits(&self) -> u32 {
        self.bits
    }

    /// Hamming distance. Symmetric, and zero against itself.
    pub fn distance(&self, other: &PerceptualHash) -> Result<u32, PerceptualError> {
        if self.bits != other.bits || self.bytes.len() != other.bytes.len() {
            return Err(PerceptualError::LengthMismatch {
                left: self.bits,
                right: other.bits,
            });
        }

        Ok(self
            .bytes
            .iter()
            .zip(&other.bytes)
            .map(|(a, b)| (a ^ b).count_ones())
            .sum())
    }
}

impl fmt::Display for PerceptualHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Computes DCT-based perceptual hashes (pHash) of `hash_size × hash_size` bits.
pub struct PerceptualService {
    hasher: Hasher,
    hash_size: u32,
}

impl PerceptualService {
    pub fn new(hash_size: u32) -> Self {
        let hasher = HasherConfig::new()
            .hash_size(hash_size, hash_size)
            .hash_alg(HashAlg::Median)
            .preproc_dct()
            .to_hasher();

        Self { hasher, hash_size }
    }

    pub fn hash_size(&self) -> u32 {
        self.hash_size
    }

    pub fn signature_bits(&self) -> u32 {
        self.hash_size * self.hash_size
    }

    pub fn compute_perceptual_hash(&self, path: &Path) -> Result<PerceptualHash, PerceptualError> {
        let display = path.display().to_string();
        let img = ImageReader::open(path)
            .and_then(|reader| reader.with_guessed_format())
            .map_err(|source| PerceptualError::Open {
                path: display.clone(),
                source,
            })?
            .decode()
            .map_err(|source| PerceptualError::Decode {
                path: display,
                source,
            })?;

        Ok(self.hash_image(img))
    }

    pub fn hash_image(&self, img: DynamicImage) -> PerceptualHash {
        let img = normalize_color(img);
        let hash = self.hasher.hash_image(&img);
        PerceptualHash::from_bytes(hash.as_bytes().to_vec(), self.signature_bits())
    }
}

/// Anything that is not already 8-bit RGB or luma is converted to RGB first.
fn normalize_color(img: DynamicImage) -> DynamicImage {
    match img {
        DynamicImage::ImageRgb8(_) | DynamicImage::ImageLuma8(_) => img,
        other => DynamicImage::ImageRgb8(other.into_rgb8()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{imageops::FilterType, Rgb, RgbImage};
    use std::fs;
    use tempfile::TempDir;

    fn checkerboard(size: u32, cell: u32) -> RgbImage {
        RgbImage::from_fn(size, size, |x, y| {
            if ((x / cell) + (y / cell)) % 2 == 0 {
                Rgb([200, 200, 200])
            } else {
                Rgb([60, 60, 60])
            }
        })
    }

    fn stripes(size: u32) -> RgbImage {
        RgbImage::from_fn(size, size, |x, _| {
            if (x / 10) % 2 == 0 {
                Rgb([255, 255, 0])
            } else {
                Rgb([0, 0, 255])
            }
        })
    }

    #[test]
    fn test_distance_symmetric_and_zero_on_self() {
        let a = PerceptualHash::from_hex("f0f0f0f0f0f0f0f0", 64).unwrap();
        let b = PerceptualHash::from_hex("0ff0f0f0f0f0f0f1", 64).unwrap();

        assert_eq!(a.distance(&a).unwrap(), 0);
        assert_eq!(a.distance(&b).unwrap(), b.distance(&a).unwrap());
        assert_eq!(a.distance(&b).unwrap(), 9);
    }

    #[test]
    fn test_distance_length_mismatch() {
        let a = PerceptualHash::from_hex("ffffffffffffffff", 64).unwrap();
        let b = PerceptualHash::from_hex(&"f".repeat(64), 256).unwrap();

        assert!(matches!(
            a.distance(&b),
            Err(PerceptualError::LengthMismatch { left: 64, right: 256 })
        ));
    }

    #[test]
    fn test_hex_round_trip_and_validation() {
        let hash = PerceptualHash::from_hex("00ff10ab00ff10ab", 64).unwrap();
        assert_eq!(hash.to_hex(), "00ff10ab00ff10ab");
        assert_eq!(hash.bits(), 64);

        assert!(PerceptualHash::from_hex("00ff", 64).is_err());
        assert!(PerceptualHash::from_hex("zzff10ab00ff10ab", 64).is_err());
    }

    #[test]
    fn test_signature_length_follows_hash_size() {
        let service = PerceptualService::new(16);
        let hash = service.hash_image(DynamicImage::ImageRgb8(checkerboard(64, 8)));
        assert_eq!(hash.bits(), 256);
        assert_eq!(hash.to_hex().len(), 64);
    }

    #[test]
    fn test_resized_copy_closer_than_different_image() {
        let service = PerceptualService::new(8);
        let base = checkerboard(200, 20);
        let resized = image::imageops::resize(&base, 120, 120, FilterType::Lanczos3);

        let h_base = service.hash_image(DynamicImage::ImageRgb8(base));
        let h_resized = service.hash_image(DynamicImage::ImageRgb8(resized));
        let h_other = service.hash_image(DynamicImage::ImageRgb8(stripes(200)));

        let near = h_base.distance(&h_resized).unwrap();
        let far = h_base.distance(&h_other).unwrap();
        assert!(near < far, "expected resized copy closer (near={near}, far={far})");
    }

    #[test]
    fn test_compute_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("board.png");
        checkerboard(64, 8).save(&path).unwrap();

        let service = PerceptualService::new(8);
        let from_file = service.compute_perceptual_hash(&path).unwrap();
        let again = service.compute_perceptual_hash(&path).unwrap();
        assert_eq!(from_file, again);
        assert_eq!(from_file.bits(), 64);
    }

    #[test]
    fn test_corrupt_image_is_decode_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("broken.jpg");
        fs::write(&path, b"\xFF\xD8\xFF\xE0 definitely not a jpeg").unwrap();

        let result = PerceptualService::new(8).compute_perceptual_hash(&path);
        assert!(matches!(result, Err(PerceptualError::Decode { .. })));
    }
}
