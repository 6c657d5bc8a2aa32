use crate::core::hash::{ContentHash, HashError, HashService};
use crate::core::perceptual::{PerceptualHash, PerceptualService};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Exact and perceptual hash of a file's bytes as they were when computed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    pub exact: ContentHash,
    /// `None` when the image could not be decoded.
    pub perceptual: Option<PerceptualHash>,
}

pub struct FingerprintEngine {
    hash_service: HashService,
    perceptual_service: PerceptualService,
    compute_perceptual: bool,
}

impl FingerprintEngine {
    pub fn new(perceptual_hash_size: u32) -> Self {
        Self {
            hash_service: HashService::new(),
            perceptual_service: PerceptualService::new(perceptual_hash_size),
            compute_perceptual: true,
        }
    }

    /// Skip image decoding entirely; only exact hashes are produced.
    pub fn exact_only(mut self) -> Self {
        self.compute_perceptual = false;
        self
    }

    pub fn signature_bits(&self) -> u32 {
        self.perceptual_service.signature_bits()
    }

    /// An unreadable file is an error; an undecodable image only loses its perceptual hash.
    pub fn fingerprint(&self, path: &Path) -> Result<Fingerprint, HashError> {
        let exact = self.hash_service.compute_content_hash(path)?;

        let perceptual = if self.compute_perceptual {
            match self.perceptual_service.compute_perceptual_hash(path) {
                Ok(hash) => Some(hash),
                Err(e) => {
                    log::warn!(
                        "No perceptual hash for {}, exact matching only: {}",
                        path.display(),
                        e
                    );
                    None
                }
            }
        } else {
            None
        };

        Ok(Fingerprint { exact, perceptual })
    }

    /// Fingerprint many files in parallel; results keep the input order.
    pub fn fingerprint_batch(
        &self,
        paths: &[PathBuf],
    ) -> Vec<(PathBuf, Result<Fingerprint, HashError>)> {
        paths
            .par_iter()
            .map(|path| (path.clone(), self.fingerprint(path)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_fingerprint_valid_image() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("gradient.png");
        RgbImage::from_fn(32, 32, |x, y| Rgb([(x * 8) as u8, (y * 8) as u8, 0]))
            .save(&path)
            .unwrap();

        let engine = FingerprintEngine::new(8);
        let first = engine.fingerprint(&path).unwrap();
        let second = engine.fingerprint(&path).unwrap();

        assert_eq!(first, second);
        assert_eq!(first.perceptual.as_ref().map(|p| p.bits()), Some(64));
    }

    #[test]
    fn test_corrupt_image_keeps_exact_hash() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("corrupt.jpg");
        fs::write(&path, b"\xFF\xD8\xFF\xE0 truncated").unwrap();

        let fingerprint = FingerprintEngine::new(8).fingerprint(&path).unwrap();
        assert_eq!(fingerprint.exact.as_str().len(), 64);
        assert!(fingerprint.perceptual.is_none());
    }

    #[test]
    fn test_unreadable_file_is_error() {
        let result = FingerprintEngine::new(8).fingerprint(Path::new("/non/existent.jpg"));
        assert!(result.is_err());
    }

    #[test]
    fn test_exact_only_skips_decoding() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("pixel.png");
        RgbImage::from_pixel(4, 4, Rgb([1, 2, 3])).save(&path).unwrap();

        let fingerprint = FingerprintEngine::new(8).exact_only().fingerprint(&path).unwrap();
        assert!(fingerprint.perceptual.is_none());
    }

    #[test]
    fn test_batch_keeps_order_and_errors() {
        let temp_dir = TempDir::new().unwrap();
        let good = temp_dir.path().join("a.jpg");
        fs::write(&good, b"abc").unwrap();
        let missing = temp_dir.path().join("missing.jpg");

        let results = FingerprintEngine::new(8).fingerprint_batch(&[good.clone(), missing.clone()]);
        assert_eq!(results[0].0, good);
        assert!(results[0].1.is_ok());
        assert_eq!(results[1].0, missing);
        assert!(results[1].1.is_err());
    }
}
