use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Bytes read per digest update. Memory use is bounded by this, not the file size.
const CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum HashError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Hex-encoded BLAKE3 digest of a file's full byte content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(String);

impl ContentHash {
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Service for computing exact content hashes
#[derive(Debug, Clone, Copy, Default)]
pub struct HashService;

impl HashService {
    pub fn new() -> Self {
        Self
    }

    /// Stream the file through BLAKE3 in fixed-size chunks.
    pub fn compute_content_hash(&self, file_path: &Path) -> Result<ContentHash, HashError> {
        let read_err = |source| HashError::Read {
            path: file_path.to_path_buf(),
            source,
        };

        let file = File::open(file_path).map_err(read_err)?;
        let mut reader = BufReader::new(file);
        let mut hasher = blake3::Hasher::new();
        let mut buffer = vec![0u8; CHUNK_SIZE];

        loop {
            let bytes_read = reader.read(&mut buffer).map_err(read_err)?;
            if bytes_read == 0 {
                break;
            }
            hasher.update(&buffer[..bytes_read]);
        }

        Ok(ContentHash(hasher.finalize().to_hex().to_string()))
    }

    /// Compute content hashes for multiple files in parallel, preserving input order.
    pub fn compute_content_hashes_batch(
        &self,
        file_paths: &[&Path],
    ) -> Vec<(PathBuf, Result<ContentHash, HashError>)> {
        file_paths
            .par_iter()
            .map(|path| (path.to_path_buf(), self.compute_content_hash(path)))
            .collect()
    }

    pub fn verify_identical_content(&self, file1: &Path, file2: &Path) -> Result<bool, HashError> {
        let hash1 = self.compute_content_hash(file1)?;
        let hash2 = self.compute_content_hash(file2)?;
        Ok(hash1 == hash2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_compute_content_hash() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("test.jpg");
        fs::write(&file_path, b"Hello, World!").unwrap();

        let hash_service = HashService::new();
        let hash = hash_service.compute_content_hash(&file_path).unwrap();
        let hash2 = hash_service.compute_content_hash(&file_path).unwrap();
        assert_eq!(hash, hash2);

        // 256-bit digest, hex encoded
        assert_eq!(hash.as_str().len(), 64);
        assert!(hash.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_identical_files_same_hash() {
        let temp_dir = TempDir::new().unwrap();
        let file1 = temp_dir.path().join("a.jpg");
        let file2 = temp_dir.path().join("renamed copy.jpg");
        fs::write(&file1, b"Identical content").unwrap();
        fs::write(&file2, b"Identical content").unwrap();

        let hash_service = HashService::new();
        assert_eq!(
            hash_service.compute_content_hash(&file1).unwrap(),
            hash_service.compute_content_hash(&file2).unwrap()
        );
        assert!(hash_service.verify_identical_content(&file1, &file2).unwrap());
    }

    #[test]
    fn test_different_files_different_hash() {
        let temp_dir = TempDir::new().unwrap();
        let file1 = temp_dir.path().join("file1.jpg");
        let file2 = temp_dir.path().join("file2.jpg");
        fs::write(&file1, b"Content A").unwrap();
        fs::write(&file2, b"Content B").unwrap();

        let hash_service = HashService::new();
        assert!(!hash_service.verify_identical_content(&file1, &file2).unwrap());
    }

    #[test]
    fn test_larger_than_one_chunk() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("big.raw");
        let content: Vec<u8> = (0..(CHUNK_SIZE * 3 + 17)).map(|i| (i % 251) as u8).collect();
        fs::write(&file_path, &content).unwrap();

        let hash = HashService::new().compute_content_hash(&file_path).unwrap();
        assert_eq!(hash.as_str(), blake3::hash(&content).to_hex().as_str());
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let result = HashService::new().compute_content_hash(Path::new("/non/existent/file.jpg"));
        assert!(matches!(result, Err(HashError::Read { .. })));
    }

    #[test]
    fn test_batch_hashing_preserves_order() {
        let temp_dir = TempDir::new().unwrap();
        let file1 = temp_dir.path().join("file1.jpg");
        let file2 = temp_dir.path().join("file2.jpg");
        fs::write(&file1, b"Content 1").unwrap();
        fs::write(&file2, b"Content 2").unwrap();

        let results = HashService::new().compute_content_hashes_batch(&[&file1, &file2]);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, file1);
        assert_eq!(results[1].0, file2);
        assert_ne!(
            results[0].1.as_ref().unwrap(),
            results[1].1.as_ref().unwrap()
        );
    }
}
