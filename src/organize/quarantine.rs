use super::{candidate_names, move_file};
use crate::core::hash::ContentHash;
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QuarantineError {
    #[error("{path} has no file name")]
    NoFileName { path: PathBuf },

    #[error("cannot create quarantine folder {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot move {from} to {to}: {source}")]
    Move {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Moves demoted duplicates to `<root>/<exact hash>/<file name>`.
///
/// Copies of the same content share a folder across runs. Nothing is ever
/// deleted: the file is always at its original path or at the destination.
/// Destinations handed out by one relocator are never reused, so dry-run
/// previews name the same files a real run would write.
#[derive(Debug, Clone)]
pub struct QuarantineRelocator {
    root: PathBuf,
    reserved: HashSet<PathBuf>,
}

impl QuarantineRelocator {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            reserved: HashSet::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Relocate `path` and return where it went (or would go, for a dry run).
    ///
    /// A dry run only reads the filesystem. An existing file at the
    /// destination is never overwritten; the name gets a `_n` suffix instead.
    pub fn relocate(
        &mut self,
        path: &Path,
        exact_hash: &ContentHash,
        dry_run: bool,
    ) -> Result<PathBuf, QuarantineError> {
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| QuarantineError::NoFileName {
                path: path.to_path_buf(),
            })?;
        let dir = self.root.join(exact_hash.as_str());
        let destination = candidate_names(&dir, &file_name)
            .find(|candidate| !candidate.exists() && !self.reserved.contains(candidate))
            .unwrap_or_else(|| dir.join(&file_name));

        if dry_run {
            self.reserved.insert(destination.clone());
            log::info!(
                "[dry-run] would quarantine {} -> {}",
                path.display(),
                destination.display()
            );
            return Ok(destination);
        }

        fs::create_dir_all(&dir).map_err(|source| QuarantineError::CreateDir {
            path: dir.clone(),
            source,
        })?;
        move_file(path, &destination).map_err(|source| QuarantineError::Move {
            from: path.to_path_buf(),
            to: destination.clone(),
            source,
        })?;
        self.reserved.insert(destination.clone());

        log::info!(
            "Quarantined {} -> {}",
            path.display(),
            destination.display()
        );
        Ok(destination)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn hash() -> ContentHash {
        ContentHash::from_hex("0f0f")
    }

    #[test]
    fn test_relocate_into_hash_folder() {
        let temp_dir = TempDir::new().unwrap();
        let src = temp_dir.path().join("b.jpg");
        fs::write(&src, b"same bytes").unwrap();
        let mut relocator = QuarantineRelocator::new(temp_dir.path().join("quarantine"));

        let dest = relocator.relocate(&src, &hash(), false).unwrap();

        assert_eq!(dest, temp_dir.path().join("quarantine").join("0f0f").join("b.jpg"));
        assert!(!src.exists());
        assert_eq!(fs::read(&dest).unwrap(), b"same bytes");
    }

    #[test]
    fn test_dry_run_touches_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let src = temp_dir.path().join("b.jpg");
        fs::write(&src, b"same bytes").unwrap();
        let root = temp_dir.path().join("quarantine");
        let mut relocator = QuarantineRelocator::new(&root);

        let dest = relocator.relocate(&src, &hash(), true).unwrap();

        assert_eq!(dest, root.join("0f0f").join("b.jpg"));
        assert!(src.exists());
        assert!(!root.exists());
    }

    #[test]
    fn test_existing_destination_not_overwritten() {
        let temp_dir = TempDir::new().unwrap();
        let mut relocator = QuarantineRelocator::new(temp_dir.path().join("q"));
        let first_dir = temp_dir.path().join("one");
        let second_dir = temp_dir.path().join("two");
        fs::create_dir_all(&first_dir).unwrap();
        fs::create_dir_all(&second_dir).unwrap();
        fs::write(first_dir.join("b.jpg"), b"same bytes").unwrap();
        fs::write(second_dir.join("b.jpg"), b"same bytes").unwrap();

        let first = relocator.relocate(&first_dir.join("b.jpg"), &hash(), false).unwrap();
        let second = relocator.relocate(&second_dir.join("b.jpg"), &hash(), false).unwrap();

        assert_ne!(first, second);
        assert_eq!(second.file_name().unwrap(), "b_1.jpg");
        assert!(first.exists() && second.exists());
    }

    #[test]
    fn test_dry_run_names_match_real_run() {
        let temp_dir = TempDir::new().unwrap();
        let mut sources = Vec::new();
        for dir in ["x", "y"] {
            let dir = temp_dir.path().join(dir);
            fs::create_dir_all(&dir).unwrap();
            fs::write(dir.join("b.jpg"), b"same bytes").unwrap();
            sources.push(dir.join("b.jpg"));
        }
        let root = temp_dir.path().join("q");

        let mut preview = QuarantineRelocator::new(&root);
        let planned: Vec<PathBuf> = sources
            .iter()
            .map(|src| preview.relocate(src, &hash(), true).unwrap())
            .collect();
        assert!(!root.exists());

        let mut relocator = QuarantineRelocator::new(&root);
        let written: Vec<PathBuf> = sources
            .iter()
            .map(|src| relocator.relocate(src, &hash(), false).unwrap())
            .collect();

        assert_eq!(planned, written);
        assert_eq!(written[1].file_name().unwrap(), "b_1.jpg");
    }

    #[test]
    fn test_failure_leaves_source_in_place() {
        let temp_dir = TempDir::new().unwrap();
        // the quarantine root is a file, so the hash folder cannot be created
        let blocker = temp_dir.path().join("quarantine");
        fs::write(&blocker, b"not a folder").unwrap();
        let src = temp_dir.path().join("b.jpg");
        fs::write(&src, b"same bytes").unwrap();

        let result = QuarantineRelocator::new(&blocker).relocate(&src, &hash(), false);

        assert!(matches!(result, Err(QuarantineError::CreateDir { .. })));
        assert_eq!(fs::read(&src).unwrap(), b"same bytes");
    }

    #[test]
    fn test_missing_source_is_error() {
        let temp_dir = TempDir::new().unwrap();
        let mut relocator = QuarantineRelocator::new(temp_dir.path().join("q"));
        let result = relocator.relocate(&temp_dir.path().join("gone.jpg"), &hash(), false);
        assert!(matches!(result, Err(QuarantineError::Move { .. })));
    }
}
