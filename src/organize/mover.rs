use super::{candidate_names, move_file, verify_copy};
use crate::config::FileOperation;
use crate::core::hash::{ContentHash, HashError, HashService};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MoveError {
    #[error("{path} has no file name")]
    NoFileName { path: PathBuf },

    #[error("cannot create folder {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot {operation} {from} to {to}: {source}")]
    Transfer {
        operation: &'static str,
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Hash(#[from] HashError),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveStats {
    pub copied: usize,
    pub moved: usize,
    pub skipped: usize,
    pub errors: usize,
    pub total_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveOutcome {
    Copied(PathBuf),
    Moved(PathBuf),
    /// The destination already holds identical content; nothing was written.
    Skipped(PathBuf),
}

impl MoveOutcome {
    pub fn destination(&self) -> &Path {
        match self {
            MoveOutcome::Copied(path) | MoveOutcome::Moved(path) | MoveOutcome::Skipped(path) => {
                path
            }
        }
    }
}

/// Places keepers into their date folders by copy or move.
pub struct FileMover {
    operation: FileOperation,
    verify_after_copy: bool,
    dry_run: bool,
    hash_service: HashService,
    stats: MoveStats,
}

impl FileMover {
    pub fn new(operation: FileOperation, verify_after_copy: bool) -> Self {
        Self {
            operation,
            verify_after_copy,
            dry_run: false,
            hash_service: HashService::new(),
            stats: MoveStats::default(),
        }
    }

    /// Decide destinations without writing anything.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn operation(&self) -> FileOperation {
        self.operation
    }

    pub fn stats(&self) -> &MoveStats {
        &self.stats
    }

    /// Copy or move `src` into `folder`. Name conflicts get a `_n` suffix unless
    /// the conflicting file is byte-identical, in which case the file is skipped.
    pub fn process_file(&mut self, src: &Path, folder: &Path) -> Result<MoveOutcome, MoveError> {
        let result = self.place(src, folder);
        match &result {
            Ok(MoveOutcome::Copied(dest)) => {
                self.stats.copied += 1;
                self.stats.total_bytes += file_size(src, dest);
            }
            Ok(MoveOutcome::Moved(dest)) => {
                self.stats.moved += 1;
                self.stats.total_bytes += file_size(src, dest);
            }
            Ok(MoveOutcome::Skipped(_)) => self.stats.skipped += 1,
            Err(e) => {
                self.stats.errors += 1;
                log::error!("Failed to organize {}: {}", src.display(), e);
            }
        }
        result
    }

    fn place(&self, src: &Path, folder: &Path) -> Result<MoveOutcome, MoveError> {
        let file_name = src
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| MoveError::NoFileName {
                path: src.to_path_buf(),
            })?;

        let mut src_hash: Option<ContentHash> = None;
        let mut dest = None;
        for candidate in candidate_names(folder, &file_name) {
            if candidate == src {
                return Ok(MoveOutcome::Skipped(candidate));
            }
            if !candidate.exists() {
                dest = Some(candidate);
                break;
            }
            let wanted = match src_hash.take() {
                Some(hash) => hash,
                None => self.hash_service.compute_content_hash(src)?,
            };
            let identical = self.hash_service.compute_content_hash(&candidate)? == wanted;
            src_hash = Some(wanted);
            if identical {
                log::debug!(
                    "{} already organized as {}",
                    src.display(),
                    candidate.display()
                );
                return Ok(MoveOutcome::Skipped(candidate));
            }
        }
        let Some(dest) = dest else {
            // candidate_names never ends
            return Err(MoveError::NoFileName {
                path: src.to_path_buf(),
            });
        };

        if self.dry_run {
            log::info!("[dry-run] would place {} at {}", src.display(), dest.display());
            return Ok(match self.operation {
                FileOperation::Copy => MoveOutcome::Copied(dest),
                FileOperation::Move => MoveOutcome::Moved(dest),
            });
        }

        fs::create_dir_all(folder).map_err(|source| MoveError::CreateDir {
            path: folder.to_path_buf(),
            source,
        })?;

        match self.operation {
            FileOperation::Copy => {
                self.copy(src, &dest)?;
                log::info!("Copied {} -> {}", src.display(), dest.display());
                Ok(MoveOutcome::Copied(dest))
            }
            FileOperation::Move => {
                move_file(src, &dest).map_err(|source| MoveError::Transfer {
                    operation: "move",
                    from: src.to_path_buf(),
                    to: dest.clone(),
                    source,
                })?;
                log::info!("Moved {} -> {}", src.display(), dest.display());
                Ok(MoveOutcome::Moved(dest))
            }
        }
    }

    fn copy(&self, src: &Path, dest: &Path) -> Result<(), MoveError> {
        let transfer_err = |source| MoveError::Transfer {
            operation: "copy",
            from: src.to_path_buf(),
            to: dest.to_path_buf(),
            source,
        };

        fs::copy(src, dest).map_err(transfer_err)?;
        if self.verify_after_copy {
            if let Err(e) = verify_copy(src, dest) {
                let _ = fs::remove_file(dest);
                return Err(transfer_err(e));
            }
        }
        Ok(())
    }
}

/// Size of whichever of the two paths currently exists.
fn file_size(src: &Path, dest: &Path) -> u64 {
    fs::metadata(dest)
        .or_else(|_| fs::metadata(src))
        .map(|m| m.len())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, PathBuf, PathBuf) {
        let temp_dir = TempDir::new().unwrap();
        let src_dir = temp_dir.path().join("in");
        let out_dir = temp_dir.path().join("out").join("2023");
        fs::create_dir_all(&src_dir).unwrap();
        (temp_dir, src_dir, out_dir)
    }

    #[test]
    fn test_copy_and_verify() {
        let (_temp, src_dir, out_dir) = setup();
        let src = src_dir.join("a.jpg");
        fs::write(&src, b"12345").unwrap();

        let mut mover = FileMover::new(FileOperation::Copy, true);
        let outcome = mover.process_file(&src, &out_dir).unwrap();

        assert_eq!(outcome, MoveOutcome::Copied(out_dir.join("a.jpg")));
        assert!(src.exists());
        assert_eq!(fs::read(out_dir.join("a.jpg")).unwrap(), b"12345");
        assert_eq!(mover.stats().copied, 1);
        assert_eq!(mover.stats().total_bytes, 5);
    }

    #[test]
    fn test_move() {
        let (_temp, src_dir, out_dir) = setup();
        let src = src_dir.join("a.jpg");
        fs::write(&src, b"12345").unwrap();

        let mut mover = FileMover::new(FileOperation::Move, true);
        let outcome = mover.process_file(&src, &out_dir).unwrap();

        assert_eq!(outcome.destination(), out_dir.join("a.jpg"));
        assert!(!src.exists());
        assert_eq!(mover.stats().moved, 1);
    }

    #[test]
    fn test_conflict_gets_suffix() {
        let (_temp, src_dir, out_dir) = setup();
        fs::create_dir_all(&out_dir).unwrap();
        fs::write(out_dir.join("a.jpg"), b"other photo").unwrap();
        let src = src_dir.join("a.jpg");
        fs::write(&src, b"12345").unwrap();

        let mut mover = FileMover::new(FileOperation::Copy, true);
        let outcome = mover.process_file(&src, &out_dir).unwrap();

        assert_eq!(outcome, MoveOutcome::Copied(out_dir.join("a_1.jpg")));
        assert_eq!(fs::read(out_dir.join("a.jpg")).unwrap(), b"other photo");
    }

    #[test]
    fn test_identical_destination_is_skipped() {
        let (_temp, src_dir, out_dir) = setup();
        let src = src_dir.join("a.jpg");
        fs::write(&src, b"12345").unwrap();

        let mut mover = FileMover::new(FileOperation::Copy, true);
        mover.process_file(&src, &out_dir).unwrap();
        let again = mover.process_file(&src, &out_dir).unwrap();

        assert_eq!(again, MoveOutcome::Skipped(out_dir.join("a.jpg")));
        assert_eq!(mover.stats().copied, 1);
        assert_eq!(mover.stats().skipped, 1);
        assert!(!out_dir.join("a_1.jpg").exists());
    }

    #[test]
    fn test_dry_run_writes_nothing() {
        let (_temp, src_dir, out_dir) = setup();
        let src = src_dir.join("a.jpg");
        fs::write(&src, b"12345").unwrap();

        let mut mover = FileMover::new(FileOperation::Move, true).dry_run(true);
        let outcome = mover.process_file(&src, &out_dir).unwrap();

        assert_eq!(outcome, MoveOutcome::Moved(out_dir.join("a.jpg")));
        assert!(src.exists());
        assert!(!out_dir.exists());
    }

    #[test]
    fn test_missing_source_counts_error() {
        let (_temp, src_dir, out_dir) = setup();
        let mut mover = FileMover::new(FileOperation::Copy, true);
        assert!(mover.process_file(&src_dir.join("gone.jpg"), &out_dir).is_err());
        assert_eq!(mover.stats().errors, 1);
    }
}
