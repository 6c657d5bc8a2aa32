//! Physical file placement: date folders for keepers, a hash-namespaced
//! holding area for demoted duplicates.

pub mod folders;
pub mod mover;
pub mod quarantine;

pub use folders::FolderOrganizer;
pub use mover::{FileMover, MoveError, MoveOutcome, MoveStats};
pub use quarantine::{QuarantineError, QuarantineRelocator};

use crate::core::hash::HashService;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Move `src` to `dest`, falling back to copy + verify + remove when a rename
/// is not possible (different filesystem). `src` is only removed once an
/// identical copy exists at `dest`; on any error it is left where it was.
pub(crate) fn move_file(src: &Path, dest: &Path) -> io::Result<()> {
    match fs::rename(src, dest) {
        Ok(()) => return Ok(()),
        Err(e) => log::debug!(
            "rename {} -> {} failed ({}), copying instead",
            src.display(),
            dest.display(),
            e
        ),
    }

    fs::copy(src, dest)?;
    if let Err(e) = verify_copy(src, dest) {
        let _ = fs::remove_file(dest);
        return Err(e);
    }
    fs::remove_file(src)
}

/// Candidate destinations for `file_name` in `dir`: the name itself, then
/// `stem_1.ext`, `stem_2.ext`, ...
pub(crate) fn candidate_names<'a>(
    dir: &'a Path,
    file_name: &'a str,
) -> impl Iterator<Item = PathBuf> + 'a {
    let path = Path::new(file_name);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    std::iter::once(dir.join(file_name))
        .chain((1u32..).map(move |n| dir.join(format!("{stem}_{n}{ext}"))))
}

/// Error unless `dest` holds exactly the bytes of `src`.
pub(crate) fn verify_copy(src: &Path, dest: &Path) -> io::Result<()> {
    let identical = HashService::new()
        .verify_identical_content(src, dest)
        .map_err(|e| io::Error::other(e.to_string()))?;
    if identical {
        Ok(())
    } else {
        Err(io::Error::other(format!(
            "copy of {} to {} does not match the original",
            src.display(),
            dest.display()
        )))
    }
}
