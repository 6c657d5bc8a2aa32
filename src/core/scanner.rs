use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Invalid path: {path}")]
    InvalidPath { path: String },
}

/// Walks input folders and yields candidate image files in a stable order.
#[derive(Debug, Clone)]
pub struct ScannerService {
    supported_extensions: HashSet<String>,
    recursive: bool,
    excluded_roots: Vec<PathBuf>,
}

impl ScannerService {
    /// Extensions are matched case-insensitively, with or without a leading dot.
    pub fn new<S: AsRef<str>>(extensions: &[S]) -> Self {
        let supported_extensions = extensions
            .iter()
            .map(|ext| ext.as_ref().trim_start_matches('.').to_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect();

        Self {
            supported_extensions,
            recursive: true,
            excluded_roots: Vec::new(),
        }
    }

    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// Never descend into `root` (used for the quarantine and output folders).
    pub fn exclude(mut self, root: &Path) -> Self {
        self.excluded_roots.push(normalize(root));
        self
    }

    pub fn is_supported(&self, path: &Path) -> bool {
        path.extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .is_some_and(|ext| self.supported_extensions.contains(&ext))
    }

    /// Scan every root in order. Missing roots are logged and skipped.
    pub fn scan_all(&self, roots: &[PathBuf]) -> Vec<PathBuf> {
        let mut seen = HashSet::new();
        let mut discovered = Vec::new();

        for root in roots {
            match self.scan_directory(root) {
                Ok(files) => {
                    log::info!("Found {} image(s) in {}", files.len(), root.display());
                    for file in files {
                        if seen.insert(file.clone()) {
                            discovered.push(file);
                        }
                    }
                }
                Err(e) => log::warn!("Skipping input folder: {}", e),
            }
        }

        discovered
    }

    pub fn scan_directory(&self, root: &Path) -> Result<Vec<PathBuf>, ScanError> {
        if !root.is_dir() {
            return Err(ScanError::InvalidPath {
                path: root.to_string_lossy().to_string(),
            });
        }

        let max_depth = if self.recursive { usize::MAX } else { 1 };
        let walker = WalkDir::new(root)
            .follow_links(false)
            .max_depth(max_depth)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| !self.is_excluded(entry.path()));

        let mut files = Vec::new();
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    log::warn!("Walk error under {}: {}", root.display(), e);
                    continue;
                }
            };

            if entry.file_type().is_file() && self.is_supported(entry.path()) {
                files.push(normalize(entry.path()));
            }
        }

        Ok(files)
    }

    fn is_excluded(&self, path: &Path) -> bool {
        if self.excluded_roots.is_empty() {
            return false;
        }
        let path = normalize(path);
        self.excluded_roots.iter().any(|root| path.starts_with(root))
    }
}

/// Absolute, canonical where possible, so the same file reached twice compares equal.
pub fn normalize(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| {
        std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
    })
}
