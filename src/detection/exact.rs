use crate::core::hash::ContentHash;
use crate::core::image::ImageRecord;
use crate::database::{Store, StoreError};
use std::path::PathBuf;

/// What the catalog already knows about a file's content.
#[derive(Debug, Clone, PartialEq)]
pub enum ExactLookup {
    /// Content never seen before.
    New,
    /// This very path is the recorded keeper.
    Known,
    /// Same content is kept at another path that still exists.
    Duplicate(ImageRecord),
    /// Same content was kept at a path that is gone from disk.
    Stale(ImageRecord),
}

/// Content-hash index over the catalog.
///
/// Answers "does this exact content already exist?" and records keepers. Does
/// not resolve collisions: a [`ExactLookup::Duplicate`] goes to the keeper
/// policy together with both records.
pub struct ExactDuplicateIndex<'s> {
    store: &'s Store,
}

impl<'s> ExactDuplicateIndex<'s> {
    pub fn new(store: &'s Store) -> Self {
        Self { store }
    }

    pub fn lookup(&self, hash: &ContentHash) -> Result<Option<PathBuf>, StoreError> {
        Ok(self.store.images().find_by_hash(hash)?.map(|record| record.path))
    }

    pub fn classify(&self, record: &ImageRecord) -> Result<ExactLookup, StoreError> {
        let existing = match self.store.images().find_by_hash(&record.exact_hash)? {
            Some(existing) => existing,
            None => return Ok(ExactLookup::New),
        };

        if existing.path == record.path {
            Ok(ExactLookup::Known)
        } else if existing.path.exists() {
            Ok(ExactLookup::Duplicate(existing))
        } else {
            Ok(ExactLookup::Stale(existing))
        }
    }

    /// Insert or refresh the record under its path.
    pub fn record(&self, record: &ImageRecord) -> Result<(), StoreError> {
        self.store.images().upsert(record)
    }

    /// Make `record` the only live holder of its content hash.
    pub fn promote(&self, record: &ImageRecord) -> Result<(), StoreError> {
        self.store
            .images()
            .replace_by_hash(&record.exact_hash, record)
    }
}
