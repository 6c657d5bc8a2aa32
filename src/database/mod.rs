pub mod models;
pub mod repositories;

use chrono::Local;
use rusqlite::{params, Connection, OptionalExtension};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use thiserror::Error;

pub use models::QuarantineEntry;
pub use repositories::{ImageRepository, QuarantineRepository};

const SIGNATURE_BITS_KEY: &str = "perceptual_signature_bits";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Query(#[from] rusqlite::Error),

    #[error("Cannot open catalog {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Catalog IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt catalog row: {0}")]
    Corrupt(String),
}

/// Persistent catalog of seen images and quarantine history.
///
/// Keyed by path (unique) with a secondary index on the exact content hash.
pub struct Store {
    conn: Connection,
    path: PathBuf,
}

impl Store {
    /// Open (creating if needed) the catalog. Failure here is fatal for a run.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path).map_err(|source| StoreError::Open {
            path: path.to_path_buf(),
            source,
        })?;

        let store = Self {
            conn,
            path: path.to_path_buf(),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let store = Self {
            conn: Connection::open_in_memory()?,
            path: PathBuf::from(":memory:"),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    fn initialize_schema(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS images (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                path TEXT UNIQUE NOT NULL,
                file_name TEXT NOT NULL,
                file_size INTEGER NOT NULL,
                format TEXT NOT NULL,
                width INTEGER,
                height INTEGER,
                megapixels REAL,
                captured_at TEXT,
                timestamp_source TEXT,
                camera_make TEXT,
                camera_model TEXT,
                exact_hash TEXT NOT NULL,
                perceptual_hash TEXT,
                perceptual_bits INTEGER,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_images_exact_hash ON images(exact_hash);

            CREATE TABLE IF NOT EXISTS quarantine (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                original_path TEXT NOT NULL,
                destination TEXT NOT NULL,
                exact_hash TEXT NOT NULL,
                reason TEXT NOT NULL,
                keeper_path TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_quarantine_exact_hash ON quarantine(exact_hash);

            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );",
        )?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn images(&self) -> ImageRepository<'_> {
        ImageRepository::new(&self.conn)
    }

    pub fn quarantine(&self) -> QuarantineRepository<'_> {
        QuarantineRepository::new(&self.conn)
    }

    /// Signature length the catalog was built with, if any signature was ever stored.
    pub fn stored_signature_bits(&self) -> Result<Option<u32>, StoreError> {
        let recorded: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM settings WHERE key = ?1",
                params![SIGNATURE_BITS_KEY],
                |row| row.get(0),
            )
            .optional()?;

        if let Some(value) = recorded {
            return value
                .parse()
                .map(Some)
                .map_err(|_| StoreError::Corrupt(format!("{SIGNATURE_BITS_KEY}={value}")));
        }

        let from_rows: Option<u32> = self
            .conn
            .query_row(
                "SELECT perceptual_bits FROM images WHERE perceptual_bits IS NOT NULL LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;
        Ok(from_rows)
    }

    pub fn record_signature_bits(&self, bits: u32) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO settings (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![SIGNATURE_BITS_KEY, bits.to_string()],
        )?;
        Ok(())
    }

    /// Run `f` inside a transaction that is always rolled back.
    ///
    /// Dry runs go through here so previews never change the catalog.
    pub fn simulate<T, E>(&self, f: impl FnOnce(&Store) -> Result<T, E>) -> Result<T, E>
    where
        E: From<StoreError>,
    {
        self.conn
            .execute_batch("BEGIN")
            .map_err(|e| E::from(StoreError::Query(e)))?;
        let result = f(self);
        let rollback = self.conn.execute_batch("ROLLBACK");

        match (result, rollback) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(e)) => Err(E::from(StoreError::Query(e))),
            (Err(e), rollback) => {
                if let Err(rb) = rollback {
                    log::error!("Rollback after failed simulation also failed: {}", rb);
                }
                Err(e)
            }
        }
    }

    /// Write a consistent copy to `<dir>/<stem>_backup_<timestamp>.db`.
    /// `dir` defaults to a `backups` folder next to the catalog.
    pub fn backup(&self, dir: Option<&Path>) -> Result<PathBuf, StoreError> {
        let dest_dir = match dir {
            Some(dir) => dir.to_path_buf(),
            None => self.default_backup_dir(),
        };
        fs::create_dir_all(&dest_dir)?;

        let stem = self.backup_stem();
        let ts = Local::now().format("%Y%m%d_%H%M%S");
        let mut backup_path = dest_dir.join(format!("{stem}_backup_{ts}.db"));
        let mut counter = 1;
        while backup_path.exists() {
            backup_path = dest_dir.join(format!("{stem}_backup_{ts}_{counter}.db"));
            counter += 1;
        }

        let target = backup_path.to_string_lossy().replace('\'', "''");
        self.conn.execute_batch(&format!("VACUUM INTO '{target}'"))?;
        log::info!("Catalog backup created: {}", backup_path.display());
        Ok(backup_path)
    }

    /// Delete this catalog's backups older than `retention_days`. Returns how many were removed.
    pub fn prune_backups(&self, dir: Option<&Path>, retention_days: u32) -> Result<usize, StoreError> {
        let dest_dir = match dir {
            Some(dir) => dir.to_path_buf(),
            None => self.default_backup_dir(),
        };
        if !dest_dir.is_dir() {
            return Ok(0);
        }

        let prefix = format!("{}_backup_", self.backup_stem());
        let max_age = Duration::from_secs(u64::from(retention_days) * 24 * 60 * 60);
        let now = SystemTime::now();
        let mut removed = 0;

        for entry in fs::read_dir(&dest_dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.starts_with(&prefix) {
                continue;
            }
            let modified = entry.metadata()?.modified()?;
            let expired = now
                .duration_since(modified)
                .map(|age| age > max_age)
                .unwrap_or(false);
            if expired {
                fs::remove_file(entry.path())?;
                log::info!("Removed expired catalog backup {}", entry.path().display());
                removed += 1;
            }
        }

        Ok(removed)
    }

    fn default_backup_dir(&self) -> PathBuf {
        self.path
            .parent()
            .map(|p| p.join("backups"))
            .unwrap_or_else(|| PathBuf::from("backups"))
    }

    fn backup_stem(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "catalog".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fingerprint::Fingerprint;
    use crate::core::hash::ContentHash;
    use crate::core::image::{ImageMetadata, ImageRecord};
    use tempfile::tempdir;

    fn record(path: &str, hash: &str) -> ImageRecord {
        ImageRecord::new(
            ImageMetadata::bare(Path::new(path), 3),
            Fingerprint {
                exact: ContentHash::from_hex(hash),
                perceptual: None,
            },
        )
    }

    #[test]
    fn test_open_creates_parent_and_schema() {
        let temp_dir = tempdir().unwrap();
        let db_path = temp_dir.path().join("nested/catalog.db");

        let store = Store::open(&db_path).unwrap();
        assert!(db_path.exists());
        assert_eq!(store.images().count().unwrap(), 0);

        // reopening an existing catalog keeps its rows
        store.images().upsert(&record("/p/a.jpg", "aa")).unwrap();
        drop(store);
        let reopened = Store::open(&db_path).unwrap();
        assert_eq!(reopened.images().count().unwrap(), 1);
    }

    #[test]
    fn test_open_unreachable_store_fails() {
        let temp_dir = tempdir().unwrap();
        let blocker = temp_dir.path().join("file");
        fs::write(&blocker, b"x").unwrap();

        assert!(Store::open(&blocker.join("catalog.db")).is_err());
    }

    #[test]
    fn test_signature_bits_recorded_once() {
        let store = Store::open_in_memory().unwrap();
        assert_eq!(store.stored_signature_bits().unwrap(), None);

        store.record_signature_bits(64).unwrap();
        assert_eq!(store.stored_signature_bits().unwrap(), Some(64));

        store.record_signature_bits(256).unwrap();
        assert_eq!(store.stored_signature_bits().unwrap(), Some(256));
    }

    #[test]
    fn test_simulate_rolls_back() {
        let store = Store::open_in_memory().unwrap();
        store.images().upsert(&record("/p/a.jpg", "aa")).unwrap();

        let seen: Result<i64, StoreError> = store.simulate(|s| {
            s.images().upsert(&record("/p/b.jpg", "bb"))?;
            s.images().remove(Path::new("/p/a.jpg"))?;
            s.images().count()
        });
        assert_eq!(seen.unwrap(), 1);

        let images = store.images();
        assert_eq!(images.count().unwrap(), 1);
        assert!(images.find_by_path(Path::new("/p/a.jpg")).unwrap().is_some());
        assert!(images.find_by_path(Path::new("/p/b.jpg")).unwrap().is_none());
    }

    #[test]
    fn test_backup_and_prune() {
        let temp_dir = tempdir().unwrap();
        let store = Store::open(&temp_dir.path().join("catalog.db")).unwrap();
        store.images().upsert(&record("/p/a.jpg", "aa")).unwrap();

        let first = store.backup(None).unwrap();
        let second = store.backup(None).unwrap();
        assert_ne!(first, second);
        assert!(first.starts_with(temp_dir.path().join("backups")));
        assert!(first
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("catalog_backup_"));

        let copy = Store::open(&first).unwrap();
        assert_eq!(copy.images().count().unwrap(), 1);
        drop(copy);

        // nothing is old enough yet
        assert_eq!(store.prune_backups(None, 7).unwrap(), 0);
    }
}
