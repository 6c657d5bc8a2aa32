use super::Repository;
use crate::core::hash::ContentHash;
use crate::core::image::ImageRecord;
use crate::core::perceptual::PerceptualHash;
use crate::database::models::{format_timestamp, image_from_row, IMAGE_COLUMNS};
use crate::database::StoreError;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

pub struct ImageRepository<'c> {
    conn: &'c Connection,
}

impl Repository for ImageRepository<'_> {
    fn conn(&self) -> &Connection {
        self.conn
    }
}

impl<'c> ImageRepository<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    /// Insert the record, or refresh the row already holding its path.
    pub fn upsert(&self, record: &ImageRecord) -> Result<(), StoreError> {
        let now = Utc::now().to_rfc3339();
        self.conn().execute(
            "INSERT INTO images (
                path, file_name, file_size, format, width, height, megapixels,
                captured_at, timestamp_source, camera_make, camera_model,
                exact_hash, perceptual_hash, perceptual_bits, updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
             ON CONFLICT(path) DO UPDATE SET
                file_name = excluded.file_name,
                file_size = excluded.file_size,
                format = excluded.format,
                width = excluded.width,
                height = excluded.height,
                megapixels = excluded.megapixels,
                captured_at = excluded.captured_at,
                timestamp_source = excluded.timestamp_source,
                camera_make = excluded.camera_make,
                camera_model = excluded.camera_model,
                exact_hash = excluded.exact_hash,
                perceptual_hash = excluded.perceptual_hash,
                perceptual_bits = excluded.perceptual_bits,
                updated_at = excluded.updated_at",
            params![
                record.path.to_string_lossy(),
                record.file_name,
                record.file_size as i64,
                record.format,
                record.width,
                record.height,
                record.megapixels(),
                record.captured_at.as_ref().map(format_timestamp),
                record.timestamp_source.map(|s| s.as_str()),
                record.camera_make,
                record.camera_model,
                record.exact_hash.as_str(),
                record.perceptual_hash.as_ref().map(|p| p.to_hex()),
                record.perceptual_hash.as_ref().map(|p| p.bits()),
                now,
            ],
        )?;
        Ok(())
    }

    /// The kept record for this content, if any. Oldest row wins should several exist.
    pub fn find_by_hash(&self, hash: &ContentHash) -> Result<Option<ImageRecord>, StoreError> {
        let sql = format!(
            "SELECT {IMAGE_COLUMNS} FROM images WHERE exact_hash = ?1 ORDER BY id LIMIT 1"
        );
        Ok(self
            .conn()
            .query_row(&sql, params![hash.as_str()], image_from_row)
            .optional()?)
    }

    pub fn find_by_path(&self, path: &Path) -> Result<Option<ImageRecord>, StoreError> {
        let sql = format!("SELECT {IMAGE_COLUMNS} FROM images WHERE path = ?1");
        Ok(self
            .conn()
            .query_row(&sql, params![path.to_string_lossy()], image_from_row)
            .optional()?)
    }

    /// Point `hash` at a new keeper: every row for that content is replaced by `record`.
    pub fn replace_by_hash(
        &self,
        hash: &ContentHash,
        record: &ImageRecord,
    ) -> Result<(), StoreError> {
        self.conn().execute(
            "DELETE FROM images WHERE exact_hash = ?1 AND path != ?2",
            params![hash.as_str(), record.path.to_string_lossy()],
        )?;
        self.upsert(record)
    }

    /// Follow a keeper that was moved on disk. A row left at the new path by
    /// a file that is no longer there is dropped first.
    pub fn update_path(&self, old: &Path, record: &ImageRecord) -> Result<bool, StoreError> {
        self.conn().execute(
            "DELETE FROM images WHERE path = ?1 AND path != ?2",
            params![record.path.to_string_lossy(), old.to_string_lossy()],
        )?;
        let changed = self.conn().execute(
            "UPDATE images SET path = ?1, file_name = ?2, updated_at = ?3 WHERE path = ?4",
            params![
                record.path.to_string_lossy(),
                record.file_name,
                Utc::now().to_rfc3339(),
                old.to_string_lossy()
            ],
        )?;
        Ok(changed > 0)
    }

    pub fn set_perceptual_hash(
        &self,
        path: &Path,
        hash: &PerceptualHash,
    ) -> Result<(), StoreError> {
        self.conn().execute(
            "UPDATE images SET perceptual_hash = ?1, perceptual_bits = ?2 WHERE path = ?3",
            params![hash.to_hex(), hash.bits(), path.to_string_lossy()],
        )?;
        Ok(())
    }

    pub fn remove(&self, path: &Path) -> Result<bool, StoreError> {
        let removed = self.conn().execute(
            "DELETE FROM images WHERE path = ?1",
            params![path.to_string_lossy()],
        )?;
        Ok(removed > 0)
    }

    /// Every catalogued record, in insertion order.
    pub fn all(&self) -> Result<Vec<ImageRecord>, StoreError> {
        let sql = format!("SELECT {IMAGE_COLUMNS} FROM images ORDER BY id");
        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt.query_map([], image_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Records eligible for similarity grouping, in insertion order.
    pub fn live_with_perceptual(&self) -> Result<Vec<ImageRecord>, StoreError> {
        let sql = format!(
            "SELECT {IMAGE_COLUMNS} FROM images WHERE perceptual_hash IS NOT NULL ORDER BY id"
        );
        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt.query_map([], image_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn page(&self,page: u32, page_size: u32) -> Result<Vec<ImageRecord>, StoreError> {
        let offset = i64::from(page.saturating_sub(1)) * i64::from(page_size);
        let sql = format!("SELECT {IMAGE_COLUMNS} FROM images ORDER BY id LIMIT ?1 OFFSET ?2");
        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt.query_map(params![i64::from(page_size), offset], image_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn count(&self) -> Result<i64, StoreError> {
        Ok(self
            .conn()
            .query_row("SELECT COUNT(*) FROM images", [], |row| row.get(0))?)
    }
}
