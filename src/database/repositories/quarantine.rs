use super::Repository;
use crate::core::hash::ContentHash;
use crate::database::models::{quarantine_from_row, QuarantineEntry};
use crate::database::StoreError;
use rusqlite::{params, Connection};

const QUARANTINE_COLUMNS: &str =
    "original_path, destination, exact_hash, reason, keeper_path, created_at";

pub struct QuarantineRepository<'c> {
    conn: &'c Connection,
}

impl Repository for QuarantineRepository<'_> {
    fn conn(&self) -> &Connection {
        self.conn
    }
}

impl<'c> QuarantineRepository<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    pub fn record(&self, entry: &QuarantineEntry) -> Result<(), StoreError> {
        self.conn().execute(
            "INSERT INTO quarantine (original_path, destination, exact_hash, reason, keeper_path, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                entry.original_path.to_string_lossy(),
                entry.destination.to_string_lossy(),
                entry.exact_hash.as_str(),
                entry.reason.as_str(),
                entry.keeper_path.to_string_lossy(),
                entry.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn list(&self) -> Result<Vec<QuarantineEntry>, StoreError> {
        let sql = format!("SELECT {QUARANTINE_COLUMNS} FROM quarantine ORDER BY id");
        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt.query_map([], quarantine_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn find_by_hash(&self, hash: &ContentHash) -> Result<Vec<QuarantineEntry>, StoreError> {
        let sql =
            format!("SELECT {QUARANTINE_COLUMNS} FROM quarantine WHERE exact_hash = ?1 ORDER BY id");
        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt.query_map(params![hash.as_str()], quarantine_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn count(&self) -> Result<i64, StoreError> {
        Ok(self
            .conn()
            .query_row("SELECT COUNT(*) FROM quarantine", [], |row| row.get(0))?)
    }
}
