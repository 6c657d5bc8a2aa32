use crate::core::hash::ContentHash;
use crate::core::image::{ImageRecord, TimestampSource};
use crate::core::perceptual::PerceptualHash;
use crate::detection::DuplicateReason;
use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::Row;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub(crate) const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// A demoted file: where it was, where it went, and why.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuarantineEntry {
    pub original_path: PathBuf,
    pub destination: PathBuf,
    pub exact_hash: ContentHash,
    pub reason: DuplicateReason,
    pub keeper_path: PathBuf,
    pub created_at: DateTime<Utc>,
}

/// Column list shared by every `SELECT` that feeds [`image_from_row`].
pub(crate) const IMAGE_COLUMNS: &str = "path, file_name, file_size, format, width, height, \
     captured_at, timestamp_source, camera_make, camera_model, exact_hash, perceptual_hash, perceptual_bits";

pub(crate) fn image_from_row(row: &Row<'_>) -> rusqlite::Result<ImageRecord> {
    let path: String = row.get(0)?;
    let captured_at: Option<String> = row.get(6)?;
    let timestamp_source: Option<String> = row.get(7)?;
    let perceptual_hex: Option<String> = row.get(11)?;
    let perceptual_bits: Option<u32> = row.get(12)?;

    let perceptual_hash = match (perceptual_hex, perceptual_bits) {
        (Some(hex), Some(bits)) => Some(
            PerceptualHash::from_hex(&hex, bits)
                .map_err(|e| conversion_error(11, e.to_string()))?,
        ),
        _ => None,
    };

    Ok(ImageRecord {
        path: PathBuf::from(path),
        file_name: row.get(1)?,
        file_size: row.get::<_, i64>(2)? as u64,
        format: row.get(3)?,
        width: row.get(4)?,
        height: row.get(5)?,
        captured_at: captured_at
            .as_deref()
            .map(parse_timestamp)
            .transpose()
            .map_err(|e| conversion_error(6, e))?,
        timestamp_source: timestamp_source
            .as_deref()
            .map(str::parse::<TimestampSource>)
            .transpose()
            .map_err(|e| conversion_error(7, e))?,
        camera_make: row.get(8)?,
        camera_model: row.get(9)?,
        exact_hash: ContentHash::from_hex(row.get::<_, String>(10)?),
        perceptual_hash,
    })
}

pub(crate) fn quarantine_from_row(row: &Row<'_>) -> rusqlite::Result<QuarantineEntry> {
    let reason: String = row.get(3)?;
    let created_at: String = row.get(5)?;

    Ok(QuarantineEntry {
        original_path: PathBuf::from(row.get::<_, String>(0)?),
        destination: PathBuf::from(row.get::<_, String>(1)?),
        exact_hash: ContentHash::from_hex(row.get::<_, String>(2)?),
        reason: reason.parse().map_err(|e: String| conversion_error(3, e))?,
        keeper_path: PathBuf::from(row.get::<_, String>(4)?),
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| conversion_error(5, e.to_string()))?,
    })
}

pub(crate) fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

fn parse_timestamp(raw: &str) -> Result<NaiveDateTime, String> {
    NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT).map_err(|e| format!("{raw}: {e}"))
}

fn conversion_error(column: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        column,
        rusqlite::types::Type::Text,
        message.into(),
    )
}
