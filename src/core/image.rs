use crate::core::fingerprint::Fingerprint;
use crate::core::hash::ContentHash;
use crate::core::perceptual::PerceptualHash;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Where a capture timestamp came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampSource {
    Exif,
    FileModified,
}

impl TimestampSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimestampSource::Exif => "exif",
            TimestampSource::FileModified => "file_modified",
        }
    }
}

impl FromStr for TimestampSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "exif" => Ok(TimestampSource::Exif),
            "file_modified" => Ok(TimestampSource::FileModified),
            other => Err(format!("unknown timestamp source: {other}")),
        }
    }
}

/// Best-effort metadata of one image file. Every extracted field is optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageMetadata {
    pub path: PathBuf,
    pub file_name: String,
    pub file_size: u64,
    pub format: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub captured_at: Option<NaiveDateTime>,
    pub timestamp_source: Option<TimestampSource>,
    pub camera_make: Option<String>,
    pub camera_model: Option<String>,
}

impl ImageMetadata {
    /// Metadata carrying only what the path itself tells us.
    pub fn bare(path: &Path, file_size: u64) -> Self {
        Self {
            path: path.to_path_buf(),
            file_name: file_name_of(path),
            file_size,
            format: format_of(path),
            width: None,
            height: None,
            captured_at: None,
            timestamp_source: None,
            camera_make: None,
            camera_model: None,
        }
    }
}

/// A catalogued image: metadata plus its fingerprint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub path: PathBuf,
    pub file_name: String,
    pub file_size: u64,
    pub format: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub captured_at: Option<NaiveDateTime>,
    pub timestamp_source: Option<TimestampSource>,
    pub camera_make: Option<String>,
    pub camera_model: Option<String>,
    pub exact_hash: ContentHash,
    pub perceptual_hash: Option<PerceptualHash>,
}

impl ImageRecord {
    pub fn new(metadata: ImageMetadata, fingerprint: Fingerprint) -> Self {
        Self {
            path: metadata.path,
            file_name: metadata.file_name,
            file_size: metadata.file_size,
            format: metadata.format,
            width: metadata.width,
            height: metadata.height,
            captured_at: metadata.captured_at,
            timestamp_source: metadata.timestamp_source,
            camera_make: metadata.camera_make,
            camera_model: metadata.camera_model,
            exact_hash: fingerprint.exact,
            perceptual_hash: fingerprint.perceptual,
        }
    }

    /// Pixel count; unknown dimensions count as zero.
    pub fn resolution(&self) -> u64 {
        u64::from(self.width.unwrap_or(0)) * u64::from(self.height.unwrap_or(0))
    }

    pub fn megapixels(&self) -> Option<f64> {
        match (self.width, self.height) {
            (Some(w), Some(h)) => {
                let mp = f64::from(w) * f64::from(h) / 1_000_000.0;
                Some((mp * 100.0).round() / 100.0)
            }
            _ => None,
        }
    }

    /// Same record, relocated to `path`.
    pub fn with_path(mut self, path: &Path) -> Self {
        self.path = path.to_path_buf();
        self.file_name = file_name_of(path);
        self
    }
}

impl fmt::Display for ImageRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

pub fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn format_of(path: &Path) -> String {
    path.extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("unknown")
        .to_uppercase()
}
