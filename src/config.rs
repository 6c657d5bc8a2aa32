//! Run configuration, loaded from YAML.
//!
//! Every section has defaults so an empty file is valid. Enumerated options
//! are real enums: an unknown policy or structure name fails at load time,
//! before any file is touched.

use chrono::format::{Item, StrftimeItems};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

pub const MIN_HASH_SIZE: u32 = 2;
pub const MAX_HASH_SIZE: u32 = 64;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read configuration {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid configuration: {}", .0.join("; "))]
    Invalid(Vec<String>),

    #[error(
        "perceptual hash size mismatch: catalog signatures are {stored} bits, configuration produces {configured} bits"
    )]
    HashSizeMismatch { stored: u32, configured: u32 },
}

/// Which candidate survives when duplicates are found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeepPolicy {
    FirstFound,
    #[default]
    HighestResolution,
    Newest,
    Oldest,
}

impl KeepPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeepPolicy::FirstFound => "first_found",
            KeepPolicy::HighestResolution => "highest_resolution",
            KeepPolicy::Newest => "newest",
            KeepPolicy::Oldest => "oldest",
        }
    }
}

impl fmt::Display for KeepPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeepPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "first_found" => Ok(KeepPolicy::FirstFound),
            "highest_resolution" => Ok(KeepPolicy::HighestResolution),
            "newest" => Ok(KeepPolicy::Newest),
            "oldest" => Ok(KeepPolicy::Oldest),
            other => Err(ConfigError::Invalid(vec![format!(
                "unknown keep policy '{other}' (expected first_found, highest_resolution, newest or oldest)"
            )])),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FolderStructure {
    Year,
    YearMonth,
    #[default]
    YearMonthDay,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileOperation {
    #[default]
    Copy,
    Move,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FolderFormat {
    pub year: String,
    pub month: String,
    pub day: String,
}

impl Default for FolderFormat {
    fn default() -> Self {
        Self {
            year: "%Y".to_string(),
            month: "%Y-%m".to_string(),
            day: "%Y-%m-%d".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrganizationConfig {
    pub structure: FolderStructure,
    pub folder_format: FolderFormat,
    pub create_no_date_folder: bool,
}

impl Default for OrganizationConfig {
    fn default() -> Self {
        Self {
            structure: FolderStructure::default(),
            folder_format: FolderFormat::default(),
            create_no_date_folder: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DuplicatesConfig {
    pub detect_exact: bool,
    pub detect_similar: bool,
    /// Maximum Hamming distance for two images to count as visually similar.
    pub similarity_threshold: u32,
    pub keep_policy: KeepPolicy,
    /// Side length of the perceptual hash grid; signatures are `size²` bits.
    pub perceptual_hash_size: u32,
}

impl Default for DuplicatesConfig {
    fn default() -> Self {
        Self {
            detect_exact: true,
            detect_similar: false,
            similarity_threshold: 10,
            keep_policy: KeepPolicy::default(),
            perceptual_hash_size: 8,
        }
    }
}

impl DuplicatesConfig {
    pub fn signature_bits(&self) -> u32 {
        self.perceptual_hash_size * self.perceptual_hash_size
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyConfig {
    pub file_operation: FileOperation,
    pub verify_after_copy: bool,
    pub backup_database: bool,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            file_operation: FileOperation::default(),
            verify_after_copy: true,
            backup_database: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub backup_retention_days: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            backup_retention_days: 7,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportsConfig {
    pub directory: PathBuf,
    pub generate_json: bool,
    pub generate_csv: bool,
}

impl Default for ReportsConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("output/reports"),
            generate_json: true,
            generate_csv: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub input_folders: Vec<PathBuf>,
    pub output_folder: Option<PathBuf>,
    pub quarantine_folder: PathBuf,
    pub supported_extensions: Vec<String>,
    pub recursive: bool,
    pub organization: OrganizationConfig,
    pub duplicates: DuplicatesConfig,
    pub safety: SafetyConfig,
    pub database: DatabaseConfig,
    pub reports: ReportsConfig,
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input_folders: Vec::new(),
            output_folder: None,
            quarantine_folder: PathBuf::from("output/quarantine"),
            supported_extensions: [".jpg", ".jpeg", ".png", ".gif", ".bmp", ".tif", ".tiff", ".webp"]
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
            recursive: true,
            organization: OrganizationConfig::default(),
            duplicates: DuplicatesConfig::default(),
            safety: SafetyConfig::default(),
            database: DatabaseConfig::default(),
            reports: ReportsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Load and validate a YAML configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_yaml(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        log::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, serde_yaml::Error> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(raw)
    }

    /// Collects every problem instead of stopping at the first one.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        if self.input_folders.is_empty() {
            errors.push("no input folders configured".to_string());
        }
        for folder in &self.input_folders {
            if !folder.is_dir() {
                errors.push(format!("input folder does not exist: {}", folder.display()));
            }
            if *folder == self.quarantine_folder {
                errors.push(format!(
                    "quarantine folder must differ from input folder {}",
                    folder.display()
                ));
            }
            if self.output_folder.as_ref() == Some(folder) {
                errors.push(format!(
                    "output folder must differ from input folder {}",
                    folder.display()
                ));
            }
        }

        let size = self.duplicates.perceptual_hash_size;
        if !(MIN_HASH_SIZE..=MAX_HASH_SIZE).contains(&size) {
            errors.push(format!(
                "perceptual_hash_size must be between {MIN_HASH_SIZE} and {MAX_HASH_SIZE}, got {size}"
            ));
        } else if self.duplicates.similarity_threshold > self.duplicates.signature_bits() {
            errors.push(format!(
                "similarity_threshold {} exceeds the {}-bit signature length",
                self.duplicates.similarity_threshold,
                self.duplicates.signature_bits()
            ));
        }

        let formats = &self.organization.folder_format;
        for (name, format) in [
            ("year", &formats.year),
            ("month", &formats.month),
            ("day", &formats.day),
        ] {
            if StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
                errors.push(format!("invalid {name} folder format '{format}'"));
            }
        }

        if self.supported_extensions.is_empty() {
            errors.push("supported_extensions is empty".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(errors))
        }
    }
}

/// `<data dir>/picsort/picsort.db`, falling back to the working directory.
pub fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|dir| dir.join("picsort"))
        .unwrap_or_else(|| PathBuf::from("data"))
        .join("picsort.db")
}
