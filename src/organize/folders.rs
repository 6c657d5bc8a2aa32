use crate::config::{FolderStructure, OrganizationConfig};
use chrono::{Local, NaiveDateTime};
use std::path::{Path, PathBuf};

pub const NO_DATE_FOLDER: &str = "no_date";

/// Maps a capture timestamp to its folder under the output root.
#[derive(Debug, Clone)]
pub struct FolderOrganizer {
    output_root: PathBuf,
    config: OrganizationConfig,
}

impl FolderOrganizer {
    pub fn new(output_root: impl Into<PathBuf>, config: OrganizationConfig) -> Self {
        Self {
            output_root: output_root.into(),
            config,
        }
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    /// `<root>/<year>[/<month>[/<day>]]`, or `<root>/no_date` for undated files
    /// when the no-date folder is enabled (otherwise today's date is used).
    pub fn target_folder(&self, timestamp: Option<NaiveDateTime>) -> PathBuf {
        let ts = match timestamp {
            Some(ts) => ts,
            None if self.config.create_no_date_folder => {
                return self.output_root.join(NO_DATE_FOLDER);
            }
            None => Local::now().naive_local(),
        };

        let format = &self.config.folder_format;
        let mut folder = self.output_root.join(ts.format(&format.year).to_string());
        if matches!(
            self.config.structure,
            FolderStructure::YearMonth | FolderStructure::YearMonthDay
        ) {
            folder.push(ts.format(&format.month).to_string());
        }
        if self.config.structure == FolderStructure::YearMonthDay {
            folder.push(ts.format(&format.day).to_string());
        }
        folder
    }
}
