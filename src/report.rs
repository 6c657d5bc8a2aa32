//! Run summaries and catalog exports (JSON and CSV).

use crate::core::hash::ContentHash;
use crate::database::{QuarantineEntry, Store, StoreError};
use crate::detection::{DuplicateGroup, DuplicateReason, GroupError, SimilarityGrouper};
use crate::organize::MoveStats;
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("cannot write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot serialize report: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Group(#[from] GroupError),
}

/// One resolved duplicate group, by path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupReport {
    pub reason: DuplicateReason,
    pub keeper: PathBuf,
    pub exact_hash: ContentHash,
    pub duplicates: Vec<PathBuf>,
}

impl From<&DuplicateGroup> for GroupReport {
    fn from(group: &DuplicateGroup) -> Self {
        Self {
            reason: group.reason(),
            keeper: group.keeper().path.clone(),
            exact_hash: group.keeper().exact_hash.clone(),
            duplicates: group.non_keepers().map(|r| r.path.clone()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileError {
    pub path: PathBuf,
    pub error: String,
}

/// Outcome of one pipeline run.
///
/// `success` means the run completed (was not cancelled); per-file failures
/// are counted in `errors` and listed in `file_errors`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub success: bool,
    pub dry_run: bool,
    pub files_processed: usize,
    pub files_organized: usize,
    pub duplicates_exact: usize,
    pub duplicates_similar: usize,
    pub quarantined: usize,
    pub errors: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub groups: Vec<GroupReport>,
    pub quarantine: Vec<QuarantineEntry>,
    pub file_errors: Vec<FileError>,
    pub mover: MoveStats,
}

impl RunReport {
    pub fn new(dry_run: bool) -> Self {
        Self {
            success: false,
            dry_run,
            files_processed: 0,
            files_organized: 0,
            duplicates_exact: 0,
            duplicates_similar: 0,
            quarantined: 0,
            errors: 0,
            started_at: Utc::now(),
            finished_at: None,
            groups: Vec::new(),
            quarantine: Vec::new(),
            file_errors: Vec::new(),
            mover: MoveStats::default(),
        }
    }

    pub fn file_error(&mut self, path: &Path, error: impl ToString) {
        self.errors += 1;
        self.file_errors.push(FileError {
            path: path.to_path_buf(),
            error: error.to_string(),
        });
    }

    pub fn finish(&mut self, success: bool) {
        self.success = success;
        self.finished_at = Some(Utc::now());
    }

    pub fn duration_secs(&self) -> Option<f64> {
        self.finished_at
            .map(|end| (end - self.started_at).num_milliseconds() as f64 / 1000.0)
    }
}

/// Write the configured report files into `dir`. Returns the written paths.
pub fn write_reports(
    report: &RunReport,
    dir: &Path,
    json: bool,
    csv: bool,
) -> Result<Vec<PathBuf>, ReportError> {
    let ts = Local::now().format("%Y%m%d_%H%M%S");
    let mut written = Vec::new();

    if json {
        let path = dir.join(format!("duplicates_{ts}.json"));
        write_file(&path, &serde_json::to_string_pretty(report)?)?;
        written.push(path);
    }
    if csv {
        let path = dir.join(format!("duplicates_{ts}.csv"));
        write_file(&path, &groups_csv(&report.groups))?;
        written.push(path);
    }

    for path in &written {
        log::info!("Report written to {}", path.display());
    }
    Ok(written)
}

/// One row per demoted file.
pub fn groups_csv(groups: &[GroupReport]) -> String {
    let mut out = String::from("group,reason,exact_hash,keeper,duplicate\n");
    for (i, group) in groups.iter().enumerate() {
        for duplicate in &group.duplicates {
            let _ = writeln!(
                out,
                "{},{},{},{},{}",
                i + 1,
                group.reason,
                group.exact_hash,
                csv_field(&group.keeper.to_string_lossy()),
                csv_field(&duplicate.to_string_lossy()),
            );
        }
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Json,
}

/// Per-image hash listing with the nearest visual neighbour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HashExportRow {
    pub path: PathBuf,
    pub exact_hash: ContentHash,
    pub perceptual_hash: Option<String>,
    pub closest_distance: Option<u32>,
    pub closest_path: Option<PathBuf>,
}

/// Export every catalogued image with its hashes. Returns the row count.
pub fn export_hashes(
    store: &Store,
    path: &Path,
    format: ExportFormat,
) -> Result<usize, ReportError> {
    let records = store.images().all()?;
    // the threshold is irrelevant for nearest-neighbour lookup
    let nearest = SimilarityGrouper::new(0).nearest(&records)?;

    let rows: Vec<HashExportRow> = records
        .iter()
        .zip(nearest)
        .map(|(record, closest)| HashExportRow {
            path: record.path.clone(),
            exact_hash: record.exact_hash.clone(),
            perceptual_hash: record.perceptual_hash.as_ref().map(|p| p.to_hex()),
            closest_distance: closest.map(|(d, _)| d),
            closest_path: closest.map(|(_, other)| other.path.clone()),
        })
        .collect();

    let body = match format {
        ExportFormat::Json => serde_json::to_string_pretty(&rows)?,
        ExportFormat::Csv => {
            let mut out =
                String::from("path,exact_hash,perceptual_hash,closest_distance,closest_path\n");
            for row in &rows {
                let _ = writeln!(
                    out,
                    "{},{},{},{},{}",
                    csv_field(&row.path.to_string_lossy()),
                    row.exact_hash,
                    row.perceptual_hash.as_deref().unwrap_or(""),
                    row.closest_distance.map(|d| d.to_string()).unwrap_or_default(),
                    row.closest_path
                        .as_ref()
                        .map(|p| csv_field(&p.to_string_lossy()))
                        .unwrap_or_default(),
                );
            }
            out
        }
    };

    write_file(path, &body)?;
    log::info!("Exported {} hash rows to {}", rows.len(), path.display());
    Ok(rows.len())
}

fn write_file(path: &Path, contents: &str) -> Result<(), ReportError> {
    let write_err = |source| ReportError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(write_err)?;
    }
    fs::write(path, contents).map_err(write_err)
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fingerprint::Fingerprint;
    use crate::core::image::{ImageMetadata, ImageRecord};
    use crate::core::perceptual::PerceptualHash;
    use tempfile::TempDir;

    fn group_report() -> GroupReport {
        GroupReport {
            reason: DuplicateReason::Exact,
            keeper: PathBuf::from("/photos/a.jpg"),
            exact_hash: ContentHash::from_hex("abcd"),
            duplicates: vec![PathBuf::from("/photos/b, copy.jpg")],
        }
    }

    #[test]
    fn test_csv_quoting() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn test_groups_csv() {
        let csv = groups_csv(&[group_report()]);
        let lines: Vec<_> = csv.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1], "1,exact,abcd,/photos/a.jpg,\"/photos/b, copy.jpg\"");
    }

    #[test]
    fn test_write_reports() {
        let temp_dir = TempDir::new().unwrap();
        let mut report = RunReport::new(false);
        report.groups.push(group_report());
        report.file_error(Path::new("/photos/bad.jpg"), "unreadable");
        report.finish(true);

        let written = write_reports(&report, temp_dir.path(), true, true).unwrap();
        assert_eq!(written.len(), 2);

        let json = fs::read_to_string(&written[0]).unwrap();
        let parsed: RunReport = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, report);
        assert_eq!(parsed.errors, 1);
        assert!(written[1].extension().is_some_and(|ext| ext == "csv"));
    }

    #[test]
    fn test_export_hashes() {
        let temp_dir = TempDir::new().unwrap();
        let store = Store::open_in_memory().unwrap();
        for (name, hex) in [("a", "0000000000000000"), ("b", "0000000000000003")] {
            let path = PathBuf::from(format!("/photos/{name}.jpg"));
            let record = ImageRecord::new(
                ImageMetadata::bare(&path, 1),
                Fingerprint {
                    exact: ContentHash::from_hex(name),
                    perceptual: Some(PerceptualHash::from_hex(hex, 64).unwrap()),
                },
            );
            store.images().upsert(&record).unwrap();
        }

        let out = temp_dir.path().join("hashes.json");
        assert_eq!(export_hashes(&store, &out, ExportFormat::Json).unwrap(), 2);
        let rows: Vec<HashExportRow> =
            serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();
        assert_eq!(rows[0].closest_distance, Some(2));
        assert_eq!(rows[0].closest_path, Some(PathBuf::from("/photos/b.jpg")));

        let csv_out = temp_dir.path().join("hashes.csv");
        export_hashes(&store, &csv_out, ExportFormat::Csv).unwrap();
        let csv = fs::read_to_string(&csv_out).unwrap();
        assert!(csv.starts_with("path,exact_hash"));
        assert_eq!(csv.lines().count(), 3);
    }
}
