//! One organize run: walk, fingerprint, resolve duplicates, organize, report.
//!
//! Duplicate resolution, relocation and catalog updates happen strictly in
//! walker order on the calling thread. Only fingerprinting fans out.

use crate::config::{Config, ConfigError};
use crate::core::exif::ExifService;
use crate::core::fingerprint::FingerprintEngine;
use crate::core::image::ImageRecord;
use crate::core::perceptual::PerceptualService;
use crate::core::scanner::ScannerService;
use crate::database::{QuarantineEntry, Store, StoreError};
use crate::detection::{
    DuplicateGroup, DuplicateReason, ExactDuplicateIndex, ExactLookup, GroupError,
    KeeperResolver, SimilarityGrouper,
};
use crate::organize::{FileMover, FolderOrganizer, MoveOutcome, QuarantineRelocator};
use crate::report::{GroupReport, RunReport};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

/// Files fingerprinted in parallel between cancellation checks.
const FINGERPRINT_CHUNK: usize = 32;

/// Failures that abort a run. Per-file problems are never reported here.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("similarity grouping failed: {0}")]
    Group(#[from] GroupError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Compute every decision but leave files and the catalog untouched.
    pub dry_run: bool,
    /// Copy or move keepers into the output folder afterwards.
    pub organize: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanPhase {
    Scanning,
    Fingerprinting,
    SimilarDuplicates,
    Organizing,
    Done,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanProgress {
    pub phase: ScanPhase,
    pub processed: usize,
    pub total: usize,
    pub current_file: Option<PathBuf>,
}

pub type ProgressCallback = Box<dyn Fn(&ScanProgress) + Send + Sync>;

pub struct Pipeline {
    config: Config,
    store: Store,
    cancel: Arc<AtomicBool>,
    progress: Option<ProgressCallback>,
}

impl Pipeline {
    pub fn new(config: Config, store: Store) -> Self {
        Self {
            config,
            store,
            cancel: Arc::new(AtomicBool::new(false)),
            progress: None,
        }
    }

    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    /// Share an external cancellation flag. Setting it stops the run before the next file.
    pub fn with_cancellation_token(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation_token(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Validates the configuration and the catalog's signature length before
    /// touching any file. A dry run executes inside a rolled-back transaction.
    pub fn run(&self, options: RunOptions) -> Result<RunReport, PipelineError> {
        self.config.validate()?;
        log::info!(
            "Starting run (dry_run={}, organize={}, policy={})",
            options.dry_run,
            options.organize,
            self.config.duplicates.keep_policy
        );

        if options.dry_run {
            return self.store.simulate(|store| self.execute(store, options));
        }

        if self.config.safety.backup_database && self.store.path() != Path::new(":memory:") {
            self.store.backup(None)?;
            self.store
                .prune_backups(None, self.config.database.backup_retention_days)?;
        }
        self.execute(&self.store, options)
    }

    fn execute(&self, store: &Store, options: RunOptions) -> Result<RunReport, PipelineError> {
        let mut report = RunReport::new(options.dry_run);
        let duplicates = &self.config.duplicates;

        if duplicates.detect_similar {
            check_signature_bits(store, duplicates.signature_bits())?;
        }

        self.emit(ScanPhase::Scanning, 0, 0, None);
        let files = self.scanner().scan_all(&self.config.input_folders);
        log::info!("{} candidate file(s) to process", files.len());

        let mut relocator = QuarantineRelocator::new(&self.config.quarantine_folder);
        let processed =
            self.process_files(store, &files, &mut relocator, options, &mut report)?;

        if duplicates.detect_similar && !self.is_cancelled() {
            self.resolve_similar(store, &mut relocator, options, &mut report)?;
        }

        if options.organize && !self.is_cancelled() {
            match &self.config.output_folder {
                Some(output) => self.organize(store, output, &processed, options, &mut report)?,
                None => log::warn!("No output folder configured, skipping organization"),
            }
        }

        let completed = !self.is_cancelled();
        if !completed {
            log::warn!("Run cancelled after {} file(s)", report.files_processed);
        }
        report.finish(completed);
        self.emit(ScanPhase::Done, files.len(), files.len(), None);
        log::info!(
            "Run finished: {} processed, {} exact, {} similar, {} quarantined, {} error(s)",
            report.files_processed,
            report.duplicates_exact,
            report.duplicates_similar,
            report.quarantined,
            report.errors
        );
        Ok(report)
    }

    fn scanner(&self) -> ScannerService {
        let mut scanner = ScannerService::new(&self.config.supported_extensions)
            .recursive(self.config.recursive)
            .exclude(&self.config.quarantine_folder);
        if let Some(output) = &self.config.output_folder {
            scanner = scanner.exclude(output);
        }
        scanner
    }

    fn engine(&self) -> FingerprintEngine {
        let engine = FingerprintEngine::new(self.config.duplicates.perceptual_hash_size);
        if self.config.duplicates.detect_similar {
            engine
        } else {
            engine.exact_only()
        }
    }

    /// Fingerprint and catalog every file, resolving exact duplicates as they
    /// appear. Returns the paths that were catalogued.
    fn process_files(
        &self,
        store: &Store,
        files: &[PathBuf],
        relocator: &mut QuarantineRelocator,
        options: RunOptions,
        report: &mut RunReport,
    ) -> Result<Vec<PathBuf>, PipelineError> {
        let engine = self.engine();
        let exif = ExifService::new();
        let mut catalogued = Vec::new();
        let mut done = 0;

        'chunks: for chunk in files.chunks(FINGERPRINT_CHUNK) {
            if self.is_cancelled() {
                break;
            }
            let fingerprints = engine.fingerprint_batch(chunk);

            for (path, fingerprint) in fingerprints {
                if self.is_cancelled() {
                    break 'chunks;
                }
                done += 1;
                self.emit(ScanPhase::Fingerprinting, done, files.len(), Some(&path));

                let fingerprint = match fingerprint {
                    Ok(fingerprint) => fingerprint,
                    Err(e) => {
                        log::warn!("Skipping {}: {}", path.display(), e);
                        report.file_error(&path, e);
                        continue;
                    }
                };
                let metadata = match exif.read_metadata(&path) {
                    Ok(metadata) => metadata,
                    Err(e) => {
                        log::warn!("Skipping {}: {}", path.display(), e);
                        report.file_error(&path, e);
                        continue;
                    }
                };

                report.files_processed += 1;
                let record = ImageRecord::new(metadata, fingerprint);
                let live = if self.config.duplicates.detect_exact {
                    self.resolve_exact(store, record, relocator, options, report)?
                } else {
                    store.images().upsert(&record)?;
                    true
                };
                if live {
                    catalogued.push(path);
                }
            }
        }

        Ok(catalogued)
    }

    /// Returns whether the file is still a live keeper afterwards.
    fn resolve_exact(
        &self,
        store: &Store,
        record: ImageRecord,
        relocator: &mut QuarantineRelocator,
        options: RunOptions,
        report: &mut RunReport,
    ) -> Result<bool, PipelineError> {
        let index = ExactDuplicateIndex::new(store);

        let existing = match index.classify(&record)? {
            ExactLookup::New | ExactLookup::Known => {
                index.record(&record)?;
                return Ok(true);
            }
            ExactLookup::Stale(missing) => {
                log::info!(
                    "Recorded keeper {} is gone, {} takes its place",
                    missing.path.display(),
                    record.path.display()
                );
                index.promote(&record)?;
                return Ok(true);
            }
            ExactLookup::Duplicate(existing) => existing,
        };

        report.duplicates_exact += 1;
        let resolver = KeeperResolver::new(self.config.duplicates.keep_policy);
        let new_path = record.path.clone();
        let Some(group) =
            DuplicateGroup::resolve(DuplicateReason::Exact, vec![existing, record], &resolver)
        else {
            return Ok(false);
        };
        let keeper = group.keeper();
        let new_is_keeper = keeper.path == new_path;
        log::info!(
            "Exact duplicate of {}: keeping {} ({})",
            keeper.exact_hash,
            keeper.path.display(),
            resolver.policy()
        );

        let mut relocated = true;
        for demoted in group.non_keepers() {
            relocated &= self.quarantine(
                store,
                relocator,
                demoted,
                keeper,
                DuplicateReason::Exact,
                options,
                report,
            )?;
        }
        if !relocated {
            // nothing was applied: the catalog and the report keep the old state
            return Ok(false);
        }

        if new_is_keeper {
            index.promote(keeper)?;
        } else {
            // the new path may carry a row from an earlier version of the file
            store.images().remove(&new_path)?;
        }
        report.groups.push(GroupReport::from(&group));
        Ok(new_is_keeper)
    }

    /// Relocate one non-keeper and record it. `Ok(false)` if the move failed;
    /// the file then stays where it was.
    #[allow(clippy::too_many_arguments)]
    fn quarantine(
        &self,
        store: &Store,
        relocator: &mut QuarantineRelocator,
        demoted: &ImageRecord,
        keeper: &ImageRecord,
        reason: DuplicateReason,
        options: RunOptions,
        report: &mut RunReport,
    ) -> Result<bool, PipelineError> {
        match relocator.relocate(&demoted.path, &demoted.exact_hash, options.dry_run) {
            Ok(destination) => {
                let entry = QuarantineEntry {
                    original_path: demoted.path.clone(),
                    destination,
                    exact_hash: demoted.exact_hash.clone(),
                    reason,
                    keeper_path: keeper.path.clone(),
                    created_at: Utc::now(),
                };
                store.quarantine().record(&entry)?;
                report.quarantined += 1;
                report.quarantine.push(entry);
                Ok(true)
            }
            Err(e) => {
                log::error!("Could not quarantine {}: {}", demoted.path.display(), e);
                report.file_error(&demoted.path, e);
                Ok(false)
            }
        }
    }

    /// Group the live catalog by perceptual distance and demote every non-keeper.
    fn resolve_similar(
        &self,
        store: &Store,
        relocator: &mut QuarantineRelocator,
        options: RunOptions,
        report: &mut RunReport,
    ) -> Result<(), PipelineError> {
        self.backfill_signatures(store)?;

        let candidates: Vec<ImageRecord> = store
            .images()
            .live_with_perceptual()?
            .into_iter()
            .filter(|record| record.path.exists())
            .collect();
        let grouper = SimilarityGrouper::new(self.config.duplicates.similarity_threshold);
        let resolver = KeeperResolver::new(self.config.duplicates.keep_policy);
        let clusters = grouper.group(&candidates)?;
        let total = clusters.len();

        for (i, cluster) in clusters.into_iter().enumerate() {
            if self.is_cancelled() {
                break;
            }
            if !cluster.has_duplicates() {
                continue;
            }
            self.emit(ScanPhase::SimilarDuplicates, i + 1, total, Some(&cluster.seed.path));

            let members = cluster.members.into_iter().cloned().collect();
            let Some(group) = DuplicateGroup::resolve(DuplicateReason::Visual, members, &resolver)
            else {
                continue;
            };
            let keeper = group.keeper();
            log::info!(
                "{} visually similar image(s), keeping {}",
                group.len(),
                keeper.path.display()
            );

            let mut relocated = true;
            for demoted in group.non_keepers() {
                report.duplicates_similar += 1;
                if self.quarantine(
                    store,
                    relocator,
                    demoted,
                    keeper,
                    DuplicateReason::Visual,
                    options,
                    report,
                )? {
                    store.images().remove(&demoted.path)?;
                } else {
                    relocated = false;
                }
            }
            if relocated {
                report.groups.push(GroupReport::from(&group));
            }
        }

        Ok(())
    }

    /// Catalogued files without a signature (recorded while similarity
    /// detection was off) get one now.
    fn backfill_signatures(&self, store: &Store) -> Result<(), PipelineError> {
        let missing: Vec<ImageRecord> = store
            .images()
            .all()?
            .into_iter()
            .filter(|record| record.perceptual_hash.is_none() && record.path.exists())
            .collect();
        if missing.is_empty() {
            return Ok(());
        }

        log::info!("Computing perceptual hashes for {} catalogued file(s)", missing.len());
        let service = PerceptualService::new(self.config.duplicates.perceptual_hash_size);
        for record in &missing {
            match service.compute_perceptual_hash(&record.path) {
                Ok(hash) => store.images().set_perceptual_hash(&record.path, &hash)?,
                Err(e) => log::debug!("{}", e),
            }
        }
        Ok(())
    }

    fn organize(
        &self,
        store: &Store,
        output: &Path,
        paths: &[PathBuf],
        options: RunOptions,
        report: &mut RunReport,
    ) -> Result<(), PipelineError> {
        let organizer = FolderOrganizer::new(output, self.config.organization.clone());
        let mut mover = FileMover::new(
            self.config.safety.file_operation,
            self.config.safety.verify_after_copy,
        )
        .dry_run(options.dry_run);

        for (i, path) in paths.iter().enumerate() {
            if self.is_cancelled() {
                break;
            }
            // demoted later in the run (visual duplicate) or replaced
            let Some(record) = store.images().find_by_path(path)? else {
                continue;
            };
            self.emit(ScanPhase::Organizing, i + 1, paths.len(), Some(path));

            let folder = organizer.target_folder(record.captured_at);
            match mover.process_file(path, &folder) {
                Ok(MoveOutcome::Moved(dest)) => {
                    report.files_organized += 1;
                    let moved = record.with_path(&dest);
                    if let Err(e) = store.images().update_path(path, &moved) {
                        log::error!("Moved {} but could not update the catalog: {}", path.display(), e);
                        report.file_error(path, e);
                    }
                }
                Ok(MoveOutcome::Copied(_)) => report.files_organized += 1,
                Ok(MoveOutcome::Skipped(_)) => {}
                Err(e) => report.file_error(path, e),
            }
        }

        report.mover = mover.stats().clone();
        Ok(())
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    fn emit(&self, phase: ScanPhase, processed: usize, total: usize, current: Option<&Path>) {
        if let Some(callback) = &self.progress {
            callback(&ScanProgress {
                phase,
                processed,
                total,
                current_file: current.map(Path::to_path_buf),
            });
        }
    }
}

/// Fatal when the catalog holds signatures of another length; otherwise
/// remembers the configured length.
pub fn check_signature_bits(store: &Store, configured: u32) -> Result<(), PipelineError> {
    match store.stored_signature_bits()? {
        Some(stored) if stored != configured => {
            Err(ConfigError::HashSizeMismatch { stored, configured }.into())
        }
        Some(_) => Ok(()),
        None => {
            store.record_signature_bits(configured)?;
            Ok(())
        }
    }
}
