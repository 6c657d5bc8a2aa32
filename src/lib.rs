//! Photo organizer: catalogues image files, detects exact and visually
//! similar duplicates, quarantines the non-keepers and sorts the rest into
//! date folders.

pub mod config;
pub mod core;
pub mod database;
pub mod detection;
pub mod organize;
pub mod pipeline;
pub mod report;
pub mod worker;

pub use config::{Config, ConfigError, KeepPolicy};
pub use database::{Store, StoreError};
pub use pipeline::{Pipeline, PipelineError, RunOptions, ScanPhase, ScanProgress};
pub use report::RunReport;
pub use worker::{BackgroundRunner, WorkerError};
