//! Runs one pipeline at a time off the calling thread.

use crate::pipeline::{Pipeline, RunOptions, ScanProgress};
use crate::report::RunReport;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("an organize run is already in progress")]
    AlreadyRunning,

    #[error("cannot start worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Outcome of the most recent run; fatal errors are kept as their message.
pub type RunOutcome = Result<RunReport, String>;

#[derive(Default)]
struct Shared {
    progress: Mutex<Option<ScanProgress>>,
    last_outcome: Mutex<Option<RunOutcome>>,
}

/// Clears the busy flag when the worker thread ends, even by panic.
struct BusyGuard(Arc<AtomicBool>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct BackgroundRunner {
    busy: Arc<AtomicBool>,
    cancel: Arc<AtomicBool>,
    shared: Arc<Shared>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl BackgroundRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start `pipeline` on a worker thread. Rejected while a run is in progress.
    pub fn start(&self, pipeline: Pipeline, options: RunOptions) -> Result<(), WorkerError> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            log::warn!("Rejected organize request: a run is already in progress");
            return Err(WorkerError::AlreadyRunning);
        }
        let guard = BusyGuard(Arc::clone(&self.busy));

        self.cancel.store(false, Ordering::SeqCst);
        if let Ok(mut progress) = self.shared.progress.lock() {
            *progress = None;
        }

        let sink = Arc::clone(&self.shared);
        let pipeline = pipeline
            .with_cancellation_token(Arc::clone(&self.cancel))
            .with_progress(Box::new(move |progress: &ScanProgress| {
                if let Ok(mut slot) = sink.progress.lock() {
                    *slot = Some(progress.clone());
                }
            }));

        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name("picsort-run".to_string())
            .spawn(move || {
                let _guard = guard;
                let outcome = pipeline.run(options).map_err(|e| {
                    log::error!("Run failed: {}", e);
                    e.to_string()
                });
                if let Ok(mut last) = shared.last_outcome.lock() {
                    *last = Some(outcome);
                }
            })?;

        if let Ok(mut slot) = self.handle.lock() {
            *slot = Some(handle);
        }
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// Ask the current run to stop before its next file.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    pub fn progress(&self) -> Option<ScanProgress> {
        self.shared.progress.lock().ok().and_then(|p| p.clone())
    }

    pub fn last_outcome(&self) -> Option<RunOutcome> {
        self.shared.last_outcome.lock().ok().and_then(|o| o.clone())
    }

    /// Block until the current run (if any) ends and return its outcome.
    pub fn wait(&self) -> Option<RunOutcome> {
        let handle = self.handle.lock().ok().and_then(|mut slot| slot.take());
        if let Some(handle) = handle {
            if handle.join().is_err() {
                log::error!("Worker thread panicked");
            }
        }
        self.last_outcome()
    }
}
