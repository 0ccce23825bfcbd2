//! Main copy engine
//!
//! Drains an item stream into a destination storage with a fixed pool of
//! worker tasks. Workers race for the next available item, so completion
//! order is not defined.
//!
//! Failure policy: with `continue_on_error` a failed item is logged and
//! discarded. Without it the first failure aborts the run: the queue is
//! closed so no further item is dispatched, writes already in flight on
//! other workers are allowed to finish, and the engine returns
//! [`StoreCopyError::Aborted`].

use crate::error::{Result, StoreCopyError};
use crate::progress::ProgressReporter;
use crate::storage::{ItemStream, Storage};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;

/// Default number of concurrent workers
pub const DEFAULT_CONCURRENCY: usize = 10;

/// Engine settings, fixed for the duration of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyOptions {
    /// Number of workers
    pub concurrency: usize,
    /// Log and skip failed items instead of aborting
    pub continue_on_error: bool,
}

impl Default for CopyOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            continue_on_error: false,
        }
    }
}

impl CopyOptions {
    /// Validate options
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(StoreCopyError::config("Concurrency must be at least 1"));
        }
        Ok(())
    }
}

/// Run-level outcome counts
#[derive(Debug, Clone, Default)]
pub struct CopyReport {
    /// Items handed to the destination
    pub attempted: u64,
    /// Items written successfully
    pub committed: u64,
    /// Items the destination rejected
    pub failed: u64,
    /// Bytes written
    pub bytes_copied: u64,
    /// Total duration
    pub duration: Duration,
}

impl CopyReport {
    /// Check if every attempted item was written
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    /// Average throughput in bytes/second
    pub fn throughput(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs > 0.0 {
            self.bytes_copied as f64 / secs
        } else {
            0.0
        }
    }

    fn log_summary(&self) {
        tracing::info!(
            "Copied {} of {} items ({}) in {:.2?}, {}/s, {} failed",
            self.committed,
            self.attempted,
            humansize::format_size(self.bytes_copied, humansize::BINARY),
            self.duration,
            humansize::format_size(self.throughput() as u64, humansize::BINARY),
            self.failed
        );
    }
}

#[derive(Default)]
struct RunState {
    aborted: AtomicBool,
    attempted: AtomicU64,
    committed: AtomicU64,
    failed: AtomicU64,
    bytes_copied: AtomicU64,
}

impl RunState {
    fn report(&self, duration: Duration) -> CopyReport {
        CopyReport {
            attempted: self.attempted.load(Ordering::SeqCst),
            committed: self.committed.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
            bytes_copied: self.bytes_copied.load(Ordering::SeqCst),
            duration,
        }
    }
}

/// Worker pool copying items into a destination
pub struct CopyEngine {
    options: CopyOptions,
    progress: Option<Arc<ProgressReporter>>,
}

impl CopyEngine {
    /// Create a new copy engine
    pub fn new(options: CopyOptions) -> Self {
        Self {
            options,
            progress: None,
        }
    }

    /// Set progress reporter
    pub fn with_progress(mut self, progress: ProgressReporter) -> Self {
        self.progress = Some(Arc::new(progress));
        self
    }

    /// Enumerate `source` and copy everything into `destination`.
    pub async fn transfer(
        &self,
        source: &dyn Storage,
        destination: Arc<dyn Storage>,
    ) -> Result<CopyReport> {
        self.options.validate()?;
        tracing::info!("Copying {} to {}", source.location(), destination.location());
        self.copy(destination, source.list_files()).await
    }

    /// Drain `items` into `destination`. Returns once every worker has
    /// exhausted the stream, or after the first failure in fail-fast mode.
    pub async fn copy(&self, destination: Arc<dyn Storage>, items: ItemStream) -> Result<CopyReport> {
        self.options.validate()?;

        let start_time = Instant::now();
        let state = Arc::new(RunState::default());
        let concurrency = self.options.concurrency;

        tracing::info!("Starting {} workers...", concurrency);

        let mut workers = JoinSet::new();
        for worker_id in 0..concurrency {
            workers.spawn(run_worker(
                worker_id,
                Arc::clone(&destination),
                items.clone(),
                Arc::clone(&state),
                self.options.continue_on_error,
                self.progress.clone(),
            ));
        }

        let mut first_error = None;
        while let Some(joined) = workers.join_next().await {
            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(e) => {
                    // a lost worker must not leave the rest draining forever
                    items.close();
                    Err(StoreCopyError::WorkerError(e.to_string()))
                }
            };
            if let Err(e) = outcome {
                first_error.get_or_insert(e);
            }
        }
        drop(items);

        let report = state.report(start_time.elapsed());
        report.log_summary();

        match first_error {
            Some(e) => {
                if let Some(progress) = &self.progress {
                    progress.finish_error(&e.to_string());
                }
                Err(e)
            }
            None => {
                if let Some(progress) = &self.progress {
                    progress.finish_success(&format!("{} items copied", report.committed));
                }
                Ok(report)
            }
        }
    }
}

/// Copy `items` into `destination` with `concurrency` workers.
pub async fn copy_items(
    destination: Arc<dyn Storage>,
    items: ItemStream,
    concurrency: usize,
    continue_on_error: bool,
) -> Result<CopyReport> {
    CopyEngine::new(CopyOptions {
        concurrency,
        continue_on_error,
    })
    .copy(destination, items)
    .await
}

async fn run_worker(
    worker_id: usize,
    destination: Arc<dyn Storage>,
    items: ItemStream,
    state: Arc<RunState>,
    continue_on_error: bool,
    progress: Option<Arc<ProgressReporter>>,
) -> Result<()> {
    while let Some(item) = items.next().await {
        if state.aborted.load(Ordering::SeqCst) {
            // taken after the abort: released without being attempted
            break;
        }

        let identity = item.to_string();
        let relative = item.relative_path().to_string();
        state.attempted.fetch_add(1, Ordering::SeqCst);
        if let Some(progress) = &progress {
            progress.set_current(&item.path);
        }

        match destination.put_file(item).await {
            Ok(bytes) => {
                state.committed.fetch_add(1, Ordering::SeqCst);
                state.bytes_copied.fetch_add(bytes, Ordering::SeqCst);
                if let Some(progress) = &progress {
                    progress.record_committed(bytes);
                }
                tracing::info!("Transfer of {} done", identity);
            }
            Err(e) => {
                state.failed.fetch_add(1, Ordering::SeqCst);
                if let Some(progress) = &progress {
                    progress.record_failed();
                }
                tracing::error!("Transfer of {} failed: {}", identity, e);

                if !continue_on_error {
                    state.aborted.store(true, Ordering::SeqCst);
                    items.close();
                    return Err(StoreCopyError::aborted(relative, e));
                }
            }
        }
    }

    tracing::debug!("Worker {} shutting down", worker_id);
    Ok(())
}
