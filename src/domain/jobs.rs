//! Background execution for backtests and optimizer runs.
//!
//! Long CPU-bound work runs on named worker threads. Each kind of job is
//! guarded by an advisory [`RunLock`]; callers poll a shared [`JobProgress`]
//! or block on [`JobHandle::join`].

use crate::domain::backtest::{self, BacktestConfig, BacktestReport};
use crate::domain::error::TraderError;
use crate::domain::optimizer::{GeneticOptimizer, OptimizeRequest};
use crate::domain::strategy::StrategyConfig;
use crate::ports::data_port::MarketDataPort;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::thread;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Idle,
    Running,
    Complete,
    Cancelled,
    Failed(String),
}

/// Pollable progress shared between a worker and its observers.
#[derive(Debug)]
pub struct JobProgress {
    status: RwLock<JobStatus>,
    total: AtomicUsize,
    completed: AtomicUsize,
    cancelled: AtomicBool,
}

impl Default for JobProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl JobProgress {
    pub fn new() -> Self {
        Self {
            status: RwLock::new(JobStatus::Idle),
            total: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
            cancelled: AtomicBool::new(false),
        }
    }

    fn set_status(&self, status: JobStatus) {
        *self.status.write().unwrap_or_else(|e| e.into_inner()) = status;
    }

    /// Reset for a new run of `total` units.
    pub fn start(&self, total: usize) {
        self.total.store(total, Ordering::Relaxed);
        self.completed.store(0, Ordering::Relaxed);
        self.cancelled.store(false, Ordering::Relaxed);
        self.set_status(JobStatus::Running);
    }

    pub fn advance(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn finish(&self) {
        let status = if self.is_cancelled() {
            JobStatus::Cancelled
        } else {
            JobStatus::Complete
        };
        self.set_status(status);
    }

    pub fn fail(&self, reason: impl Into<String>) {
        self.set_status(JobStatus::Failed(reason.into()));
    }

    /// Ask the worker to stop at its next unit boundary.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    pub fn status(&self) -> JobStatus {
        self.status.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn is_running(&self) -> bool {
        self.status() == JobStatus::Running
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::Relaxed)
    }

    pub fn total(&self) -> usize {
        self.total.load(Ordering::Relaxed)
    }

    pub fn progress_pct(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            0.0
        } else {
            self.completed() as f64 / total as f64 * 100.0
        }
    }
}

/// Advisory lock allowing one run of a given job kind at a time.
#[derive(Debug)]
pub struct RunLock {
    job: &'static str,
    held: AtomicBool,
}

/// Releases its [`RunLock`] when dropped.
#[derive(Debug)]
pub struct RunGuard {
    lock: Arc<RunLock>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.lock.held.store(false, Ordering::Release);
    }
}

impl RunLock {
    pub fn new(job: &'static str) -> Arc<Self> {
        Arc::new(RunLock {
            job,
            held: AtomicBool::new(false),
        })
    }

    pub fn try_acquire(self: &Arc<Self>) -> Result<RunGuard, TraderError> {
        self.held
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .map_err(|_| TraderError::Busy {
                job: self.job.to_string(),
            })?;
        Ok(RunGuard {
            lock: Arc::clone(self),
        })
    }

    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }
}

pub struct JobHandle<T> {
    handle: thread::JoinHandle<Result<T, TraderError>>,
    progress: Arc<JobProgress>,
}

impl<T> JobHandle<T> {
    pub fn progress(&self) -> &Arc<JobProgress> {
        &self.progress
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Block until the worker finishes and return its result.
    pub fn join(self) -> Result<T, TraderError> {
        match self.handle.join() {
            Ok(result) => result,
            Err(_) => {
                self.progress.fail("worker panicked");
                Err(TraderError::Io(std::io::Error::other("worker thread panicked")))
            }
        }
    }
}

fn spawn_job<T, F>(
    name: &str,
    lock: &Arc<RunLock>,
    progress: Arc<JobProgress>,
    work: F,
) -> Result<JobHandle<T>, TraderError>
where
    T: Send + 'static,
    F: FnOnce(&JobProgress) -> Result<T, TraderError> + Send + 'static,
{
    let guard = lock.try_acquire()?;
    let worker_progress = Arc::clone(&progress);
    let handle = thread::Builder::new()
        .name(name.to_string())
        .spawn(move || {
            let _guard = guard;
            let result = work(&worker_progress);
            match &result {
                Ok(_) => worker_progress.finish(),
                Err(e) => worker_progress.fail(e.to_string()),
            }
            result
        })?;
    Ok(JobHandle { handle, progress })
}

/// One ticker's backtest outcome within a batch.
#[derive(Debug)]
pub struct TickerBacktest {
    pub ticker: String,
    pub result: Result<BacktestReport, TraderError>,
}

#[derive(Debug, Clone)]
pub struct BacktestJob {
    pub tickers: Vec<String>,
    pub period: String,
    pub interval: String,
    pub config: BacktestConfig,
}

/// Backtest every ticker in `job` on a worker thread.
///
/// `strategy` is the snapshot the whole batch runs under. A ticker without
/// data is reported in its slot and the batch continues.
pub fn spawn_backtest(
    lock: &Arc<RunLock>,
    data: Arc<dyn MarketDataPort>,
    job: BacktestJob,
    strategy: StrategyConfig,
) -> Result<JobHandle<Vec<TickerBacktest>>, TraderError> {
    let progress = Arc::new(JobProgress::new());
    progress.start(job.tickers.len());
    spawn_job("backtest", lock, progress, move |progress| {
        Ok(run_backtest_batch(data.as_ref(), &job, &strategy, progress))
    })
}

pub fn run_backtest_batch(
    data: &dyn MarketDataPort,
    job: &BacktestJob,
    strategy: &StrategyConfig,
    progress: &JobProgress,
) -> Vec<TickerBacktest> {
    let mut results = Vec::with_capacity(job.tickers.len());
    for ticker in &job.tickers {
        if progress.is_cancelled() {
            info!(completed = results.len(), "backtest batch cancelled");
            break;
        }
        let result = backtest::run_for_ticker(
            data,
            ticker,
            &job.period,
            &job.interval,
            strategy,
            &job.config,
        );
        if let Err(e) = &result {
            warn!(ticker = %ticker, error = %e, "skipping ticker");
        }
        results.push(TickerBacktest {
            ticker: ticker.clone(),
            result,
        });
        progress.advance();
    }
    results
}

/// Run the optimizer on a worker thread under `base`, a snapshot of the
/// live config taken by the caller.
pub fn spawn_optimizer(
    lock: &Arc<RunLock>,
    optimizer: Arc<GeneticOptimizer>,
    request: OptimizeRequest,
    base: StrategyConfig,
) -> Result<JobHandle<StrategyConfig>, TraderError> {
    let progress = Arc::new(JobProgress::new());
    progress.start(request.generations);
    spawn_job("optimizer", lock, progress, move |progress| {
        optimizer.optimize(&request, &base, progress)
    })
}
