//! # Worker Pool Coordination
//!
//! Thread-pool construction plus the small shared coordination state the
//! pipelines use: started/completed worker counters, a run-wide terminate
//! flag checked between work units, and warn-capped rejection logging.
//!
//! Pool joins are rayon scope barriers; the counters exist for progress
//! reporting and for detecting workers that never registered, which is
//! fatal for the run rather than silently degrading parallelism.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use crate::error::{HapError, Result};

/// Build a named, fixed-size thread pool; `n_threads` is capped by the
/// logical CPU count, and 0 selects the CPU count.
pub fn build_thread_pool(n_threads: usize) -> Result<rayon::ThreadPool> {
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    let n_threads = match n_threads {
        0 => cpus,
        n => n.min(cpus),
    };
    rayon::ThreadPoolBuilder::new()
        .num_threads(n_threads)
        .thread_name(|i| format!("hapcall-worker-{}", i))
        .build()
        .map_err(|e| HapError::config(format!("failed to create thread pool: {}", e)))
}

/// Shared coordination state for one pool phase
#[derive(Debug, Default)]
pub struct PoolCoordinator {
    started: AtomicUsize,
    completed: AtomicUsize,
    terminate: AtomicBool,
}

impl PoolCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// A worker registers before touching its first work unit
    pub fn register_start(&self) {
        self.started.fetch_add(1, Ordering::SeqCst);
    }

    /// A worker registers after finishing its last work unit
    pub fn register_completion(&self) {
        self.completed.fetch_add(1, Ordering::SeqCst);
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    /// Request run termination; workers poll between work units
    pub fn request_terminate(&self) {
        self.terminate.store(true, Ordering::SeqCst);
    }

    pub fn terminate_requested(&self) -> bool {
        self.terminate.load(Ordering::SeqCst)
    }

    /// After the pool join, verify every expected worker registered both
    /// edges. A shortfall means the pool silently lost workers.
    pub fn verify_all_done(&self, expected: usize) -> Result<()> {
        let started = self.started();
        let completed = self.completed();
        if started != expected || completed != expected {
            return Err(HapError::algorithm(format!(
                "worker pool anomaly: {}/{} started, {}/{} completed",
                started, expected, completed, expected
            )));
        }
        Ok(())
    }
}

/// Warn-level logger that stops after a fixed number of occurrences so
/// per-record rejections cannot flood the log.
#[derive(Debug)]
pub struct CappedWarnings {
    count: AtomicU64,
    cap: u64,
}

impl CappedWarnings {
    pub fn new(cap: u64) -> Self {
        Self {
            count: AtomicU64::new(0),
            cap,
        }
    }

    /// Log one warning unless the cap is exhausted; the cap-hitting call
    /// announces the suppression.
    pub fn warn(&self, message: impl FnOnce() -> String) {
        let seen = self.count.fetch_add(1, Ordering::Relaxed);
        if seen < self.cap {
            tracing::warn!("{}", message());
            if seen + 1 == self.cap {
                tracing::warn!("further warnings of this kind suppressed");
            }
        }
    }

    pub fn total(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }
}

impl Default for CappedWarnings {
    fn default() -> Self {
        Self::new(100)
    }
}
