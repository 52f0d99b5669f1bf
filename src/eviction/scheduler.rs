//! Eviction scheduling.
//!
//! Runs eviction passes either inline on the admitting thread or on a single
//! background worker. Background triggers are coalesced: the worker keeps a
//! pending flag, not a queue, so any number of triggers that arrive while a
//! pass is running produce exactly one follow-up pass.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use super::{EvictionEngine, EvictionReport};
use crate::error::Result;

/// How long the worker sleeps without a trigger before re-checking occupancy.
pub const EVICTION_IDLE_TIMEOUT: Duration = Duration::from_secs(10);

/// How often the worker logs cache statistics.
pub const STATS_LOG_PERIOD: Duration = Duration::from_secs(5 * 60);

const EVICTION_THREAD_NAME: &str = "blockcache-evictor";

/// Drives the eviction engine inline or from a background worker.
pub struct EvictionScheduler {
    engine: Arc<EvictionEngine>,
    worker: Option<EvictionWorker>,
}

impl EvictionScheduler {
    /// Start a scheduler, spawning the background worker if requested.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker thread cannot be spawned.
    pub fn start(engine: Arc<EvictionEngine>, use_eviction_thread: bool) -> Result<Self> {
        if use_eviction_thread {
            Self::background(engine)
        } else {
            Ok(Self::inline(engine))
        }
    }

    /// A scheduler that runs every pass on the triggering thread.
    pub fn inline(engine: Arc<EvictionEngine>) -> Self {
        Self { engine, worker: None }
    }

    /// A scheduler that hands passes to a dedicated worker thread.
    pub fn background(engine: Arc<EvictionEngine>) -> Result<Self> {
        let worker = EvictionWorker::spawn(Arc::clone(&engine))?;
        Ok(Self { engine, worker: Some(worker) })
    }

    /// Signal that occupancy crossed the acceptable watermark.
    ///
    /// Inline mode runs the pass before returning. Background mode only
    /// wakes the worker, unless it has been shut down, in which case the pass
    /// runs inline.
    pub fn trigger(&self) {
        match &self.worker {
            Some(worker) if worker.is_running() => worker.notify(),
            _ => {
                if let Some(report) = self.engine.evict_if_needed() {
                    log_incomplete(&report);
                }
            }
        }
    }

    /// Whether passes are handed to a live background worker.
    pub fn is_background(&self) -> bool {
        self.worker.as_ref().is_some_and(EvictionWorker::is_running)
    }

    /// Stop the background worker, letting an in-flight pass finish.
    ///
    /// Safe to call more than once; a no-op in inline mode.
    pub fn shutdown(&self) {
        if let Some(worker) = &self.worker {
            worker.stop();
        }
    }
}

impl Drop for EvictionScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct WorkerShared {
    engine: Arc<EvictionEngine>,
    /// Set by triggers, cleared by the worker when it starts a pass
    pending: Mutex<bool>,
    cond: Condvar,
    shutdown: AtomicBool,
}

struct EvictionWorker {
    shared: Arc<WorkerShared>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl EvictionWorker {
    fn spawn(engine: Arc<EvictionEngine>) -> Result<Self> {
        let shared = Arc::new(WorkerShared {
            engine,
            pending: Mutex::new(false),
            cond: Condvar::new(),
            shutdown: AtomicBool::new(false),
        });

        let this = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name(EVICTION_THREAD_NAME.to_string())
            .spawn(move || background_loop(&this))?;

        Ok(Self { shared, handle: Mutex::new(Some(handle)) })
    }

    fn is_running(&self) -> bool {
        !self.shared.shutdown.load(Ordering::SeqCst)
    }

    fn notify(&self) {
        let mut pending = self.shared.pending.lock();
        *pending = true;
        self.shared.cond.notify_one();
    }

    fn stop(&self) {
        self.shared.shutdown.store(true, Ordering::SeqCst);

        // Wake up the worker
        {
            let _pending = self.shared.pending.lock();
            self.shared.cond.notify_all();
        }

        if let Some(handle) = self.handle.lock().take() {
            if handle.join().is_err() {
                log::warn!("Eviction thread panicked");
            }
        }
    }
}

fn background_loop(shared: &WorkerShared) {
    log::info!("Eviction thread started");
    let mut last_stats = Instant::now();

    loop {
        let (run_pass, stopping) = {
            let mut pending = shared.pending.lock();

            if !*pending && !shared.shutdown.load(Ordering::SeqCst) {
                let result = shared.cond.wait_for(&mut pending, EVICTION_IDLE_TIMEOUT);
                if result.timed_out() && !*pending && shared.engine.needs_eviction() {
                    *pending = true;
                }
            }

            (std::mem::take(&mut *pending), shared.shutdown.load(Ordering::SeqCst))
        };

        // a trigger accepted before shutdown still gets its pass
        if run_pass {
            if let Some(report) = shared.engine.evict_if_needed() {
                log_incomplete(&report);
            }
        }

        if stopping {
            break;
        }

        if last_stats.elapsed() >= STATS_LOG_PERIOD {
            shared.engine.log_stats();
            last_stats = Instant::now();
        }
    }

    log::info!("Eviction thread stopped");
}

fn log_incomplete(report: &EvictionReport) {
    if let Err(e) = report.ensure_complete() {
        log::warn!("{}; retrying on next trigger", e);
    }
}
