//! Eviction engine for the block cache.
//!
//! An eviction pass brings occupancy from at or above the acceptable
//! watermark down to the minimum watermark.
//!
//! ## Process
//!
//! 1. Snapshot occupancy from the table counters
//! 2. Collect every live block as a candidate (table.rs)
//! 3. Pick victims by class overflow or global LRU (picker.rs)
//! 4. Remove each victim, skipping blocks replaced since step 2
//!
//! Passes never run concurrently; the scheduler decides whether they run on
//! the admitting thread or on a background worker (scheduler.rs).

pub mod picker;
pub mod scheduler;

pub use picker::{EvictionPlan, SelectionMode};
pub use scheduler::EvictionScheduler;

use std::sync::Arc;

use parking_lot::Mutex;

use crate::cache::ConcurrentBlockTable;
use crate::config::CacheConfig;
use crate::error::{Error, Result};

/// Runs eviction passes against a block table.
pub struct EvictionEngine {
    config: Arc<CacheConfig>,
    table: Arc<ConcurrentBlockTable>,
    /// Held for the duration of a pass
    pass_lock: Mutex<()>,
}

impl EvictionEngine {
    /// Create an engine over `table`.
    pub fn new(config: Arc<CacheConfig>, table: Arc<ConcurrentBlockTable>) -> Self {
        Self { config, table, pass_lock: Mutex::new(()) }
    }

    /// Whether occupancy has reached the acceptable watermark.
    pub fn needs_eviction(&self) -> bool {
        self.table.snapshot_occupancy().total >= self.config.acceptable_bytes()
    }

    /// Run a pass if occupancy is at or above the acceptable watermark.
    ///
    /// The watermark is checked again once the pass lock is held, so a
    /// trigger that raced with another pass does not evict twice.
    pub fn evict_if_needed(&self) -> Option<EvictionReport> {
        let _pass = self.pass_lock.lock();
        if !self.needs_eviction() {
            return None;
        }
        Some(self.run_pass())
    }

    /// Run a pass regardless of the acceptable watermark.
    ///
    /// Evicts only if occupancy is above the minimum watermark.
    pub fn evict(&self) -> EvictionReport {
        let _pass = self.pass_lock.lock();
        self.run_pass()
    }

    /// Log current statistics.
    pub fn log_stats(&self) {
        log::info!("{}", self.table.stats());
    }

    fn run_pass(&self) -> EvictionReport {
        let occupancy = self.table.snapshot_occupancy();
        let candidates = self.table.candidates();

        match picker::select_victims(&self.config, occupancy.total, candidates) {
            Some(plan) => self.execute(plan),
            None => EvictionReport {
                mode: None,
                bytes_to_free: 0,
                bytes_freed: 0,
                blocks_evicted: 0,
                occupied_after: occupancy.total,
            },
        }
    }

    /// Remove the planned victims that are still cached.
    fn execute(&self, plan: EvictionPlan) -> EvictionReport {
        let mut bytes_freed = 0;
        let mut blocks_evicted = 0;
        for victim in &plan.victims {
            if self.table.evict(victim) {
                bytes_freed += victim.size;
                blocks_evicted += 1;
            }
        }
        self.table.counters().record_eviction_run();
        if bytes_freed < plan.bytes_to_free {
            self.table.counters().record_incomplete_eviction();
        }

        let report = EvictionReport {
            mode: Some(plan.mode),
            bytes_to_free: plan.bytes_to_free,
            bytes_freed,
            blocks_evicted,
            occupied_after: self.table.snapshot_occupancy().total,
        };

        log::debug!(
            "Eviction pass ({:?}): evicted {} blocks, freed {} of {} bytes, occupancy now {} of {}",
            plan.mode,
            report.blocks_evicted,
            report.bytes_freed,
            report.bytes_to_free,
            report.occupied_after,
            self.config.capacity_bytes()
        );

        report
    }
}

/// Outcome of one eviction pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvictionReport {
    /// How victims were chosen, or `None` if nothing had to be freed
    pub mode: Option<SelectionMode>,
    /// Bytes the pass needed to free
    pub bytes_to_free: u64,
    /// Bytes actually freed
    pub bytes_freed: u64,
    /// Blocks actually removed
    pub blocks_evicted: u64,
    /// Occupancy when the pass finished
    pub occupied_after: u64,
}

impl EvictionReport {
    /// Check that the pass freed everything it set out to.
    ///
    /// Falls short when victims were invalidated or replaced while the pass
    /// was running.
    pub fn ensure_complete(&self) -> Result<()> {
        if self.bytes_freed < self.bytes_to_free {
            return Err(Error::EvictionIncomplete {
                bytes_to_free: self.bytes_to_free,
                bytes_freed: self.bytes_freed,
            });
        }
        Ok(())
    }
}
