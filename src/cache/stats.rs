//! Cache-wide counters and statistics snapshots.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam::utils::CachePadded;
use serde::Serialize;

use super::block::Priority;

/// Live counters shared by the table and the eviction engine.
///
/// Byte counters are only mutated while the table shard that caused the
/// change is locked, so they move together with the live block set.
#[derive(Debug, Default)]
pub struct CacheCounters {
    occupied: CachePadded<AtomicU64>,
    by_priority: [CachePadded<AtomicU64>; 3],
    blocks: AtomicU64,
    hits: CachePadded<AtomicU64>,
    misses: CachePadded<AtomicU64>,
    evicted: AtomicU64,
    eviction_runs: AtomicU64,
    incomplete_evictions: AtomicU64,
}

impl CacheCounters {
    /// Create zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add_block(&self, priority: Priority, size: u64) {
        self.occupied.fetch_add(size, Ordering::AcqRel);
        self.by_priority[priority.index()].fetch_add(size, Ordering::AcqRel);
        self.blocks.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn remove_block(&self, priority: Priority, size: u64) {
        self.occupied.fetch_sub(size, Ordering::AcqRel);
        self.by_priority[priority.index()].fetch_sub(size, Ordering::AcqRel);
        self.blocks.fetch_sub(1, Ordering::AcqRel);
    }

    pub(crate) fn promote(&self, from: Priority, to: Priority, size: u64) {
        self.by_priority[to.index()].fetch_add(size, Ordering::AcqRel);
        self.by_priority[from.index()].fetch_sub(size, Ordering::AcqRel);
    }

    pub(crate) fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_evicted(&self) {
        self.evicted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_eviction_run(&self) {
        self.eviction_runs.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_incomplete_eviction(&self) {
        self.incomplete_evictions.fetch_add(1, Ordering::Relaxed);
    }

    /// Total bytes held by live blocks.
    pub fn occupied(&self) -> u64 {
        self.occupied.load(Ordering::Acquire)
    }

    /// Bytes held by live blocks of one priority class.
    pub fn occupied_by(&self, priority: Priority) -> u64 {
        self.by_priority[priority.index()].load(Ordering::Acquire)
    }

    /// Number of live blocks.
    pub fn blocks(&self) -> u64 {
        self.blocks.load(Ordering::Acquire)
    }

    /// Snapshot all counters.
    pub fn snapshot(&self, capacity_bytes: u64) -> CacheStats {
        CacheStats {
            hit_count: self.hits.load(Ordering::Relaxed),
            miss_count: self.misses.load(Ordering::Relaxed),
            eviction_count: self.evicted.load(Ordering::Relaxed),
            eviction_runs: self.eviction_runs.load(Ordering::Relaxed),
            incomplete_evictions: self.incomplete_evictions.load(Ordering::Relaxed),
            occupied_bytes: self.occupied(),
            capacity_bytes,
            block_count: self.blocks(),
            occupied_by_priority: Priority::ALL.map(|p| self.occupied_by(p)),
        }
    }
}

/// Point-in-time cache statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Lookups that found their block
    pub hit_count: u64,
    /// Lookups that did not
    pub miss_count: u64,
    /// Blocks removed by eviction
    pub eviction_count: u64,
    /// Eviction passes that ran
    pub eviction_runs: u64,
    /// Passes that freed fewer bytes than they set out to
    pub incomplete_evictions: u64,
    /// Bytes held by live blocks
    pub occupied_bytes: u64,
    /// Configured capacity
    pub capacity_bytes: u64,
    /// Number of live blocks
    pub block_count: u64,
    /// Bytes held per priority class (single, multi, memory)
    pub occupied_by_priority: [u64; 3],
}

impl CacheStats {
    /// Total number of lookups
    pub fn request_count(&self) -> u64 {
        self.hit_count + self.miss_count
    }

    /// Calculate the cache hit ratio (0.0 to 1.0)
    pub fn hit_ratio(&self) -> f64 {
        let requests = self.request_count();
        if requests == 0 {
            0.0
        } else {
            self.hit_count as f64 / requests as f64
        }
    }

    /// Capacity not held by live blocks
    pub fn free_bytes(&self) -> u64 {
        self.capacity_bytes.saturating_sub(self.occupied_bytes)
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Cache Stats: Sizes: Total={}, Free={}, Max={}, Counts: Blocks={}, Access={}, Hit={}, \
             Miss={}, Evictions={}, Evicted={}, Ratios: Hit Ratio={:.2}%",
            self.occupied_bytes,
            self.free_bytes(),
            self.capacity_bytes,
            self.block_count,
            self.request_count(),
            self.hit_count,
            self.miss_count,
            self.eviction_runs,
            self.eviction_count,
            self.hit_ratio() * 100.0
        )
    }
}
