//! Concurrent block table.
//!
//! A sharded map from [`BlockKey`] to [`CachedBlock`] with byte accounting.
//! The number of shards is the configured concurrency level (capped at
//! [`MAX_SHARDS`]); each shard has its own lock, so operations on keys in
//! different shards never contend.
//!
//! ## Accounting
//!
//! Every mutation of a shard's map updates [`CacheCounters`] before the shard
//! lock is released. A lookup that promotes a block moves its bytes between
//! per-priority counters while holding the shard's read lock, which excludes
//! removal of that block for the duration.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;

use super::block::{BlockHandle, BlockKey, CachedBlock, Priority};
use super::stats::{CacheCounters, CacheStats};
use crate::config::CacheConfig;

type Shard = HashMap<BlockKey, Arc<CachedBlock>>;

/// Upper bound on the number of shards.
pub const MAX_SHARDS: usize = 1 << 16;

/// Upper bound on entries presized across all shards. Larger tables grow on
/// demand.
pub const MAX_PRESIZED_ENTRIES: usize = 1 << 20;

/// Result of [`ConcurrentBlockTable::put`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PutOutcome {
    /// The block was inserted.
    Admitted,
    /// The key was already present; nothing changed.
    AlreadyCached,
    /// The block alone is larger than the whole cache; nothing changed.
    TooLarge {
        /// Size of the rejected block
        size: u64,
        /// Configured capacity
        capacity: u64,
    },
}

/// Byte occupancy at a point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Occupancy {
    /// Bytes held by all live blocks
    pub total: u64,
    /// Bytes held per priority class
    pub by_priority: [u64; 3],
}

impl Occupancy {
    /// Bytes held by one priority class.
    pub fn of(&self, priority: Priority) -> u64 {
        self.by_priority[priority.index()]
    }
}

/// A block considered for eviction, with its bookkeeping as observed when
/// candidates were collected.
#[derive(Debug, Clone)]
pub struct EvictionCandidate {
    pub(crate) block: Arc<CachedBlock>,
    /// Accounted size
    pub size: u64,
    /// Priority class when collected
    pub priority: Priority,
    /// Logical time of last access when collected
    pub last_access: u64,
}

impl EvictionCandidate {
    /// Key of the candidate block.
    pub fn key(&self) -> BlockKey {
        self.block.key()
    }
}

/// Thread-safe key to block store with byte accounting.
pub struct ConcurrentBlockTable {
    shards: Vec<RwLock<Shard>>,
    counters: CacheCounters,
    clock: AtomicU64,
    capacity_bytes: u64,
}

impl ConcurrentBlockTable {
    /// Create a table sized and sharded per `config`.
    pub fn new(config: &CacheConfig) -> Self {
        let shard_count = (config.map_concurrency_level().max(1) as usize).min(MAX_SHARDS);
        let max_per_shard = MAX_PRESIZED_ENTRIES.div_ceil(shard_count);

        let per_shard = config.initial_table_capacity().div_ceil(shard_count);
        // float to int casts saturate, so a tiny load factor lands on the cap
        let per_shard = (per_shard as f64 / f64::from(config.map_load_factor())).ceil() as usize;
        let per_shard = per_shard.min(max_per_shard);

        let shards = (0..shard_count).map(|_| RwLock::new(Shard::with_capacity(per_shard))).collect();

        Self {
            shards,
            counters: CacheCounters::new(),
            clock: AtomicU64::new(0),
            capacity_bytes: config.capacity_bytes(),
        }
    }

    /// Look up a block, recording the access.
    ///
    /// A hit advances the block's access bookkeeping and may promote it.
    pub fn get(&self, key: &BlockKey) -> Option<BlockHandle> {
        let shard = self.shard(key).read();

        match shard.get(key) {
            Some(block) => {
                if let Some((from, to)) = block.access(self.tick()) {
                    self.counters.promote(from, to, block.size());
                }
                self.counters.record_hit();
                Some(BlockHandle::new(Arc::clone(block)))
            }
            None => {
                self.counters.record_miss();
                None
            }
        }
    }

    /// Check for a key without touching statistics or access bookkeeping.
    pub fn contains(&self, key: &BlockKey) -> bool {
        self.shard(key).read().contains_key(key)
    }

    /// Admit a block.
    ///
    /// A key that is already present is left untouched. A block whose size
    /// exceeds the total capacity is never admitted.
    pub fn put(&self, key: BlockKey, data: Bytes, size: u64, pinned: bool) -> PutOutcome {
        if size > self.capacity_bytes {
            return PutOutcome::TooLarge { size, capacity: self.capacity_bytes };
        }

        let mut shard = self.shard(&key).write();
        if shard.contains_key(&key) {
            return PutOutcome::AlreadyCached;
        }

        let block = CachedBlock::new(key, data, size, pinned, self.tick());
        self.counters.add_block(block.priority(), size);
        shard.insert(key, Arc::new(block));

        PutOutcome::Admitted
    }

    /// Remove a block, returning it to the caller.
    pub fn remove(&self, key: &BlockKey) -> Option<BlockHandle> {
        let mut shard = self.shard(key).write();
        let block = shard.remove(key)?;
        self.counters.remove_block(block.priority(), block.size());
        Some(BlockHandle::new(block))
    }

    /// Remove an eviction victim.
    ///
    /// Succeeds only if the slot still holds the exact block that was
    /// collected as a candidate; a block invalidated and re-admitted in the
    /// meantime is left alone.
    pub fn evict(&self, candidate: &EvictionCandidate) -> bool {
        let key = candidate.key();
        let mut shard = self.shard(&key).write();

        match shard.get(&key) {
            Some(current) if Arc::ptr_eq(current, &candidate.block) => {}
            _ => return false,
        }

        if let Some(block) = shard.remove(&key) {
            self.counters.remove_block(block.priority(), block.size());
            self.counters.record_evicted();
            true
        } else {
            false
        }
    }

    /// Remove every block belonging to `file_id`.
    ///
    /// Returns the number of blocks removed.
    pub fn remove_file(&self, file_id: u64) -> usize {
        let mut removed = 0;
        for shard in &self.shards {
            let mut shard = shard.write();
            shard.retain(|key, block| {
                if key.file_id == file_id {
                    self.counters.remove_block(block.priority(), block.size());
                    removed += 1;
                    false
                } else {
                    true
                }
            });
        }
        removed
    }

    /// Remove every block.
    pub fn clear(&self) {
        for shard in &self.shards {
            let mut shard = shard.write();
            for block in shard.values() {
                self.counters.remove_block(block.priority(), block.size());
            }
            shard.clear();
        }
    }

    /// Current occupancy, read without taking any shard lock.
    ///
    /// Approximate while admissions or evictions are in flight.
    pub fn snapshot_occupancy(&self) -> Occupancy {
        Occupancy {
            total: self.counters.occupied(),
            by_priority: Priority::ALL.map(|p| self.counters.occupied_by(p)),
        }
    }

    /// Collect every live block as an eviction candidate.
    ///
    /// Shards are visited one at a time under their read lock.
    pub fn candidates(&self) -> Vec<EvictionCandidate> {
        let mut out = Vec::with_capacity(self.counters.blocks() as usize);
        for shard in &self.shards {
            let shard = shard.read();
            out.extend(shard.values().map(|block| EvictionCandidate {
                block: Arc::clone(block),
                size: block.size(),
                priority: block.priority(),
                last_access: block.last_access(),
            }));
        }
        out
    }

    /// Live counters.
    pub fn counters(&self) -> &CacheCounters {
        &self.counters
    }

    /// Snapshot of the cache statistics.
    pub fn stats(&self) -> CacheStats {
        self.counters.snapshot(self.capacity_bytes)
    }

    /// Configured capacity in bytes.
    pub fn capacity_bytes(&self) -> u64 {
        self.capacity_bytes
    }

    /// Number of shards.
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Number of live blocks, counted under the shard locks.
    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.read().len()).sum()
    }

    /// Check if the table is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn shard(&self, key: &BlockKey) -> &RwLock<Shard> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        &self.shards[hasher.finish() as usize % self.shards.len()]
    }
}
