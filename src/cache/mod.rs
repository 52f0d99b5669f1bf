//! Block cache for immutable file blocks.
//!
//! Provides a priority-segmented LRU cache that sits in front of block
//! storage, so repeated reads of hot blocks skip I/O.
//!
//! - **Block**: payload plus priority and access bookkeeping (block.rs)
//! - **Priority**: single / multi / memory classification (priority.rs)
//! - **Table**: sharded concurrent store with byte accounting (table.rs)
//! - **Stats**: hit, miss and eviction counters (stats.rs)
//!
//! Eviction itself lives in [`crate::eviction`].

mod block;
pub mod priority;
mod stats;
mod table;

pub use block::{BlockHandle, BlockKey, CachedBlock, Priority};
pub use stats::{CacheCounters, CacheStats};
pub use table::{
    ConcurrentBlockTable, EvictionCandidate, Occupancy, PutOutcome, MAX_PRESIZED_ENTRIES, MAX_SHARDS,
};

use std::sync::Arc;

use bytes::Bytes;

use crate::config::CacheConfig;
use crate::error::Result;
use crate::eviction::{EvictionEngine, EvictionReport, EvictionScheduler};

/// Why an admission was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// The block alone is larger than the cache capacity.
    TooLarge {
        /// Size of the rejected block
        size: u64,
        /// Configured capacity
        capacity: u64,
    },
}

/// Result of [`BlockCache::admit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdmitOutcome {
    /// The block is now cached.
    Admitted,
    /// A block with this key was already cached and was left untouched.
    AlreadyPresent,
    /// The block was not cached; the caller should use it uncached.
    Rejected(RejectReason),
}

impl From<PutOutcome> for AdmitOutcome {
    fn from(outcome: PutOutcome) -> Self {
        match outcome {
            PutOutcome::Admitted => AdmitOutcome::Admitted,
            PutOutcome::AlreadyCached => AdmitOutcome::AlreadyPresent,
            PutOutcome::TooLarge { size, capacity } => {
                AdmitOutcome::Rejected(RejectReason::TooLarge { size, capacity })
            }
        }
    }
}

/// Thread-safe block cache.
///
/// Blocks are admitted by the read path after a miss and evicted once
/// occupancy reaches the acceptable watermark, down to the minimum
/// watermark.
///
/// # Thread Safety
///
/// All operations take `&self`; share the cache across threads with
/// `Arc<BlockCache>`.
///
/// # Example
///
/// ```
/// use blockcache::{AdmitOutcome, BlockCache, BlockKey, CacheConfig};
/// use bytes::Bytes;
///
/// # fn main() -> blockcache::Result<()> {
/// let cache = BlockCache::new(CacheConfig::with_defaults(8 * 1024 * 1024)?)?;
///
/// let key = BlockKey::new(7, 4096);
/// assert!(cache.lookup(&key).is_none());
///
/// let outcome = cache.admit(key, Bytes::from_static(b"block bytes"), None, false);
/// assert_eq!(outcome, AdmitOutcome::Admitted);
/// assert_eq!(cache.lookup(&key).unwrap().data().as_ref(), b"block bytes");
/// # Ok(())
/// # }
/// ```
pub struct BlockCache {
    config: Arc<CacheConfig>,
    table: Arc<ConcurrentBlockTable>,
    engine: Arc<EvictionEngine>,
    scheduler: EvictionScheduler,
}

impl BlockCache {
    /// Create a cache from a validated configuration.
    ///
    /// Spawns the eviction thread if the configuration asks for one.
    ///
    /// # Errors
    ///
    /// Returns an error if the eviction thread cannot be spawned.
    pub fn new(config: CacheConfig) -> Result<Self> {
        let config = Arc::new(config);
        let table = Arc::new(ConcurrentBlockTable::new(&config));
        let engine = Arc::new(EvictionEngine::new(Arc::clone(&config), Arc::clone(&table)));
        let scheduler = EvictionScheduler::start(Arc::clone(&engine), config.use_eviction_thread())?;

        log::info!("Created block cache: {}", config);

        Ok(Self { config, table, engine, scheduler })
    }

    /// Look up a block.
    ///
    /// A hit records the access and may promote the block to a higher
    /// priority class. The returned handle stays valid even if the block is
    /// evicted while the caller holds it.
    pub fn lookup(&self, key: &BlockKey) -> Option<BlockHandle> {
        self.table.get(key)
    }

    /// Admit a freshly loaded block.
    ///
    /// `size_hint` overrides the accounted size (defaults to the payload
    /// length). `pin` places the block in the memory class for its whole life.
    ///
    /// Admission never fails because of eviction: if it pushes occupancy to
    /// the acceptable watermark an eviction pass is triggered, inline or in
    /// the background depending on configuration.
    pub fn admit(&self, key: BlockKey, data: Bytes, size_hint: Option<u64>, pin: bool) -> AdmitOutcome {
        let size = size_hint.unwrap_or(data.len() as u64);
        let outcome = self.table.put(key, data, size, pin);

        if outcome == PutOutcome::Admitted && self.engine.needs_eviction() {
            self.scheduler.trigger();
        }

        outcome.into()
    }

    /// Drop a cached block, e.g. because its file changed.
    ///
    /// Returns true if the block was cached.
    pub fn invalidate(&self, key: &BlockKey) -> bool {
        self.table.remove(key).is_some()
    }

    /// Drop every cached block of a deleted file.
    ///
    /// Returns the number of blocks dropped.
    pub fn invalidate_file(&self, file_id: u64) -> usize {
        let removed = self.table.remove_file(file_id);
        if removed > 0 {
            log::debug!("Invalidated {} cached blocks of file {}", removed, file_id);
        }
        removed
    }

    /// Check for a block without counting a hit or miss.
    pub fn contains(&self, key: &BlockKey) -> bool {
        self.table.contains(key)
    }

    /// Get current cache statistics.
    pub fn stats(&self) -> CacheStats {
        self.table.stats()
    }

    /// Run an eviction pass now, on the calling thread.
    ///
    /// Evicts down to the minimum watermark even if the acceptable watermark
    /// has not been reached.
    pub fn run_eviction(&self) -> EvictionReport {
        self.engine.evict()
    }

    /// Clear all entries from the cache.
    pub fn clear(&self) {
        self.table.clear();
    }

    /// Stop the background eviction thread.
    ///
    /// An in-flight pass completes first. Later admissions evict inline.
    pub fn shutdown(&self) {
        self.scheduler.shutdown();
    }

    /// Whether eviction currently runs on the background thread.
    pub fn has_eviction_thread(&self) -> bool {
        self.scheduler.is_background()
    }

    /// The configuration this cache runs with.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Get the current size of cached data in bytes.
    pub fn size(&self) -> u64 {
        self.table.snapshot_occupancy().total
    }

    /// Get the cache capacity in bytes.
    pub fn capacity(&self) -> u64 {
        self.config.capacity_bytes()
    }

    /// Get the number of blocks in the cache.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Check if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for BlockCache {
    fn drop(&mut self) {
        self.shutdown();
    }
}
