//! # blockcache - A Priority-Segmented LRU Block Cache
//!
//! blockcache caches immutable data blocks read from on-disk files so that
//! repeated reads of hot data skip storage I/O. It is meant to sit between a
//! tablet server's read path and its block-oriented file readers.
//!
//! ## Architecture
//!
//! The cache consists of several key components:
//!
//! - **CacheConfig**: Validated, immutable sizing and eviction parameters
//! - **ConcurrentBlockTable**: Sharded key to block store with byte accounting
//! - **Priority classes**: Single-access, multi-access and pinned (memory) blocks
//! - **EvictionEngine**: Watermark-triggered, per-class proportional eviction
//! - **EvictionScheduler**: Runs eviction inline or on a background thread
//!
//! ## Eviction
//!
//! Once occupancy reaches `acceptable.factor * capacity`, an eviction pass
//! frees blocks until occupancy is at most `min.factor * capacity`. Classes
//! that exceed their share of capacity give up blocks first, so a large scan
//! of single-access blocks does not push out index blocks or hot data.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use blockcache::{BlockCache, BlockKey, CacheConfig, CacheProperties};
//! use bytes::Bytes;
//!
//! # fn read_block_from_disk(_: &BlockKey) -> Bytes { Bytes::new() }
//! # fn main() -> Result<(), blockcache::Error> {
//! let props = CacheProperties::new().acceptable_factor(0.9).min_factor(0.8);
//! let cache = BlockCache::new(CacheConfig::new(256 * 1024 * 1024, props)?)?;
//!
//! let key = BlockKey::new(12, 65536);
//! let block = match cache.lookup(&key) {
//!     Some(handle) => handle.bytes(),
//!     None => {
//!         let data = read_block_from_disk(&key);
//!         cache.admit(key, data.clone(), None, false);
//!         data
//!     }
//! };
//! # let _ = block;
//!
//! println!("{}", cache.stats());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

// Module declarations
pub mod cache;
pub mod config;
pub mod error;
pub mod eviction;

// Re-exports
pub use cache::{
    AdmitOutcome, BlockCache, BlockHandle, BlockKey, CacheStats, ConcurrentBlockTable, Occupancy,
    Priority, PutOutcome, RejectReason,
};
pub use config::{CacheConfig, CacheProperties};
pub use error::{Error, Result};
pub use eviction::{EvictionEngine, EvictionReport, EvictionScheduler, SelectionMode};
