//! Cached block representation.

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;

use super::priority;

/// A unique identifier for a cached block.
///
/// Combines the file identifier and block offset to uniquely identify a block
/// across all files served by the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockKey {
    /// File number or path identifier
    pub file_id: u64,
    /// Block offset in the file
    pub offset: u64,
}

impl BlockKey {
    /// Create a new block key
    pub fn new(file_id: u64, offset: u64) -> Self {
        Self { file_id, offset }
    }
}

impl fmt::Display for BlockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.file_id, self.offset)
    }
}

/// Priority class of a cached block.
///
/// Each class has its own share of cache capacity; eviction pressure is
/// applied to classes that exceed their share first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[repr(u8)]
pub enum Priority {
    /// Accessed once since admission.
    Single = 0,
    /// Accessed again after admission.
    Multi = 1,
    /// Pinned at admission (index and metadata blocks).
    Memory = 2,
}

impl Priority {
    /// All priority classes, in counter index order.
    pub const ALL: [Priority; 3] = [Priority::Single, Priority::Multi, Priority::Memory];

    /// Index of this class in per-priority arrays.
    pub fn index(self) -> usize {
        self as usize
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => Priority::Single,
            1 => Priority::Multi,
            _ => Priority::Memory,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Priority::Single => "single",
            Priority::Multi => "multi",
            Priority::Memory => "memory",
        };
        f.write_str(name)
    }
}

/// A block held by the cache, with its access bookkeeping.
///
/// The payload and size never change after admission. Priority and access
/// fields are atomics so lookups can update them under a shared lock.
#[derive(Debug)]
pub struct CachedBlock {
    key: BlockKey,
    data: Bytes,
    size: u64,
    priority: AtomicU8,
    access_count: AtomicU64,
    last_access: AtomicU64,
}

impl CachedBlock {
    /// Creates a block admitted at logical time `seq`.
    ///
    /// Admission counts as the first access.
    pub fn new(key: BlockKey, data: Bytes, size: u64, pinned: bool, seq: u64) -> Self {
        Self {
            key,
            data,
            size,
            priority: AtomicU8::new(priority::classify_on_admit(pinned) as u8),
            access_count: AtomicU64::new(1),
            last_access: AtomicU64::new(seq),
        }
    }

    /// The block's key.
    pub fn key(&self) -> BlockKey {
        self.key
    }

    /// The block payload.
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Accounted size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Current priority class.
    pub fn priority(&self) -> Priority {
        Priority::from_u8(self.priority.load(Ordering::Acquire))
    }

    /// Number of accesses, admission included.
    pub fn access_count(&self) -> u64 {
        self.access_count.load(Ordering::Relaxed)
    }

    /// Logical time of the most recent access.
    pub fn last_access(&self) -> u64 {
        self.last_access.load(Ordering::Relaxed)
    }

    /// Records an access at logical time `seq`.
    ///
    /// Returns `Some((from, to))` if this access promoted the block. Exactly
    /// one caller observes any given promotion.
    pub(crate) fn access(&self, seq: u64) -> Option<(Priority, Priority)> {
        let count = self.access_count.fetch_add(1, Ordering::Relaxed) + 1;
        self.last_access.fetch_max(seq, Ordering::Relaxed);

        let current = self.priority();
        let next = priority::classify_on_access(current, count);
        if next == current {
            return None;
        }
        self.priority
            .compare_exchange(current as u8, next as u8, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| (current, next))
    }
}

/// A caller's reference to a cached block.
///
/// The handle keeps the block alive for as long as the caller holds it, even
/// if the cache evicts or invalidates the entry in the meantime.
#[derive(Debug, Clone)]
pub struct BlockHandle {
    block: Arc<CachedBlock>,
}

impl BlockHandle {
    pub(crate) fn new(block: Arc<CachedBlock>) -> Self {
        Self { block }
    }

    /// The block's key.
    pub fn key(&self) -> BlockKey {
        self.block.key()
    }

    /// The block payload.
    pub fn data(&self) -> &Bytes {
        self.block.data()
    }

    /// A cheap clone of the block payload.
    pub fn bytes(&self) -> Bytes {
        self.block.data().clone()
    }

    /// Accounted size in bytes.
    pub fn size(&self) -> u64 {
        self.block.size()
    }

    /// Priority class at the time of the call.
    pub fn priority(&self) -> Priority {
        self.block.priority()
    }

    /// Number of accesses, admission included.
    pub fn access_count(&self) -> u64 {
        self.block.access_count()
    }
}

impl AsRef<[u8]> for BlockHandle {
    fn as_ref(&self) -> &[u8] {
        self.block.data()
    }
}
