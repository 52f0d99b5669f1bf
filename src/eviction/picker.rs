//! Victim selection for an eviction pass.
//!
//! Given the current occupancy and the live blocks, decides which blocks to
//! evict so occupancy falls to the minimum watermark.
//!
//! ## Policy
//!
//! Each priority class has a target of `factor * capacity` bytes; whatever
//! it holds beyond that is its overflow.
//!
//! - If the classes' combined overflow covers the bytes that must be freed,
//!   each overflowing class gives up a quota proportional to its share of the
//!   overflow, least recently used blocks first. A class stops once its quota
//!   is met or it is back at its target. Classes at or under target are not
//!   touched.
//! - Otherwise the classes are ignored and blocks are taken in global least
//!   recently used order until enough bytes are freed.

use crate::cache::{EvictionCandidate, Priority};
use crate::config::CacheConfig;

/// How victims were chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionMode {
    /// Per-class quotas proportional to each class's overflow.
    Proportional,
    /// Least recently used across all classes.
    GlobalLru,
}

/// Victims chosen for one eviction pass.
#[derive(Debug, Clone)]
pub struct EvictionPlan {
    /// How the victims were chosen
    pub mode: SelectionMode,
    /// Bytes that must be freed to reach the minimum watermark
    pub bytes_to_free: u64,
    /// Blocks to evict, in eviction order
    pub victims: Vec<EvictionCandidate>,
}

impl EvictionPlan {
    /// Sum of the victims' sizes.
    pub fn planned_bytes(&self) -> u64 {
        self.victims.iter().map(|v| v.size).sum()
    }
}

/// Bytes held per priority class by `candidates`.
pub fn class_bytes(candidates: &[EvictionCandidate]) -> [u64; 3] {
    let mut bytes = [0u64; 3];
    for c in candidates {
        bytes[c.priority.index()] += c.size;
    }
    bytes
}

/// Choose victims so that `occupied` falls to the configured minimum.
///
/// Returns `None` if occupancy is already at or under the minimum watermark.
pub fn select_victims(
    config: &CacheConfig,
    occupied: u64,
    candidates: Vec<EvictionCandidate>,
) -> Option<EvictionPlan> {
    let min_bytes = config.min_bytes();
    if occupied <= min_bytes {
        return None;
    }
    let bytes_to_free = occupied - min_bytes;

    let held = class_bytes(&candidates);
    let targets = Priority::ALL.map(|p| config.target_bytes(p));
    let overflow: [u64; 3] = std::array::from_fn(|i| held[i].saturating_sub(targets[i]));
    let total_overflow: u64 = overflow.iter().sum();

    let plan = if total_overflow > 0 && total_overflow >= bytes_to_free {
        let victims = proportional(candidates, bytes_to_free, &held, &targets, &overflow, total_overflow);
        EvictionPlan { mode: SelectionMode::Proportional, bytes_to_free, victims }
    } else {
        let victims = global_lru(candidates, bytes_to_free);
        EvictionPlan { mode: SelectionMode::GlobalLru, bytes_to_free, victims }
    };

    Some(plan)
}

fn proportional(
    candidates: Vec<EvictionCandidate>,
    bytes_to_free: u64,
    held: &[u64; 3],
    targets: &[u64; 3],
    overflow: &[u64; 3],
    total_overflow: u64,
) -> Vec<EvictionCandidate> {
    let mut buckets: [Vec<EvictionCandidate>; 3] = Default::default();
    for c in candidates {
        if overflow[c.priority.index()] > 0 {
            buckets[c.priority.index()].push(c);
        }
    }

    let mut victims = Vec::new();
    for (i, mut bucket) in buckets.into_iter().enumerate() {
        if overflow[i] == 0 {
            continue;
        }
        let quota = quota(bytes_to_free, overflow[i], total_overflow);
        bucket.sort_by_key(|c| c.last_access);

        let mut freed = 0u64;
        let mut remaining = held[i];
        for c in bucket {
            if freed >= quota || remaining <= targets[i] {
                break;
            }
            freed += c.size;
            remaining -= c.size;
            victims.push(c);
        }
    }
    victims
}

fn global_lru(mut candidates: Vec<EvictionCandidate>, bytes_to_free: u64) -> Vec<EvictionCandidate> {
    candidates.sort_by_key(|c| c.last_access);

    let mut freed = 0u64;
    let mut victims = Vec::new();
    for c in candidates {
        if freed >= bytes_to_free {
            break;
        }
        freed += c.size;
        victims.push(c);
    }
    victims
}

/// `ceil(bytes_to_free * overflow / total_overflow)`, computed without overflow.
fn quota(bytes_to_free: u64, overflow: u64, total_overflow: u64) -> u64 {
    let num = u128::from(bytes_to_free) * u128::from(overflow);
    num.div_ceil(u128::from(total_overflow)) as u64
}
