//! Priority classification.
//!
//! A block starts as [`Priority::Single`]. The first access after admission
//! promotes it to [`Priority::Multi`]. Blocks pinned at admission are
//! [`Priority::Memory`] for their whole life. No transition ever lowers a
//! block's class, so a scan that touches every block once only churns the
//! single-access class.

use super::block::Priority;

/// Class of a block at admission.
pub fn classify_on_admit(pinned: bool) -> Priority {
    if pinned {
        Priority::Memory
    } else {
        Priority::Single
    }
}

/// Class of a block after an access brought its count to `access_count`.
pub fn classify_on_access(current: Priority, access_count: u64) -> Priority {
    match current {
        Priority::Single if access_count >= 2 => Priority::Multi,
        other => other,
    }
}
