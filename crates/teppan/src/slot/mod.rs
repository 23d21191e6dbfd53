//! # Slots
//!
//! A slot is one of `N` fixed concurrency units. At most one sequence is bound
//! to a slot at a time, and the slot id doubles as the sequence id the backend
//! uses to keep per-sequence key/value cache entries apart.

mod pool;

use std::fmt;

pub use pool::SlotPool;

/// Identifier of one slot in a [`SlotPool`], always in `0..capacity`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlotId(pub(crate) usize);

impl SlotId {
    /// Zero-based index of this slot.
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
