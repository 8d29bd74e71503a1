use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identity of one lease holder (one finalization attempt).
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct OwnerId(pub u64);

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "attempt-{}", self.0)
    }
}

/// Process-local source of unique [`OwnerId`]s.
#[derive(Debug)]
pub struct OwnerIdGenerator {
    next: AtomicU64,
}

impl OwnerIdGenerator {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    pub fn next_id(&self) -> OwnerId {
        OwnerId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for OwnerIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}
