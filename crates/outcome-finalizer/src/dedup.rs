//! Registry of recently seen outcome keys.
//!
//! Outcome notifications arrive at least once per channel and usually once
//! per channel *each*, so the same game-over is reported several times. The
//! registry admits the first report of a key and rejects every repeat within
//! the retention window. Memory is bounded both by age and by a maximum number
//! of remembered keys; the oldest keys are evicted first.

use std::num::NonZeroUsize;
use std::time::Duration;

use lru::LruCache;
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::types::OutcomeKey;

pub struct DedupRegistry {
    /// Key -> time it was first accepted. Keys are never promoted, so the
    /// least recently used entry is always the oldest one.
    seen: Mutex<LruCache<OutcomeKey, Instant>>,
    retention: Duration,
}

impl DedupRegistry {
    pub fn new(capacity: usize, retention: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            seen: Mutex::new(LruCache::new(capacity)),
            retention,
        }
    }

    /// Returns `true` the first time `key` is seen and records it.
    ///
    /// Empty keys are always rejected.
    pub fn accept(&self, key: &OutcomeKey) -> bool {
        if key.is_empty() {
            tracing::debug!("rejecting empty outcome key");
            return false;
        }
        let now = Instant::now();
        let mut seen = self.seen.lock();
        Self::evict_expired(&mut seen, now, self.retention);

        if seen.contains(key) {
            return false;
        }
        if let Some((evicted, _)) = seen.push(key.clone(), now) {
            tracing::debug!(evicted = %evicted, "dedup registry full, evicted oldest key");
        }
        true
    }

    /// Whether `key` is currently remembered.
    pub fn contains(&self, key: &OutcomeKey) -> bool {
        let mut seen = self.seen.lock();
        Self::evict_expired(&mut seen, Instant::now(), self.retention);
        seen.contains(key)
    }

    /// Drop keys older than the retention window. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let mut seen = self.seen.lock();
        Self::evict_expired(&mut seen, Instant::now(), self.retention)
    }

    pub fn len(&self) -> usize {
        self.seen.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn evict_expired(
        seen: &mut LruCache<OutcomeKey, Instant>,
        now: Instant,
        retention: Duration,
    ) -> usize {
        let mut removed = 0;
        while let Some((_, at)) = seen.peek_lru() {
            if now.duration_since(*at) < retention {
                break;
            }
            seen.pop_lru();
            removed += 1;
        }
        removed
    }
}
