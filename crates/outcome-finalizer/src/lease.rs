//! Single global lease serializing ledger writes.
//!
//! A ledger write waits on an external approval step that may never complete,
//! so the lease has a bounded lifetime: once its TTL has elapsed without an
//! explicit release, the next `try_acquire` reclaims it. An optional timer
//! (`ttl_release`) frees the lease proactively.
//!
//! ```text
//! FREE --try_acquire--> HELD --release / ttl expiry--> FREE
//! ```

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::types::OwnerId;

/// Observable lease state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseState {
    Free,
    Held,
}

/// Point-in-time view of the lease.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    pub held: bool,
    pub owner_id: Option<OwnerId>,
    pub acquired_at: Option<Instant>,
    pub ttl: Duration,
}

/// Result of an acquisition attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquire {
    /// The lease was free (or already held by the same owner).
    Acquired,
    /// The lease was held by another owner whose TTL had elapsed.
    Reclaimed { previous: OwnerId },
    /// The lease is held by another owner and still valid.
    Contended { holder: OwnerId },
}

impl Acquire {
    pub fn is_acquired(&self) -> bool {
        !matches!(self, Self::Contended { .. })
    }
}

pub struct LeaseLock {
    inner: Arc<Mutex<Inner>>,
    ttl: Duration,
}

#[derive(Default)]
struct Inner {
    held: Option<Held>,
    /// Bumped on every acquisition so a stale timer cannot free a newer lease.
    generation: u64,
}

struct Held {
    owner: OwnerId,
    acquired_at: Instant,
    generation: u64,
    timer: Option<CancellationToken>,
}

impl Held {
    fn expired(&self, now: Instant, ttl: Duration) -> bool {
        now.duration_since(self.acquired_at) >= ttl
    }

    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.cancel();
        }
    }
}

impl LeaseLock {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Try to take the lease for `owner`.
    pub fn try_acquire(&self, owner: OwnerId) -> bool {
        self.acquire(owner).is_acquired()
    }

    /// Try to take the lease, reporting how it was obtained.
    pub fn acquire(&self, owner: OwnerId) -> Acquire {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        let mut result = Acquire::Acquired;

        if let Some(held) = inner.held.as_mut() {
            if held.owner == owner {
                return Acquire::Acquired;
            }
            if !held.expired(now, self.ttl) {
                return Acquire::Contended { holder: held.owner };
            }
            tracing::warn!(
                previous = %held.owner,
                owner = %owner,
                held_for_ms = now.duration_since(held.acquired_at).as_millis() as u64,
                "reclaiming expired lease"
            );
            held.cancel_timer();
            result = Acquire::Reclaimed {
                previous: held.owner,
            };
        }

        inner.generation += 1;
        let generation = inner.generation;
        inner.held = Some(Held {
            owner,
            acquired_at: now,
            generation,
            timer: None,
        });
        result
    }

    /// Release the lease if `owner` holds it. Returns whether it was released.
    ///
    /// Idempotent: releasing a lease that already expired or was auto-released
    /// is a no-op.
    pub fn release(&self, owner: OwnerId) -> bool {
        let mut inner = self.inner.lock();
        match inner.held.as_mut() {
            Some(held) if held.owner == owner => {
                held.cancel_timer();
                inner.held = None;
                true
            }
            _ => false,
        }
    }

    /// Schedule automatic release of `owner`'s lease after `timeout`.
    ///
    /// Replaces any timer already scheduled for the lease. The timer is
    /// cancelled by `release` and never frees a lease acquired later.
    /// Returns `false` if `owner` does not hold the lease.
    ///
    /// Must be called from within a tokio runtime.
    pub fn ttl_release(&self, owner: OwnerId, timeout: Duration) -> bool {
        let token = CancellationToken::new();
        let generation = {
            let mut inner = self.inner.lock();
            let Some(held) = inner.held.as_mut().filter(|h| h.owner == owner) else {
                return false;
            };
            held.cancel_timer();
            held.timer = Some(token.clone());
            held.generation
        };

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(timeout) => {
                    let mut inner = inner.lock();
                    let stale = inner
                        .held
                        .as_ref()
                        .is_some_and(|h| h.generation == generation && h.owner == owner);
                    if stale {
                        inner.held = None;
                        tracing::warn!(
                            owner = %owner,
                            timeout_ms = timeout.as_millis() as u64,
                            "lease auto-released after timeout"
                        );
                    }
                }
            }
        });
        true
    }

    pub fn snapshot(&self) -> Lease {
        let now = Instant::now();
        let inner = self.inner.lock();
        match inner.held.as_ref().filter(|h| !h.expired(now, self.ttl)) {
            Some(held) => Lease {
                held: true,
                owner_id: Some(held.owner),
                acquired_at: Some(held.acquired_at),
                ttl: self.ttl,
            },
            None => Lease {
                held: false,
                owner_id: None,
                acquired_at: None,
                ttl: self.ttl,
            },
        }
    }

    pub fn state(&self) -> LeaseState {
        if self.snapshot().held {
            LeaseState::Held
        } else {
            LeaseState::Free
        }
    }

    /// Current valid holder, if any.
    pub fn holder(&self) -> Option<OwnerId> {
        self.snapshot().owner_id
    }
}

impl Drop for LeaseLock {
    fn drop(&mut self) {
        if let Some(held) = self.inner.lock().held.as_mut() {
            held.cancel_timer();
        }
    }
}
