//! Finalization queue.
//!
//! Collects the best known score and jump count of the session being
//! finalized and performs the combined write (best-effort persistence, then
//! one ledger transaction) exactly once per flush. The queue is reset after
//! every flush, whatever its result.

use parking_lot::Mutex;
use tracing::instrument;

use crate::config::JumpEstimatePolicy;
use crate::error::FinalizeError;
use crate::ledger::{LedgerClient, LedgerReceipt};
use crate::persistence::ScoreStore;
use crate::types::{SessionId, WalletAddress};

/// Pending values of the session being finalized.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueState {
    pub session_id: Option<SessionId>,
    pub score: u64,
    pub jumps: u64,
    pub processing: bool,
}

/// Result of [`FinalizationQueue::flush`].
#[derive(Debug)]
pub enum FlushOutcome {
    /// Another flush is in progress; nothing was done.
    Busy,
    /// Nothing was merged since the last flush.
    Empty,
    /// The effective jump count was zero, so no ledger write was made.
    NothingToSubmit { score_persisted: bool },
    /// The ledger write was confirmed.
    Submitted {
        receipt: LedgerReceipt,
        effective_jumps: u64,
        score_persisted: bool,
    },
    /// Submission or confirmation failed. Not retried.
    LedgerFailed {
        error: FinalizeError,
        effective_jumps: u64,
        score_persisted: bool,
    },
}

impl FlushOutcome {
    /// Whether the flush completed without an unrecoverable error.
    /// A failed best-effort persistence write alone does not count.
    pub fn succeeded(&self) -> bool {
        matches!(self, Self::NothingToSubmit { .. } | Self::Submitted { .. })
    }
}

pub struct FinalizationQueue {
    state: Mutex<QueueState>,
    policy: JumpEstimatePolicy,
}

/// Resets the queue when dropped, so a flush that errors, panics, or is
/// cancelled mid-await still leaves the queue usable.
struct ResetOnDrop<'a> {
    state: &'a Mutex<QueueState>,
}

impl Drop for ResetOnDrop<'_> {
    fn drop(&mut self) {
        *self.state.lock() = QueueState::default();
    }
}

impl FinalizationQueue {
    pub fn new(policy: JumpEstimatePolicy) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            policy,
        }
    }

    /// Merge reported values, keeping the maximum of each field independently.
    ///
    /// Merging a different session replaces pending values of the previous
    /// one. Returns `false` (and changes nothing) while a flush is running.
    pub fn merge(&self, session_id: &SessionId, score: u64, jumps: u64) -> bool {
        let mut state = self.state.lock();
        if state.processing {
            tracing::debug!(session_id = %session_id, "queue is flushing, merge ignored");
            return false;
        }
        if state.session_id.as_ref() == Some(session_id) {
            state.score = state.score.max(score);
            state.jumps = state.jumps.max(jumps);
        } else {
            if let Some(previous) = state.session_id.take() {
                tracing::warn!(
                    previous = %previous,
                    session_id = %session_id,
                    "replacing unflushed queue state of another session"
                );
            }
            state.session_id = Some(session_id.clone());
            state.score = score;
            state.jumps = jumps;
        }
        true
    }

    /// Snapshot of the pending state.
    pub fn state(&self) -> QueueState {
        self.state.lock().clone()
    }

    pub fn is_processing(&self) -> bool {
        self.state.lock().processing
    }

    /// Jump count that would be submitted for the given tracked values.
    pub fn effective_jumps(&self, score: u64, jumps: u64) -> u64 {
        self.policy.effective_jumps(score, jumps)
    }

    /// Write the pending outcome: best-effort persistence, then at most one
    /// ledger transaction.
    #[instrument(skip_all, fields(address = %address))]
    pub async fn flush(
        &self,
        store: &dyn ScoreStore,
        ledger: &dyn LedgerClient,
        address: &WalletAddress,
    ) -> FlushOutcome {
        let (session_id, score, jumps) = {
            let mut state = self.state.lock();
            if state.processing {
                return FlushOutcome::Busy;
            }
            let Some(session_id) = state.session_id.clone() else {
                return FlushOutcome::Empty;
            };
            state.processing = true;
            (session_id, state.score, state.jumps)
        };
        let _reset = ResetOnDrop { state: &self.state };

        let score_persisted = match store.persist_score(address, score, &session_id).await {
            Ok(write) => {
                tracing::debug!(session_id = %session_id, score, ?write, "score persisted");
                true
            }
            Err(e) => {
                tracing::warn!(session_id = %session_id, score, error = %e, "failed to persist score");
                false
            }
        };

        let effective_jumps = self.policy.effective_jumps(score, jumps);
        if effective_jumps != jumps {
            tracing::info!(
                session_id = %session_id,
                score,
                tracked_jumps = jumps,
                effective_jumps,
                "tracked jumps implausibly low, using score-based estimate"
            );
        }
        if effective_jumps == 0 {
            tracing::debug!(session_id = %session_id, "no jumps to submit");
            return FlushOutcome::NothingToSubmit { score_persisted };
        }

        if let Err(e) = store.persist_jumps(address, effective_jumps).await {
            tracing::warn!(session_id = %session_id, effective_jumps, error = %e, "failed to persist jumps");
        }

        let tx = match ledger.submit_ledger_write(address, effective_jumps).await {
            Ok(tx) => tx,
            Err(error) => {
                tracing::error!(session_id = %session_id, effective_jumps, error = %error, "ledger submission failed");
                return FlushOutcome::LedgerFailed {
                    error,
                    effective_jumps,
                    score_persisted,
                };
            }
        };
        tracing::info!(session_id = %session_id, tx = %tx, effective_jumps, "ledger write submitted");

        match ledger.await_confirmation(&tx).await {
            Ok(receipt) => {
                tracing::info!(session_id = %session_id, tx = %tx, block = ?receipt.block, "ledger write confirmed");
                FlushOutcome::Submitted {
                    receipt,
                    effective_jumps,
                    score_persisted,
                }
            }
            Err(error) => {
                tracing::error!(session_id = %session_id, tx = %tx, error = %error, "ledger confirmation failed");
                FlushOutcome::LedgerFailed {
                    error,
                    effective_jumps,
                    score_persisted,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory_ledger::MemoryLedger;
    use crate::storage::memory_score::MemoryScoreStore;
    use std::sync::Arc;
    use std::time::Duration;

    fn sid(s: &str) -> SessionId {
        SessionId::normalize(s, &[]).unwrap()
    }

    fn wallet() -> WalletAddress {
        WalletAddress::new("GPLAYER")
    }

    fn queue() -> FinalizationQueue {
        FinalizationQueue::new(JumpEstimatePolicy::default())
    }

    #[test]
    fn merge_is_monotonic_per_field() {
        let q = queue();
        q.merge(&sid("run-1"), 50, 3);
        q.merge(&sid("run-1"), 30, 10);
        let state = q.state();
        assert_eq!(state.session_id, Some(sid("run-1")));
        assert_eq!(state.score, 50);
        assert_eq!(state.jumps, 10);
        assert!(!state.processing);
    }

    #[test]
    fn merge_of_other_session_replaces_state() {
        let q = queue();
        q.merge(&sid("run-1"), 500, 30);
        q.merge(&sid("run-2"), 20, 2);
        let state = q.state();
        assert_eq!(state.session_id, Some(sid("run-2")));
        assert_eq!(state.score, 20);
        assert_eq!(state.jumps, 2);
    }

    #[tokio::test]
    async fn flush_submits_one_write_and_resets() {
        let q = queue();
        let store = MemoryScoreStore::new();
        let ledger = MemoryLedger::new();
        q.merge(&sid("run-1"), 120, 8);

        let outcome = q.flush(&store, &ledger, &wallet()).await;
        assert!(outcome.succeeded());
        match outcome {
            FlushOutcome::Submitted {
                receipt,
                effective_jumps,
                score_persisted,
            } => {
                assert_eq!(effective_jumps, 8);
                assert_eq!(receipt.jump_count, 8);
                assert!(score_persisted);
            }
            other => panic!("expected submission, got {other:?}"),
        }
        assert_eq!(ledger.submissions(), vec![(wallet(), 8)]);
        assert_eq!(store.best_score(&sid("run-1")), Some(120));
        assert_eq!(store.total_jumps(&wallet()), 8);
        assert_eq!(q.state(), QueueState::default());
    }

    #[tokio::test]
    async fn flush_uses_score_estimate_for_lost_jumps() {
        let q = queue();
        let store = MemoryScoreStore::new();
        let ledger = MemoryLedger::new();
        q.merge(&sid("run-1"), 300, 2);

        let outcome = q.flush(&store, &ledger, &wallet()).await;
        assert!(matches!(
            outcome,
            FlushOutcome::Submitted {
                effective_jumps: 20,
                ..
            }
        ));
        assert_eq!(ledger.submissions(), vec![(wallet(), 20)]);
    }

    #[tokio::test]
    async fn flush_with_zero_jumps_skips_ledger() {
        let q = queue();
        let store = MemoryScoreStore::new();
        let ledger = MemoryLedger::new();
        q.merge(&sid("run-1"), 40, 0);

        let outcome = q.flush(&store, &ledger, &wallet()).await;
        assert!(matches!(
            outcome,
            FlushOutcome::NothingToSubmit {
                score_persisted: true
            }
        ));
        assert!(ledger.submissions().is_empty());
        assert_eq!(store.best_score(&sid("run-1")), Some(40));
    }

    #[tokio::test]
    async fn flush_of_empty_queue_does_nothing() {
        let q = queue();
        let store = MemoryScoreStore::new();
        let ledger = MemoryLedger::new();
        let outcome = q.flush(&store, &ledger, &wallet()).await;
        assert!(matches!(outcome, FlushOutcome::Empty));
        assert!(!outcome.succeeded());
        assert_eq!(store.score_writes(), 0);
    }

    #[tokio::test]
    async fn persistence_failure_does_not_fail_flush() {
        let q = queue();
        let store = MemoryScoreStore::new();
        store.fail_next_writes(2);
        let ledger = MemoryLedger::new();
        q.merge(&sid("run-1"), 90, 9);

        let outcome = q.flush(&store, &ledger, &wallet()).await;
        assert!(outcome.succeeded());
        assert!(matches!(
            outcome,
            FlushOutcome::Submitted {
                score_persisted: false,
                ..
            }
        ));
        assert_eq!(ledger.submissions().len(), 1);
    }

    #[tokio::test]
    async fn ledger_failure_resets_queue() {
        let q = queue();
        let store = MemoryScoreStore::new();
        let ledger = MemoryLedger::new();
        ledger.fail_next_submissions(1);
        q.merge(&sid("run-1"), 90, 9);

        let outcome = q.flush(&store, &ledger, &wallet()).await;
        assert!(!outcome.succeeded());
        assert!(matches!(outcome, FlushOutcome::LedgerFailed { .. }));
        assert_eq!(q.state(), QueueState::default());
        // Persistence still happened before the ledger write.
        assert_eq!(store.best_score(&sid("run-1")), Some(90));
    }

    #[tokio::test]
    async fn confirmation_failure_is_reported() {
        let q = queue();
        let store = MemoryScoreStore::new();
        let ledger = MemoryLedger::new();
        ledger.fail_next_confirmations(1);
        q.merge(&sid("run-1"), 90, 9);

        let outcome = q.flush(&store, &ledger, &wallet()).await;
        match outcome {
            FlushOutcome::LedgerFailed { error, .. } => {
                assert!(matches!(error, FinalizeError::ConfirmationFailed { .. }))
            }
            other => panic!("expected ledger failure, got {other:?}"),
        }
        assert_eq!(ledger.submissions().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_flush_returns_busy() {
        let q = Arc::new(queue());
        let store = Arc::new(MemoryScoreStore::new());
        let ledger = Arc::new(MemoryLedger::new());
        let gate = ledger.hold_confirmations();
        q.merge(&sid("run-1"), 90, 9);

        let first = {
            let (q, store, ledger) = (q.clone(), store.clone(), ledger.clone());
            tokio::spawn(async move { q.flush(&*store, &*ledger, &wallet()).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(q.is_processing());
        assert!(!q.merge(&sid("run-1"), 1_000, 99));

        let second = q.flush(&*store, &*ledger, &wallet()).await;
        assert!(matches!(second, FlushOutcome::Busy));

        gate.open();
        let first = first.await.unwrap();
        assert!(first.succeeded());
        assert_eq!(ledger.submissions().len(), 1);
        assert!(!q.is_processing());
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_flush_does_not_leave_queue_stuck() {
        let q = Arc::new(queue());
        let store = Arc::new(MemoryScoreStore::new());
        let ledger = Arc::new(MemoryLedger::new());
        let _gate = ledger.hold_confirmations();
        q.merge(&sid("run-1"), 90, 9);

        let pending = {
            let (q, store, ledger) = (q.clone(), store.clone(), ledger.clone());
            tokio::spawn(async move { q.flush(&*store, &*ledger, &wallet()).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(q.is_processing());

        pending.abort();
        let _ = pending.await;
        assert_eq!(q.state(), QueueState::default());
    }
}
