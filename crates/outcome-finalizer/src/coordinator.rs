//! Outcome router.
//!
//! [`FinalizationCoordinator`] is the one entry point every notification
//! channel reports to. It owns the dedup registry, session tracker, lease and
//! finalization queue, and decides per outcome whether to ignore it, persist
//! it only, or persist it and write it to the ledger.
//!
//! ```text
//! outcome --> terminal? --> duplicate? --> pre-revive? --> persist score
//!                                                              |
//!                       PersistedOnly <-- lease contended <----+
//!                                                              |
//!                 merge + flush (bounded by lease ttl) <-------+
//!                                |
//!                 mark terminal, release lease
//! ```

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use serde_json::Value;
use tracing::instrument;

use crate::config::CoordinatorConfig;
use crate::dedup::DedupRegistry;
use crate::error::FinalizeError;
use crate::lease::{Acquire, Lease, LeaseLock};
use crate::ledger::{LedgerClient, LedgerReceipt};
use crate::metrics::FinalizerMetrics;
use crate::outcome::{OutcomeEvent, OutcomeKind, OutcomeSource};
use crate::persistence::ScoreStore;
use crate::queue::{FinalizationQueue, FlushOutcome, QueueState};
use crate::revive::{ReviveNotification, ReviveVerdict};
use crate::session::{GameSession, SessionTracker};
use crate::types::{OutcomeKey, OwnerIdGenerator, SessionId, WalletAddress};

/// Why an outcome was ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Missing session id or unparseable payload.
    Malformed,
    /// No wallet is connected, so nothing can be recorded.
    NoWallet,
    /// The session was already finalized.
    Terminal,
    /// The same outcome was already accepted through another channel.
    Duplicate,
    /// The game-over a revive was purchased on.
    PreRevive,
}

/// Why an accepted outcome produced no confirmed ledger write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistedOnlyReason {
    /// Another attempt holds the lease.
    LockContended,
    /// The effective jump count was zero.
    NothingToSubmit,
    /// Submission or confirmation failed.
    LedgerFailed,
    /// The ledger write did not complete within the lease ttl.
    LedgerTimedOut,
    /// A previous flush was still running.
    QueueBusy,
    /// The session was finalized by another attempt after this outcome was
    /// accepted.
    AlreadyFinalized,
}

/// Outcome of [`FinalizationCoordinator::handle_outcome`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessingResult {
    Skipped(SkipReason),
    PersistedOnly(PersistedOnlyReason),
    PersistedAndSubmitted { receipt: LedgerReceipt },
}

impl ProcessingResult {
    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped(_))
    }

    pub fn is_persisted_only(&self) -> bool {
        matches!(self, Self::PersistedOnly(_))
    }

    pub fn is_submitted(&self) -> bool {
        matches!(self, Self::PersistedAndSubmitted { .. })
    }
}

/// Process-wide finalization service.
///
/// Constructed once and shared (`Arc`) with every notification adapter. All
/// coordination state is private; the ledger is only reachable through
/// [`handle_outcome`](Self::handle_outcome).
pub struct FinalizationCoordinator {
    config: CoordinatorConfig,
    dedup: DedupRegistry,
    sessions: SessionTracker,
    lease: LeaseLock,
    queue: FinalizationQueue,
    owners: OwnerIdGenerator,
    store: Arc<dyn ScoreStore>,
    ledger: Arc<dyn LedgerClient>,
    wallet: ArcSwapOption<WalletAddress>,
    metrics: Arc<FinalizerMetrics>,
}

impl FinalizationCoordinator {
    pub fn new(
        config: CoordinatorConfig,
        store: Arc<dyn ScoreStore>,
        ledger: Arc<dyn LedgerClient>,
        metrics: Arc<FinalizerMetrics>,
    ) -> Result<Self, FinalizeError> {
        config.validate()?;
        Ok(Self {
            dedup: DedupRegistry::new(config.dedup_capacity, config.dedup_retention),
            sessions: SessionTracker::new(),
            lease: LeaseLock::new(config.lease_ttl),
            queue: FinalizationQueue::new(config.jump_estimate),
            owners: OwnerIdGenerator::new(),
            store,
            ledger,
            wallet: ArcSwapOption::empty(),
            metrics,
            config,
        })
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn metrics(&self) -> &FinalizerMetrics {
        &self.metrics
    }

    /// Connect or disconnect the player wallet.
    pub fn set_wallet(&self, wallet: Option<WalletAddress>) {
        tracing::debug!(wallet = ?wallet, "wallet changed");
        self.wallet.store(wallet.map(Arc::new));
    }

    pub fn wallet(&self) -> Option<Arc<WalletAddress>> {
        self.wallet.load_full()
    }

    pub fn normalize(&self, raw_session_id: &str) -> Option<SessionId> {
        SessionId::normalize(raw_session_id, &self.config.session_suffix_delimiters)
    }

    /// Record the start of a play attempt.
    pub fn begin_session(&self, raw_session_id: &str) -> Option<SessionId> {
        let session_id = self.normalize(raw_session_id)?;
        self.sessions.begin_session(&session_id);
        tracing::debug!(session_id = %session_id, "session started");
        Some(session_id)
    }

    pub fn session(&self, raw_session_id: &str) -> Option<GameSession> {
        self.normalize(raw_session_id)
            .and_then(|id| self.sessions.session(&id))
    }

    pub fn is_terminal(&self, raw_session_id: &str) -> bool {
        self.normalize(raw_session_id)
            .is_some_and(|id| self.sessions.is_terminal(&id))
    }

    /// Close a session without finalizing it, e.g. when the player leaves.
    /// Every later outcome for it is skipped.
    pub fn mark_terminal(&self, raw_session_id: &str) -> bool {
        let Some(session_id) = self.normalize(raw_session_id) else {
            return false;
        };
        self.mark_session_terminal(&session_id)
    }

    pub fn lease(&self) -> Lease {
        self.lease.snapshot()
    }

    pub fn queue_state(&self) -> QueueState {
        self.queue.state()
    }

    /// Apply a revive purchase. Returns `false` if the notification is
    /// malformed or the session is already terminal.
    pub fn handle_revive(&self, notification: &ReviveNotification) -> bool {
        let Some(session_id) = self.normalize(&notification.session_id) else {
            tracing::warn!(raw = %notification.session_id, "revive notification without session id");
            return false;
        };
        if self.sessions.is_terminal(&session_id) {
            tracing::warn!(session_id = %session_id, "revive for an already finalized session ignored");
            return false;
        }
        let epoch = self.sessions.set_revived(
            &session_id,
            notification.prior_jumps,
            notification.prior_score,
        );
        tracing::info!(
            session_id = %session_id,
            epoch,
            prior_jumps = notification.prior_jumps,
            prior_score = ?notification.prior_score,
            "session revived, deferring finalization"
        );
        true
    }

    /// Route an untyped notification payload.
    pub async fn handle_raw(&self, payload: &Value, source: OutcomeSource) -> ProcessingResult {
        match OutcomeEvent::from_value(payload, source) {
            Ok(event) => self.handle_outcome(&event).await,
            Err(e) => {
                tracing::warn!(source = %source, error = %e, "rejecting malformed outcome");
                self.skip(SkipReason::Malformed)
            }
        }
    }

    /// Route one outcome notification.
    #[instrument(skip_all, fields(session_id = %event.session_id, source = %event.source, kind = ?event.kind))]
    pub async fn handle_outcome(&self, event: &OutcomeEvent) -> ProcessingResult {
        let Some(session_id) = self.normalize(&event.session_id) else {
            tracing::warn!("outcome without session id");
            return self.skip(SkipReason::Malformed);
        };
        if self.sessions.is_terminal(&session_id) {
            tracing::debug!("session already terminal");
            return self.skip(SkipReason::Terminal);
        }
        let Some(wallet) = self.wallet.load_full() else {
            tracing::warn!("no wallet connected, outcome not recorded");
            return self.skip(SkipReason::NoWallet);
        };

        let verdict = self.sessions.classify_revive(&session_id, event);
        let key = match event.kind {
            OutcomeKind::Normal => OutcomeKey::for_outcome(&session_id, event.score, verdict.epoch()),
            OutcomeKind::ReviveCancel => OutcomeKey::for_revive_cancel(&session_id, verdict.epoch()),
        };
        if !self.dedup.accept(&key) {
            tracing::debug!(key = %key, "duplicate outcome");
            return self.skip(SkipReason::Duplicate);
        }

        let (score, jumps) = match verdict {
            ReviveVerdict::PreRevive { .. } => {
                tracing::info!(score = event.score, jumps = event.jumps, "pre-revive outcome deferred");
                return self.skip(SkipReason::PreRevive);
            }
            ReviveVerdict::Authoritative(snapshot) => (
                snapshot.floor_score(event.score),
                snapshot.floor_jumps(event.jumps),
            ),
            ReviveVerdict::NotRevived => (event.score, event.jumps),
        };
        self.sessions.observe(&session_id, score, jumps);

        // Never gated by the lease: losing a score to contention is worse
        // than writing it twice.
        if let Err(e) = self.store.persist_score(&wallet, score, &session_id).await {
            self.metrics.persistence_failures.inc();
            tracing::warn!(score, error = %e, "best-effort score persistence failed");
        }

        let owner = self.owners.next_id();
        match self.lease.acquire(owner) {
            Acquire::Contended { holder } => {
                tracing::debug!(owner = %owner, holder = %holder, "lease held, outcome persisted only");
                return self.persisted_only(PersistedOnlyReason::LockContended);
            }
            Acquire::Reclaimed { previous } => {
                self.metrics.lease_reclaims.inc();
                tracing::warn!(owner = %owner, previous = %previous, "took over expired lease");
            }
            Acquire::Acquired => {}
        }
        // Another attempt may have finalized the session while the score was
        // being persisted.
        if self.sessions.is_terminal(&session_id) {
            self.lease.release(owner);
            tracing::debug!("session finalized while waiting for the lease");
            return self.persisted_only(PersistedOnlyReason::AlreadyFinalized);
        }
        let ttl = self.lease.ttl();
        self.lease.ttl_release(owner, ttl);

        self.queue.merge(&session_id, score, jumps);
        let flushed = tokio::time::timeout(
            ttl,
            self.queue
                .flush(self.store.as_ref(), self.ledger.as_ref(), &wallet),
        )
        .await;

        let result = match flushed {
            Ok(FlushOutcome::Submitted {
                receipt,
                score_persisted,
                ..
            }) => {
                self.note_flush_persistence(score_persisted);
                self.metrics.submitted.inc();
                ProcessingResult::PersistedAndSubmitted { receipt }
            }
            Ok(FlushOutcome::NothingToSubmit { score_persisted }) => {
                self.note_flush_persistence(score_persisted);
                self.persisted_only(PersistedOnlyReason::NothingToSubmit)
            }
            Ok(FlushOutcome::LedgerFailed {
                error,
                score_persisted,
                ..
            }) => {
                self.note_flush_persistence(score_persisted);
                self.metrics.ledger_failures.inc();
                tracing::error!(error = %error, "ledger write failed, not retrying");
                self.persisted_only(PersistedOnlyReason::LedgerFailed)
            }
            Ok(FlushOutcome::Busy | FlushOutcome::Empty) => {
                // Not finalized: leave the session open for a later outcome.
                self.lease.release(owner);
                tracing::warn!("finalization queue busy, outcome persisted only");
                return self.persisted_only(PersistedOnlyReason::QueueBusy);
            }
            Err(_) => {
                self.metrics.ledger_failures.inc();
                tracing::error!(
                    timeout_ms = ttl.as_millis() as u64,
                    "ledger write did not complete within the lease ttl, giving up waiting"
                );
                self.persisted_only(PersistedOnlyReason::LedgerTimedOut)
            }
        };

        self.mark_session_terminal(&session_id);
        self.lease.release(owner);
        result
    }

    fn mark_session_terminal(&self, session_id: &SessionId) -> bool {
        let marked = self.sessions.mark_terminal(session_id);
        if marked {
            self.metrics.terminal_sessions.inc();
            tracing::debug!(session_id = %session_id, "session marked terminal");
        }
        marked
    }

    fn note_flush_persistence(&self, score_persisted: bool) {
        if !score_persisted {
            self.metrics.persistence_failures.inc();
        }
    }

    fn skip(&self, reason: SkipReason) -> ProcessingResult {
        self.metrics.skipped.inc();
        ProcessingResult::Skipped(reason)
    }

    fn persisted_only(&self, reason: PersistedOnlyReason) -> ProcessingResult {
        self.metrics.persisted_only.inc();
        ProcessingResult::PersistedOnly(reason)
    }
}
