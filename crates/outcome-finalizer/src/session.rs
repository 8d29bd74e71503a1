//! Per-session bookkeeping and the terminal-state circuit breaker.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::outcome::OutcomeEvent;
use crate::revive::{ReviveSnapshot, ReviveVerdict};
use crate::types::SessionId;

/// One play attempt as seen by the coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameSession {
    pub session_id: SessionId,
    pub created_at: DateTime<Utc>,
    /// Best known jump count. Never decreases.
    pub jump_count: u64,
    /// Highest reported score. Never decreases.
    pub score: u64,
    pub revived: bool,
    /// Set once when the session is finalized; never unset.
    pub terminal: bool,
    pub terminal_at: Option<DateTime<Utc>>,
    /// Snapshot taken when a revive was purchased.
    pub revive: Option<ReviveSnapshot>,
}

impl GameSession {
    fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            created_at: Utc::now(),
            jump_count: 0,
            score: 0,
            revived: false,
            terminal: false,
            terminal_at: None,
            revive: None,
        }
    }
}

/// Tracks which sessions have reached a terminal state.
///
/// Independent of the dedup registry: a terminal session rejects every later
/// outcome, even one carrying a key the registry has never seen.
pub struct SessionTracker {
    sessions: DashMap<SessionId, GameSession>,
}

impl SessionTracker {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    /// Record the start of a play attempt. Idempotent.
    pub fn begin_session(&self, session_id: &SessionId) {
        self.sessions
            .entry(session_id.clone())
            .or_insert_with(|| GameSession::new(session_id.clone()));
    }

    /// Max-merge reported values into the session record.
    pub fn observe(&self, session_id: &SessionId, score: u64, jumps: u64) {
        let mut entry = self
            .sessions
            .entry(session_id.clone())
            .or_insert_with(|| GameSession::new(session_id.clone()));
        entry.score = entry.score.max(score);
        entry.jump_count = entry.jump_count.max(jumps);
    }

    pub fn is_terminal(&self, session_id: &SessionId) -> bool {
        self.sessions
            .get(session_id)
            .is_some_and(|session| session.terminal)
    }

    /// Mark the session terminal. Returns `true` if this call made the transition.
    pub fn mark_terminal(&self, session_id: &SessionId) -> bool {
        let mut entry = self
            .sessions
            .entry(session_id.clone())
            .or_insert_with(|| GameSession::new(session_id.clone()));
        if entry.terminal {
            return false;
        }
        entry.terminal = true;
        entry.terminal_at = Some(Utc::now());
        true
    }

    /// Flag the session revived and snapshot its floors. A further revive
    /// advances the epoch and reopens the pre-revive slot. Returns the epoch.
    pub fn set_revived(
        &self,
        session_id: &SessionId,
        prior_jumps: u64,
        prior_score: Option<u64>,
    ) -> u32 {
        let mut entry = self
            .sessions
            .entry(session_id.clone())
            .or_insert_with(|| GameSession::new(session_id.clone()));
        let snapshot = match entry.revive.as_ref() {
            Some(previous) => previous.next(prior_jumps, prior_score),
            None => ReviveSnapshot::new(prior_jumps, prior_score),
        };
        entry.revived = true;
        entry.jump_count = entry.jump_count.max(snapshot.prior_jumps);
        if let Some(score) = snapshot.prior_score {
            entry.score = entry.score.max(score);
        }
        let epoch = snapshot.epoch;
        entry.revive = Some(snapshot);
        epoch
    }

    /// Classify an outcome against the session's revive state, consuming the
    /// one-shot pre-revive slot under the entry lock.
    pub fn classify_revive(&self, session_id: &SessionId, event: &OutcomeEvent) -> ReviveVerdict {
        match self.sessions.get_mut(session_id) {
            Some(mut session) => match session.revive.as_mut() {
                Some(snapshot) => snapshot.classify(event),
                None => ReviveVerdict::NotRevived,
            },
            None => ReviveVerdict::NotRevived,
        }
    }

    /// Revive snapshot of a session that is currently flagged revived.
    pub fn revive_snapshot(&self, session_id: &SessionId) -> Option<ReviveSnapshot> {
        self.sessions
            .get(session_id)
            .filter(|session| session.revived)
            .and_then(|session| session.revive.clone())
    }

    /// Snapshot of the session record.
    pub fn session(&self, session_id: &SessionId) -> Option<GameSession> {
        self.sessions.get(session_id).map(|s| s.clone())
    }

    pub fn terminal_count(&self) -> usize {
        self.sessions.iter().filter(|s| s.terminal).count()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl Default for SessionTracker {
    fn default() -> Self {
        Self::new()
    }
}
