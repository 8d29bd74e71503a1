//! Revive side-channel.
//!
//! Buying a revive extends a session that has already produced a game-over.
//! That pending game-over must not be finalized: the outcome reported after
//! the revived run ends is the authoritative one. The purchase flow reports a
//! [`ReviveNotification`]; the coordinator stores a [`ReviveSnapshot`] on the
//! session and classifies each later outcome with
//! [`ReviveSnapshot::classify`].
//!
//! The pre-revive slot is one-shot. The first normal outcome after a revive
//! is the game-over the revive was bought on; its exact repeats from other
//! channels stay suppressed, and any other outcome is authoritative. Values
//! are never compared against the snapshot: jump tracking may restart with the
//! revived run, and a player can die again at the same score.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::outcome::{OutcomeEvent, OutcomeKind};

/// Reported by the revive purchase flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviveNotification {
    pub session_id: String,
    /// Jumps accumulated before the revive. Acts as a floor for the
    /// post-revive jump count, which may restart from zero.
    pub prior_jumps: u64,
    /// Score at the moment of the revive, when the purchase flow knows it.
    #[serde(default)]
    pub prior_score: Option<u64>,
}

/// State captured when a revive is purchased.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviveSnapshot {
    pub prior_jumps: u64,
    pub prior_score: Option<u64>,
    pub revived_at: DateTime<Utc>,
    /// Revives purchased for the session so far, starting at 1.
    pub epoch: u32,
    /// `(score, jumps)` of the suppressed pre-revive game-over, once seen.
    pub pre_revive: Option<(u64, u64)>,
}

impl ReviveSnapshot {
    /// Snapshot of a session's first revive.
    pub fn new(prior_jumps: u64, prior_score: Option<u64>) -> Self {
        Self {
            prior_jumps,
            prior_score,
            revived_at: Utc::now(),
            epoch: 1,
            pre_revive: None,
        }
    }

    /// Snapshot of a further revive of the same session. Floors never drop.
    pub fn next(&self, prior_jumps: u64, prior_score: Option<u64>) -> Self {
        Self {
            prior_jumps: self.prior_jumps.max(prior_jumps),
            prior_score: self.prior_score.max(prior_score),
            revived_at: Utc::now(),
            epoch: self.epoch + 1,
            pre_revive: None,
        }
    }

    /// Apply the jump floor to a post-revive jump count.
    pub fn floor_jumps(&self, jumps: u64) -> u64 {
        jumps.max(self.prior_jumps)
    }

    /// Apply the score floor to a post-revive score.
    pub fn floor_score(&self, score: u64) -> u64 {
        score.max(self.prior_score.unwrap_or(0))
    }

    /// Classify an outcome, consuming the pre-revive slot if it is still open.
    pub fn classify(&mut self, event: &OutcomeEvent) -> ReviveVerdict {
        if event.kind == OutcomeKind::ReviveCancel {
            return ReviveVerdict::Authoritative(self.clone());
        }
        let reported = (event.score, event.jumps);
        match self.pre_revive {
            None => {
                self.pre_revive = Some(reported);
                ReviveVerdict::PreRevive {
                    epoch: self.epoch - 1,
                }
            }
            Some(seen) if seen == reported => ReviveVerdict::PreRevive {
                epoch: self.epoch - 1,
            },
            Some(_) => ReviveVerdict::Authoritative(self.clone()),
        }
    }
}

/// How an outcome relates to a revive on its session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviveVerdict {
    /// The session was never revived.
    NotRevived,
    /// The game-over a revive was bought on, or a repeat of it. Suppressed.
    /// `epoch` is the run it belongs to.
    PreRevive { epoch: u32 },
    /// The outcome of the revived run, or a revive-cancel. Finalized with the
    /// floors of the snapshot.
    Authoritative(ReviveSnapshot),
}

impl ReviveVerdict {
    /// Run the outcome belongs to; keys of different runs never collide.
    pub fn epoch(&self) -> u32 {
        match self {
            Self::NotRevived => 0,
            Self::PreRevive { epoch } => *epoch,
            Self::Authoritative(snapshot) => snapshot.epoch,
        }
    }
}
