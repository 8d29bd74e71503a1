use serde::{Deserialize, Serialize};
use std::fmt;

use super::SessionId;

/// Key used by the dedup registry to recognise repeated outcome notifications.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct OutcomeKey(pub String);

impl OutcomeKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Key of a regular game-over notification. `epoch` counts the revives
    /// the run follows, so a revived run dying at the same score gets a new key.
    pub fn for_outcome(session_id: &SessionId, score: u64, epoch: u32) -> Self {
        match epoch {
            0 => Self(format!("{session_id}:{score}")),
            _ => Self(format!("{session_id}:r{epoch}:{score}")),
        }
    }

    /// Synthetic key of a revive-cancel notification. It never collides with
    /// the key of the pre-revive outcome carrying the same score.
    pub fn for_revive_cancel(session_id: &SessionId, epoch: u32) -> Self {
        match epoch {
            0 => Self(format!("{session_id}:revive-cancel")),
            _ => Self(format!("{session_id}:r{epoch}:revive-cancel")),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for OutcomeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
