use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::FinalizeError;
use crate::types::{SessionId, WalletAddress};

/// Result of an insert-if-higher score write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScoreWrite {
    /// The score was stored (first score for the game, or a new high).
    Stored,
    /// A score at least as high was already stored for the game.
    Unchanged,
}

/// Remote best-effort persistence store.
///
/// Failures are logged by the caller and never retried; the ledger path does
/// not depend on them.
#[async_trait]
pub trait ScoreStore: Send + Sync {
    /// Store `score` for `game_id` unless a higher score is already stored.
    /// Idempotent per game id.
    async fn persist_score(
        &self,
        address: &WalletAddress,
        score: u64,
        game_id: &SessionId,
    ) -> Result<ScoreWrite, FinalizeError>;

    /// Add `delta_jumps` to the player's lifetime jump counter.
    async fn persist_jumps(
        &self,
        address: &WalletAddress,
        delta_jumps: u64,
    ) -> Result<(), FinalizeError>;
}
