use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::watch;

use crate::error::FinalizeError;
use crate::persistence::{ScoreStore, ScoreWrite};
use crate::types::{SessionId, WalletAddress};

use super::{pass, Gate};

/// In-memory score store for testing.
pub struct MemoryScoreStore {
    inner: Mutex<Inner>,
}

struct Inner {
    /// Best score per game id.
    scores: HashMap<SessionId, (WalletAddress, u64)>,
    /// Lifetime jump counter per player.
    jumps: HashMap<WalletAddress, u64>,
    /// Number of `persist_score` calls, failed ones included.
    score_writes: usize,
    /// Number of upcoming writes (score or jumps) that fail.
    fail_next: u32,
    /// Taken by the next `persist_score` call.
    next_score_gate: Option<watch::Receiver<bool>>,
}

impl MemoryScoreStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                scores: HashMap::new(),
                jumps: HashMap::new(),
                score_writes: 0,
                fail_next: 0,
                next_score_gate: None,
            }),
        }
    }

    /// Make the next `count` writes fail with a persistence error.
    pub fn fail_next_writes(&self, count: u32) {
        self.inner.lock().fail_next = count;
    }

    /// Hold the next `persist_score` call until the returned gate is opened.
    /// A dropped gate fails it.
    pub fn hold_next_score_write(&self) -> Gate {
        let (gate, rx) = Gate::new();
        self.inner.lock().next_score_gate = Some(rx);
        gate
    }

    pub fn best_score(&self, game_id: &SessionId) -> Option<u64> {
        self.inner.lock().scores.get(game_id).map(|(_, score)| *score)
    }

    pub fn total_jumps(&self, address: &WalletAddress) -> u64 {
        self.inner.lock().jumps.get(address).copied().unwrap_or(0)
    }

    pub fn score_writes(&self) -> usize {
        self.inner.lock().score_writes
    }

    fn take_failure(inner: &mut Inner) -> bool {
        if inner.fail_next > 0 {
            inner.fail_next -= 1;
            true
        } else {
            false
        }
    }
}

impl Default for MemoryScoreStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ScoreStore for MemoryScoreStore {
    async fn persist_score(
        &self,
        address: &WalletAddress,
        score: u64,
        game_id: &SessionId,
    ) -> Result<ScoreWrite, FinalizeError> {
        let gate = {
            let mut inner = self.inner.lock();
            inner.score_writes += 1;
            inner.next_score_gate.take()
        };
        if !pass(gate).await {
            return Err(FinalizeError::persistence("held score write abandoned"));
        }

        let mut inner = self.inner.lock();
        if Self::take_failure(&mut inner) {
            return Err(FinalizeError::persistence("injected score write failure"));
        }
        match inner.scores.get(game_id) {
            Some((_, existing)) if *existing >= score => Ok(ScoreWrite::Unchanged),
            _ => {
                inner
                    .scores
                    .insert(game_id.clone(), (address.clone(), score));
                Ok(ScoreWrite::Stored)
            }
        }
    }

    async fn persist_jumps(
        &self,
        address: &WalletAddress,
        delta_jumps: u64,
    ) -> Result<(), FinalizeError> {
        let mut inner = self.inner.lock();
        if Self::take_failure(&mut inner) {
            return Err(FinalizeError::persistence("injected jump write failure"));
        }
        *inner.jumps.entry(address.clone()).or_insert(0) += delta_jumps;
        Ok(())
    }
}
