use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::watch;

use crate::error::FinalizeError;
use crate::ledger::{LedgerClient, LedgerReceipt, TxHandle};
use crate::types::WalletAddress;

use super::{pass, Gate};

/// In-memory ledger for testing.
///
/// Records every submission, can inject failures, and can hold submissions or
/// confirmations until a [`Gate`] is opened, which simulates a wallet
/// approval prompt the player never answers.
pub struct MemoryLedger {
    inner: Mutex<Inner>,
}

struct Inner {
    submissions: Vec<(WalletAddress, u64)>,
    pending: HashMap<TxHandle, u64>,
    next_tx: u64,
    next_block: u64,
    fail_submissions: u32,
    fail_confirmations: u32,
    submission_gate: Option<watch::Receiver<bool>>,
    confirmation_gate: Option<watch::Receiver<bool>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                submissions: Vec::new(),
                pending: HashMap::new(),
                next_tx: 1,
                next_block: 1_000,
                fail_submissions: 0,
                fail_confirmations: 0,
                submission_gate: None,
                confirmation_gate: None,
            }),
        }
    }

    /// Submissions (address, jump count) that reached the ledger, in order.
    pub fn submissions(&self) -> Vec<(WalletAddress, u64)> {
        self.inner.lock().submissions.clone()
    }

    pub fn fail_next_submissions(&self, count: u32) {
        self.inner.lock().fail_submissions = count;
    }

    pub fn fail_next_confirmations(&self, count: u32) {
        self.inner.lock().fail_confirmations = count;
    }

    /// Hold every submission until the returned gate is opened.
    pub fn hold_submissions(&self) -> Gate {
        let (gate, rx) = Gate::new();
        self.inner.lock().submission_gate = Some(rx);
        gate
    }

    /// Hold every confirmation until the returned gate is opened.
    pub fn hold_confirmations(&self) -> Gate {
        let (gate, rx) = Gate::new();
        self.inner.lock().confirmation_gate = Some(rx);
        gate
    }

    async fn approve(gate: Option<watch::Receiver<bool>>) -> Result<(), FinalizeError> {
        if pass(gate).await {
            Ok(())
        } else {
            Err(FinalizeError::ledger("approval abandoned"))
        }
    }
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerClient for MemoryLedger {
    async fn submit_ledger_write(
        &self,
        address: &WalletAddress,
        jump_count: u64,
    ) -> Result<TxHandle, FinalizeError> {
        let gate = self.inner.lock().submission_gate.clone();
        Self::approve(gate).await?;

        let mut inner = self.inner.lock();
        if inner.fail_submissions > 0 {
            inner.fail_submissions -= 1;
            return Err(FinalizeError::ledger("insufficient funds"));
        }
        let tx = TxHandle(format!("tx-{}", inner.next_tx));
        inner.next_tx += 1;
        inner.submissions.push((address.clone(), jump_count));
        inner.pending.insert(tx.clone(), jump_count);
        Ok(tx)
    }

    async fn await_confirmation(&self, tx: &TxHandle) -> Result<LedgerReceipt, FinalizeError> {
        let gate = self.inner.lock().confirmation_gate.clone();
        Self::approve(gate).await?;

        let mut inner = self.inner.lock();
        if inner.fail_confirmations > 0 {
            inner.fail_confirmations -= 1;
            return Err(FinalizeError::ConfirmationFailed {
                tx: tx.to_string(),
                reason: "transaction reverted".to_string(),
                source: None,
            });
        }
        let Some(jump_count) = inner.pending.remove(tx) else {
            return Err(FinalizeError::ConfirmationFailed {
                tx: tx.to_string(),
                reason: "unknown transaction".to_string(),
                source: None,
            });
        };
        let block = inner.next_block;
        inner.next_block += 1;
        Ok(LedgerReceipt {
            tx: tx.clone(),
            jump_count,
            block: Some(block),
        })
    }
}
