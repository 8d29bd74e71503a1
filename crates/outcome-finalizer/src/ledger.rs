use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::FinalizeError;
use crate::types::WalletAddress;

/// Handle of a submitted ledger transaction.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct TxHandle(pub String);

impl fmt::Display for TxHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Confirmation of a ledger write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerReceipt {
    pub tx: TxHandle,
    /// Jump count recorded by the transaction.
    pub jump_count: u64,
    /// Block or ledger sequence the transaction was included in, when known.
    pub block: Option<u64>,
}

/// Signed, fee-bearing ledger writes.
///
/// Each call to `submit_ledger_write` produces one transaction; the
/// coordinator guarantees it calls it at most once per finalized session.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Sign and submit one transaction recording `jump_count` for `address`.
    /// May wait on an external approval step for an unbounded time.
    async fn submit_ledger_write(
        &self,
        address: &WalletAddress,
        jump_count: u64,
    ) -> Result<TxHandle, FinalizeError>;

    /// Wait for the transaction to be confirmed.
    async fn await_confirmation(&self, tx: &TxHandle) -> Result<LedgerReceipt, FinalizeError>;
}
