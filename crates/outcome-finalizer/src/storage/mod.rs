//! In-memory implementations of the outbound ports.

pub mod memory_ledger;
pub mod memory_score;

use tokio::sync::watch;

/// Releases calls held by one of the in-memory stores. Dropping it without
/// opening makes held calls fail.
pub struct Gate {
    tx: watch::Sender<bool>,
}

impl Gate {
    pub(crate) fn new() -> (Self, watch::Receiver<bool>) {
        let (tx, rx) = watch::channel(false);
        (Self { tx }, rx)
    }

    pub fn open(&self) {
        self.tx.send_replace(true);
    }
}

/// Wait until `gate` opens. Returns `false` if it was dropped while closed.
pub(crate) async fn pass(gate: Option<watch::Receiver<bool>>) -> bool {
    match gate {
        Some(mut gate) => gate.wait_for(|open| *open).await.is_ok(),
        None => true,
    }
}
