//! In-memory harness for unit and integration testing.
//!
//! Wires a [`FinalizationCoordinator`] to a [`MemoryScoreStore`] and a
//! [`MemoryLedger`] with a connected wallet, so routing behaviour can be
//! exercised without a persistence backend or a ledger node.

use std::sync::Arc;

use crate::config::CoordinatorConfig;
use crate::coordinator::FinalizationCoordinator;
use crate::inbox::{InboxSender, OutcomeInbox};
use crate::metrics::FinalizerMetrics;
use crate::storage::memory_ledger::MemoryLedger;
use crate::storage::memory_score::MemoryScoreStore;
use crate::types::{SessionId, WalletAddress};

/// Coordinator plus handles to its in-memory collaborators.
///
/// # Example
///
/// ```ignore
/// let h = TestHarness::new();
/// let result = h.coordinator.handle_outcome(&OutcomeEvent::new("run-1", 120, 8)).await;
/// assert!(result.is_submitted());
/// assert_eq!(h.ledger.submissions().len(), 1);
/// ```
pub struct TestHarness {
    pub coordinator: Arc<FinalizationCoordinator>,
    pub store: Arc<MemoryScoreStore>,
    pub ledger: Arc<MemoryLedger>,
    pub wallet: WalletAddress,
}

impl TestHarness {
    /// Harness with default configuration and a connected wallet.
    pub fn new() -> Self {
        Self::with_config(CoordinatorConfig::default())
    }

    /// Harness with custom configuration and a connected wallet.
    ///
    /// # Panics
    ///
    /// Panics if `config` is invalid.
    pub fn with_config(config: CoordinatorConfig) -> Self {
        let store = Arc::new(MemoryScoreStore::new());
        let ledger = Arc::new(MemoryLedger::new());
        let coordinator = FinalizationCoordinator::new(
            config,
            store.clone(),
            ledger.clone(),
            Arc::new(FinalizerMetrics::unregistered()),
        )
        .expect("TestHarness config should be valid");
        let wallet = WalletAddress::new("GTESTPLAYER");
        coordinator.set_wallet(Some(wallet.clone()));

        Self {
            coordinator: Arc::new(coordinator),
            store,
            ledger,
            wallet,
        }
    }

    /// Normalize a session id with the harness configuration.
    ///
    /// # Panics
    ///
    /// Panics if `raw` normalizes to an empty id.
    pub fn sid(&self, raw: &str) -> SessionId {
        self.coordinator
            .normalize(raw)
            .expect("non-empty session id")
    }

    /// Create an inbox sized from the configuration. The consumer is not started.
    pub fn inbox(&self) -> (InboxSender, OutcomeInbox) {
        OutcomeInbox::channel(self.coordinator.config().inbox_capacity)
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
