//! Exactly-once finalization of game session outcomes.
//!
//! A session's outcome (score and jump count) is reported by several
//! redundant channels, each at least once. This crate records it in two
//! places: a remote score store, written best-effort for every accepted
//! report, and a distributed ledger, written at most once per session through
//! a TTL-bounded lease.
//!
//! The entry point is [`FinalizationCoordinator`]; notification adapters
//! usually reach it through an [`OutcomeInbox`].
//!
//! ```text
//! use outcome_finalizer::prelude::*;
//!
//! let coordinator = Arc::new(FinalizationCoordinator::new(
//!     CoordinatorConfig::default(),
//!     score_store,
//!     ledger_client,
//!     Arc::new(FinalizerMetrics::new(&registry)?),
//! )?);
//! coordinator.set_wallet(Some(WalletAddress::new(address)));
//!
//! let (sender, inbox) = OutcomeInbox::channel(64);
//! inbox.spawn(coordinator.clone(), cancel.clone());
//! sender
//!     .with_source(OutcomeSource::HostCallback)
//!     .report(OutcomeEvent::new("run-42", 310, 21))
//!     .await?;
//! ```

pub mod config;
pub mod coordinator;
pub mod dedup;
pub mod error;
pub mod inbox;
pub mod lease;
pub mod ledger;
pub mod metrics;
pub mod outcome;
pub mod persistence;
pub mod queue;
pub mod revive;
pub mod session;
pub mod storage;
pub mod testing;
pub mod types;

pub use coordinator::{FinalizationCoordinator, PersistedOnlyReason, ProcessingResult, SkipReason};
pub use inbox::{InboxSender, OutcomeInbox};

/// Prelude module for convenient glob imports.
pub mod prelude {
    pub use crate::config::{CoordinatorConfig, JumpEstimatePolicy};
    pub use crate::coordinator::{
        FinalizationCoordinator, PersistedOnlyReason, ProcessingResult, SkipReason,
    };
    pub use crate::error::FinalizeError;
    pub use crate::inbox::{InboxSender, OutcomeInbox};
    pub use crate::ledger::{LedgerClient, LedgerReceipt, TxHandle};
    pub use crate::metrics::FinalizerMetrics;
    pub use crate::outcome::{OutcomeEvent, OutcomeKind, OutcomeSource};
    pub use crate::persistence::{ScoreStore, ScoreWrite};
    pub use crate::revive::ReviveNotification;
    pub use crate::types::{SessionId, WalletAddress};
}
