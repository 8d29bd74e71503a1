/// Errors that can occur while finalizing a session outcome.
///
/// None of these escape [`FinalizationCoordinator::handle_outcome`](crate::coordinator::FinalizationCoordinator::handle_outcome);
/// the router converts each one into a [`ProcessingResult`](crate::coordinator::ProcessingResult).
#[derive(Debug, thiserror::Error)]
pub enum FinalizeError {
    #[error("malformed outcome: {reason}")]
    MalformedOutcome { reason: String },

    #[error("persistence error: {reason}")]
    Persistence {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("ledger submission failed: {reason}")]
    LedgerSubmission {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("ledger confirmation failed for tx {tx}: {reason}")]
    ConfirmationFailed {
        tx: String,
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("invalid session id: {reason}")]
    InvalidSessionId { reason: String },

    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("outcome inbox is closed")]
    InboxClosed,
}

impl FinalizeError {
    /// Shorthand for a persistence error without an underlying cause.
    pub fn persistence(reason: impl Into<String>) -> Self {
        Self::Persistence {
            reason: reason.into(),
            source: None,
        }
    }

    /// Shorthand for a ledger submission error without an underlying cause.
    pub fn ledger(reason: impl Into<String>) -> Self {
        Self::LedgerSubmission {
            reason: reason.into(),
            source: None,
        }
    }
}
