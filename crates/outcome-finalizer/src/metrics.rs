use prometheus::{IntCounter, IntGauge, Opts, Registry};

/// Prometheus metrics of the finalization coordinator.
pub struct FinalizerMetrics {
    /// Outcomes ignored (duplicate, terminal, pre-revive, malformed, no wallet).
    pub skipped: IntCounter,
    /// Outcomes whose score was persisted but which did not produce a ledger write.
    pub persisted_only: IntCounter,
    /// Outcomes that produced a confirmed ledger write.
    pub submitted: IntCounter,
    /// Failed best-effort persistence writes.
    pub persistence_failures: IntCounter,
    /// Failed ledger submissions or confirmations.
    pub ledger_failures: IntCounter,
    /// Expired leases reclaimed by a later attempt.
    pub lease_reclaims: IntCounter,
    /// Sessions marked terminal.
    pub terminal_sessions: IntGauge,
}

impl FinalizerMetrics {
    /// Create metrics and register them with the given prometheus registry.
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let metrics = Self::build()?;
        registry.register(Box::new(metrics.skipped.clone()))?;
        registry.register(Box::new(metrics.persisted_only.clone()))?;
        registry.register(Box::new(metrics.submitted.clone()))?;
        registry.register(Box::new(metrics.persistence_failures.clone()))?;
        registry.register(Box::new(metrics.ledger_failures.clone()))?;
        registry.register(Box::new(metrics.lease_reclaims.clone()))?;
        registry.register(Box::new(metrics.terminal_sessions.clone()))?;
        Ok(metrics)
    }

    /// Create metrics without registering (for testing).
    pub fn unregistered() -> Self {
        Self::build().expect("valid metric names")
    }

    fn build() -> Result<Self, prometheus::Error> {
        Ok(Self {
            skipped: IntCounter::with_opts(Opts::new(
                "finalizer_outcomes_skipped_total",
                "Outcome notifications ignored",
            ))?,
            persisted_only: IntCounter::with_opts(Opts::new(
                "finalizer_outcomes_persisted_only_total",
                "Outcomes persisted without a ledger write",
            ))?,
            submitted: IntCounter::with_opts(Opts::new(
                "finalizer_outcomes_submitted_total",
                "Outcomes persisted and written to the ledger",
            ))?,
            persistence_failures: IntCounter::with_opts(Opts::new(
                "finalizer_persistence_failures_total",
                "Failed best-effort persistence writes",
            ))?,
            ledger_failures: IntCounter::with_opts(Opts::new(
                "finalizer_ledger_failures_total",
                "Failed ledger submissions or confirmations",
            ))?,
            lease_reclaims: IntCounter::with_opts(Opts::new(
                "finalizer_lease_reclaims_total",
                "Expired leases reclaimed",
            ))?,
            terminal_sessions: IntGauge::with_opts(Opts::new(
                "finalizer_terminal_sessions",
                "Sessions marked terminal",
            ))?,
        })
    }
}
