use crate::error::FinalizeError;
use crate::types::DEFAULT_SUFFIX_DELIMITERS;
use std::time::Duration;

/// Score-based fallback used when tracked jumps look implausibly low.
///
/// Jump tracking can be lost across transitions such as a revive while the
/// score cannot, so a low jump count next to a high score is replaced by an
/// estimate derived from the score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JumpEstimatePolicy {
    /// Tracked jumps strictly below this value are considered suspicious. Default: 5.
    pub min_plausible_jumps: u64,
    /// The fallback only applies when the score is strictly above this value. Default: 100.
    pub score_threshold: u64,
    /// Points awarded per jump on average, used to derive the estimate. Default: 15.
    pub score_per_jump: u64,
    /// Lower bound of the estimate. Default: 10.
    pub minimum_estimate: u64,
}

impl JumpEstimatePolicy {
    /// Jump count actually submitted to the ledger for the given tracked values.
    pub fn effective_jumps(&self, score: u64, jumps: u64) -> u64 {
        if jumps < self.min_plausible_jumps && score > self.score_threshold {
            self.minimum_estimate.max(score / self.score_per_jump)
        } else {
            jumps
        }
    }
}

impl Default for JumpEstimatePolicy {
    fn default() -> Self {
        Self {
            min_plausible_jumps: 5,
            score_threshold: 100,
            score_per_jump: 15,
            minimum_estimate: 10,
        }
    }
}

/// Configuration for the finalization coordinator.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Lifetime of a ledger-write lease before it becomes reclaimable, and the
    /// delay of the automatic release scheduled by the router. Default: 30s.
    pub lease_ttl: Duration,
    /// Maximum number of outcome keys remembered by the dedup registry. Default: 512.
    pub dedup_capacity: usize,
    /// How long an outcome key is remembered. Default: 10 minutes.
    pub dedup_retention: Duration,
    /// Characters introducing a channel-specific uniqueness suffix in a
    /// session id. Default: `['#', '@']`.
    pub session_suffix_delimiters: Vec<char>,
    /// Capacity of the outcome inbox channel. Default: 64.
    pub inbox_capacity: usize,
    /// Effective jump count fallback. Default: see [`JumpEstimatePolicy`].
    pub jump_estimate: JumpEstimatePolicy,
}

impl CoordinatorConfig {
    /// Validate configuration values.
    ///
    /// Checks:
    /// - `lease_ttl` and `dedup_retention` are non-zero
    /// - `dedup_capacity >= 1` and `inbox_capacity >= 1`
    /// - `jump_estimate.score_per_jump >= 1` (prevents division by zero)
    pub fn validate(&self) -> Result<(), FinalizeError> {
        if self.lease_ttl.is_zero() {
            return Err(FinalizeError::InvalidConfig {
                reason: "lease_ttl must be > 0".to_string(),
            });
        }
        if self.dedup_retention.is_zero() {
            return Err(FinalizeError::InvalidConfig {
                reason: "dedup_retention must be > 0".to_string(),
            });
        }
        if self.dedup_capacity == 0 {
            return Err(FinalizeError::InvalidConfig {
                reason: "dedup_capacity must be >= 1".to_string(),
            });
        }
        if self.inbox_capacity == 0 {
            return Err(FinalizeError::InvalidConfig {
                reason: "inbox_capacity must be >= 1".to_string(),
            });
        }
        if self.jump_estimate.score_per_jump == 0 {
            return Err(FinalizeError::InvalidConfig {
                reason: "jump_estimate.score_per_jump must be >= 1".to_string(),
            });
        }
        if self
            .session_suffix_delimiters
            .iter()
            .any(|c| c.is_alphanumeric())
        {
            return Err(FinalizeError::InvalidConfig {
                reason: format!(
                    "session_suffix_delimiters must not contain alphanumerics, got {:?}",
                    self.session_suffix_delimiters
                ),
            });
        }
        Ok(())
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            lease_ttl: Duration::from_secs(30),
            dedup_capacity: 512,
            dedup_retention: Duration::from_secs(600),
            session_suffix_delimiters: DEFAULT_SUFFIX_DELIMITERS.to_vec(),
            inbox_capacity: 64,
            jump_estimate: JumpEstimatePolicy::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = CoordinatorConfig::default();
        assert_eq!(config.lease_ttl, Duration::from_secs(30));
        assert_eq!(config.dedup_capacity, 512);
        assert_eq!(config.dedup_retention, Duration::from_secs(600));
        assert_eq!(config.session_suffix_delimiters, vec!['#', '@']);
        assert_eq!(config.inbox_capacity, 64);
        assert_eq!(config.jump_estimate, JumpEstimatePolicy::default());
    }

    #[test]
    fn default_config_is_valid() {
        CoordinatorConfig::default().validate().unwrap();
    }

    #[test]
    fn custom_config_keeps_other_defaults() {
        let config = CoordinatorConfig {
            lease_ttl: Duration::from_secs(5),
            ..Default::default()
        };
        assert_eq!(config.lease_ttl, Duration::from_secs(5));
        assert_eq!(config.dedup_capacity, 512);
    }

    #[test]
    fn validate_zero_lease_ttl() {
        let config = CoordinatorConfig {
            lease_ttl: Duration::ZERO,
            ..Default::default()
        };
        let msg = config.validate().unwrap_err().to_string();
        assert!(msg.contains("lease_ttl"), "got: {msg}");
    }

    #[test]
    fn validate_zero_dedup_capacity() {
        let config = CoordinatorConfig {
            dedup_capacity: 0,
            ..Default::default()
        };
        let msg = config.validate().unwrap_err().to_string();
        assert!(msg.contains("dedup_capacity"), "got: {msg}");
    }

    #[test]
    fn validate_zero_score_per_jump() {
        let config = CoordinatorConfig {
            jump_estimate: JumpEstimatePolicy {
                score_per_jump: 0,
                ..Default::default()
            },
            ..Default::default()
        };
        let msg = config.validate().unwrap_err().to_string();
        assert!(msg.contains("score_per_jump"), "got: {msg}");
    }

    #[test]
    fn validate_alphanumeric_delimiter() {
        let config = CoordinatorConfig {
            session_suffix_delimiters: vec!['#', 'x'],
            ..Default::default()
        };
        let msg = config.validate().unwrap_err().to_string();
        assert!(msg.contains("session_suffix_delimiters"), "got: {msg}");
    }

    #[test]
    fn effective_jumps_substitutes_estimate() {
        let policy = JumpEstimatePolicy::default();
        assert_eq!(policy.effective_jumps(300, 2), 20);
        // Estimate is floored at the minimum.
        assert_eq!(policy.effective_jumps(120, 0), 10);
    }

    #[test]
    fn effective_jumps_keeps_plausible_counts() {
        let policy = JumpEstimatePolicy::default();
        assert_eq!(policy.effective_jumps(300, 5), 5);
        assert_eq!(policy.effective_jumps(100, 2), 2);
        assert_eq!(policy.effective_jumps(0, 0), 0);
    }
}
