//! Inbound outcome notifications.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::error::FinalizeError;

/// Kind of outcome notification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutcomeKind {
    /// A regular game-over.
    #[default]
    Normal,
    /// The player declined to continue after being offered a revive.
    ReviveCancel,
}

/// Notification channel an outcome was delivered through.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutcomeSource {
    /// Message posted by the embedded game surface.
    #[default]
    EmbeddedGame,
    /// Completion callback of the host page.
    HostCallback,
    /// Secondary relay (storage event, broadcast channel, ...).
    SecondaryRelay,
    /// The revive purchase flow.
    ReviveFlow,
}

impl fmt::Display for OutcomeSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::EmbeddedGame => "embedded-game",
            Self::HostCallback => "host-callback",
            Self::SecondaryRelay => "secondary-relay",
            Self::ReviveFlow => "revive-flow",
        };
        f.write_str(name)
    }
}

/// A session ended, carrying its score and jump count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeEvent {
    /// Raw session id as reported by the channel (may carry a suffix).
    pub session_id: String,
    pub score: u64,
    #[serde(default)]
    pub jumps: u64,
    #[serde(default)]
    pub kind: OutcomeKind,
    #[serde(default)]
    pub source: OutcomeSource,
}

impl OutcomeEvent {
    pub fn new(session_id: impl Into<String>, score: u64, jumps: u64) -> Self {
        Self {
            session_id: session_id.into(),
            score,
            jumps,
            kind: OutcomeKind::Normal,
            source: OutcomeSource::EmbeddedGame,
        }
    }

    pub fn with_kind(mut self, kind: OutcomeKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_source(mut self, source: OutcomeSource) -> Self {
        self.source = source;
        self
    }

    /// Parse an untyped notification payload.
    ///
    /// Channels post loosely typed JSON: `sessionId` must be a non-empty
    /// string, `score` a non-negative number or numeric string. `jumps`
    /// defaults to zero and `kind` to `normal`. Fractional values are
    /// truncated.
    pub fn from_value(value: &Value, source: OutcomeSource) -> Result<Self, FinalizeError> {
        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| FinalizeError::MalformedOutcome {
                reason: "missing sessionId".to_string(),
            })?
            .to_string();

        let score = match value.get("score") {
            Some(raw) => parse_count(raw).ok_or_else(|| FinalizeError::MalformedOutcome {
                reason: format!("non-numeric score: {raw}"),
            })?,
            None => {
                return Err(FinalizeError::MalformedOutcome {
                    reason: "missing score".to_string(),
                })
            }
        };

        let jumps = match value.get("jumps") {
            None | Some(Value::Null) => 0,
            Some(raw) => parse_count(raw).ok_or_else(|| FinalizeError::MalformedOutcome {
                reason: format!("non-numeric jumps: {raw}"),
            })?,
        };

        let kind = match value.get("kind") {
            None | Some(Value::Null) => OutcomeKind::Normal,
            Some(raw) => serde_json::from_value(raw.clone()).map_err(|e| {
                FinalizeError::MalformedOutcome {
                    reason: format!("unknown kind {raw}: {e}"),
                }
            })?,
        };

        Ok(Self {
            session_id,
            score,
            jumps,
            kind,
            source,
        })
    }
}

fn parse_count(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && *f >= 0.0)
                .map(|f| f.trunc() as u64)
        }),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<u64>().ok().or_else(|| {
                s.parse::<f64>()
                    .ok()
                    .filter(|f| f.is_finite() && *f >= 0.0)
                    .map(|f| f.trunc() as u64)
            })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_typed_payload() {
        let event = OutcomeEvent::from_value(
            &json!({"sessionId": "run-1#host", "score": 250, "jumps": 40, "kind": "revive-cancel"}),
            OutcomeSource::HostCallback,
        )
        .unwrap();
        assert_eq!(event.session_id, "run-1#host");
        assert_eq!(event.score, 250);
        assert_eq!(event.jumps, 40);
        assert_eq!(event.kind, OutcomeKind::ReviveCancel);
        assert_eq!(event.source, OutcomeSource::HostCallback);
    }

    #[test]
    fn accepts_numeric_strings_and_fractions() {
        let event = OutcomeEvent::from_value(
            &json!({"sessionId": "run-1", "score": "300", "jumps": 2.9}),
            OutcomeSource::SecondaryRelay,
        )
        .unwrap();
        assert_eq!(event.score, 300);
        assert_eq!(event.jumps, 2);
        assert_eq!(event.kind, OutcomeKind::Normal);
    }

    #[test]
    fn rejects_missing_session_id() {
        let err = OutcomeEvent::from_value(&json!({"score": 10}), OutcomeSource::EmbeddedGame)
            .unwrap_err();
        assert!(err.to_string().contains("sessionId"), "got: {err}");

        let err = OutcomeEvent::from_value(
            &json!({"sessionId": "  ", "score": 10}),
            OutcomeSource::EmbeddedGame,
        )
        .unwrap_err();
        assert!(matches!(err, FinalizeError::MalformedOutcome { .. }));
    }

    #[test]
    fn rejects_non_numeric_score() {
        for score in [json!("lots"), json!(-5), json!(true), json!(null)] {
            let err = OutcomeEvent::from_value(
                &json!({"sessionId": "run-1", "score": score}),
                OutcomeSource::EmbeddedGame,
            )
            .unwrap_err();
            assert!(err.to_string().contains("score"), "got: {err}");
        }
    }

    #[test]
    fn rejects_unknown_kind() {
        let err = OutcomeEvent::from_value(
            &json!({"sessionId": "run-1", "score": 1, "kind": "rage-quit"}),
            OutcomeSource::EmbeddedGame,
        )
        .unwrap_err();
        assert!(err.to_string().contains("kind"), "got: {err}");
    }

    #[test]
    fn builder_sets_kind_and_source() {
        let event = OutcomeEvent::new("run-1", 10, 1)
            .with_kind(OutcomeKind::ReviveCancel)
            .with_source(OutcomeSource::ReviveFlow);
        assert_eq!(event.kind, OutcomeKind::ReviveCancel);
        assert_eq!(event.source.to_string(), "revive-flow");
    }
}
