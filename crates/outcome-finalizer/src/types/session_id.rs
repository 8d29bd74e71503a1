use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::FinalizeError;

/// Suffix delimiters applied when no configuration is at hand, e.g. when a
/// session id is deserialized.
pub const DEFAULT_SUFFIX_DELIMITERS: &[char] = &['#', '@'];

/// Logical identifier of one play attempt.
///
/// Always holds the normalized form: surrounding whitespace trimmed and any
/// channel-specific uniqueness suffix removed, so `run-7#relay` and `run-7`
/// name the same session.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionId(String);

impl SessionId {
    /// Normalize a raw session id reported by a notification channel.
    ///
    /// The id is cut at the first occurrence of any of `suffix_delimiters`.
    /// Returns `None` when nothing remains, which callers treat as a missing id.
    pub fn normalize(raw: &str, suffix_delimiters: &[char]) -> Option<Self> {
        let trimmed = raw.trim();
        let base = match trimmed.find(|c| suffix_delimiters.contains(&c)) {
            Some(idx) => &trimmed[..idx],
            None => trimmed,
        };
        let base = base.trim();
        if base.is_empty() {
            None
        } else {
            Some(Self(base.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for SessionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for SessionId {
    type Error = FinalizeError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::normalize(&raw, DEFAULT_SUFFIX_DELIMITERS).ok_or_else(|| {
            FinalizeError::InvalidSessionId {
                reason: format!("{raw:?} is empty after normalization"),
            }
        })
    }
}

impl From<SessionId> for String {
    fn from(id: SessionId) -> Self {
        id.0
    }
}
