//! Newtype domain identifiers.
//!
//! Every concept that has an identity is represented as a distinct newtype
//! wrapping a primitive. This prevents accidentally interchanging, for example,
//! a [`RequestId`] with a [`Fingerprint`] even though both are strings under
//! the hood.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::{AnalysisMode, ProviderId};

// ---------------------------------------------------------------------------
// Macro for String-wrapped newtypes.
// Generates: struct, new() returning Option<Self>, as_str(), Display.
// ---------------------------------------------------------------------------
macro_rules! string_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier, returning `None` if the value is empty.
            pub fn new(value: impl Into<String>) -> Option<Self> {
                let v = value.into();
                if v.is_empty() { None } else { Some(Self(v)) }
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Identifiers: string-backed
// ---------------------------------------------------------------------------

string_id! {
    /// Identifies one item submitted for analysis (typically a ticket number).
    ///
    /// Caller-supplied and opaque to the analysis core; it is carried through
    /// to the [`crate::AnalysisResult`] so callers can correlate results that
    /// complete out of order.
    RequestId
}

string_id! {
    /// Names a model served by a completion provider
    /// (e.g. `"claude-3-5-haiku-latest"`, `"gpt-4o-mini"`).
    ModelName
}

// ---------------------------------------------------------------------------
// Content fingerprint
// ---------------------------------------------------------------------------

/// Stable cache key derived from the normalised request text plus the
/// provider and analysis mode that produced the result.
///
/// The same text analysed by a different provider or in a different mode
/// yields a different fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Computes the fingerprint for `text` analysed by `provider` in `mode`.
    ///
    /// Text is trimmed, whitespace runs are collapsed to a single space and the
    /// result is lower-cased before hashing, so cosmetic differences in ticket
    /// formatting do not defeat the cache.
    pub fn compute(text: &str, provider: ProviderId, mode: AnalysisMode) -> Self {
        let normalized = text
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();

        let mut hasher = Sha256::new();
        hasher.update(provider.as_str().as_bytes());
        hasher.update([0u8]);
        hasher.update(mode.as_str().as_bytes());
        hasher.update([0u8]);
        hasher.update(normalized.as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    /// Wraps an already-computed fingerprint string (e.g. read back from storage).
    pub fn from_raw(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the fingerprint as a hex string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Identifiers: UUID-backed (internally generated)
// ---------------------------------------------------------------------------

/// Identifies a single batch run (one invocation of the batch coordinator).
///
/// Generated fresh for every batch; attached to spans so all activity from a
/// single run can be correlated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BatchRunId(Uuid);

impl BatchRunId {
    /// Generates a new random run identifier.
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying [`Uuid`].
    pub fn as_uuid(self) -> Uuid {
        self.0
    }
}

impl std::fmt::Display for BatchRunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_id_rejects_empty() {
        assert!(RequestId::new("").is_none());
        assert_eq!(RequestId::new("T-1").unwrap().as_str(), "T-1");
    }

    #[test]
    fn test_fingerprint_ignores_cosmetic_whitespace_and_case() {
        let a = Fingerprint::compute("  Printer   is\nON fire ", ProviderId::Anthropic, AnalysisMode::Enhanced);
        let b = Fingerprint::compute("printer is on fire", ProviderId::Anthropic, AnalysisMode::Enhanced);
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
    }

    #[test]
    fn test_fingerprint_differs_by_provider_and_mode() {
        let text = "cannot log in";
        let base = Fingerprint::compute(text, ProviderId::Anthropic, AnalysisMode::Basic);
        assert_ne!(base, Fingerprint::compute(text, ProviderId::OpenAi, AnalysisMode::Basic));
        assert_ne!(base, Fingerprint::compute(text, ProviderId::Anthropic, AnalysisMode::Enhanced));
    }
}
