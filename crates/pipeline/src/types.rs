//! Shared value types for the analysis domain.
//!
//! Unlike the newtype identifiers in [`crate::identifiers`], these types carry
//! meaningful values with invariants (levels are in `[1, 5]`, priorities in
//! `[1, 10]`, confidence in `[0.0, 1.0]`) and participate in domain
//! computations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Level
// ---------------------------------------------------------------------------

/// A 1–5 rating (urgency, frustration, technical expertise).
///
/// Construction always clamps, so a `Level` can never hold an out-of-range
/// value regardless of what the model produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "i64", into = "u8")]
pub struct Level(u8);

impl Level {
    /// Lowest rating.
    pub const MIN: Level = Level(1);
    /// Middle rating.
    pub const MID: Level = Level(3);
    /// Highest rating.
    pub const MAX: Level = Level(5);

    /// Creates a [`Level`], clamping `value` into `[1, 5]`.
    pub fn clamped(value: i64) -> Self {
        Self(value.clamp(1, 5) as u8)
    }

    /// Returns the rating as a `u8` in `[1, 5]`.
    pub fn get(self) -> u8 {
        self.0
    }
}

impl From<i64> for Level {
    fn from(value: i64) -> Self {
        Self::clamped(value)
    }
}

impl From<Level> for u8 {
    fn from(level: Level) -> Self {
        level.0
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Priority
// ---------------------------------------------------------------------------

/// A 1–10 triage priority produced by [`crate::scoring::score`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "i64", into = "u8")]
pub struct PriorityScore(u8);

impl PriorityScore {
    /// The lowest priority, also used for results that carry an error.
    pub const LOWEST: PriorityScore = PriorityScore(1);

    /// Creates a [`PriorityScore`], clamping `value` into `[1, 10]`.
    pub fn clamped(value: i64) -> Self {
        Self(value.clamp(1, 10) as u8)
    }

    /// Returns the priority as a `u8` in `[1, 10]`.
    pub fn get(self) -> u8 {
        self.0
    }
}

impl From<i64> for PriorityScore {
    fn from(value: i64) -> Self {
        Self::clamped(value)
    }
}

impl From<PriorityScore> for u8 {
    fn from(score: PriorityScore) -> Self {
        score.0
    }
}

impl std::fmt::Display for PriorityScore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Confidence
// ---------------------------------------------------------------------------

/// Model-reported confidence in the range `[0.0, 1.0]`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(from = "f64", into = "f64")]
pub struct Confidence(f64);

impl Confidence {
    /// Confidence carried by default-valued results.
    pub const NONE: Confidence = Confidence(0.0);

    /// Creates a [`Confidence`], clamping into `[0.0, 1.0]`.
    ///
    /// NaN becomes `0.0`.
    pub fn clamped(value: f64) -> Self {
        if value.is_nan() {
            Self(0.0)
        } else {
            Self(value.clamp(0.0, 1.0))
        }
    }

    /// Returns the confidence as an `f64` in `[0.0, 1.0]`.
    pub fn as_f64(self) -> f64 {
        self.0
    }
}

impl From<f64> for Confidence {
    fn from(value: f64) -> Self {
        Self::clamped(value)
    }
}

impl From<Confidence> for f64 {
    fn from(confidence: Confidence) -> Self {
        confidence.0
    }
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Provider and mode selectors
// ---------------------------------------------------------------------------

/// Closed set of completion providers the client can dispatch to.
///
/// Adding a provider means adding a variant here and a
/// [`crate::CompletionProvider`] implementation in the `llm` crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderId {
    /// Anthropic Messages API.
    Anthropic,
    /// OpenAI Chat Completions API.
    OpenAi,
    /// Local Ollama instance.
    Ollama,
}

impl ProviderId {
    /// All known providers, in declaration order.
    pub const ALL: [ProviderId; 3] = [ProviderId::Anthropic, ProviderId::OpenAi, ProviderId::Ollama];

    /// Returns the configuration name of this provider.
    pub fn as_str(self) -> &'static str {
        match self {
            ProviderId::Anthropic => "anthropic",
            ProviderId::OpenAi => "open_ai",
            ProviderId::Ollama => "ollama",
        }
    }

    /// Highest sampling temperature the provider's API accepts.
    pub fn max_temperature(self) -> f32 {
        match self {
            ProviderId::Anthropic => 1.0,
            ProviderId::OpenAi | ProviderId::Ollama => 2.0,
        }
    }
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProviderId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "anthropic" | "claude" => Ok(ProviderId::Anthropic),
            "open_ai" | "openai" => Ok(ProviderId::OpenAi),
            "ollama" => Ok(ProviderId::Ollama),
            other => Err(format!("unknown provider '{other}'")),
        }
    }
}

/// How much structure the model is asked to return.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisMode {
    /// Sentiment signals only.
    Basic,
    /// Sentiment signals plus category, component and confidence.
    #[default]
    Enhanced,
}

impl AnalysisMode {
    /// Returns the configuration name of this mode.
    pub fn as_str(self) -> &'static str {
        match self {
            AnalysisMode::Basic => "basic",
            AnalysisMode::Enhanced => "enhanced",
        }
    }
}

impl std::fmt::Display for AnalysisMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AnalysisMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "basic" => Ok(AnalysisMode::Basic),
            "enhanced" => Ok(AnalysisMode::Enhanced),
            other => Err(format!("unknown analysis mode '{other}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// A UTC wall-clock timestamp.
///
/// Wraps [`chrono::DateTime<Utc>`] so callers never depend on `chrono` types
/// directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Returns the current UTC time as a [`Timestamp`].
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Returns the underlying [`DateTime<Utc>`].
    pub fn as_datetime(self) -> DateTime<Utc> {
        self.0
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}
