//! Analysis data model: what goes in, what comes out.
//!
//! An [`AnalysisRequest`] is created per item entering a batch and is never
//! persisted. Exactly one [`AnalysisResult`] is produced per request (or
//! served from cache). A result either carries fully populated analysis
//! fields or an [`AnalysisFailure`]; in the failure case every other field
//! holds its documented default so consumers never branch on absence.

use serde::{Deserialize, Serialize};

use crate::{AnalysisFailure, Confidence, ErrorKind, Level, PriorityScore, RequestId};

/// Message carried by results for requests whose text is empty.
pub const EMPTY_CONTENT_MESSAGE: &str = "Empty content provided";

/// Category assigned when none could be determined.
pub const DEFAULT_CATEGORY: &str = "uncategorized";

/// Component assigned when none could be determined.
pub const DEFAULT_COMPONENT: &str = "unknown";

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

/// One item to analyse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    /// Caller-supplied identifier, opaque to the core.
    pub id: RequestId,
    /// Content to analyse.
    pub text: String,
}

impl AnalysisRequest {
    /// Creates a request.
    pub fn new(id: RequestId, text: impl Into<String>) -> Self {
        Self {
            id,
            text: text.into(),
        }
    }

    /// Returns `true` if the text holds nothing but whitespace.
    ///
    /// Such requests short-circuit to [`AnalysisResult::empty_content`] and
    /// never reach a provider.
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// A support ticket as supplied by the ticket-system collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    /// Ticket identifier in the ticket system.
    pub id: RequestId,
    /// Subject line (may be empty).
    #[serde(default)]
    pub subject: String,
    /// Description/body (may be empty).
    #[serde(default)]
    pub body: String,
}

impl Ticket {
    /// Concatenates subject and body into an [`AnalysisRequest`].
    ///
    /// Empty parts are skipped so a ticket with only a subject does not gain a
    /// trailing separator.
    pub fn to_request(&self) -> AnalysisRequest {
        let parts: Vec<&str> = [self.subject.trim(), self.body.trim()]
            .into_iter()
            .filter(|p| !p.is_empty())
            .collect();
        AnalysisRequest::new(self.id.clone(), parts.join("\n\n"))
    }
}

// ---------------------------------------------------------------------------
// Sentiment
// ---------------------------------------------------------------------------

/// Overall emotional direction of the text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Polarity {
    Positive,
    Negative,
    Neutral,
    #[default]
    Unknown,
}

impl Polarity {
    /// Maps an already lower-cased, space-normalised label to a polarity.
    ///
    /// Anything unrecognised becomes [`Polarity::Unknown`].
    pub fn from_label(label: &str) -> Self {
        match label {
            "positive" => Polarity::Positive,
            "negative" => Polarity::Negative,
            "neutral" => Polarity::Neutral,
            _ => Polarity::Unknown,
        }
    }

    /// Returns the snake_case label.
    pub fn as_str(self) -> &'static str {
        match self {
            Polarity::Positive => "positive",
            Polarity::Negative => "negative",
            Polarity::Neutral => "neutral",
            Polarity::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for Polarity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether the text describes an impact on the customer's business.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessImpact {
    pub detected: bool,
    pub description: String,
}

/// Structured sentiment signals extracted from one text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentimentRecord {
    pub polarity: Polarity,
    pub urgency_level: Level,
    pub frustration_level: Level,
    pub technical_expertise: Level,
    pub business_impact: BusinessImpact,
    /// Ordered as the model listed them.
    pub key_phrases: Vec<String>,
    /// Deduplicated; order of first appearance is kept.
    pub emotions: Vec<String>,
}

impl Default for SentimentRecord {
    fn default() -> Self {
        Self {
            polarity: Polarity::Unknown,
            urgency_level: Level::MIN,
            frustration_level: Level::MIN,
            technical_expertise: Level::MID,
            business_impact: BusinessImpact::default(),
            key_phrases: Vec::new(),
            emotions: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Result
// ---------------------------------------------------------------------------

/// Outcome of analysing one [`AnalysisRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub request_id: RequestId,
    pub sentiment: SentimentRecord,
    pub category: String,
    pub component: String,
    pub priority_score: PriorityScore,
    pub confidence: Confidence,
    /// `Some` when the analysis failed; all other fields then hold defaults.
    pub error: Option<AnalysisFailure>,
}

impl AnalysisResult {
    /// A default-valued result carrying `failure`.
    pub fn failed(request_id: RequestId, failure: AnalysisFailure) -> Self {
        Self {
            request_id,
            sentiment: SentimentRecord::default(),
            category: DEFAULT_CATEGORY.to_string(),
            component: DEFAULT_COMPONENT.to_string(),
            priority_score: PriorityScore::LOWEST,
            confidence: Confidence::NONE,
            error: Some(failure),
        }
    }

    /// The result for a request with no content.
    pub fn empty_content(request_id: RequestId) -> Self {
        Self::failed(
            request_id,
            AnalysisFailure::new(ErrorKind::BadRequest, EMPTY_CONTENT_MESSAGE),
        )
    }

    /// Returns `true` if this result carries an error.
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Returns a copy re-addressed to `request_id`.
    ///
    /// Used when a cached result computed for one request is served to another
    /// request with the same fingerprint.
    pub fn for_request(&self, request_id: RequestId) -> Self {
        Self {
            request_id,
            ..self.clone()
        }
    }
}
