//! Core analysis domain for Pulse.
//!
//! This crate contains every domain concept, newtype identifier, value type,
//! and the error taxonomy used throughout the workspace, plus the pure stages
//! of the per-ticket analysis: prompt construction, response normalisation and
//! priority scoring. Infrastructure crates implement the traits defined here;
//! they never add domain rules.
//!
//! ## Architectural Layer
//!
//! **Business logic + port definitions.** This crate has no I/O dependencies.
//! It defines *what* is needed; infrastructure crates define *how* to supply it.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | Newtype identifiers (`RequestId`, `Fingerprint`, etc.) |
//! | [`types`] | Value types (`Level`, `PriorityScore`, `Confidence`, `ProviderId`, etc.) |
//! | [`errors`] | Error taxonomy and retry-policy types |
//! | [`analysis`] | Requests, sentiment records and results |
//! | [`config`] | Inbound analysis configuration |
//! | [`prompt`] | Prompt construction |
//! | [`normalize`] | Reply → [`AnalysisResult`] normalisation |
//! | [`scoring`] | Priority scoring |
//! | [`ports`] | Provider, ticket-source and repository traits |

pub mod analysis;
pub mod config;
pub mod errors;
pub mod identifiers;
pub mod normalize;
pub mod ports;
pub mod prompt;
pub mod scoring;
pub mod types;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use analysis::{
    AnalysisRequest, AnalysisResult, BusinessImpact, Polarity, SentimentRecord, Ticket,
    EMPTY_CONTENT_MESSAGE,
};
pub use config::{AnalysisConfig, CompletionOptions};
pub use errors::{AnalysisFailure, ErrorKind, ProviderError, PulseError, RetryPolicy};
pub use identifiers::{BatchRunId, Fingerprint, ModelName, RequestId};
pub use normalize::normalize;
pub use ports::{AnalysisRepository, CompletionProvider, CompletionRequest, TicketSource};
pub use prompt::build_prompt;
pub use scoring::score;
pub use types::{AnalysisMode, Confidence, Level, PriorityScore, ProviderId, Timestamp};
