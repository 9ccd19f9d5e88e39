//! Priority scoring.
//!
//! [`score`] maps a [`SentimentRecord`] to a 1–10 triage priority. It is pure
//! and total: the same record always yields the same priority and there is no
//! failure path.
//!
//! ## Formula
//!
//! | Factor | Weight | Contribution |
//! |--------|--------|--------------|
//! | urgency | 0.35 | `urgency_level` (1–5) |
//! | frustration | 0.30 | `frustration_level` (1–5) |
//! | business impact | 0.25 | 5 if detected, else 0 |
//! | technical expertise | 0.10 | `6 - technical_expertise` (inverted) |
//!
//! The weighted sum (at most 5.0) is doubled, rounded half-up to the nearest
//! integer and clamped to `[1, 10]`.
//!
//! Expertise is inverted so less-expert customers rank higher. This also lifts
//! trivial low-urgency inquiries from novices above some pressing reports from
//! expert users; that trade-off is a product decision and is kept as-is.

use crate::{PriorityScore, SentimentRecord};

// Weights expressed in hundredths so the arithmetic stays exact.
const URGENCY_WEIGHT: i64 = 35;
const FRUSTRATION_WEIGHT: i64 = 30;
const IMPACT_WEIGHT: i64 = 25;
const EXPERTISE_WEIGHT: i64 = 10;

const IMPACT_DETECTED_VALUE: i64 = 5;

/// Computes the 1–10 priority for `sentiment`.
pub fn score(sentiment: &SentimentRecord) -> PriorityScore {
    let urgency = i64::from(sentiment.urgency_level.get());
    let frustration = i64::from(sentiment.frustration_level.get());
    let impact = if sentiment.business_impact.detected {
        IMPACT_DETECTED_VALUE
    } else {
        0
    };
    let expertise_need = 6 - i64::from(sentiment.technical_expertise.get());

    let weighted_hundredths = URGENCY_WEIGHT * urgency
        + FRUSTRATION_WEIGHT * frustration
        + IMPACT_WEIGHT * impact
        + EXPERTISE_WEIGHT * expertise_need;

    // round(2 * weighted) with weighted = hundredths / 100, half rounds up.
    let doubled = (2 * weighted_hundredths + 50) / 100;
    PriorityScore::clamped(doubled)
}
