//! Prompt construction for sentiment analysis.
//!
//! Both modes ask for a single JSON object so the normaliser's first parse
//! strategy usually succeeds. [`AnalysisMode::Enhanced`] additionally asks for
//! a category, affected component, and a confidence value.

use crate::AnalysisMode;

/// Ticket text beyond this many characters is cut before prompting.
pub const MAX_PROMPT_TEXT_CHARS: usize = 12_000;

const SENTIMENT_SCHEMA: &str = r#"  "sentiment": {
    "polarity": "positive | negative | neutral",
    "urgency_level": 1-5,
    "frustration_level": 1-5,
    "technical_expertise": 1-5,
    "business_impact": {"detected": true | false, "description": "short text"},
    "key_phrases": ["phrase", "..."],
    "emotions": ["emotion", "..."]
  }"#;

const ENHANCED_FIELDS: &str = r#",
  "category": "hardware_issue | software_issue | billing | account | feature_request | general_inquiry | other",
  "component": "affected product area or system, or unknown",
  "confidence": 0.0-1.0"#;

/// Builds the provider prompt for analysing `text` in `mode`.
pub fn build_prompt(text: &str, mode: AnalysisMode) -> String {
    let ticket = truncate_chars(text.trim(), MAX_PROMPT_TEXT_CHARS);
    let extra = match mode {
        AnalysisMode::Basic => "",
        AnalysisMode::Enhanced => ENHANCED_FIELDS,
    };

    format!(
        "You are analysing a customer support ticket.\n\
         Rate urgency and frustration from 1 (lowest) to 5 (highest). Rate the \
         customer's technical expertise from 1 (novice) to 5 (expert). Report a \
         business impact only when the ticket describes lost revenue, blocked \
         operations, or affected customers.\n\n\
         Respond with ONLY a JSON object of this shape, no commentary:\n\
         {{\n{SENTIMENT_SCHEMA}{extra}\n}}\n\n\
         Ticket:\n\"\"\"\n{ticket}\n\"\"\""
    )
}

/// Returns at most `max` characters of `text`, cut on a char boundary.
fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_prompt_omits_category() {
        let prompt = build_prompt("My invoice is wrong", AnalysisMode::Basic);
        assert!(prompt.contains("My invoice is wrong"));
        assert!(prompt.contains("\"polarity\""));
        assert!(!prompt.contains("\"category\""));
    }

    #[test]
    fn test_enhanced_prompt_requests_category_and_confidence() {
        let prompt = build_prompt("Server crashed", AnalysisMode::Enhanced);
        assert!(prompt.contains("\"category\""));
        assert!(prompt.contains("\"component\""));
        assert!(prompt.contains("\"confidence\""));
    }

    #[test]
    fn test_long_text_truncated_on_char_boundary() {
        let text = "é".repeat(MAX_PROMPT_TEXT_CHARS + 50);
        let prompt = build_prompt(&text, AnalysisMode::Basic);
        assert_eq!(prompt.matches('é').count(), MAX_PROMPT_TEXT_CHARS);
    }
}
