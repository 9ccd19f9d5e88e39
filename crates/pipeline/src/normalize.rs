//! Response normalisation.
//!
//! Model output is not contractually structured. [`normalize`] turns whatever
//! text came back into a well-shaped [`AnalysisResult`] and never fails:
//!
//! 1. parse the whole reply as a JSON document;
//! 2. otherwise parse the first fenced code block that holds an object;
//! 3. otherwise parse the first balanced `{ ... }` embedded in prose that
//!    holds an object, skipping brace spans that are not JSON;
//! 4. otherwise return a default-valued result carrying
//!    [`ErrorKind::UnparseableResponse`] and a snippet of the raw text.
//!
//! Every field read from the parsed document is coerced leniently: labels
//! are lower-cased and whitespace-collapsed, numbers are clamped, one-element
//! lists are unwrapped, delimited strings are split, and anything of the
//! wrong shape falls back to its default. Nothing past this module sees an
//! untyped value.
//!
//! The returned result's `priority_score` is left at its default; scoring is
//! the next pipeline stage.

use serde_json::{Map, Value};

use crate::analysis::{DEFAULT_CATEGORY, DEFAULT_COMPONENT};
use crate::{
    AnalysisFailure, AnalysisMode, AnalysisResult, BusinessImpact, Confidence, ErrorKind, Level,
    Polarity, PriorityScore, RequestId, SentimentRecord,
};

/// Longest raw-text excerpt kept in an unparseable-response message.
const SNIPPET_CHARS: usize = 200;

const LIST_DELIMITERS: &[char] = &[',', ';', '|', '\n'];

/// Normalises a raw provider reply into an [`AnalysisResult`] for `request_id`.
///
/// In [`AnalysisMode::Basic`] only the sentiment and confidence are read;
/// `category` and `component` keep their defaults.
pub fn normalize(raw: &str, mode: AnalysisMode, request_id: RequestId) -> AnalysisResult {
    let Some(document) = parse_document(raw) else {
        tracing::debug!(request_id = %request_id, raw_len = raw.len(), "Reply did not contain a JSON object");
        return AnalysisResult::failed(
            request_id,
            AnalysisFailure::new(ErrorKind::UnparseableResponse, unparseable_message(raw)),
        );
    };

    let sentiment_source = match document.get("sentiment") {
        Some(Value::Object(inner)) => inner,
        _ => &document,
    };
    let sentiment = read_sentiment(sentiment_source, &document);

    let (category, component) = match mode {
        AnalysisMode::Basic => (DEFAULT_CATEGORY.to_string(), DEFAULT_COMPONENT.to_string()),
        AnalysisMode::Enhanced => (
            lookup(&document, sentiment_source, &["category"])
                .and_then(as_label)
                .unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
            lookup(&document, sentiment_source, &["component"])
                .and_then(as_label)
                .unwrap_or_else(|| DEFAULT_COMPONENT.to_string()),
        ),
    };

    let confidence = lookup(&document, sentiment_source, &["confidence", "confidence_score"])
        .and_then(as_confidence)
        .unwrap_or(Confidence::NONE);

    AnalysisResult {
        request_id,
        sentiment,
        category,
        component,
        priority_score: PriorityScore::LOWEST,
        confidence,
        error: None,
    }
}

// ---------------------------------------------------------------------------
// Document extraction
// ---------------------------------------------------------------------------

/// Finds a JSON object in `raw` using the strategies in module order.
fn parse_document(raw: &str) -> Option<Map<String, Value>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Some(object) = parse_object(trimmed) {
        return Some(object);
    }

    if let Some(object) = fenced_blocks(trimmed).find_map(parse_object) {
        return Some(object);
    }

    embedded_objects(trimmed).find_map(parse_object)
}

/// Parses `text` as an object, or as a one-element array holding an object.
fn parse_object(text: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(text.trim()).ok()? {
        Value::Object(map) => Some(map),
        Value::Array(mut items) if items.len() == 1 => match items.pop() {
            Some(Value::Object(map)) => Some(map),
            _ => None,
        },
        _ => None,
    }
}

/// Yields the contents of each ```` ``` ```` fenced block, language tag removed.
fn fenced_blocks(text: &str) -> impl Iterator<Item = &str> {
    let mut rest = text;
    std::iter::from_fn(move || {
        let open = rest.find("```")?;
        let after_open = &rest[open + 3..];
        // The info string (e.g. `json`) runs to the end of the opening line,
        // unless the block closes on that same line.
        let body_start = match (after_open.find('\n'), after_open.find("```")) {
            (Some(nl), Some(fence)) if nl < fence => nl + 1,
            (Some(nl), None) => nl + 1,
            _ => 0,
        };
        let body = &after_open[body_start..];
        let Some(close) = body.find("```") else {
            rest = "";
            return None;
        };
        rest = &body[close + 3..];
        Some(body[..close].trim())
    })
}

/// Yields the balanced `{ ... }` span starting at each `{` in `text`, in
/// order, honouring strings. Prose such as `use the {field} format` yields a
/// span that fails to parse, and the scan moves on to the next brace.
fn embedded_objects(text: &str) -> impl Iterator<Item = &str> {
    text.match_indices('{')
        .filter_map(move |(start, _)| balanced_span(&text[start..]))
}

/// Returns the prefix of `candidate` (which starts with `{`) up to its
/// matching `}`.
fn balanced_span(candidate: &str) -> Option<&str> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape = false;

    for (i, ch) in candidate.char_indices() {
        if escape {
            escape = false;
            continue;
        }
        match ch {
            '\\' if in_string => escape = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(&candidate[..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

fn unparseable_message(raw: &str) -> String {
    let collapsed = collapse_whitespace(raw);
    if collapsed.is_empty() {
        return "Unparseable response: empty reply".to_string();
    }
    let snippet: String = collapsed.chars().take(SNIPPET_CHARS).collect();
    if snippet.len() < collapsed.len() {
        format!("Unparseable response: {snippet}...")
    } else {
        format!("Unparseable response: {snippet}")
    }
}

// ---------------------------------------------------------------------------
// Field readers
// ---------------------------------------------------------------------------

fn read_sentiment(source: &Map<String, Value>, document: &Map<String, Value>) -> SentimentRecord {
    let defaults = SentimentRecord::default();

    let polarity = source
        .get("polarity")
        .or_else(|| source.get("overall"))
        .or_else(|| match document.get("sentiment") {
            // `"sentiment": "negative"` with the other fields flat beside it.
            Some(label @ Value::String(_)) => Some(label),
            _ => None,
        })
        .and_then(as_label)
        .map(|label| Polarity::from_label(&label))
        .unwrap_or(defaults.polarity);

    let level = |keys: &[&str], default: Level| {
        keys.iter()
            .find_map(|key| source.get(*key))
            .and_then(as_level)
            .unwrap_or(default)
    };

    SentimentRecord {
        polarity,
        urgency_level: level(&["urgency_level", "urgency"], defaults.urgency_level),
        frustration_level: level(&["frustration_level", "frustration"], defaults.frustration_level),
        technical_expertise: level(
            &["technical_expertise", "expertise_level", "expertise"],
            defaults.technical_expertise,
        ),
        business_impact: source
            .get("business_impact")
            .map(as_business_impact)
            .unwrap_or_default(),
        key_phrases: source.get("key_phrases").map(as_list).unwrap_or_default(),
        emotions: source
            .get("emotions")
            .map(|v| dedup(as_list(v)))
            .unwrap_or_default(),
    }
}

/// Looks a key up at the document root first, then in the sentiment object.
fn lookup<'a>(
    document: &'a Map<String, Value>,
    sentiment: &'a Map<String, Value>,
    keys: &[&str],
) -> Option<&'a Value> {
    keys.iter()
        .find_map(|key| document.get(*key).or_else(|| sentiment.get(*key)))
}

fn unwrap_single(value: &Value) -> &Value {
    match value {
        Value::Array(items) if items.len() == 1 => &items[0],
        other => other,
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Lower-cased, whitespace-collapsed label. Empty strings count as missing.
fn as_label(value: &Value) -> Option<String> {
    match unwrap_single(value) {
        Value::String(s) => {
            let label = collapse_whitespace(s).to_lowercase();
            (!label.is_empty()).then_some(label)
        }
        _ => None,
    }
}

fn as_level(value: &Value) -> Option<Level> {
    match unwrap_single(value) {
        Value::Number(n) => n.as_f64().filter(|f| f.is_finite()).map(|f| Level::clamped(f.round() as i64)),
        Value::String(s) => {
            let label = collapse_whitespace(s).to_lowercase().replace(['-', '_'], " ");
            if let Ok(f) = label.parse::<f64>() {
                return f.is_finite().then(|| Level::clamped(f.round() as i64));
            }
            // "4/5" style ratings.
            if let Some((num, _)) = label.split_once('/') {
                if let Ok(f) = num.trim().parse::<f64>() {
                    return f.is_finite().then(|| Level::clamped(f.round() as i64));
                }
            }
            match label.as_str() {
                "very low" | "minimal" | "none" => Some(Level::clamped(1)),
                "low" => Some(Level::clamped(2)),
                "medium" | "moderate" => Some(Level::clamped(3)),
                "high" => Some(Level::clamped(4)),
                "very high" | "critical" | "severe" => Some(Level::clamped(5)),
                _ => None,
            }
        }
        _ => None,
    }
}

fn as_bool(value: &Value) -> Option<bool> {
    match unwrap_single(value) {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|f| f != 0.0),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" | "y" | "detected" => Some(true),
            "false" | "no" | "n" | "none" | "" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn as_business_impact(value: &Value) -> BusinessImpact {
    match unwrap_single(value) {
        Value::Object(map) => BusinessImpact {
            detected: map.get("detected").and_then(as_bool).unwrap_or(false),
            description: match map.get("description").map(unwrap_single) {
                Some(Value::String(s)) => collapse_whitespace(s),
                _ => String::new(),
            },
        },
        Value::String(s) => match as_bool(value) {
            Some(detected) => BusinessImpact {
                detected,
                description: String::new(),
            },
            // A free-text description implies an impact was found.
            None => BusinessImpact {
                detected: true,
                description: collapse_whitespace(s),
            },
        },
        other => BusinessImpact {
            detected: as_bool(other).unwrap_or(false),
            description: String::new(),
        },
    }
}

fn as_list(value: &Value) -> Vec<String> {
    let items: Vec<String> = match value {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .collect(),
        Value::String(s) => s.split(LIST_DELIMITERS).map(str::to_string).collect(),
        _ => Vec::new(),
    };

    items
        .iter()
        .map(|item| collapse_whitespace(item).to_lowercase())
        .filter(|item| !item.is_empty())
        .collect()
}

fn dedup(items: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    items.into_iter().filter(|item| seen.insert(item.clone())).collect()
}

fn as_confidence(value: &Value) -> Option<Confidence> {
    let from_number = |f: f64| {
        if !f.is_finite() {
            return None;
        }
        // 1 < f <= 100 is read as a percentage.
        let f = if f > 1.0 && f <= 100.0 { f / 100.0 } else { f };
        Some(Confidence::clamped(f))
    };

    match unwrap_single(value) {
        Value::Number(n) => n.as_f64().and_then(from_number),
        Value::String(s) => {
            let label = collapse_whitespace(s).to_lowercase().replace(['-', '_'], " ");
            if let Ok(f) = label.trim_end_matches('%').trim().parse::<f64>() {
                return from_number(f);
            }
            match label.as_str() {
                "very high" => Some(Confidence::clamped(0.95)),
                "high" => Some(Confidence::clamped(0.85)),
                "medium" | "moderate" => Some(Confidence::clamped(0.6)),
                "low" => Some(Confidence::clamped(0.35)),
                "very low" => Some(Confidence::clamped(0.15)),
                _ => None,
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rid() -> RequestId {
        RequestId::new("T-1").unwrap()
    }

    fn enhanced(raw: &str) -> AnalysisResult {
        normalize(raw, AnalysisMode::Enhanced, rid())
    }

    #[test]
    fn test_fenced_json_is_stripped_and_lowercased() {
        let result = enhanced("```json\n{\"sentiment\":{\"polarity\":\"Negative\"}}\n```");
        assert!(result.error.is_none());
        assert_eq!(result.sentiment.polarity, Polarity::Negative);
    }

    #[test]
    fn test_direct_json_full_shape() {
        let raw = r#"{
            "sentiment": {
                "polarity": "  NEGATIVE ",
                "urgency_level": 4,
                "frustration_level": 5,
                "technical_expertise": 2,
                "business_impact": {"detected": true, "description": "Checkout   is down"},
                "key_phrases": ["Cannot Pay", "since  yesterday"],
                "emotions": ["Angry", "angry", "worried"]
            },
            "category": "Billing  Issue",
            "component": "Payments",
            "confidence": 0.9
        }"#;
        let result = enhanced(raw);
        assert!(result.error.is_none());
        let s = &result.sentiment;
        assert_eq!(s.polarity, Polarity::Negative);
        assert_eq!(s.urgency_level.get(), 4);
        assert_eq!(s.frustration_level.get(), 5);
        assert_eq!(s.technical_expertise.get(), 2);
        assert!(s.business_impact.detected);
        assert_eq!(s.business_impact.description, "Checkout is down");
        assert_eq!(s.key_phrases, vec!["cannot pay", "since yesterday"]);
        assert_eq!(s.emotions, vec!["angry", "worried"]);
        assert_eq!(result.category, "billing issue");
        assert_eq!(result.component, "payments");
        assert!((result.confidence.as_f64() - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_never_fails_on_garbage() {
        for raw in ["", "   ", "not json at all", "{broken", "```\nnope\n```", "[1,2,3]", "null", "\"text\""] {
            let result = enhanced(raw);
            let failure = result.error.as_ref().expect("degraded result expected");
            assert_eq!(failure.kind, ErrorKind::UnparseableResponse, "input {raw:?}");
            assert_eq!(result.sentiment.polarity, Polarity::Unknown);
            assert_eq!(result.priority_score.get(), 1);
        }
    }

    #[test]
    fn test_unparseable_message_carries_snippet() {
        let result = enhanced("I'm sorry,   I cannot help with that.");
        assert_eq!(
            result.error.unwrap().message,
            "Unparseable response: I'm sorry, I cannot help with that."
        );
    }

    #[test]
    fn test_json_embedded_in_prose() {
        let raw = "Here is my analysis: {\"polarity\": \"positive\", \"note\": \"a } inside\"} hope it helps";
        let result = enhanced(raw);
        assert!(result.error.is_none());
        assert_eq!(result.sentiment.polarity, Polarity::Positive);
    }

    #[test]
    fn test_prose_braces_before_the_json_are_skipped() {
        let raw = "Using the {field} format you asked for: \
                   {\"sentiment\": {\"polarity\": \"negative\", \"urgency_level\": 5}}";
        let result = enhanced(raw);
        assert!(result.error.is_none(), "{:?}", result.error);
        assert_eq!(result.sentiment.polarity, Polarity::Negative);
        assert_eq!(result.sentiment.urgency_level.get(), 5);
    }

    #[test]
    fn test_second_fence_used_when_first_is_not_an_object() {
        let raw = "```text\nsummary\n```\nand\n```json\n{\"polarity\":\"neutral\"}\n```";
        assert_eq!(enhanced(raw).sentiment.polarity, Polarity::Neutral);
    }

    #[test]
    fn test_levels_are_clamped_and_coerced() {
        let raw = r#"{"urgency_level": 17, "frustration_level": ["2"], "technical_expertise": "very high"}"#;
        let s = enhanced(raw).sentiment;
        assert_eq!(s.urgency_level.get(), 5);
        assert_eq!(s.frustration_level.get(), 2);
        assert_eq!(s.technical_expertise.get(), 5);

        let raw = r#"{"urgency_level": -3, "frustration_level": "4/5", "technical_expertise": {"x": 1}}"#;
        let s = enhanced(raw).sentiment;
        assert_eq!(s.urgency_level.get(), 1);
        assert_eq!(s.frustration_level.get(), 4);
        assert_eq!(s.technical_expertise, Level::MID);
    }

    #[test]
    fn test_delimited_strings_become_lists() {
        let raw = r#"{"key_phrases": "refund, double charge; urgent", "emotions": "Annoyed"}"#;
        let s = enhanced(raw).sentiment;
        assert_eq!(s.key_phrases, vec!["refund", "double charge", "urgent"]);
        assert_eq!(s.emotions, vec!["annoyed"]);
    }

    #[test]
    fn test_business_impact_shapes() {
        let s = enhanced(r#"{"business_impact": true}"#).sentiment;
        assert!(s.business_impact.detected);

        let s = enhanced(r#"{"business_impact": "no"}"#).sentiment;
        assert!(!s.business_impact.detected);

        let s = enhanced(r#"{"business_impact": "Orders cannot ship"}"#).sentiment;
        assert!(s.business_impact.detected);
        assert_eq!(s.business_impact.description, "Orders cannot ship");

        let s = enhanced(r#"{"business_impact": 12}"#).sentiment;
        assert!(s.business_impact.detected);
    }

    #[test]
    fn test_qualitative_confidence_labels() {
        let cases = [
            ("\"high\"", 0.85),
            ("\"Very-High\"", 0.95),
            ("\"medium\"", 0.6),
            ("\"low\"", 0.35),
            ("\"very_low\"", 0.15),
            ("85", 0.85),
            ("\"70%\"", 0.7),
            ("-2", 0.0),
            ("\"unsure\"", 0.0),
        ];
        for (json, expected) in cases {
            let result = enhanced(&format!("{{\"confidence\": {json}}}"));
            assert!((result.confidence.as_f64() - expected).abs() < 1e-9, "{json}");
        }
    }

    #[test]
    fn test_flat_document_with_sentiment_label() {
        let raw = r#"{"sentiment": "Negative", "urgency": 5, "category": ["outage"]}"#;
        let result = enhanced(raw);
        assert_eq!(result.sentiment.polarity, Polarity::Negative);
        assert_eq!(result.sentiment.urgency_level.get(), 5);
        assert_eq!(result.category, "outage");
    }

    #[test]
    fn test_unknown_polarity_label() {
        let result = enhanced(r#"{"polarity": "mixed"}"#);
        assert_eq!(result.sentiment.polarity, Polarity::Unknown);
        assert!(result.error.is_none());
    }

    #[test]
    fn test_basic_mode_ignores_category_and_component() {
        let raw = r#"{"polarity": "negative", "category": "billing", "component": "api", "confidence": "high"}"#;
        let result = normalize(raw, AnalysisMode::Basic, rid());
        assert_eq!(result.category, DEFAULT_CATEGORY);
        assert_eq!(result.component, DEFAULT_COMPONENT);
        assert!((result.confidence.as_f64() - 0.85).abs() < 1e-9);
    }

    #[test]
    fn test_single_element_array_document() {
        let result = enhanced(r#"[{"polarity": "positive"}]"#);
        assert_eq!(result.sentiment.polarity, Polarity::Positive);
    }
}
