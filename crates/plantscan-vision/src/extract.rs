//! Turn raw model text into a `PlantAssessment`
//!
//! Strategies run in a fixed order and the first success wins:
//! 1. error sentinel: transport failure text short-circuits to an "API Error" record
//! 2. fenced code block (```json first, then any fence holding an object)
//! 3. outer brace span, first `{` to last `}`
//! 4. repair (control characters, trailing commas) applied to each candidate from 2 and 3
//! 5. fallback "Parsing error" record
//!
//! Pure text-in, record-out. Nothing here touches the network.

use crate::ai::transport::{is_error_sentinel, TransportResult};
use plantscan_types::{excerpt, NativeAlternative, PlantAssessment, UNKNOWN_REGION};
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::LazyLock;
use tracing::{debug, warn};

static FENCED_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```[ \t]*([A-Za-z0-9_-]*)[ \t]*\r?\n?(.*?)```").expect("fenced block pattern")
});

/// Keys that mark an object as an assessment rather than arbitrary JSON
const ASSESSMENT_KEYS: &[&str] = &[
    "specieIdentified",
    "speciesIdentified",
    "nativeRegion",
    "invasiveOrNot",
    "invasiveEffects",
    "nativeAlternatives",
    "removeInstructions",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    ErrorSentinel,
    FencedBlock,
    BraceSpan,
    /// Repair pass over a fenced-block or brace-span candidate
    Repair,
    Fallback,
}

/// One step of the cascade, kept for diagnosis
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionAttempt {
    pub strategy: Strategy,
    pub succeeded: bool,
    pub detail: String,
}

impl ExtractionAttempt {
    fn ok(strategy: Strategy, detail: impl Into<String>) -> Self {
        Self {
            strategy,
            succeeded: true,
            detail: detail.into(),
        }
    }

    fn failed(strategy: Strategy, detail: impl Into<String>) -> Self {
        Self {
            strategy,
            succeeded: false,
            detail: detail.into(),
        }
    }
}

/// Extracted record plus the ordered attempt log
#[derive(Debug, Clone)]
pub struct Extraction {
    pub assessment: PlantAssessment,
    pub attempts: Vec<ExtractionAttempt>,
}

impl Extraction {
    /// Strategy that produced the record
    pub fn winning_strategy(&self) -> Option<Strategy> {
        self.attempts.iter().rev().find(|a| a.succeeded).map(|a| a.strategy)
    }
}

/// Extract an assessment from raw model text
pub fn extract_assessment(raw: &str) -> PlantAssessment {
    extract_with_log(raw).assessment
}

/// Build the assessment for a transport outcome.
///
/// Transport errors become "API Error" records without any parsing.
pub fn assessment_from_outcome(outcome: &TransportResult) -> PlantAssessment {
    match outcome {
        Ok(text) => extract_assessment(text),
        Err(err) => {
            debug!(kind = ?err.kind, "transport failure folded into assessment");
            PlantAssessment::api_error(&err.to_string())
        }
    }
}

/// Run the full cascade, recording every attempt
pub fn extract_with_log(raw: &str) -> Extraction {
    let mut attempts = Vec::new();

    if is_error_sentinel(raw) {
        attempts.push(ExtractionAttempt::ok(Strategy::ErrorSentinel, excerpt(raw.trim(), 80)));
        return finish(PlantAssessment::api_error(raw), attempts);
    }
    attempts.push(ExtractionAttempt::failed(Strategy::ErrorSentinel, "not a transport error"));

    let mut last_error = String::from("no JSON object found");

    // Fenced blocks: json-tagged first, then untagged blocks that hold an object
    let blocks = fenced_candidates(raw);
    if blocks.is_empty() {
        attempts.push(ExtractionAttempt::failed(Strategy::FencedBlock, "no fenced block"));
    }
    for block in &blocks {
        match parse_candidate(block, Strategy::FencedBlock, &mut attempts) {
            Ok(assessment) => return finish(assessment, attempts),
            Err(e) => last_error = e,
        }
    }

    match brace_span(raw) {
        Some(span) => match parse_candidate(span, Strategy::BraceSpan, &mut attempts) {
            Ok(assessment) => return finish(assessment, attempts),
            Err(e) => last_error = e,
        },
        None => attempts.push(ExtractionAttempt::failed(Strategy::BraceSpan, "no {...} span")),
    }

    warn!(reason = %last_error, "model response could not be parsed, returning fallback");
    attempts.push(ExtractionAttempt::ok(Strategy::Fallback, last_error.clone()));
    finish(PlantAssessment::parsing_error(raw, &last_error), attempts)
}

fn finish(assessment: PlantAssessment, attempts: Vec<ExtractionAttempt>) -> Extraction {
    debug!(?attempts, "extraction attempts");
    Extraction {
        assessment,
        attempts,
    }
}

/// Parse one candidate, retrying once after repair
fn parse_candidate(
    candidate: &str,
    strategy: Strategy,
    attempts: &mut Vec<ExtractionAttempt>,
) -> Result<PlantAssessment, String> {
    let first_error = match parse_assessment(candidate) {
        Ok(assessment) => {
            attempts.push(ExtractionAttempt::ok(strategy, "parsed"));
            return Ok(assessment);
        }
        Err(e) => e,
    };
    attempts.push(ExtractionAttempt::failed(strategy, first_error.clone()));

    let repaired = repair_json(candidate);
    if repaired == candidate {
        return Err(first_error);
    }
    match parse_assessment(&repaired) {
        Ok(assessment) => {
            attempts.push(ExtractionAttempt::ok(Strategy::Repair, format!("{:?} candidate", strategy)));
            Ok(assessment)
        }
        Err(e) => {
            attempts.push(ExtractionAttempt::failed(Strategy::Repair, e.clone()));
            Err(e)
        }
    }
}

fn parse_assessment(candidate: &str) -> Result<PlantAssessment, String> {
    let value: Value = serde_json::from_str(candidate.trim()).map_err(|e| e.to_string())?;
    coerce_assessment(&value)
}

/// Fenced block interiors worth parsing, json-tagged blocks first
fn fenced_candidates(raw: &str) -> Vec<&str> {
    let mut tagged = Vec::new();
    let mut untagged = Vec::new();
    for caps in FENCED_BLOCK.captures_iter(raw) {
        let tag = caps.get(1).map(|m| m.as_str()).unwrap_or("");
        let body = match caps.get(2) {
            Some(m) => m.as_str().trim(),
            None => continue,
        };
        if tag.eq_ignore_ascii_case("json") {
            tagged.push(body);
        } else if body.starts_with('{') {
            untagged.push(body);
        }
    }
    tagged.extend(untagged);
    tagged
}

/// Substring from the first `{` to the last `}`
fn brace_span(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (start < end).then(|| &raw[start..=end])
}

/// Strip control characters and trailing commas before `}` or `]`.
///
/// Tab, CR and LF become spaces so words on either side stay apart; every
/// other C0/C1 control character is dropped.
pub fn repair_json(candidate: &str) -> String {
    let cleaned: String = candidate
        .chars()
        .filter_map(|c| match c {
            '\t' | '\n' | '\r' => Some(' '),
            '\u{00}'..='\u{1F}' | '\u{7F}'..='\u{9F}' => None,
            _ => Some(c),
        })
        .collect();
    strip_trailing_commas(&cleaned)
}

/// Drop commas followed only by whitespace and a closing `}` or `]`.
/// Commas inside string literals are left alone.
fn strip_trailing_commas(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;

    for (i, &c) in chars.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
        } else if c == '"' {
            in_string = true;
        } else if c == ',' {
            let next = chars[i + 1..].iter().find(|n| !n.is_whitespace());
            if matches!(next, Some('}') | Some(']')) {
                continue;
            }
        }
        out.push(c);
    }
    out
}

// ============================================================================
// Coercion into the typed record
// ============================================================================

/// Coerce a parsed JSON value into a fully typed assessment.
///
/// Fails when the value is not an object or carries none of the assessment
/// fields. Missing fields take their defaults; wrong-typed fields are
/// converted where the intent is clear.
pub fn coerce_assessment(value: &Value) -> Result<PlantAssessment, String> {
    let obj = value
        .as_object()
        .ok_or_else(|| format!("expected a JSON object, found {}", json_kind(value)))?;

    if !ASSESSMENT_KEYS.iter().any(|k| obj.contains_key(*k)) {
        return Err("JSON object has none of the assessment fields".to_string());
    }

    let species_identified = ["specieIdentified", "speciesIdentified", "species"]
        .iter()
        .find_map(|k| as_text(obj.get(*k)))
        .filter(|s| !s.trim().is_empty());

    let native_region = as_text(obj.get("nativeRegion"))
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| UNKNOWN_REGION.to_string());

    Ok(PlantAssessment {
        species_identified,
        native_region,
        invasive_or_not: as_bool(obj.get("invasiveOrNot")),
        confidence_score: as_score(obj.get("confidenceScore")),
        confidence_reasoning: as_text(obj.get("confidenceReasoning")),
        invasive_effects: as_text(obj.get("invasiveEffects")).unwrap_or_default(),
        native_alternatives: as_alternatives(obj.get("nativeAlternatives")),
        remove_instructions: as_text(obj.get("removeInstructions")).unwrap_or_default(),
    })
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn as_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(|v| as_text(Some(v)))
                .collect::<Vec<_>>()
                .join("\n"),
        ),
        other @ Value::Object(_) => Some(other.to_string()),
    }
}

fn as_bool(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "true" | "yes" | "invasive"
        ),
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        _ => false,
    }
}

fn as_score(value: Option<&Value>) -> Option<f64> {
    let score = match value? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().trim_end_matches('%').trim().parse::<f64>().ok()?,
        _ => return None,
    };
    score.is_finite().then(|| score.clamp(0.0, 100.0))
}

fn as_alternatives(value: Option<&Value>) -> Vec<NativeAlternative> {
    let items = match value {
        Some(Value::Array(items)) => items,
        _ => return Vec::new(),
    };
    items
        .iter()
        .filter_map(|item| match item {
            Value::Object(obj) => Some(alternative_from_object(obj)),
            Value::String(name) if !name.trim().is_empty() => Some(NativeAlternative {
                common_name: name.clone(),
                ..Default::default()
            }),
            _ => None,
        })
        .collect()
}

fn alternative_from_object(obj: &Map<String, Value>) -> NativeAlternative {
    let field = |keys: &[&str]| {
        keys.iter()
            .find_map(|k| as_text(obj.get(*k)))
            .unwrap_or_default()
    };
    NativeAlternative {
        common_name: field(&["commonName", "common_name", "name"]),
        scientific_name: field(&["scientificName", "scientific_name"]),
        characteristics: field(&["characteristics", "description"]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::transport::{TransportError, TransportErrorKind};
    use plantscan_types::{SPECIES_API_ERROR, SPECIES_PARSING_ERROR};
    use std::time::Duration;

    const KUDZU: &str = r#"{"specieIdentified":"Kudzu","nativeRegion":"East Asia","invasiveOrNot":true,"invasiveEffects":"smothers trees","nativeAlternatives":[],"removeInstructions":"cut and treat stump"}"#;

    #[test]
    fn test_fenced_json_block() {
        let raw = format!("```json\n{}\n```", KUDZU);
        let extraction = extract_with_log(&raw);
        let a = &extraction.assessment;

        assert_eq!(extraction.winning_strategy(), Some(Strategy::FencedBlock));
        assert_eq!(a.species_identified.as_deref(), Some("Kudzu"));
        assert_eq!(a.native_region, "East Asia");
        assert!(a.invasive_or_not);
        assert_eq!(a.invasive_effects, "smothers trees");
        assert!(a.native_alternatives.is_empty());
        assert_eq!(a.remove_instructions, "cut and treat stump");
        assert_eq!(a.confidence_score, None);
    }

    #[test]
    fn test_thinking_block_then_json_block() {
        let raw = format!(
            "```\nI will identify the plant as kudzu {{based on leaves}}.\n```\n\n```json\n{}\n```",
            KUDZU
        );
        let a = extract_assessment(&raw);
        assert_eq!(a.species_identified.as_deref(), Some("Kudzu"));
    }

    #[test]
    fn test_untagged_fence_holding_object() {
        let raw = format!("Here you go:\n```\n{}\n```", KUDZU);
        assert_eq!(extract_with_log(&raw).winning_strategy(), Some(Strategy::FencedBlock));
    }

    #[test]
    fn test_brace_span_with_prose() {
        let raw = format!("Sure! Here is the analysis: {} Let me know if you need more.", KUDZU);
        let extraction = extract_with_log(&raw);
        assert_eq!(extraction.winning_strategy(), Some(Strategy::BraceSpan));

        let direct = coerce_assessment(&serde_json::from_str(KUDZU).unwrap()).unwrap();
        assert_eq!(extraction.assessment, direct);
    }

    #[test]
    fn test_trailing_comma_repaired_in_fence() {
        let raw = "```json\n{\"specieIdentified\": \"Oak\", \"nativeRegion\": \"N. America\", \"invasiveOrNot\": false,}\n```";
        let extraction = extract_with_log(raw);
        assert_eq!(extraction.winning_strategy(), Some(Strategy::Repair));
        assert_eq!(extraction.assessment.species_identified.as_deref(), Some("Oak"));
        assert_eq!(extraction.assessment.native_region, "N. America");
        assert!(!extraction.assessment.invasive_or_not);
    }

    #[test]
    fn test_trailing_comma_in_array_and_brace_span() {
        let raw = r#"Result: {"specieIdentified": "Privet", "invasiveOrNot": true, "nativeAlternatives": [{"commonName": "Yaupon",},],}"#;
        assert!(serde_json::from_str::<Value>(&raw[8..]).is_err());
        let a = extract_assessment(raw);
        assert_eq!(a.species_identified.as_deref(), Some("Privet"));
        assert_eq!(a.native_alternatives.len(), 1);
        assert_eq!(a.native_alternatives[0].common_name, "Yaupon");
    }

    #[test]
    fn test_control_characters_repaired() {
        let raw = "{\"specieIdentified\": \"Japanese\u{0007} Knotweed\", \"invasiveEffects\": \"line one\nline two\", \"invasiveOrNot\": true}";
        let a = extract_assessment(raw);
        assert_eq!(a.species_identified.as_deref(), Some("Japanese Knotweed"));
        assert_eq!(a.invasive_effects, "line one line two");
    }

    #[test]
    fn test_no_braces_falls_back() {
        let extraction = extract_with_log("I cannot help with that.");
        let a = &extraction.assessment;
        assert_eq!(a.species_identified.as_deref(), Some(SPECIES_PARSING_ERROR));
        assert_eq!(a.native_region, UNKNOWN_REGION);
        assert!(!a.invasive_or_not);
        assert!(a.invasive_effects.contains("I cannot help with that."));
        assert_eq!(extraction.winning_strategy(), Some(Strategy::Fallback));
    }

    #[test]
    fn test_unrepairable_json_falls_back_with_parser_message() {
        let a = extract_assessment("{\"specieIdentified\": \"Oak\" \"nativeRegion\": }");
        assert_eq!(a.species_identified.as_deref(), Some(SPECIES_PARSING_ERROR));
        assert!(a.invasive_effects.contains("expected"));
    }

    #[test]
    fn test_empty_input_falls_back() {
        let a = extract_assessment("");
        assert_eq!(a.species_identified.as_deref(), Some(SPECIES_PARSING_ERROR));
    }

    #[test]
    fn test_unrelated_object_falls_back() {
        let a = extract_assessment("{\"test\": 123}");
        assert_eq!(a.species_identified.as_deref(), Some(SPECIES_PARSING_ERROR));
    }

    #[test]
    fn test_error_sentinel_short_circuits() {
        let raw = format!("HTTP Error: 500\nResponse Content: {{\"specieIdentified\": \"Oak\"}} {}", "x".repeat(400));
        let extraction = extract_with_log(&raw);
        let a = &extraction.assessment;

        assert_eq!(a.species_identified.as_deref(), Some(SPECIES_API_ERROR));
        assert!(a.invasive_effects.contains("HTTP Error: 500"));
        assert!(a.invasive_effects.chars().count() < 350);
        assert_eq!(extraction.attempts.len(), 1);
        assert_eq!(extraction.attempts[0].strategy, Strategy::ErrorSentinel);
    }

    #[test]
    fn test_timeout_sentinel_short_circuits() {
        let raw = TransportError::timeout(Duration::from_secs(90)).to_string();
        assert_eq!(extract_assessment(&raw).species_identified.as_deref(), Some(SPECIES_API_ERROR));
    }

    #[test]
    fn test_outcome_error_skips_parsing() {
        let outcome: TransportResult = Err(TransportError::new(TransportErrorKind::Blocked, "SAFETY"));
        let a = assessment_from_outcome(&outcome);
        assert_eq!(a.species_identified.as_deref(), Some(SPECIES_API_ERROR));
        assert!(a.invasive_effects.contains("blocked by safety settings"));

        let outcome: TransportResult = Ok(KUDZU.to_string());
        assert_eq!(assessment_from_outcome(&outcome).species_identified.as_deref(), Some("Kudzu"));
    }

    #[test]
    fn test_fallback_round_trip_is_stable() {
        for raw in ["I cannot help with that.", "```json\n{bad\n```", "HTTP Error: 503"] {
            let first = extract_assessment(raw);
            let serialized = serde_json::to_string(&first).unwrap();
            let second = extract_assessment(&serialized);
            assert_eq!(first, second, "unstable for {raw:?}");
        }
    }

    #[test]
    fn test_type_coercion() {
        let raw = r#"{
            "specieIdentified": "Tree of Heaven (Ailanthus altissima)",
            "nativeRegion": null,
            "invasiveOrNot": "true",
            "confidenceScore": 140,
            "confidenceReasoning": "compound leaves clearly visible",
            "invasiveEffects": null,
            "nativeAlternatives": ["Staghorn Sumac", {"name": "Black Walnut", "scientific_name": "Juglans nigra"}, 7],
            "removeInstructions": ["Girdle the trunk.", "Treat with herbicide."]
        }"#;
        let a = extract_assessment(raw);
        assert_eq!(a.native_region, UNKNOWN_REGION);
        assert!(a.invasive_or_not);
        assert_eq!(a.confidence_score, Some(100.0));
        assert_eq!(a.confidence_reasoning.as_deref(), Some("compound leaves clearly visible"));
        assert_eq!(a.invasive_effects, "");
        assert_eq!(a.native_alternatives.len(), 2);
        assert_eq!(a.native_alternatives[0].common_name, "Staghorn Sumac");
        assert_eq!(a.native_alternatives[1].common_name, "Black Walnut");
        assert_eq!(a.native_alternatives[1].scientific_name, "Juglans nigra");
        assert_eq!(a.remove_instructions, "Girdle the trunk.\nTreat with herbicide.");
    }

    #[test]
    fn test_score_clamping_and_strings() {
        assert_eq!(as_score(Some(&serde_json::json!(-5))), Some(0.0));
        assert_eq!(as_score(Some(&serde_json::json!("85%"))), Some(85.0));
        assert_eq!(as_score(Some(&serde_json::json!("high"))), None);
        assert_eq!(as_score(None), None);
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let a = extract_assessment(r#"{"specieIdentified": "Clover"}"#);
        assert_eq!(a.native_region, UNKNOWN_REGION);
        assert!(!a.invasive_or_not);
        assert!(a.native_alternatives.is_empty());
        assert_eq!(a.remove_instructions, "");
    }

    #[test]
    fn test_null_species_is_kept_as_none() {
        let a = extract_assessment(r#"{"specieIdentified": null, "invasiveEffects": "Photo too blurry"}"#);
        assert_eq!(a.species_identified, None);
        assert_eq!(a.invasive_effects, "Photo too blurry");
    }

    #[test]
    fn test_repair_json() {
        assert_eq!(repair_json("{\"a\": 1,}"), "{\"a\": 1}");
        assert_eq!(repair_json("[1, 2 ,\n]"), "[1, 2  ]");
        assert_eq!(repair_json("{\"a\":\u{0}\u{9F}1}"), "{\"a\":1}");
    }

    #[test]
    fn test_repair_keeps_commas_inside_strings() {
        assert_eq!(
            repair_json(r#"{"a": "dig, ]then burn", "b": "x\", }", "c": [1,],}"#),
            r#"{"a": "dig, ]then burn", "b": "x\", }", "c": [1]}"#
        );

        let raw = "{\"specieIdentified\": \"Kudzu\u{0007}\", \"removeInstructions\": \"dig, ]then burn\", \"invasiveOrNot\": true,}";
        let a = extract_assessment(raw);
        assert_eq!(a.species_identified.as_deref(), Some("Kudzu"));
        assert_eq!(a.remove_instructions, "dig, ]then burn");
    }
}
