//! Interprets raw LLM completions into the structured shapes the API
//! promises.
//!
//! Parsing here is deliberately lenient: a malformed model reply degrades to
//! a documented fallback (empty tip list, zero-score match) instead of
//! failing the request. Provider and validation errors stay strict — the
//! leniency applies only to the model's own output.

use serde::{Deserialize, Serialize};

use crate::llm_client::strip_json_fences;

/// One structured item in an analysis result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tip {
    #[serde(rename = "type")]
    pub kind: TipKind,
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TipKind {
    Strength,
    Improvement,
    Suggestion,
}

/// Parses an analysis completion as a JSON array of tips.
/// Anything that is not a well-formed tip array becomes an empty list.
pub fn interpret_tips(raw: &str) -> Vec<Tip> {
    serde_json::from_str(strip_json_fences(raw)).unwrap_or_default()
}

/// Interpreted result of a single-job match completion.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchOutcome {
    pub score: f64,
    pub match_reasons: Vec<String>,
    pub missing_skills: Vec<String>,
    /// Set when the completion could not be parsed and the outcome is the
    /// zero-score fallback.
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MatchPayload {
    #[serde(default)]
    score: f64,
    #[serde(default)]
    match_reasons: Vec<String>,
    #[serde(default)]
    missing_skills: Vec<String>,
}

/// Parses a match completion as a JSON object with score, reasons, and
/// missing skills. Scores are clamped to [0, 100]; a parse failure yields the
/// zero-score fallback with `error` set.
pub fn interpret_match(raw: &str) -> MatchOutcome {
    match serde_json::from_str::<MatchPayload>(strip_json_fences(raw)) {
        Ok(payload) => MatchOutcome {
            score: clamp_score(payload.score),
            match_reasons: payload.match_reasons,
            missing_skills: payload.missing_skills,
            error: None,
        },
        Err(_) => MatchOutcome {
            score: 0.0,
            match_reasons: Vec::new(),
            missing_skills: Vec::new(),
            error: Some("parse failed".to_string()),
        },
    }
}

/// Summaries are free text; the completion passes through unchanged.
pub fn interpret_summary(raw: &str) -> String {
    raw.to_string()
}

fn clamp_score(score: f64) -> f64 {
    if score.is_finite() {
        score.clamp(0.0, 100.0)
    } else {
        0.0
    }
}
