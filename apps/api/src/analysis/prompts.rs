//! Prompt templates and the deterministic prompt builder.
//!
//! One fixed template per task kind, `{placeholder}` substitution only.
//! Oversized fields are silently head-truncated to a per-field character cap
//! before substitution; the same inputs always produce byte-identical output.

use std::collections::BTreeMap;

use thiserror::Error;

/// The three assessment tasks the service performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Analyze,
    Match,
    Summarize,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PromptError {
    #[error("missing prompt field '{0}'")]
    MissingField(String),

    #[error("unexpected prompt field '{0}'")]
    UnknownField(String),
}

/// CV analysis prompt. Replace `{cv}` and `{job_description}` before sending.
const ANALYZE_PROMPT_TEMPLATE: &str = r#"Analyze this CV and provide personalized tips to improve it.

CV Content:
{cv}

Job Description:
{job_description}

Please provide:
1. 2-3 strengths
2. 2-3 areas for improvement
3. 2-3 suggestions for matching this job

Format the response as a JSON array with objects containing:
- type: "strength", "improvement", or "suggestion"
- title: Short title
- description: Detailed description

Return only valid JSON."#;

/// Single-job match prompt. Replace `{cv}` and `{job}` before sending.
const MATCH_PROMPT_TEMPLATE: &str = r#"Given this CV and job description, determine a match score (0-100) and provide a brief explanation.

CV:
{cv}

Job Description:
{job}

Return a JSON object with:
- score: number between 0-100
- match_reasons: array of 2-3 reason strings
- missing_skills: array of skills needed but not in CV

Return only valid JSON."#;

/// Fit summary prompt. Replace `{cv_text}` and `{job_description}` before sending.
const SUMMARIZE_PROMPT_TEMPLATE: &str = r#"Given the following CV:
{cv_text}

And the job description:
{job_description}

Provide a concise summary of how the CV matches the job description."#;

/// Per-field character caps chosen to stay under the provider's context
/// limits. `None` means the field is substituted untruncated.
const ANALYZE_FIELDS: &[(&str, Option<usize>)] = &[("cv", Some(4000)), ("job_description", None)];
const MATCH_FIELDS: &[(&str, Option<usize>)] = &[("cv", Some(3000)), ("job", Some(2000))];
const SUMMARIZE_FIELDS: &[(&str, Option<usize>)] = &[("cv_text", None), ("job_description", None)];

impl TaskKind {
    fn template(self) -> &'static str {
        match self {
            TaskKind::Analyze => ANALYZE_PROMPT_TEMPLATE,
            TaskKind::Match => MATCH_PROMPT_TEMPLATE,
            TaskKind::Summarize => SUMMARIZE_PROMPT_TEMPLATE,
        }
    }

    fn fields(self) -> &'static [(&'static str, Option<usize>)] {
        match self {
            TaskKind::Analyze => ANALYZE_FIELDS,
            TaskKind::Match => MATCH_FIELDS,
            TaskKind::Summarize => SUMMARIZE_FIELDS,
        }
    }
}

/// Renders the prompt for `task` from `fields`.
///
/// Pure function: no randomness, no timestamps, no side effects. Every
/// template placeholder must be supplied and every supplied field must match
/// a placeholder.
pub fn build(task: TaskKind, fields: &BTreeMap<&str, &str>) -> Result<String, PromptError> {
    let expected = task.fields();

    for name in fields.keys() {
        if !expected.iter().any(|(n, _)| n == name) {
            return Err(PromptError::UnknownField((*name).to_string()));
        }
    }

    let mut prompt = task.template().to_string();
    for (name, cap) in expected {
        let value = fields
            .get(name)
            .ok_or_else(|| PromptError::MissingField((*name).to_string()))?;
        let value = match cap {
            Some(cap) => truncate_chars(value, *cap),
            None => *value,
        };
        prompt = prompt.replace(&format!("{{{name}}}"), value);
    }

    Ok(prompt)
}

/// Keeps the first `cap` characters, cutting on a char boundary.
fn truncate_chars(s: &str, cap: usize) -> &str {
    match s.char_indices().nth(cap) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
