//! Batch matching of one CV against a list of job listings.
//!
//! Listings are processed in input order. A provider failure on one listing
//! skips that listing and continues; a missing credential aborts the whole
//! batch, since nothing after it can succeed either. The final sort by score
//! is the only reordering.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::analysis::interpret::interpret_match;
use crate::analysis::prompts::{self, TaskKind};
use crate::errors::AppError;
use crate::llm_client::{CompletionClient, LlmError};

/// One job listing from the request's `jobs` array.
#[derive(Debug, Clone, Deserialize)]
pub struct JobListing {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: String,
}

/// One scored CV-to-job comparison in a match response.
#[derive(Debug, Clone, Serialize)]
pub struct JobMatch {
    pub job_id: String,
    pub job_title: String,
    pub score: f64,
    pub match_reasons: Vec<String>,
    pub missing_skills: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Scores `cv_text` against each listing and returns the surviving matches
/// sorted by score descending (stable, so ties keep input order).
///
/// The returned list may be shorter than the input when individual listings
/// fail; that is expected behavior, not an error.
pub async fn match_cv_with_jobs(
    llm: &dyn CompletionClient,
    cv_text: &str,
    jobs: &[JobListing],
) -> Result<Vec<JobMatch>, AppError> {
    let mut matches = Vec::with_capacity(jobs.len());

    for job in jobs {
        let fields: BTreeMap<&str, &str> =
            [("cv", cv_text), ("job", job.description.as_str())]
                .into_iter()
                .collect();
        let prompt = match prompts::build(TaskKind::Match, &fields) {
            Ok(prompt) => prompt,
            Err(e) => {
                warn!("Skipping job {}: prompt build failed: {e}", job.id);
                continue;
            }
        };

        let raw = match llm.complete(&prompt).await {
            Ok(raw) => raw,
            Err(LlmError::Config(msg)) => return Err(AppError::ProviderConfig(msg)),
            Err(e) => {
                warn!("Skipping job {}: provider call failed: {e}", job.id);
                continue;
            }
        };

        let outcome = interpret_match(&raw);
        matches.push(JobMatch {
            job_id: job.id.clone(),
            job_title: job.title.clone().unwrap_or_else(|| "Unknown".to_string()),
            score: outcome.score,
            match_reasons: outcome.match_reasons,
            missing_skills: outcome.missing_skills,
            error: outcome.error,
        });
    }

    // sort_by is stable, so equal scores keep input order
    matches.sort_by(|a, b| b.score.total_cmp(&a.score));

    Ok(matches)
}
