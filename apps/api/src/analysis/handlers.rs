//! Axum route handlers for the CV analysis API.
//!
//! Each request moves through validate → extract (uploads only) → prompt →
//! LLM call → interpret → respond. Validation failures are rejected before
//! any LLM work happens, and the upload's temp file is scoped to the handler
//! so it is removed on every exit path.

use std::collections::BTreeMap;

use anyhow::Context;
use axum::extract::{Multipart, Query, State};
use axum::Json;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::analysis::interpret::{interpret_summary, interpret_tips, Tip, TipKind};
use crate::analysis::matching::{match_cv_with_jobs, JobListing, JobMatch};
use crate::analysis::prompts::{self, TaskKind};
use crate::errors::AppError;
use crate::extract::TextExtractor;
use crate::state::AppState;

const ALLOWED_EXTENSIONS: &[&str] = &["pdf", "doc", "docx"];
pub const MAX_FILE_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Used when the client sends no job description on the analyze path.
const DEFAULT_JOB_DESCRIPTION: &str = "General career advancement";

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct AnalyzeResponse {
    pub tips: Vec<Tip>,
    pub score: f64,
    pub summary: String,
}

#[derive(Debug, Serialize)]
pub struct MatchJobsResponse {
    pub matches: Vec<JobMatch>,
    pub total: usize,
}

#[derive(Debug, Deserialize)]
pub struct SummarizeParams {
    #[serde(default)]
    pub cv_text: String,
    #[serde(default)]
    pub job_description: String,
}

#[derive(Debug, Serialize)]
pub struct SummarizeResponse {
    pub summary: String,
    pub status: &'static str,
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/analyze-cv
///
/// Multipart form: `file` (required, pdf/doc/docx), `job_description`
/// (optional text). Returns improvement tips plus the raw analysis text.
pub async fn handle_analyze_cv(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<AnalyzeResponse>, AppError> {
    let form = read_form(multipart).await?;

    let upload = form
        .file
        .ok_or_else(|| AppError::Validation("No file provided".to_string()))?;
    let extension = validate_upload(
        &upload,
        "File type not allowed. Supported: PDF, DOC, DOCX",
    )?;

    let cv_text = extract_upload(state.extractor.as_ref(), &extension, &upload.bytes).await?;

    let job_description = form
        .job_description
        .map(|jd| jd.trim().to_string())
        .filter(|jd| !jd.is_empty())
        .unwrap_or_else(|| DEFAULT_JOB_DESCRIPTION.to_string());

    let fields: BTreeMap<&str, &str> = [
        ("cv", cv_text.as_str()),
        ("job_description", job_description.as_str()),
    ]
    .into_iter()
    .collect();
    let prompt = prompts::build(TaskKind::Analyze, &fields).map_err(anyhow::Error::new)?;

    let raw = state.llm.complete(&prompt).await?;
    let tips = interpret_tips(&raw);
    let score = strength_share(&tips);

    Ok(Json(AnalyzeResponse {
        tips,
        score,
        summary: interpret_summary(&raw),
    }))
}

/// POST /api/match-jobs
///
/// Multipart form: `file` (required) and `jobs` (JSON-encoded array of
/// `{id, title?, description}`). Listings that fail during processing are
/// skipped, so `total` may be smaller than the number submitted.
pub async fn handle_match_jobs(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<MatchJobsResponse>, AppError> {
    let form = read_form(multipart).await?;

    let upload = form
        .file
        .ok_or_else(|| AppError::Validation("No file provided".to_string()))?;
    let extension = validate_upload(&upload, "File type not allowed")?;

    let jobs_raw = form
        .jobs
        .ok_or_else(|| AppError::Validation("No jobs provided".to_string()))?;
    let jobs: Vec<JobListing> = serde_json::from_str(&jobs_raw)
        .map_err(|_| AppError::Validation("jobs must be a JSON array of job objects".to_string()))?;

    let cv_text = extract_upload(state.extractor.as_ref(), &extension, &upload.bytes).await?;

    let matches = match_cv_with_jobs(state.llm.as_ref(), &cv_text, &jobs).await?;
    let total = matches.len();

    Ok(Json(MatchJobsResponse { matches, total }))
}

/// GET /api/summarize-cv
///
/// Query parameters `cv_text` and `job_description`, both required non-blank.
/// Blank input is rejected before any LLM call is attempted.
pub async fn handle_summarize_cv(
    State(state): State<AppState>,
    Query(params): Query<SummarizeParams>,
) -> Result<Json<SummarizeResponse>, AppError> {
    let cv_text = params.cv_text.trim();
    let job_description = params.job_description.trim();

    if cv_text.is_empty() {
        return Err(AppError::Validation("cv_text is required".to_string()));
    }
    if job_description.is_empty() {
        return Err(AppError::Validation(
            "job_description is required".to_string(),
        ));
    }

    let fields: BTreeMap<&str, &str> = [
        ("cv_text", cv_text),
        ("job_description", job_description),
    ]
    .into_iter()
    .collect();
    let prompt = prompts::build(TaskKind::Summarize, &fields).map_err(anyhow::Error::new)?;

    let raw = state.llm.complete(&prompt).await?;

    Ok(Json(SummarizeResponse {
        summary: interpret_summary(&raw),
        status: "success",
    }))
}

// ────────────────────────────────────────────────────────────────────────────
// Helpers
// ────────────────────────────────────────────────────────────────────────────

struct UploadedFile {
    filename: String,
    bytes: Bytes,
}

#[derive(Default)]
struct AnalysisForm {
    file: Option<UploadedFile>,
    job_description: Option<String>,
    jobs: Option<String>,
}

/// Drains the multipart stream into the fields the analysis endpoints use.
/// Unknown fields are ignored.
async fn read_form(mut multipart: Multipart) -> Result<AnalysisForm, AppError> {
    let mut form = AnalysisForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Malformed multipart request: {e}")))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::Validation(format!("Failed to read upload: {e}")))?;
                form.file = Some(UploadedFile { filename, bytes });
            }
            Some("job_description") => {
                form.job_description = Some(read_text_field(field).await?);
            }
            Some("jobs") => {
                form.jobs = Some(read_text_field(field).await?);
            }
            _ => {}
        }
    }

    Ok(form)
}

async fn read_text_field(field: axum::extract::multipart::Field<'_>) -> Result<String, AppError> {
    field
        .text()
        .await
        .map_err(|e| AppError::Validation(format!("Failed to read form field: {e}")))
}

/// Checks filename, extension allow-list, and size cap; returns the
/// lowercased extension on success.
fn validate_upload(upload: &UploadedFile, bad_type_message: &str) -> Result<String, AppError> {
    if upload.filename.is_empty() {
        return Err(AppError::Validation("No file selected".to_string()));
    }

    let extension = upload
        .filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| ALLOWED_EXTENSIONS.contains(&ext.as_str()))
        .ok_or_else(|| AppError::Validation(bad_type_message.to_string()))?;

    if upload.bytes.len() > MAX_FILE_SIZE {
        return Err(AppError::Validation(
            "File exceeds the 10MB size limit".to_string(),
        ));
    }

    Ok(extension)
}

/// Writes the upload to a request-scoped temp file and runs the extractor
/// over it. The `NamedTempFile` guard removes the file when this function
/// returns, on success and on every failure path alike.
async fn extract_upload(
    extractor: &dyn TextExtractor,
    extension: &str,
    bytes: &[u8],
) -> Result<String, AppError> {
    let temp = tempfile::Builder::new()
        .prefix("cv-upload-")
        .suffix(&format!(".{extension}"))
        .tempfile()
        .context("failed to create temp file for upload")?;

    tokio::fs::write(temp.path(), bytes)
        .await
        .context("failed to write upload to temp file")?;

    let text = extractor.extract(temp.path(), extension).await?;
    Ok(text)
}

/// Deterministic overall score for the analyze response: the share of
/// `strength` tips among all parsed tips, 0.0 when no tips parsed.
fn strength_share(tips: &[Tip]) -> f64 {
    if tips.is_empty() {
        return 0.0;
    }
    let strengths = tips.iter().filter(|t| t.kind == TipKind::Strength).count();
    strengths as f64 / tips.len() as f64
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{header::CONTENT_TYPE, Request, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;
    use crate::extract::ExtractError;
    use crate::llm_client::{CompletionClient, LlmError};
    use crate::routes::build_router;

    /// Returns a fixed completion and counts how many times it was called.
    struct EchoClient {
        reply: String,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl CompletionClient for EchoClient {
        async fn complete(&self, _prompt: &str) -> Result<String, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.reply.clone())
        }
    }

    /// Returns fixed CV text and records every path it was asked to extract,
    /// asserting the file exists at extraction time.
    struct RecordingExtractor {
        text: String,
        fail: bool,
        seen_paths: Arc<Mutex<Vec<PathBuf>>>,
    }

    #[async_trait]
    impl TextExtractor for RecordingExtractor {
        async fn extract(&self, path: &Path, _extension: &str) -> Result<String, ExtractError> {
            assert!(path.exists(), "temp file must exist during extraction");
            self.seen_paths.lock().unwrap().push(path.to_path_buf());
            if self.fail {
                return Err(ExtractError::Corrupt("unreadable xref table".to_string()));
            }
            Ok(self.text.clone())
        }
    }

    struct TestApp {
        router: axum::Router,
        llm_calls: Arc<AtomicUsize>,
        seen_paths: Arc<Mutex<Vec<PathBuf>>>,
    }

    fn test_app(reply: &str) -> TestApp {
        test_app_with(reply, false)
    }

    fn test_app_with(reply: &str, failing_extractor: bool) -> TestApp {
        let llm_calls = Arc::new(AtomicUsize::new(0));
        let seen_paths = Arc::new(Mutex::new(Vec::new()));
        let state = AppState {
            llm: Arc::new(EchoClient {
                reply: reply.to_string(),
                calls: llm_calls.clone(),
            }),
            extractor: Arc::new(RecordingExtractor {
                text: "Experienced backend engineer. Rust, Postgres, Kafka.".to_string(),
                fail: failing_extractor,
                seen_paths: seen_paths.clone(),
            }),
        };
        TestApp {
            router: build_router(state),
            llm_calls,
            seen_paths,
        }
    }

    const BOUNDARY: &str = "test-boundary-7MA4YWxkTrZu0gW";

    /// Builds a multipart/form-data body. `filename: Some(..)` marks a file
    /// part, `None` a plain text field.
    fn multipart_body(parts: &[(&str, Option<&str>, &[u8])]) -> Vec<u8> {
        let mut body = Vec::new();
        for (name, filename, content) in parts {
            body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
            match filename {
                Some(filename) => body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\n\
                         Content-Type: application/octet-stream\r\n\r\n"
                    )
                    .as_bytes(),
                ),
                None => body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
                ),
            }
            body.extend_from_slice(content);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn multipart_request(uri: &str, parts: &[(&str, Option<&str>, &[u8])]) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(multipart_body(parts)))
            .unwrap()
    }

    async fn response_json(response: axum::response::Response) -> (StatusCode, Value) {
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let app = test_app("unused");
        let response = app
            .router
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let (status, body) = response_json(response).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_summarize_cv_end_to_end() {
        let app = test_app("MATCH: good fit");
        let response = app
            .router
            .oneshot(
                Request::get(
                    "/api/summarize-cv?cv_text=Experienced+backend+engineer&job_description=Looking+for+backend+engineer",
                )
                .body(Body::empty())
                .unwrap(),
            )
            .await
            .unwrap();
        let (status, body) = response_json(response).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["summary"], "MATCH: good fit");
        assert_eq!(body["status"], "success");
        assert_eq!(app.llm_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_summarize_cv_blank_cv_text_rejected_before_llm_call() {
        let app = test_app("unused");
        let response = app
            .router
            .oneshot(
                Request::get("/api/summarize-cv?cv_text=%20%20&job_description=backend")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let (status, body) = response_json(response).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "cv_text is required");
        assert_eq!(app.llm_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_summarize_cv_missing_job_description_rejected_before_llm_call() {
        let app = test_app("unused");
        let response = app
            .router
            .oneshot(
                Request::get("/api/summarize-cv?cv_text=engineer")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let (status, body) = response_json(response).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "job_description is required");
        assert_eq!(app.llm_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_analyze_cv_without_file_is_400() {
        let app = test_app("unused");
        let request = multipart_request(
            "/api/analyze-cv",
            &[("job_description", None, b"Backend role" as &[u8])],
        );
        let (status, body) = response_json(app.router.oneshot(request).await.unwrap()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "No file provided");
        assert_eq!(app.llm_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_analyze_cv_empty_filename_is_400() {
        let app = test_app("unused");
        let request = multipart_request("/api/analyze-cv", &[("file", Some(""), b"%PDF-1.4")]);
        let (status, body) = response_json(app.router.oneshot(request).await.unwrap()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "No file selected");
    }

    #[tokio::test]
    async fn test_analyze_cv_bad_extension_is_400() {
        let app = test_app("unused");
        let request = multipart_request("/api/analyze-cv", &[("file", Some("cv.txt"), b"plain")]);
        let (status, body) = response_json(app.router.oneshot(request).await.unwrap()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "File type not allowed. Supported: PDF, DOC, DOCX");
    }

    #[tokio::test]
    async fn test_analyze_cv_success_shape() {
        let reply = r#"[
            {"type": "strength", "title": "Deep Rust experience", "description": "8 years of systems work"},
            {"type": "improvement", "title": "Add metrics", "description": "Quantify achievements"}
        ]"#;
        let app = test_app(reply);
        let request = multipart_request(
            "/api/analyze-cv",
            &[
                ("file", Some("cv.pdf"), b"%PDF-1.4 fake" as &[u8]),
                ("job_description", None, b"Senior Rust engineer"),
            ],
        );
        let (status, body) = response_json(app.router.oneshot(request).await.unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["tips"].as_array().unwrap().len(), 2);
        assert_eq!(body["tips"][0]["type"], "strength");
        assert_eq!(body["score"], 0.5);
        assert_eq!(body["summary"].as_str().unwrap(), reply);
    }

    #[tokio::test]
    async fn test_analyze_cv_garbage_reply_degrades_to_empty_tips() {
        let app = test_app("I refuse to emit JSON.");
        let request = multipart_request(
            "/api/analyze-cv",
            &[("file", Some("cv.pdf"), b"%PDF-1.4 fake" as &[u8])],
        );
        let (status, body) = response_json(app.router.oneshot(request).await.unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["tips"], serde_json::json!([]));
        assert_eq!(body["score"], 0.0);
    }

    #[tokio::test]
    async fn test_analyze_cv_temp_file_removed_after_success() {
        let reply = r#"[{"type": "strength", "title": "t", "description": "d"}]"#;
        let app = test_app(reply);
        let request = multipart_request(
            "/api/analyze-cv",
            &[("file", Some("cv.pdf"), b"%PDF-1.4 fake" as &[u8])],
        );
        let response = app.router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let seen = app.seen_paths.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(!seen[0].exists(), "temp file must be removed after the request");
    }

    #[tokio::test]
    async fn test_analyze_cv_temp_file_removed_after_extraction_failure() {
        let app = test_app_with("unused", true);
        let request = multipart_request(
            "/api/analyze-cv",
            &[("file", Some("cv.pdf"), b"%PDF-1.4 broken" as &[u8])],
        );
        let (status, _body) = response_json(app.router.oneshot(request).await.unwrap()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let seen = app.seen_paths.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(!seen[0].exists(), "temp file must be removed on the failure path");
        assert_eq!(app.llm_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_match_jobs_without_jobs_field_is_400() {
        let app = test_app("unused");
        let request = multipart_request(
            "/api/match-jobs",
            &[("file", Some("cv.pdf"), b"%PDF-1.4 fake" as &[u8])],
        );
        let (status, body) = response_json(app.router.oneshot(request).await.unwrap()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "No jobs provided");
    }

    #[tokio::test]
    async fn test_match_jobs_bad_extension_is_400() {
        let app = test_app("unused");
        let request = multipart_request(
            "/api/match-jobs",
            &[
                ("file", Some("cv.exe"), b"MZ" as &[u8]),
                ("jobs", None, b"[]"),
            ],
        );
        let (status, body) = response_json(app.router.oneshot(request).await.unwrap()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "File type not allowed");
    }

    #[tokio::test]
    async fn test_match_jobs_end_to_end() {
        // Every listing gets the same completion from the echo client.
        let app = test_app(r#"{"score": 73, "match_reasons": ["Rust"], "missing_skills": []}"#);
        let jobs = br#"[
            {"id": "j1", "title": "Backend Engineer", "description": "Rust services"},
            {"id": "j2", "description": "Platform work"}
        ]"#;
        let request = multipart_request(
            "/api/match-jobs",
            &[
                ("file", Some("cv.pdf"), b"%PDF-1.4 fake" as &[u8]),
                ("jobs", None, jobs),
            ],
        );
        let (status, body) = response_json(app.router.oneshot(request).await.unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 2);
        assert_eq!(body["matches"].as_array().unwrap().len(), 2);
        assert_eq!(body["matches"][0]["job_id"], "j1");
        assert_eq!(body["matches"][0]["score"], 73.0);
        assert_eq!(body["matches"][1]["job_title"], "Unknown");
        assert_eq!(app.llm_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_match_jobs_malformed_jobs_json_is_400() {
        let app = test_app("unused");
        let request = multipart_request(
            "/api/match-jobs",
            &[
                ("file", Some("cv.pdf"), b"%PDF-1.4 fake" as &[u8]),
                ("jobs", None, b"{not json"),
            ],
        );
        let (status, body) = response_json(app.router.oneshot(request).await.unwrap()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "jobs must be a JSON array of job objects");
    }

    #[test]
    fn test_validate_upload_size_cap() {
        let upload = UploadedFile {
            filename: "cv.pdf".to_string(),
            bytes: Bytes::from(vec![0u8; MAX_FILE_SIZE + 1]),
        };
        let err = validate_upload(&upload, "File type not allowed").unwrap_err();
        assert!(matches!(err, AppError::Validation(msg) if msg.contains("10MB")));
    }

    #[test]
    fn test_validate_upload_extension_is_case_insensitive() {
        let upload = UploadedFile {
            filename: "Resume.PDF".to_string(),
            bytes: Bytes::from_static(b"%PDF-1.4"),
        };
        assert_eq!(validate_upload(&upload, "nope").unwrap(), "pdf");
    }

    #[test]
    fn test_strength_share() {
        let tip = |kind| Tip {
            kind,
            title: "t".to_string(),
            description: "d".to_string(),
        };
        assert_eq!(strength_share(&[]), 0.0);
        assert_eq!(
            strength_share(&[tip(TipKind::Strength), tip(TipKind::Improvement)]),
            0.5
        );
        assert_eq!(strength_share(&[tip(TipKind::Strength)]), 1.0);
    }
}
