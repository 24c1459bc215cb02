pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use crate::analysis::handlers;
use crate::state::AppState;

/// Body limit leaves headroom above the 10MB upload cap for multipart
/// framing; the cap itself is enforced in the handlers with a 400.
const BODY_LIMIT: usize = handlers::MAX_FILE_SIZE + 1024 * 1024;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route("/api/analyze-cv", post(handlers::handle_analyze_cv))
        .route("/api/match-jobs", post(handlers::handle_match_jobs))
        .route("/api/summarize-cv", get(handlers::handle_summarize_cv))
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .with_state(state)
}
