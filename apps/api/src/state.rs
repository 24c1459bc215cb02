use std::sync::Arc;

use crate::extract::TextExtractor;
use crate::llm_client::CompletionClient;

/// Shared application state injected into all route handlers via Axum
/// extractors. Both collaborators are trait objects so tests can swap in
/// stubs.
#[derive(Clone)]
pub struct AppState {
    pub llm: Arc<dyn CompletionClient>,
    pub extractor: Arc<dyn TextExtractor>,
}
