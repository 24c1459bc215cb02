//! Document text extraction behind a pluggable trait.
//!
//! Uploads are validated against the {pdf, doc, docx} allow-list before they
//! reach this layer, but only PDF extraction is wired up; doc/docx fail here
//! with `Unsupported` rather than at validation.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("File type '.{0}' is not supported for text extraction yet")]
    Unsupported(String),

    #[error("Failed to read document: {0}")]
    Corrupt(String),

    #[error("Document contains no extractable text")]
    Empty,
}

/// Turns an uploaded document into plain text.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract(&self, path: &Path, extension: &str) -> Result<String, ExtractError>;
}

/// Production extractor backed by the `pdf-extract` crate.
pub struct PdfExtractor;

#[async_trait]
impl TextExtractor for PdfExtractor {
    async fn extract(&self, path: &Path, extension: &str) -> Result<String, ExtractError> {
        if extension != "pdf" {
            return Err(ExtractError::Unsupported(extension.to_string()));
        }

        // pdf-extract is synchronous; keep it off the async workers.
        let path: PathBuf = path.to_path_buf();
        let text = tokio::task::spawn_blocking(move || pdf_extract::extract_text(&path))
            .await
            .map_err(|e| ExtractError::Corrupt(e.to_string()))?
            .map_err(|e| ExtractError::Corrupt(e.to_string()))?;

        if text.trim().is_empty() {
            return Err(ExtractError::Empty);
        }

        Ok(text)
    }
}
