//! Turning uploaded files into plain text.

pub mod docx;
pub mod pdf;
pub mod text;

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ExtractionError;

pub const DOCX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    Text,
    Pdf,
    Docx,
}

impl DocumentFormat {
    /// Maps a MIME type to a format. Parameters such as `; charset=utf-8`
    /// are ignored.
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_ascii_lowercase();

        match essence.as_str() {
            "text/plain" | "text/markdown" => Some(Self::Text),
            "application/pdf" => Some(Self::Pdf),
            DOCX_CONTENT_TYPE => Some(Self::Docx),
            _ => None,
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Text => "text/plain",
            Self::Pdf => "application/pdf",
            Self::Docx => DOCX_CONTENT_TYPE,
        }
    }
}

/// Guesses a MIME type from a file extension.
pub fn content_type_for_path(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

/// Extracts text from one document format.
pub trait DocumentExtractor: Send + Sync {
    fn extract(&self, bytes: &[u8]) -> Result<String, ExtractionError>;
    fn supports(&self, format: DocumentFormat) -> bool;
}

/// Async boundary the pipeline uses to turn upload bytes into text.
#[async_trait]
pub trait ExtractionGateway: Send + Sync {
    async fn extract(&self, bytes: &[u8], content_type: &str) -> Result<String, ExtractionError>;
}

/// Local extractors for plain text, PDF and DOCX.
pub struct ExtractorRegistry {
    extractors: Vec<Box<dyn DocumentExtractor>>,
}

impl ExtractorRegistry {
    pub fn new() -> Self {
        Self {
            extractors: vec![
                Box::new(text::TextExtractor::new()),
                Box::new(pdf::PdfExtractor::new()),
                Box::new(docx::DocxExtractor::new()),
            ],
        }
    }

    /// Extracts text, rejecting unsupported types and blank results.
    pub fn extract_bytes(
        &self,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<String, ExtractionError> {
        let format = DocumentFormat::from_content_type(content_type)
            .ok_or_else(|| ExtractionError::UnsupportedType(content_type.to_string()))?;

        let extractor = self
            .extractors
            .iter()
            .find(|e| e.supports(format))
            .ok_or_else(|| ExtractionError::UnsupportedType(content_type.to_string()))?;

        let text = extractor.extract(bytes)?;
        if text.trim().is_empty() {
            return Err(ExtractionError::EmptyDocument);
        }

        tracing::debug!(
            format = ?format,
            bytes = bytes.len(),
            chars = text.chars().count(),
            "Extracted document text"
        );
        Ok(text)
    }

    /// Reads a file and extracts its text using the type guessed from
    /// its extension.
    pub fn extract_path(&self, path: &Path) -> Result<(String, String), ExtractionError> {
        let bytes = std::fs::read(path).map_err(|e| ExtractionError::ReadDocument {
            path: path.to_path_buf(),
            source: e,
        })?;
        let content_type = content_type_for_path(path);
        let text = self.extract_bytes(&bytes, &content_type)?;
        Ok((text, content_type))
    }
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExtractionGateway for ExtractorRegistry {
    async fn extract(&self, bytes: &[u8], content_type: &str) -> Result<String, ExtractionError> {
        tracing::info_span!("extraction", content_type = %content_type)
            .in_scope(|| self.extract_bytes(bytes, content_type))
    }
}
