use crate::error::ExtractionError;
use crate::extraction::{DocumentExtractor, DocumentFormat};

/// Marker lopdf emits for CID fonts it cannot decode.
const IDENTITY_H_PATTERN: &str = "?Identity-H Unimplemented?";

/// Below this many characters the alphanumeric ratio check is skipped.
const MIN_TOTAL_CHARS: usize = 50;

/// Minimum share of alphanumeric characters in a readable text layer.
const MIN_ALPHANUMERIC_PERCENT: usize = 10;

pub struct PdfExtractor;

impl PdfExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PdfExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentExtractor for PdfExtractor {
    fn extract(&self, bytes: &[u8]) -> Result<String, ExtractionError> {
        let _span = tracing::info_span!("extraction.pdf", bytes = bytes.len()).entered();

        let doc = lopdf::Document::load_mem(bytes)
            .map_err(|e| ExtractionError::PdfProcessing(format!("Failed to load PDF: {}", e)))?;

        let text = extract_text_from_pdf(&doc);

        if text.trim().is_empty() {
            return Ok(String::new());
        }

        if is_unreadable(&text) {
            return Err(ExtractionError::PdfProcessing(
                "text layer is unreadable (scanned or CID-encoded PDF)".to_string(),
            ));
        }

        Ok(text)
    }

    fn supports(&self, format: DocumentFormat) -> bool {
        matches!(format, DocumentFormat::Pdf)
    }
}

fn extract_text_from_pdf(doc: &lopdf::Document) -> String {
    let mut text = String::new();

    for (page_num, _) in doc.get_pages() {
        match doc.extract_text(&[page_num]) {
            Ok(page_text) => {
                text.push_str(&page_text);
                text.push('\n');
            }
            Err(e) => tracing::warn!(page = page_num, "Skipping unreadable PDF page: {}", e),
        }
    }

    text
}

/// True when extracted text is only font-decoding markers or mostly
/// non-alphanumeric noise.
fn is_unreadable(text: &str) -> bool {
    let trimmed = text.trim();

    let cleaned = trimmed
        .replace(IDENTITY_H_PATTERN, "")
        .replace(['\n', ' '], "");
    if cleaned.is_empty() {
        return true;
    }

    let total_chars = trimmed.chars().count();
    let alphanumeric_chars = trimmed.chars().filter(|c| c.is_alphanumeric()).count();

    total_chars > MIN_TOTAL_CHARS
        && alphanumeric_chars * 100 < total_chars * MIN_ALPHANUMERIC_PERCENT
}
