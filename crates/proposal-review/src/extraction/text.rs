use crate::error::ExtractionError;
use crate::extraction::{DocumentExtractor, DocumentFormat};

const UTF8_BOM: &str = "\u{feff}";

pub struct TextExtractor;

impl TextExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for TextExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentExtractor for TextExtractor {
    fn extract(&self, bytes: &[u8]) -> Result<String, ExtractionError> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| ExtractionError::InvalidEncoding(e.to_string()))?;

        Ok(text
            .strip_prefix(UTF8_BOM)
            .unwrap_or(text)
            .replace("\r\n", "\n"))
    }

    fn supports(&self, format: DocumentFormat) -> bool {
        matches!(format, DocumentFormat::Text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_utf8() {
        let text = TextExtractor::new()
            .extract("Scope: 12 sites, 3 phases, Zürich".as_bytes())
            .unwrap();
        assert_eq!(text, "Scope: 12 sites, 3 phases, Zürich");
    }

    #[test]
    fn test_strips_bom_and_normalizes_line_endings() {
        let text = TextExtractor::new()
            .extract(b"\xEF\xBB\xBFline one\r\nline two")
            .unwrap();
        assert_eq!(text, "line one\nline two");
    }

    #[test]
    fn test_rejects_invalid_utf8() {
        let result = TextExtractor::new().extract(&[0x66, 0x6f, 0xff, 0xfe]);
        assert!(matches!(result, Err(ExtractionError::InvalidEncoding(_))));
    }

    #[test]
    fn test_supports_only_text() {
        let extractor = TextExtractor::new();
        assert!(extractor.supports(DocumentFormat::Text));
        assert!(!extractor.supports(DocumentFormat::Pdf));
        assert!(!extractor.supports(DocumentFormat::Docx));
    }
}
