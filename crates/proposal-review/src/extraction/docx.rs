use std::io::{Cursor, Read, Seek};

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::ExtractionError;
use crate::extraction::{DocumentExtractor, DocumentFormat};

pub struct DocxExtractor;

impl DocxExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for DocxExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentExtractor for DocxExtractor {
    fn extract(&self, bytes: &[u8]) -> Result<String, ExtractionError> {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
            .map_err(|e| ExtractionError::DocxProcessing(format!("Failed to open DOCX: {}", e)))?;

        extract_docx_text(&mut archive)
    }

    fn supports(&self, format: DocumentFormat) -> bool {
        matches!(format, DocumentFormat::Docx)
    }
}

fn extract_docx_text<R: Read + Seek>(
    archive: &mut zip::ZipArchive<R>,
) -> Result<String, ExtractionError> {
    let mut document_xml = archive.by_name("word/document.xml").map_err(|e| {
        ExtractionError::DocxProcessing(format!("Failed to find document.xml: {}", e))
    })?;

    let mut xml_content = String::new();
    document_xml.read_to_string(&mut xml_content).map_err(|e| {
        ExtractionError::DocxProcessing(format!("Failed to read document.xml: {}", e))
    })?;

    parse_docx_xml(&xml_content)
}

/// Collects `w:t` runs, one line per paragraph. `w:tab` and `w:br`
/// become a tab and a newline.
fn parse_docx_xml(xml: &str) -> Result<String, ExtractionError> {
    let mut reader = Reader::from_str(xml);

    let mut text = String::new();
    let mut in_text_element = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                if e.local_name().as_ref() == b"t" {
                    in_text_element = true;
                }
            }
            Ok(Event::Empty(ref e)) => match e.local_name().as_ref() {
                b"tab" => text.push('\t'),
                b"br" | b"cr" => text.push('\n'),
                _ => {}
            },
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"t" => in_text_element = false,
                b"p" => text.push('\n'),
                _ => {}
            },
            Ok(Event::Text(ref e)) if in_text_element => {
                let raw = std::str::from_utf8(e).map_err(|err| {
                    ExtractionError::DocxProcessing(format!("Invalid UTF-8 in text run: {}", err))
                })?;
                text.push_str(&unescape(raw));
            }
            Ok(Event::GeneralRef(ref e)) if in_text_element => {
                let name = std::str::from_utf8(e).unwrap_or_default();
                text.push_str(&unescape(&format!("&{};", name)));
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(ExtractionError::DocxProcessing(format!(
                    "XML parsing error: {}",
                    e
                )));
            }
            _ => {}
        }
    }

    Ok(text)
}

fn unescape(raw: &str) -> String {
    quick_xml::escape::unescape(raw)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| raw.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn docx_with_body(body: &str) -> Vec<u8> {
        let xml = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{}</w:body></w:document>"#,
            body
        );
        let mut buffer = Cursor::new(Vec::new());
        {
            let mut zip = zip::ZipWriter::new(&mut buffer);
            zip.start_file("word/document.xml", SimpleFileOptions::default())
                .unwrap();
            zip.write_all(xml.as_bytes()).unwrap();
            zip.finish().unwrap();
        }
        buffer.into_inner()
    }

    #[test]
    fn test_parse_paragraphs() {
        let xml = r#"<w:document><w:body>
            <w:p><w:r><w:t>Section 1</w:t></w:r></w:p>
            <w:p><w:r><w:t xml:space="preserve">Labor </w:t></w:r><w:r><w:t>rates</w:t></w:r></w:p>
        </w:body></w:document>"#;
        let text = parse_docx_xml(xml).unwrap();
        assert_eq!(text, "Section 1\nLabor rates\n");
    }

    #[test]
    fn test_parse_tabs_breaks_and_entities() {
        let xml = r#"<w:p><w:r><w:t>R&amp;D</w:t><w:tab/><w:t>$1M</w:t><w:br/><w:t>Total</w:t></w:r></w:p>"#;
        let text = parse_docx_xml(xml).unwrap();
        assert_eq!(text, "R&D\t$1M\nTotal\n");
    }

    #[test]
    fn test_extract_from_archive() {
        let bytes = docx_with_body("<w:p><w:r><w:t>Proposal narrative</w:t></w:r></w:p>");
        let text = DocxExtractor::new().extract(&bytes).unwrap();
        assert_eq!(text.trim(), "Proposal narrative");
    }

    #[test]
    fn test_archive_without_document_xml() {
        let mut buffer = Cursor::new(Vec::new());
        {
            let mut zip = zip::ZipWriter::new(&mut buffer);
            zip.start_file("other.xml", SimpleFileOptions::default())
                .unwrap();
            zip.write_all(b"<x/>").unwrap();
            zip.finish().unwrap();
        }
        let result = DocxExtractor::new().extract(&buffer.into_inner());
        assert!(matches!(result, Err(ExtractionError::DocxProcessing(_))));
    }

    #[test]
    fn test_not_a_zip() {
        let result = DocxExtractor::new().extract(b"plain text pretending to be docx");
        assert!(matches!(result, Err(ExtractionError::DocxProcessing(_))));
    }
}
