//! Renders a `CombinedReport` as a paginated PDF.
//!
//! Uses the standard Helvetica faces so no font embedding is needed.
//! Markdown is rendered loosely: headings get larger bold text, inline
//! emphasis and code markers are stripped, everything else is wrapped
//! plain text.

use std::sync::LazyLock;

use lopdf::{dictionary, Document, Object, ObjectId, Stream};
use regex::Regex;

use super::CombinedReport;
use crate::error::ExportError;

static RE_BOLD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*\*(.+?)\*\*").unwrap());
static RE_ITALIC: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*([^*\s][^*]*)\*").unwrap());
static RE_CODE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"`([^`]*)`").unwrap());

const PAGE_WIDTH: f32 = 612.0;
const PAGE_HEIGHT: f32 = 792.0;
const MARGIN: f32 = 50.0;
const BOTTOM: f32 = 60.0;
const BODY_SIZE: f32 = 11.0;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Style {
    Title,
    Heading,
    Subheading,
    Body,
}

impl Style {
    fn font(self) -> &'static str {
        match self {
            Style::Body => "F1",
            _ => "F2",
        }
    }

    fn size(self) -> f32 {
        match self {
            Style::Title => 18.0,
            Style::Heading => 14.0,
            Style::Subheading => 12.0,
            Style::Body => BODY_SIZE,
        }
    }

    fn space_before(self) -> f32 {
        match self {
            Style::Title => 0.0,
            Style::Heading => 12.0,
            Style::Subheading => 8.0,
            Style::Body => 0.0,
        }
    }
}

struct Line {
    style: Style,
    text: String,
}

pub fn render_pdf(report: &CombinedReport) -> Result<Vec<u8>, ExportError> {
    let lines = layout(report);
    let pages = paginate(&lines);

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let regular_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let bold_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica-Bold",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => regular_id,
            "F2" => bold_id,
        },
    });

    let total = pages.len();
    let mut page_ids: Vec<ObjectId> = Vec::with_capacity(total);
    for (index, page) in pages.iter().enumerate() {
        let content = page_content(page, index + 1);
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), PAGE_WIDTH.into(), PAGE_HEIGHT.into()],
            "Resources" => resources_id,
            "Contents" => content_id,
        });
        page_ids.push(page_id);
    }

    let kids: Vec<Object> = page_ids.iter().map(|id| (*id).into()).collect();
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => page_ids.len() as i64,
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer)
        .map_err(|e| ExportError::Pdf(e.to_string()))?;
    Ok(buffer)
}

fn layout(report: &CombinedReport) -> Vec<Line> {
    let mut lines = Vec::new();
    push_wrapped(&mut lines, Style::Title, &report.title);
    if let Some(doc) = &report.document {
        push_wrapped(&mut lines, Style::Body, &format!("Document: {}", doc.filename));
    }
    push_wrapped(
        &mut lines,
        Style::Body,
        &format!("Generated: {}", report.generated_at.format("%Y-%m-%d %H:%M UTC")),
    );

    if report.sections.is_empty() {
        push_wrapped(&mut lines, Style::Body, "");
        push_wrapped(&mut lines, Style::Body, "No analysis stages have completed.");
    }

    for section in &report.sections {
        push_wrapped(&mut lines, Style::Heading, &section.label);
        for raw in section.body.lines() {
            let (style, text) = classify(raw);
            push_wrapped(&mut lines, style, &strip_inline(text));
        }
    }
    lines
}

/// Headings inside a section body render one level below the section title.
fn classify(line: &str) -> (Style, &str) {
    let trimmed = line.trim_start();
    if let Some(rest) = trimmed.strip_prefix("### ") {
        (Style::Subheading, rest)
    } else if let Some(rest) = trimmed.strip_prefix("## ") {
        (Style::Subheading, rest)
    } else if let Some(rest) = trimmed.strip_prefix("# ") {
        (Style::Subheading, rest)
    } else {
        (Style::Body, line)
    }
}

fn strip_inline(text: &str) -> String {
    let text = RE_BOLD.replace_all(text, "$1");
    let text = RE_ITALIC.replace_all(&text, "$1");
    RE_CODE.replace_all(&text, "$1").into_owned()
}

fn push_wrapped(lines: &mut Vec<Line>, style: Style, text: &str) {
    // Helvetica averages roughly half an em per glyph.
    let max_chars = ((PAGE_WIDTH - 2.0 * MARGIN) / (style.size() * 0.5)) as usize;

    let mut current = String::new();
    for word in text.split_whitespace() {
        let needed = if current.is_empty() {
            word.len()
        } else {
            current.len() + 1 + word.len()
        };
        if needed > max_chars && !current.is_empty() {
            lines.push(Line {
                style,
                text: std::mem::take(&mut current),
            });
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    lines.push(Line {
        style,
        text: current,
    });
}

fn paginate(lines: &[Line]) -> Vec<Vec<(f32, &Line)>> {
    let mut pages = Vec::new();
    let mut page = Vec::new();
    let mut y = PAGE_HEIGHT - MARGIN;

    for line in lines {
        let advance = line.style.space_before() + line.style.size() * 1.3;
        if y - advance < BOTTOM && !page.is_empty() {
            pages.push(std::mem::take(&mut page));
            y = PAGE_HEIGHT - MARGIN;
        }
        y -= advance;
        page.push((y, line));
    }
    pages.push(page);
    pages
}

fn page_content(lines: &[(f32, &Line)], page_number: usize) -> String {
    let mut content = String::new();
    for (y, line) in lines {
        if line.text.is_empty() {
            continue;
        }
        content.push_str(&format!(
            "BT\n/{} {} Tf\n{} {} Td\n({}) Tj\nET\n",
            line.style.font(),
            line.style.size(),
            MARGIN,
            y,
            escape_pdf_string(&line.text)
        ));
    }
    content.push_str(&format!(
        "BT\n/F1 9 Tf\n{} 30 Td\n(Page {}) Tj\nET\n",
        PAGE_WIDTH / 2.0 - 15.0,
        page_number
    ));
    content
}

/// Escapes `s` for a PDF literal string in WinAnsi encoding.
///
/// Latin-1 characters are written as octal escapes. Characters outside the
/// encoding become `?`, except check marks, which read as Yes or No.
fn escape_pdf_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '(' => out.push_str("\\("),
            ')' => out.push_str("\\)"),
            '\\' => out.push_str("\\\\"),
            '\u{2022}' | '\u{2013}' | '\u{2014}' => out.push('-'),
            '\u{2018}' | '\u{2019}' => out.push('\''),
            '\u{201c}' | '\u{201d}' => out.push('"'),
            '\u{2705}' | '\u{2714}' | '\u{2713}' => out.push_str("Yes"),
            '\u{274c}' | '\u{2716}' | '\u{2717}' => out.push_str("No"),
            '\u{fe0f}' => {}
            '\t' => out.push(' '),
            c if c.is_ascii() && !c.is_control() => out.push(c),
            c if ('\u{a0}'..='\u{ff}').contains(&c) => {
                out.push_str(&format!("\\{:03o}", c as u32));
            }
            _ => out.push('?'),
        }
    }
    out
}
