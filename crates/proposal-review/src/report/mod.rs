//! Combined report assembly and export.

pub mod pdf;

use std::fmt::Write as _;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::cache::AnalysisCache;
use crate::document::{Document, DocumentSummary};
use crate::error::ExportError;
use crate::stage::{StageId, StageRegistry};

pub use pdf::render_pdf;

/// One completed stage's output, labelled for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSection {
    pub stage: StageId,
    pub label: String,
    pub ordinal: u32,
    pub body: String,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Every completed stage output for the current document, in pipeline order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CombinedReport {
    pub title: String,
    pub document: Option<DocumentSummary>,
    pub generated_at: DateTime<Utc>,
    pub sections: Vec<ReportSection>,
}

impl CombinedReport {
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    pub fn stage_order(&self) -> Vec<StageId> {
        self.sections.iter().map(|s| s.stage).collect()
    }

    pub fn section(&self, stage: StageId) -> Option<&ReportSection> {
        self.sections.iter().find(|s| s.stage == stage)
    }

    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "# {}\n", self.title);

        if let Some(doc) = &self.document {
            let _ = writeln!(out, "Document: {}", doc.filename);
        }
        let _ = writeln!(
            out,
            "Generated: {}\n",
            self.generated_at.format("%Y-%m-%d %H:%M UTC")
        );

        if self.sections.is_empty() {
            out.push_str("_No analysis stages have completed._\n");
            return out;
        }

        for section in &self.sections {
            let _ = writeln!(out, "## {}\n", section.label);
            out.push_str(section.body.trim_end());
            out.push_str("\n\n");
        }
        out
    }

    pub fn write_markdown(&self, path: &Path) -> Result<(), ExportError> {
        std::fs::write(path, self.to_markdown()).map_err(|e| ExportError::WriteFile {
            path: path.to_path_buf(),
            source: e,
        })
    }

    pub fn write_pdf(&self, path: &Path) -> Result<(), ExportError> {
        let bytes = render_pdf(self)?;
        std::fs::write(path, bytes).map_err(|e| ExportError::WriteFile {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

/// Collects the Completed results for `document` in registry order.
///
/// Results left over from a different document are ignored.
pub fn assemble(
    registry: &StageRegistry,
    cache: &AnalysisCache,
    document: Option<&Document>,
    title: &str,
) -> CombinedReport {
    let sections = match document {
        Some(doc) => registry
            .stages()
            .iter()
            .filter_map(|def| {
                let result = cache.get(def.id)?;
                if !result.is_completed() || result.document_id != doc.id {
                    return None;
                }
                Some(ReportSection {
                    stage: def.id,
                    label: def.label.clone(),
                    ordinal: def.ordinal,
                    body: result.output.clone(),
                    completed_at: result.completed_at,
                })
            })
            .collect(),
        None => Vec::new(),
    };

    CombinedReport {
        title: title.to_string(),
        document: document.map(Document::summary),
        generated_at: Utc::now(),
        sections,
    }
}

/// Default export file name, e.g. `proposal_summary_20260101.md`.
pub fn default_file_name(extension: &str, date: DateTime<Utc>) -> String {
    format!("proposal_summary_{}.{}", date.format("%Y%m%d"), extension)
}
