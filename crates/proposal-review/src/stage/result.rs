use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::StageId;
use crate::document::DocumentId;

/// Outcome of a stage run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum StageStatus {
    Pending,
    Completed,
    Failed(String),
}

impl StageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageStatus::Pending => "pending",
            StageStatus::Completed => "completed",
            StageStatus::Failed(_) => "failed",
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, StageStatus::Completed)
    }

    pub fn failure_reason(&self) -> Option<&str> {
        match self {
            StageStatus::Failed(reason) => Some(reason),
            _ => None,
        }
    }
}

/// Result of one stage for one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageResult {
    pub stage: StageId,
    pub document_id: DocumentId,
    pub status: StageStatus,
    /// Markdown text; empty unless Completed.
    pub output: String,
    pub extra_input: Option<String>,
    pub model: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl StageResult {
    pub fn pending(stage: StageId, document_id: DocumentId, extra_input: Option<String>) -> Self {
        Self {
            stage,
            document_id,
            status: StageStatus::Pending,
            output: String::new(),
            extra_input,
            model: None,
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Marks this result Completed with the given output.
    pub fn complete(mut self, output: String, model: impl Into<String>) -> Self {
        self.status = StageStatus::Completed;
        self.output = output;
        self.model = Some(model.into());
        self.completed_at = Some(Utc::now());
        self
    }

    /// Marks this result Failed. Output is cleared.
    pub fn fail(mut self, reason: impl Into<String>) -> Self {
        self.status = StageStatus::Failed(reason.into());
        self.output.clear();
        self.completed_at = Some(Utc::now());
        self
    }

    pub fn is_completed(&self) -> bool {
        self.status.is_completed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_then_complete() {
        let doc = DocumentId::new();
        let result = StageResult::pending(StageId::Pricing, doc, Some("FY23: $1M".into()));
        assert_eq!(result.status, StageStatus::Pending);
        assert!(result.output.is_empty());
        assert!(result.completed_at.is_none());

        let done = result.complete("## Price".into(), "fake-model");
        assert!(done.is_completed());
        assert_eq!(done.output, "## Price");
        assert_eq!(done.model.as_deref(), Some("fake-model"));
        assert_eq!(done.extra_input.as_deref(), Some("FY23: $1M"));
        assert!(done.completed_at.is_some());
    }

    #[test]
    fn test_fail_clears_output() {
        let doc = DocumentId::new();
        let result = StageResult::pending(StageId::Compliance, doc, None).fail("Timeout");
        assert_eq!(result.status.failure_reason(), Some("Timeout"));
        assert!(result.output.is_empty());
        assert_eq!(result.status.as_str(), "failed");
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_value(StageStatus::Failed("RateLimited".into())).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["reason"], "RateLimited");

        let json = serde_json::to_value(StageStatus::Completed).unwrap();
        assert_eq!(json["status"], "completed");
    }
}
