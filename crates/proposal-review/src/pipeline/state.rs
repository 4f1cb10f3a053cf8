use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::document::DocumentId;
use crate::stage::StageId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Navigation state of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    /// The stage the user is looking at.
    pub current: StageId,
    pub selected_optional: BTreeSet<StageId>,
    pub document_id: Option<DocumentId>,
}

impl SessionState {
    pub fn new(first: StageId, selected_optional: BTreeSet<StageId>) -> Self {
        Self {
            current: first,
            selected_optional,
            document_id: None,
        }
    }
}

/// Where a session is in its workflow, derived from its state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", content = "detail", rename_all = "snake_case")]
pub enum PipelinePhase {
    /// No document.
    Idle,
    /// A document is loaded and the current stage has not run.
    Ready,
    Running(StageId),
    StageDone(StageId),
    StageFailed(StageId, String),
    /// Every mandatory and selected optional stage is Completed.
    AllDone,
}

/// Outcome of `advance` or `retreat`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    Moved(StageId),
    Blocked(BlockReason),
    /// Already at the last reachable stage.
    Finished,
    AtStart,
    NoDocument,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockReason {
    /// The current stage is mandatory and not yet Completed.
    CurrentIncomplete(StageId),
    PrerequisitesMissing {
        stage: StageId,
        missing: Vec<StageId>,
    },
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockReason::CurrentIncomplete(stage) => {
                write!(f, "stage '{}' must complete first", stage)
            }
            BlockReason::PrerequisitesMissing { stage, missing } => {
                let missing: Vec<&str> = missing.iter().map(StageId::as_str).collect();
                write!(f, "stage '{}' needs {}", stage, missing.join(", "))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id_round_trip() {
        let id = SessionId::new();
        assert_eq!(id.to_string().parse::<SessionId>().unwrap(), id);
        assert!("not-a-uuid".parse::<SessionId>().is_err());
    }

    #[test]
    fn test_block_reason_display() {
        let reason = BlockReason::PrerequisitesMissing {
            stage: StageId::ExecutiveSummary,
            missing: vec![StageId::ComponentAnalysis],
        };
        assert_eq!(
            reason.to_string(),
            "stage 'executive_summary' needs component_analysis"
        );
    }

    #[test]
    fn test_phase_serialization() {
        let json = serde_json::to_value(PipelinePhase::StageFailed(
            StageId::Pricing,
            "Timeout".into(),
        ))
        .unwrap();
        assert_eq!(json["phase"], "stage_failed");
        assert_eq!(json["detail"][0], "pricing");
        assert_eq!(json["detail"][1], "Timeout");

        let json = serde_json::to_value(PipelinePhase::Idle).unwrap();
        assert_eq!(json["phase"], "idle");
    }
}
