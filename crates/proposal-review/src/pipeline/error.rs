use thiserror::Error;

use super::state::SessionId;
use crate::db::DatabaseError;
use crate::stage::StageId;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Stage '{stage}' cannot run before: {}", join(.missing))]
    PrerequisiteNotMet {
        stage: StageId,
        missing: Vec<StageId>,
    },

    #[error("No document has been uploaded")]
    NoDocument,

    #[error("Stage '{running}' is already running in this session")]
    StageBusy { running: StageId },

    #[error("Run of stage '{stage}' was cancelled")]
    Cancelled { stage: StageId },

    #[error("Stage '{0}' is not part of this pipeline")]
    UnknownStage(StageId),

    #[error("Stage '{0}' is not optional")]
    NotOptional(StageId),

    #[error("Session '{0}' not found")]
    SessionNotFound(SessionId),

    #[error("Session storage failed: {0}")]
    Storage(#[from] DatabaseError),
}

fn join(stages: &[StageId]) -> String {
    stages
        .iter()
        .map(StageId::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prerequisite_message_lists_missing() {
        let err = PipelineError::PrerequisiteNotMet {
            stage: StageId::ExecutiveSummary,
            missing: vec![StageId::ComponentAnalysis],
        };
        assert_eq!(
            err.to_string(),
            "Stage 'executive_summary' cannot run before: component_analysis"
        );
    }
}
