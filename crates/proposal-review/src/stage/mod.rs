//! Stage identifiers, definitions and per-stage results.

pub mod registry;
pub mod result;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use registry::{StageDefinition, StageRegistry};
pub use result::{StageResult, StageStatus};

/// Identifier of one analysis stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageId {
    ComponentAnalysis,
    Pricing,
    CostRealism,
    TechnicalReview,
    Compliance,
    ExecutiveSummary,
}

impl StageId {
    /// All stages in their standard order.
    pub const ALL: [StageId; 6] = [
        StageId::ComponentAnalysis,
        StageId::Pricing,
        StageId::CostRealism,
        StageId::TechnicalReview,
        StageId::Compliance,
        StageId::ExecutiveSummary,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StageId::ComponentAnalysis => "component_analysis",
            StageId::Pricing => "pricing",
            StageId::CostRealism => "cost_realism",
            StageId::TechnicalReview => "technical_review",
            StageId::Compliance => "compliance",
            StageId::ExecutiveSummary => "executive_summary",
        }
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown stage id: '{0}'")]
pub struct ParseStageIdError(pub String);

impl FromStr for StageId {
    type Err = ParseStageIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        StageId::ALL
            .into_iter()
            .find(|id| id.as_str() == normalized)
            .ok_or_else(|| ParseStageIdError(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_id_round_trips_through_str() {
        for id in StageId::ALL {
            assert_eq!(id.as_str().parse::<StageId>().unwrap(), id);
        }
    }

    #[test]
    fn test_stage_id_parse_accepts_dashes_and_case() {
        assert_eq!(
            "Cost-Realism".parse::<StageId>().unwrap(),
            StageId::CostRealism
        );
        assert!("budget".parse::<StageId>().is_err());
    }

    #[test]
    fn test_stage_id_serde_snake_case() {
        let json = serde_json::to_string(&StageId::TechnicalReview).unwrap();
        assert_eq!(json, "\"technical_review\"");
        let parsed: StageId = serde_json::from_str("\"executive_summary\"").unwrap();
        assert_eq!(parsed, StageId::ExecutiveSummary);
    }
}
