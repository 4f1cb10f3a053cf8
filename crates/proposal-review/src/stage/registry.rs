//! The ordered, validated set of stage definitions.

use std::collections::{BTreeSet, HashSet};

use serde::Serialize;

use super::StageId;
use crate::error::ConfigError;

/// Static description of one stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageDefinition {
    pub id: StageId,
    pub ordinal: u32,
    pub label: String,
    /// Stages that must be Completed before this one may run.
    pub prerequisites: Vec<StageId>,
    /// Stages whose output is included when present, or marked
    /// "Not performed" when absent.
    pub context_inputs: Vec<StageId>,
    pub optional: bool,
    pub accepts_extra_input: bool,
}

impl StageDefinition {
    pub fn new(id: StageId, ordinal: u32, label: impl Into<String>) -> Self {
        Self {
            id,
            ordinal,
            label: label.into(),
            prerequisites: Vec::new(),
            context_inputs: Vec::new(),
            optional: false,
            accepts_extra_input: false,
        }
    }

    pub fn requires(mut self, stages: &[StageId]) -> Self {
        self.prerequisites.extend_from_slice(stages);
        self
    }

    pub fn with_context(mut self, stages: &[StageId]) -> Self {
        self.context_inputs.extend_from_slice(stages);
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn accepts_extra_input(mut self) -> Self {
        self.accepts_extra_input = true;
        self
    }

    /// Required stages followed by context stages.
    pub fn inputs(&self) -> impl Iterator<Item = StageId> + '_ {
        self.prerequisites
            .iter()
            .chain(self.context_inputs.iter())
            .copied()
    }
}

/// Immutable, ordinal-sorted registry of stages.
#[derive(Debug, Clone)]
pub struct StageRegistry {
    stages: Vec<StageDefinition>,
}

impl StageRegistry {
    /// Builds a registry, rejecting graphs that violate ordering rules.
    pub fn new(mut stages: Vec<StageDefinition>) -> Result<Self, ConfigError> {
        stages.sort_by_key(|s| s.ordinal);

        let mut seen_ids = HashSet::new();
        let mut last_ordinal: Option<u32> = None;

        for stage in &stages {
            if !seen_ids.insert(stage.id) {
                return Err(invalid(stage.id, "duplicate stage id"));
            }
            if last_ordinal == Some(stage.ordinal) {
                return Err(invalid(
                    stage.id,
                    format!("ordinal {} is used by more than one stage", stage.ordinal),
                ));
            }
            last_ordinal = Some(stage.ordinal);
        }

        for stage in &stages {
            for input in stage.inputs() {
                let Some(target) = stages.iter().find(|s| s.id == input) else {
                    return Err(invalid(
                        stage.id,
                        format!("references unknown stage '{}'", input),
                    ));
                };
                if target.ordinal >= stage.ordinal {
                    return Err(invalid(
                        stage.id,
                        format!("input '{}' does not come before this stage", input),
                    ));
                }
            }
            if !stage.optional {
                for prereq in &stage.prerequisites {
                    let target_optional = stages
                        .iter()
                        .any(|s| s.id == *prereq && s.optional);
                    if target_optional {
                        return Err(invalid(
                            stage.id,
                            format!("mandatory stage requires optional stage '{}'", prereq),
                        ));
                    }
                }
            }
        }

        Ok(Self { stages })
    }

    /// The six-stage proposal analysis workflow.
    pub fn standard() -> Self {
        use StageId::*;

        let stages = vec![
            StageDefinition::new(ComponentAnalysis, 1, "Component Analysis").accepts_extra_input(),
            StageDefinition::new(Pricing, 2, "Price Analysis")
                .requires(&[ComponentAnalysis])
                .optional()
                .accepts_extra_input(),
            StageDefinition::new(CostRealism, 3, "Cost Realism Check")
                .requires(&[ComponentAnalysis])
                .with_context(&[Pricing])
                .optional(),
            StageDefinition::new(TechnicalReview, 4, "Technical Analysis Review")
                .requires(&[ComponentAnalysis]),
            StageDefinition::new(Compliance, 5, "Compliance Assessment")
                .requires(&[ComponentAnalysis])
                .optional(),
            StageDefinition::new(ExecutiveSummary, 6, "Executive Summary")
                .requires(&[ComponentAnalysis])
                .with_context(&[Pricing, CostRealism, TechnicalReview, Compliance]),
        ];

        // The table above is fixed and satisfies every ordering rule.
        Self { stages }
    }

    /// All stages in ordinal order.
    pub fn stages(&self) -> &[StageDefinition] {
        &self.stages
    }

    pub fn definition(&self, id: StageId) -> Option<&StageDefinition> {
        self.stages.iter().find(|s| s.id == id)
    }

    pub fn contains(&self, id: StageId) -> bool {
        self.definition(id).is_some()
    }

    /// Zero-based position of a stage in ordinal order.
    pub fn position(&self, id: StageId) -> Option<usize> {
        self.stages.iter().position(|s| s.id == id)
    }

    pub fn first(&self) -> Option<StageId> {
        self.stages.first().map(|s| s.id)
    }

    pub fn next_after(&self, id: StageId) -> Option<StageId> {
        let pos = self.position(id)?;
        self.stages.get(pos + 1).map(|s| s.id)
    }

    pub fn previous_before(&self, id: StageId) -> Option<StageId> {
        let pos = self.position(id)?;
        pos.checked_sub(1)
            .and_then(|p| self.stages.get(p))
            .map(|s| s.id)
    }

    pub fn prerequisites_of(&self, id: StageId) -> &[StageId] {
        self.definition(id)
            .map(|d| d.prerequisites.as_slice())
            .unwrap_or(&[])
    }

    /// Required and context inputs of a stage.
    pub fn inputs_of(&self, id: StageId) -> Vec<StageId> {
        self.definition(id)
            .map(|d| d.inputs().collect())
            .unwrap_or_default()
    }

    /// Every stage that consumes `id` directly or transitively, in
    /// ordinal order.
    pub fn dependents_of(&self, id: StageId) -> Vec<StageId> {
        let mut affected: BTreeSet<StageId> = BTreeSet::new();
        affected.insert(id);

        // Inputs always precede consumers, so one ordinal-order sweep
        // reaches the transitive closure.
        let mut dependents = Vec::new();
        for stage in &self.stages {
            if stage.id == id {
                continue;
            }
            if stage.inputs().any(|input| affected.contains(&input)) {
                affected.insert(stage.id);
                dependents.push(stage.id);
            }
        }
        dependents
    }

    pub fn optional_stages(&self) -> Vec<StageId> {
        self.stages
            .iter()
            .filter(|s| s.optional)
            .map(|s| s.id)
            .collect()
    }
}

impl Default for StageRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

fn invalid(stage: StageId, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidStageGraph {
        stage: stage.to_string(),
        reason: reason.into(),
    }
}
