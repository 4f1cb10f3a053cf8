//! Per-session cache of stage results, keyed by stage.

use std::collections::BTreeMap;

use crate::stage::{StageId, StageRegistry, StageResult, StageStatus};

/// At most one result per stage. A missing entry reads as Pending.
#[derive(Debug, Default, Clone)]
pub struct AnalysisCache {
    results: BTreeMap<StageId, StageResult>,
}

impl AnalysisCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, stage: StageId) -> Option<&StageResult> {
        self.results.get(&stage)
    }

    pub fn put(&mut self, result: StageResult) -> Option<StageResult> {
        self.results.insert(result.stage, result)
    }

    pub fn remove(&mut self, stage: StageId) -> Option<StageResult> {
        self.results.remove(&stage)
    }

    /// Drops the given stages, returning the ones that held an entry.
    pub fn invalidate(&mut self, stages: &[StageId]) -> Vec<StageId> {
        let mut removed: Vec<StageId> = stages
            .iter()
            .copied()
            .filter(|s| self.results.remove(s).is_some())
            .collect();
        removed.sort();
        removed
    }

    /// Drops every entry, returning the stages that held one.
    pub fn invalidate_all(&mut self) -> Vec<StageId> {
        std::mem::take(&mut self.results).into_keys().collect()
    }

    pub fn status(&self, stage: StageId) -> StageStatus {
        self.results
            .get(&stage)
            .map(|r| r.status.clone())
            .unwrap_or(StageStatus::Pending)
    }

    pub fn is_complete(&self, stage: StageId) -> bool {
        self.results
            .get(&stage)
            .is_some_and(StageResult::is_completed)
    }

    /// Output of a Completed stage.
    pub fn completed_output(&self, stage: StageId) -> Option<&str> {
        self.results
            .get(&stage)
            .filter(|r| r.is_completed())
            .map(|r| r.output.as_str())
    }

    /// Completed results in `registry` ordinal order. Stages the registry
    /// does not know are left out.
    pub fn completed<'a>(&'a self, registry: &StageRegistry) -> Vec<&'a StageResult> {
        registry
            .stages()
            .iter()
            .filter_map(|def| self.results.get(&def.id))
            .filter(|r| r.is_completed())
            .collect()
    }

    /// Every entry, in `StageId` order.
    pub fn iter(&self) -> impl Iterator<Item = &StageResult> {
        self.results.values()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}
