use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use crate::config::Config;
use crate::llm::GenerationConfig;
use crate::stage::StageId;

/// Runtime settings the controller reads for each stage run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub default_generation: GenerationConfig,
    pub default_timeout: Duration,
    /// Per-stage generation overrides, merged over the defaults.
    pub stage_generation: BTreeMap<StageId, GenerationConfig>,
    pub stage_timeouts: BTreeMap<StageId, Duration>,
    /// Optional stages selected when a new document arrives.
    pub default_optional: BTreeSet<StageId>,
    pub report_title: String,
}

impl PipelineConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            default_generation: config.generation.clone(),
            default_timeout: Duration::from_secs(config.llm.timeout_secs),
            stage_generation: config
                .stages
                .iter()
                .map(|(stage, o)| (*stage, o.generation.clone()))
                .collect(),
            stage_timeouts: config
                .stages
                .iter()
                .filter_map(|(stage, o)| o.timeout_secs.map(|s| (*stage, Duration::from_secs(s))))
                .collect(),
            default_optional: config.optional_stages.iter().copied().collect(),
            report_title: config.report.title.clone(),
        }
    }

    /// Global generation settings with the stage's overrides applied.
    pub fn generation_for(&self, stage: StageId) -> GenerationConfig {
        match self.stage_generation.get(&stage) {
            Some(overrides) => self.default_generation.merged(overrides),
            None => self.default_generation.clone(),
        }
    }

    pub fn timeout_for(&self, stage: StageId) -> Duration {
        self.stage_timeouts
            .get(&stage)
            .copied()
            .unwrap_or(self.default_timeout)
    }

    pub fn with_timeout(mut self, stage: StageId, timeout: Duration) -> Self {
        self.stage_timeouts.insert(stage, timeout);
        self
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StageOverride;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.default_timeout, Duration::from_secs(300));
        assert_eq!(config.report_title, "Proposal Analysis Report");
        assert_eq!(
            config.default_optional,
            [StageId::Pricing, StageId::CostRealism, StageId::Compliance]
                .into_iter()
                .collect::<BTreeSet<_>>()
        );
        assert_eq!(
            config.generation_for(StageId::Pricing),
            GenerationConfig::analysis_defaults()
        );
    }

    #[test]
    fn test_stage_overrides_apply_per_field() {
        let mut config = Config::default();
        config.stages.insert(
            StageId::ExecutiveSummary,
            StageOverride {
                timeout_secs: Some(600),
                generation: GenerationConfig {
                    temperature: Some(0.1),
                    ..Default::default()
                },
            },
        );
        let pipeline_config = PipelineConfig::from_config(&config);

        let summary = pipeline_config.generation_for(StageId::ExecutiveSummary);
        assert_eq!(summary.temperature, Some(0.1));
        assert_eq!(summary.max_output_tokens, Some(8192));
        assert_eq!(
            pipeline_config.timeout_for(StageId::ExecutiveSummary),
            Duration::from_secs(600)
        );
        assert_eq!(
            pipeline_config.timeout_for(StageId::Pricing),
            Duration::from_secs(300)
        );
    }

    #[test]
    fn test_with_timeout() {
        let config = PipelineConfig::default()
            .with_timeout(StageId::Compliance, Duration::from_millis(50));
        assert_eq!(
            config.timeout_for(StageId::Compliance),
            Duration::from_millis(50)
        );
    }
}
