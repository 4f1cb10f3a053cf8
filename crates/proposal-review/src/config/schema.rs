use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::llm::GenerationConfig;
use crate::stage::StageId;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub version: String,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default = "GenerationConfig::analysis_defaults")]
    pub generation: GenerationConfig,
    /// Per-stage overrides keyed by stage id.
    #[serde(default)]
    pub stages: BTreeMap<StageId, StageOverride>,
    /// Optional stages selected when a document is uploaded.
    #[serde(default = "default_optional_stages")]
    pub optional_stages: Vec<StageId>,
    #[serde(default)]
    pub report: ReportConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            llm: LlmConfig::default(),
            generation: GenerationConfig::analysis_defaults(),
            stages: BTreeMap::new(),
            optional_stages: default_optional_stages(),
            report: ReportConfig::default(),
            session: SessionConfig::default(),
        }
    }
}

fn default_optional_stages() -> Vec<StageId> {
    vec![StageId::Pricing, StageId::CostRealism, StageId::Compliance]
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProviderKind {
    #[default]
    Gemini,
    Fake,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmConfig {
    #[serde(default)]
    pub provider: LlmProviderKind,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Inline API key. Prefer `api_key_file` or `api_key_env_var`.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_key_file: Option<String>,
    #[serde(default = "default_api_key_env_var")]
    pub api_key_env_var: Option<String>,
    /// Default per-call timeout for every stage.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_model() -> String {
    crate::llm::DEFAULT_MODEL.to_string()
}

fn default_endpoint() -> String {
    crate::llm::DEFAULT_ENDPOINT.to_string()
}

fn default_api_key_env_var() -> Option<String> {
    Some("GOOGLE_API_KEY".to_string())
}

fn default_timeout_secs() -> u64 {
    300
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProviderKind::default(),
            model: default_model(),
            endpoint: default_endpoint(),
            api_key: None,
            api_key_file: None,
            api_key_env_var: default_api_key_env_var(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageOverride {
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub generation: GenerationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportConfig {
    #[serde(default = "default_report_title")]
    pub title: String,
}

fn default_report_title() -> String {
    "Proposal Analysis Report".to_string()
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            title: default_report_title(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    /// Idle sessions are dropped after this many seconds.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    #[serde(default)]
    pub database_path: Option<String>,
}

fn default_idle_timeout_secs() -> u64 {
    3600
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: default_idle_timeout_secs(),
            database_path: None,
        }
    }
}
