//! Text generation gateway used by the analysis stages.
//!
//! Stages talk to a model through the [`LlmGateway`] trait. The Gemini
//! implementation calls the `generateContent` REST endpoint; the fake
//! implementation serves scripted replies for tests and offline runs.

mod fake;
mod gemini;

pub use fake::FakeGateway;
pub use gemini::{GeminiGateway, DEFAULT_ENDPOINT, DEFAULT_MODEL};

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{LlmConfig, LlmProviderKind};
use crate::error::ConfigError;
use crate::secrets::resolve_secret;

/// Sampling parameters sent with every generation request.
///
/// Unset fields are left to the provider's defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidate_count: Option<u32>,
}

impl GenerationConfig {
    /// Settings used for analysis stages unless overridden.
    pub fn analysis_defaults() -> Self {
        Self {
            temperature: Some(0.3),
            max_output_tokens: Some(8192),
            top_p: Some(0.8),
            top_k: Some(40),
            candidate_count: Some(1),
        }
    }

    /// Returns `self` with every field set in `overrides` replaced.
    pub fn merged(&self, overrides: &GenerationConfig) -> Self {
        Self {
            temperature: overrides.temperature.or(self.temperature),
            max_output_tokens: overrides.max_output_tokens.or(self.max_output_tokens),
            top_p: overrides.top_p.or(self.top_p),
            top_k: overrides.top_k.or(self.top_k),
            candidate_count: overrides.candidate_count.or(self.candidate_count),
        }
    }
}

/// Failure of a single generation call.
///
/// The `Display` form is what gets stored as a stage's failure reason.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    #[error("Timeout")]
    Timeout,

    #[error("RateLimited")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("RemoteFailure: {0}")]
    RemoteFailure(String),
}

/// A model that turns a prompt into Markdown text.
#[async_trait]
pub trait LlmGateway: Send + Sync + fmt::Debug {
    async fn generate(
        &self,
        prompt: &str,
        config: &GenerationConfig,
    ) -> Result<String, GenerationError>;

    /// Provider name, e.g. "gemini" or "fake".
    fn provider_name(&self) -> &'static str;

    fn model_name(&self) -> &str;
}

/// Builds the gateway described by the `llm` config section.
pub fn create_gateway(config: &LlmConfig) -> Result<Arc<dyn LlmGateway>, ConfigError> {
    match config.provider {
        LlmProviderKind::Fake => Ok(Arc::new(FakeGateway::default())),
        LlmProviderKind::Gemini => {
            let api_key = resolve_secret(
                config.api_key.as_deref(),
                config.api_key_file.as_deref(),
                config.api_key_env_var.as_deref(),
            )?;
            let gateway = GeminiGateway::new(api_key, config.model.clone())
                .with_endpoint(config.endpoint.clone());
            Ok(Arc::new(gateway))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merged_prefers_overrides() {
        let base = GenerationConfig::analysis_defaults();
        let overrides = GenerationConfig {
            temperature: Some(0.1),
            max_output_tokens: Some(2048),
            ..Default::default()
        };
        let merged = base.merged(&overrides);
        assert_eq!(merged.temperature, Some(0.1));
        assert_eq!(merged.max_output_tokens, Some(2048));
        assert_eq!(merged.top_p, Some(0.8));
        assert_eq!(merged.top_k, Some(40));
    }

    #[test]
    fn test_generation_config_camel_case() {
        let json = serde_json::to_value(GenerationConfig::analysis_defaults()).unwrap();
        assert_eq!(json["maxOutputTokens"], 8192);
        assert_eq!(json["topK"], 40);
        assert_eq!(json["candidateCount"], 1);

        let empty = serde_json::to_value(GenerationConfig::default()).unwrap();
        assert_eq!(empty, serde_json::json!({}));
    }

    #[test]
    fn test_error_display_is_failure_reason() {
        assert_eq!(GenerationError::Timeout.to_string(), "Timeout");
        assert_eq!(
            GenerationError::RateLimited {
                retry_after_secs: Some(30)
            }
            .to_string(),
            "RateLimited"
        );
        assert_eq!(
            GenerationError::RemoteFailure("quota exceeded".into()).to_string(),
            "RemoteFailure: quota exceeded"
        );
    }

    #[test]
    fn test_create_fake_gateway() {
        let config = LlmConfig {
            provider: LlmProviderKind::Fake,
            ..Default::default()
        };
        let gateway = create_gateway(&config).unwrap();
        assert_eq!(gateway.provider_name(), "fake");
    }

    #[test]
    fn test_create_gemini_gateway_without_key_fails() {
        let config = LlmConfig {
            provider: LlmProviderKind::Gemini,
            api_key: None,
            api_key_file: None,
            api_key_env_var: Some("PROPOSAL_REVIEW_TEST_UNSET_KEY".into()),
            ..Default::default()
        };
        assert!(matches!(
            create_gateway(&config),
            Err(ConfigError::Secret(_))
        ));
    }

    #[test]
    fn test_create_gemini_gateway_with_direct_key() {
        let config = LlmConfig {
            provider: LlmProviderKind::Gemini,
            api_key: Some("test-key".into()),
            model: "gemini-2.0-flash".into(),
            ..Default::default()
        };
        let gateway = create_gateway(&config).unwrap();
        assert_eq!(gateway.provider_name(), "gemini");
        assert_eq!(gateway.model_name(), "gemini-2.0-flash");
    }
}
