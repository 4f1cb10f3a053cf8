use std::path::Path;

use crate::config::schema::Config;
use crate::error::ConfigError;
use crate::llm::GenerationConfig;
use crate::stage::StageRegistry;

const SCHEMA_JSON: &str = include_str!("../../../../schema/config-v1.json");

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    let config = load_config_from_str(&content)?;
    tracing::debug!(path = %path.display(), "Loaded configuration");
    Ok(config)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let config: Config = serde_json::from_value(json_value)?;

    validate_config(&config)?;

    Ok(config)
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let error_messages: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if !error_messages.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: error_messages.join("; "),
        });
    }

    Ok(())
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(invalid(format!(
            "Unsupported config version: {}",
            config.version
        )));
    }

    if config.llm.timeout_secs == 0 {
        return Err(invalid("llm.timeoutSecs must be greater than zero"));
    }

    validate_generation(&config.generation, "generation")?;

    for (stage, stage_override) in &config.stages {
        validate_generation(
            &stage_override.generation,
            &format!("stages.{}.generation", stage),
        )?;
        if stage_override.timeout_secs == Some(0) {
            return Err(invalid(format!(
                "stages.{}.timeoutSecs must be greater than zero",
                stage
            )));
        }
    }

    let registry = StageRegistry::standard();
    for stage in &config.optional_stages {
        let is_optional = registry.definition(*stage).is_some_and(|d| d.optional);
        if !is_optional {
            return Err(invalid(format!(
                "optionalStages: '{}' is not an optional stage",
                stage
            )));
        }
    }

    if config.report.title.trim().is_empty() {
        return Err(invalid("report.title must not be empty"));
    }

    if config.session.idle_timeout_secs == 0 {
        return Err(invalid("session.idleTimeoutSecs must be greater than zero"));
    }

    Ok(())
}

fn validate_generation(generation: &GenerationConfig, field: &str) -> Result<(), ConfigError> {
    if let Some(t) = generation.temperature {
        if !(0.0..=2.0).contains(&t) {
            return Err(invalid(format!(
                "{}.temperature must be between 0 and 2, got {}",
                field, t
            )));
        }
    }
    if let Some(p) = generation.top_p {
        if !(p > 0.0 && p <= 1.0) {
            return Err(invalid(format!(
                "{}.topP must be in (0, 1], got {}",
                field, p
            )));
        }
    }
    let positive = [
        ("maxOutputTokens", generation.max_output_tokens),
        ("topK", generation.top_k),
        ("candidateCount", generation.candidate_count),
    ];
    for (name, value) in positive {
        if value == Some(0) {
            return Err(invalid(format!(
                "{}.{} must be greater than zero",
                field, name
            )));
        }
    }
    Ok(())
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        message: message.into(),
    }
}
