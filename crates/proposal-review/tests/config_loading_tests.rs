//! Table-driven tests for configuration loading and validation.

mod common;

use std::time::Duration;

use proposal_review::config::{load_config, load_config_from_str, LlmProviderKind};
use proposal_review::{ConfigError, PipelineConfig, StageId};

/// Represents a single config loading test case.
struct ConfigTestCase {
    /// Test case name for identification.
    name: &'static str,
    /// The config JSON content to test.
    config_json: &'static str,
    /// Whether loading should succeed.
    should_succeed: bool,
    /// Expected error substring (if should_succeed is false).
    expected_error: Option<&'static str>,
}

const JSON_CONFIG_TESTS: &[ConfigTestCase] = &[
    ConfigTestCase {
        name: "valid_minimal",
        config_json: r#"{ "version": "1.0" }"#,
        should_succeed: true,
        expected_error: None,
    },
    ConfigTestCase {
        name: "valid_full",
        config_json: r#"{
            "version": "1.0",
            "llm": {
                "provider": "gemini",
                "model": "gemini-2.0-flash",
                "endpoint": "https://generativelanguage.googleapis.com/v1beta",
                "apiKey": null,
                "apiKeyFile": null,
                "apiKeyEnvVar": "GOOGLE_API_KEY",
                "timeoutSecs": 300
            },
            "generation": {
                "temperature": 0.3,
                "maxOutputTokens": 8192,
                "topP": 0.8,
                "topK": 40,
                "candidateCount": 1
            },
            "stages": {
                "executive_summary": {
                    "timeoutSecs": 600,
                    "generation": { "maxOutputTokens": 8192 }
                }
            },
            "optionalStages": ["pricing", "cost_realism", "compliance"],
            "report": { "title": "Proposal Analysis Report" },
            "session": { "idleTimeoutSecs": 3600, "databasePath": null }
        }"#,
        should_succeed: true,
        expected_error: None,
    },
    ConfigTestCase {
        name: "fake_provider",
        config_json: r#"{ "version": "1.0", "llm": { "provider": "fake" } }"#,
        should_succeed: true,
        expected_error: None,
    },
    ConfigTestCase {
        name: "missing_version",
        config_json: r#"{ "llm": { "provider": "fake" } }"#,
        should_succeed: false,
        expected_error: Some("Schema validation failed"),
    },
    ConfigTestCase {
        name: "unsupported_version",
        config_json: r#"{ "version": "2.0" }"#,
        should_succeed: false,
        expected_error: Some("Unsupported config version"),
    },
    ConfigTestCase {
        name: "unknown_top_level_field",
        config_json: r#"{ "version": "1.0", "workers": 4 }"#,
        should_succeed: false,
        expected_error: Some("Schema validation failed"),
    },
    ConfigTestCase {
        name: "unknown_provider",
        config_json: r#"{ "version": "1.0", "llm": { "provider": "openai" } }"#,
        should_succeed: false,
        expected_error: Some("Schema validation failed"),
    },
    ConfigTestCase {
        name: "unknown_stage_override",
        config_json: r#"{ "version": "1.0", "stages": { "risk_review": { "timeoutSecs": 60 } } }"#,
        should_succeed: false,
        expected_error: Some("Schema validation failed"),
    },
    ConfigTestCase {
        name: "temperature_out_of_range",
        config_json: r#"{ "version": "1.0", "generation": { "temperature": 3.5 } }"#,
        should_succeed: false,
        expected_error: Some("Schema validation failed"),
    },
    ConfigTestCase {
        name: "zero_top_p",
        config_json: r#"{ "version": "1.0", "generation": { "topP": 0 } }"#,
        should_succeed: false,
        expected_error: Some("Schema validation failed"),
    },
    ConfigTestCase {
        name: "zero_llm_timeout",
        config_json: r#"{ "version": "1.0", "llm": { "timeoutSecs": 0 } }"#,
        should_succeed: false,
        expected_error: Some("llm.timeoutSecs must be greater than zero"),
    },
    ConfigTestCase {
        name: "zero_stage_timeout",
        config_json: r#"{ "version": "1.0", "stages": { "pricing": { "timeoutSecs": 0 } } }"#,
        should_succeed: false,
        expected_error: Some("stages.pricing.timeoutSecs must be greater than zero"),
    },
    ConfigTestCase {
        name: "mandatory_stage_marked_optional",
        config_json: r#"{ "version": "1.0", "optionalStages": ["technical_review"] }"#,
        should_succeed: false,
        expected_error: Some("'technical_review' is not an optional stage"),
    },
    ConfigTestCase {
        name: "blank_report_title",
        config_json: r#"{ "version": "1.0", "report": { "title": "  " } }"#,
        should_succeed: false,
        expected_error: Some("report.title must not be empty"),
    },
    ConfigTestCase {
        name: "zero_idle_timeout",
        config_json: r#"{ "version": "1.0", "session": { "idleTimeoutSecs": 0 } }"#,
        should_succeed: false,
        expected_error: Some("session.idleTimeoutSecs must be greater than zero"),
    },
    ConfigTestCase {
        name: "not_json",
        config_json: "version: 1.0",
        should_succeed: false,
        expected_error: Some("Failed to parse config JSON"),
    },
];

#[test]
fn test_json_config_loading() {
    for test_case in JSON_CONFIG_TESTS {
        let result = load_config_from_str(test_case.config_json);

        if test_case.should_succeed {
            assert!(
                result.is_ok(),
                "Test '{}': Expected success but got error: {:?}",
                test_case.name,
                result.err()
            );
        } else {
            assert!(
                result.is_err(),
                "Test '{}': Expected error but got success",
                test_case.name
            );

            if let Some(expected_error) = test_case.expected_error {
                let error_msg = result.err().unwrap().to_string();
                assert!(
                    error_msg.contains(expected_error),
                    "Test '{}': Expected error containing '{}', got '{}'",
                    test_case.name,
                    expected_error,
                    error_msg
                );
            }
        }
    }
}

#[test]
fn test_defaults_fill_missing_sections() {
    let config = load_config_from_str(r#"{ "version": "1.0" }"#).unwrap();
    assert_eq!(config.llm.provider, LlmProviderKind::Gemini);
    assert_eq!(config.llm.timeout_secs, 300);
    assert_eq!(config.llm.api_key_env_var.as_deref(), Some("GOOGLE_API_KEY"));
    assert_eq!(config.generation.temperature, Some(0.3));
    assert_eq!(
        config.optional_stages,
        vec![StageId::Pricing, StageId::CostRealism, StageId::Compliance]
    );
    assert_eq!(config.report.title, "Proposal Analysis Report");
    assert_eq!(config.session.idle_timeout_secs, 3600);
}

#[test]
fn test_stage_overrides_reach_pipeline_config() {
    let config = load_config_from_str(
        r#"{
            "version": "1.0",
            "generation": { "temperature": 0.5 },
            "stages": {
                "executive_summary": {
                    "timeoutSecs": 600,
                    "generation": { "temperature": 0.1 }
                }
            },
            "optionalStages": ["compliance"]
        }"#,
    )
    .unwrap();

    let pipeline_config = PipelineConfig::from_config(&config);
    assert_eq!(
        pipeline_config.timeout_for(StageId::ExecutiveSummary),
        Duration::from_secs(600)
    );
    assert_eq!(
        pipeline_config.generation_for(StageId::ExecutiveSummary).temperature,
        Some(0.1)
    );
    assert_eq!(
        pipeline_config.generation_for(StageId::Pricing).temperature,
        Some(0.5)
    );
    assert_eq!(
        pipeline_config.default_optional.iter().copied().collect::<Vec<_>>(),
        vec![StageId::Compliance]
    );
}

#[test]
fn test_load_config_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(
        &path,
        r#"{ "version": "1.0", "llm": { "provider": "fake" }, "report": { "title": "Bid Review" } }"#,
    )
    .unwrap();

    let config = load_config(&path).unwrap();
    assert_eq!(config.llm.provider, LlmProviderKind::Fake);
    assert_eq!(config.report.title, "Bid Review");

    let missing = dir.path().join("missing.json");
    assert!(matches!(
        load_config(&missing),
        Err(ConfigError::ReadFile { .. })
    ));
}
