use super::models::{Rule, RuleSet, Settings, StorageProvider};
use super::sources::{BLACKLIST_API_KEY_VAR, OUTPUT_BUCKET_VAR};
use crate::processors::ProcessorRegistry;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("file type key '{0}' is defined more than once")]
    DuplicateFileType(String),

    #[error("file type keys must not be empty")]
    EmptyFileType,

    #[error("rule '{file_type}' references unregistered transform '{transform_id}'")]
    UnknownTransform {
        file_type: String,
        transform_id: String,
    },

    #[error("rule '{file_type}' has an empty output_suffix")]
    EmptyOutputSuffix { file_type: String },

    #[error("rule '{file_type}' has max_size_bytes = 0")]
    ZeroSizeLimit { file_type: String },

    #[error("required environment variable {0} is not set")]
    MissingEnv(&'static str),

    #[error("storage provider is S3 but credentials are missing (access_key or secret_key)")]
    MissingS3Credentials,

    #[error("invalid blacklist endpoint '{0}': expected an http(s) URL")]
    InvalidBlacklistEndpoint(String),

    #[error("invalid blacklist retry policy: {0}")]
    InvalidRetryPolicy(String),

    #[error("{field} must be positive")]
    ZeroValue { field: &'static str },
}

/// Build a rule set from document entries, rejecting duplicate keys
///
/// Keys are compared after normalization, so `CSV` and `.csv` collide.
pub fn rule_set_from_entries(entries: Vec<(String, Rule)>) -> Result<RuleSet, ValidationError> {
    let mut rules = BTreeMap::new();

    for (key, rule) in entries {
        let normalized = RuleSet::normalize_key(&key);
        if normalized.is_empty() {
            return Err(ValidationError::EmptyFileType);
        }
        if rules.insert(normalized, rule).is_some() {
            return Err(ValidationError::DuplicateFileType(key));
        }
    }

    Ok(RuleSet { rules })
}

/// Check every rule against the registry and its own invariants
pub fn validate_rules(rules: &RuleSet, registry: &ProcessorRegistry) -> Result<(), ValidationError> {
    for (file_type, rule) in rules.iter() {
        if !registry.contains(&rule.transform_id) {
            return Err(ValidationError::UnknownTransform {
                file_type: file_type.to_string(),
                transform_id: rule.transform_id.clone(),
            });
        }

        if rule.output_suffix.is_empty() {
            return Err(ValidationError::EmptyOutputSuffix {
                file_type: file_type.to_string(),
            });
        }

        if rule.max_size_bytes.as_u64() == 0 {
            return Err(ValidationError::ZeroSizeLimit {
                file_type: file_type.to_string(),
            });
        }
    }

    Ok(())
}

/// Validate process settings; run once at startup
pub fn validate_settings(settings: &Settings) -> Result<(), ValidationError> {
    validate_environment(settings)?;
    validate_storage(settings)?;
    validate_blacklist(settings)?;
    validate_limits(settings)?;
    Ok(())
}

fn validate_environment(settings: &Settings) -> Result<(), ValidationError> {
    if settings.blacklist.api_key.is_none() {
        return Err(ValidationError::MissingEnv(BLACKLIST_API_KEY_VAR));
    }
    if settings.output_bucket.as_deref().is_none_or(str::is_empty) {
        return Err(ValidationError::MissingEnv(OUTPUT_BUCKET_VAR));
    }
    Ok(())
}

fn validate_storage(settings: &Settings) -> Result<(), ValidationError> {
    if settings.storage.provider == StorageProvider::S3
        && (settings.storage.access_key.is_none() || settings.storage.secret_key.is_none())
    {
        return Err(ValidationError::MissingS3Credentials);
    }
    Ok(())
}

fn validate_blacklist(settings: &Settings) -> Result<(), ValidationError> {
    let blacklist = &settings.blacklist;

    if !(blacklist.endpoint.starts_with("http://") || blacklist.endpoint.starts_with("https://")) {
        return Err(ValidationError::InvalidBlacklistEndpoint(
            blacklist.endpoint.clone(),
        ));
    }

    if blacklist.request_timeout_ms == 0 {
        return Err(ValidationError::ZeroValue {
            field: "blacklist.request_timeout_ms",
        });
    }

    if blacklist.base_backoff_ms > blacklist.max_backoff_ms {
        return Err(ValidationError::InvalidRetryPolicy(format!(
            "base_backoff_ms ({}) exceeds max_backoff_ms ({})",
            blacklist.base_backoff_ms, blacklist.max_backoff_ms
        )));
    }

    if blacklist.total_budget_ms == 0 {
        return Err(ValidationError::ZeroValue {
            field: "blacklist.total_budget_ms",
        });
    }

    // The check must leave room for fetching, transforming and writing
    if blacklist.total_budget_ms >= settings.handler.invocation_timeout_ms {
        return Err(ValidationError::InvalidRetryPolicy(format!(
            "total_budget_ms ({}) must be below handler.invocation_timeout_ms ({})",
            blacklist.total_budget_ms, settings.handler.invocation_timeout_ms
        )));
    }

    Ok(())
}

fn validate_limits(settings: &Settings) -> Result<(), ValidationError> {
    if settings.server.max_concurrent_events == 0 {
        return Err(ValidationError::ZeroValue {
            field: "server.max_concurrent_events",
        });
    }
    if settings.server.max_payload_bytes.as_u64() == 0 {
        return Err(ValidationError::ZeroValue {
            field: "server.max_payload_bytes",
        });
    }
    if settings.handler.io_timeout_ms == 0 {
        return Err(ValidationError::ZeroValue {
            field: "handler.io_timeout_ms",
        });
    }
    if settings.handler.invocation_timeout_ms == 0 {
        return Err(ValidationError::ZeroValue {
            field: "handler.invocation_timeout_ms",
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::humanize::ByteSize;
    use serde_json::Value;

    fn rule(transform_id: &str) -> Rule {
        Rule {
            output_suffix: ".processed.csv".to_string(),
            transform_id: transform_id.to_string(),
            max_size_bytes: ByteSize(1_048_576),
            enabled: true,
            options: Value::Null,
        }
    }

    fn valid_settings() -> Settings {
        let mut settings = Settings::default();
        settings.blacklist.api_key = Some("key".to_string());
        settings.output_bucket = Some("out".to_string());
        settings
    }

    #[test]
    fn test_valid_settings() {
        assert!(validate_settings(&valid_settings()).is_ok());
    }

    #[test]
    fn test_missing_api_key() {
        let mut settings = valid_settings();
        settings.blacklist.api_key = None;
        assert!(matches!(
            validate_settings(&settings),
            Err(ValidationError::MissingEnv("BLACKLIST_API_KEY"))
        ));
    }

    #[test]
    fn test_missing_output_bucket() {
        let mut settings = valid_settings();
        settings.output_bucket = Some(String::new());
        assert!(matches!(
            validate_settings(&settings),
            Err(ValidationError::MissingEnv("OUTPUT_BUCKET"))
        ));
    }

    #[test]
    fn test_s3_credentials_missing() {
        let mut settings = valid_settings();
        settings.storage.provider = StorageProvider::S3;
        settings.storage.access_key = Some("id".to_string());
        assert!(matches!(
            validate_settings(&settings),
            Err(ValidationError::MissingS3Credentials)
        ));
    }

    #[test]
    fn test_blacklist_budget_must_fit_invocation() {
        let mut settings = valid_settings();
        settings.blacklist.total_budget_ms = 60_000;
        assert!(matches!(
            validate_settings(&settings),
            Err(ValidationError::InvalidRetryPolicy(_))
        ));
    }

    #[test]
    fn test_backoff_bounds() {
        let mut settings = valid_settings();
        settings.blacklist.base_backoff_ms = 5_000;
        assert!(matches!(
            validate_settings(&settings),
            Err(ValidationError::InvalidRetryPolicy(_))
        ));
    }

    #[test]
    fn test_endpoint_scheme() {
        let mut settings = valid_settings();
        settings.blacklist.endpoint = "ftp://blacklist".to_string();
        assert!(matches!(
            validate_settings(&settings),
            Err(ValidationError::InvalidBlacklistEndpoint(_))
        ));
    }

    #[test]
    fn test_duplicate_keys_after_normalization() {
        let entries = vec![
            ("csv".to_string(), rule("passthrough")),
            (".CSV".to_string(), rule("passthrough")),
        ];
        assert!(matches!(
            rule_set_from_entries(entries),
            Err(ValidationError::DuplicateFileType(key)) if key == ".CSV"
        ));
    }

    #[test]
    fn test_empty_key() {
        let entries = vec![(" . ".to_string(), rule("passthrough"))];
        // " . " trims to "." and then to ""
        assert!(matches!(
            rule_set_from_entries(entries),
            Err(ValidationError::EmptyFileType)
        ));
    }

    #[test]
    fn test_unregistered_transform() {
        let rules =
            rule_set_from_entries(vec![("csv".to_string(), rule("csv_shuffle"))]).unwrap();
        let registry = ProcessorRegistry::with_defaults();
        assert!(matches!(
            validate_rules(&rules, &registry),
            Err(ValidationError::UnknownTransform { ref transform_id, .. }) if transform_id == "csv_shuffle"
        ));
    }

    #[test]
    fn test_rule_invariants() {
        let registry = ProcessorRegistry::with_defaults();

        let mut empty_suffix = rule("passthrough");
        empty_suffix.output_suffix.clear();
        let rules = rule_set_from_entries(vec![("csv".to_string(), empty_suffix)]).unwrap();
        assert!(matches!(
            validate_rules(&rules, &registry),
            Err(ValidationError::EmptyOutputSuffix { .. })
        ));

        let mut zero_limit = rule("passthrough");
        zero_limit.max_size_bytes = ByteSize(0);
        let rules = rule_set_from_entries(vec![("csv".to_string(), zero_limit)]).unwrap();
        assert!(matches!(
            validate_rules(&rules, &registry),
            Err(ValidationError::ZeroSizeLimit { .. })
        ));
    }
}
