use super::ConfigError;
use super::models::Settings;
use config::{Environment, File, FileFormat};
use std::env;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

const CONFIG_ENV_VAR: &str = "FILEGATE_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/filegate.toml";
const ENV_PREFIX: &str = "FILEGATE";
const ENV_SEPARATOR: &str = "__";

pub const BLACKLIST_API_KEY_VAR: &str = "BLACKLIST_API_KEY";
pub const OUTPUT_BUCKET_VAR: &str = "OUTPUT_BUCKET";

const BUNDLED_RULES: &str = include_str!("../../config/rules.json");

/// Load settings with priority (lowest to highest):
/// 1. Defaults (embedded in structs)
/// 2. TOML file (if exists)
/// 3. Environment variables from .env file (via dotenvy)
/// 4. System environment variables
///
/// An explicit `config_path` wins over `FILEGATE_CONFIG`.
pub fn load(config_path: Option<&Path>) -> Result<Settings, ConfigError> {
    // Missing .env is fine
    let _ = dotenvy::dotenv();

    let config_path = match config_path {
        Some(path) => path.to_path_buf(),
        None => env::var(CONFIG_ENV_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH)),
    };

    let mut settings = load_from_sources(&config_path)?;
    load_secrets(&mut settings, |name| env::var(name).ok());

    Ok(settings)
}

/// Copy secrets and deployment-supplied values from the environment
///
/// `lookup` abstracts the environment so tests never mutate process state.
pub fn load_secrets<F>(settings: &mut Settings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let non_empty = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

    if let Some(api_key) = non_empty(BLACKLIST_API_KEY_VAR) {
        settings.blacklist.api_key = Some(api_key);
    }
    if let Some(bucket) = non_empty(OUTPUT_BUCKET_VAR) {
        settings.output_bucket = Some(bucket);
    }

    settings.storage.access_key = non_empty("S3_ACCESS_KEY").or_else(|| non_empty("AWS_ACCESS_KEY_ID"));
    settings.storage.secret_key =
        non_empty("S3_SECRET_KEY").or_else(|| non_empty("AWS_SECRET_ACCESS_KEY"));
}

/// Load settings from a specific TOML path plus `FILEGATE__*` overrides
pub fn load_from_sources(config_path: &Path) -> Result<Settings, ConfigError> {
    let mut builder = config::Config::builder();

    if config_path.exists() {
        tracing::info!(path = %config_path.display(), "Loading settings");
        builder = builder.add_source(File::from(config_path).format(FileFormat::Toml));
    } else {
        tracing::warn!(
            path = %config_path.display(),
            "Settings file not found, using defaults and environment overrides"
        );
    }

    // FILEGATE__BLACKLIST__MAX_RETRIES -> blacklist.max_retries
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator(ENV_SEPARATOR)
            .separator(ENV_SEPARATOR)
            .try_parsing(true),
    );

    Ok(builder.build()?.try_deserialize()?)
}

/// Where a rule document is read from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleSource {
    File(PathBuf),
    /// Copy of `config/rules.json` compiled into the binary
    Bundled,
}

impl RuleSource {
    pub fn from_settings(settings: &Settings) -> Self {
        if settings.rules.bundled {
            RuleSource::Bundled
        } else {
            RuleSource::File(settings.rules.path.clone())
        }
    }

    pub fn read(&self) -> Result<Vec<u8>, ConfigError> {
        match self {
            RuleSource::File(path) => std::fs::read(path).map_err(|source| ConfigError::Read {
                path: path.clone(),
                source,
            }),
            RuleSource::Bundled => Ok(BUNDLED_RULES.as_bytes().to_vec()),
        }
    }

    /// Modification time, for sources that can change under a running process
    pub fn modified(&self) -> Option<SystemTime> {
        match self {
            RuleSource::File(path) => std::fs::metadata(path).and_then(|m| m.modified()).ok(),
            RuleSource::Bundled => None,
        }
    }
}

impl std::fmt::Display for RuleSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuleSource::File(path) => write!(f, "{}", path.display()),
            RuleSource::Bundled => f.write_str("<bundled>"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::models::{FingerprintScheme, StorageProvider};
    use std::collections::HashMap;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_defaults_only() {
        let temp_dir = TempDir::new().unwrap();
        let settings = load_from_sources(&temp_dir.path().join("nonexistent.toml")).unwrap();
        assert_eq!(settings.server.bind_addr.to_string(), "0.0.0.0:8080");
        assert!(settings.output_bucket.is_none());
    }

    #[test]
    fn test_load_from_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("filegate.toml");

        fs::write(
            &config_path,
            r#"
output_bucket = "processed"

[server]
bind_addr = "127.0.0.1:9000"
max_concurrent_events = 4

[storage]
provider = "memory"

[blacklist]
endpoint = "http://blacklist.internal/lookup"
fingerprint = "content_sha256"
max_retries = 5
total_budget_ms = 4000

[handler]
skip_existing_output = false

[rules]
bundled = true
reload_interval_secs = 0
            "#,
        )
        .unwrap();

        let settings = load_from_sources(&config_path).unwrap();
        assert_eq!(settings.server.bind_addr.to_string(), "127.0.0.1:9000");
        assert_eq!(settings.server.max_concurrent_events, 4);
        assert_eq!(settings.storage.provider, StorageProvider::Memory);
        assert_eq!(settings.blacklist.fingerprint, FingerprintScheme::ContentSha256);
        assert_eq!(settings.blacklist.max_retries, 5);
        assert_eq!(settings.blacklist.base_backoff_ms, 200);
        assert!(!settings.handler.skip_existing_output);
        assert_eq!(settings.output_bucket.as_deref(), Some("processed"));
        assert_eq!(RuleSource::from_settings(&settings), RuleSource::Bundled);
    }

    #[test]
    fn test_secrets_come_from_lookup() {
        let env: HashMap<&str, &str> = [
            ("BLACKLIST_API_KEY", "k-123"),
            ("OUTPUT_BUCKET", "out"),
            ("AWS_ACCESS_KEY_ID", "aws-id"),
            ("S3_SECRET_KEY", "s3-secret"),
        ]
        .into();

        let mut settings = Settings {
            output_bucket: Some("from-file".to_string()),
            ..Settings::default()
        };
        load_secrets(&mut settings, |name| env.get(name).map(|v| v.to_string()));

        assert_eq!(settings.blacklist.api_key.as_deref(), Some("k-123"));
        assert_eq!(settings.output_bucket.as_deref(), Some("out"));
        assert_eq!(settings.storage.access_key.as_deref(), Some("aws-id"));
        assert_eq!(settings.storage.secret_key.as_deref(), Some("s3-secret"));
    }

    #[test]
    fn test_blank_secrets_are_ignored() {
        let mut settings = Settings::default();
        load_secrets(&mut settings, |name| {
            (name == BLACKLIST_API_KEY_VAR).then(|| "   ".to_string())
        });
        assert!(settings.blacklist.api_key.is_none());
    }

    #[test]
    fn test_rule_source_reads_file_and_bundle() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("rules.json");
        fs::write(&path, "{}").unwrap();

        let source = RuleSource::File(path);
        assert_eq!(source.read().unwrap(), b"{}");
        assert!(source.modified().is_some());

        assert!(!RuleSource::Bundled.read().unwrap().is_empty());
        assert!(RuleSource::Bundled.modified().is_none());

        let missing = RuleSource::File(temp_dir.path().join("missing.json"));
        assert!(matches!(missing.read(), Err(ConfigError::Read { .. })));
    }
}
