//! Configuration management for filegate
//!
//! Two documents are involved:
//!
//! - **Settings** (`config/filegate.toml`): process-level settings layered from
//!   defaults, the TOML file and environment variables (highest priority).
//! - **Rules** (`config/rules.json`): file-type key to processing rule. Loaded
//!   and validated against the [`ProcessorRegistry`](crate::processors::ProcessorRegistry)
//!   at startup, then held by a [`ConfigResolver`] that swaps it atomically on
//!   reload.
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use filegate::config::{ConfigResolver, RuleSource, Settings};
//! use filegate::processors::ProcessorRegistry;
//!
//! let settings = Settings::load(None).expect("invalid settings");
//! let registry = Arc::new(ProcessorRegistry::with_defaults());
//! let resolver = ConfigResolver::load(RuleSource::from_settings(&settings), registry)
//!     .expect("invalid rules");
//! println!("{} rules loaded", resolver.current().len());
//! ```
//!
//! # Environment Variables
//!
//! - `BLACKLIST_API_KEY` and `OUTPUT_BUCKET` are required.
//! - `FILEGATE_CONFIG` overrides the settings file path.
//! - `FILEGATE__<section>__<key>` overrides any settings key, e.g.
//!   `FILEGATE__BLACKLIST__MAX_RETRIES=5`.

mod models;
mod resolver;
mod sources;
mod validation;

pub use crate::humanize::ByteSize;
pub use models::{
    BlacklistConfig, FingerprintScheme, HandlerConfig, Rule, RuleSet, RulesConfig, ServerConfig,
    Settings, StorageConfig, StorageProvider,
};
pub use resolver::ConfigResolver;
pub use sources::{BLACKLIST_API_KEY_VAR, OUTPUT_BUCKET_VAR, RuleSource};
pub use validation::ValidationError;

use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load settings: {0}")]
    Load(#[from] config::ConfigError),

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed rule document: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("configuration validation failed: {0}")]
    Validation(#[from] ValidationError),
}

impl Settings {
    /// Load settings from all sources (file + environment) and validate them
    ///
    /// `config_path` overrides `FILEGATE_CONFIG` and the default location.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings file is malformed, a required
    /// environment variable is missing, or a value is out of range.
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let settings = sources::load(config_path)?;
        validation::validate_settings(&settings)?;
        Ok(settings)
    }

    /// Load settings from a specific path, reading secrets through `env`
    pub fn load_from_path<F>(path: &Path, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = sources::load_from_sources(path)?;
        sources::load_secrets(&mut settings, env);
        validation::validate_settings(&settings)?;
        Ok(settings)
    }

    /// Output bucket; present once settings passed validation
    pub fn output_bucket(&self) -> &str {
        self.output_bucket.as_deref().unwrap_or_default()
    }
}
