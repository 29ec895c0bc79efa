use crate::humanize::ByteSize;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Process-level settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub blacklist: BlacklistConfig,
    #[serde(default)]
    pub handler: HandlerConfig,
    #[serde(default)]
    pub rules: RulesConfig,
    /// Destination bucket for processed artifacts (`OUTPUT_BUCKET` wins)
    #[serde(default)]
    pub output_bucket: Option<String>,
}

/// Push endpoint configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
    /// Events handled at once by one process
    #[serde(default = "default_max_concurrent_events")]
    pub max_concurrent_events: usize,
    /// Largest accepted push request body
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: ByteSize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            max_concurrent_events: default_max_concurrent_events(),
            max_payload_bytes: default_max_payload_bytes(),
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_max_concurrent_events() -> usize {
    1
}

fn default_max_payload_bytes() -> ByteSize {
    ByteSize(1024 * 1024)
}

/// Storage provider type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageProvider {
    Memory,
    #[default]
    Local,
    Gcs,
    S3,
}

/// Blob store configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub provider: StorageProvider,
    /// Root directory for the local provider; buckets are subdirectories
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,
    pub endpoint: Option<String>,
    pub region: Option<String>,
    /// S3 access key (loaded from environment, not from config file)
    #[serde(skip)]
    pub access_key: Option<String>,
    /// S3 secret key (loaded from environment, not from config file)
    #[serde(skip)]
    pub secret_key: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            provider: StorageProvider::default(),
            root: default_storage_root(),
            endpoint: None,
            region: None,
            access_key: None,
            secret_key: None,
        }
    }
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("data/buckets")
}

/// How a file is identified to the blacklist service
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FingerprintScheme {
    /// `<bucket>/<object_key>`; needs no content read
    #[default]
    ObjectKey,
    /// Lowercase hex SHA-256 of the object content
    ContentSha256,
}

/// Blacklist API configuration
#[derive(Clone, Deserialize, Serialize)]
pub struct BlacklistConfig {
    #[serde(default = "default_blacklist_endpoint")]
    pub endpoint: String,
    /// Loaded from `BLACKLIST_API_KEY`, never from the config file
    #[serde(skip)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub fingerprint: FingerprintScheme,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Retries after the first attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// Wall-clock budget for a check, retries included
    #[serde(default = "default_total_budget_ms")]
    pub total_budget_ms: u64,
}

impl BlacklistConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn total_budget(&self) -> Duration {
        Duration::from_millis(self.total_budget_ms)
    }
}

impl Default for BlacklistConfig {
    fn default() -> Self {
        Self {
            endpoint: default_blacklist_endpoint(),
            api_key: None,
            fingerprint: FingerprintScheme::default(),
            request_timeout_ms: default_request_timeout_ms(),
            max_retries: default_max_retries(),
            base_backoff_ms: default_base_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            total_budget_ms: default_total_budget_ms(),
        }
    }
}

// Keeps the API key out of logs
impl fmt::Debug for BlacklistConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlacklistConfig")
            .field("endpoint", &self.endpoint)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("fingerprint", &self.fingerprint)
            .field("request_timeout_ms", &self.request_timeout_ms)
            .field("max_retries", &self.max_retries)
            .field("base_backoff_ms", &self.base_backoff_ms)
            .field("max_backoff_ms", &self.max_backoff_ms)
            .field("total_budget_ms", &self.total_budget_ms)
            .finish()
    }
}

fn default_blacklist_endpoint() -> String {
    "https://api.blacklistalliance.net/lookup".to_string()
}

fn default_request_timeout_ms() -> u64 {
    1500
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_backoff_ms() -> u64 {
    200
}

fn default_max_backoff_ms() -> u64 {
    2000
}

fn default_total_budget_ms() -> u64 {
    5000
}

/// Per-event handling limits
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HandlerConfig {
    #[serde(default = "default_invocation_timeout_ms")]
    pub invocation_timeout_ms: u64,
    /// Timeout applied to each blob store call
    #[serde(default = "default_io_timeout_ms")]
    pub io_timeout_ms: u64,
    /// Reuse an output when its source marker matches the current input etag
    #[serde(default = "default_skip_existing_output")]
    pub skip_existing_output: bool,
}

impl HandlerConfig {
    pub fn invocation_timeout(&self) -> Duration {
        Duration::from_millis(self.invocation_timeout_ms)
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.io_timeout_ms)
    }
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            invocation_timeout_ms: default_invocation_timeout_ms(),
            io_timeout_ms: default_io_timeout_ms(),
            skip_existing_output: default_skip_existing_output(),
        }
    }
}

fn default_invocation_timeout_ms() -> u64 {
    60_000
}

fn default_io_timeout_ms() -> u64 {
    15_000
}

fn default_skip_existing_output() -> bool {
    true
}

/// Where the rule document lives
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RulesConfig {
    #[serde(default = "default_rules_path")]
    pub path: PathBuf,
    /// Use the rule document compiled into the binary instead of `path`
    #[serde(default)]
    pub bundled: bool,
    /// Poll interval for hot reload, 0 disables it
    #[serde(default = "default_reload_interval_secs")]
    pub reload_interval_secs: u64,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            path: default_rules_path(),
            bundled: false,
            reload_interval_secs: default_reload_interval_secs(),
        }
    }
}

fn default_rules_path() -> PathBuf {
    PathBuf::from("config/rules.json")
}

fn default_reload_interval_secs() -> u64 {
    30
}

/// Processing rule for one file type
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Rule {
    pub output_suffix: String,
    pub transform_id: String,
    pub max_size_bytes: ByteSize,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Transform-specific options (arbitrary JSON)
    #[serde(default)]
    pub options: serde_json::Value,
}

fn default_enabled() -> bool {
    true
}

/// Validated, immutable mapping from file-type key to rule
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleSet {
    pub(super) rules: BTreeMap<String, Rule>,
}

impl RuleSet {
    /// Canonical form of a file-type key: trimmed, no leading dot, lowercase
    pub fn normalize_key(key: &str) -> String {
        key.trim().trim_start_matches('.').to_ascii_lowercase()
    }

    pub fn get(&self, file_type: &str) -> Option<&Rule> {
        self.rules.get(&Self::normalize_key(file_type))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Rule)> {
        self.rules.iter().map(|(key, rule)| (key.as_str(), rule))
    }
}

/// Rule document entries in document order, duplicates preserved
#[derive(Debug)]
pub(super) struct RawRules(pub Vec<(String, Rule)>);

impl<'de> Deserialize<'de> for RawRules {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct RawRulesVisitor;

        impl<'de> serde::de::Visitor<'de> for RawRulesVisitor {
            type Value = RawRules;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("an object mapping file-type keys to rules")
            }

            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: serde::de::MapAccess<'de>,
            {
                let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some(entry) = map.next_entry::<String, Rule>()? {
                    entries.push(entry);
                }
                Ok(RawRules(entries))
            }
        }

        deserializer.deserialize_map(RawRulesVisitor)
    }
}
