//! HTTP client for the blacklist lookup API

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use super::{BlacklistCheck, BlacklistVerdict};
use crate::config::BlacklistConfig;

#[derive(Debug, Error)]
pub enum BlacklistError {
    #[error("blacklist API key is not configured")]
    MissingApiKey,

    #[error("invalid blacklist endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("failed to build HTTP client: {0}")]
    Client(String),

    #[error("request failed: {0}")]
    RequestFailed(String),

    #[error("request timed out")]
    Timeout,

    #[error("unexpected HTTP status {0}")]
    Status(u16),

    #[error("unparsable response: {0}")]
    MalformedResponse(String),
}

pub type Result<T> = std::result::Result<T, BlacklistError>;

/// Bounded exponential backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based): base * 2^(retry-1), capped
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.base_backoff
            .checked_mul(factor)
            .map_or(self.max_backoff, |delay| delay.min(self.max_backoff))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Serialize)]
struct LookupRequest<'a> {
    identifier: &'a str,
}

#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
enum VerdictKind {
    Allow,
    Deny,
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    verdict: VerdictKind,
    #[serde(default)]
    reason: Option<String>,
}

impl From<LookupResponse> for BlacklistVerdict {
    fn from(response: LookupResponse) -> Self {
        match response.verdict {
            VerdictKind::Allow => BlacklistVerdict::Allowed,
            VerdictKind::Deny => BlacklistVerdict::Denied(
                response
                    .reason
                    .filter(|reason| !reason.is_empty())
                    .unwrap_or_else(|| "denied".to_string()),
            ),
        }
    }
}

/// Blacklist API client
///
/// Sends `POST <endpoint>?key=<api key>&ver=v1&resp=json` with body
/// `{"identifier": "..."}` and expects
/// `{"verdict": "allow" | "deny", "reason": "..."}`.
pub struct BlacklistClient {
    client: Client,
    endpoint: Url,
    api_key: String,
    policy: RetryPolicy,
    total_budget: Duration,
}

impl BlacklistClient {
    pub fn new(config: &BlacklistConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or(BlacklistError::MissingApiKey)?;
        let endpoint = Url::parse(&config.endpoint)
            .map_err(|e| BlacklistError::InvalidEndpoint(format!("{}: {e}", config.endpoint)))?;

        let client = Client::builder()
            .connect_timeout(config.request_timeout())
            .timeout(config.request_timeout())
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| BlacklistError::Client(e.to_string()))?;

        Ok(Self {
            client,
            endpoint,
            api_key,
            policy: RetryPolicy {
                max_retries: config.max_retries,
                base_backoff: Duration::from_millis(config.base_backoff_ms),
                max_backoff: Duration::from_millis(config.max_backoff_ms),
            },
            total_budget: config.total_budget(),
        })
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    async fn check_with_retries(&self, identifier: &str) -> BlacklistVerdict {
        let mut attempts = 0;

        loop {
            attempts += 1;

            match self.check_once(identifier).await {
                Ok(verdict) => {
                    if attempts > 1 {
                        debug!(identifier, attempts, "Blacklist check succeeded after retry");
                    }
                    return verdict;
                }
                Err(e) => {
                    if attempts > self.policy.max_retries {
                        warn!(identifier, attempts, error = %e, "Blacklist check failed after retries");
                        return BlacklistVerdict::Unknown(format!(
                            "failed after {attempts} attempts: {e}"
                        ));
                    }

                    let backoff = self.policy.backoff(attempts);
                    warn!(
                        identifier,
                        attempts,
                        error = %e,
                        backoff_ms = backoff.as_millis() as u64,
                        "Blacklist check failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }

    /// One request, no retry
    async fn check_once(&self, identifier: &str) -> Result<BlacklistVerdict> {
        let body = serde_json::to_vec(&LookupRequest { identifier })
            .map_err(|e| BlacklistError::RequestFailed(e.to_string()))?;

        let response = self
            .client
            .post(self.endpoint.clone())
            .query(&[("key", self.api_key.as_str()), ("ver", "v1"), ("resp", "json")])
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    BlacklistError::Timeout
                } else {
                    // Without the URL, which carries the API key
                    BlacklistError::RequestFailed(e.without_url().to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(BlacklistError::Status(status.as_u16()));
        }

        let bytes = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                BlacklistError::Timeout
            } else {
                BlacklistError::RequestFailed(e.without_url().to_string())
            }
        })?;

        let parsed: LookupResponse = serde_json::from_slice(&bytes)
            .map_err(|e| BlacklistError::MalformedResponse(e.to_string()))?;

        Ok(parsed.into())
    }
}

#[async_trait]
impl BlacklistCheck for BlacklistClient {
    async fn check(&self, identifier: &str) -> BlacklistVerdict {
        match tokio::time::timeout(self.total_budget, self.check_with_retries(identifier)).await {
            Ok(verdict) => verdict,
            Err(_) => {
                warn!(
                    identifier,
                    budget_ms = self.total_budget.as_millis() as u64,
                    "Blacklist check exceeded its time budget"
                );
                BlacklistVerdict::Unknown(format!(
                    "no verdict within {}ms",
                    self.total_budget.as_millis()
                ))
            }
        }
    }
}

impl std::fmt::Debug for BlacklistClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlacklistClient")
            .field("endpoint", &self.endpoint.as_str())
            .field("policy", &self.policy)
            .field("total_budget", &self.total_budget)
            .finish_non_exhaustive()
    }
}
