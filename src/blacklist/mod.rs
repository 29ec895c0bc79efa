//! Blacklist validation
//!
//! A check never fails: transport problems surface as
//! [`BlacklistVerdict::Unknown`] and the caller decides what to do with an
//! inconclusive answer.

mod client;

pub use client::{BlacklistClient, BlacklistError, RetryPolicy};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Outcome of a blacklist check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlacklistVerdict {
    Allowed,
    /// Definitive rejection with the service's reason
    Denied(String),
    /// No definitive answer (timeouts, bad responses, exhausted retries)
    Unknown(String),
}

/// Anything that can produce a verdict for a file fingerprint
#[async_trait]
pub trait BlacklistCheck: Send + Sync {
    async fn check(&self, identifier: &str) -> BlacklistVerdict;
}

/// Fingerprint used when identifying files by location
pub fn object_fingerprint(bucket: &str, key: &str) -> String {
    format!("{bucket}/{key}")
}

/// Lowercase hex SHA-256 of the content
pub fn content_fingerprint(content: &[u8]) -> String {
    hex::encode(Sha256::digest(content))
}

/// Fixed-answer checker for development and tests; counts calls
#[derive(Debug)]
pub struct StaticBlacklist {
    verdict: BlacklistVerdict,
    calls: AtomicUsize,
}

impl StaticBlacklist {
    pub fn new(verdict: BlacklistVerdict) -> Self {
        Self {
            verdict,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn allow_all() -> Self {
        Self::new(BlacklistVerdict::Allowed)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BlacklistCheck for StaticBlacklist {
    async fn check(&self, identifier: &str) -> BlacklistVerdict {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(identifier, verdict = ?self.verdict, "Static blacklist check");
        self.verdict.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_fingerprint_is_sha256_hex() {
        assert_eq!(
            content_fingerprint(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_object_fingerprint() {
        assert_eq!(object_fingerprint("in", "dir/report.csv"), "in/dir/report.csv");
    }

    #[tokio::test]
    async fn test_static_blacklist_counts_calls() {
        let blacklist = StaticBlacklist::new(BlacklistVerdict::Denied("x".to_string()));
        assert_eq!(blacklist.check("a").await, BlacklistVerdict::Denied("x".to_string()));
        assert_eq!(blacklist.check("b").await, BlacklistVerdict::Denied("x".to_string()));
        assert_eq!(blacklist.calls(), 2);
    }
}
