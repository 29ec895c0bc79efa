//! Tracing setup and in-process outcome counters

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::EnvFilter;

/// Install the global fmt subscriber; `RUST_LOG` overrides the default filter
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // A subscriber installed earlier (tests, embedding) wins
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Metrics handle for recording counters
#[derive(Debug, Default)]
pub struct Metrics {
    events_received: AtomicU64,
    events_completed: AtomicU64,
    events_skipped: AtomicU64,
    events_failed: AtomicU64,
    outputs_reused: AtomicU64,
    files_denied: AtomicU64,
    blacklist_unavailable: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn event_received(&self) {
        self.events_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn event_completed(&self, reused: bool) {
        self.events_completed.fetch_add(1, Ordering::Relaxed);
        if reused {
            self.outputs_reused.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn event_skipped(&self, denied: bool) {
        self.events_skipped.fetch_add(1, Ordering::Relaxed);
        if denied {
            self.files_denied.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn event_failed(&self, blacklist_unavailable: bool) {
        self.events_failed.fetch_add(1, Ordering::Relaxed);
        if blacklist_unavailable {
            self.blacklist_unavailable.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            events_received: self.events_received.load(Ordering::Relaxed),
            events_completed: self.events_completed.load(Ordering::Relaxed),
            events_skipped: self.events_skipped.load(Ordering::Relaxed),
            events_failed: self.events_failed.load(Ordering::Relaxed),
            outputs_reused: self.outputs_reused.load(Ordering::Relaxed),
            files_denied: self.files_denied.load(Ordering::Relaxed),
            blacklist_unavailable: self.blacklist_unavailable.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub events_received: u64,
    pub events_completed: u64,
    pub events_skipped: u64,
    pub events_failed: u64,
    pub outputs_reused: u64,
    pub files_denied: u64,
    pub blacklist_unavailable: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let metrics = Metrics::new();
        metrics.event_received();
        metrics.event_received();
        metrics.event_completed(true);
        metrics.event_skipped(true);
        metrics.event_failed(false);

        assert_eq!(
            metrics.snapshot(),
            MetricsSnapshot {
                events_received: 2,
                events_completed: 1,
                events_skipped: 1,
                events_failed: 1,
                outputs_reused: 1,
                files_denied: 1,
                blacklist_unavailable: 0,
            }
        );
    }
}
