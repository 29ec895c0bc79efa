use super::ConfigError;
use super::models::{RawRules, RuleSet};
use super::sources::RuleSource;
use super::validation;
use crate::processors::ProcessorRegistry;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::task::JoinHandle;

impl RuleSet {
    /// Parse and validate a rule document
    pub fn parse(document: &[u8], registry: &ProcessorRegistry) -> Result<Self, ConfigError> {
        let RawRules(entries) = serde_json::from_slice(document)?;
        let rules = validation::rule_set_from_entries(entries)?;
        validation::validate_rules(&rules, registry)?;
        Ok(rules)
    }

    pub fn load(source: &RuleSource, registry: &ProcessorRegistry) -> Result<Self, ConfigError> {
        Self::parse(&source.read()?, registry)
    }
}

/// Holds the active rule set and swaps it atomically on reload
///
/// Readers take an `Arc` snapshot and keep it for the whole invocation, so a
/// reload never changes the rules an in-flight event is using.
pub struct ConfigResolver {
    source: RuleSource,
    registry: Arc<ProcessorRegistry>,
    current: RwLock<Arc<RuleSet>>,
    observed_mtime: Mutex<Option<SystemTime>>,
}

impl ConfigResolver {
    /// Load and validate the rule document; any error must stop startup
    pub fn load(source: RuleSource, registry: Arc<ProcessorRegistry>) -> Result<Self, ConfigError> {
        let observed_mtime = source.modified();
        let rules = RuleSet::load(&source, &registry)?;

        tracing::info!(%source, rules = rules.len(), "Loaded processing rules");

        Ok(Self {
            source,
            registry,
            current: RwLock::new(Arc::new(rules)),
            observed_mtime: Mutex::new(observed_mtime),
        })
    }

    /// Build a resolver around an already validated rule set
    pub fn from_rules(rules: RuleSet, registry: Arc<ProcessorRegistry>) -> Self {
        Self {
            source: RuleSource::Bundled,
            registry,
            current: RwLock::new(Arc::new(rules)),
            observed_mtime: Mutex::new(None),
        }
    }

    pub fn current(&self) -> Arc<RuleSet> {
        Arc::clone(&self.current.read())
    }

    pub fn registry(&self) -> &Arc<ProcessorRegistry> {
        &self.registry
    }

    pub fn source(&self) -> &RuleSource {
        &self.source
    }

    /// Re-read the source and swap in the new rules
    ///
    /// On error the previous rules stay active.
    pub fn reload(&self) -> Result<Arc<RuleSet>, ConfigError> {
        let rules = Arc::new(RuleSet::load(&self.source, &self.registry)?);
        *self.current.write() = Arc::clone(&rules);
        tracing::info!(source = %self.source, rules = rules.len(), "Reloaded processing rules");
        Ok(rules)
    }

    /// Reload only when the source's modification time moved
    pub fn reload_if_changed(&self) -> Result<bool, ConfigError> {
        let modified = self.source.modified();
        {
            let mut observed = self.observed_mtime.lock();
            if modified.is_none() || *observed == modified {
                return Ok(false);
            }
            // Recorded before reloading so a broken document is reported once
            *observed = modified;
        }

        self.reload().map(|_| true)
    }

    /// Poll the source for changes until the process exits
    pub fn spawn_watcher(self: &Arc<Self>, interval: Duration) -> Option<JoinHandle<()>> {
        if interval.is_zero() || self.source == RuleSource::Bundled {
            return None;
        }

        let resolver = Arc::clone(self);
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                ticker.tick().await;
                if let Err(error) = resolver.reload_if_changed() {
                    tracing::error!(
                        source = %resolver.source,
                        %error,
                        "Rule reload failed, keeping previous rules"
                    );
                }
            }
        }))
    }
}

impl std::fmt::Debug for ConfigResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigResolver")
            .field("source", &self.source)
            .field("rules", &self.current().len())
            .finish()
    }
}
