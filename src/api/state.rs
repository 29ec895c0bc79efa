use std::sync::Arc;

use crate::blacklist::BlacklistClient;
use crate::config::{ConfigResolver, RuleSource, Settings};
use crate::observability::Metrics;
use crate::processors::ProcessorRegistry;
use crate::storage::StorageClient;
use crate::worker::{EventHandler, HandlerOptions};

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Clone)]
pub struct AppState {
    pub handler: Arc<EventHandler>,
    pub resolver: Arc<ConfigResolver>,
    pub metrics: Arc<Metrics>,
    pub max_payload_bytes: usize,
}

impl AppState {
    pub fn new(handler: EventHandler, max_payload_bytes: usize) -> Self {
        let resolver = Arc::clone(handler.resolver());
        let metrics = Arc::clone(handler.metrics());
        Self {
            handler: Arc::new(handler),
            resolver,
            metrics,
            max_payload_bytes,
        }
    }

    /// Wire up rules, blacklist client and storage from validated settings
    ///
    /// Any error here is fatal: the process must not accept events with an
    /// invalid rule document or missing credentials.
    pub fn from_settings(settings: &Settings) -> Result<Self, AnyError> {
        let registry = Arc::new(ProcessorRegistry::with_defaults());
        let resolver = Arc::new(ConfigResolver::load(
            RuleSource::from_settings(settings),
            registry,
        )?);
        let blacklist = Arc::new(BlacklistClient::new(&settings.blacklist)?);
        let storage = StorageClient::from_config(&settings.storage)?;

        let handler = EventHandler::builder()
            .resolver(resolver)
            .blacklist(blacklist)
            .storage(storage)
            .output_bucket(settings.output_bucket())
            .options(HandlerOptions::from_settings(settings))
            .build();

        let max_payload_bytes =
            usize::try_from(settings.server.max_payload_bytes.as_u64()).unwrap_or(usize::MAX);

        Ok(Self::new(handler, max_payload_bytes))
    }
}
