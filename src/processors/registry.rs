use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

use super::traits::{Transform, TransformError};
use super::types::TransformParams;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("unknown transform: {0}")]
    UnknownTransform(String),
    #[error("transform '{transform_id}' failed: {source}")]
    Transform {
        transform_id: String,
        #[source]
        source: TransformError,
    },
}

/// Registry mapping transform ids to transform implementations
///
/// Populated once at startup, then shared read-only behind an `Arc`.
#[derive(Clone, Default)]
pub struct ProcessorRegistry {
    transforms: BTreeMap<String, Arc<dyn Transform>>,
}

impl ProcessorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a transform; a later registration under the same id replaces
    /// the earlier one.
    pub fn register<T>(&mut self, transform_id: impl Into<String>, transform: T)
    where
        T: Transform + 'static,
    {
        let transform_id = transform_id.into();
        tracing::debug!(transform_id, "Registered transform");
        self.transforms.insert(transform_id, Arc::new(transform));
    }

    pub fn resolve(&self, transform_id: &str) -> Result<Arc<dyn Transform>, RegistryError> {
        self.transforms
            .get(transform_id)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownTransform(transform_id.to_string()))
    }

    pub fn contains(&self, transform_id: &str) -> bool {
        self.transforms.contains_key(transform_id)
    }

    pub fn transform_ids(&self) -> impl Iterator<Item = &str> {
        self.transforms.keys().map(String::as_str)
    }

    /// Resolve and run a transform over in-memory content
    pub fn process(
        &self,
        transform_id: &str,
        content: &[u8],
        params: &TransformParams,
    ) -> Result<Vec<u8>, RegistryError> {
        let transform = self.resolve(transform_id)?;
        transform
            .apply(content, params)
            .map_err(|source| RegistryError::Transform {
                transform_id: transform_id.to_string(),
                source,
            })
    }

    /// Registry with the built-in transforms
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("passthrough", super::default::Passthrough);
        registry.register("json_compact", super::default::JsonCompact);
        registry.register("csv_normalize", super::tabular::CsvNormalize);
        registry.register("csv_dedupe", super::tabular::CsvDedupe);
        registry
    }
}

impl std::fmt::Debug for ProcessorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessorRegistry")
            .field("transforms", &self.transforms.keys().collect::<Vec<_>>())
            .finish()
    }
}
