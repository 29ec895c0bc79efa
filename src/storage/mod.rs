//! Blob store addressed by `(bucket, key)`
//! Uses Apache Arrow object_store crate
//!
//! Memory and local providers share one store and use the bucket name as the
//! top-level path segment. GCS and S3 get one client per bucket, built on
//! first use and cached.

use crate::config::{StorageConfig, StorageProvider};
use object_store::{ObjectStore, path::Path as StoragePath};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Not found: {bucket}/{key}")]
    NotFound { bucket: String, key: String },

    #[error("Invalid object key '{0}'")]
    InvalidKey(String),

    #[error("Failed to open bucket '{bucket}': {message}")]
    Backend { bucket: String, message: String },

    #[error("Object store error: {0}")]
    ObjectStoreError(#[from] object_store::Error),
}

/// Storage result type
pub type Result<T> = std::result::Result<T, StorageError>;

/// Object metadata returned by `head`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    pub size: u64,
    pub etag: Option<String>,
}

#[derive(Clone)]
enum Backend {
    /// One store for every bucket; paths are `<bucket>/<key>`
    Shared(Arc<dyn ObjectStore>),
    Gcs,
    S3 {
        region: Option<String>,
        endpoint: Option<String>,
        access_key: Option<String>,
        secret_key: Option<String>,
    },
}

/// Storage client wrapping object_store
#[derive(Clone)]
pub struct StorageClient {
    backend: Backend,
    buckets: Arc<RwLock<HashMap<String, Arc<dyn ObjectStore>>>>,
}

impl StorageClient {
    /// Create a client for the configured provider
    pub fn from_config(config: &StorageConfig) -> Result<Self> {
        let backend = match config.provider {
            StorageProvider::Memory => {
                Backend::Shared(Arc::new(object_store::memory::InMemory::new()))
            }
            StorageProvider::Local => {
                std::fs::create_dir_all(&config.root).map_err(|e| StorageError::Backend {
                    bucket: config.root.display().to_string(),
                    message: e.to_string(),
                })?;
                let store = object_store::local::LocalFileSystem::new_with_prefix(&config.root)?;
                Backend::Shared(Arc::new(store))
            }
            StorageProvider::Gcs => Backend::Gcs,
            StorageProvider::S3 => Backend::S3 {
                region: config.region.clone(),
                endpoint: config.endpoint.clone(),
                access_key: config.access_key.clone(),
                secret_key: config.secret_key.clone(),
            },
        };

        tracing::info!(provider = ?config.provider, "Storage client ready");

        Ok(Self::with_backend(backend))
    }

    /// Create storage over any object_store backend; buckets become prefixes
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self::with_backend(Backend::Shared(store))
    }

    /// Create in-memory storage for testing/development
    pub fn in_memory() -> Self {
        Self::new(Arc::new(object_store::memory::InMemory::new()))
    }

    fn with_backend(backend: Backend) -> Self {
        Self {
            backend,
            buckets: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    fn locate(&self, bucket: &str, key: &str) -> Result<(Arc<dyn ObjectStore>, StoragePath)> {
        if key.is_empty() || key.ends_with('/') {
            return Err(StorageError::InvalidKey(key.to_string()));
        }

        match &self.backend {
            Backend::Shared(store) => {
                let path = StoragePath::parse(format!("{bucket}/{key}"))
                    .map_err(|_| StorageError::InvalidKey(key.to_string()))?;
                Ok((Arc::clone(store), path))
            }
            _ => {
                let path = StoragePath::parse(key)
                    .map_err(|_| StorageError::InvalidKey(key.to_string()))?;
                Ok((self.bucket_store(bucket)?, path))
            }
        }
    }

    fn bucket_store(&self, bucket: &str) -> Result<Arc<dyn ObjectStore>> {
        if let Some(store) = self.buckets.read().get(bucket) {
            return Ok(Arc::clone(store));
        }

        let store = self.build_bucket_store(bucket)?;
        let mut buckets = self.buckets.write();
        Ok(Arc::clone(buckets.entry(bucket.to_string()).or_insert(store)))
    }

    fn build_bucket_store(&self, bucket: &str) -> Result<Arc<dyn ObjectStore>> {
        let backend_error = |e: object_store::Error| StorageError::Backend {
            bucket: bucket.to_string(),
            message: e.to_string(),
        };

        let store: Arc<dyn ObjectStore> = match &self.backend {
            Backend::Shared(store) => Arc::clone(store),
            Backend::Gcs => Arc::new(
                object_store::gcp::GoogleCloudStorageBuilder::from_env()
                    .with_bucket_name(bucket)
                    .build()
                    .map_err(backend_error)?,
            ),
            Backend::S3 {
                region,
                endpoint,
                access_key,
                secret_key,
            } => {
                let mut builder =
                    object_store::aws::AmazonS3Builder::from_env().with_bucket_name(bucket);
                if let Some(region) = region {
                    builder = builder.with_region(region);
                }
                if let Some(endpoint) = endpoint {
                    builder = builder.with_endpoint(endpoint).with_allow_http(true);
                }
                if let (Some(access_key), Some(secret_key)) = (access_key, secret_key) {
                    builder = builder
                        .with_access_key_id(access_key)
                        .with_secret_access_key(secret_key);
                }
                Arc::new(builder.build().map_err(backend_error)?)
            }
        };

        tracing::debug!(bucket, "Opened bucket");
        Ok(store)
    }

    /// Object metadata, `None` when the object does not exist
    pub async fn head(&self, bucket: &str, key: &str) -> Result<Option<ObjectInfo>> {
        let (store, path) = self.locate(bucket, key)?;

        match store.head(&path).await {
            Ok(meta) => Ok(Some(ObjectInfo {
                size: meta.size,
                etag: meta.e_tag,
            })),
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Download an object into memory
    pub async fn get(&self, bucket: &str, key: &str) -> Result<bytes::Bytes> {
        Ok(self.get_with_info(bucket, key).await?.0)
    }

    /// Download an object together with the metadata of the version read
    pub async fn get_with_info(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<(bytes::Bytes, ObjectInfo)> {
        let (store, path) = self.locate(bucket, key)?;

        let result = store.get(&path).await.map_err(|e| match e {
            object_store::Error::NotFound { .. } => StorageError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            },
            other => other.into(),
        })?;
        let etag = result.meta.e_tag.clone();
        let bytes = result.bytes().await?;

        tracing::debug!(bucket, key, size = bytes.len(), "Downloaded from storage");

        let info = ObjectInfo {
            size: bytes.len() as u64,
            etag,
        };
        Ok((bytes, info))
    }

    /// Download an object, `None` when it does not exist
    pub async fn get_opt(&self, bucket: &str, key: &str) -> Result<Option<bytes::Bytes>> {
        match self.get(bucket, key).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(StorageError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Upload a complete object in one request; repeating it overwrites
    pub async fn put(&self, bucket: &str, key: &str, data: Vec<u8>) -> Result<ObjectInfo> {
        let (store, path) = self.locate(bucket, key)?;
        let size = data.len() as u64;

        let put_result = store.put(&path, data.into()).await?;

        tracing::debug!(bucket, key, size, "Uploaded to storage");

        Ok(ObjectInfo {
            size,
            etag: put_result.e_tag,
        })
    }

    /// Check if key exists
    pub async fn exists(&self, bucket: &str, key: &str) -> Result<bool> {
        Ok(self.head(bucket, key).await?.is_some())
    }
}

impl std::fmt::Debug for StorageClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let backend = match &self.backend {
            Backend::Shared(store) => store.to_string(),
            Backend::Gcs => "gcs".to_string(),
            Backend::S3 { .. } => "s3".to_string(),
        };
        f.debug_struct("StorageClient")
            .field("backend", &backend)
            .finish()
    }
}
