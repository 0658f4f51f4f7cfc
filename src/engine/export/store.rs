use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, PutPayload};
use tracing::debug;

use crate::engine::errors::StoreError;
use crate::engine::export::signer::{SignedUrl, UrlSigner};
use crate::shared::config::{BulkConfig, BulkStoreKind};

/// Object storage that hosts bulk result files.
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Returns once the object is durable; a URL is never issued before that.
    async fn put(&self, key: &str, bytes: Bytes) -> Result<(), StoreError>;

    async fn get(&self, key: &str) -> Result<Bytes, StoreError>;

    async fn presign_get(&self, key: &str, ttl: Duration) -> Result<String, StoreError>;
}

/// `ResultStore` over any `object_store` backend, serving its own signed URLs.
pub struct ObjectStoreResultStore {
    store: Arc<dyn ObjectStore>,
    signer: UrlSigner,
}

impl ObjectStoreResultStore {
    pub fn new(store: Arc<dyn ObjectStore>, signer: UrlSigner) -> Self {
        Self { store, signer }
    }

    pub fn in_memory(signer: UrlSigner) -> Self {
        Self::new(Arc::new(InMemory::new()), signer)
    }

    pub fn from_config(cfg: &BulkConfig, public_url: &str) -> Result<Self, StoreError> {
        let signer = UrlSigner::new(cfg.signing_key.as_bytes(), public_url);
        let store: Arc<dyn ObjectStore> = match cfg.store {
            BulkStoreKind::Memory => Arc::new(InMemory::new()),
            BulkStoreKind::Local => {
                let root = PathBuf::from(&cfg.root_dir);
                std::fs::create_dir_all(&root)?;
                let root = root.canonicalize()?;
                Arc::new(LocalFileSystem::new_with_prefix(root)?)
            }
        };
        Ok(Self::new(store, signer))
    }

    pub fn signer(&self) -> &UrlSigner {
        &self.signer
    }

    /// Reads an object on behalf of a signed URL.
    pub async fn open_signed(&self, url: &SignedUrl) -> Result<Bytes, StoreError> {
        self.signer.verify(url)?;
        self.get(&url.key).await
    }
}

fn object_path(key: &str) -> Result<ObjectPath, StoreError> {
    ObjectPath::parse(key).map_err(|e| StoreError::InvalidKey(format!("{key}: {e}")))
}

#[async_trait]
impl ResultStore for ObjectStoreResultStore {
    async fn put(&self, key: &str, bytes: Bytes) -> Result<(), StoreError> {
        let path = object_path(key)?;
        let size = bytes.len();
        self.store.put(&path, PutPayload::from(bytes)).await?;
        debug!(target: "glide::export", key, size, "Object stored");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Bytes, StoreError> {
        let path = object_path(key)?;
        match self.store.get(&path).await {
            Ok(result) => Ok(result.bytes().await?),
            Err(object_store::Error::NotFound { .. }) => Err(StoreError::NotFound(key.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    async fn presign_get(&self, key: &str, ttl: Duration) -> Result<String, StoreError> {
        object_path(key)?;
        Ok(self.signer.presign(key, ttl))
    }
}
