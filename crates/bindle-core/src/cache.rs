//! Identity-keyed cache of transformed files.
//!
//! The cache holds the last-known transform result per identity, with no
//! eviction. Correctness relies on callers supplying a changed-identity
//! set to force re-transforms; concurrent writers for the same key may
//! race, which is acceptable because transforms are idempotent for
//! identical inputs (last writer wins).
//!
//! Persistence is a trait seam: the engine only requires load-once
//! semantics at pool initialization and fire-and-forget snapshots. The
//! on-disk format is not a compatibility surface.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use bindle_api::{BundleError, Identity, ImportResolved, Result, TransformedFile};
use dashmap::DashMap;

/// Backing store for cache snapshots.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    async fn load(&self) -> Result<Vec<(Identity, TransformedFile)>>;
    async fn persist(&self, entries: Vec<(Identity, TransformedFile)>) -> Result<()>;
}

/// Default storage: nothing persists, every session starts cold.
pub struct NullStorage;

#[async_trait]
impl CacheStorage for NullStorage {
    async fn load(&self) -> Result<Vec<(Identity, TransformedFile)>> {
        Ok(Vec::new())
    }

    async fn persist(&self, _entries: Vec<(Identity, TransformedFile)>) -> Result<()> {
        Ok(())
    }
}

/// Bincode snapshot in a single file, for watch sessions that survive
/// process restarts.
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl CacheStorage for FileStorage {
    async fn load(&self) -> Result<Vec<(Identity, TransformedFile)>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(BundleError::Io {
                    path: self.path.clone(),
                    source: err,
                });
            }
        };
        bincode::deserialize(&bytes)
            .map_err(|err| BundleError::Config(format!("corrupt cache snapshot: {err}")))
    }

    async fn persist(&self, entries: Vec<(Identity, TransformedFile)>) -> Result<()> {
        let bytes = bincode::serialize(&entries)
            .map_err(|err| BundleError::Config(format!("cache snapshot failed: {err}")))?;
        tokio::fs::write(&self.path, bytes)
            .await
            .map_err(|err| BundleError::Io {
                path: self.path.clone(),
                source: err,
            })
    }
}

/// In-memory cache of previously transformed files.
pub struct Cache {
    files: DashMap<Identity, TransformedFile>,
    storage: Arc<dyn CacheStorage>,
}

impl Cache {
    pub fn new(storage: Arc<dyn CacheStorage>) -> Self {
        Self {
            files: DashMap::new(),
            storage,
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(NullStorage))
    }

    /// Hydrate from storage. Called once, at pool initialization.
    ///
    /// Load failures are non-fatal: the session starts cold and the
    /// failure is logged.
    pub async fn load(&self) {
        match self.storage.load().await {
            Ok(entries) => {
                let count = entries.len();
                for (identity, file) in entries {
                    self.files.insert(identity, file);
                }
                if count > 0 {
                    tracing::debug!(entries = count, "cache hydrated from storage");
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "cache load failed, starting cold");
            }
        }
    }

    pub fn get_file(&self, resolved: &ImportResolved) -> Option<TransformedFile> {
        let hit = self.files.get(&resolved.identity()).map(|e| e.value().clone());
        tracing::trace!(
            file = %resolved.file_path.display(),
            hit = hit.is_some(),
            "cache lookup"
        );
        hit
    }

    pub fn set_file(&self, resolved: &ImportResolved, file: TransformedFile) {
        self.files.insert(resolved.identity(), file);
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Write the current contents through the storage seam.
    pub async fn persist(&self) -> Result<()> {
        let entries: Vec<_> = self
            .files
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        self.storage.persist(entries).await
    }
}
