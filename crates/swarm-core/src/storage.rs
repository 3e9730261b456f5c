//! Durable storage with preconditioned writes.
//!
//! The orchestrator journal and signal inbox are built on this abstraction.
//! The single correctness primitive is the `DoesNotExist` write precondition:
//! two processes racing to append the same journal record produce exactly one
//! winner, and the loser observes `PreconditionFailed` and re-reads.
//!
//! Two backends are provided:
//! - [`MemoryBackend`] for tests and debug deployments
//! - [`FsBackend`] for durable single-host deployments (local filesystem via
//!   the `object_store` crate)

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use object_store::local::LocalFileSystem;
use object_store::path::Path as StorePath;
use object_store::{ObjectStore, PutMode, PutOptions, PutPayload};

use crate::error::{Error, Result};

/// Precondition applied to a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WritePrecondition {
    /// Unconditional write (insert or overwrite).
    None,
    /// Write only if no object exists at the path.
    DoesNotExist,
}

/// Outcome of a preconditioned write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteResult {
    /// The write was applied.
    Success,
    /// The precondition failed; the object already exists.
    PreconditionFailed,
}

impl WriteResult {
    /// Returns true if the write was applied.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// Metadata for one stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMeta {
    /// Object path.
    pub path: String,
    /// Object size in bytes.
    pub size: u64,
}

/// Storage abstraction for durable pipeline state.
///
/// Implementations must make `DoesNotExist` writes atomic: of N concurrent
/// writers to the same fresh path, exactly one observes [`WriteResult::Success`].
#[async_trait]
pub trait StorageBackend: Send + Sync + 'static {
    /// Reads an object. Returns `None` if the path does not exist.
    async fn get(&self, path: &str) -> Result<Option<Bytes>>;

    /// Writes an object under the given precondition.
    async fn put(
        &self,
        path: &str,
        data: Bytes,
        precondition: WritePrecondition,
    ) -> Result<WriteResult>;

    /// Deletes an object. Deleting a missing object is a no-op.
    async fn delete(&self, path: &str) -> Result<()>;

    /// Lists objects under a prefix, sorted by path ascending.
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectMeta>>;
}

/// In-memory storage backend for tests and debug deployments.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    objects: RwLock<BTreeMap<String, Bytes>>,
}

impl MemoryBackend {
    /// Creates a new empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn get(&self, path: &str) -> Result<Option<Bytes>> {
        let objects = self
            .objects
            .read()
            .map_err(|_| Error::storage("memory backend lock poisoned"))?;
        Ok(objects.get(path).cloned())
    }

    async fn put(
        &self,
        path: &str,
        data: Bytes,
        precondition: WritePrecondition,
    ) -> Result<WriteResult> {
        let mut objects = self
            .objects
            .write()
            .map_err(|_| Error::storage("memory backend lock poisoned"))?;
        if precondition == WritePrecondition::DoesNotExist && objects.contains_key(path) {
            return Ok(WriteResult::PreconditionFailed);
        }
        objects.insert(path.to_string(), data);
        Ok(WriteResult::Success)
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let mut objects = self
            .objects
            .write()
            .map_err(|_| Error::storage("memory backend lock poisoned"))?;
        objects.remove(path);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ObjectMeta>> {
        let objects = self
            .objects
            .read()
            .map_err(|_| Error::storage("memory backend lock poisoned"))?;
        Ok(objects
            .range(prefix.to_string()..)
            .take_while(|(path, _)| path.starts_with(prefix))
            .map(|(path, data)| ObjectMeta {
                path: path.clone(),
                size: data.len() as u64,
            })
            .collect())
    }
}

/// Local-filesystem storage backend.
///
/// Suitable for single-host deployments; the journal survives process
/// restarts. `DoesNotExist` maps to the object store's atomic create mode.
#[derive(Debug)]
pub struct FsBackend {
    store: LocalFileSystem,
}

impl FsBackend {
    /// Creates a backend rooted at the given directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be used as a store root.
    pub fn new(root: impl AsRef<std::path::Path>) -> Result<Self> {
        std::fs::create_dir_all(root.as_ref()).map_err(|e| {
            Error::storage_with_source(
                format!("failed to create state dir {}", root.as_ref().display()),
                e,
            )
        })?;
        let store = LocalFileSystem::new_with_prefix(root.as_ref()).map_err(|e| {
            Error::storage_with_source(
                format!("failed to open state dir {}", root.as_ref().display()),
                e,
            )
        })?;
        Ok(Self { store })
    }

    fn store_path(path: &str) -> Result<StorePath> {
        StorePath::parse(path)
            .map_err(|e| Error::storage(format!("invalid storage path '{path}': {e}")))
    }
}

#[async_trait]
impl StorageBackend for FsBackend {
    async fn get(&self, path: &str) -> Result<Option<Bytes>> {
        let path = Self::store_path(path)?;
        match self.store.get(&path).await {
            Ok(result) => {
                let data = result
                    .bytes()
                    .await
                    .map_err(|e| Error::storage_with_source("failed to read object", e))?;
                Ok(Some(data))
            }
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(Error::storage_with_source(
                format!("failed to get {path}"),
                e,
            )),
        }
    }

    async fn put(
        &self,
        path: &str,
        data: Bytes,
        precondition: WritePrecondition,
    ) -> Result<WriteResult> {
        let path = Self::store_path(path)?;
        let mode = match precondition {
            WritePrecondition::None => PutMode::Overwrite,
            WritePrecondition::DoesNotExist => PutMode::Create,
        };
        match self
            .store
            .put_opts(&path, PutPayload::from(data), PutOptions::from(mode))
            .await
        {
            Ok(_) => Ok(WriteResult::Success),
            Err(object_store::Error::AlreadyExists { .. }) => Ok(WriteResult::PreconditionFailed),
            Err(e) => Err(Error::storage_with_source(
                format!("failed to put {path}"),
                e,
            )),
        }
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let path = Self::store_path(path)?;
        match self.store.delete(&path).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(Error::storage_with_source(
                format!("failed to delete {path}"),
                e,
            )),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ObjectMeta>> {
        let prefix = Self::store_path(prefix.trim_end_matches('/'))?;
        let mut entries: Vec<ObjectMeta> = self
            .store
            .list(Some(&prefix))
            .map_ok(|meta| ObjectMeta {
                path: meta.location.to_string(),
                size: meta.size as u64,
            })
            .try_collect()
            .await
            .map_err(|e| Error::storage_with_source("failed to list objects", e))?;
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }
}
