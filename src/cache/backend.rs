//! Durable tier backends.
//!
//! The store only needs keyed read/write/delete of JSON records, so the
//! durable tier sits behind [`DurableBackend`]. [`FsBackend`] keeps one file
//! per key; [`MemoryBackend`] is used by tests and ephemeral runs.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use thiserror::Error;
use tokio::fs;

use super::lock::mutex_lock;

const SOURCE: &str = "cache::backend";

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("durable cache I/O failed for `{id}`: {source}")]
    Io {
        id: String,
        #[source]
        source: std::io::Error,
    },
    #[error("durable cache record `{id}` could not be encoded or decoded: {source}")]
    Serialization {
        id: String,
        #[source]
        source: serde_json::Error,
    },
}

impl BackendError {
    fn io(id: &str, source: std::io::Error) -> Self {
        Self::Io {
            id: id.to_string(),
            source,
        }
    }
}

/// Keyed JSON record storage that survives the process.
#[async_trait]
pub trait DurableBackend: Send + Sync {
    async fn read(&self, id: &str) -> Result<Option<serde_json::Value>, BackendError>;

    async fn write(&self, id: &str, value: &serde_json::Value) -> Result<(), BackendError>;

    async fn delete(&self, id: &str) -> Result<(), BackendError>;

    async fn clear(&self) -> Result<(), BackendError>;
}

/// One `<id>.json` file per key inside a directory.
#[derive(Debug, Clone)]
pub struct FsBackend {
    root: PathBuf,
}

impl FsBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.root.join(format!("{id}.json"))
    }
}

#[async_trait]
impl DurableBackend for FsBackend {
    async fn read(&self, id: &str) -> Result<Option<serde_json::Value>, BackendError> {
        let bytes = match fs::read(self.path_for(id)).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(BackendError::io(id, err)),
        };

        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| BackendError::Serialization {
                id: id.to_string(),
                source,
            })
    }

    async fn write(&self, id: &str, value: &serde_json::Value) -> Result<(), BackendError> {
        fs::create_dir_all(&self.root)
            .await
            .map_err(|err| BackendError::io(id, err))?;

        let payload = serde_json::to_vec(value).map_err(|source| BackendError::Serialization {
            id: id.to_string(),
            source,
        })?;

        // Write beside the target and rename so readers never see a torn file.
        let target = self.path_for(id);
        let staging = self.root.join(format!("{id}.json.tmp"));
        fs::write(&staging, payload)
            .await
            .map_err(|err| BackendError::io(id, err))?;
        fs::rename(&staging, &target)
            .await
            .map_err(|err| BackendError::io(id, err))
    }

    async fn delete(&self, id: &str) -> Result<(), BackendError> {
        match fs::remove_file(self.path_for(id)).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(BackendError::io(id, err)),
        }
    }

    async fn clear(&self) -> Result<(), BackendError> {
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(BackendError::io("*", err)),
        };

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|err| BackendError::io("*", err))?
        {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                match fs::remove_file(&path).await {
                    Ok(()) => {}
                    Err(err) if err.kind() == ErrorKind::NotFound => {}
                    Err(err) => return Err(BackendError::io(&path.display().to_string(), err)),
                }
            }
        }

        Ok(())
    }
}

/// Process-local durable tier.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    records: Mutex<HashMap<String, serde_json::Value>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        mutex_lock(&self.records, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl DurableBackend for MemoryBackend {
    async fn read(&self, id: &str) -> Result<Option<serde_json::Value>, BackendError> {
        Ok(mutex_lock(&self.records, SOURCE, "read").get(id).cloned())
    }

    async fn write(&self, id: &str, value: &serde_json::Value) -> Result<(), BackendError> {
        mutex_lock(&self.records, SOURCE, "write").insert(id.to_string(), value.clone());
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), BackendError> {
        mutex_lock(&self.records, SOURCE, "delete").remove(id);
        Ok(())
    }

    async fn clear(&self) -> Result<(), BackendError> {
        mutex_lock(&self.records, SOURCE, "clear").clear();
        Ok(())
    }
}
