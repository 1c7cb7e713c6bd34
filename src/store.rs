//! Persistence of stage artifacts.
//!
//! Artifacts are plain text values stored under a relative key. Writes are
//! last-write-wins; the store keeps no history.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use indexmap::IndexMap;

use crate::config::is_safe_artifact_key;
use crate::error::{Error, Result};

/// Key-value store for named text artifacts.
pub trait ArtifactStore: Send + Sync {
    /// Writes an artifact, replacing any previous value under the key.
    fn write(&self, key: &str, value: &str) -> Result<()>;

    /// Reads an artifact back, if present.
    fn read(&self, key: &str) -> Result<Option<String>>;
}

/// Rejects keys that would leave the store root.
fn check_key(key: &str) -> Result<()> {
    if is_safe_artifact_key(key) {
        Ok(())
    } else {
        Err(Error::InvalidArtifactKey(key.to_string()))
    }
}

/// Store that writes one file per artifact under a root directory.
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    /// Creates a store rooted at `root`. The directory is created on first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the file path for a key.
    pub fn path_for(&self, key: &str) -> Result<PathBuf> {
        check_key(key)?;
        Ok(self.root.join(key))
    }
}

impl ArtifactStore for FsArtifactStore {
    fn write(&self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key)?;
        let to_write_error = |source| Error::ArtifactWrite {
            key: key.to_string(),
            source,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(to_write_error)?;
        }
        std::fs::write(&path, value).map_err(to_write_error)?;

        tracing::debug!(key, path = ?path, bytes = value.len(), "wrote artifact");
        Ok(())
    }

    fn read(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key)?;
        match std::fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Io(e)),
        }
    }
}

/// In-memory store that also records the order of writes.
#[derive(Debug, Default)]
pub struct MemoryArtifactStore {
    artifacts: Mutex<IndexMap<String, String>>,
    write_log: Mutex<Vec<String>>,
}

impl MemoryArtifactStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every key written, in write order, including overwrites.
    pub fn write_log(&self) -> Vec<String> {
        self.write_log
            .lock()
            .map(|log| log.clone())
            .unwrap_or_default()
    }

    /// Returns a snapshot of all artifacts.
    pub fn snapshot(&self) -> IndexMap<String, String> {
        self.artifacts
            .lock()
            .map(|a| a.clone())
            .unwrap_or_default()
    }
}

impl ArtifactStore for MemoryArtifactStore {
    fn write(&self, key: &str, value: &str) -> Result<()> {
        check_key(key)?;
        let mut artifacts = self
            .artifacts
            .lock()
            .map_err(|_| Error::State("artifact map lock poisoned".to_string()))?;
        artifacts.insert(key.to_string(), value.to_string());
        if let Ok(mut log) = self.write_log.lock() {
            log.push(key.to_string());
        }
        Ok(())
    }

    fn read(&self, key: &str) -> Result<Option<String>> {
        check_key(key)?;
        let artifacts = self
            .artifacts
            .lock()
            .map_err(|_| Error::State("artifact map lock poisoned".to_string()))?;
        Ok(artifacts.get(key).cloned())
    }
}
