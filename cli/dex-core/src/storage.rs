//! Durable key-value storage for small user preferences.
//!
//! Values are opaque strings keyed by short identifiers.
//! [FileStore] keeps one file per key and replaces it atomically under a
//! file lock, [MemoryStore] keeps everything in memory.

use std::collections::HashMap;
use std::fmt::Debug;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use fslock::LockFile;
use tracing::debug;

use crate::error::StorageError;

pub trait KeyValueStore: Send + Sync + Debug {
    /// Returns `None` if nothing is stored under `key`.
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    /// Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

fn validate_key(key: &str) -> Result<(), StorageError> {
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidKey(key.to_string()))
    }
}

/// Stores every key as `<dir>/<key>.json`.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn value_path(&self, key: &str) -> Result<PathBuf, StorageError> {
        validate_key(key)?;
        Ok(self.dir.join(format!("{key}.json")))
    }

    /// The presence of the lock file does not indicate an active lock.
    fn acquire_lock(&self, value_path: &Path) -> Result<LockFile, StorageError> {
        std::fs::create_dir_all(&self.dir).map_err(StorageError::Write)?;
        let lock_path = value_path.with_extension("lock");
        let mut lock = LockFile::open(lock_path.as_os_str()).map_err(StorageError::AcquireLock)?;
        lock.lock().map_err(StorageError::AcquireLock)?;
        Ok(lock)
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.value_path(key)?;
        if !path.exists() {
            debug!(path = %path.display(), "no stored value");
            return Ok(None);
        }
        let _lock = self.acquire_lock(&path)?;
        std::fs::read_to_string(&path)
            .map(Some)
            .map_err(StorageError::Read)
    }

    /// Write to a temporary file in the same directory and rename it into
    /// place, so readers never observe a partial value.
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let path = self.value_path(key)?;
        let parent = path
            .parent()
            .ok_or_else(|| StorageError::InvalidLocation(path.clone()))?;
        let _lock = self.acquire_lock(&path)?;

        let mut temp_file =
            tempfile::NamedTempFile::new_in(parent).map_err(StorageError::Write)?;
        temp_file
            .write_all(value.as_bytes())
            .map_err(StorageError::Write)?;
        temp_file.persist(&path).map_err(StorageError::Persist)?;
        debug!(path = %path.display(), "stored value");
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let path = self.value_path(key)?;
        if !path.exists() {
            return Ok(());
        }
        let _lock = self.acquire_lock(&path)?;
        match std::fs::remove_file(&path) {
            Err(err) if err.kind() != std::io::ErrorKind::NotFound => Err(StorageError::Write(err)),
            _ => Ok(()),
        }
    }
}

/// Process-local storage.
///
/// Writes can be made to fail to exercise degraded persistence.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following write fail with [StorageError::Unavailable].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), StorageError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("quota exceeded".to_string()));
        }
        Ok(())
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        validate_key(key)?;
        let values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        validate_key(key)?;
        self.check_available()?;
        let mut values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        validate_key(key)?;
        self.check_available()?;
        let mut values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        values.remove(key);
        Ok(())
    }
}
