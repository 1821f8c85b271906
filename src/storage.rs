//! Client-side durable key-value storage.
//!
//! The session core only needs string get/set/remove, the same surface a
//! browser's local storage offers. [`MemoryStore`] backs headless use and
//! tests; [`FileStore`] keeps one file per key under a directory so the CLI
//! survives across invocations.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::AuthError;

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, AuthError>;

    fn set(&self, key: &str, value: &str) -> Result<(), AuthError>;

    /// Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<(), AuthError>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>, AuthError> {
        self.entries
            .lock()
            .map_err(|_| AuthError::Storage("memory store lock poisoned".to_string()))
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, AuthError> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), AuthError> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), AuthError> {
        self.lock()?.remove(key);
        Ok(())
    }
}

/// File-per-key store rooted at a directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `~/.brokerauth/storage`, falling back to the working directory.
    pub fn default_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".brokerauth")
            .join("storage")
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        let file_name: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{file_name}.json"))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, AuthError> {
        match std::fs::read_to_string(self.entry_path(key)) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AuthError::Io(e)),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), AuthError> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.entry_path(key);
        // Write then rename so readers never observe a half-written entry.
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, value)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), AuthError> {
        match std::fs::remove_file(self.entry_path(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AuthError::Io(e)),
        }
    }
}
