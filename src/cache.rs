use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache file i/o failed: {0}")]
    Io(#[from] io::Error),
    #[error("cache file is not valid JSON: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Small persisted key-value store for per-meta-category prompt-cache ids.
/// Loaded once at run start; every insert is written through immediately so
/// ids survive a crash mid-batch.
#[derive(Debug)]
pub struct CacheStore {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl CacheStore {
    /// Opens the store, creating an empty one when the file does not exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CacheError> {
        let path = path.as_ref().to_path_buf();
        let entries = match std::fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw)?,
            Err(err) if err.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => return Err(err.into()),
        };
        Ok(Self { path, entries })
    }

    /// Returns the id stored under `key`, minting and persisting a fresh one
    /// when absent.
    pub fn ensure(&mut self, key: &str) -> Result<&str, CacheError> {
        if !self.entries.contains_key(key) {
            self.entries
                .insert(key.to_string(), Uuid::new_v4().to_string());
            self.flush()?;
        }
        Ok(self.entries[key].as_str())
    }

    fn flush(&self) -> Result<(), CacheError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let raw = serde_json::to_string_pretty(&self.entries)?;
        std::fs::write(&self.path, raw)?;
        Ok(())
    }
}
