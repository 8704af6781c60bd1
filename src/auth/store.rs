//! Durable token cache.
//!
//! Token values are advisory: a missing or corrupt store only costs a renew
//! round-trip. The store is keyed by [`TokenClass::storage_key`].

use super::token::TokenClass;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Token store failures.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store file could not be read or written.
    #[error("Token store I/O failed at {path}: {source}")]
    Io {
        /// Store path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The store file is not a JSON object of strings.
    #[error("Token store at {path} is corrupt: {reason}")]
    Corrupt {
        /// Store path.
        path: PathBuf,
        /// Decoder message.
        reason: String,
    },
}

/// In-memory store. Nothing survives the process.
#[derive(Debug, Clone, Default)]
pub struct MemoryTokenStore {
    entries: BTreeMap<String, String>,
}

impl MemoryTokenStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

/// JSON file store, rewritten in full on every change.
#[derive(Debug, Clone)]
pub struct JsonFileTokenStore {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl JsonFileTokenStore {
    /// Open a store at `path`. A missing file is an empty store.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Io` if the file exists but cannot be read, and
    /// `StoreError::Corrupt` if it is not a JSON object of strings.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let entries = match std::fs::read_to_string(&path) {
            Ok(contents) if contents.trim().is_empty() => BTreeMap::new(),
            Ok(contents) => serde_json::from_str(&contents).map_err(|e| StoreError::Corrupt {
                path: path.clone(),
                reason: e.to_string(),
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(source) => return Err(StoreError::Io { path, source }),
        };
        Ok(Self { path, entries })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self) -> Result<(), StoreError> {
        let io = |source| StoreError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(io)?;
            }
        }
        let json = serde_json::to_string_pretty(&self.entries).map_err(|e| StoreError::Corrupt {
            path: self.path.clone(),
            reason: e.to_string(),
        })?;
        std::fs::write(&self.path, json).map_err(io)
    }
}

/// Unified token store.
///
/// Sum type over the available backends.
#[derive(Debug, Clone)]
pub enum TokenStore {
    /// Process-local store.
    Memory(MemoryTokenStore),
    /// File-backed store.
    File(JsonFileTokenStore),
}

impl Default for TokenStore {
    fn default() -> Self {
        TokenStore::Memory(MemoryTokenStore::new())
    }
}

impl TokenStore {
    fn entries(&self) -> &BTreeMap<String, String> {
        match self {
            TokenStore::Memory(m) => &m.entries,
            TokenStore::File(f) => &f.entries,
        }
    }

    fn entries_mut(&mut self) -> &mut BTreeMap<String, String> {
        match self {
            TokenStore::Memory(m) => &mut m.entries,
            TokenStore::File(f) => &mut f.entries,
        }
    }

    fn flush(&self) -> Result<(), StoreError> {
        match self {
            TokenStore::Memory(_) => Ok(()),
            TokenStore::File(f) => f.flush(),
        }
    }

    /// Every stored token whose key parses as a class.
    pub fn load(&self) -> Vec<(TokenClass, String)> {
        self.entries()
            .iter()
            .filter_map(|(key, raw)| TokenClass::parse_key(key).map(|class| (class, raw.clone())))
            .collect()
    }

    /// Stored token for a class.
    pub fn get(&self, class: &TokenClass) -> Option<&str> {
        self.entries().get(&class.storage_key()).map(String::as_str)
    }

    /// Write a token through to the backend.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Io` if a file backend cannot be written.
    pub fn save(&mut self, class: &TokenClass, raw: &str) -> Result<(), StoreError> {
        self.entries_mut().insert(class.storage_key(), raw.to_string());
        self.flush()
    }

    /// Remove one token.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Io` if a file backend cannot be written.
    pub fn remove(&mut self, class: &TokenClass) -> Result<(), StoreError> {
        if self.entries_mut().remove(&class.storage_key()).is_some() {
            self.flush()?;
        }
        Ok(())
    }

    /// Remove every token.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Io` if a file backend cannot be written.
    pub fn clear(&mut self) -> Result<(), StoreError> {
        self.entries_mut().clear();
        self.flush()
    }

    /// Number of stored tokens.
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    /// Check if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}
