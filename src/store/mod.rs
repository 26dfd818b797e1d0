//! Local persistence for serialized payloads.
//!
//! Payloads are addressed by filename-shaped ids built with [`structure_key`]
//! and [`data_key`], e.g. `User.structure.json` or `User.data.bin`.

mod file;
mod schema;
mod sqlite;

use std::collections::HashMap;
use std::sync::Mutex;

use thiserror::Error;

use crate::codec::Format;

pub use file::FileStore;
pub use sqlite::{DocumentInfo, SqliteStore};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("migration {version} ({name}) failed: {source}")]
    Migration {
        version: &'static str,
        name: &'static str,
        source: rusqlite::Error,
    },

    #[error("invalid storage id: {0:?}")]
    InvalidId(String),

    #[error("could not determine data directory")]
    NoDataDir,
}

/// Byte-oriented key/value persistence.
pub trait LocalStorage: Send + Sync {
    fn exists(&self, id: &str) -> Result<bool, StorageError>;

    /// Returns `None` when nothing is stored under `id`.
    fn load(&self, id: &str) -> Result<Option<Vec<u8>>, StorageError>;

    fn save(&self, id: &str, payload: &[u8]) -> Result<(), StorageError>;

    /// Returns whether anything was deleted.
    fn delete(&self, id: &str) -> Result<bool, StorageError>;
}

/// The two halves of a serialized model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PayloadKind {
    Structure,
    Data,
}

impl PayloadKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Structure => "structure",
            Self::Data => "data",
        }
    }
}

impl std::str::FromStr for PayloadKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "structure" => Ok(Self::Structure),
            "data" => Ok(Self::Data),
            _ => Err(format!("unknown payload kind: {}", s)),
        }
    }
}

pub fn storage_key(purpose: &str, kind: PayloadKind, format: Format) -> String {
    format!("{}.{}.{}", purpose, kind.as_str(), format.extension())
}

pub fn structure_key(purpose: &str, format: Format) -> String {
    storage_key(purpose, PayloadKind::Structure, format)
}

pub fn data_key(purpose: &str, format: Format) -> String {
    storage_key(purpose, PayloadKind::Data, format)
}

/// Ids end up as file names, so anything that could escape a directory is
/// refused.
pub(crate) fn validate_id(id: &str) -> Result<(), StorageError> {
    let invalid = id.is_empty()
        || id == "."
        || id == ".."
        || id.contains(['/', '\\', '\0'])
        || id.starts_with('.');
    if invalid {
        return Err(StorageError::InvalidId(id.to_string()));
    }
    Ok(())
}

/// Process-local storage, mostly for tests and the `Transient` workflows.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("store lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl LocalStorage for MemoryStore {
    fn exists(&self, id: &str) -> Result<bool, StorageError> {
        Ok(self.entries.lock().expect("store lock poisoned").contains_key(id))
    }

    fn load(&self, id: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.entries.lock().expect("store lock poisoned").get(id).cloned())
    }

    fn save(&self, id: &str, payload: &[u8]) -> Result<(), StorageError> {
        validate_id(id)?;
        self.entries
            .lock()
            .expect("store lock poisoned")
            .insert(id.to_string(), payload.to_vec());
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<bool, StorageError> {
        Ok(self
            .entries
            .lock()
            .expect("store lock poisoned")
            .remove(id)
            .is_some())
    }
}
