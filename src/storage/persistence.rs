// src/storage/persistence.rs
//! Minimal read/write capability behind the ACL, credential and token stores.
//!
//! Records are whole UTF-8 documents addressed by name. The stores decide the layout of
//! each document; backends only move strings.

use std::collections::HashMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use tempfile::NamedTempFile;

use crate::error::StorageError;

/// Named-document storage backend.
pub trait RecordStorage: Send + Sync {
    /// Reads a document, `Ok(None)` when it does not exist.
    fn read(&self, name: &str) -> Result<Option<String>, StorageError>;

    /// Replaces a document.
    fn write(&self, name: &str, contents: &str) -> Result<(), StorageError>;
}

/// Stores each record as a file under a data directory.
#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    /// Opens (and creates if needed) the data directory.
    pub fn new(root: impl AsRef<Path>) -> Result<Self, StorageError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl RecordStorage for FileStorage {
    fn read(&self, name: &str) -> Result<Option<String>, StorageError> {
        match fs::read_to_string(self.root.join(name)) {
            Ok(contents) if contents.trim().is_empty() => Ok(None),
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, name: &str, contents: &str) -> Result<(), StorageError> {
        // Each writer stages into its own file, then renames over the record.
        let mut staging = NamedTempFile::new_in(&self.root)?;
        staging.write_all(contents.as_bytes())?;
        staging
            .persist(self.root.join(name))
            .map_err(|e| StorageError::Io(e.error))?;
        Ok(())
    }
}

/// In-memory backend, used by tests and throwaway runs.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    records: RwLock<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordStorage for MemoryStorage {
    fn read(&self, name: &str) -> Result<Option<String>, StorageError> {
        let records = self.records.read().unwrap_or_else(|e| e.into_inner());
        Ok(records.get(name).cloned())
    }

    fn write(&self, name: &str, contents: &str) -> Result<(), StorageError> {
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        records.insert(name.to_string(), contents.to_string());
        Ok(())
    }
}
