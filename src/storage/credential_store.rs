// src/storage/credential_store.rs
//! Content-hash index of student credentials.
//!
//! Stands in for off-chain content storage: maps an index to the student DID and the
//! SHA-256 of that student's canonical credential. Persisted as `ipfs.json`:
//! `{"<index>": {"student_did": .., "hashed_vc": ..}}`.

use std::collections::BTreeMap;

use crate::error::StorageError;
use crate::models::credential::CredentialRecord;
use crate::storage::persistence::RecordStorage;
use crate::utils::serialization::{from_json, to_pretty_json};

/// Record name of the persisted credential index.
pub const CREDENTIAL_FILE: &str = "ipfs.json";

/// Index → credential hash record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CredentialStore {
    records: BTreeMap<u32, CredentialRecord>,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the content hash for `index`, replacing any earlier record at that index.
    pub fn store(&mut self, index: u32, student_did: &str, content_hash: &str) {
        self.records.insert(
            index,
            CredentialRecord {
                student_did: student_did.to_string(),
                content_hash: content_hash.to_string(),
            },
        );
    }

    /// Content hash stored at `index`.
    pub fn lookup(&self, index: u32) -> Result<&str, StorageError> {
        self.records
            .get(&index)
            .map(|record| record.content_hash.as_str())
            .ok_or_else(|| StorageError::NotFound(format!("credential hash at index {}", index)))
    }

    pub fn record(&self, index: u32) -> Option<&CredentialRecord> {
        self.records.get(&index)
    }

    pub fn remove(&mut self, index: u32) -> Option<CredentialRecord> {
        self.records.remove(&index)
    }

    /// Records in ascending index order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &CredentialRecord)> {
        self.records.iter().map(|(index, record)| (*index, record))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Loads the persisted index, or an empty one if nothing was written yet.
    pub fn load_or_default(storage: &dyn RecordStorage) -> Result<Self, StorageError> {
        match storage.read(CREDENTIAL_FILE)? {
            Some(raw) => Ok(Self {
                records: from_json(&raw)?,
            }),
            None => Ok(Self::new()),
        }
    }

    /// Loads the persisted index, failing with `NotFound` when it was never written.
    pub fn load(storage: &dyn RecordStorage) -> Result<Self, StorageError> {
        let raw = storage
            .read(CREDENTIAL_FILE)?
            .ok_or_else(|| StorageError::NotFound(CREDENTIAL_FILE.to_string()))?;
        Ok(Self {
            records: from_json(&raw)?,
        })
    }

    pub fn save(&self, storage: &dyn RecordStorage) -> Result<(), StorageError> {
        storage.write(CREDENTIAL_FILE, &to_pretty_json(&self.records)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::persistence::MemoryStorage;

    #[test]
    fn test_lookup_missing_index_is_not_found() {
        let store = CredentialStore::new();
        assert!(matches!(store.lookup(1), Err(StorageError::NotFound(_))));
    }

    #[test]
    fn test_store_overwrites_index() {
        let mut store = CredentialStore::new();
        store.store(1, "did:university:student1", "aa");
        store.store(1, "did:university:student1", "bb");
        assert_eq!(store.lookup(1).unwrap(), "bb");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_persisted_layout_uses_string_keys() {
        let storage = MemoryStorage::new();
        let mut store = CredentialStore::new();
        store.store(2, "did:university:student2", "cafe");
        store.store(10, "did:university:student10", "beef");
        store.save(&storage).unwrap();

        let raw = storage.read(CREDENTIAL_FILE).unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["2"]["hashed_vc"], "cafe");
        assert_eq!(value["10"]["student_did"], "did:university:student10");

        let loaded = CredentialStore::load(&storage).unwrap();
        assert_eq!(loaded, store);
        let order: Vec<u32> = loaded.iter().map(|(index, _)| index).collect();
        assert_eq!(order, vec![2, 10]);
    }

    #[test]
    fn test_load_without_file() {
        let storage = MemoryStorage::new();
        assert!(CredentialStore::load_or_default(&storage).unwrap().is_empty());
        assert!(matches!(
            CredentialStore::load(&storage),
            Err(StorageError::NotFound(_))
        ));
    }
}
