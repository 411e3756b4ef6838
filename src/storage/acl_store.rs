// src/storage/acl_store.rs
//! ACL store: the ordered list of student-to-verifier bindings.
//!
//! Order matters. The entry at position `i` (0-based) correlates with the credential and
//! token stored under index `i + 1`. Persisted as `acl.json`: `{"students": [AclEntry, ..]}`.

use std::collections::HashSet;

use log::info;
use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::models::acl::AclEntry;
use crate::models::did::student_did;
use crate::storage::persistence::RecordStorage;
use crate::utils::serialization::{from_json, to_pretty_json};
use crate::wallet::verifier_keyring::{secret_hash, verifier_email};

/// Record name of the persisted ACL.
pub const ACL_FILE: &str = "acl.json";

/// Seconds between the expirations of consecutive generated entries.
pub const EXPIRATION_STEP_SECS: i64 = 1000;

/// Generates `count` deterministic ACL entries.
///
/// Entry `n` (1-based) binds `did:university:student{n}` to the SHA-256 of
/// `hr{n}@{verifier_domain}` and expires at `base_expiration + (n - 1) * 1000`.
pub fn create_entries(count: u32, base_expiration: i64, verifier_domain: &str) -> Vec<AclEntry> {
    (1..=count)
        .map(|n| {
            AclEntry::new(
                student_did(n),
                secret_hash(&verifier_email(n, verifier_domain)),
                base_expiration + i64::from(n - 1) * EXPIRATION_STEP_SECS,
            )
        })
        .collect()
}

#[derive(Serialize, Deserialize)]
struct AclDocument {
    students: Vec<AclEntry>,
}

/// Ordered, DID-unique set of ACL entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AclStore {
    entries: Vec<AclEntry>,
}

impl AclStore {
    /// Builds a store, rejecting duplicate student DIDs.
    pub fn from_entries(entries: Vec<AclEntry>) -> Result<Self, StorageError> {
        let mut seen = HashSet::new();
        for entry in &entries {
            if !seen.insert(entry.student_did.as_str()) {
                return Err(StorageError::DuplicateDid(entry.student_did.clone()));
            }
        }
        Ok(Self { entries })
    }

    /// Generates a store of `count` entries; see [`create_entries`].
    pub fn generate(count: u32, base_expiration: i64, verifier_domain: &str) -> Self {
        Self {
            entries: create_entries(count, base_expiration, verifier_domain),
        }
    }

    pub fn entries(&self) -> &[AclEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, student_did: &str) -> Option<&AclEntry> {
        self.entries.iter().find(|e| e.student_did == student_did)
    }

    /// Entry correlated with a 1-based token/credential index.
    pub fn entry_at_index(&self, index: u32) -> Option<&AclEntry> {
        let position = usize::try_from(index).ok()?.checked_sub(1)?;
        self.entries.get(position)
    }

    /// Pre-flight usability check for a DID.
    pub fn is_usable(&self, student_did: &str, now: i64) -> Result<bool, StorageError> {
        self.get(student_did)
            .map(|entry| entry.is_usable(now))
            .ok_or_else(|| StorageError::NotFound(student_did.to_string()))
    }

    /// Clears the validity flag of a DID's entry. Revoking twice is a no-op.
    pub fn revoke(&mut self, student_did: &str) -> Result<(), StorageError> {
        let entry = self
            .entries
            .iter_mut()
            .find(|e| e.student_did == student_did)
            .ok_or_else(|| StorageError::NotFound(student_did.to_string()))?;
        if entry.is_valid {
            entry.is_valid = false;
            info!("Revoked ACL entry for {}", student_did);
        }
        Ok(())
    }

    /// Loads the persisted ACL, failing with `NotFound` when it was never written.
    pub fn load(storage: &dyn RecordStorage) -> Result<Self, StorageError> {
        let raw = storage
            .read(ACL_FILE)?
            .ok_or_else(|| StorageError::NotFound(ACL_FILE.to_string()))?;
        let document: AclDocument = from_json(&raw)?;
        Self::from_entries(document.students)
    }

    pub fn save(&self, storage: &dyn RecordStorage) -> Result<(), StorageError> {
        let document = AclDocument {
            students: self.entries.clone(),
        };
        storage.write(ACL_FILE, &to_pretty_json(&document)?)
    }
}
