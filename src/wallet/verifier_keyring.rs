// src/wallet/verifier_keyring.rs
//! Verifier secret material, keyed by the student DID it unlocks.
//!
//! Each employer's secret is their email address. Only its SHA-256 (see [`secret_hash`])
//! appears in the ACL and on the ledger; the plain value stays in this keyring and feeds the
//! Schnorr prover. Persisted as `batch_verification_payload.json`:
//!
//! ```json
//! { "students": [ { "email": "hr1@gmail.com", "student_did": "did:university:student1" } ] }
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::models::did::student_did;
use crate::storage::persistence::RecordStorage;
use crate::utils::crypto::hash_hex;
use crate::utils::serialization::{from_json, to_pretty_json};

/// Record name of the persisted keyring.
pub const KEYRING_FILE: &str = "batch_verification_payload.json";

/// Lower-cases and trims secret material so equal emails derive equal secrets.
pub fn normalize_material(material: &str) -> String {
    material.trim().to_lowercase()
}

/// Hex SHA-256 of the normalised secret material.
pub fn secret_hash(material: &str) -> String {
    hash_hex(normalize_material(material).as_bytes())
}

/// Synthetic verifier email for student number `n`.
pub fn verifier_email(n: u32, domain: &str) -> String {
    normalize_material(&format!("hr{}@{}", n, domain))
}

#[derive(Serialize, Deserialize)]
struct PayloadEntry {
    email: String,
    student_did: String,
}

#[derive(Serialize, Deserialize)]
struct PayloadDocument {
    students: Vec<PayloadEntry>,
}

/// In-memory keyring of verifier secrets.
///
/// # Note
/// Secrets are held in plain memory. Secure key storage is outside this crate.
#[derive(Debug, Clone, Default)]
pub struct VerifierKeyring {
    secrets: BTreeMap<String, String>,
}

impl VerifierKeyring {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generates the keyring matching [`create_entries`](crate::storage::acl_store::create_entries):
    /// `hr{n}@{domain}` for `did:university:student{n}`, `n` in `1..=count`.
    pub fn generate(count: u32, domain: &str) -> Self {
        let mut keyring = Self::new();
        for n in 1..=count {
            keyring.store_secret(student_did(n), verifier_email(n, domain));
        }
        keyring
    }

    /// Stores secret material for a DID, overwriting any previous value.
    pub fn store_secret(&mut self, student_did: String, material: String) {
        self.secrets.insert(student_did, normalize_material(&material));
    }

    pub fn get_secret(&self, student_did: &str) -> Option<&str> {
        self.secrets.get(student_did).map(String::as_str)
    }

    pub fn contains(&self, student_did: &str) -> bool {
        self.secrets.contains_key(student_did)
    }

    /// Returns `true` if a secret was present and removed.
    pub fn remove_secret(&mut self, student_did: &str) -> bool {
        self.secrets.remove(student_did).is_some()
    }

    pub fn count(&self) -> usize {
        self.secrets.len()
    }

    /// Loads the keyring, failing with `NotFound` when it was never written.
    pub fn load(storage: &dyn RecordStorage) -> Result<Self, StorageError> {
        let raw = storage
            .read(KEYRING_FILE)?
            .ok_or_else(|| StorageError::NotFound(KEYRING_FILE.to_string()))?;
        let document: PayloadDocument = from_json(&raw)?;
        let mut keyring = Self::new();
        for entry in document.students {
            keyring.store_secret(entry.student_did, entry.email);
        }
        Ok(keyring)
    }

    pub fn save(&self, storage: &dyn RecordStorage) -> Result<(), StorageError> {
        let document = PayloadDocument {
            students: self
                .secrets
                .iter()
                .map(|(did, email)| PayloadEntry {
                    email: email.clone(),
                    student_did: did.clone(),
                })
                .collect(),
        };
        storage.write(KEYRING_FILE, &to_pretty_json(&document)?)
    }
}
