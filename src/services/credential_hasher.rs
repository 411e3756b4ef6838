// src/services/credential_hasher.rs
//! Credential hashing: canonical serialization, SHA-256 content identifiers, and recording
//! them in the [`CredentialStore`].

use log::info;
use serde::Serialize;

use crate::error::StorageError;
use crate::models::credential::StudentCredential;
use crate::models::did::student_did;
use crate::storage::credential_store::CredentialStore;
use crate::utils::crypto::hash_hex;
use crate::utils::serialization::canonical_bytes;

/// Canonical bytes of a credential.
///
/// Semantically identical credentials serialize identically, however they were built or in
/// whatever key order their JSON arrived.
pub fn canonicalize<T: Serialize>(credential: &T) -> Result<Vec<u8>, StorageError> {
    Ok(canonical_bytes(credential)?)
}

/// Content identifier of canonical bytes: lowercase hex SHA-256.
pub fn hash(bytes: &[u8]) -> String {
    hash_hex(bytes)
}

/// `hash(canonicalize(credential))`
pub fn content_hash<T: Serialize>(credential: &T) -> Result<String, StorageError> {
    Ok(hash(&canonicalize(credential)?))
}

/// Hashes a credential and records it under `index`.
///
/// # Returns
/// The content hash that was stored.
pub fn hash_and_store(
    store: &mut CredentialStore,
    index: u32,
    credential: &StudentCredential,
) -> Result<String, StorageError> {
    let digest = content_hash(credential)?;
    store.store(index, &credential.credential_subject.id, &digest);
    Ok(digest)
}

/// Issues the standard credential for students `1..=count` and stores their hashes at the
/// matching indices, adding to whatever `store` already holds.
pub fn generate_records(store: &mut CredentialStore, count: u32) -> Result<(), StorageError> {
    for n in 1..=count {
        let credential = StudentCredential::for_student(n, &student_did(n));
        hash_and_store(store, n, &credential)?;
    }
    info!("{} hashed credentials stored ({} total)", count, store.len());
    Ok(())
}
