// src/models/acl.rs
//! Access-control list entry binding a student to the employer allowed to verify them.

use serde::{Deserialize, Serialize};

fn default_valid() -> bool {
    true
}

/// One ACL row.
///
/// The field names on the wire follow the persisted `acl.json` layout
/// (`employer_hashed_email`, `isValid`).
///
/// # Usability
/// An entry is usable only while `is_valid` is set and `now < expiration`. The ledger's copy
/// is authoritative at verification time; checks against a local copy are pre-flight only.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct AclEntry {
    /// Student DID, unique across the ACL.
    pub student_did: String,

    /// Hex SHA-256 of the authorized verifier's secret material (their normalised email).
    #[serde(rename = "employer_hashed_email")]
    pub authorized_verifier_secret_hash: String,

    /// Expiration as UNIX seconds.
    pub expiration: i64,

    /// Cleared by revocation.
    #[serde(rename = "isValid", default = "default_valid")]
    pub is_valid: bool,
}

impl AclEntry {
    pub fn new(student_did: String, authorized_verifier_secret_hash: String, expiration: i64) -> Self {
        Self {
            student_did,
            authorized_verifier_secret_hash,
            expiration,
            is_valid: true,
        }
    }

    pub fn is_usable(&self, now: i64) -> bool {
        self.is_valid && now < self.expiration
    }
}
