// src/models/credential.rs
//! Student Verifiable Credential data model.
//!
//! Defines the W3C-shaped credential the university issues to each student, and the
//! [`CredentialRecord`] that replaces it everywhere downstream: only the content hash of
//! the credential is ever presented or sent to the ledger.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::did::{key_reference, ISSUER_DID};

/// JSON-LD context of every credential and presentation.
pub const CREDENTIALS_CONTEXT: &str = "https://www.w3.org/2018/credentials/v1";

/// Issuance timestamp stamped on generated credentials.
pub const DEFAULT_ISSUANCE_DATE: &str = "2024-09-25T19:23:24Z";

/// A Verifiable Credential for one student.
///
/// Follows the [W3C Verifiable Credentials Data Model](https://www.w3.org/TR/vc-data-model/)
/// field naming. Extra claims live in a `BTreeMap` so that the canonical serialization does
/// not depend on the order claims were added.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct StudentCredential {
    #[serde(rename = "@context")]
    pub context: Vec<String>,

    /// Credential URI, e.g. `http://university.edu/credentials/student-credential-1`
    pub id: String,

    #[serde(rename = "type")]
    pub credential_type: Vec<String>,

    /// DID of the issuing university
    pub issuer: String,

    #[serde(rename = "issuanceDate")]
    pub issuance_date: String,

    #[serde(rename = "credentialSubject")]
    pub credential_subject: CredentialSubject,

    /// Issuer signature block. Carried verbatim; never interpreted here.
    pub proof: CredentialProof,
}

/// The student the credential is about.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CredentialSubject {
    /// Student DID
    pub id: String,
    pub name: String,
    /// Additional claims, e.g. `("degree", "BSc Computer Science")`
    #[serde(flatten)]
    pub claims: BTreeMap<String, String>,
}

/// Linked-data proof block attached by the issuer.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CredentialProof {
    #[serde(rename = "type")]
    pub proof_type: String,
    pub created: String,
    #[serde(rename = "proofPurpose")]
    pub proof_purpose: String,
    #[serde(rename = "verificationMethod")]
    pub verification_method: String,
    pub jws: String,
}

impl StudentCredential {
    /// Builds the university's standard credential for student number `n`.
    ///
    /// # Arguments
    /// * `n` - Student number (1-based), also the credential's storage index
    /// * `student_did` - DID of the credential subject
    pub fn for_student(n: u32, student_did: &str) -> Self {
        Self {
            context: vec![CREDENTIALS_CONTEXT.to_string()],
            id: format!("http://university.edu/credentials/student-credential-{}", n),
            credential_type: vec![
                "VerifiableCredential".to_string(),
                "StudentCredential".to_string(),
            ],
            issuer: ISSUER_DID.to_string(),
            issuance_date: DEFAULT_ISSUANCE_DATE.to_string(),
            credential_subject: CredentialSubject {
                id: student_did.to_string(),
                name: format!("Student {}", n),
                claims: BTreeMap::new(),
            },
            proof: CredentialProof {
                proof_type: "Ed25519Signature2020".to_string(),
                created: "2024-09-25T20:10:10Z".to_string(),
                proof_purpose: "assertionMethod".to_string(),
                verification_method: key_reference(ISSUER_DID),
                jws: String::new(),
            },
        }
    }

    /// Adds or replaces a subject claim.
    pub fn with_claim(mut self, key: &str, value: &str) -> Self {
        self.credential_subject
            .claims
            .insert(key.to_string(), value.to_string());
        self
    }
}

/// Content-hash record for one stored credential.
///
/// Persisted in `ipfs.json` under the credential's index.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CredentialRecord {
    pub student_did: String,
    /// Hex SHA-256 of the canonical credential bytes
    #[serde(rename = "hashed_vc")]
    pub content_hash: String,
}
