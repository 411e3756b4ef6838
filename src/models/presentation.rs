// src/models/presentation.rs
//! Verifiable Presentation and token records.
//!
//! A token joins an ACL entry with a presentation that references the student's credential
//! by content hash. Tokens are keyed by the same index as the credential hash they embed.

use serde::{Deserialize, Serialize};

use crate::models::acl::AclEntry;
use crate::models::credential::{CredentialProof, CREDENTIALS_CONTEXT};

/// A presented credential: the content hash plus the metadata shown to the verifier.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PresentedCredential {
    /// Content hash of the credential, as stored in the credential index
    pub hash: String,
    /// URI of the credential the hash was taken from
    pub id: String,
    #[serde(rename = "@context")]
    pub context: Vec<String>,
    #[serde(rename = "type")]
    pub credential_type: Vec<String>,
    pub issuer: String,
    #[serde(rename = "issuanceDate")]
    pub issuance_date: String,
    /// DID of the student the credential is about
    pub subject: String,
    pub proof: CredentialProof,
}

/// Holder proof block of a presentation. Opaque to verification.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PresentationProof {
    #[serde(rename = "type")]
    pub proof_type: String,
    pub created: String,
    #[serde(rename = "proofPurpose")]
    pub proof_purpose: String,
    #[serde(rename = "verificationMethod")]
    pub verification_method: String,
    pub challenge: String,
    pub domain: String,
    pub jws: String,
}

/// W3C Verifiable Presentation wrapping hashed credentials.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct VerifiablePresentation {
    #[serde(rename = "@context")]
    pub context: Vec<String>,
    #[serde(rename = "type")]
    pub presentation_type: String,
    #[serde(rename = "verifiableCredential")]
    pub verifiable_credential: Vec<PresentedCredential>,
    pub proof: PresentationProof,
}

impl VerifiablePresentation {
    pub fn new(credential: PresentedCredential, proof: PresentationProof) -> Self {
        Self {
            context: vec![CREDENTIALS_CONTEXT.to_string()],
            presentation_type: "VerifiablePresentation".to_string(),
            verifiable_credential: vec![credential],
            proof,
        }
    }
}

/// ACL entry plus presentation, persisted in `token.json` under its index.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub student_did: String,
    /// Snapshot of the ACL entry at assembly time
    pub acl: AclEntry,
    #[serde(rename = "verifiablePresentation")]
    pub presentation: VerifiablePresentation,
}

impl Token {
    /// Content hash referenced by the first presented credential.
    pub fn credential_hash(&self) -> Option<&str> {
        self.presentation
            .verifiable_credential
            .first()
            .map(|credential| credential.hash.as_str())
    }
}
