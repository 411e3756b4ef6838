// src/services/token_assembler.rs
//! Token assembly: joins each ACL entry with a presentation of its credential hash.

use chrono::{DateTime, SecondsFormat, Utc};
use log::{info, warn};

use crate::models::acl::AclEntry;
use crate::models::credential::StudentCredential;
use crate::models::did::key_reference;
use crate::models::presentation::{
    PresentationProof, PresentedCredential, Token, VerifiablePresentation,
};
use crate::storage::credential_store::CredentialStore;
use crate::storage::token_store::TokenSet;
use crate::utils::crypto::hash_hex;

/// Default presentation domain.
pub const PRESENTATION_DOMAIN: &str = "university.edu";

/// Builds presentations with a fixed creation time and domain.
#[derive(Debug, Clone)]
pub struct TokenAssembler {
    created: DateTime<Utc>,
    domain: String,
}

impl Default for TokenAssembler {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl TokenAssembler {
    pub fn new(created: DateTime<Utc>) -> Self {
        Self {
            created,
            domain: PRESENTATION_DOMAIN.to_string(),
        }
    }

    /// Assembles one token per ACL entry whose credential hash is present.
    ///
    /// The entry at position `i` pairs with the credential stored at index `i + 1`. Entries
    /// without a stored hash are skipped, as are entries whose stored record names another
    /// student. The result therefore never holds more tokens than ACL entries, never two for
    /// one index, and never one whose hash is absent from `credentials`.
    pub fn assemble(&self, acl: &[AclEntry], credentials: &CredentialStore) -> TokenSet {
        let mut tokens = TokenSet::new();
        for (position, entry) in acl.iter().enumerate() {
            let index = match u32::try_from(position + 1) {
                Ok(index) => index,
                Err(_) => break,
            };
            let record = match credentials.record(index) {
                Some(record) => record,
                None => {
                    warn!("No credential hash at index {}, skipping {}", index, entry.student_did);
                    continue;
                }
            };
            if record.student_did != entry.student_did {
                warn!(
                    "Credential at index {} belongs to {}, not {}; skipping",
                    index, record.student_did, entry.student_did
                );
                continue;
            }
            let token = Token {
                student_did: entry.student_did.clone(),
                acl: entry.clone(),
                presentation: self.presentation(index, &record.content_hash, &entry.student_did),
            };
            tokens.insert(index, token);
        }
        info!("Assembled {} tokens from {} ACL entries", tokens.len(), acl.len());
        tokens
    }

    /// Presentation of the hashed credential stored at `index` for `student_did`.
    ///
    /// The presented metadata is that of the standard credential for `index`, so it matches
    /// the document whose hash is carried.
    pub fn presentation(
        &self,
        index: u32,
        content_hash: &str,
        student_did: &str,
    ) -> VerifiablePresentation {
        let created = self.created.to_rfc3339_opts(SecondsFormat::Secs, true);
        let template = StudentCredential::for_student(index, student_did);
        let credential = PresentedCredential {
            hash: content_hash.to_string(),
            id: template.id,
            context: template.context,
            credential_type: template.credential_type,
            issuer: template.issuer,
            issuance_date: template.issuance_date,
            subject: template.credential_subject.id,
            proof: template.proof,
        };
        // Holder challenge is derived, not random, so re-assembly is reproducible.
        let challenge = hash_hex(format!("{}|{}|{}", student_did, content_hash, created).as_bytes());
        let proof = PresentationProof {
            proof_type: "Ed25519Signature2020".to_string(),
            created,
            proof_purpose: "authentication".to_string(),
            verification_method: key_reference(student_did),
            challenge: challenge[..32].to_string(),
            domain: self.domain.clone(),
            jws: String::new(),
        };
        VerifiablePresentation::new(credential, proof)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::credential_hasher::generate_records;
    use crate::storage::acl_store::create_entries;
    use chrono::TimeZone;

    fn assembler() -> TokenAssembler {
        TokenAssembler::new(Utc.with_ymd_and_hms(2024, 9, 28, 16, 51, 46).unwrap())
    }

    #[test]
    fn test_one_token_per_hashed_entry() {
        let acl = create_entries(3, 2_000_000_000, "gmail.com");
        let mut credentials = CredentialStore::new();
        generate_records(&mut credentials, 3).unwrap();

        let tokens = assembler().assemble(&acl, &credentials);
        assert_eq!(tokens.indices(), vec![1, 2, 3]);
        for (index, token) in tokens.iter() {
            assert_eq!(token.credential_hash(), Some(credentials.lookup(index).unwrap()));
            assert_eq!(token.acl, acl[(index - 1) as usize]);
            assert_eq!(
                token.presentation.verifiable_credential[0].subject,
                token.student_did
            );
        }
    }

    #[test]
    fn test_missing_hash_is_skipped() {
        let acl = create_entries(3, 2_000_000_000, "gmail.com");
        let mut credentials = CredentialStore::new();
        generate_records(&mut credentials, 3).unwrap();
        credentials.remove(2);

        let tokens = assembler().assemble(&acl, &credentials);
        assert_eq!(tokens.indices(), vec![1, 3]);
        assert!(tokens.get(2).is_none());
    }

    #[test]
    fn test_mismatched_record_is_skipped() {
        let acl = create_entries(2, 2_000_000_000, "gmail.com");
        let mut credentials = CredentialStore::new();
        credentials.store(1, "did:university:student1", "aa");
        credentials.store(2, "did:university:student7", "bb");

        let tokens = assembler().assemble(&acl, &credentials);
        assert_eq!(tokens.indices(), vec![1]);
    }

    #[test]
    fn test_reassembly_is_reproducible() {
        let acl = create_entries(2, 2_000_000_000, "gmail.com");
        let mut credentials = CredentialStore::new();
        generate_records(&mut credentials, 2).unwrap();
        assert_eq!(
            assembler().assemble(&acl, &credentials),
            assembler().assemble(&acl, &credentials)
        );
    }

    #[test]
    fn test_presentation_wire_layout() {
        let vp = assembler().presentation(1, "cafe", "did:university:student1");
        let json = serde_json::to_value(&vp).unwrap();
        assert_eq!(json["type"], "VerifiablePresentation");
        assert_eq!(json["verifiableCredential"][0]["hash"], "cafe");
        assert_eq!(
            json["proof"]["verificationMethod"],
            "did:university:student1#key-1"
        );
        assert_eq!(json["proof"]["created"], "2024-09-28T16:51:46Z");
        assert_eq!(json["proof"]["domain"], "university.edu");
    }

    #[test]
    fn test_presented_metadata_matches_stored_credential() {
        let did = "did:university:student2";
        let stored = StudentCredential::for_student(2, did);
        let vp = assembler().presentation(2, "beef", did);
        let json = serde_json::to_value(&vp).unwrap();
        let presented = &json["verifiableCredential"][0];

        assert_eq!(
            presented["id"],
            "http://university.edu/credentials/student-credential-2"
        );
        assert_eq!(presented["proof"]["created"], "2024-09-25T20:10:10Z");
        assert_eq!(presented["proof"]["created"], stored.proof.created.as_str());
        assert_eq!(presented["issuanceDate"], stored.issuance_date.as_str());
        assert_eq!(presented["proof"]["proofPurpose"], "assertionMethod");
        assert_eq!(presented["subject"], did);
    }
}
