// src/blockchain/local_ledger.rs
//! In-process reference implementation of the Ledger Verifier.
//!
//! Mirrors the checks of the `SchnorrBatchVerification` contract so batch runs can execute
//! without a chain:
//! - challenges are `SHA-256(R ‖ nonce)` over a ledger-private counter, never zero, and each
//!   issued `(R, c)` pair is consumed by the first verification that uses it; only the most
//!   recent [`MAX_OUTSTANDING_CHALLENGES`] unanswered challenges are kept
//! - `verify` evaluates the challenge binding, the Schnorr equation with
//!   `y = g^(secret_hash mod p)`, the credential-hash equality, and ACL usability, stopping
//!   at the first failing check
//! - every call is charged a deterministic resource cost, standing in for gas

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use futures::future::{BoxFuture, FutureExt};
use log::{debug, info};
use num_bigint::BigUint;

use crate::blockchain::ledger::{LedgerError, LedgerReceipt, LedgerVerifier, VerificationRequest};
use crate::models::acl::AclEntry;
use crate::utils::crypto::hash_data;
use crate::zkp::schnorr::{SchnorrGroup, SchnorrProof};

/// Intrinsic cost of any state-changing call.
pub const BASE_CALL_COST: u64 = 21_000;
/// Cost of the challenge-binding lookup.
pub const CHALLENGE_CHECK_COST: u64 = 5_000;
/// Cost of the two modular exponentiations of the Schnorr check.
pub const SCHNORR_CHECK_COST: u64 = 12_000;
/// Cost of the credential-hash comparison.
pub const HASH_CHECK_COST: u64 = 3_000;
/// Cost of the ACL read and usability test.
pub const ACL_CHECK_COST: u64 = 4_000;
/// Cost of writing one storage slot.
pub const STORAGE_WRITE_COST: u64 = 20_000;

/// Unanswered challenges kept before the oldest is dropped.
pub const MAX_OUTSTANDING_CHALLENGES: usize = 1024;

/// Source of the current UNIX time in seconds.
pub type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

#[derive(Default)]
struct LedgerState {
    acl: HashMap<String, AclEntry>,
    did_index: HashMap<String, u32>,
    /// Outstanding `(R, c)` pairs by issuing nonce, oldest first.
    issued: BTreeMap<u64, (BigUint, BigUint)>,
    nonce: u64,
    accepted: u64,
    rejected: u64,
}

/// Reference ledger holding its state behind a mutex.
pub struct LocalLedger {
    state: Mutex<LedgerState>,
    clock: Clock,
}

impl Default for LocalLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalLedger {
    /// Ledger reading wall-clock time.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(|| chrono::Utc::now().timestamp()))
    }

    /// Ledger with an injected clock, for deterministic expiration checks.
    pub fn with_clock(clock: Clock) -> Self {
        Self {
            state: Mutex::new(LedgerState::default()),
            clock,
        }
    }

    fn state(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Loads a whole ACL into ledger state.
    pub fn register_acl(&self, entries: &[AclEntry]) {
        let mut state = self.state();
        for entry in entries {
            state.acl.insert(entry.student_did.clone(), entry.clone());
        }
        info!("Local ledger holds {} ACL entries", state.acl.len());
    }

    /// Clears the validity flag of a ledger ACL entry. Idempotent.
    pub fn revoke(&self, student_did: &str) -> Result<(), LedgerError> {
        let mut state = self.state();
        let entry = state
            .acl
            .get_mut(student_did)
            .ok_or_else(|| LedgerError::NotFound(student_did.to_string()))?;
        entry.is_valid = false;
        Ok(())
    }

    /// Ledger copy of a DID's ACL entry.
    pub fn acl_entry(&self, student_did: &str) -> Option<AclEntry> {
        self.state().acl.get(student_did).cloned()
    }

    /// Number of issued challenges not yet answered.
    pub fn outstanding_challenges(&self) -> usize {
        self.state().issued.len()
    }

    /// `(accepted, rejected)` verification counts so far.
    pub fn verification_counts(&self) -> (u64, u64) {
        let state = self.state();
        (state.accepted, state.rejected)
    }

    /// `SHA-256(R ‖ nonce)` read as a 256-bit integer, with zero replaced by one.
    fn derive_challenge(commitment: &BigUint, nonce: u64) -> BigUint {
        let mut preimage = commitment.to_bytes_be();
        preimage.extend_from_slice(&nonce.to_be_bytes());
        let challenge = BigUint::from_bytes_be(&hash_data(&preimage));
        if challenge == BigUint::from(0u32) {
            BigUint::from(1u32)
        } else {
            challenge
        }
    }

    fn issue_challenge(&self, commitment: &BigUint) -> BigUint {
        let mut state = self.state();
        state.nonce += 1;
        let nonce = state.nonce;
        let challenge = Self::derive_challenge(commitment, nonce);
        state
            .issued
            .insert(nonce, (commitment.clone(), challenge.clone()));
        while state.issued.len() > MAX_OUTSTANDING_CHALLENGES {
            if let Some((dropped, _)) = state.issued.pop_first() {
                debug!("Dropped unanswered challenge {}", dropped);
            }
        }
        challenge
    }

    fn check(&self, request: &VerificationRequest) -> (Result<(), &'static str>, u64) {
        let mut state = self.state();
        let mut cost = BASE_CALL_COST + CHALLENGE_CHECK_COST;

        let issued_nonce = state
            .issued
            .iter()
            .find(|(_, (commitment, challenge))| {
                *commitment == request.commitment && *challenge == request.challenge
            })
            .map(|(nonce, _)| *nonce);
        match issued_nonce {
            Some(nonce) => {
                state.issued.remove(&nonce);
            }
            None => return (Err("challenge was not issued for this commitment"), cost),
        }

        cost += SCHNORR_CHECK_COST;
        let group = match SchnorrGroup::new(request.generator.clone(), request.modulus.clone()) {
            Ok(group) => group,
            Err(_) => return (Err("invalid group parameters"), cost),
        };
        let public_key = match group.secret_from_hash_hex(&request.verifier_secret_hash) {
            Some(secret) => group.public_key(&secret),
            None => return (Err("verifier secret hash is not hex"), cost),
        };
        let proof = SchnorrProof {
            commitment: request.commitment.clone(),
            challenge: request.challenge.clone(),
            response: request.response.clone(),
        };
        if !group.verify(&proof, &public_key) {
            return (Err("schnorr equation does not hold"), cost);
        }

        cost += HASH_CHECK_COST;
        if request.stored_credential_hash != request.credential_hash_reference {
            return (Err("credential hash mismatch"), cost);
        }

        cost += ACL_CHECK_COST;
        let now = (self.clock)();
        match state.acl.get(&request.student_did) {
            None => (Err("no ACL entry for student"), cost),
            Some(entry) if entry.authorized_verifier_secret_hash != request.verifier_secret_hash => {
                (Err("verifier not authorized for student"), cost)
            }
            Some(entry) if !entry.is_usable(now) => (Err("ACL entry revoked or expired"), cost),
            Some(_) => (Ok(()), cost),
        }
    }
}

impl LedgerVerifier for LocalLedger {
    fn get_challenge<'a>(
        &'a self,
        commitment: &'a BigUint,
    ) -> BoxFuture<'a, Result<BigUint, LedgerError>> {
        async move { Ok(self.issue_challenge(commitment)) }.boxed()
    }

    fn verify<'a>(
        &'a self,
        request: &'a VerificationRequest,
    ) -> BoxFuture<'a, Result<LedgerReceipt, LedgerError>> {
        async move {
            let (verdict, resource_cost) = self.check(request);
            let mut state = self.state();
            let accepted = match verdict {
                Ok(()) => {
                    state.accepted += 1;
                    true
                }
                Err(reason) => {
                    state.rejected += 1;
                    debug!("Ledger rejected {}: {}", request.student_did, reason);
                    false
                }
            };
            Ok(LedgerReceipt {
                accepted,
                resource_cost,
            })
        }
        .boxed()
    }

    fn store_did_to_index<'a>(
        &'a self,
        student_did: &'a str,
        index: u32,
    ) -> BoxFuture<'a, Result<u64, LedgerError>> {
        async move {
            let mut state = self.state();
            match state.did_index.get(student_did) {
                Some(existing) if *existing != index => Err(LedgerError::Conflict {
                    did: student_did.to_string(),
                    existing: *existing,
                    requested: index,
                }),
                _ => {
                    state.did_index.insert(student_did.to_string(), index);
                    Ok(BASE_CALL_COST + STORAGE_WRITE_COST)
                }
            }
        }
        .boxed()
    }

    fn get_index_by_did<'a>(
        &'a self,
        student_did: &'a str,
    ) -> BoxFuture<'a, Result<Option<u32>, LedgerError>> {
        async move { Ok(self.state().did_index.get(student_did).copied()) }.boxed()
    }

    fn publish_acl_entry<'a>(
        &'a self,
        entry: &'a AclEntry,
    ) -> BoxFuture<'a, Result<u64, LedgerError>> {
        async move {
            self.register_acl(std::slice::from_ref(entry));
            Ok(BASE_CALL_COST + STORAGE_WRITE_COST)
        }
        .boxed()
    }

    fn revoke_acl_entry<'a>(
        &'a self,
        student_did: &'a str,
    ) -> BoxFuture<'a, Result<u64, LedgerError>> {
        async move {
            self.revoke(student_did)?;
            Ok(BASE_CALL_COST + STORAGE_WRITE_COST)
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::acl_store::create_entries;
    use crate::zkp::schnorr::SchnorrProver;

    const NOW: i64 = 1_800_000_000;

    fn ledger() -> LocalLedger {
        let ledger = LocalLedger::with_clock(Arc::new(|| NOW));
        ledger.register_acl(&create_entries(2, NOW + 10_000, "gmail.com"));
        ledger
    }

    async fn honest_request(
        ledger: &LocalLedger,
        group: &SchnorrGroup,
        email: &str,
        did: &str,
    ) -> VerificationRequest {
        let commitment = SchnorrProver::new(group.clone()).commit(&mut rand::thread_rng());
        let challenge = ledger.get_challenge(commitment.commitment()).await.unwrap();
        let proof = commitment.respond(&group.secret_from_material(email), challenge);
        VerificationRequest {
            commitment: proof.commitment,
            response: proof.response,
            generator: group.generator().clone(),
            modulus: group.modulus().clone(),
            challenge: proof.challenge,
            verifier_secret_hash: crate::wallet::verifier_keyring::secret_hash(email),
            credential_hash_reference: "aa".into(),
            stored_credential_hash: "aa".into(),
            student_did: did.into(),
        }
    }

    #[tokio::test]
    async fn test_honest_request_accepted() {
        let ledger = ledger();
        let group = SchnorrGroup::toy();
        let request = honest_request(&ledger, &group, "hr1@gmail.com", "did:university:student1").await;
        let receipt = ledger.verify(&request).await.unwrap();
        assert!(receipt.accepted);
        assert_eq!(
            receipt.resource_cost,
            BASE_CALL_COST + CHALLENGE_CHECK_COST + SCHNORR_CHECK_COST + HASH_CHECK_COST + ACL_CHECK_COST
        );
    }

    #[tokio::test]
    async fn test_challenge_is_single_use() {
        let ledger = ledger();
        let group = SchnorrGroup::toy();
        let request = honest_request(&ledger, &group, "hr1@gmail.com", "did:university:student1").await;
        assert!(ledger.verify(&request).await.unwrap().accepted);
        let replay = ledger.verify(&request).await.unwrap();
        assert!(!replay.accepted);
        assert_eq!(replay.resource_cost, BASE_CALL_COST + CHALLENGE_CHECK_COST);
    }

    #[tokio::test]
    async fn test_unanswered_challenges_are_bounded() {
        let ledger = ledger();
        let group = SchnorrGroup::toy();
        let stale = honest_request(&ledger, &group, "hr1@gmail.com", "did:university:student1").await;
        for r in 0..(MAX_OUTSTANDING_CHALLENGES as u32 + 500) {
            ledger.get_challenge(&BigUint::from(r % 22 + 1)).await.unwrap();
        }
        assert_eq!(ledger.outstanding_challenges(), MAX_OUTSTANDING_CHALLENGES);

        // The oldest challenge was evicted; a fresh one still verifies.
        assert!(!ledger.verify(&stale).await.unwrap().accepted);
        let fresh = honest_request(&ledger, &group, "hr1@gmail.com", "did:university:student1").await;
        assert!(ledger.verify(&fresh).await.unwrap().accepted);
        assert_eq!(ledger.outstanding_challenges(), MAX_OUTSTANDING_CHALLENGES - 1);
    }

    #[tokio::test]
    async fn test_challenge_is_never_zero() {
        let ledger = ledger();
        for r in 1u32..200 {
            let challenge = ledger.get_challenge(&BigUint::from(r)).await.unwrap();
            assert!(challenge >= BigUint::from(1u32));
        }
    }

    #[tokio::test]
    async fn test_hash_mismatch_rejected() {
        let ledger = ledger();
        let group = SchnorrGroup::toy();
        let mut request = honest_request(&ledger, &group, "hr1@gmail.com", "did:university:student1").await;
        request.stored_credential_hash = "bb".into();
        assert!(!ledger.verify(&request).await.unwrap().accepted);
    }

    #[tokio::test]
    async fn test_wrong_verifier_rejected() {
        let ledger = ledger();
        let group = SchnorrGroup::toy();
        // hr2 proves honestly, but is bound to student2 rather than student1.
        let request = honest_request(&ledger, &group, "hr2@gmail.com", "did:university:student1").await;
        assert!(!ledger.verify(&request).await.unwrap().accepted);
    }

    #[tokio::test]
    async fn test_revoked_entry_rejected() {
        let ledger = ledger();
        let group = SchnorrGroup::toy();
        ledger.revoke("did:university:student1").unwrap();
        let request = honest_request(&ledger, &group, "hr1@gmail.com", "did:university:student1").await;
        assert!(!ledger.verify(&request).await.unwrap().accepted);
        assert_eq!(ledger.verification_counts(), (0, 1));
    }

    #[tokio::test]
    async fn test_expired_entry_rejected() {
        let ledger = LocalLedger::with_clock(Arc::new(|| NOW));
        ledger.register_acl(&create_entries(1, NOW, "gmail.com"));
        let group = SchnorrGroup::toy();
        let request = honest_request(&ledger, &group, "hr1@gmail.com", "did:university:student1").await;
        assert!(!ledger.verify(&request).await.unwrap().accepted);
    }

    #[tokio::test]
    async fn test_did_index_conflict() {
        let ledger = ledger();
        ledger.store_did_to_index("did:university:student1", 1).await.unwrap();
        ledger.store_did_to_index("did:university:student1", 1).await.unwrap();
        assert_eq!(
            ledger.get_index_by_did("did:university:student1").await.unwrap(),
            Some(1)
        );
        assert!(matches!(
            ledger.store_did_to_index("did:university:student1", 2).await,
            Err(LedgerError::Conflict { existing: 1, requested: 2, .. })
        ));
        assert_eq!(ledger.get_index_by_did("did:university:student9").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_revoke_unknown_did() {
        let ledger = ledger();
        assert!(matches!(
            ledger.revoke_acl_entry("did:university:student9").await,
            Err(LedgerError::NotFound(_))
        ));
    }
}
