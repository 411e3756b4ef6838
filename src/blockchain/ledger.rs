// src/blockchain/ledger.rs
//! Ledger Verifier capability.
//!
//! The ledger owns canonical ACL and DID-index state and runs the combined check: Schnorr
//! equation, credential-hash equality and ACL usability. Implementations:
//! - [`LocalLedger`](super::local_ledger::LocalLedger): in-process reference verifier
//! - [`EthLedger`](super::eth_ledger::EthLedger): the deployed `SchnorrBatchVerification` contract
//!
//! Methods return boxed futures so the capability can be shared as `Arc<dyn LedgerVerifier>`.

use std::time::Duration;

use futures::future::BoxFuture;
use num_bigint::BigUint;
use serde::Serialize;
use thiserror::Error;

use crate::models::acl::AclEntry;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Transport failure: connection refused, RPC error, dropped transaction.
    #[error("ledger unreachable: {0}")]
    Unavailable(String),

    #[error("ledger did not answer within {0:?}")]
    Timeout(Duration),

    /// The ledger refused a state-changing call (contract revert).
    #[error("ledger rejected call: {0}")]
    Rejected(String),

    /// A DID is already mapped to a different index.
    #[error("{did} already mapped to index {existing}, refusing {requested}")]
    Conflict {
        did: String,
        existing: u32,
        requested: u32,
    },

    #[error("not found on ledger: {0}")]
    NotFound(String),

    #[error("value not representable on ledger: {0}")]
    InvalidParameter(String),
}

impl LedgerError {
    /// Whether the failure says nothing about the submitted data, only about reachability.
    pub fn is_transport(&self) -> bool {
        matches!(self, LedgerError::Unavailable(_) | LedgerError::Timeout(_))
    }
}

/// Everything the ledger needs to judge one verification attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationRequest {
    /// `R`
    pub commitment: BigUint,
    /// `s`
    pub response: BigUint,
    pub generator: BigUint,
    pub modulus: BigUint,
    pub challenge: BigUint,
    /// Hex SHA-256 of the verifier's secret material, as carried in the token's ACL snapshot
    pub verifier_secret_hash: String,
    /// Content hash referenced by the presentation
    pub credential_hash_reference: String,
    pub student_did: String,
    /// Content hash read from the credential store
    pub stored_credential_hash: String,
}

/// Ledger verdict on one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LedgerReceipt {
    pub accepted: bool,
    /// Resource units consumed (gas on Ethereum)
    pub resource_cost: u64,
}

/// Authoritative verifier holding canonical ledger state.
pub trait LedgerVerifier: Send + Sync {
    /// Issues a challenge bound to the commitment `R`. Unpredictable before `R` is sent.
    fn get_challenge<'a>(
        &'a self,
        commitment: &'a BigUint,
    ) -> BoxFuture<'a, Result<BigUint, LedgerError>>;

    /// Runs the combined proof, credential-hash and ACL check. Records a state transition.
    fn verify<'a>(
        &'a self,
        request: &'a VerificationRequest,
    ) -> BoxFuture<'a, Result<LedgerReceipt, LedgerError>>;

    /// Maps a DID to its token index. Returns the resource cost of the write.
    fn store_did_to_index<'a>(
        &'a self,
        student_did: &'a str,
        index: u32,
    ) -> BoxFuture<'a, Result<u64, LedgerError>>;

    /// Index mapped to a DID, `None` when unmapped.
    fn get_index_by_did<'a>(
        &'a self,
        student_did: &'a str,
    ) -> BoxFuture<'a, Result<Option<u32>, LedgerError>>;

    /// Publishes (or replaces) an ACL entry in ledger state.
    fn publish_acl_entry<'a>(
        &'a self,
        entry: &'a AclEntry,
    ) -> BoxFuture<'a, Result<u64, LedgerError>>;

    /// Clears the validity flag of a DID's ledger ACL entry.
    fn revoke_acl_entry<'a>(&'a self, student_did: &'a str)
        -> BoxFuture<'a, Result<u64, LedgerError>>;
}
