// src/error.rs
//! Error taxonomy shared across the stores and the batch verification run.

use serde::Serialize;
use thiserror::Error;

/// Failures reading or writing one of the persisted record sets.
#[derive(Error, Debug)]
pub enum StorageError {
    /// A lookup by DID or index found nothing.
    #[error("not found: {0}")]
    NotFound(String),

    /// Two ACL entries share a student DID.
    #[error("duplicate student DID in ACL: {0}")]
    DuplicateDid(String),

    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed record JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Outcome-level errors of a batch verification run.
///
/// `NotFound` and `InvalidParameter` only surface from run initialisation. The remaining
/// variants describe why a run was aborted; they travel inside the partial
/// [`BatchReport`](crate::services::orchestrator::BatchReport) rather than replacing it.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail")]
pub enum VerificationError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// A token references a content hash that is not in the credential store.
    #[error("missing credential hash for token index {0}")]
    MissingCredential(u32),

    #[error("ledger unavailable: {0}")]
    LedgerUnavailable(String),

    /// The ledger refused the proof or the hash/ACL checks on the given attempt.
    #[error("verification rejected on attempt {0}")]
    VerificationRejected(u32),

    #[error("aborted after {0} consecutive missing credentials")]
    StructuralAbort(u32),

    /// The run was cancelled between iterations.
    #[error("run cancelled")]
    Cancelled,
}

impl From<StorageError> for VerificationError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(what) => VerificationError::NotFound(what),
            other => VerificationError::InvalidParameter(other.to_string()),
        }
    }
}
