// src/services/did_indexer.rs
//! Registers the DID → token index mapping on the ledger.

use log::{info, warn};
use serde::Serialize;

use crate::blockchain::ledger::{LedgerError, LedgerVerifier};
use crate::storage::credential_store::CredentialStore;

/// Result of one registration pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RegistrationSummary {
    /// Pairs written to the ledger by this pass
    pub stored: usize,
    /// Pairs the ledger already held
    pub skipped: usize,
    pub total_cost: u64,
}

/// Calls `storeDidToIndex` once for every `(student_did, index)` pair in the credential index.
///
/// Pairs the ledger already maps identically are skipped, so repeated passes never write the
/// same pair twice.
///
/// # Errors
/// - `LedgerError::Conflict` if the ledger maps a DID to a different index; pairs before it
///   stay registered
/// - any transport error from the ledger
pub async fn register_did_indices(
    ledger: &dyn LedgerVerifier,
    credentials: &CredentialStore,
) -> Result<RegistrationSummary, LedgerError> {
    let mut summary = RegistrationSummary::default();
    for (index, record) in credentials.iter() {
        match ledger.get_index_by_did(&record.student_did).await? {
            Some(existing) if existing == index => {
                summary.skipped += 1;
                continue;
            }
            Some(existing) => {
                warn!(
                    "{} already mapped to index {}, not {}",
                    record.student_did, existing, index
                );
                return Err(LedgerError::Conflict {
                    did: record.student_did.clone(),
                    existing,
                    requested: index,
                });
            }
            None => {}
        }
        summary.total_cost += ledger.store_did_to_index(&record.student_did, index).await?;
        summary.stored += 1;
        info!("Stored {} -> index {}", record.student_did, index);
    }
    Ok(summary)
}
