//! End-to-end batch verification scenarios over the full pipeline:
//! ACL + keyring → credential hashes → tokens → batch runs against a ledger.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use num_bigint::BigUint;
use tokio_test::{assert_err, assert_ok};

use etranscript::blockchain::ledger::{
    LedgerError, LedgerReceipt, LedgerVerifier, VerificationRequest,
};
use etranscript::blockchain::local_ledger::LocalLedger;
use etranscript::models::acl::AclEntry;
use etranscript::services::credential_hasher::generate_records;
use etranscript::services::did_indexer::register_did_indices;
use etranscript::services::orchestrator::{
    AttemptOutcome, BatchOrchestrator, BatchParams, FailurePolicy, RunSnapshot, RunState,
    TargetPolicy,
};
use etranscript::services::token_assembler::TokenAssembler;
use etranscript::storage::acl_store::AclStore;
use etranscript::storage::credential_store::CredentialStore;
use etranscript::storage::persistence::FileStorage;
use etranscript::storage::token_store::TokenSet;
use etranscript::wallet::verifier_keyring::VerifierKeyring;
use etranscript::zkp::schnorr::SchnorrGroup;
use etranscript::VerificationError;

const DOMAIN: &str = "gmail.com";

/// Stores for `count` students, with the credential hashes at `missing` indices dropped.
fn pipeline(count: u32, missing: &[u32]) -> (AclStore, CredentialStore, TokenSet, VerifierKeyring) {
    let acl = AclStore::generate(count, chrono::Utc::now().timestamp() + 86_400, DOMAIN);
    let mut credentials = CredentialStore::new();
    generate_records(&mut credentials, count).unwrap();
    for index in missing {
        credentials.remove(*index);
    }
    let tokens = TokenAssembler::default().assemble(acl.entries(), &credentials);
    (acl, credentials, tokens, VerifierKeyring::generate(count, DOMAIN))
}

fn snapshot(count: u32, missing: &[u32]) -> RunSnapshot {
    let (acl, credentials, tokens, keyring) = pipeline(count, missing);
    RunSnapshot::new(acl, credentials, tokens, keyring)
}

/// Ledger stub that accepts unless the verify call number is a multiple of `reject_every`.
struct ScriptedLedger {
    reject_every: Option<u64>,
    verify_calls: AtomicU64,
}

impl ScriptedLedger {
    fn accepting() -> Self {
        Self {
            reject_every: None,
            verify_calls: AtomicU64::new(0),
        }
    }

    fn rejecting_every(n: u64) -> Self {
        Self {
            reject_every: Some(n),
            verify_calls: AtomicU64::new(0),
        }
    }
}

impl LedgerVerifier for ScriptedLedger {
    fn get_challenge<'a>(&'a self, _: &'a BigUint) -> BoxFuture<'a, Result<BigUint, LedgerError>> {
        async { Ok(BigUint::from(5u32)) }.boxed()
    }

    fn verify<'a>(
        &'a self,
        _: &'a VerificationRequest,
    ) -> BoxFuture<'a, Result<LedgerReceipt, LedgerError>> {
        async move {
            let call = self.verify_calls.fetch_add(1, Ordering::SeqCst) + 1;
            let accepted = self.reject_every.map_or(true, |n| call % n != 0);
            Ok(LedgerReceipt {
                accepted,
                resource_cost: 100,
            })
        }
        .boxed()
    }

    fn store_did_to_index<'a>(&'a self, _: &'a str, _: u32) -> BoxFuture<'a, Result<u64, LedgerError>> {
        async { Ok(0) }.boxed()
    }

    fn get_index_by_did<'a>(&'a self, _: &'a str) -> BoxFuture<'a, Result<Option<u32>, LedgerError>> {
        async { Ok(None) }.boxed()
    }

    fn publish_acl_entry<'a>(&'a self, _: &'a AclEntry) -> BoxFuture<'a, Result<u64, LedgerError>> {
        async { Ok(0) }.boxed()
    }

    fn revoke_acl_entry<'a>(&'a self, _: &'a str) -> BoxFuture<'a, Result<u64, LedgerError>> {
        async { Ok(0) }.boxed()
    }
}

/// Local ledger that revokes one DID's ledger ACL entry after a number of verifications.
struct RevokingLedger {
    inner: Arc<LocalLedger>,
    revoke_did: String,
    revoke_after: u64,
    verify_calls: AtomicU64,
}

impl LedgerVerifier for RevokingLedger {
    fn get_challenge<'a>(
        &'a self,
        commitment: &'a BigUint,
    ) -> BoxFuture<'a, Result<BigUint, LedgerError>> {
        self.inner.get_challenge(commitment)
    }

    fn verify<'a>(
        &'a self,
        request: &'a VerificationRequest,
    ) -> BoxFuture<'a, Result<LedgerReceipt, LedgerError>> {
        async move {
            let receipt = self.inner.verify(request).await?;
            let calls = self.verify_calls.fetch_add(1, Ordering::SeqCst) + 1;
            if calls == self.revoke_after {
                self.inner.revoke(&self.revoke_did)?;
            }
            Ok(receipt)
        }
        .boxed()
    }

    fn store_did_to_index<'a>(
        &'a self,
        student_did: &'a str,
        index: u32,
    ) -> BoxFuture<'a, Result<u64, LedgerError>> {
        self.inner.store_did_to_index(student_did, index)
    }

    fn get_index_by_did<'a>(
        &'a self,
        student_did: &'a str,
    ) -> BoxFuture<'a, Result<Option<u32>, LedgerError>> {
        self.inner.get_index_by_did(student_did)
    }

    fn publish_acl_entry<'a>(&'a self, entry: &'a AclEntry) -> BoxFuture<'a, Result<u64, LedgerError>> {
        self.inner.publish_acl_entry(entry)
    }

    fn revoke_acl_entry<'a>(&'a self, student_did: &'a str) -> BoxFuture<'a, Result<u64, LedgerError>> {
        self.inner.revoke_acl_entry(student_did)
    }
}

#[tokio::test]
async fn test_scenario_a_all_accepted() {
    let snapshot = snapshot(3, &[]);
    assert_eq!(snapshot.tokens.len(), 3);
    let dids: Vec<&str> = snapshot
        .acl
        .entries()
        .iter()
        .map(|entry| entry.student_did.as_str())
        .collect();
    assert_eq!(
        dids,
        vec![
            "did:university:student1",
            "did:university:student2",
            "did:university:student3"
        ]
    );

    let orchestrator = BatchOrchestrator::new(Arc::new(ScriptedLedger::accepting()), SchnorrGroup::toy());
    let report = assert_ok!(
        orchestrator
            .run(&snapshot, &BatchParams::new(3, TargetPolicy::Fixed(1)))
            .await
    );
    assert_eq!(report.status, RunState::Completed);
    assert_eq!(report.valid_count, 3);
    assert_eq!(report.loop_count, 3);
    assert_eq!(report.total_resource_cost, 300);
}

#[tokio::test]
async fn test_scenario_b_missing_credential_does_not_abort() {
    let snapshot = snapshot(3, &[2]);
    assert_eq!(snapshot.tokens.indices(), vec![1, 3]);

    let orchestrator = BatchOrchestrator::new(Arc::new(ScriptedLedger::accepting()), SchnorrGroup::toy());
    let report = assert_ok!(
        orchestrator
            .run(&snapshot, &BatchParams::new(2, TargetPolicy::Fixed(2)))
            .await
    );
    assert_eq!(report.status, RunState::Completed);
    assert_eq!(report.valid_count, 0);
    assert!(report
        .attempts
        .iter()
        .all(|attempt| attempt.outcome == AttemptOutcome::MissingCredential));

    let report = assert_ok!(
        orchestrator
            .run(&snapshot, &BatchParams::new(3, TargetPolicy::Advancing { start: 1 }))
            .await
    );
    let outcomes: Vec<AttemptOutcome> = report.attempts.iter().map(|a| a.outcome).collect();
    assert_eq!(
        outcomes,
        vec![
            AttemptOutcome::Success,
            AttemptOutcome::MissingCredential,
            AttemptOutcome::Success
        ]
    );
    assert_eq!(report.valid_count, 2);
    assert!(report.is_completed());
}

#[tokio::test]
async fn test_scenario_b_repeated_misses_escalate() {
    let snapshot = snapshot(3, &[2]);
    let orchestrator = BatchOrchestrator::new(Arc::new(ScriptedLedger::accepting()), SchnorrGroup::toy());
    let report = assert_ok!(
        orchestrator
            .run(&snapshot, &BatchParams::new(5, TargetPolicy::Fixed(2)))
            .await
    );
    assert_eq!(report.status, RunState::Aborted);
    assert_eq!(report.abort_reason, Some(VerificationError::StructuralAbort(3)));
    assert_eq!(report.attempts.len(), 3);
}

#[tokio::test]
async fn test_scenario_c_continue_on_rejection() {
    let snapshot = snapshot(3, &[]);
    let orchestrator =
        BatchOrchestrator::new(Arc::new(ScriptedLedger::rejecting_every(3)), SchnorrGroup::toy());
    let params = BatchParams::new(9, TargetPolicy::Fixed(1)).with_failure_policy(FailurePolicy::Continue);
    let report = assert_ok!(orchestrator.run(&snapshot, &params).await);
    assert_eq!(report.status, RunState::Completed);
    assert_eq!(report.valid_count, 6);
    assert_eq!(report.count(AttemptOutcome::Rejected), 3);
    assert_eq!(report.attempts.len(), 9);
}

#[tokio::test]
async fn test_scenario_c_abort_on_rejection() {
    let snapshot = snapshot(3, &[]);
    let orchestrator =
        BatchOrchestrator::new(Arc::new(ScriptedLedger::rejecting_every(3)), SchnorrGroup::toy());
    let params = BatchParams::new(9, TargetPolicy::Fixed(1)).with_failure_policy(FailurePolicy::Abort);
    let report = assert_ok!(orchestrator.run(&snapshot, &params).await);
    assert_eq!(report.status, RunState::Aborted);
    assert_eq!(report.valid_count, 2);
    assert_eq!(report.attempts.len(), 3);
    assert_eq!(report.abort_reason, Some(VerificationError::VerificationRejected(3)));
}

#[tokio::test]
async fn test_init_failures_are_returned_before_any_attempt() {
    let snapshot = snapshot(3, &[]);
    let ledger = Arc::new(ScriptedLedger::accepting());
    let orchestrator = BatchOrchestrator::new(ledger.clone(), SchnorrGroup::toy());

    let err = assert_err!(
        orchestrator
            .run(&snapshot, &BatchParams::new(0, TargetPolicy::Fixed(1)))
            .await
    );
    assert!(matches!(err, VerificationError::InvalidParameter(_)));
    let err = assert_err!(
        orchestrator
            .run(&snapshot, &BatchParams::new(1, TargetPolicy::Fixed(4)))
            .await
    );
    assert!(matches!(err, VerificationError::NotFound(_)));
    assert_eq!(ledger.verify_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_revocation_mid_run_is_rejected_by_ledger() {
    let snapshot = snapshot(2, &[]);
    let local = Arc::new(LocalLedger::new());
    local.register_acl(snapshot.acl.entries());
    let ledger = Arc::new(RevokingLedger {
        inner: local.clone(),
        revoke_did: "did:university:student1".to_string(),
        revoke_after: 2,
        verify_calls: AtomicU64::new(0),
    });
    let orchestrator = BatchOrchestrator::new(ledger, SchnorrGroup::toy());

    let report = assert_ok!(
        orchestrator
            .run(&snapshot, &BatchParams::new(4, TargetPolicy::Fixed(1)))
            .await
    );
    let outcomes: Vec<AttemptOutcome> = report.attempts.iter().map(|a| a.outcome).collect();
    assert_eq!(
        outcomes,
        vec![
            AttemptOutcome::Success,
            AttemptOutcome::Success,
            AttemptOutcome::Rejected,
            AttemptOutcome::Rejected
        ]
    );
    assert!(report.is_completed());
    assert_eq!(local.verification_counts(), (2, 2));

    // The snapshot's own ACL is untouched; usability was decided on the ledger.
    let now = chrono::Utc::now().timestamp();
    assert!(snapshot.acl.is_usable("did:university:student1", now).unwrap());
    assert!(!local.acl_entry("did:university:student1").unwrap().is_valid);
}

#[tokio::test]
async fn test_concurrent_runs_share_one_snapshot() {
    let snapshot = snapshot(3, &[]);
    let local = Arc::new(LocalLedger::new());
    local.register_acl(snapshot.acl.entries());
    let orchestrator = BatchOrchestrator::new(local.clone(), SchnorrGroup::toy());

    let first_params = BatchParams::new(5, TargetPolicy::Fixed(1));
    let second_params = BatchParams::new(5, TargetPolicy::Advancing { start: 2 });
    let (first, second) = tokio::join!(
        orchestrator.run(&snapshot, &first_params),
        orchestrator.run(&snapshot, &second_params),
    );
    let first = assert_ok!(first);
    let second = assert_ok!(second);
    assert_eq!(first.valid_count, 5);
    assert_eq!(second.valid_count, 5);
    assert_eq!(local.verification_counts(), (10, 0));
}

#[tokio::test]
async fn test_persisted_pipeline_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let storage = FileStorage::new(dir.path()).unwrap();
    let (acl, credentials, tokens, keyring) = pipeline(3, &[]);
    acl.save(&storage).unwrap();
    credentials.save(&storage).unwrap();
    tokens.save(&storage).unwrap();
    keyring.save(&storage).unwrap();

    let snapshot = RunSnapshot::new(
        AclStore::load(&storage).unwrap(),
        CredentialStore::load(&storage).unwrap(),
        TokenSet::load(&storage).unwrap(),
        VerifierKeyring::load(&storage).unwrap(),
    );
    assert_eq!(*snapshot.tokens, tokens);

    let local = Arc::new(LocalLedger::new());
    local.register_acl(snapshot.acl.entries());
    let summary = register_did_indices(local.as_ref(), &snapshot.credentials)
        .await
        .unwrap();
    assert_eq!(summary.stored, 3);

    let orchestrator = BatchOrchestrator::new(local, SchnorrGroup::toy());
    let report = assert_ok!(
        orchestrator
            .run(&snapshot, &BatchParams::new(3, TargetPolicy::Advancing { start: 1 }))
            .await
    );
    assert_eq!(report.valid_count, 3);
}
