// src/services/orchestrator.rs
//! # Batch Verification Orchestrator
//!
//! Drives `loop_count` sequential verification attempts against a [`LedgerVerifier`]:
//!
//! ```text
//! Init ──> Running ──> Completed
//!              └─────> Aborted
//! ```
//!
//! Each attempt commits a fresh Schnorr nonce, asks the ledger for a challenge, answers it,
//! and submits the proof together with the token's credential hash and ACL snapshot. The
//! run reads a [`RunSnapshot`] of the stores and never writes to them, so independent runs
//! can execute concurrently against the same snapshot.
//!
//! Failure handling:
//! - `InvalidParameter` / `NotFound` fail the run at `Init`, before any ledger call
//! - a ledger rejection is recorded per attempt; [`FailurePolicy`] decides whether the run
//!   continues or aborts
//! - a token missing from the token set (or whose hash is gone from the credential store)
//!   is a per-attempt `MissingCredential`; `missing_credential_threshold` consecutive misses
//!   abort the run
//! - an unreachable or slow ledger aborts the run with `LedgerUnavailable`; there is no retry
//!   inside a run
//!
//! Aborted runs still return the aggregates of the attempts made so far.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

use crate::blockchain::ledger::{LedgerError, LedgerVerifier, VerificationRequest};
use crate::error::VerificationError;
use crate::storage::acl_store::AclStore;
use crate::storage::credential_store::CredentialStore;
use crate::storage::token_store::TokenSet;
use crate::utils::serialization::duration_secs;
use crate::wallet::verifier_keyring::VerifierKeyring;
use crate::zkp::schnorr::{SchnorrGroup, SchnorrProver};

/// Consecutive missing credentials that escalate to a structural abort.
pub const DEFAULT_MISSING_CREDENTIAL_THRESHOLD: u32 = 3;

/// Bounded wait for each ledger round trip.
pub const DEFAULT_LEDGER_TIMEOUT: Duration = Duration::from_secs(30);

/// What to do when the ledger rejects an attempt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Record the rejection and proceed with the next attempt.
    #[default]
    Continue,
    /// Stop the run at the first rejection.
    Abort,
}

/// Which token each attempt verifies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetPolicy {
    /// Every attempt re-uses the token at this index.
    Fixed(u32),
    /// Attempt `i` uses index `start + i`, wrapping around over `1..=acl_len`.
    Advancing { start: u32 },
}

impl TargetPolicy {
    /// The distinct indices a run of `attempts` attempts visits, in visiting order.
    ///
    /// Attempt `i` verifies `indices[i % indices.len()]`.
    fn indices(&self, acl_len: u32, attempts: u32) -> Result<Vec<u32>, VerificationError> {
        let in_range = |index: u32| index >= 1 && index <= acl_len;
        match *self {
            TargetPolicy::Fixed(index) if in_range(index) => Ok(vec![index]),
            TargetPolicy::Advancing { start } if in_range(start) => {
                let distinct = attempts.min(acl_len);
                Ok((0..distinct)
                    .map(|offset| (start - 1 + offset) % acl_len + 1)
                    .collect())
            }
            TargetPolicy::Fixed(index) | TargetPolicy::Advancing { start: index } => Err(
                VerificationError::NotFound(format!("no ACL entry at token index {}", index)),
            ),
        }
    }
}

/// Parameters of one batch run.
#[derive(Debug, Clone)]
pub struct BatchParams {
    pub loop_count: i64,
    pub target: TargetPolicy,
    pub failure_policy: FailurePolicy,
    pub missing_credential_threshold: u32,
    pub ledger_timeout: Duration,
}

impl BatchParams {
    /// Parameters with the default failure policy, threshold and timeout.
    pub fn new(loop_count: i64, target: TargetPolicy) -> Self {
        Self {
            loop_count,
            target,
            failure_policy: FailurePolicy::default(),
            missing_credential_threshold: DEFAULT_MISSING_CREDENTIAL_THRESHOLD,
            ledger_timeout: DEFAULT_LEDGER_TIMEOUT,
        }
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn with_missing_credential_threshold(mut self, threshold: u32) -> Self {
        self.missing_credential_threshold = threshold;
        self
    }

    pub fn with_ledger_timeout(mut self, timeout: Duration) -> Self {
        self.ledger_timeout = timeout;
        self
    }
}

/// Read-only view of the stores for the duration of a run.
#[derive(Debug, Clone)]
pub struct RunSnapshot {
    pub acl: Arc<AclStore>,
    pub credentials: Arc<CredentialStore>,
    pub tokens: Arc<TokenSet>,
    pub keyring: Arc<VerifierKeyring>,
}

impl RunSnapshot {
    pub fn new(
        acl: AclStore,
        credentials: CredentialStore,
        tokens: TokenSet,
        keyring: VerifierKeyring,
    ) -> Self {
        Self {
            acl: Arc::new(acl),
            credentials: Arc::new(credentials),
            tokens: Arc::new(tokens),
            keyring: Arc::new(keyring),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success,
    /// The ledger refused the proof, the hash match or the ACL check.
    Rejected,
    MissingCredential,
    /// Never judged: the ledger could not be reached.
    Skipped,
}

/// One attempt of a run. Lives only inside the run's report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttemptRecord {
    /// 1-based position within the run
    pub attempt_index: u32,
    pub token_index: u32,
    pub student_did: String,
    pub outcome: AttemptOutcome,
    pub resource_cost: u64,
    #[serde(with = "duration_secs")]
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Init,
    Running,
    Completed,
    Aborted,
}

/// Aggregate report of a finished or aborted run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchReport {
    pub status: RunState,
    pub abort_reason: Option<VerificationError>,
    pub loop_count: i64,
    pub attempts: Vec<AttemptRecord>,
    pub valid_count: u32,
    pub total_resource_cost: u64,
    #[serde(with = "duration_secs")]
    pub total_elapsed: Duration,
}

impl BatchReport {
    fn new(loop_count: i64) -> Self {
        Self {
            status: RunState::Running,
            abort_reason: None,
            loop_count,
            attempts: Vec::new(),
            valid_count: 0,
            total_resource_cost: 0,
            total_elapsed: Duration::ZERO,
        }
    }

    fn record(&mut self, attempt: AttemptRecord) {
        if attempt.outcome == AttemptOutcome::Success {
            self.valid_count += 1;
        }
        self.total_resource_cost += attempt.resource_cost;
        self.attempts.push(attempt);
    }

    pub fn is_completed(&self) -> bool {
        self.status == RunState::Completed
    }

    /// Number of attempts with the given outcome.
    pub fn count(&self, outcome: AttemptOutcome) -> usize {
        self.attempts
            .iter()
            .filter(|attempt| attempt.outcome == outcome)
            .count()
    }
}

/// Cancels a run between iterations. Clones share the flag.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A token index resolved at `Init`, with the verifier secret that proves for it.
struct Target {
    index: u32,
    student_did: String,
    secret: BigUint,
}

/// Result of one ledger-facing attempt before it is folded into the report.
enum Verdict {
    Judged(AttemptOutcome, u64),
    Missing,
    Unreachable(LedgerError),
}

/// Runs batches of Schnorr-authenticated verifications against one ledger.
pub struct BatchOrchestrator {
    ledger: Arc<dyn LedgerVerifier>,
    prover: SchnorrProver,
}

impl BatchOrchestrator {
    pub fn new(ledger: Arc<dyn LedgerVerifier>, group: SchnorrGroup) -> Self {
        Self {
            ledger,
            prover: SchnorrProver::new(group),
        }
    }

    pub fn group(&self) -> &SchnorrGroup {
        self.prover.group()
    }

    /// Runs a batch to completion or abort.
    ///
    /// # Errors
    /// Only `Init` failures are returned as `Err`; aborts come back inside the report.
    pub async fn run(
        &self,
        snapshot: &RunSnapshot,
        params: &BatchParams,
    ) -> Result<BatchReport, VerificationError> {
        self.run_with_cancel(snapshot, params, &CancelHandle::new())
            .await
    }

    /// Like [`run`](Self::run), stopping before the next iteration once `cancel` fires.
    pub async fn run_with_cancel(
        &self,
        snapshot: &RunSnapshot,
        params: &BatchParams,
        cancel: &CancelHandle,
    ) -> Result<BatchReport, VerificationError> {
        let (loop_count, targets) = self.init(snapshot, params)?;
        info!(
            "Batch run started: {} attempts over token indices {:?}",
            loop_count,
            targets.iter().map(|t| t.index).collect::<Vec<_>>()
        );

        let started = Instant::now();
        let mut report = BatchReport::new(params.loop_count);
        let mut consecutive_misses = 0u32;

        for i in 0..loop_count {
            if cancel.is_cancelled() {
                report.abort_reason = Some(VerificationError::Cancelled);
                break;
            }
            let target = &targets[i as usize % targets.len()];
            let attempt_index = i + 1;
            let attempt_started = Instant::now();
            let verdict = self.attempt(snapshot, params, target).await;
            let elapsed = attempt_started.elapsed();

            let (outcome, resource_cost) = match &verdict {
                Verdict::Judged(outcome, cost) => (*outcome, *cost),
                Verdict::Missing => (AttemptOutcome::MissingCredential, 0),
                Verdict::Unreachable(_) => (AttemptOutcome::Skipped, 0),
            };
            debug!(
                "Attempt {} index {} {}: {:?} cost {}",
                attempt_index, target.index, target.student_did, outcome, resource_cost
            );
            report.record(AttemptRecord {
                attempt_index,
                token_index: target.index,
                student_did: target.student_did.clone(),
                outcome,
                resource_cost,
                elapsed,
            });

            match verdict {
                Verdict::Missing => {
                    consecutive_misses += 1;
                    if consecutive_misses >= params.missing_credential_threshold {
                        report.abort_reason =
                            Some(VerificationError::StructuralAbort(consecutive_misses));
                        break;
                    }
                    continue;
                }
                Verdict::Unreachable(err) => {
                    report.abort_reason = Some(VerificationError::LedgerUnavailable(err.to_string()));
                    break;
                }
                Verdict::Judged(AttemptOutcome::Rejected, _)
                    if params.failure_policy == FailurePolicy::Abort =>
                {
                    report.abort_reason = Some(VerificationError::VerificationRejected(attempt_index));
                    break;
                }
                Verdict::Judged(..) => {}
            }
            consecutive_misses = 0;
        }

        report.total_elapsed = started.elapsed();
        match &report.abort_reason {
            None => {
                report.status = RunState::Completed;
                info!(
                    "Batch run completed: {}/{} valid, cost {}, {:.3}s",
                    report.valid_count,
                    loop_count,
                    report.total_resource_cost,
                    report.total_elapsed.as_secs_f64()
                );
            }
            Some(reason) => {
                report.status = RunState::Aborted;
                warn!(
                    "Batch run aborted after {} attempts ({} valid): {}",
                    report.attempts.len(),
                    report.valid_count,
                    reason
                );
            }
        }
        Ok(report)
    }

    /// Validates parameters and resolves every target index to its DID and secret.
    fn init(
        &self,
        snapshot: &RunSnapshot,
        params: &BatchParams,
    ) -> Result<(u32, Vec<Target>), VerificationError> {
        if params.loop_count <= 0 {
            return Err(VerificationError::InvalidParameter(format!(
                "loop_count must be positive, got {}",
                params.loop_count
            )));
        }
        let loop_count = u32::try_from(params.loop_count).map_err(|_| {
            VerificationError::InvalidParameter(format!("loop_count too large: {}", params.loop_count))
        })?;
        if params.missing_credential_threshold == 0 {
            return Err(VerificationError::InvalidParameter(
                "missing_credential_threshold must be positive".to_string(),
            ));
        }
        if params.ledger_timeout.is_zero() {
            return Err(VerificationError::InvalidParameter(
                "ledger timeout must be positive".to_string(),
            ));
        }

        let acl_len = u32::try_from(snapshot.acl.len()).map_err(|_| {
            VerificationError::InvalidParameter("ACL too large to index".to_string())
        })?;
        let now = chrono::Utc::now().timestamp();
        let mut targets = Vec::new();
        for index in params.target.indices(acl_len, loop_count)? {
            let entry = snapshot.acl.entry_at_index(index).ok_or_else(|| {
                VerificationError::NotFound(format!("no ACL entry at token index {}", index))
            })?;
            let material = snapshot.keyring.get_secret(&entry.student_did).ok_or_else(|| {
                VerificationError::NotFound(format!("verifier secret for {}", entry.student_did))
            })?;
            // Advisory only: the ledger's ACL check is authoritative.
            if !entry.is_usable(now) {
                warn!(
                    "ACL entry for {} is not usable locally; the ledger will decide",
                    entry.student_did
                );
            }
            targets.push(Target {
                index,
                student_did: entry.student_did.clone(),
                secret: self.group().secret_from_material(material),
            });
        }
        Ok((loop_count, targets))
    }

    async fn attempt(&self, snapshot: &RunSnapshot, params: &BatchParams, target: &Target) -> Verdict {
        let token = match snapshot.tokens.get(target.index) {
            Some(token) if token.student_did == target.student_did => token,
            _ => return Verdict::Missing,
        };
        let (reference, stored) = match (
            token.credential_hash(),
            snapshot.credentials.lookup(target.index),
        ) {
            (Some(reference), Ok(stored)) => (reference, stored),
            _ => return Verdict::Missing,
        };

        let commitment = self.prover.commit(&mut rand::thread_rng());
        let challenge = match bounded(params.ledger_timeout, self.ledger.get_challenge(commitment.commitment())).await {
            Ok(challenge) => challenge,
            Err(err) if err.is_transport() => return Verdict::Unreachable(err),
            Err(err) => {
                debug!("Challenge refused for {}: {}", target.student_did, err);
                return Verdict::Judged(AttemptOutcome::Rejected, 0);
            }
        };
        let proof = commitment.respond(&target.secret, challenge);
        debug!(
            "Proof for {}: R={} c={} s={}",
            target.student_did, proof.commitment, proof.challenge, proof.response
        );

        let group = self.group();
        let request = VerificationRequest {
            commitment: proof.commitment,
            response: proof.response,
            generator: group.generator().clone(),
            modulus: group.modulus().clone(),
            challenge: proof.challenge,
            verifier_secret_hash: token.acl.authorized_verifier_secret_hash.clone(),
            credential_hash_reference: reference.to_string(),
            student_did: target.student_did.clone(),
            stored_credential_hash: stored.to_string(),
        };
        match bounded(params.ledger_timeout, self.ledger.verify(&request)).await {
            Ok(receipt) if receipt.accepted => {
                Verdict::Judged(AttemptOutcome::Success, receipt.resource_cost)
            }
            Ok(receipt) => Verdict::Judged(AttemptOutcome::Rejected, receipt.resource_cost),
            Err(err) if err.is_transport() => Verdict::Unreachable(err),
            Err(err) => {
                debug!("Verification refused for {}: {}", target.student_did, err);
                Verdict::Judged(AttemptOutcome::Rejected, 0)
            }
        }
    }
}

/// Awaits a ledger call for at most `limit`.
async fn bounded<T>(
    limit: Duration,
    call: impl Future<Output = Result<T, LedgerError>>,
) -> Result<T, LedgerError> {
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(LedgerError::Timeout(limit)),
    }
}
