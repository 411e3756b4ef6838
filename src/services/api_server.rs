// src/services/api_server.rs
//! HTTP glue for the batch verification pipeline.
//!
//! Each endpoint triggers one pipeline step against the persisted stores and returns a JSON
//! summary. Handlers hold no protocol state; everything lives in the stores and the ledger.
//!
//! | Method | Path                  | Step                                             |
//! |--------|-----------------------|--------------------------------------------------|
//! | POST   | `/acl`                | generate ACL + verifier keyring, publish to ledger |
//! | POST   | `/credentials`        | hash and store student credentials               |
//! | POST   | `/tokens`             | assemble the token set                           |
//! | POST   | `/store-did-to-index` | register DID → index pairs on the ledger         |
//! | POST   | `/batch-verify`       | run a batch and return its report                |
//! | GET    | `/health`             | liveness                                         |

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use log::{error, info};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::Mutex;

use crate::blockchain::ledger::{LedgerError, LedgerVerifier};
use crate::config::Settings;
use crate::error::{StorageError, VerificationError};
use crate::services::credential_hasher::generate_records;
use crate::services::did_indexer::register_did_indices;
use crate::services::orchestrator::{
    BatchOrchestrator, BatchParams, FailurePolicy, RunSnapshot, TargetPolicy,
};
use crate::services::token_assembler::TokenAssembler;
use crate::storage::acl_store::AclStore;
use crate::storage::credential_store::CredentialStore;
use crate::storage::persistence::RecordStorage;
use crate::storage::token_store::TokenSet;
use crate::wallet::verifier_keyring::VerifierKeyring;
use crate::zkp::schnorr::SchnorrGroup;

/// Largest `count` accepted by the generation endpoints.
pub const MAX_GENERATED_COUNT: u32 = 10_000;

/// Request payload for generating ACL entries or credentials
#[derive(Serialize, Deserialize)]
struct CountRequest {
    count: u32,
}

#[derive(Serialize, Deserialize)]
struct AclResponse {
    entries: usize,
    ledger_cost: u64,
}

#[derive(Serialize, Deserialize)]
struct CredentialsResponse {
    stored: u32,
    total: usize,
}

#[derive(Serialize, Deserialize)]
struct TokensResponse {
    tokens: usize,
    indices: Vec<u32>,
}

/// Request payload for a batch run
#[derive(Serialize, Deserialize)]
struct BatchVerifyRequest {
    loop_count: i64,
    /// Fixed token index; the run advances over all indices when absent
    target_index: Option<u32>,
    policy: Option<FailurePolicy>,
}

/// Run-wide knobs the handlers need from [`Settings`].
#[derive(Debug, Clone)]
pub struct ApiOptions {
    pub validity_secs: i64,
    pub verifier_domain: String,
    pub failure_policy: FailurePolicy,
    pub missing_credential_threshold: u32,
    pub ledger_timeout: std::time::Duration,
}

impl From<&Settings> for ApiOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            validity_secs: settings.acl.validity_secs,
            verifier_domain: settings.acl.verifier_domain.clone(),
            failure_policy: settings.batch.failure_policy,
            missing_credential_threshold: settings.batch.missing_credential_threshold,
            ledger_timeout: settings.ledger_timeout(),
        }
    }
}

/// API server state: the stores, the ledger, and the orchestrator built over them
pub struct ApiServer {
    storage: Arc<dyn RecordStorage>,
    /// Serializes load-modify-save sequences on the stores.
    store_lock: Mutex<()>,
    ledger: Arc<dyn LedgerVerifier>,
    orchestrator: BatchOrchestrator,
    options: ApiOptions,
}

impl ApiServer {
    pub fn new(
        storage: Arc<dyn RecordStorage>,
        ledger: Arc<dyn LedgerVerifier>,
        group: SchnorrGroup,
        options: ApiOptions,
    ) -> Self {
        ApiServer {
            storage,
            store_lock: Mutex::new(()),
            orchestrator: BatchOrchestrator::new(ledger.clone(), group),
            ledger,
            options,
        }
    }

    /// Routes of the API, sharing this server as state.
    pub fn router(self: Arc<Self>) -> Router {
        Router::new()
            .route("/health", get(Self::health_handler))
            .route("/acl", post(Self::acl_handler))
            .route("/credentials", post(Self::credentials_handler))
            .route("/tokens", post(Self::tokens_handler))
            .route("/store-did-to-index", post(Self::store_did_to_index_handler))
            .route("/batch-verify", post(Self::batch_verify_handler))
            .with_state(self)
    }

    /// Binds `addr` and serves until the listener fails.
    pub async fn run(self: Arc<Self>, addr: SocketAddr) -> std::io::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!("API server listening on http://{}", addr);
        axum::serve(listener, self.router()).await
    }

    async fn health_handler() -> impl IntoResponse {
        Json(json!({ "status": "ok" }))
    }

    /// Generates `count` ACL entries and their verifier keyring, persists both, and
    /// publishes every entry to the ledger.
    ///
    /// # Responses
    /// - 200 OK: entry count and ledger cost
    /// - 400 Bad Request: `count` above [`MAX_GENERATED_COUNT`]
    /// - 502 Bad Gateway: ledger unreachable (stores already written)
    async fn acl_handler(
        State(state): State<Arc<ApiServer>>,
        Json(payload): Json<CountRequest>,
    ) -> Response {
        if let Err(response) = check_count(payload.count) {
            return response;
        }
        let _guard = state.store_lock.lock().await;
        let options = &state.options;
        let base_expiration = chrono::Utc::now().timestamp() + options.validity_secs;
        let acl = AclStore::generate(payload.count, base_expiration, &options.verifier_domain);
        let keyring = VerifierKeyring::generate(payload.count, &options.verifier_domain);
        if let Err(e) = acl
            .save(state.storage.as_ref())
            .and_then(|_| keyring.save(state.storage.as_ref()))
        {
            return storage_error(e);
        }

        let mut ledger_cost = 0;
        for entry in acl.entries() {
            match state.ledger.publish_acl_entry(entry).await {
                Ok(cost) => ledger_cost += cost,
                Err(e) => return ledger_error(e),
            }
        }
        (
            StatusCode::OK,
            Json(AclResponse {
                entries: acl.len(),
                ledger_cost,
            }),
        )
            .into_response()
    }

    /// Hashes the standard credential of students `1..=count` into the credential store.
    async fn credentials_handler(
        State(state): State<Arc<ApiServer>>,
        Json(payload): Json<CountRequest>,
    ) -> Response {
        if let Err(response) = check_count(payload.count) {
            return response;
        }
        let _guard = state.store_lock.lock().await;
        let storage = state.storage.as_ref();
        let result = CredentialStore::load_or_default(storage).and_then(|mut store| {
            generate_records(&mut store, payload.count)?;
            store.save(storage)?;
            Ok(store.len())
        });
        match result {
            Ok(total) => (
                StatusCode::OK,
                Json(CredentialsResponse {
                    stored: payload.count,
                    total,
                }),
            )
                .into_response(),
            Err(e) => storage_error(e),
        }
    }

    /// Re-assembles the token set from the ACL and credential stores, overwriting it.
    async fn tokens_handler(State(state): State<Arc<ApiServer>>) -> Response {
        let _guard = state.store_lock.lock().await;
        let storage = state.storage.as_ref();
        let result = AclStore::load(storage).and_then(|acl| {
            let credentials = CredentialStore::load(storage)?;
            let tokens = TokenAssembler::default().assemble(acl.entries(), &credentials);
            tokens.save(storage)?;
            Ok(tokens)
        });
        match result {
            Ok(tokens) => (
                StatusCode::OK,
                Json(TokensResponse {
                    tokens: tokens.len(),
                    indices: tokens.indices(),
                }),
            )
                .into_response(),
            Err(e) => storage_error(e),
        }
    }

    async fn store_did_to_index_handler(State(state): State<Arc<ApiServer>>) -> Response {
        let credentials = match CredentialStore::load(state.storage.as_ref()) {
            Ok(credentials) => credentials,
            Err(e) => return storage_error(e),
        };
        match register_did_indices(state.ledger.as_ref(), &credentials).await {
            Ok(summary) => (StatusCode::OK, Json(summary)).into_response(),
            Err(e) => ledger_error(e),
        }
    }

    /// Runs one batch over a snapshot of the stores.
    ///
    /// # Responses
    /// - 200 OK: the report, also for aborted runs
    /// - 400 Bad Request: invalid run parameters
    /// - 404 Not Found: a store, the target index or a verifier secret is missing
    async fn batch_verify_handler(
        State(state): State<Arc<ApiServer>>,
        Json(payload): Json<BatchVerifyRequest>,
    ) -> Response {
        let snapshot = match state.snapshot().await {
            Ok(snapshot) => snapshot,
            Err(e) => return storage_error(e),
        };
        let target = match payload.target_index {
            Some(index) => TargetPolicy::Fixed(index),
            None => TargetPolicy::Advancing { start: 1 },
        };
        let options = &state.options;
        let params = BatchParams::new(payload.loop_count, target)
            .with_failure_policy(payload.policy.unwrap_or(options.failure_policy))
            .with_missing_credential_threshold(options.missing_credential_threshold)
            .with_ledger_timeout(options.ledger_timeout);

        match state.orchestrator.run(&snapshot, &params).await {
            Ok(report) => (StatusCode::OK, Json(report)).into_response(),
            Err(e) => verification_error(e),
        }
    }

    /// Reads all four stores under the store lock, so a run never sees a half-updated set.
    async fn snapshot(&self) -> Result<RunSnapshot, StorageError> {
        let _guard = self.store_lock.lock().await;
        let storage = self.storage.as_ref();
        Ok(RunSnapshot::new(
            AclStore::load(storage)?,
            CredentialStore::load(storage)?,
            TokenSet::load(storage)?,
            VerifierKeyring::load(storage)?,
        ))
    }
}

fn check_count(count: u32) -> Result<(), Response> {
    if count > MAX_GENERATED_COUNT {
        return Err(error_body(
            StatusCode::BAD_REQUEST,
            format!("count {} exceeds the limit of {}", count, MAX_GENERATED_COUNT),
        ));
    }
    Ok(())
}

fn error_body(status: StatusCode, message: String) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

fn storage_error(e: StorageError) -> Response {
    let status = match e {
        StorageError::NotFound(_) => StatusCode::NOT_FOUND,
        StorageError::DuplicateDid(_) => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        error!("Storage failure: {}", e);
    }
    error_body(status, e.to_string())
}

fn ledger_error(e: LedgerError) -> Response {
    let status = match e {
        LedgerError::Unavailable(_) | LedgerError::Timeout(_) => StatusCode::BAD_GATEWAY,
        LedgerError::Conflict { .. } => StatusCode::CONFLICT,
        LedgerError::NotFound(_) => StatusCode::NOT_FOUND,
        LedgerError::Rejected(_) | LedgerError::InvalidParameter(_) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
    };
    error_body(status, e.to_string())
}

fn verification_error(e: VerificationError) -> Response {
    let status = match e {
        VerificationError::NotFound(_) => StatusCode::NOT_FOUND,
        VerificationError::InvalidParameter(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_body(status, e.to_string())
}
