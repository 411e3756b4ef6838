// src/main.rs

//! # E-Transcript Batch Verification - Main Entry Point
//!
//! Loads configuration, opens the record stores, connects the configured ledger and starts
//! the API server.
//!
//! ## Environment
//! - `RUST_LOG`: log filter (e.g. `info`, `etranscript=debug`)
//! - `PRIVATE_KEY`: sending account key, required when `ledger.mode = "ethereum"`
//! - `ETRANSCRIPT_*`: overrides for any setting in `config/default.toml`

use std::sync::Arc;

use anyhow::{Context, Result};
use dotenv::dotenv;
use log::info;

use etranscript::blockchain::eth_ledger::EthLedger;
use etranscript::blockchain::ledger::LedgerVerifier;
use etranscript::blockchain::local_ledger::LocalLedger;
use etranscript::config::{LedgerMode, Settings};
use etranscript::services::api_server::{ApiOptions, ApiServer};
use etranscript::storage::acl_store::AclStore;
use etranscript::storage::persistence::{FileStorage, RecordStorage};
use etranscript::StorageError;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    env_logger::init();

    let settings = Settings::load().context("failed to load configuration")?;
    let group = settings.group().context("invalid Schnorr group parameters")?;
    let addr = settings
        .server_addr()
        .with_context(|| format!("invalid server address {:?}", settings.server.addr))?;

    let storage = Arc::new(
        FileStorage::new(&settings.data_dir)
            .with_context(|| format!("cannot open data directory {:?}", settings.data_dir))?,
    );
    info!("Records stored under {}", storage.root().display());

    let ledger: Arc<dyn LedgerVerifier> = match settings.ledger.mode {
        LedgerMode::Local => {
            let ledger = LocalLedger::new();
            // Re-seed ledger state from an ACL persisted by a previous run.
            match AclStore::load(storage.as_ref()) {
                Ok(acl) => ledger.register_acl(acl.entries()),
                Err(StorageError::NotFound(_)) => info!("No persisted ACL yet"),
                Err(e) => return Err(e).context("cannot read persisted ACL"),
            }
            Arc::new(ledger)
        }
        LedgerMode::Ethereum => {
            let private_key = std::env::var("PRIVATE_KEY")
                .context("PRIVATE_KEY must be set for the ethereum ledger")?;
            Arc::new(
                EthLedger::new(&settings.eth_config(private_key))
                    .context("failed to initialize contract client")?,
            )
        }
    };
    info!(
        "Ledger: {:?}, group g={} p={}",
        settings.ledger.mode,
        group.generator(),
        group.modulus()
    );

    let storage: Arc<dyn RecordStorage> = storage;
    let server = Arc::new(ApiServer::new(
        storage,
        ledger,
        group,
        ApiOptions::from(&settings),
    ));
    server.run(addr).await.context("API server failed")
}
