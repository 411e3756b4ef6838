// src/config.rs
//! Layered runtime configuration.
//!
//! Sources, later ones overriding earlier ones:
//! 1. built-in defaults (toy Schnorr group, local ledger)
//! 2. `config/default.toml`, then `config/local.toml`, both optional
//! 3. environment variables prefixed `ETRANSCRIPT_`, nesting with `__`
//!    (e.g. `ETRANSCRIPT_LEDGER__MODE=ethereum`)
//!
//! The ledger private key is never read from files; see [`Settings::eth_config`].

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::blockchain::eth_ledger::EthLedgerConfig;
use crate::services::orchestrator::{BatchParams, FailurePolicy, TargetPolicy};
use crate::zkp::schnorr::{SchnorrError, SchnorrGroup};

/// Directory searched for `default.toml` and `local.toml`.
pub const CONFIG_DIR: &str = "config";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Directory holding the persisted record sets
    pub data_dir: PathBuf,
    pub server: ServerSettings,
    pub group: GroupSettings,
    pub ledger: LedgerSettings,
    pub acl: AclSettings,
    pub batch: BatchSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub addr: String,
}

/// Schnorr group as decimal strings, so primes beyond 64 bits fit.
#[derive(Debug, Clone, Deserialize)]
pub struct GroupSettings {
    pub generator: String,
    pub modulus: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerMode {
    /// In-process reference ledger
    Local,
    /// Deployed verification contract
    Ethereum,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LedgerSettings {
    pub mode: LedgerMode,
    pub rpc_url: String,
    pub contract_address: String,
    pub chain_id: u64,
    pub gas_limit: u64,
    /// Bounded wait per ledger round trip
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AclSettings {
    /// Lifetime of a fresh ACL entry
    pub validity_secs: i64,
    /// Domain of generated verifier emails
    pub verifier_domain: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchSettings {
    pub failure_policy: FailurePolicy,
    pub missing_credential_threshold: u32,
}

impl Settings {
    /// Loads settings from [`CONFIG_DIR`] and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(Path::new(CONFIG_DIR))
    }

    /// Loads settings reading the optional TOML files from `dir`.
    pub fn load_from(dir: &Path) -> Result<Self, ConfigError> {
        Config::builder()
            .set_default("data_dir", "data")?
            .set_default("server.addr", "127.0.0.1:3000")?
            .set_default("group.generator", "2")?
            .set_default("group.modulus", "23")?
            .set_default("ledger.mode", "local")?
            .set_default("ledger.rpc_url", "http://127.0.0.1:8545")?
            .set_default("ledger.contract_address", "")?
            .set_default("ledger.chain_id", 11155111i64)?
            .set_default("ledger.gas_limit", 3_000_000i64)?
            .set_default("ledger.timeout_secs", 30i64)?
            .set_default("acl.validity_secs", 86_400i64)?
            .set_default("acl.verifier_domain", "gmail.com")?
            .set_default("batch.failure_policy", "continue")?
            .set_default("batch.missing_credential_threshold", 3i64)?
            .add_source(File::from(dir.join("default")).required(false))
            .add_source(File::from(dir.join("local")).required(false))
            .add_source(
                Environment::with_prefix("ETRANSCRIPT")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()
    }

    /// Validated Schnorr group.
    pub fn group(&self) -> Result<SchnorrGroup, SchnorrError> {
        SchnorrGroup::from_decimal(&self.group.generator, &self.group.modulus)
    }

    pub fn server_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        self.server.addr.parse()
    }

    pub fn ledger_timeout(&self) -> Duration {
        Duration::from_secs(self.ledger.timeout_secs)
    }

    /// Batch parameters for one run, with the configured policy, threshold and timeout.
    pub fn batch_params(&self, loop_count: i64, target: TargetPolicy) -> BatchParams {
        BatchParams::new(loop_count, target)
            .with_failure_policy(self.batch.failure_policy)
            .with_missing_credential_threshold(self.batch.missing_credential_threshold)
            .with_ledger_timeout(self.ledger_timeout())
    }

    /// Contract client settings; `private_key` comes from the `PRIVATE_KEY` environment variable.
    pub fn eth_config(&self, private_key: String) -> EthLedgerConfig {
        EthLedgerConfig {
            rpc_url: self.ledger.rpc_url.clone(),
            contract_address: self.ledger.contract_address.clone(),
            private_key,
            chain_id: self.ledger.chain_id,
            gas_limit: self.ledger.gas_limit,
        }
    }
}
