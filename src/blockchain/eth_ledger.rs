// src/blockchain/eth_ledger.rs
//! Ethereum client for the `SchnorrBatchVerification` contract.
//!
//! Implements [`LedgerVerifier`] on top of an EVM JSON-RPC endpoint:
//! - `getChallenge` and `getIndexByDid` are read-only `eth_call`s
//! - `verify`, `storeDidToIndex`, `addACLEntry` and `revokeACLEntry` are signed transactions
//!   sent with a fixed gas limit; the client waits for the receipt
//!
//! A receipt with `status == 1` is an accepted verification and its `gasUsed` is the resource
//! cost. Reverts become rejections; transport failures become `LedgerError::Unavailable`.

use std::sync::Arc;
use std::time::Duration;

use ethers::middleware::SignerMiddleware;
use ethers::providers::{Http, Middleware, Provider};
use ethers::signers::{LocalWallet, Signer};
use ethers_contract::{Contract, ContractError};
use ethers_core::abi::{Abi, AbiError, Tokenize};
use ethers_core::types::{Address, TransactionReceipt, U256, U64};
use futures::future::{BoxFuture, FutureExt};
use log::{debug, info};
use num_bigint::BigUint;

use crate::blockchain::ledger::{LedgerError, LedgerReceipt, LedgerVerifier, VerificationRequest};
use crate::models::acl::AclEntry;

/// Contract ABI, compiled from `SchnorrBatchVerification.sol`.
const CONTRACT_ABI: &[u8] = include_bytes!("abi/SchnorrBatchVerification.json");

/// How often pending transactions are polled for a receipt.
const RECEIPT_POLL_INTERVAL: Duration = Duration::from_millis(500);

type SignerClient = SignerMiddleware<Provider<Http>, LocalWallet>;

/// Connection settings for [`EthLedger::new`].
#[derive(Debug, Clone)]
pub struct EthLedgerConfig {
    pub rpc_url: String,
    /// Hex contract address, with or without `0x`
    pub contract_address: String,
    /// Hex private key of the sending account, with or without `0x`
    pub private_key: String,
    pub chain_id: u64,
    pub gas_limit: u64,
}

/// Contract-backed ledger.
#[derive(Clone)]
pub struct EthLedger {
    contract: Contract<SignerClient>,
    gas_limit: U256,
}

impl EthLedger {
    /// Builds the client. No network traffic happens until the first call.
    ///
    /// # Errors
    /// `InvalidParameter` if the RPC URL, contract address, private key or ABI is malformed.
    pub fn new(config: &EthLedgerConfig) -> Result<Self, LedgerError> {
        let provider = Provider::<Http>::try_from(config.rpc_url.as_str())
            .map_err(|e| LedgerError::InvalidParameter(format!("RPC URL: {}", e)))?
            .interval(RECEIPT_POLL_INTERVAL);
        let wallet = config
            .private_key
            .trim_start_matches("0x")
            .parse::<LocalWallet>()
            .map_err(|e| LedgerError::InvalidParameter(format!("private key: {}", e)))?
            .with_chain_id(config.chain_id);
        let address: Address = config
            .contract_address
            .parse()
            .map_err(|e| LedgerError::InvalidParameter(format!("contract address: {}", e)))?;
        let abi = Abi::load(CONTRACT_ABI)
            .map_err(|e| LedgerError::InvalidParameter(format!("contract ABI: {}", e)))?;

        info!(
            "Ledger client for contract {:?} via {} (chain {}, sender {:?})",
            address,
            config.rpc_url,
            config.chain_id,
            wallet.address()
        );
        let client = Arc::new(SignerMiddleware::new(provider, wallet));
        Ok(Self {
            contract: Contract::new(address, abi, client),
            gas_limit: U256::from(config.gas_limit),
        })
    }

    /// Read-only contract call.
    async fn query<T: Tokenize, R: ethers_core::abi::Detokenize>(
        &self,
        method: &str,
        args: T,
    ) -> Result<R, LedgerError> {
        self.contract
            .method::<_, R>(method, args)
            .map_err(abi_error)?
            .call()
            .await
            .map_err(classify)
    }

    /// Sends a transaction and waits for its receipt.
    async fn transact<T: Tokenize>(
        &self,
        method: &str,
        args: T,
    ) -> Result<TransactionReceipt, LedgerError> {
        let call = self
            .contract
            .method::<_, ()>(method, args)
            .map_err(abi_error)?
            .gas(self.gas_limit);
        let pending = call.send().await.map_err(classify)?;
        debug!("{} submitted as {:?}", method, pending.tx_hash());
        pending
            .await
            .map_err(|e| LedgerError::Unavailable(e.to_string()))?
            .ok_or_else(|| LedgerError::Unavailable(format!("{} dropped before mining", method)))
    }
}

fn abi_error(err: AbiError) -> LedgerError {
    LedgerError::InvalidParameter(err.to_string())
}

fn classify<M: Middleware>(err: ContractError<M>) -> LedgerError {
    if err.is_revert() {
        LedgerError::Rejected(err.to_string())
    } else {
        LedgerError::Unavailable(err.to_string())
    }
}

/// Converts to a `uint256` argument.
pub fn to_u256(value: &BigUint) -> Result<U256, LedgerError> {
    let bytes = value.to_bytes_be();
    if bytes.len() > 32 {
        return Err(LedgerError::InvalidParameter(format!(
            "{} does not fit in uint256",
            value
        )));
    }
    Ok(U256::from_big_endian(&bytes))
}

pub fn from_u256(value: U256) -> BigUint {
    let mut bytes = [0u8; 32];
    value.to_big_endian(&mut bytes);
    BigUint::from_bytes_be(&bytes)
}

fn gas_used(receipt: &TransactionReceipt) -> u64 {
    receipt
        .gas_used
        .map(|gas| gas.min(U256::from(u64::MAX)).as_u64())
        .unwrap_or(0)
}

fn succeeded(receipt: &TransactionReceipt) -> bool {
    receipt.status == Some(U64::from(1))
}

impl LedgerVerifier for EthLedger {
    fn get_challenge<'a>(
        &'a self,
        commitment: &'a BigUint,
    ) -> BoxFuture<'a, Result<BigUint, LedgerError>> {
        async move {
            let challenge: U256 = self.query("getChallenge", to_u256(commitment)?).await?;
            Ok(from_u256(challenge))
        }
        .boxed()
    }

    fn verify<'a>(
        &'a self,
        request: &'a VerificationRequest,
    ) -> BoxFuture<'a, Result<LedgerReceipt, LedgerError>> {
        async move {
            let args = (
                to_u256(&request.commitment)?,
                to_u256(&request.response)?,
                to_u256(&request.generator)?,
                to_u256(&request.modulus)?,
                to_u256(&request.challenge)?,
                request.verifier_secret_hash.clone(),
                request.credential_hash_reference.clone(),
                request.student_did.clone(),
                request.stored_credential_hash.clone(),
            );
            match self.transact("verify", args).await {
                Ok(receipt) => Ok(LedgerReceipt {
                    accepted: succeeded(&receipt),
                    resource_cost: gas_used(&receipt),
                }),
                // A revert at submission never reached a block, so nothing was charged.
                Err(LedgerError::Rejected(reason)) => {
                    debug!("verify reverted for {}: {}", request.student_did, reason);
                    Ok(LedgerReceipt {
                        accepted: false,
                        resource_cost: 0,
                    })
                }
                Err(e) => Err(e),
            }
        }
        .boxed()
    }

    fn store_did_to_index<'a>(
        &'a self,
        student_did: &'a str,
        index: u32,
    ) -> BoxFuture<'a, Result<u64, LedgerError>> {
        async move {
            let receipt = self
                .transact("storeDidToIndex", (student_did.to_string(), U256::from(index)))
                .await?;
            if !succeeded(&receipt) {
                return Err(LedgerError::Rejected(format!(
                    "storeDidToIndex({}, {}) reverted",
                    student_did, index
                )));
            }
            Ok(gas_used(&receipt))
        }
        .boxed()
    }

    fn get_index_by_did<'a>(
        &'a self,
        student_did: &'a str,
    ) -> BoxFuture<'a, Result<Option<u32>, LedgerError>> {
        async move {
            let index: U256 = self.query("getIndexByDid", student_did.to_string()).await?;
            // The contract answers 0 for unmapped DIDs; indices start at 1.
            if index.is_zero() {
                return Ok(None);
            }
            if index > U256::from(u32::MAX) {
                return Err(LedgerError::InvalidParameter(format!(
                    "index {} out of range",
                    index
                )));
            }
            Ok(Some(index.as_u32()))
        }
        .boxed()
    }

    fn publish_acl_entry<'a>(
        &'a self,
        entry: &'a AclEntry,
    ) -> BoxFuture<'a, Result<u64, LedgerError>> {
        async move {
            let expiration = u64::try_from(entry.expiration).map_err(|_| {
                LedgerError::InvalidParameter(format!("negative expiration {}", entry.expiration))
            })?;
            let receipt = self
                .transact(
                    "addACLEntry",
                    (
                        entry.student_did.clone(),
                        entry.authorized_verifier_secret_hash.clone(),
                        U256::from(expiration),
                        entry.is_valid,
                    ),
                )
                .await?;
            if !succeeded(&receipt) {
                return Err(LedgerError::Rejected(format!(
                    "addACLEntry({}) reverted",
                    entry.student_did
                )));
            }
            Ok(gas_used(&receipt))
        }
        .boxed()
    }

    fn revoke_acl_entry<'a>(
        &'a self,
        student_did: &'a str,
    ) -> BoxFuture<'a, Result<u64, LedgerError>> {
        async move {
            let receipt = self
                .transact("revokeACLEntry", student_did.to_string())
                .await?;
            if !succeeded(&receipt) {
                return Err(LedgerError::Rejected(format!(
                    "revokeACLEntry({}) reverted",
                    student_did
                )));
            }
            Ok(gas_used(&receipt))
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::mock;

    // Well-known development account; never funded outside local chains.
    const DEV_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const CONTRACT: &str = "0x73Dd3842730b975613fB78AA8f6ad25f260a141a";

    fn config(rpc_url: &str) -> EthLedgerConfig {
        EthLedgerConfig {
            rpc_url: rpc_url.to_string(),
            contract_address: CONTRACT.to_string(),
            private_key: DEV_KEY.to_string(),
            chain_id: 1337,
            gas_limit: 2_000_000,
        }
    }

    #[test]
    fn test_u256_conversions() {
        let value = BigUint::from(123_456_789u64);
        assert_eq!(from_u256(to_u256(&value).unwrap()), value);
        let too_big = BigUint::from(1u32) << 256usize;
        assert!(matches!(
            to_u256(&too_big),
            Err(LedgerError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_rejects_malformed_settings() {
        let mut bad_address = config("http://127.0.0.1:8545");
        bad_address.contract_address = "0x1234".into();
        assert!(matches!(
            EthLedger::new(&bad_address),
            Err(LedgerError::InvalidParameter(_))
        ));

        let mut bad_key = config("http://127.0.0.1:8545");
        bad_key.private_key = "zz".into();
        assert!(matches!(
            EthLedger::new(&bad_key),
            Err(LedgerError::InvalidParameter(_))
        ));
    }

    #[tokio::test]
    async fn test_get_challenge_decodes_eth_call_result() {
        let _rpc = mock("POST", "/")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(format!(
                r#"{{"jsonrpc":"2.0","id":1,"result":"0x{:064x}"}}"#,
                7u64
            ))
            .create();

        let ledger = EthLedger::new(&config(&mockito::server_url())).unwrap();
        let challenge = ledger.get_challenge(&BigUint::from(13u32)).await.unwrap();
        assert_eq!(challenge, BigUint::from(7u32));
    }

    #[tokio::test]
    async fn test_unreachable_node_is_unavailable() {
        let ledger = EthLedger::new(&config("http://127.0.0.1:9")).unwrap();
        let err = ledger
            .get_challenge(&BigUint::from(13u32))
            .await
            .unwrap_err();
        assert!(err.is_transport(), "unexpected error {:?}", err);
    }
}
