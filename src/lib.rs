// src/lib.rs

//! # E-Transcript Batch Verification
//!
//! Issues student academic credentials and batch-verifies them against a ledger using a
//! three-layer trust chain:
//!
//! 1. **ACL**: binds a student DID to the employer allowed to verify it, with an expiration
//! 2. **Content hash**: SHA-256 of the canonical Verifiable Credential, standing in for
//!    off-chain storage
//! 3. **Schnorr proof**: per-attempt proof that the employer knows the secret behind the
//!    ACL entry, checked by the ledger together with the hash and ACL checks
//!
//! ## Module Layout
//! - [`models`]: ACL entries, student credentials, presentations and tokens
//! - [`storage`]: record persistence plus the ACL, credential and token stores
//! - [`wallet`]: verifier secret material (the batch verification payload)
//! - [`zkp`]: Schnorr group parameters and the prover
//! - [`blockchain`]: the ledger verifier capability and its implementations
//! - [`services`]: hashing, token assembly, DID index registration, batch runs, HTTP glue

pub mod blockchain;
pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod storage;
pub mod utils;
pub mod wallet;
pub mod zkp;

pub use error::{StorageError, VerificationError};
