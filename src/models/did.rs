// src/models/did.rs
//! Decentralized Identifier (DID) helpers for the university DID method.
//!
//! Students are named `did:university:student{n}` with `n` starting at 1, and the same `n`
//! is the index under which the student's credential hash and token are stored. DID method
//! resolution is not performed; identifiers are opaque strings beyond this naming scheme.

/// Prefix shared by every generated student DID.
pub const STUDENT_DID_PREFIX: &str = "did:university:student";

/// DID of the issuing university.
pub const ISSUER_DID: &str = "did:university:issuer123";

/// Builds the DID for student number `n` (1-based).
pub fn student_did(n: u32) -> String {
    format!("{}{}", STUDENT_DID_PREFIX, n)
}

/// Verification method URL for a DID's first key, as used in proof blocks.
pub fn key_reference(did: &str) -> String {
    format!("{}#key-1", did)
}
