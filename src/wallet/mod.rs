// src/wallet/mod.rs
pub mod verifier_keyring;
