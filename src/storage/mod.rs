// src/storage/mod.rs
pub mod acl_store;
pub mod credential_store;
pub mod persistence;
pub mod token_store;
