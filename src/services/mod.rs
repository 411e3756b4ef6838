// src/services/mod.rs
pub mod api_server;
pub mod credential_hasher;
pub mod did_indexer;
pub mod orchestrator;
pub mod token_assembler;
