// src/blockchain/mod.rs
pub mod eth_ledger;
pub mod ledger;
pub mod local_ledger;
