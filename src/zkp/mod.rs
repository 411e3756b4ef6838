// src/zkp/mod.rs
pub mod schnorr;
