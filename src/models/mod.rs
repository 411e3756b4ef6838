// src/models/mod.rs
pub mod acl;
pub mod credential;
pub mod did;
pub mod presentation;
