// src/storage/token_store.rs
//! Token set produced by assembly, keyed by index. Persisted as `token.json`.

use std::collections::BTreeMap;

use crate::error::StorageError;
use crate::models::presentation::Token;
use crate::storage::persistence::RecordStorage;
use crate::utils::serialization::{from_json, to_pretty_json};

/// Record name of the persisted token set.
pub const TOKEN_FILE: &str = "token.json";

/// Index → token. At most one token per index by construction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenSet {
    tokens: BTreeMap<u32, Token>,
}

impl TokenSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&mut self, index: u32, token: Token) -> Option<Token> {
        self.tokens.insert(index, token)
    }

    pub fn get(&self, index: u32) -> Option<&Token> {
        self.tokens.get(&index)
    }

    pub fn indices(&self) -> Vec<u32> {
        self.tokens.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &Token)> {
        self.tokens.iter().map(|(index, token)| (*index, token))
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Loads the persisted token set, failing with `NotFound` when it was never written.
    pub fn load(storage: &dyn RecordStorage) -> Result<Self, StorageError> {
        let raw = storage
            .read(TOKEN_FILE)?
            .ok_or_else(|| StorageError::NotFound(TOKEN_FILE.to_string()))?;
        Ok(Self {
            tokens: from_json(&raw)?,
        })
    }

    /// Writes the whole set, replacing the tokens of any previous assembly.
    pub fn save(&self, storage: &dyn RecordStorage) -> Result<(), StorageError> {
        storage.write(TOKEN_FILE, &to_pretty_json(&self.tokens)?)
    }
}
