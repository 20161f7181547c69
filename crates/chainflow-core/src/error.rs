//! Error types for the chainflow pipeline.

use alloy_primitives::B256;
use thiserror::Error;

/// Errors that can occur while computing, fetching, or applying a cycle.
#[derive(Debug, Error)]
pub enum IndexerError {
    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Missing {kind} {hash} on chain {chain_id} (referenced by source '{source_name}')")]
    MissingData {
        kind: &'static str,
        hash: B256,
        chain_id: u64,
        source_name: String,
    },

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Contract read failed: {0}")]
    ContractRead(String),

    #[error("Invalid checkpoint '{0}'")]
    InvalidCheckpoint(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl IndexerError {
    /// Returns `true` if the cache referenced a row it could not produce.
    pub fn is_missing_data(&self) -> bool {
        matches!(self, Self::MissingData { .. })
    }
}

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read '{path}': {reason}")]
    Io { path: String, reason: String },

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Source '{source_name}' references unknown network '{network}'")]
    UnknownNetwork { source_name: String, network: String },

    #[error("Source '{source_name}' needs an ABI for filter kind '{kind}'")]
    MissingAbi { source_name: String, kind: String },

    #[error("Invalid ABI for source '{source_name}': {reason}")]
    InvalidAbi { source_name: String, reason: String },

    #[error("Duplicate source name '{0}'")]
    DuplicateSource(String),

    #[error("Source '{source_name}' has end block {end} before start block {start}")]
    InvalidBlockRange {
        source_name: String,
        start: u64,
        end: u64,
    },

    #[error("Source '{0}' has a block interval of zero")]
    ZeroInterval(String),

    #[error("Handler '{0}' is registered twice")]
    DuplicateHandler(String),

    #[error("Handler '{0}' does not match any source event")]
    UnknownHandler(String),

    #[error("'{name}' is overloaded in the ABI of source '{source_name}' and cannot be handled by name")]
    AmbiguousAbiItem { source_name: String, name: String },
}

/// Errors from an entity store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{table} '{id}' already exists")]
    AlreadyExists { table: String, id: String },

    #[error("{table} '{id}' not found")]
    NotFound { table: String, id: String },

    #[error("Store backend error: {0}")]
    Backend(String),
}
