//! JSON fixtures for seeding an [`InMemoryCache`].
//!
//! ```json
//! {
//!   "chains": [{ "chainId": 1, "blocks": [...], "transactions": [...], "logs": [...] }],
//!   "intervals": [{ "sourceKey": "1:log:Pair", "startBlock": 100, "endBlock": 200, "endBlockTimestamp": 2400 }]
//! }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use chainflow_core::cache::CachedInterval;
use chainflow_core::types::{Block, CallTrace, Log, Transaction, TransactionReceipt};

use crate::cache::InMemoryCache;

#[derive(Debug, Error)]
pub enum FixtureError {
    #[error("Failed to read fixture '{path}': {reason}")]
    Io { path: String, reason: String },

    #[error("Invalid fixture JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Rows for one chain.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainFixture {
    pub chain_id: u64,
    #[serde(default)]
    pub blocks: Vec<Block>,
    #[serde(default)]
    pub transactions: Vec<Transaction>,
    #[serde(default)]
    pub receipts: Vec<TransactionReceipt>,
    #[serde(default)]
    pub logs: Vec<Log>,
    #[serde(default)]
    pub call_traces: Vec<CallTrace>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheFixture {
    #[serde(default)]
    pub chains: Vec<ChainFixture>,
    #[serde(default)]
    pub intervals: Vec<CachedInterval>,
}

impl CacheFixture {
    pub fn from_json_str(s: &str) -> Result<Self, FixtureError> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn load(path: &Path) -> Result<Self, FixtureError> {
        let text = std::fs::read_to_string(path).map_err(|e| FixtureError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_json_str(&text)
    }

    /// Insert every row and interval into `cache`.
    pub fn apply(&self, cache: &InMemoryCache) {
        for chain in &self.chains {
            let id = chain.chain_id;
            chain.blocks.iter().cloned().for_each(|b| cache.insert_block(id, b));
            chain.transactions.iter().cloned().for_each(|t| cache.insert_transaction(id, t));
            chain.receipts.iter().cloned().for_each(|r| cache.insert_receipt(id, r));
            chain.logs.iter().cloned().for_each(|l| cache.insert_log(id, l));
            chain.call_traces.iter().cloned().for_each(|t| cache.insert_trace(id, t));
        }
        for interval in &self.intervals {
            cache.insert_interval(interval.clone());
        }
        tracing::debug!(
            chains = self.chains.len(),
            intervals = self.intervals.len(),
            "fixture applied"
        );
    }

    pub fn into_cache(self) -> InMemoryCache {
        let cache = InMemoryCache::new();
        self.apply(&cache);
        cache
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainflow_core::cache::CacheStore;

    const FIXTURE: &str = r#"{
        "chains": [{
            "chainId": 1,
            "blocks": [{
                "hash": "0x1111111111111111111111111111111111111111111111111111111111111111",
                "parentHash": "0x0000000000000000000000000000000000000000000000000000000000000000",
                "number": 100,
                "timestamp": 1200
            }]
        }],
        "intervals": [
            {"sourceKey": "1:block:Blocks", "startBlock": 100, "endBlock": 100, "endBlockTimestamp": 1200}
        ]
    }"#;

    #[tokio::test]
    async fn fixture_seeds_cache() {
        let cache = CacheFixture::from_json_str(FIXTURE).unwrap().into_cache();
        assert_eq!(cache.block_count(), 1);
        let intervals = cache.cached_intervals("1:block:Blocks").await.unwrap();
        assert_eq!(intervals[0].end_block_timestamp, 1200);
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = CacheFixture::load(Path::new("/nonexistent/fixture.json")).unwrap_err();
        assert!(matches!(err, FixtureError::Io { .. }));
    }
}
