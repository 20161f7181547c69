//! Cache accessor: the boundary to the durable row cache.
//!
//! The cache itself (fetching, storage, interval bookkeeping) lives outside
//! the engine and is consumed through [`CacheStore`]. [`CacheAccessor`] turns
//! its row queries into [`RawEvent`]s for a set of sources.

use std::collections::HashMap;
use std::sync::Arc;

use alloy_primitives::B256;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::checkpoint::Checkpoint;
use crate::error::IndexerError;
use crate::event::{RawEvent, RawEventData};
use crate::source::{AddressFilter, Source, SourceKind};
use crate::types::{Block, CallTrace, Log, Transaction, TransactionReceipt};

/// A contiguous block range that has been fully fetched for one source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedInterval {
    pub source_key: String,
    pub start_block: u64,
    pub end_block: u64,
    pub end_block_timestamp: u64,
}

impl CachedInterval {
    pub fn contains(&self, block_number: u64) -> bool {
        self.start_block <= block_number && block_number <= self.end_block
    }
}

/// Interval and row queries against the durable cache.
///
/// Timestamp ranges are exclusive of `from_timestamp` and inclusive of
/// `to_timestamp`.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn cached_intervals(&self, source_key: &str) -> Result<Vec<CachedInterval>, IndexerError>;

    async fn logs(
        &self,
        chain_id: u64,
        address: &AddressFilter,
        from_timestamp: u64,
        to_timestamp: u64,
        selectors: Option<&[B256]>,
    ) -> Result<Vec<Log>, IndexerError>;

    async fn blocks(
        &self,
        chain_id: u64,
        from_timestamp: u64,
        to_timestamp: u64,
    ) -> Result<Vec<Block>, IndexerError>;

    async fn call_traces(
        &self,
        chain_id: u64,
        address: &AddressFilter,
        from_timestamp: u64,
        to_timestamp: u64,
        selectors: Option<&[[u8; 4]]>,
    ) -> Result<Vec<CallTrace>, IndexerError>;

    async fn block(&self, chain_id: u64, hash: &B256) -> Result<Option<Block>, IndexerError>;

    async fn transaction(&self, chain_id: u64, hash: &B256) -> Result<Option<Transaction>, IndexerError>;

    async fn transaction_receipt(
        &self,
        chain_id: u64,
        hash: &B256,
    ) -> Result<Option<TransactionReceipt>, IndexerError>;
}

/// Assembles raw events for a set of sources out of a [`CacheStore`].
#[derive(Clone)]
pub struct CacheAccessor {
    store: Arc<dyn CacheStore>,
}

/// Per-call memo of joined rows; many logs share one block and transaction.
#[derive(Default)]
struct JoinCache {
    blocks: HashMap<(u64, B256), Block>,
    transactions: HashMap<(u64, B256), Transaction>,
    receipts: HashMap<(u64, B256), TransactionReceipt>,
}

impl CacheAccessor {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    pub async fn cached_intervals(&self, source: &Source) -> Result<Vec<CachedInterval>, IndexerError> {
        self.store.cached_intervals(&source.cache_key()).await
    }

    /// The cached interval containing the source's start block, if any.
    pub async fn anchoring_interval(&self, source: &Source) -> Result<Option<CachedInterval>, IndexerError> {
        let intervals = self.cached_intervals(source).await?;
        Ok(intervals.into_iter().find(|i| i.contains(source.start_block)))
    }

    /// All raw events for `sources` in `(from_timestamp, to_timestamp]`, unordered.
    pub async fn raw_events(
        &self,
        sources: &[Source],
        from_timestamp: u64,
        to_timestamp: u64,
    ) -> Result<Vec<RawEvent>, IndexerError> {
        let mut joins = JoinCache::default();
        let mut events = Vec::new();

        for (source_index, source) in sources.iter().enumerate() {
            let chain_id = source.chain_id();
            match &source.kind {
                SourceKind::Block { .. } => {
                    let blocks = self.store.blocks(chain_id, from_timestamp, to_timestamp).await?;
                    for block in blocks {
                        if !source.contains_block(block.number) {
                            continue;
                        }
                        events.push(RawEvent {
                            chain_id,
                            source_index,
                            checkpoint: Checkpoint::for_block(chain_id, &block),
                            data: RawEventData::Block { block },
                        });
                    }
                }
                SourceKind::Log { address, abi, .. } => {
                    let selectors = abi.event_selectors();
                    let logs = self
                        .store
                        .logs(chain_id, address, from_timestamp, to_timestamp, Some(&selectors))
                        .await?;
                    for log in logs {
                        if !source.contains_block(log.block_number) {
                            continue;
                        }
                        let block = self.join_block(&mut joins, source, &log.block_hash).await?;
                        let transaction = self.join_transaction(&mut joins, source, &log.transaction_hash).await?;
                        let transaction_receipt = if source.includes_receipts() {
                            Some(self.join_receipt(&mut joins, source, &log.transaction_hash).await?)
                        } else {
                            None
                        };
                        events.push(RawEvent {
                            chain_id,
                            source_index,
                            checkpoint: Checkpoint::for_log(chain_id, &block, &log),
                            data: RawEventData::Log {
                                log,
                                block,
                                transaction,
                                transaction_receipt,
                            },
                        });
                    }
                }
                SourceKind::CallTrace { address, abi, .. } => {
                    let selectors = abi.function_selectors();
                    let traces = self
                        .store
                        .call_traces(chain_id, address, from_timestamp, to_timestamp, Some(&selectors))
                        .await?;
                    for trace in traces {
                        // reverted calls never reach handlers
                        if trace.error.is_some() || !source.contains_block(trace.block_number) {
                            continue;
                        }
                        let block = self.join_block(&mut joins, source, &trace.block_hash).await?;
                        let transaction = self
                            .join_transaction(&mut joins, source, &trace.transaction_hash)
                            .await?;
                        let transaction_receipt = if source.includes_receipts() {
                            Some(self.join_receipt(&mut joins, source, &trace.transaction_hash).await?)
                        } else {
                            None
                        };
                        events.push(RawEvent {
                            chain_id,
                            source_index,
                            checkpoint: Checkpoint::for_trace(chain_id, &block, &trace),
                            data: RawEventData::CallTrace {
                                trace,
                                block,
                                transaction,
                                transaction_receipt,
                            },
                        });
                    }
                }
            }
        }

        Ok(events)
    }

    async fn join_block(&self, joins: &mut JoinCache, source: &Source, hash: &B256) -> Result<Block, IndexerError> {
        let key = (source.chain_id(), *hash);
        if let Some(block) = joins.blocks.get(&key) {
            return Ok(block.clone());
        }
        let block = self
            .store
            .block(key.0, hash)
            .await?
            .ok_or_else(|| missing("block", hash, source))?;
        joins.blocks.insert(key, block.clone());
        Ok(block)
    }

    async fn join_transaction(
        &self,
        joins: &mut JoinCache,
        source: &Source,
        hash: &B256,
    ) -> Result<Transaction, IndexerError> {
        let key = (source.chain_id(), *hash);
        if let Some(tx) = joins.transactions.get(&key) {
            return Ok(tx.clone());
        }
        let tx = self
            .store
            .transaction(key.0, hash)
            .await?
            .ok_or_else(|| missing("transaction", hash, source))?;
        joins.transactions.insert(key, tx.clone());
        Ok(tx)
    }

    async fn join_receipt(
        &self,
        joins: &mut JoinCache,
        source: &Source,
        hash: &B256,
    ) -> Result<TransactionReceipt, IndexerError> {
        let key = (source.chain_id(), *hash);
        if let Some(receipt) = joins.receipts.get(&key) {
            return Ok(receipt.clone());
        }
        let receipt = self
            .store
            .transaction_receipt(key.0, hash)
            .await?
            .ok_or_else(|| missing("transaction receipt", hash, source))?;
        joins.receipts.insert(key, receipt.clone());
        Ok(receipt)
    }
}

fn missing(kind: &'static str, hash: &B256, source: &Source) -> IndexerError {
    IndexerError::MissingData {
        kind,
        hash: *hash,
        chain_id: source.chain_id(),
        source_name: source.name.clone(),
    }
}
