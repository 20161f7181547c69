//! In-memory row cache.
//!
//! Holds blocks, transactions, receipts, logs, and call traces per chain,
//! plus the fetched-interval bookkeeping per source key. Useful for tests,
//! replays, and short-lived indexers that don't need persistence.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use alloy_primitives::B256;
use async_trait::async_trait;

use chainflow_core::cache::{CacheStore, CachedInterval};
use chainflow_core::error::IndexerError;
use chainflow_core::source::AddressFilter;
use chainflow_core::types::{Block, CallTrace, Log, Transaction, TransactionReceipt};

type Key = (u64, B256);

#[derive(Default)]
struct Tables {
    intervals: HashMap<String, Vec<CachedInterval>>,
    blocks: HashMap<Key, Block>,
    transactions: HashMap<Key, Transaction>,
    receipts: HashMap<Key, TransactionReceipt>,
    logs: HashMap<u64, Vec<Log>>,
    traces: HashMap<u64, Vec<CallTrace>>,
}

impl Tables {
    fn timestamp_of(&self, chain_id: u64, block_hash: &B256) -> Result<u64, IndexerError> {
        self.blocks
            .get(&(chain_id, *block_hash))
            .map(|b| b.timestamp)
            .ok_or_else(|| {
                IndexerError::Cache(format!(
                    "row references block {block_hash} on chain {chain_id} which is not cached"
                ))
            })
    }
}

/// In-memory [`CacheStore`]. All data is lost when the process exits.
#[derive(Default)]
pub struct InMemoryCache {
    tables: RwLock<Tables>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Tables> {
        self.tables.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Tables> {
        self.tables.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn insert_block(&self, chain_id: u64, block: Block) {
        self.write().blocks.insert((chain_id, block.hash), block);
    }

    pub fn insert_transaction(&self, chain_id: u64, tx: Transaction) {
        self.write().transactions.insert((chain_id, tx.hash), tx);
    }

    pub fn insert_receipt(&self, chain_id: u64, receipt: TransactionReceipt) {
        self.write()
            .receipts
            .insert((chain_id, receipt.transaction_hash), receipt);
    }

    pub fn insert_log(&self, chain_id: u64, log: Log) {
        self.write().logs.entry(chain_id).or_default().push(log);
    }

    pub fn insert_trace(&self, chain_id: u64, trace: CallTrace) {
        self.write().traces.entry(chain_id).or_default().push(trace);
    }

    /// Record `[start_block, end_block]` as fetched for `source_key`.
    ///
    /// Overlapping and adjacent intervals merge, so each source keeps a set of
    /// disjoint, non-touching intervals.
    pub fn insert_interval(&self, interval: CachedInterval) {
        let mut tables = self.write();
        let list = tables.intervals.entry(interval.source_key.clone()).or_default();
        list.push(interval);
        list.sort_by_key(|i| i.start_block);

        let mut merged: Vec<CachedInterval> = Vec::with_capacity(list.len());
        for next in list.drain(..) {
            match merged.last_mut() {
                Some(last) if next.start_block <= last.end_block.saturating_add(1) => {
                    if next.end_block > last.end_block {
                        last.end_block = next.end_block;
                        last.end_block_timestamp = next.end_block_timestamp;
                    }
                }
                _ => merged.push(next),
            }
        }
        *list = merged;
    }

    pub fn interval_count(&self, source_key: &str) -> usize {
        self.read().intervals.get(source_key).map_or(0, Vec::len)
    }

    pub fn block_count(&self) -> usize {
        self.read().blocks.len()
    }

    pub fn log_count(&self) -> usize {
        self.read().logs.values().map(Vec::len).sum()
    }
}

fn in_range(ts: u64, from: u64, to: u64) -> bool {
    from < ts && ts <= to
}

#[async_trait]
impl CacheStore for InMemoryCache {
    async fn cached_intervals(&self, source_key: &str) -> Result<Vec<CachedInterval>, IndexerError> {
        Ok(self.read().intervals.get(source_key).cloned().unwrap_or_default())
    }

    async fn logs(
        &self,
        chain_id: u64,
        address: &AddressFilter,
        from_timestamp: u64,
        to_timestamp: u64,
        selectors: Option<&[B256]>,
    ) -> Result<Vec<Log>, IndexerError> {
        let tables = self.read();
        let mut out = Vec::new();
        for log in tables.logs.get(&chain_id).into_iter().flatten() {
            if !address.matches(&log.address) {
                continue;
            }
            if let Some(selectors) = selectors {
                if !log.selector().is_some_and(|s| selectors.contains(s)) {
                    continue;
                }
            }
            let ts = tables.timestamp_of(chain_id, &log.block_hash)?;
            if in_range(ts, from_timestamp, to_timestamp) {
                out.push(log.clone());
            }
        }
        out.sort_by_key(|l| (l.block_number, l.log_index));
        Ok(out)
    }

    async fn blocks(&self, chain_id: u64, from_timestamp: u64, to_timestamp: u64) -> Result<Vec<Block>, IndexerError> {
        let tables = self.read();
        let mut out: Vec<Block> = tables
            .blocks
            .iter()
            .filter(|((chain, _), b)| *chain == chain_id && in_range(b.timestamp, from_timestamp, to_timestamp))
            .map(|(_, b)| b.clone())
            .collect();
        out.sort_by_key(|b| b.number);
        Ok(out)
    }

    async fn call_traces(
        &self,
        chain_id: u64,
        address: &AddressFilter,
        from_timestamp: u64,
        to_timestamp: u64,
        selectors: Option<&[[u8; 4]]>,
    ) -> Result<Vec<CallTrace>, IndexerError> {
        let tables = self.read();
        let mut out = Vec::new();
        for trace in tables.traces.get(&chain_id).into_iter().flatten() {
            if !address.matches(&trace.to) {
                continue;
            }
            if let Some(selectors) = selectors {
                if !trace.selector().is_some_and(|s| selectors.contains(&s)) {
                    continue;
                }
            }
            let ts = tables.timestamp_of(chain_id, &trace.block_hash)?;
            if in_range(ts, from_timestamp, to_timestamp) {
                out.push(trace.clone());
            }
        }
        out.sort_by_key(|t| (t.block_number, t.transaction_index, t.trace_index));
        Ok(out)
    }

    async fn block(&self, chain_id: u64, hash: &B256) -> Result<Option<Block>, IndexerError> {
        Ok(self.read().blocks.get(&(chain_id, *hash)).cloned())
    }

    async fn transaction(&self, chain_id: u64, hash: &B256) -> Result<Option<Transaction>, IndexerError> {
        Ok(self.read().transactions.get(&(chain_id, *hash)).cloned())
    }

    async fn transaction_receipt(&self, chain_id: u64, hash: &B256) -> Result<Option<TransactionReceipt>, IndexerError> {
        Ok(self.read().receipts.get(&(chain_id, *hash)).cloned())
    }
}
