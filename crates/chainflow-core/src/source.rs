//! Indexing sources: what to fetch, on which chain, from which block.

use std::sync::Arc;

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};

use crate::abi::AbiIndex;

/// A chain the indexer reads from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Network {
    pub name: String,
    pub chain_id: u64,
}

impl Network {
    pub fn new(name: impl Into<String>, chain_id: u64) -> Self {
        Self {
            name: name.into(),
            chain_id,
        }
    }
}

/// Contract address filter for log and call-trace sources.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AddressFilter {
    /// Match every contract.
    #[default]
    Any,
    Exact(Vec<Address>),
}

impl AddressFilter {
    pub fn matches(&self, address: &Address) -> bool {
        match self {
            Self::Any => true,
            Self::Exact(addresses) => addresses.contains(address),
        }
    }

    pub fn single(address: Address) -> Self {
        Self::Exact(vec![address])
    }
}

/// The three kinds of chain data a source can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FilterKind {
    Block,
    Log,
    CallTrace,
}

impl FilterKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Block => "block",
            Self::Log => "log",
            Self::CallTrace => "callTrace",
        }
    }
}

impl std::fmt::Display for FilterKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub enum SourceKind {
    /// Every `interval`-th block from the start block.
    Block { interval: u64 },
    Log {
        address: AddressFilter,
        abi: Arc<AbiIndex>,
        include_transaction_receipts: bool,
    },
    CallTrace {
        address: AddressFilter,
        abi: Arc<AbiIndex>,
        include_transaction_receipts: bool,
    },
}

/// One configured source. Immutable for the lifetime of a generation.
#[derive(Debug, Clone)]
pub struct Source {
    pub name: String,
    pub network: Network,
    pub start_block: u64,
    pub end_block: Option<u64>,
    pub kind: SourceKind,
}

impl Source {
    pub fn block(name: impl Into<String>, network: Network, start_block: u64, interval: u64) -> Self {
        Self {
            name: name.into(),
            network,
            start_block,
            end_block: None,
            kind: SourceKind::Block {
                interval: interval.max(1),
            },
        }
    }

    pub fn log(
        name: impl Into<String>,
        network: Network,
        address: AddressFilter,
        abi: Arc<AbiIndex>,
        start_block: u64,
    ) -> Self {
        Self {
            name: name.into(),
            network,
            start_block,
            end_block: None,
            kind: SourceKind::Log {
                address,
                abi,
                include_transaction_receipts: false,
            },
        }
    }

    pub fn call_trace(
        name: impl Into<String>,
        network: Network,
        address: AddressFilter,
        abi: Arc<AbiIndex>,
        start_block: u64,
    ) -> Self {
        Self {
            name: name.into(),
            network,
            start_block,
            end_block: None,
            kind: SourceKind::CallTrace {
                address,
                abi,
                include_transaction_receipts: false,
            },
        }
    }

    pub fn with_end_block(mut self, end_block: u64) -> Self {
        self.end_block = Some(end_block);
        self
    }

    pub fn with_transaction_receipts(mut self, include: bool) -> Self {
        match &mut self.kind {
            SourceKind::Log {
                include_transaction_receipts,
                ..
            }
            | SourceKind::CallTrace {
                include_transaction_receipts,
                ..
            } => *include_transaction_receipts = include,
            SourceKind::Block { .. } => {}
        }
        self
    }

    pub fn chain_id(&self) -> u64 {
        self.network.chain_id
    }

    pub fn filter_kind(&self) -> FilterKind {
        match self.kind {
            SourceKind::Block { .. } => FilterKind::Block,
            SourceKind::Log { .. } => FilterKind::Log,
            SourceKind::CallTrace { .. } => FilterKind::CallTrace,
        }
    }

    pub fn abi(&self) -> Option<&Arc<AbiIndex>> {
        match &self.kind {
            SourceKind::Block { .. } => None,
            SourceKind::Log { abi, .. } | SourceKind::CallTrace { abi, .. } => Some(abi),
        }
    }

    pub fn address(&self) -> Option<&AddressFilter> {
        match &self.kind {
            SourceKind::Block { .. } => None,
            SourceKind::Log { address, .. } | SourceKind::CallTrace { address, .. } => Some(address),
        }
    }

    pub fn includes_receipts(&self) -> bool {
        match self.kind {
            SourceKind::Block { .. } => false,
            SourceKind::Log {
                include_transaction_receipts,
                ..
            }
            | SourceKind::CallTrace {
                include_transaction_receipts,
                ..
            } => include_transaction_receipts,
        }
    }

    /// Key under which the cache records this source's fetched intervals.
    pub fn cache_key(&self) -> String {
        format!("{}:{}:{}", self.network.chain_id, self.filter_kind(), self.name)
    }

    /// Whether rows from `block_number` belong to this source.
    pub fn contains_block(&self, block_number: u64) -> bool {
        if block_number < self.start_block {
            return false;
        }
        if let Some(end) = self.end_block {
            if block_number > end {
                return false;
            }
        }
        match self.kind {
            SourceKind::Block { interval } => (block_number - self.start_block) % interval.max(1) == 0,
            _ => true,
        }
    }

    /// Qualified handler name for the source's block event.
    pub fn block_event_name(&self) -> String {
        format!("{}:block", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mainnet() -> Network {
        Network::new("mainnet", 1)
    }

    #[test]
    fn block_interval_filters_blocks() {
        let source = Source::block("Blocks", mainnet(), 100, 10);
        assert!(source.contains_block(100));
        assert!(source.contains_block(110));
        assert!(!source.contains_block(105));
        assert!(!source.contains_block(90));
    }

    #[test]
    fn end_block_is_inclusive() {
        let source = Source::block("Blocks", mainnet(), 0, 1).with_end_block(50);
        assert!(source.contains_block(50));
        assert!(!source.contains_block(51));
    }

    #[test]
    fn address_filter_matches() {
        let a = Address::repeat_byte(1);
        let b = Address::repeat_byte(2);
        assert!(AddressFilter::Any.matches(&a));
        assert!(AddressFilter::single(a).matches(&a));
        assert!(!AddressFilter::single(a).matches(&b));
    }

    #[test]
    fn receipts_flag_only_applies_to_contract_sources() {
        let abi = Arc::new(AbiIndex::default());
        let log = Source::log("Pair", mainnet(), AddressFilter::Any, abi, 0).with_transaction_receipts(true);
        assert!(log.includes_receipts());
        let block = Source::block("Blocks", mainnet(), 0, 1).with_transaction_receipts(true);
        assert!(!block.includes_receipts());
    }

    #[test]
    fn cache_key_includes_chain_and_kind() {
        let source = Source::block("Blocks", mainnet(), 0, 1);
        assert_eq!(source.cache_key(), "1:block:Blocks");
    }
}
