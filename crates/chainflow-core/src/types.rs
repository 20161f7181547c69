//! Raw chain rows as they sit in the cache.

use alloy_primitives::{Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};

// ─── Block ────────────────────────────────────────────────────────────────────

/// A cached block header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub hash: B256,
    pub parent_hash: B256,
    pub number: u64,
    /// Unix timestamp (seconds).
    pub timestamp: u64,
    #[serde(default)]
    pub miner: Address,
    #[serde(default)]
    pub gas_limit: u64,
    #[serde(default)]
    pub gas_used: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_fee_per_gas: Option<U256>,
}

impl Block {
    /// Returns `true` if `parent` is the direct parent of `self`.
    pub fn extends(&self, parent: &Block) -> bool {
        self.number == parent.number + 1 && self.parent_hash == parent.hash
    }
}

// ─── Transaction ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub hash: B256,
    pub block_hash: B256,
    pub block_number: u64,
    pub transaction_index: u64,
    pub from: Address,
    #[serde(default)]
    pub to: Option<Address>,
    #[serde(default)]
    pub input: Bytes,
    #[serde(default)]
    pub value: U256,
    #[serde(default)]
    pub nonce: u64,
    #[serde(default)]
    pub gas: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReceipt {
    pub transaction_hash: B256,
    pub block_hash: B256,
    pub block_number: u64,
    pub transaction_index: u64,
    /// `true` on success.
    pub status: bool,
    #[serde(default)]
    pub gas_used: u64,
    #[serde(default)]
    pub cumulative_gas_used: u64,
    #[serde(default)]
    pub contract_address: Option<Address>,
}

// ─── Log ──────────────────────────────────────────────────────────────────────

/// A raw EVM log. `topics[0]` is the event selector for non-anonymous events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Log {
    pub address: Address,
    pub topics: Vec<B256>,
    #[serde(default)]
    pub data: Bytes,
    pub block_hash: B256,
    pub block_number: u64,
    pub log_index: u64,
    pub transaction_hash: B256,
    pub transaction_index: u64,
}

impl Log {
    /// The event selector, if the log has one.
    pub fn selector(&self) -> Option<&B256> {
        self.topics.first()
    }
}

// ─── CallTrace ────────────────────────────────────────────────────────────────

/// A single internal or external call, as produced by a call tracer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallTrace {
    pub from: Address,
    pub to: Address,
    pub input: Bytes,
    #[serde(default)]
    pub output: Bytes,
    #[serde(default)]
    pub value: U256,
    #[serde(default)]
    pub gas: u64,
    #[serde(default)]
    pub gas_used: u64,
    /// Revert reason; reverted calls never reach handlers.
    #[serde(default)]
    pub error: Option<String>,
    /// Position of this call within its transaction's trace.
    pub trace_index: u64,
    #[serde(default)]
    pub subcalls: u64,
    pub transaction_hash: B256,
    pub transaction_index: u64,
    pub block_hash: B256,
    pub block_number: u64,
}

impl CallTrace {
    /// The 4-byte function selector, if the input is long enough to carry one.
    pub fn selector(&self) -> Option<[u8; 4]> {
        self.input.get(..4).and_then(|s| s.try_into().ok())
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn block(number: u64, hash: u8, parent: u8) -> Block {
        Block {
            hash: B256::repeat_byte(hash),
            parent_hash: B256::repeat_byte(parent),
            number,
            timestamp: number * 12,
            miner: Address::ZERO,
            gas_limit: 30_000_000,
            gas_used: 0,
            base_fee_per_gas: None,
        }
    }

    #[test]
    fn block_extends_parent() {
        let parent = block(100, 0xaa, 0x00);
        let child = block(101, 0xbb, 0xaa);
        assert!(child.extends(&parent));
        assert!(!parent.extends(&child));
    }

    #[test]
    fn trace_selector_requires_four_bytes() {
        let mut trace = CallTrace {
            from: Address::ZERO,
            to: Address::ZERO,
            input: Bytes::from(vec![0xa9, 0x05, 0x9c]),
            output: Bytes::new(),
            value: U256::ZERO,
            gas: 0,
            gas_used: 0,
            error: None,
            trace_index: 0,
            subcalls: 0,
            transaction_hash: B256::ZERO,
            transaction_index: 0,
            block_hash: B256::ZERO,
            block_number: 1,
        };
        assert_eq!(trace.selector(), None);

        trace.input = Bytes::from(vec![0xa9, 0x05, 0x9c, 0xbb, 0x00]);
        assert_eq!(trace.selector(), Some([0xa9, 0x05, 0x9c, 0xbb]));
    }

    #[test]
    fn log_deserializes_from_camel_case_json() {
        let json = serde_json::json!({
            "address": "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48",
            "topics": ["0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef"],
            "data": "0x",
            "blockHash": format!("0x{}", "11".repeat(32)),
            "blockNumber": 19000000,
            "logIndex": 3,
            "transactionHash": format!("0x{}", "22".repeat(32)),
            "transactionIndex": 1
        });
        let log: Log = serde_json::from_value(json).unwrap();
        assert_eq!(log.block_number, 19_000_000);
        assert_eq!(log.log_index, 3);
        assert!(log.selector().is_some());
    }
}
