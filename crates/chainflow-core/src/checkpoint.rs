//! Checkpoints: the total-order key used to interleave events across chains.
//!
//! Field order is comparison order. The block timestamp leads so that events
//! from several chains interleave by wall-clock time; chain id, block number,
//! and intra-block position break ties deterministically.
//!
//! A checkpoint also has a fixed-width decimal encoding, so encoded
//! checkpoints sort lexicographically in the same order as the struct.

use serde::{Deserialize, Serialize};

use crate::error::IndexerError;
use crate::types::{Block, CallTrace, Log};

const TIMESTAMP_DIGITS: usize = 10;
const CHAIN_ID_DIGITS: usize = 16;
const BLOCK_NUMBER_DIGITS: usize = 16;
const TRANSACTION_INDEX_DIGITS: usize = 16;
const EVENT_TYPE_DIGITS: usize = 1;
const EVENT_INDEX_DIGITS: usize = 16;

const ENCODED_LEN: usize = TIMESTAMP_DIGITS
    + CHAIN_ID_DIGITS
    + BLOCK_NUMBER_DIGITS
    + TRANSACTION_INDEX_DIGITS
    + EVENT_TYPE_DIGITS
    + EVENT_INDEX_DIGITS;

const MAX_TIMESTAMP: u64 = 9_999_999_999;
const MAX_16_DIGITS: u64 = 9_999_999_999_999_999;

/// Kind of event a checkpoint points at. Discriminants are the encoded digit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[repr(u8)]
pub enum EventType {
    Log = 5,
    CallTrace = 7,
    Block = 9,
}

impl EventType {
    fn from_digit(digit: u8) -> Option<Self> {
        match digit {
            5 => Some(Self::Log),
            7 => Some(Self::CallTrace),
            9 => Some(Self::Block),
            _ => None,
        }
    }
}

/// Ordering key for a single event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    pub block_timestamp: u64,
    pub chain_id: u64,
    pub block_number: u64,
    pub transaction_index: u64,
    pub event_type: EventType,
    pub event_index: u64,
}

impl Checkpoint {
    /// Lower bound of every checkpoint.
    pub const ZERO: Checkpoint = Checkpoint {
        block_timestamp: 0,
        chain_id: 0,
        block_number: 0,
        transaction_index: 0,
        event_type: EventType::Log,
        event_index: 0,
    };

    /// Upper bound of every checkpoint.
    pub const MAX: Checkpoint = Checkpoint {
        block_timestamp: MAX_TIMESTAMP,
        chain_id: MAX_16_DIGITS,
        block_number: MAX_16_DIGITS,
        transaction_index: MAX_16_DIGITS,
        event_type: EventType::Block,
        event_index: MAX_16_DIGITS,
    };

    /// Checkpoint of a block event. Sorts after every log and trace of the block.
    pub fn for_block(chain_id: u64, block: &Block) -> Self {
        Self {
            block_timestamp: block.timestamp,
            chain_id,
            block_number: block.number,
            transaction_index: MAX_16_DIGITS,
            event_type: EventType::Block,
            event_index: 0,
        }
    }

    pub fn for_log(chain_id: u64, block: &Block, log: &Log) -> Self {
        Self {
            block_timestamp: block.timestamp,
            chain_id,
            block_number: log.block_number,
            transaction_index: log.transaction_index,
            event_type: EventType::Log,
            event_index: log.log_index,
        }
    }

    pub fn for_trace(chain_id: u64, block: &Block, trace: &CallTrace) -> Self {
        Self {
            block_timestamp: block.timestamp,
            chain_id,
            block_number: trace.block_number,
            transaction_index: trace.transaction_index,
            event_type: EventType::CallTrace,
            event_index: trace.trace_index,
        }
    }

    /// Fixed-width decimal encoding.
    pub fn encode(&self) -> String {
        format!(
            "{:0tw$}{:0cw$}{:0bw$}{:0xw$}{}{:0ew$}",
            self.block_timestamp.min(MAX_TIMESTAMP),
            self.chain_id.min(MAX_16_DIGITS),
            self.block_number.min(MAX_16_DIGITS),
            self.transaction_index.min(MAX_16_DIGITS),
            self.event_type as u8,
            self.event_index.min(MAX_16_DIGITS),
            tw = TIMESTAMP_DIGITS,
            cw = CHAIN_ID_DIGITS,
            bw = BLOCK_NUMBER_DIGITS,
            xw = TRANSACTION_INDEX_DIGITS,
            ew = EVENT_INDEX_DIGITS,
        )
    }

    /// Parse the output of [`Checkpoint::encode`].
    pub fn decode(encoded: &str) -> Result<Self, IndexerError> {
        let invalid = || IndexerError::InvalidCheckpoint(encoded.to_string());
        if encoded.len() != ENCODED_LEN || !encoded.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }

        let mut offset = 0;
        let mut take = |width: usize| -> Result<u64, IndexerError> {
            let part = &encoded[offset..offset + width];
            offset += width;
            part.parse::<u64>().map_err(|_| invalid())
        };

        let block_timestamp = take(TIMESTAMP_DIGITS)?;
        let chain_id = take(CHAIN_ID_DIGITS)?;
        let block_number = take(BLOCK_NUMBER_DIGITS)?;
        let transaction_index = take(TRANSACTION_INDEX_DIGITS)?;
        let event_type = EventType::from_digit(take(EVENT_TYPE_DIGITS)? as u8).ok_or_else(invalid)?;
        let event_index = take(EVENT_INDEX_DIGITS)?;

        Ok(Self {
            block_timestamp,
            chain_id,
            block_number,
            transaction_index,
            event_type,
            event_index,
        })
    }
}

impl std::fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}@{}#{}:{}:{:?}:{}",
            self.chain_id,
            self.block_timestamp,
            self.block_number,
            self.transaction_index,
            self.event_type,
            self.event_index
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cp(ts: u64, chain: u64, block: u64, tx: u64, ty: EventType, idx: u64) -> Checkpoint {
        Checkpoint {
            block_timestamp: ts,
            chain_id: chain,
            block_number: block,
            transaction_index: tx,
            event_type: ty,
            event_index: idx,
        }
    }

    #[test]
    fn orders_by_timestamp_before_chain() {
        let a = cp(100, 2, 5, 0, EventType::Log, 0);
        let b = cp(120, 1, 10, 0, EventType::Log, 0);
        assert!(a < b);
    }

    #[test]
    fn block_event_sorts_after_logs_in_same_block() {
        let log = cp(100, 1, 10, 7, EventType::Log, 42);
        let block = Checkpoint {
            transaction_index: MAX_16_DIGITS,
            ..cp(100, 1, 10, 0, EventType::Block, 0)
        };
        assert!(log < block);
    }

    #[test]
    fn trace_sorts_after_log_in_same_transaction() {
        let log = cp(100, 1, 10, 3, EventType::Log, 9);
        let trace = cp(100, 1, 10, 3, EventType::CallTrace, 0);
        assert!(log < trace);
    }

    #[test]
    fn encode_is_fixed_width_and_decodes() {
        let c = cp(1_700_000_000, 8453, 19_000_000, 12, EventType::CallTrace, 3);
        let encoded = c.encode();
        assert_eq!(encoded.len(), ENCODED_LEN);
        assert_eq!(Checkpoint::decode(&encoded).unwrap(), c);
    }

    #[test]
    fn encoding_preserves_order() {
        let a = cp(99, 1, 5, 0, EventType::Log, 1);
        let b = cp(100, 1, 5, 0, EventType::Log, 0);
        assert!(a.encode() < b.encode());
        assert!(Checkpoint::ZERO.encode() < Checkpoint::MAX.encode());
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(Checkpoint::decode("123").is_err());
        let mut bad = Checkpoint::ZERO.encode();
        bad.replace_range(58..59, "3");
        assert!(Checkpoint::decode(&bad).is_err());
    }
}
