//! Raw rows assembled from the cache and their decoded counterparts.

use alloy_primitives::{Address, Bytes, U256};
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;

use crate::checkpoint::Checkpoint;
use crate::types::{Block, CallTrace, Log, Transaction, TransactionReceipt};

// ─── Raw events ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RawEventData {
    Block {
        block: Block,
    },
    Log {
        log: Log,
        block: Block,
        transaction: Transaction,
        transaction_receipt: Option<TransactionReceipt>,
    },
    CallTrace {
        trace: CallTrace,
        block: Block,
        transaction: Transaction,
        transaction_receipt: Option<TransactionReceipt>,
    },
}

/// An undecoded row, tagged with the source that selected it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEvent {
    pub chain_id: u64,
    /// Index into the generation's source list.
    pub source_index: usize,
    pub checkpoint: Checkpoint,
    pub data: RawEventData,
}

impl RawEvent {
    pub fn block(&self) -> &Block {
        match &self.data {
            RawEventData::Block { block }
            | RawEventData::Log { block, .. }
            | RawEventData::CallTrace { block, .. } => block,
        }
    }
}

// ─── Decoded values ───────────────────────────────────────────────────────────

/// A normalized ABI value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum DecodedValue {
    /// Unsigned integer that fits in 128 bits.
    Uint(u128),
    /// Unsigned integer that does not fit in 128 bits, decimal string.
    BigUint(String),
    Int(i128),
    BigInt(String),
    Bool(bool),
    Bytes(Bytes),
    Str(String),
    Address(Address),
    Array(Vec<DecodedValue>),
    /// Named fields in ABI order.
    Tuple(Vec<(String, DecodedValue)>),
}

impl DecodedValue {
    pub fn as_u128(&self) -> Option<u128> {
        match self {
            Self::Uint(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_u256(&self) -> Option<U256> {
        match self {
            Self::Uint(v) => Some(U256::from(*v)),
            Self::BigUint(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn as_address(&self) -> Option<Address> {
        match self {
            Self::Address(a) => Some(*a),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Untagged JSON view. Integers wider than 64 bits become decimal strings.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Uint(v) => match u64::try_from(*v) {
                Ok(n) => Value::from(n),
                Err(_) => Value::String(v.to_string()),
            },
            Self::Int(v) => match i64::try_from(*v) {
                Ok(n) => Value::from(n),
                Err(_) => Value::String(v.to_string()),
            },
            Self::BigUint(s) | Self::BigInt(s) | Self::Str(s) => Value::String(s.clone()),
            Self::Bool(b) => Value::Bool(*b),
            Self::Bytes(b) => Value::String(b.to_string()),
            Self::Address(a) => Value::String(a.to_checksum(None)),
            Self::Array(items) => Value::Array(items.iter().map(Self::to_json).collect()),
            Self::Tuple(fields) => Value::Object(
                fields
                    .iter()
                    .map(|(name, value)| (name.clone(), value.to_json()))
                    .collect(),
            ),
        }
    }
}

/// Decoded arguments keyed by parameter name, in ABI order.
pub type DecodedArgs = IndexMap<String, DecodedValue>;

pub fn args_to_json(args: &DecodedArgs) -> Value {
    Value::Object(
        args.iter()
            .map(|(name, value)| (name.clone(), value.to_json()))
            .collect(),
    )
}

// ─── Decoded events ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EventData {
    Block {
        block: Block,
    },
    Log {
        args: DecodedArgs,
        log: Log,
        block: Block,
        transaction: Transaction,
        transaction_receipt: Option<TransactionReceipt>,
    },
    CallTrace {
        args: DecodedArgs,
        result: DecodedArgs,
        trace: CallTrace,
        block: Block,
        transaction: Transaction,
        transaction_receipt: Option<TransactionReceipt>,
    },
}

/// A decoded event, ready for a handler.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub chain_id: u64,
    pub source_index: usize,
    /// `Source:Event`, `Source:function()` or `Source:block`.
    pub name: String,
    pub checkpoint: Checkpoint,
    pub data: EventData,
}

impl Event {
    pub fn block(&self) -> &Block {
        match &self.data {
            EventData::Block { block }
            | EventData::Log { block, .. }
            | EventData::CallTrace { block, .. } => block,
        }
    }

    pub fn block_number(&self) -> u64 {
        self.checkpoint.block_number
    }

    pub fn args(&self) -> Option<&DecodedArgs> {
        match &self.data {
            EventData::Block { .. } => None,
            EventData::Log { args, .. } | EventData::CallTrace { args, .. } => Some(args),
        }
    }

    pub fn arg(&self, name: &str) -> Option<&DecodedValue> {
        self.args().and_then(|args| args.get(name))
    }

    /// Event parameters as JSON, for error reports.
    pub fn params_json(&self) -> Value {
        match &self.data {
            EventData::Block { block } => serde_json::json!({
                "number": block.number,
                "hash": block.hash.to_string(),
                "timestamp": block.timestamp,
            }),
            EventData::Log { args, .. } => args_to_json(args),
            EventData::CallTrace { args, result, .. } => serde_json::json!({
                "args": args_to_json(args),
                "result": args_to_json(result),
            }),
        }
    }
}

// ─── Tasks ────────────────────────────────────────────────────────────────────

/// A unit of work for the handler engine.
#[derive(Debug, Clone)]
pub enum HandlerTask {
    Setup,
    Event(Box<Event>),
}

impl HandlerTask {
    pub fn name(&self) -> &str {
        match self {
            Self::Setup => "setup",
            Self::Event(event) => &event.name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wide_integers_render_as_strings() {
        assert_eq!(DecodedValue::Uint(42).to_json(), Value::from(42u64));
        assert_eq!(
            DecodedValue::Uint(u128::MAX).to_json(),
            Value::String(u128::MAX.to_string())
        );
        assert_eq!(DecodedValue::Int(-7).to_json(), Value::from(-7i64));
    }

    #[test]
    fn big_uint_parses_to_u256() {
        let v = DecodedValue::BigUint("340282366920938463463374607431768211456".into());
        assert_eq!(v.as_u256(), Some(U256::from(u128::MAX) + U256::from(1u8)));
    }

    #[test]
    fn tagged_serialization() {
        let v = DecodedValue::Bool(true);
        assert_eq!(
            serde_json::to_value(&v).unwrap(),
            serde_json::json!({"type": "bool", "value": true})
        );
    }

    #[test]
    fn args_keep_abi_order() {
        let mut args = DecodedArgs::new();
        args.insert("to".into(), DecodedValue::Address(Address::ZERO));
        args.insert("amount".into(), DecodedValue::Uint(1));
        let json = args_to_json(&args);
        let keys: Vec<&String> = json.as_object().unwrap().keys().collect();
        // serde_json without preserve_order sorts keys; the IndexMap itself keeps ABI order
        assert_eq!(keys.len(), 2);
        assert_eq!(args.get_index(0).unwrap().0, "to");
    }
}
