//! `EvmDecoder`: turns raw cache rows into named, typed events.
//!
//! # Log decoding
//! - `topics[0]` selects the ABI event
//! - `topics[1..]` hold the indexed parameters (one 32-byte word each)
//! - `data` holds the non-indexed parameters as an ABI-encoded sequence
//!
//! # Call-trace decoding
//! - the first 4 bytes of `input` select the ABI function
//! - the rest of `input` decodes against the function inputs
//! - `output` decodes against the function outputs
//!
//! Rows that do not match their source's ABI are dropped, never fatal.

use alloy_core::dyn_abi::{DynSolType, DynSolValue, FunctionExt, JsonAbiExt, Specifier};
use alloy_json_abi::{EventParam, Param};
use chainflow_core::abi::{AbiEventEntry, AbiFunctionEntry};
use chainflow_core::event::{DecodedArgs, DecodedValue, Event, EventData, RawEvent, RawEventData};
use chainflow_core::source::Source;
use chainflow_core::types::{CallTrace, Log};
use thiserror::Error;
use tracing::debug;

use crate::normalizer::{normalize, normalize_named, positional};

/// Why a row was dropped.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("source index {0} is out of range")]
    UnknownSource(usize),

    #[error("row kind does not match source '{0}'")]
    KindMismatch(String),

    #[error("log has no topic0")]
    MissingSelector,

    #[error("no ABI event for topic0 {0}")]
    UnknownEvent(String),

    #[error("no ABI function for selector 0x{0}")]
    UnknownFunction(String),

    #[error("expected {expected} topics, found {found}")]
    TopicCount { expected: usize, found: usize },

    #[error("ABI type error: {0}")]
    Type(String),

    #[error("ABI decode failed: {0}")]
    Abi(String),
}

/// Output of decoding one chunk.
#[derive(Debug, Default)]
pub struct DecodeOutput {
    /// Decoded events, in input order.
    pub events: Vec<Event>,
    /// Rows dropped because they did not match their source's ABI.
    pub dropped: usize,
}

impl DecodeOutput {
    pub fn extend(&mut self, other: DecodeOutput) {
        self.events.extend(other.events);
        self.dropped += other.dropped;
    }
}

/// Decodes a contiguous chunk of raw events. Must be pure: no state survives a call.
pub trait ChunkDecoder: Send + Sync {
    fn decode_chunk(&self, chunk: &[RawEvent], sources: &[Source]) -> DecodeOutput;
}

/// The EVM decoder.
#[derive(Debug, Default, Clone)]
pub struct EvmDecoder;

impl EvmDecoder {
    pub fn new() -> Self {
        Self
    }

    /// Decode a single raw event.
    pub fn decode(&self, raw: &RawEvent, sources: &[Source]) -> Result<Event, DecodeError> {
        let source = sources
            .get(raw.source_index)
            .ok_or(DecodeError::UnknownSource(raw.source_index))?;

        let (name, data) = match &raw.data {
            RawEventData::Block { block } => (source.block_event_name(), EventData::Block { block: block.clone() }),

            RawEventData::Log {
                log,
                block,
                transaction,
                transaction_receipt,
            } => {
                let abi = source
                    .abi()
                    .ok_or_else(|| DecodeError::KindMismatch(source.name.clone()))?;
                let selector = log.selector().ok_or(DecodeError::MissingSelector)?;
                let entry = abi
                    .event(selector)
                    .ok_or_else(|| DecodeError::UnknownEvent(selector.to_string()))?;
                let args = decode_log(entry, log)?;
                (
                    format!("{}:{}", source.name, entry.name),
                    EventData::Log {
                        args,
                        log: log.clone(),
                        block: block.clone(),
                        transaction: transaction.clone(),
                        transaction_receipt: transaction_receipt.clone(),
                    },
                )
            }

            RawEventData::CallTrace {
                trace,
                block,
                transaction,
                transaction_receipt,
            } => {
                let abi = source
                    .abi()
                    .ok_or_else(|| DecodeError::KindMismatch(source.name.clone()))?;
                let selector = trace
                    .selector()
                    .ok_or_else(|| DecodeError::UnknownFunction(hex_selector(&trace.input)))?;
                let entry = abi
                    .function(&selector)
                    .ok_or_else(|| DecodeError::UnknownFunction(hex_selector(&selector)))?;
                let (args, result) = decode_call(entry, trace)?;
                (
                    format!("{}:{}", source.name, entry.name),
                    EventData::CallTrace {
                        args,
                        result,
                        trace: trace.clone(),
                        block: block.clone(),
                        transaction: transaction.clone(),
                        transaction_receipt: transaction_receipt.clone(),
                    },
                )
            }
        };

        Ok(Event {
            chain_id: raw.chain_id,
            source_index: raw.source_index,
            name,
            checkpoint: raw.checkpoint,
            data,
        })
    }
}

impl ChunkDecoder for EvmDecoder {
    fn decode_chunk(&self, chunk: &[RawEvent], sources: &[Source]) -> DecodeOutput {
        let mut out = DecodeOutput {
            events: Vec::with_capacity(chunk.len()),
            dropped: 0,
        };
        for raw in chunk {
            match self.decode(raw, sources) {
                Ok(event) => out.events.push(event),
                Err(e) => {
                    debug!(
                        chain_id = raw.chain_id,
                        block = raw.checkpoint.block_number,
                        source_index = raw.source_index,
                        error = %e,
                        "dropping undecodable row"
                    );
                    out.dropped += 1;
                }
            }
        }
        out
    }
}

fn decode_log(entry: &AbiEventEntry, log: &Log) -> Result<DecodedArgs, DecodeError> {
    let inputs = &entry.item.inputs;
    let indexed: Vec<(usize, &EventParam)> = inputs.iter().enumerate().filter(|(_, p)| p.indexed).collect();
    let body: Vec<(usize, &EventParam)> = inputs.iter().enumerate().filter(|(_, p)| !p.indexed).collect();

    let expected = indexed.len() + 1;
    if log.topics.len() != expected {
        return Err(DecodeError::TopicCount {
            expected,
            found: log.topics.len(),
        });
    }

    let mut values: Vec<Option<DecodedValue>> = vec![None; inputs.len()];

    for ((position, param), topic) in indexed.iter().zip(&log.topics[1..]) {
        values[*position] = Some(decode_topic(param, topic.as_slice())?);
    }

    if !body.is_empty() {
        let types = body
            .iter()
            .map(|(_, p)| resolve(*p))
            .collect::<Result<Vec<_>, _>>()?;
        let decoded = DynSolType::Tuple(types)
            .abi_decode_params(&log.data)
            .map_err(|e| DecodeError::Abi(e.to_string()))?;
        let decoded = match decoded {
            DynSolValue::Tuple(vals) => vals,
            other => vec![other],
        };
        if decoded.len() != body.len() {
            return Err(DecodeError::Abi(format!(
                "expected {} data values, decoded {}",
                body.len(),
                decoded.len()
            )));
        }
        for ((position, param), value) in body.iter().zip(decoded) {
            values[*position] = Some(normalize_named(value, &component_names(&param.components)));
        }
    }

    let mut args = DecodedArgs::with_capacity(inputs.len());
    for (i, (param, value)) in inputs.iter().zip(values).enumerate() {
        let value = value.ok_or_else(|| DecodeError::Abi(format!("parameter {i} was not decoded")))?;
        args.insert(positional(&param.name, i), value);
    }
    Ok(args)
}

/// Decode one indexed topic.
///
/// Value types are stored padded to 32 bytes and decode directly. Reference
/// types (string, bytes, arrays, tuples) are stored as the keccak256 of their
/// encoding; the original value is unrecoverable and the raw hash is returned.
fn decode_topic(param: &EventParam, topic: &[u8]) -> Result<DecodedValue, DecodeError> {
    let ty = resolve(param)?;
    match ty {
        DynSolType::String
        | DynSolType::Bytes
        | DynSolType::Array(_)
        | DynSolType::FixedArray(..)
        | DynSolType::Tuple(_) => Ok(DecodedValue::Bytes(topic.to_vec().into())),
        _ => ty
            .abi_decode(topic)
            .map(normalize)
            .map_err(|e| DecodeError::Abi(format!("topic decode: {e}"))),
    }
}

fn decode_call(entry: &AbiFunctionEntry, trace: &CallTrace) -> Result<(DecodedArgs, DecodedArgs), DecodeError> {
    let function = &entry.item;

    let inputs = function
        .abi_decode_input(&trace.input[4..], true)
        .map_err(|e| DecodeError::Abi(format!("input: {e}")))?;
    let outputs = function
        .abi_decode_output(&trace.output, true)
        .map_err(|e| DecodeError::Abi(format!("output: {e}")))?;

    Ok((named(&function.inputs, inputs), named(&function.outputs, outputs)))
}

fn named(params: &[Param], values: Vec<DynSolValue>) -> DecodedArgs {
    params
        .iter()
        .zip(values)
        .enumerate()
        .map(|(i, (param, value))| {
            (
                positional(&param.name, i),
                normalize_named(value, &component_names(&param.components)),
            )
        })
        .collect()
}

fn resolve<S: Specifier<DynSolType>>(param: &S) -> Result<DynSolType, DecodeError> {
    param.resolve().map_err(|e| DecodeError::Type(e.to_string()))
}

fn component_names(components: &[Param]) -> Vec<String> {
    components.iter().map(|c| c.name.clone()).collect()
}

fn hex_selector(bytes: &[u8]) -> String {
    bytes.iter().take(4).map(|b| format!("{b:02x}")).collect()
}
