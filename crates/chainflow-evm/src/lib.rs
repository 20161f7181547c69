//! # chainflow-evm
//!
//! EVM decoding and handler execution for Chainflow.
//!
//! - [`EvmDecoder`] decodes logs and call traces with `alloy-core`
//! - [`DecodePool`] spreads decoding over dedicated worker threads
//! - [`HandlerEngine`] runs decoded events through user handlers, one at a time
//! - [`EngineBuilder`] wires the engine together

pub mod builder;
pub mod decoder;
pub mod engine;
pub mod normalizer;
pub mod pool;

pub use builder::EngineBuilder;
pub use decoder::{ChunkDecoder, DecodeError, DecodeOutput, EvmDecoder};
pub use engine::{CycleOutcome, GenerationConfig, HandlerEngine};
pub use pool::{DecodePool, PoolError};
