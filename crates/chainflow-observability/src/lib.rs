//! # chainflow-observability
//!
//! OpenTelemetry-based observability for Chainflow.
//!
//! ## Built-in metrics
//! - `chainflow.events_decoded`   counter
//! - `chainflow.events_dropped`   counter, rows that did not match their ABI
//! - `chainflow.events_handled`   counter, tagged with handler
//! - `chainflow.handler_errors`   counter, tagged with handler
//! - `chainflow.cycle_latency_ms` histogram
//! - `chainflow.batch_size`       histogram, tasks per cycle
//!
//! ## Structured logging
//! JSON or human-readable logs with per-component levels.

pub mod metrics;
pub mod tracing_setup;

pub use metrics::EngineMetrics;
pub use tracing_setup::{init_tracing, LogConfig};
