//! Chainflow engine metrics.
//!
//! All metrics use OpenTelemetry conventions and are recorded through the
//! engine's [`EngineObserver`] hook.

use opentelemetry::{
    global,
    metrics::{Counter, Histogram, Meter},
    KeyValue,
};

use chainflow_core::progress::EngineObserver;

/// Central metrics handle for the handler engine.
#[derive(Clone)]
pub struct EngineMetrics {
    pub events_decoded: Counter<u64>,
    pub events_dropped: Counter<u64>,
    pub events_handled: Counter<u64>,
    pub handler_errors: Counter<u64>,
    pub cycle_latency_ms: Histogram<f64>,
    pub batch_size: Histogram<u64>,
}

impl EngineMetrics {
    pub fn new(meter: &Meter) -> Self {
        Self {
            events_decoded: meter
                .u64_counter("chainflow.events_decoded")
                .with_description("Raw rows decoded into events")
                .build(),
            events_dropped: meter
                .u64_counter("chainflow.events_dropped")
                .with_description("Raw rows dropped because they did not match their ABI")
                .build(),
            events_handled: meter
                .u64_counter("chainflow.events_handled")
                .with_description("Tasks applied by user handlers")
                .build(),
            handler_errors: meter
                .u64_counter("chainflow.handler_errors")
                .with_description("User handler failures")
                .build(),
            cycle_latency_ms: meter
                .f64_histogram("chainflow.cycle_latency_ms")
                .with_description("Wall time of one processing cycle in milliseconds")
                .build(),
            batch_size: meter
                .u64_histogram("chainflow.batch_size")
                .with_description("Tasks queued in one processing cycle")
                .build(),
        }
    }

    /// Metrics on the global meter provider.
    pub fn global() -> Self {
        Self::new(&global::meter("chainflow"))
    }
}

impl EngineObserver for EngineMetrics {
    fn events_decoded(&self, count: usize) {
        self.events_decoded.add(count as u64, &[]);
    }

    fn events_dropped(&self, count: usize) {
        self.events_dropped.add(count as u64, &[]);
    }

    fn event_handled(&self, name: &str) {
        self.events_handled
            .add(1, &[KeyValue::new("handler", name.to_string())]);
    }

    fn handler_error(&self, name: &str) {
        self.handler_errors
            .add(1, &[KeyValue::new("handler", name.to_string())]);
    }

    fn cycle_completed(&self, batch_size: usize, elapsed_ms: f64) {
        self.batch_size.record(batch_size as u64, &[]);
        self.cycle_latency_ms.record(elapsed_ms, &[]);
    }
}
