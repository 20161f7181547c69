//! Progress events and the engine observer hook.

use serde::Serialize;

/// Published on the engine's broadcast channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ProgressEvent {
    TaskStarted,
    TaskCompleted {
        timestamp: Option<u64>,
    },
    #[serde(rename_all = "camelCase")]
    EventsAdded {
        handled_count: usize,
        total_count: usize,
        from_timestamp: u64,
        to_timestamp: u64,
    },
    #[serde(rename_all = "camelCase")]
    EventsProcessed {
        count: usize,
        to_timestamp: u64,
    },
    EventQueueReset,
}

/// Hook for metrics backends. Every method defaults to a no-op.
pub trait EngineObserver: Send + Sync {
    fn events_decoded(&self, _count: usize) {}

    fn events_dropped(&self, _count: usize) {}

    fn event_handled(&self, _name: &str) {}

    fn handler_error(&self, _name: &str) {}

    /// One cycle finished; `batch_size` is the number of queued tasks.
    fn cycle_completed(&self, _batch_size: usize, _elapsed_ms: f64) {}
}
