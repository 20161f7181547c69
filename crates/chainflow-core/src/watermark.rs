//! Watermark calculator.
//!
//! Processing may only advance to a timestamp that every source has fully
//! cached. Each source contributes the `end_block_timestamp` of the cached
//! interval that contains its start block; the watermark is the minimum of
//! those bounds. A source with no such interval holds the whole cycle back.

use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, trace};

use crate::cache::CacheAccessor;
use crate::error::IndexerError;
use crate::event::RawEvent;
use crate::source::Source;

/// Highest timestamp whose events have all been applied, for one generation.
#[derive(Debug, Default)]
pub struct ProcessingWatermark(AtomicU64);

impl ProcessingWatermark {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }

    /// Advance to `timestamp`. Never moves backwards; returns the resulting value.
    pub fn advance(&self, timestamp: u64) -> u64 {
        self.0.fetch_max(timestamp, Ordering::AcqRel).max(timestamp)
    }
}

/// Result of one watermark computation.
#[derive(Debug, Clone, Default)]
pub struct NewEvents {
    pub has_new_logs: bool,
    pub to_timestamp: u64,
    /// Raw rows in `(from_timestamp, to_timestamp]`, unordered.
    pub events: Vec<RawEvent>,
}

impl NewEvents {
    fn none(to_timestamp: u64) -> Self {
        Self {
            has_new_logs: false,
            to_timestamp,
            events: Vec::new(),
        }
    }
}

/// Minimum cached bound across `sources`, or `None` if any source is unanchored.
pub async fn safe_timestamp(accessor: &CacheAccessor, sources: &[Source]) -> Result<Option<u64>, IndexerError> {
    let mut bound: Option<u64> = None;
    for source in sources {
        match accessor.anchoring_interval(source).await? {
            Some(interval) => {
                trace!(
                    source = %source.name,
                    start_block = interval.start_block,
                    end_block = interval.end_block,
                    end_timestamp = interval.end_block_timestamp,
                    "anchoring interval"
                );
                bound = Some(bound.map_or(interval.end_block_timestamp, |b| b.min(interval.end_block_timestamp)));
            }
            None => {
                debug!(source = %source.name, start_block = source.start_block, "source has no anchoring interval");
                return Ok(None);
            }
        }
    }
    Ok(bound)
}

/// Compute how far processing may advance from `from_timestamp` and fetch the rows in between.
pub async fn next_batch(
    accessor: &CacheAccessor,
    sources: &[Source],
    from_timestamp: u64,
) -> Result<NewEvents, IndexerError> {
    let Some(to_timestamp) = safe_timestamp(accessor, sources).await? else {
        return Ok(NewEvents::none(from_timestamp));
    };

    if to_timestamp <= from_timestamp {
        return Ok(NewEvents::none(from_timestamp));
    }

    let events = accessor.raw_events(sources, from_timestamp, to_timestamp).await?;
    debug!(from_timestamp, to_timestamp, rows = events.len(), "fetched raw rows");

    Ok(NewEvents {
        has_new_logs: true,
        to_timestamp,
        events,
    })
}
