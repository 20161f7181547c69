//! The serialized handler execution engine.
//!
//! # Cycle
//! 1. Acquire the generation's cancellable lock
//! 2. Compute the watermark and fetch raw rows in `(watermark, to]`
//! 3. Decode on the worker pool, keep events that have a handler, order by checkpoint
//! 4. Enqueue and drain one task at a time through user handlers
//! 5. Advance the watermark and publish progress
//!
//! # Reset
//! A reset cancels the current generation's lock, discards its queue, and
//! installs a fresh generation (new lock, new queue, watermark 0). A cycle
//! in flight notices at its next suspension point and ends as
//! [`CycleOutcome::Cancelled`].
//!
//! # Halting
//! A handler error, a row referencing data the cache does not hold, or a
//! failed decode batch halts the generation. Every later cycle returns
//! [`CycleOutcome::Halted`] until the next reset.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use chainflow_core::cache::CacheAccessor;
use chainflow_core::error::{ConfigError, IndexerError};
use chainflow_core::event::{Event, HandlerTask};
use chainflow_core::handler::{BoundClient, ContractReader, HandlerContext, HandlerError, HandlerRegistry};
use chainflow_core::lock::{CycleGuard, CycleLock};
use chainflow_core::ordering::{is_ordered, sort_by_checkpoint};
use chainflow_core::progress::{EngineObserver, ProgressEvent};
use chainflow_core::queue::TaskQueue;
use chainflow_core::sink::{ErrorSink, UserError};
use chainflow_core::source::Source;
use chainflow_core::store::EntityStore;
use chainflow_core::watermark::{self, ProcessingWatermark};
use futures::FutureExt;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::pool::DecodePool;

/// Everything that changes on a reset.
pub struct GenerationConfig {
    pub sources: Vec<Source>,
    pub handlers: HandlerRegistry,
    pub store: Arc<dyn EntityStore>,
}

/// How a call to [`HandlerEngine::process_new_events`] ended.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// The cache has nothing past the current watermark.
    NoNewEvents,
    Processed {
        count: usize,
        from_timestamp: u64,
        to_timestamp: u64,
    },
    /// A reset happened while the cycle waited or ran.
    Cancelled,
    /// A handler error or missing cache data halted the generation; waiting for a reset.
    Halted,
    /// A handler failed in this cycle. The error was submitted to the sink.
    HandlerFailed(Box<UserError>),
}

struct Generation {
    id: u64,
    lock: CycleLock,
    queue: TaskQueue,
    watermark: ProcessingWatermark,
    sources: Arc<Vec<Source>>,
    handlers: HandlerRegistry,
    store: Arc<dyn EntityStore>,
    handled: AtomicUsize,
    /// Set by a fatal cache or decode error.
    fatal: AtomicBool,
}

impl Generation {
    fn new(id: u64, config: GenerationConfig) -> Self {
        let queue = TaskQueue::new();
        if config.handlers.has_setup() {
            queue.push(HandlerTask::Setup);
        }
        Self {
            id,
            lock: CycleLock::new(id),
            queue,
            watermark: ProcessingWatermark::new(),
            sources: Arc::new(config.sources),
            handlers: config.handlers,
            store: config.store,
            handled: AtomicUsize::new(0),
            fatal: AtomicBool::new(false),
        }
    }
}

pub struct HandlerEngine {
    cache: CacheAccessor,
    pool: DecodePool,
    sink: Arc<dyn ErrorSink>,
    reader: Option<Arc<dyn ContractReader>>,
    observer: Option<Arc<dyn EngineObserver>>,
    progress: broadcast::Sender<ProgressEvent>,
    current: RwLock<Arc<Generation>>,
    next_generation: AtomicU64,
}

impl HandlerEngine {
    pub(crate) fn new(
        cache: CacheAccessor,
        pool: DecodePool,
        sink: Arc<dyn ErrorSink>,
        reader: Option<Arc<dyn ContractReader>>,
        observer: Option<Arc<dyn EngineObserver>>,
        progress_capacity: usize,
        config: GenerationConfig,
    ) -> Self {
        let (progress, _) = broadcast::channel(progress_capacity.max(1));
        Self {
            cache,
            pool,
            sink,
            reader,
            observer,
            progress,
            current: RwLock::new(Arc::new(Generation::new(1, config))),
            next_generation: AtomicU64::new(2),
        }
    }

    /// Receive progress events. Slow receivers may lag and lose events.
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.progress.subscribe()
    }

    /// Current generation id. Starts at 1 and increases with every reset.
    pub fn generation(&self) -> u64 {
        self.current().id
    }

    /// Watermark of the current generation.
    pub fn watermark(&self) -> u64 {
        self.current().watermark.get()
    }

    pub fn queued(&self) -> usize {
        self.current().queue.len()
    }

    pub fn is_halted(&self) -> bool {
        self.halted(&self.current())
    }

    fn halted(&self, generation: &Generation) -> bool {
        self.sink.is_handler_error() || generation.fatal.load(Ordering::Acquire)
    }

    pub fn error_sink(&self) -> &Arc<dyn ErrorSink> {
        &self.sink
    }

    fn current(&self) -> Arc<Generation> {
        Arc::clone(&self.current.read().unwrap_or_else(|e| e.into_inner()))
    }

    fn emit(&self, event: ProgressEvent) {
        // no subscribers is fine
        let _ = self.progress.send(event);
    }

    /// Run one cycle.
    pub async fn process_new_events(&self) -> Result<CycleOutcome, IndexerError> {
        let generation = self.current();
        if self.halted(&generation) {
            return Ok(CycleOutcome::Halted);
        }

        let guard = match generation.lock.acquire().await {
            Ok(guard) => guard,
            Err(cancelled) => {
                warn!(generation = cancelled.generation, "cycle cancelled while waiting for lock");
                return Ok(CycleOutcome::Cancelled);
            }
        };
        if self.halted(&generation) {
            return Ok(CycleOutcome::Halted);
        }

        let started = Instant::now();
        let from_timestamp = generation.watermark.get();

        let batch = tokio::select! {
            biased;
            _ = guard.cancelled() => return Ok(self.cancelled(&generation)),
            batch = watermark::next_batch(&self.cache, &generation.sources, from_timestamp) => {
                batch.map_err(|e| if e.is_missing_data() { self.fatal(&generation, e) } else { e })?
            }
        };
        if !batch.has_new_logs {
            debug!(generation = generation.id, from_timestamp, "no new events");
            return Ok(CycleOutcome::NoNewEvents);
        }
        let to_timestamp = batch.to_timestamp;
        self.emit(ProgressEvent::TaskStarted);

        let decoded = tokio::select! {
            biased;
            _ = guard.cancelled() => return Ok(self.cancelled(&generation)),
            decoded = self.pool.execute(batch.events, Arc::clone(&generation.sources)) => {
                decoded.map_err(|e| self.fatal(&generation, IndexerError::Decode(e.to_string())))?
            }
        };
        if let Some(observer) = &self.observer {
            observer.events_decoded(decoded.events.len());
            observer.events_dropped(decoded.dropped);
        }

        let mut events: Vec<Event> = decoded
            .events
            .into_iter()
            .filter(|e| generation.handlers.contains(&e.name))
            .collect();
        sort_by_checkpoint(&mut events);
        debug_assert!(is_ordered(&events));

        if guard.ensure_active().is_err() {
            return Ok(self.cancelled(&generation));
        }

        generation
            .queue
            .extend(events.into_iter().map(|e| HandlerTask::Event(Box::new(e))));
        let queued = generation.queue.len();
        let handled_before = generation.handled.load(Ordering::Acquire);
        self.emit(ProgressEvent::EventsAdded {
            handled_count: handled_before,
            total_count: handled_before + queued,
            from_timestamp,
            to_timestamp,
        });

        let count = match self.drain(&generation, &guard).await {
            Drain::Completed(count) => count,
            Drain::Cancelled => return Ok(self.cancelled(&generation)),
            Drain::Failed(error) => return Ok(CycleOutcome::HandlerFailed(error)),
        };

        if guard.ensure_active().is_err() {
            return Ok(self.cancelled(&generation));
        }
        generation.watermark.advance(to_timestamp);

        self.emit(ProgressEvent::EventsProcessed { count, to_timestamp });
        self.emit(ProgressEvent::TaskCompleted {
            timestamp: Some(to_timestamp),
        });

        let elapsed_ms = started.elapsed().as_secs_f64() * 1_000.0;
        if let Some(observer) = &self.observer {
            observer.cycle_completed(queued, elapsed_ms);
        }
        info!(
            generation = generation.id,
            count,
            from_timestamp,
            to_timestamp,
            elapsed_ms,
            "processed events"
        );

        Ok(CycleOutcome::Processed {
            count,
            from_timestamp,
            to_timestamp,
        })
    }

    async fn drain(&self, generation: &Generation, guard: &CycleGuard) -> Drain {
        let mut count = 0;
        while let Some(task) = generation.queue.pop() {
            if guard.is_cancelled() {
                return Drain::Cancelled;
            }

            let ctx = self.context(generation, &task);
            let run = AssertUnwindSafe(run_task(&generation.handlers, &task, &ctx)).catch_unwind();
            let result = tokio::select! {
                biased;
                _ = guard.cancelled() => return Drain::Cancelled,
                result = run => result.unwrap_or_else(|panic| Err(HandlerError::from_panic(panic))),
            };

            match result {
                Ok(()) => {
                    count += 1;
                    generation.handled.fetch_add(1, Ordering::AcqRel);
                    if let Some(observer) = &self.observer {
                        observer.event_handled(task.name());
                    }
                }
                Err(err) => {
                    let user_error = user_error(generation.id, &task, err);
                    if !self.submit_if_current(generation, user_error.clone()) {
                        return Drain::Cancelled;
                    }
                    let discarded = generation.queue.clear();
                    error!(
                        generation = generation.id,
                        handler = %user_error.handler,
                        block = ?user_error.block_number,
                        discarded,
                        message = %user_error.message,
                        "handler failed; halting until reset"
                    );
                    if let Some(observer) = &self.observer {
                        observer.handler_error(task.name());
                    }
                    return Drain::Failed(Box::new(user_error));
                }
            }
        }
        Drain::Completed(count)
    }

    fn context(&self, generation: &Generation, task: &HandlerTask) -> HandlerContext {
        let (network, chain_id, block_number) = match task {
            HandlerTask::Event(event) => (
                generation.sources.get(event.source_index).map(|s| s.network.clone()),
                event.chain_id,
                event.block_number(),
            ),
            HandlerTask::Setup => match generation.sources.first() {
                Some(source) => (Some(source.network.clone()), source.chain_id(), source.start_block),
                None => (None, 0, 0),
            },
        };
        HandlerContext {
            db: Arc::clone(&generation.store),
            network,
            client: BoundClient::new(self.reader.clone(), chain_id, block_number),
        }
    }

    /// Submit `error` unless `generation` has been replaced.
    ///
    /// Holds the read side of the generation slot while submitting, so a
    /// reset either happens first (and the error is dropped) or clears the
    /// sink after this error landed.
    fn submit_if_current(&self, generation: &Generation, error: UserError) -> bool {
        let current = self.current.read().unwrap_or_else(|e| e.into_inner());
        if current.id != generation.id || current.lock.is_cancelled() {
            return false;
        }
        self.sink.submit_handler_error(error);
        true
    }

    /// Mark `generation` halted and hand the error back.
    fn fatal(&self, generation: &Generation, err: IndexerError) -> IndexerError {
        generation.fatal.store(true, Ordering::Release);
        error!(generation = generation.id, error = %err, "halting until reset");
        err
    }

    fn cancelled(&self, generation: &Generation) -> CycleOutcome {
        warn!(generation = generation.id, "cycle cancelled by reset");
        CycleOutcome::Cancelled
    }

    /// Replace sources, handlers, and store. Returns the new generation id.
    ///
    /// The cache is untouched; the new generation re-reads it from timestamp 0.
    pub fn reset(&self, config: GenerationConfig) -> Result<u64, ConfigError> {
        config.handlers.validate(&config.sources)?;

        let id = self.next_generation.fetch_add(1, Ordering::AcqRel);
        let fresh = Arc::new(Generation::new(id, config));

        let previous = {
            let mut current = self.current.write().unwrap_or_else(|e| e.into_inner());
            current.lock.cancel();
            self.sink.clear();
            std::mem::replace(&mut *current, fresh)
        };
        let discarded = previous.queue.clear();

        self.emit(ProgressEvent::EventQueueReset);
        info!(
            previous = previous.id,
            generation = id,
            discarded,
            "event queue reset"
        );
        Ok(id)
    }

    /// Run cycles until `shutdown` fires, sleeping `poll_interval` whenever
    /// there is nothing to do. Returns early on a fatal cache error.
    pub async fn run(&self, poll_interval: Duration, shutdown: CancellationToken) -> Result<(), IndexerError> {
        loop {
            if shutdown.is_cancelled() {
                return Ok(());
            }
            let outcome = tokio::select! {
                biased;
                _ = shutdown.cancelled() => return Ok(()),
                outcome = self.process_new_events() => outcome?,
            };
            match outcome {
                CycleOutcome::Processed { .. } | CycleOutcome::Cancelled => continue,
                CycleOutcome::NoNewEvents | CycleOutcome::Halted | CycleOutcome::HandlerFailed(_) => {
                    tokio::select! {
                        _ = shutdown.cancelled() => return Ok(()),
                        _ = tokio::time::sleep(poll_interval) => {}
                    }
                }
            }
        }
    }

    /// Cancel the current generation and stop the decode workers.
    pub fn shutdown(&self) {
        self.current().lock.cancel();
        self.pool.shutdown();
    }
}

enum Drain {
    Completed(usize),
    Cancelled,
    Failed(Box<UserError>),
}

async fn run_task(handlers: &HandlerRegistry, task: &HandlerTask, ctx: &HandlerContext) -> Result<(), HandlerError> {
    match task {
        HandlerTask::Setup => match handlers.setup() {
            Some(setup) => setup.setup(ctx).await,
            None => Ok(()),
        },
        HandlerTask::Event(event) => match handlers.get(&event.name) {
            Some(handler) => handler.handle(event, ctx).await,
            None => Ok(()),
        },
    }
}

fn user_error(generation: u64, task: &HandlerTask, err: HandlerError) -> UserError {
    let (block_number, chain_id, params) = match task {
        HandlerTask::Setup => (None, None, serde_json::Value::Null),
        HandlerTask::Event(event) => (Some(event.block_number()), Some(event.chain_id), event.params_json()),
    };
    UserError {
        generation,
        handler: task.name().to_string(),
        block_number,
        chain_id,
        params,
        message: err.message(),
        causes: err.causes(),
        code_frame: err.code_frame(),
        backtrace: err.backtrace(),
    }
}
