//! End-to-end cycles through the handler engine, backed by the in-memory cache.

use std::sync::{Arc, Mutex};

use alloy_core::dyn_abi::DynSolValue;
use alloy_json_abi::JsonAbi;
use alloy_primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use tokio::sync::Notify;

use chainflow_core::abi::AbiIndex;
use chainflow_core::cache::CachedInterval;
use chainflow_core::event::Event;
use chainflow_core::handler::{EventHandler, HandlerContext, HandlerError, HandlerRegistry, SetupHandler};
use chainflow_core::progress::ProgressEvent;
use chainflow_core::sink::{ErrorSink, MemoryErrorSink};
use chainflow_core::source::{AddressFilter, Network, Source};
use chainflow_core::types::{Block, Log, Transaction};
use chainflow_evm::{CycleOutcome, EngineBuilder, GenerationConfig, HandlerEngine};
use chainflow_storage::{InMemoryCache, InMemoryEntityStore};

const PAIR_ABI: &str = r#"[
    {"type":"event","name":"Sync","anonymous":false,"inputs":[
        {"name":"reserve0","type":"uint112","indexed":false},
        {"name":"reserve1","type":"uint112","indexed":false}]}
]"#;

fn pair_address() -> Address {
    Address::repeat_byte(0x77)
}

fn sync_selector() -> B256 {
    let abi: JsonAbi = serde_json::from_str(PAIR_ABI).unwrap();
    abi.events["Sync"][0].selector()
}

fn pair_source(name: &str, network: Network, start_block: u64) -> Source {
    let abi = Arc::new(AbiIndex::from_json(PAIR_ABI).unwrap());
    Source::log(name, network, AddressFilter::single(pair_address()), abi, start_block)
}

fn block_hash(chain_id: u64, number: u64) -> B256 {
    B256::from(U256::from(chain_id * 1_000_000 + number))
}

fn tx_hash(chain_id: u64, number: u64, index: u64) -> B256 {
    let mut hash = B256::from(U256::from((chain_id * 1_000_000 + number) * 1_000 + index));
    hash.0[0] = 0xff;
    hash
}

/// Builds cache rows for one chain.
struct ChainBuilder<'a> {
    cache: &'a InMemoryCache,
    chain_id: u64,
}

impl ChainBuilder<'_> {
    fn block(&self, number: u64, timestamp: u64) -> &Self {
        self.cache.insert_block(
            self.chain_id,
            Block {
                hash: block_hash(self.chain_id, number),
                parent_hash: block_hash(self.chain_id, number.saturating_sub(1)),
                number,
                timestamp,
                miner: Address::ZERO,
                gas_limit: 30_000_000,
                gas_used: 0,
                base_fee_per_gas: None,
            },
        );
        self
    }

    /// A `Sync(reserve0, reserve1)` log in transaction `tx` of `number`.
    fn sync(&self, number: u64, tx: u64, log_index: u64, reserve0: u64, reserve1: u64) -> &Self {
        self.transaction(number, tx)
            .sync_log(number, tx, log_index, reserve0, reserve1)
    }

    fn transaction(&self, number: u64, tx: u64) -> &Self {
        self.cache.insert_transaction(
            self.chain_id,
            Transaction {
                hash: tx_hash(self.chain_id, number, tx),
                block_hash: block_hash(self.chain_id, number),
                block_number: number,
                transaction_index: tx,
                from: Address::repeat_byte(0xaa),
                to: Some(pair_address()),
                input: Bytes::new(),
                value: U256::ZERO,
                nonce: tx,
                gas: 21_000,
            },
        );
        self
    }

    /// Only the log row; the transaction it references is not inserted.
    fn sync_log(&self, number: u64, tx: u64, log_index: u64, reserve0: u64, reserve1: u64) -> &Self {
        let mut data = DynSolValue::Uint(U256::from(reserve0), 112).abi_encode();
        data.extend(DynSolValue::Uint(U256::from(reserve1), 112).abi_encode());
        self.cache.insert_log(
            self.chain_id,
            Log {
                address: pair_address(),
                topics: vec![sync_selector()],
                data: data.into(),
                block_hash: block_hash(self.chain_id, number),
                block_number: number,
                log_index,
                transaction_hash: tx_hash(self.chain_id, number, tx),
                transaction_index: tx,
            },
        );
        self
    }
}

fn chain(cache: &InMemoryCache, chain_id: u64) -> ChainBuilder<'_> {
    ChainBuilder { cache, chain_id }
}

fn anchor(cache: &InMemoryCache, source: &Source, start_block: u64, end_block: u64, end_block_timestamp: u64) {
    cache.insert_interval(CachedInterval {
        source_key: source.cache_key(),
        start_block,
        end_block,
        end_block_timestamp,
    });
}

/// Records `name@block` for every event it sees.
#[derive(Clone, Default)]
struct Recorder {
    seen: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
    fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }

    fn push(&self, entry: String) {
        self.seen.lock().unwrap().push(entry);
    }
}

#[async_trait]
impl EventHandler for Recorder {
    async fn handle(&self, event: &Event, _ctx: &HandlerContext) -> Result<(), HandlerError> {
        self.push(format!("{}@{}", event.name, event.block_number()));
        Ok(())
    }
}

#[async_trait]
impl SetupHandler for Recorder {
    async fn setup(&self, _ctx: &HandlerContext) -> Result<(), HandlerError> {
        self.push("setup".into());
        Ok(())
    }
}

/// Fails on the `fail_on`-th call (1-based).
struct FailOn {
    fail_on: usize,
    calls: Mutex<usize>,
}

#[async_trait]
impl EventHandler for FailOn {
    async fn handle(&self, event: &Event, _ctx: &HandlerContext) -> Result<(), HandlerError> {
        let mut calls = self.calls.lock().unwrap();
        *calls += 1;
        if *calls == self.fail_on {
            return Err(HandlerError::msg(format!("reserve check failed at block {}", event.block_number())));
        }
        Ok(())
    }
}

/// Signals `started`, then waits forever on `release`.
struct Blocking {
    started: Arc<Notify>,
    release: Arc<Notify>,
}

#[async_trait]
impl EventHandler for Blocking {
    async fn handle(&self, _event: &Event, _ctx: &HandlerContext) -> Result<(), HandlerError> {
        self.started.notify_one();
        self.release.notified().await;
        Ok(())
    }
}

fn registry(name: &str, handler: Arc<dyn EventHandler>) -> HandlerRegistry {
    let mut handlers = HandlerRegistry::new();
    handlers.on_event(name, handler).unwrap();
    handlers
}

fn engine(
    cache: Arc<InMemoryCache>,
    sources: Vec<Source>,
    handlers: HandlerRegistry,
    sink: Arc<MemoryErrorSink>,
) -> HandlerEngine {
    EngineBuilder::new(cache, Arc::new(InMemoryEntityStore::new()))
        .sources(sources)
        .handlers(handlers)
        .error_sink(sink)
        .decode_workers(2)
        .build()
        .unwrap()
}

/// Three syncs inside the cached range `[100, 200]` and one past it.
fn seeded_pair() -> (Arc<InMemoryCache>, Source) {
    let mainnet = Network::new("mainnet", 1);
    let source = pair_source("Pair", mainnet, 100);
    let cache = Arc::new(InMemoryCache::new());
    chain(&cache, 1)
        .block(100, 1_000)
        .block(150, 3_000)
        .block(200, 5_000)
        .block(201, 6_000)
        .sync(100, 0, 0, 10, 20)
        .sync(150, 1, 3, 11, 21)
        .sync(200, 0, 0, 12, 22)
        .sync(201, 0, 0, 13, 23);
    anchor(&cache, &source, 100, 200, 5_000);
    (cache, source)
}

#[tokio::test]
async fn processes_everything_up_to_the_cached_bound() {
    let (cache, source) = seeded_pair();
    let recorder = Recorder::default();
    let engine = engine(
        cache,
        vec![source],
        registry("Pair:Sync", Arc::new(recorder.clone())),
        Arc::new(MemoryErrorSink::new()),
    );

    let outcome = engine.process_new_events().await.unwrap();
    assert_eq!(
        outcome,
        CycleOutcome::Processed {
            count: 3,
            from_timestamp: 0,
            to_timestamp: 5_000,
        }
    );
    assert_eq!(engine.watermark(), 5_000);
    assert_eq!(recorder.seen(), ["Pair:Sync@100", "Pair:Sync@150", "Pair:Sync@200"]);
    assert_eq!(engine.queued(), 0);
    engine.shutdown();
}

#[tokio::test]
async fn second_cycle_without_new_data_is_a_no_op() {
    let (cache, source) = seeded_pair();
    let recorder = Recorder::default();
    let engine = engine(
        cache,
        vec![source],
        registry("Pair:Sync", Arc::new(recorder.clone())),
        Arc::new(MemoryErrorSink::new()),
    );

    engine.process_new_events().await.unwrap();
    let outcome = engine.process_new_events().await.unwrap();
    assert_eq!(outcome, CycleOutcome::NoNewEvents);
    assert_eq!(engine.watermark(), 5_000);
    assert_eq!(recorder.seen().len(), 3);
    engine.shutdown();
}

#[tokio::test]
async fn cache_growth_is_picked_up_by_the_next_cycle() {
    let (cache, source) = seeded_pair();
    let recorder = Recorder::default();
    let engine = engine(
        Arc::clone(&cache),
        vec![source.clone()],
        registry("Pair:Sync", Arc::new(recorder.clone())),
        Arc::new(MemoryErrorSink::new()),
    );

    engine.process_new_events().await.unwrap();
    anchor(&cache, &source, 201, 201, 6_000);

    let outcome = engine.process_new_events().await.unwrap();
    assert_eq!(
        outcome,
        CycleOutcome::Processed {
            count: 1,
            from_timestamp: 5_000,
            to_timestamp: 6_000,
        }
    );
    assert_eq!(recorder.seen().last().unwrap(), "Pair:Sync@201");
    engine.shutdown();
}

#[tokio::test]
async fn unanchored_source_holds_processing_back() {
    let mainnet = Network::new("mainnet", 1);
    let source = pair_source("Pair", mainnet, 100);
    let cache = Arc::new(InMemoryCache::new());
    chain(&cache, 1).block(150, 3_000).sync(150, 0, 0, 1, 1);
    // cached, but not from the start block
    anchor(&cache, &source, 140, 200, 5_000);

    let recorder = Recorder::default();
    let engine = engine(
        cache,
        vec![source],
        registry("Pair:Sync", Arc::new(recorder.clone())),
        Arc::new(MemoryErrorSink::new()),
    );

    assert_eq!(engine.process_new_events().await.unwrap(), CycleOutcome::NoNewEvents);
    assert_eq!(engine.watermark(), 0);
    assert!(recorder.seen().is_empty());
    engine.shutdown();
}

#[tokio::test]
async fn slowest_source_bounds_the_watermark() {
    let cache = Arc::new(InMemoryCache::new());
    let fast = pair_source("Fast", Network::new("mainnet", 1), 100);
    let slow = pair_source("Slow", Network::new("optimism", 10), 100);
    chain(&cache, 1).block(100, 1_000).block(150, 4_000).sync(100, 0, 0, 1, 1).sync(150, 0, 0, 2, 2);
    chain(&cache, 10).block(100, 2_000).sync(100, 0, 0, 3, 3);
    anchor(&cache, &fast, 100, 150, 4_000);
    anchor(&cache, &slow, 100, 100, 2_000);

    let recorder = Recorder::default();
    let mut handlers = HandlerRegistry::new();
    handlers.on_event("Fast:Sync", Arc::new(recorder.clone())).unwrap();
    handlers.on_event("Slow:Sync", Arc::new(recorder.clone())).unwrap();
    let engine = engine(cache, vec![fast, slow], handlers, Arc::new(MemoryErrorSink::new()));

    let outcome = engine.process_new_events().await.unwrap();
    assert!(matches!(outcome, CycleOutcome::Processed { to_timestamp: 2_000, .. }));
    assert_eq!(recorder.seen(), ["Fast:Sync@100", "Slow:Sync@100"]);
    engine.shutdown();
}

#[tokio::test]
async fn events_from_several_chains_interleave_by_timestamp() {
    let cache = Arc::new(InMemoryCache::new());
    let mainnet = pair_source("Mainnet", Network::new("mainnet", 1), 10);
    let arbitrum = pair_source("Arbitrum", Network::new("arbitrum", 42161), 500);
    chain(&cache, 1)
        .block(10, 100)
        .block(11, 112)
        .sync(10, 0, 0, 1, 1)
        .sync(11, 2, 7, 1, 1)
        .sync(11, 0, 1, 1, 1);
    chain(&cache, 42161)
        .block(500, 100)
        .block(501, 105)
        .sync(500, 0, 0, 1, 1)
        .sync(501, 0, 0, 1, 1);
    anchor(&cache, &mainnet, 10, 11, 112);
    anchor(&cache, &arbitrum, 500, 501, 120);

    let recorder = Recorder::default();
    let mut handlers = HandlerRegistry::new();
    handlers.on_event("Mainnet:Sync", Arc::new(recorder.clone())).unwrap();
    handlers.on_event("Arbitrum:Sync", Arc::new(recorder.clone())).unwrap();
    let engine = engine(cache, vec![mainnet, arbitrum], handlers, Arc::new(MemoryErrorSink::new()));

    engine.process_new_events().await.unwrap();
    // equal timestamps fall back to chain id
    assert_eq!(
        recorder.seen(),
        [
            "Mainnet:Sync@10",
            "Arbitrum:Sync@500",
            "Arbitrum:Sync@501",
            "Mainnet:Sync@11",
            "Mainnet:Sync@11",
        ]
    );
    engine.shutdown();
}

#[tokio::test]
async fn block_events_follow_the_logs_of_their_block() {
    let (cache, pair) = seeded_pair();
    let blocks = Source::block("Blocks", Network::new("mainnet", 1), 100, 50);
    anchor(&cache, &blocks, 100, 200, 5_000);

    let recorder = Recorder::default();
    let mut handlers = HandlerRegistry::new();
    handlers.on_event("Pair:Sync", Arc::new(recorder.clone())).unwrap();
    handlers.on_event("Blocks:block", Arc::new(recorder.clone())).unwrap();
    let engine = engine(cache, vec![pair, blocks], handlers, Arc::new(MemoryErrorSink::new()));

    engine.process_new_events().await.unwrap();
    assert_eq!(
        recorder.seen(),
        [
            "Pair:Sync@100",
            "Blocks:block@100",
            "Pair:Sync@150",
            "Blocks:block@150",
            "Pair:Sync@200",
            "Blocks:block@200",
        ]
    );
    engine.shutdown();
}

#[tokio::test]
async fn events_without_a_handler_are_skipped() {
    let (cache, pair) = seeded_pair();
    let blocks = Source::block("Blocks", Network::new("mainnet", 1), 100, 1);
    anchor(&cache, &blocks, 100, 200, 5_000);

    let recorder = Recorder::default();
    let engine = engine(
        cache,
        vec![pair, blocks],
        registry("Blocks:block", Arc::new(recorder.clone())),
        Arc::new(MemoryErrorSink::new()),
    );

    let outcome = engine.process_new_events().await.unwrap();
    assert!(matches!(outcome, CycleOutcome::Processed { count: 3, .. }));
    assert!(recorder.seen().iter().all(|s| s.starts_with("Blocks:block")));
    engine.shutdown();
}

#[tokio::test]
async fn setup_runs_before_the_first_event() {
    let (cache, source) = seeded_pair();
    let recorder = Recorder::default();
    let mut handlers = registry("Pair:Sync", Arc::new(recorder.clone()));
    handlers.on_setup(Arc::new(recorder.clone()));
    let engine = engine(cache, vec![source], handlers, Arc::new(MemoryErrorSink::new()));

    let outcome = engine.process_new_events().await.unwrap();
    assert!(matches!(outcome, CycleOutcome::Processed { count: 4, .. }));
    assert_eq!(recorder.seen()[0], "setup");
    assert_eq!(recorder.seen().len(), 4);
    engine.shutdown();
}

#[tokio::test]
async fn handler_failure_halts_until_reset() {
    let mainnet = Network::new("mainnet", 1);
    let source = pair_source("Pair", mainnet, 1);
    let cache = Arc::new(InMemoryCache::new());
    for n in 1..=5 {
        chain(&cache, 1).block(n, n * 12).sync(n, 0, 0, n, n);
    }
    anchor(&cache, &source, 1, 5, 60);

    let failing = Arc::new(FailOn {
        fail_on: 3,
        calls: Mutex::new(0),
    });
    let sink = Arc::new(MemoryErrorSink::new());
    let engine = engine(
        cache,
        vec![source.clone()],
        registry("Pair:Sync", failing.clone()),
        Arc::clone(&sink),
    );

    let outcome = engine.process_new_events().await.unwrap();
    let CycleOutcome::HandlerFailed(error) = outcome else {
        panic!("expected a handler failure, got {outcome:?}");
    };
    assert_eq!(error.handler, "Pair:Sync");
    assert_eq!(error.block_number, Some(3));
    assert_eq!(error.chain_id, Some(1));
    assert!(error.message.contains("block 3"));
    assert_eq!(error.params["reserve0"], serde_json::json!(3));

    // tasks 4 and 5 never ran
    assert_eq!(*failing.calls.lock().unwrap(), 3);
    assert_eq!(sink.errors().len(), 1);
    assert!(sink.is_handler_error());
    assert!(engine.is_halted());
    assert_eq!(engine.watermark(), 0);
    assert_eq!(engine.queued(), 0);

    assert_eq!(engine.process_new_events().await.unwrap(), CycleOutcome::Halted);
    assert_eq!(*failing.calls.lock().unwrap(), 3);

    let recorder = Recorder::default();
    engine
        .reset(GenerationConfig {
            sources: vec![source],
            handlers: registry("Pair:Sync", Arc::new(recorder.clone())),
            store: Arc::new(InMemoryEntityStore::new()),
        })
        .unwrap();
    assert!(!engine.is_halted());

    let outcome = engine.process_new_events().await.unwrap();
    assert!(matches!(outcome, CycleOutcome::Processed { count: 5, .. }));
    assert_eq!(recorder.seen().len(), 5);
    engine.shutdown();
}

#[tokio::test]
async fn missing_cache_row_halts_until_reset() {
    let mainnet = Network::new("mainnet", 1);
    let source = pair_source("Pair", mainnet, 1);
    let cache = Arc::new(InMemoryCache::new());
    chain(&cache, 1).block(1, 12).block(2, 24).sync(1, 0, 0, 1, 1).sync_log(2, 0, 0, 2, 2);
    anchor(&cache, &source, 1, 2, 24);

    let recorder = Recorder::default();
    let sink = Arc::new(MemoryErrorSink::new());
    let engine = engine(
        Arc::clone(&cache),
        vec![source.clone()],
        registry("Pair:Sync", Arc::new(recorder.clone())),
        Arc::clone(&sink),
    );

    let err = engine.process_new_events().await.unwrap_err();
    assert!(err.is_missing_data(), "unexpected error: {err}");
    assert!(engine.is_halted());
    // nothing from the broken batch reached a handler
    assert!(recorder.seen().is_empty());
    assert_eq!(engine.watermark(), 0);
    assert!(sink.errors().is_empty());

    // the row showing up later does not resume the generation
    chain(&cache, 1).transaction(2, 0);
    assert_eq!(engine.process_new_events().await.unwrap(), CycleOutcome::Halted);
    assert!(recorder.seen().is_empty());

    engine
        .reset(GenerationConfig {
            sources: vec![source],
            handlers: registry("Pair:Sync", Arc::new(recorder.clone())),
            store: Arc::new(InMemoryEntityStore::new()),
        })
        .unwrap();
    assert!(!engine.is_halted());

    let outcome = engine.process_new_events().await.unwrap();
    assert!(matches!(outcome, CycleOutcome::Processed { count: 2, .. }));
    assert_eq!(recorder.seen(), ["Pair:Sync@1", "Pair:Sync@2"]);
    engine.shutdown();
}

#[tokio::test]
async fn handler_error_carries_its_generation() {
    let (cache, source) = seeded_pair();
    let failing = Arc::new(FailOn {
        fail_on: 1,
        calls: Mutex::new(0),
    });
    let sink = Arc::new(MemoryErrorSink::new());
    let engine = engine(
        cache,
        vec![source.clone()],
        registry("Pair:Sync", Arc::new(Recorder::default())),
        Arc::clone(&sink),
    );

    let generation = engine
        .reset(GenerationConfig {
            sources: vec![source],
            handlers: registry("Pair:Sync", failing),
            store: Arc::new(InMemoryEntityStore::new()),
        })
        .unwrap();
    assert_eq!(generation, 2);

    let outcome = engine.process_new_events().await.unwrap();
    let CycleOutcome::HandlerFailed(error) = outcome else {
        panic!("expected a handler failure, got {outcome:?}");
    };
    assert_eq!(error.generation, 2);
    assert_eq!(sink.errors()[0].generation, 2);
    engine.shutdown();
}

#[tokio::test]
async fn panicking_handler_is_reported_as_a_handler_error() {
    struct Panics;

    #[async_trait]
    impl EventHandler for Panics {
        async fn handle(&self, _event: &Event, _ctx: &HandlerContext) -> Result<(), HandlerError> {
            panic!("reserve underflow");
        }
    }

    let (cache, source) = seeded_pair();
    let sink = Arc::new(MemoryErrorSink::new());
    let engine = engine(cache, vec![source], registry("Pair:Sync", Arc::new(Panics)), Arc::clone(&sink));

    let outcome = engine.process_new_events().await.unwrap();
    let CycleOutcome::HandlerFailed(error) = outcome else {
        panic!("expected a handler failure, got {outcome:?}");
    };
    assert!(error.message.contains("reserve underflow"));
    assert_eq!(error.block_number, Some(100));
    assert!(engine.is_halted());
    engine.shutdown();
}

#[tokio::test]
async fn reset_cancels_the_cycle_in_flight() {
    let (cache, source) = seeded_pair();
    let started = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let blocking = Arc::new(Blocking {
        started: Arc::clone(&started),
        release,
    });
    let engine = engine(
        cache,
        vec![source.clone()],
        registry("Pair:Sync", blocking),
        Arc::new(MemoryErrorSink::new()),
    );
    let mut progress = engine.subscribe();
    assert_eq!(engine.generation(), 1);

    let recorder = Recorder::default();
    let (outcome, generation) = tokio::join!(engine.process_new_events(), async {
        started.notified().await;
        engine
            .reset(GenerationConfig {
                sources: vec![source.clone()],
                handlers: registry("Pair:Sync", Arc::new(recorder.clone())),
                store: Arc::new(InMemoryEntityStore::new()),
            })
            .unwrap()
    });
    assert_eq!(outcome.unwrap(), CycleOutcome::Cancelled);
    assert_eq!(generation, 2);
    assert_eq!(engine.generation(), 2);
    assert_eq!(engine.watermark(), 0);

    let outcome = engine.process_new_events().await.unwrap();
    assert_eq!(
        outcome,
        CycleOutcome::Processed {
            count: 3,
            from_timestamp: 0,
            to_timestamp: 5_000,
        }
    );
    assert_eq!(recorder.seen().len(), 3);

    let mut events = Vec::new();
    while let Ok(event) = progress.try_recv() {
        events.push(event);
    }
    let reset_at = events
        .iter()
        .position(|e| *e == ProgressEvent::EventQueueReset)
        .unwrap();
    let processed_at = events
        .iter()
        .position(|e| matches!(e, ProgressEvent::EventsProcessed { .. }))
        .unwrap();
    // the cancelled cycle published nothing past its EventsAdded
    assert!(processed_at > reset_at);
    assert_eq!(
        events.iter().filter(|e| matches!(e, ProgressEvent::EventsProcessed { .. })).count(),
        1
    );
    engine.shutdown();
}

#[tokio::test]
async fn progress_events_describe_the_cycle() {
    let (cache, source) = seeded_pair();
    let engine = engine(
        cache,
        vec![source],
        registry("Pair:Sync", Arc::new(Recorder::default())),
        Arc::new(MemoryErrorSink::new()),
    );
    let mut progress = engine.subscribe();

    engine.process_new_events().await.unwrap();

    let mut events = Vec::new();
    while let Ok(event) = progress.try_recv() {
        events.push(event);
    }
    assert_eq!(
        events,
        [
            ProgressEvent::TaskStarted,
            ProgressEvent::EventsAdded {
                handled_count: 0,
                total_count: 3,
                from_timestamp: 0,
                to_timestamp: 5_000,
            },
            ProgressEvent::EventsProcessed {
                count: 3,
                to_timestamp: 5_000,
            },
            ProgressEvent::TaskCompleted { timestamp: Some(5_000) },
        ]
    );
    engine.shutdown();
}

#[tokio::test]
async fn reset_rejects_handlers_for_unknown_events() {
    let (cache, source) = seeded_pair();
    let engine = engine(
        cache,
        vec![source.clone()],
        registry("Pair:Sync", Arc::new(Recorder::default())),
        Arc::new(MemoryErrorSink::new()),
    );

    let result = engine.reset(GenerationConfig {
        sources: vec![source],
        handlers: registry("Pair:Mint", Arc::new(Recorder::default())),
        store: Arc::new(InMemoryEntityStore::new()),
    });
    assert!(result.is_err());
    assert_eq!(engine.generation(), 1);
    engine.shutdown();
}
