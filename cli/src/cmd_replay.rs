//! `chainflow replay`: run a cache fixture through the handler engine.
//!
//! Every addressable event name gets a handler that writes the decoded event
//! into the `events` table, keyed by event name and encoded checkpoint.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::json;

use chainflow_core::checkpoint::Checkpoint;
use chainflow_core::event::Event;
use chainflow_core::handler::{EventHandler, HandlerContext, HandlerError, HandlerRegistry};
use chainflow_core::source::{Source, SourceKind};
use chainflow_core::store::Entity;
use chainflow_evm::{CycleOutcome, EngineBuilder};
use chainflow_observability::EngineMetrics;
use chainflow_storage::{CacheFixture, InMemoryEntityStore};

use crate::app_config::AppConfig;

const EVENTS_TABLE: &str = "events";

struct RecordingHandler;

#[async_trait]
impl EventHandler for RecordingHandler {
    async fn handle(&self, event: &Event, ctx: &HandlerContext) -> Result<(), HandlerError> {
        let mut row = Entity::new();
        row.insert("name".into(), json!(event.name));
        row.insert("chainId".into(), json!(event.chain_id));
        row.insert("blockNumber".into(), json!(event.block_number()));
        row.insert("params".into(), event.params_json());
        ctx.db.create(EVENTS_TABLE, &row_key(&event.name, &event.checkpoint), row).await?;
        Ok(())
    }
}

/// Sources that share a filter see the same rows, so the checkpoint alone is not unique.
fn row_key(name: &str, checkpoint: &Checkpoint) -> String {
    format!("{}:{}", name, checkpoint.encode())
}

/// Handler names for everything the sources can produce.
fn addressable_names(source: &Source) -> Vec<String> {
    match &source.kind {
        SourceKind::Block { .. } => vec![source.block_event_name()],
        SourceKind::Log { abi, .. } => abi
            .event_names()
            .into_iter()
            .map(|n| format!("{}:{}", source.name, n))
            .collect(),
        SourceKind::CallTrace { abi, .. } => abi
            .function_names()
            .into_iter()
            .map(|n| format!("{}:{}", source.name, n))
            .collect(),
    }
}

pub async fn run(config_path: &Path, cache_path: &Path, print_json: bool, verbose: bool) -> Result<()> {
    let config = AppConfig::load(config_path)?;
    config.init_logging(verbose);

    let sources = config
        .chainflow
        .build_sources(&AppConfig::base_dir(config_path))
        .with_context(|| format!("validating '{}'", config_path.display()))?;

    let fixture = CacheFixture::load(cache_path)
        .with_context(|| format!("loading cache fixture '{}'", cache_path.display()))?;
    let cache = Arc::new(fixture.into_cache());
    let store = Arc::new(InMemoryEntityStore::new());

    let mut handlers = HandlerRegistry::new();
    let recorder: Arc<dyn EventHandler> = Arc::new(RecordingHandler);
    for source in &sources {
        for name in addressable_names(source) {
            handlers.on_event(name, Arc::clone(&recorder))?;
        }
    }

    let engine = EngineBuilder::new(cache, store.clone())
        .sources(sources)
        .handlers(handlers)
        .engine_config(&config.chainflow.engine)
        .observer(Arc::new(EngineMetrics::global()))
        .build()?;

    let mut cycles = 0usize;
    let mut handled = 0usize;
    let failure = loop {
        match engine.process_new_events().await? {
            CycleOutcome::Processed { count, .. } => {
                cycles += 1;
                handled += count;
            }
            CycleOutcome::Cancelled => continue,
            CycleOutcome::NoNewEvents | CycleOutcome::Halted => break None,
            CycleOutcome::HandlerFailed(error) => break Some(error),
        }
    };
    engine.shutdown();
    tracing::info!(cycles, handled, watermark = engine.watermark(), "replay finished");

    let rows = store.table(EVENTS_TABLE);
    let mut per_name: BTreeMap<String, usize> = BTreeMap::new();
    for (_, row) in &rows {
        let name = row.get("name").and_then(|v| v.as_str()).unwrap_or_default();
        *per_name.entry(name.to_string()).or_default() += 1;
    }

    println!("Replayed '{}'", cache_path.display());
    println!("  Cycles:    {cycles}");
    println!("  Events:    {handled}");
    println!("  Watermark: {}", engine.watermark());
    for (name, count) in &per_name {
        println!("    {name:<40} {count}");
    }

    if print_json {
        let events: Vec<_> = rows
            .into_iter()
            .map(|(id, row)| json!({ "id": id, "event": row }))
            .collect();
        println!("{}", serde_json::to_string_pretty(&events)?);
    }

    if let Some(error) = failure {
        anyhow::bail!("handler failed: {error}");
    }
    Ok(())
}
