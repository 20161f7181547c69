//! Fluent builder API for creating a [`HandlerEngine`].
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use chainflow_core::{HandlerRegistry, MemoryErrorSink};
//! use chainflow_evm::EngineBuilder;
//! use chainflow_storage::{InMemoryCache, InMemoryEntityStore};
//!
//! let engine = EngineBuilder::new(Arc::new(InMemoryCache::new()), Arc::new(InMemoryEntityStore::new()))
//!     .handlers(HandlerRegistry::new())
//!     .error_sink(Arc::new(MemoryErrorSink::new()))
//!     .decode_workers(4)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

use chainflow_core::cache::{CacheAccessor, CacheStore};
use chainflow_core::config::EngineConfig;
use chainflow_core::error::IndexerError;
use chainflow_core::handler::{ContractReader, HandlerRegistry};
use chainflow_core::progress::EngineObserver;
use chainflow_core::sink::{ErrorSink, MemoryErrorSink};
use chainflow_core::source::Source;
use chainflow_core::store::EntityStore;

use crate::engine::{GenerationConfig, HandlerEngine};
use crate::pool::{default_size, DecodePool};

pub struct EngineBuilder {
    cache: Arc<dyn CacheStore>,
    store: Arc<dyn EntityStore>,
    sources: Vec<Source>,
    handlers: HandlerRegistry,
    sink: Option<Arc<dyn ErrorSink>>,
    reader: Option<Arc<dyn ContractReader>>,
    observer: Option<Arc<dyn EngineObserver>>,
    decode_workers: Option<usize>,
    progress_capacity: usize,
}

impl EngineBuilder {
    pub fn new(cache: Arc<dyn CacheStore>, store: Arc<dyn EntityStore>) -> Self {
        let defaults = EngineConfig::default();
        Self {
            cache,
            store,
            sources: vec![],
            handlers: HandlerRegistry::new(),
            sink: None,
            reader: None,
            observer: None,
            decode_workers: defaults.decode_workers,
            progress_capacity: defaults.progress_capacity,
        }
    }

    /// Add one source.
    pub fn source(mut self, source: Source) -> Self {
        self.sources.push(source);
        self
    }

    /// Replace the source list.
    pub fn sources(mut self, sources: Vec<Source>) -> Self {
        self.sources = sources;
        self
    }

    pub fn handlers(mut self, handlers: HandlerRegistry) -> Self {
        self.handlers = handlers;
        self
    }

    /// Defaults to a [`MemoryErrorSink`].
    pub fn error_sink(mut self, sink: Arc<dyn ErrorSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn contract_reader(mut self, reader: Arc<dyn ContractReader>) -> Self {
        self.reader = Some(reader);
        self
    }

    pub fn observer(mut self, observer: Arc<dyn EngineObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Number of decode threads. Defaults to one per CPU core.
    pub fn decode_workers(mut self, n: usize) -> Self {
        self.decode_workers = Some(n);
        self
    }

    pub fn progress_capacity(mut self, capacity: usize) -> Self {
        self.progress_capacity = capacity;
        self
    }

    /// Apply the `engine` section of a config file.
    pub fn engine_config(mut self, config: &EngineConfig) -> Self {
        self.decode_workers = config.decode_workers.or(self.decode_workers);
        self.progress_capacity = config.progress_capacity;
        self
    }

    /// Validate the handler set against the sources and start the decode workers.
    pub fn build(self) -> Result<HandlerEngine, IndexerError> {
        self.handlers.validate(&self.sources)?;

        let workers = self.decode_workers.unwrap_or_else(default_size);
        let pool = DecodePool::new(workers).map_err(|e| IndexerError::Decode(e.to_string()))?;
        let sink = self.sink.unwrap_or_else(|| Arc::new(MemoryErrorSink::new()));

        tracing::info!(
            sources = self.sources.len(),
            handlers = self.handlers.len(),
            setup = self.handlers.has_setup(),
            workers,
            "handler engine ready"
        );

        Ok(HandlerEngine::new(
            CacheAccessor::new(self.cache),
            pool,
            sink,
            self.reader,
            self.observer,
            self.progress_capacity,
            GenerationConfig {
                sources: self.sources,
                handlers: self.handlers,
                store: self.store,
            },
        ))
    }
}
