//! chainflow-core: foundation for the cache-driven, replayable indexing engine.
//!
//! # Architecture
//!
//! ```text
//! CacheStore ──► CacheAccessor ──► watermark (min coverage over sources)
//!                                      │
//!                                      ▼
//!                         RawEvent batch ──► decode pool (chainflow-evm)
//!                                                  │
//!                                                  ▼
//!                      ordering (checkpoint merge) ──► TaskQueue
//!                                                  │
//!                                                  ▼
//!                 CycleLock ──► HandlerRegistry ──► EntityStore / ErrorSink
//! ```

pub mod abi;
pub mod cache;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod event;
pub mod handler;
pub mod lock;
pub mod ordering;
pub mod progress;
pub mod queue;
pub mod sink;
pub mod source;
pub mod store;
pub mod types;
pub mod watermark;

pub use abi::AbiIndex;
pub use cache::{CacheAccessor, CacheStore, CachedInterval};
pub use checkpoint::{Checkpoint, EventType};
pub use config::ChainflowConfig;
pub use error::{ConfigError, IndexerError, StoreError};
pub use event::{DecodedArgs, DecodedValue, Event, EventData, HandlerTask, RawEvent, RawEventData};
pub use handler::{
    BoundClient, ContractCall, ContractReader, EventHandler, HandlerContext, HandlerError,
    HandlerRegistry, SetupHandler,
};
pub use lock::{Cancelled, CycleGuard, CycleLock};
pub use progress::{EngineObserver, ProgressEvent};
pub use queue::TaskQueue;
pub use sink::{ErrorSink, MemoryErrorSink, UserError};
pub use source::{AddressFilter, FilterKind, Network, Source, SourceKind};
pub use store::{Entity, EntityStore};
pub use types::{Block, CallTrace, Log, Transaction, TransactionReceipt};
pub use watermark::{NewEvents, ProcessingWatermark};
