//! User handler traits, handler context, and the registry.

use std::any::Any;
use std::backtrace::BacktraceStatus;
use std::collections::HashMap;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;

use alloy_core::dyn_abi::{DynSolValue, FunctionExt, JsonAbiExt};
use alloy_json_abi::Function;
use alloy_primitives::{Address, Bytes};
use async_trait::async_trait;

use crate::error::{ConfigError, IndexerError};
use crate::event::Event;
use crate::source::{Network, Source, SourceKind};
use crate::store::EntityStore;

// ─── HandlerError ─────────────────────────────────────────────────────────────

/// Error returned by user handlers.
///
/// Any `std::error::Error` converts into it with `?`, and the conversion
/// records where it happened; that location becomes the code frame of the
/// reported [`UserError`](crate::sink::UserError).
pub struct HandlerError {
    inner: anyhow::Error,
    location: Option<&'static Location<'static>>,
}

impl HandlerError {
    #[track_caller]
    pub fn msg<M>(message: M) -> Self
    where
        M: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        Self {
            inner: anyhow::Error::msg(message),
            location: Some(Location::caller()),
        }
    }

    #[track_caller]
    pub fn from_anyhow(inner: anyhow::Error) -> Self {
        Self {
            inner,
            location: Some(Location::caller()),
        }
    }

    /// Build from a caught panic payload. Panics carry no usable location here.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "handler panicked".to_string()
        };
        Self {
            inner: anyhow::Error::msg(format!("panic: {message}")),
            location: None,
        }
    }

    pub fn context<C>(self, context: C) -> Self
    where
        C: fmt::Display + Send + Sync + 'static,
    {
        Self {
            inner: self.inner.context(context),
            location: self.location,
        }
    }

    pub fn message(&self) -> String {
        self.inner.to_string()
    }

    /// Messages of the underlying causes, outermost first, excluding the top-level message.
    pub fn causes(&self) -> Vec<String> {
        self.inner.chain().skip(1).map(|e| e.to_string()).collect()
    }

    pub fn location(&self) -> Option<&'static Location<'static>> {
        self.location
    }

    pub fn code_frame(&self) -> Option<String> {
        self.location
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
    }

    /// Only present when backtraces are enabled (`RUST_BACKTRACE` / `RUST_LIB_BACKTRACE`).
    pub fn backtrace(&self) -> Option<String> {
        let bt = self.inner.backtrace();
        match bt.status() {
            BacktraceStatus::Captured => Some(bt.to_string()),
            _ => None,
        }
    }

    pub fn into_inner(self) -> anyhow::Error {
        self.inner
    }
}

impl<E> From<E> for HandlerError
where
    E: std::error::Error + Send + Sync + 'static,
{
    #[track_caller]
    fn from(error: E) -> Self {
        Self {
            inner: anyhow::Error::new(error),
            location: Some(Location::caller()),
        }
    }
}

impl fmt::Debug for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerError")
            .field("message", &self.inner.to_string())
            .field("location", &self.code_frame())
            .finish()
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.inner, f)
    }
}

// ─── Contract reads ───────────────────────────────────────────────────────────

/// A read-only `eth_call`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractCall {
    pub chain_id: u64,
    pub to: Address,
    pub data: Bytes,
    pub block_number: u64,
}

/// Executes read-only contract calls. Transport is the implementor's concern.
#[async_trait]
pub trait ContractReader: Send + Sync {
    async fn call(&self, call: ContractCall) -> Result<Bytes, IndexerError>;
}

/// Contract reader bound to one chain and, by default, the current event's block.
#[derive(Clone)]
pub struct BoundClient {
    reader: Option<Arc<dyn ContractReader>>,
    chain_id: u64,
    block_number: u64,
}

impl BoundClient {
    pub fn new(reader: Option<Arc<dyn ContractReader>>, chain_id: u64, block_number: u64) -> Self {
        Self {
            reader,
            chain_id,
            block_number,
        }
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn block_number(&self) -> u64 {
        self.block_number
    }

    /// The same client, reading at a different block.
    pub fn at_block(&self, block_number: u64) -> Self {
        Self {
            block_number,
            ..self.clone()
        }
    }

    pub async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, IndexerError> {
        let reader = self
            .reader
            .as_ref()
            .ok_or_else(|| IndexerError::ContractRead("no contract reader configured".into()))?;
        reader
            .call(ContractCall {
                chain_id: self.chain_id,
                to,
                data,
                block_number: self.block_number,
            })
            .await
    }

    /// ABI-encode `args` for `function`, call `to`, and decode the outputs.
    pub async fn read_contract(
        &self,
        to: Address,
        function: &Function,
        args: &[DynSolValue],
    ) -> Result<Vec<DynSolValue>, IndexerError> {
        let calldata = function
            .abi_encode_input(args)
            .map_err(|e| IndexerError::ContractRead(format!("{}: {e}", function.name)))?;
        let output = self.call(to, Bytes::from(calldata)).await?;
        function
            .abi_decode_output(&output, true)
            .map_err(|e| IndexerError::ContractRead(format!("{}: {e}", function.name)))
    }
}

// ─── Context ──────────────────────────────────────────────────────────────────

/// What a handler can reach while processing one task.
#[derive(Clone)]
pub struct HandlerContext {
    pub db: Arc<dyn EntityStore>,
    pub network: Option<Network>,
    pub client: BoundClient,
}

// ─── Handler traits ───────────────────────────────────────────────────────────

#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &Event, ctx: &HandlerContext) -> Result<(), HandlerError>;
}

/// Runs once per generation, before the first event.
#[async_trait]
pub trait SetupHandler: Send + Sync {
    async fn setup(&self, ctx: &HandlerContext) -> Result<(), HandlerError>;
}

// ─── Registry ─────────────────────────────────────────────────────────────────

/// Handlers keyed by qualified event name (`Source:Event`, `Source:fn()`, `Source:block`).
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn EventHandler>>,
    setup: Option<Arc<dyn SetupHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_event(&mut self, name: impl Into<String>, handler: Arc<dyn EventHandler>) -> Result<(), ConfigError> {
        let name = name.into();
        if self.handlers.contains_key(&name) {
            return Err(ConfigError::DuplicateHandler(name));
        }
        self.handlers.insert(name, handler);
        Ok(())
    }

    pub fn on_setup(&mut self, handler: Arc<dyn SetupHandler>) {
        self.setup = Some(handler);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn EventHandler>> {
        self.handlers.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn setup(&self) -> Option<&Arc<dyn SetupHandler>> {
        self.setup.as_ref()
    }

    pub fn has_setup(&self) -> bool {
        self.setup.is_some()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Check that every registered name resolves to exactly one source item.
    pub fn validate(&self, sources: &[Source]) -> Result<(), ConfigError> {
        for name in self.handlers.keys() {
            let Some((source_name, item)) = name.split_once(':') else {
                return Err(ConfigError::UnknownHandler(name.clone()));
            };
            let Some(source) = sources.iter().find(|s| s.name == source_name) else {
                return Err(ConfigError::UnknownHandler(name.clone()));
            };

            let known = match &source.kind {
                SourceKind::Block { .. } => item == "block",
                SourceKind::Log { abi, .. } => abi.has_event_named(item),
                SourceKind::CallTrace { abi, .. } => abi.has_function_named(item),
            };
            if known {
                continue;
            }
            if source.abi().is_some_and(|abi| abi.overloaded().contains(item)) {
                return Err(ConfigError::AmbiguousAbiItem {
                    source_name: source.name.clone(),
                    name: item.to_string(),
                });
            }
            return Err(ConfigError::UnknownHandler(name.clone()));
        }
        Ok(())
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.handlers.keys().collect();
        names.sort();
        f.debug_struct("HandlerRegistry")
            .field("handlers", &names)
            .field("setup", &self.setup.is_some())
            .finish()
    }
}
