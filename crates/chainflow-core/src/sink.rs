//! Error sink: where fatal handler errors are reported.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use serde::Serialize;
use serde_json::Value;

/// A structured report of a failed handler.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserError {
    /// Engine generation the failing task belonged to.
    pub generation: u64,
    /// Qualified handler name, e.g. `Pair:Swap`.
    pub handler: String,
    pub block_number: Option<u64>,
    pub chain_id: Option<u64>,
    pub params: Value,
    pub message: String,
    /// Messages of the underlying causes, outermost first.
    pub causes: Vec<String>,
    /// `file:line:column` where the error was raised, when known.
    pub code_frame: Option<String>,
    pub backtrace: Option<String>,
}

impl std::fmt::Display for UserError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Error while processing '{}'", self.handler)?;
        if let Some(block) = self.block_number {
            write!(f, " at block {block}")?;
        }
        write!(f, ": {}", self.message)?;
        if let Some(frame) = &self.code_frame {
            write!(f, " ({frame})")?;
        }
        Ok(())
    }
}

/// Receives handler errors. A submitted error halts the engine until reset.
pub trait ErrorSink: Send + Sync {
    fn submit_handler_error(&self, error: UserError);

    fn is_handler_error(&self) -> bool;

    /// Forget the halted state. Called on reset.
    fn clear(&self);

    fn last_error(&self) -> Option<UserError>;
}

#[derive(Debug, Default)]
pub struct MemoryErrorSink {
    errors: Mutex<Vec<UserError>>,
    halted: AtomicBool,
}

impl MemoryErrorSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every error submitted so far, including ones before the last clear.
    pub fn errors(&self) -> Vec<UserError> {
        self.errors.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl ErrorSink for MemoryErrorSink {
    fn submit_handler_error(&self, error: UserError) {
        tracing::error!(error = %error, "handler error");
        self.errors.lock().unwrap_or_else(|e| e.into_inner()).push(error);
        self.halted.store(true, Ordering::Release);
    }

    fn is_handler_error(&self) -> bool {
        self.halted.load(Ordering::Acquire)
    }

    fn clear(&self) {
        self.halted.store(false, Ordering::Release);
    }

    fn last_error(&self) -> Option<UserError> {
        self.errors.lock().unwrap_or_else(|e| e.into_inner()).last().cloned()
    }
}
