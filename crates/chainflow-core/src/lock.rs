//! Generation-tagged cancellable mutex guarding the handler cycle.
//!
//! Every generation owns one [`CycleLock`]. A reset cancels the lock's token:
//! cycles waiting to acquire it return [`Cancelled`] immediately, and the
//! cycle holding it observes the cancellation at its next checkpoint through
//! [`CycleGuard::ensure_active`] or [`CycleGuard::cancelled`].

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("cycle lock of generation {generation} was cancelled")]
pub struct Cancelled {
    pub generation: u64,
}

#[derive(Debug, Clone)]
pub struct CycleLock {
    generation: u64,
    mutex: Arc<Mutex<()>>,
    token: CancellationToken,
}

impl CycleLock {
    pub fn new(generation: u64) -> Self {
        Self {
            generation,
            mutex: Arc::new(Mutex::new(())),
            token: CancellationToken::new(),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Wait for exclusive access, or for cancellation, whichever comes first.
    pub async fn acquire(&self) -> Result<CycleGuard, Cancelled> {
        let cancelled = Cancelled {
            generation: self.generation,
        };
        if self.token.is_cancelled() {
            return Err(cancelled);
        }
        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(cancelled),
            guard = self.mutex.clone().lock_owned() => Ok(CycleGuard {
                generation: self.generation,
                token: self.token.clone(),
                _guard: guard,
            }),
        }
    }

    /// Cancel every current and future holder of this lock.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Held for the duration of one cycle.
#[derive(Debug)]
pub struct CycleGuard {
    generation: u64,
    token: CancellationToken,
    _guard: OwnedMutexGuard<()>,
}

impl CycleGuard {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn ensure_active(&self) -> Result<(), Cancelled> {
        if self.token.is_cancelled() {
            Err(Cancelled {
                generation: self.generation,
            })
        } else {
            Ok(())
        }
    }

    /// Resolves once the lock has been cancelled.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }
}
