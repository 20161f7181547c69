//! Decode worker pool.
//!
//! A fixed set of OS threads, each owning an inbound channel. A batch is
//! split into at most one contiguous chunk per worker; each chunk is
//! registered in a pending table under `(worker_id, task_id)` and the worker
//! completes the entry when done. Results are joined in chunk order, so the
//! output preserves input order.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use chainflow_core::event::RawEvent;
use chainflow_core::source::Source;
use futures::future::try_join_all;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error};

use crate::decoder::{ChunkDecoder, DecodeOutput, EvmDecoder};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    #[error("decode pool is closed")]
    Closed,

    #[error("decode worker {worker} failed: {reason}")]
    WorkerFailed { worker: usize, reason: String },

    #[error("failed to spawn decode worker: {0}")]
    Spawn(String),

    #[error("decode pool needs at least one worker")]
    InvalidSize,
}

type TaskResult = Result<DecodeOutput, PoolError>;
type PendingMap = Arc<Mutex<HashMap<(usize, u64), oneshot::Sender<TaskResult>>>>;

struct WorkerRequest {
    task_id: u64,
    chunk: Vec<RawEvent>,
    sources: Arc<Vec<Source>>,
}

pub struct DecodePool {
    senders: Mutex<Vec<mpsc::UnboundedSender<WorkerRequest>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    pending: PendingMap,
    next_task: AtomicU64,
    closed: AtomicBool,
    size: usize,
}

impl DecodePool {
    /// One worker per available CPU core.
    pub fn with_default_size() -> Result<Self, PoolError> {
        Self::new(default_size())
    }

    pub fn new(size: usize) -> Result<Self, PoolError> {
        Self::with_decoder(size, Arc::new(EvmDecoder::new()))
    }

    pub fn with_decoder(size: usize, decoder: Arc<dyn ChunkDecoder>) -> Result<Self, PoolError> {
        if size == 0 {
            return Err(PoolError::InvalidSize);
        }

        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let mut senders = Vec::with_capacity(size);
        let mut workers = Vec::with_capacity(size);

        for worker_id in 0..size {
            let (tx, rx) = mpsc::unbounded_channel();
            let handle = std::thread::Builder::new()
                .name(format!("chainflow-decode-{worker_id}"))
                .spawn({
                    let pending = Arc::clone(&pending);
                    let decoder = Arc::clone(&decoder);
                    move || worker_loop(worker_id, rx, decoder, pending)
                })
                .map_err(|e| PoolError::Spawn(e.to_string()))?;
            senders.push(tx);
            workers.push(handle);
        }

        debug!(size, "decode pool started");

        Ok(Self {
            senders: Mutex::new(senders),
            workers: Mutex::new(workers),
            pending,
            next_task: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            size,
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Number of chunks submitted but not yet completed.
    pub fn pending_len(&self) -> usize {
        lock(&self.pending).len()
    }

    /// Decode `batch` across the workers. Output order follows input order.
    pub async fn execute(&self, batch: Vec<RawEvent>, sources: Arc<Vec<Source>>) -> Result<DecodeOutput, PoolError> {
        if self.is_closed() {
            return Err(PoolError::Closed);
        }
        if batch.is_empty() {
            return Ok(DecodeOutput::default());
        }

        let chunk_size = batch.len().div_ceil(self.size);
        let mut rows = batch.into_iter();
        let mut receivers = Vec::with_capacity(self.size);

        for worker_id in 0..self.size {
            let chunk: Vec<RawEvent> = rows.by_ref().take(chunk_size).collect();
            if chunk.is_empty() {
                break;
            }
            receivers.push(self.submit(worker_id, chunk, Arc::clone(&sources))?);
        }

        let results = try_join_all(receivers.into_iter().map(|rx| async move {
            match rx.await {
                Ok(result) => result,
                Err(_) => Err(PoolError::Closed),
            }
        }))
        .await?;

        let mut out = DecodeOutput::default();
        for result in results {
            out.extend(result);
        }
        Ok(out)
    }

    fn submit(
        &self,
        worker_id: usize,
        chunk: Vec<RawEvent>,
        sources: Arc<Vec<Source>>,
    ) -> Result<oneshot::Receiver<TaskResult>, PoolError> {
        let task_id = self.next_task.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        lock(&self.pending).insert((worker_id, task_id), tx);

        let sent = lock(&self.senders)
            .get(worker_id)
            .map(|sender| {
                sender
                    .send(WorkerRequest {
                        task_id,
                        chunk,
                        sources,
                    })
                    .is_ok()
            })
            .unwrap_or(false);

        if !sent {
            lock(&self.pending).remove(&(worker_id, task_id));
            return Err(PoolError::Closed);
        }
        Ok(rx)
    }

    /// Fail every outstanding request with [`PoolError::Closed`] and join the workers.
    pub fn shutdown(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        let drained: Vec<_> = lock(&self.pending).drain().collect();
        for (_, tx) in drained {
            let _ = tx.send(Err(PoolError::Closed));
        }

        // closing the channels ends each worker loop
        lock(&self.senders).clear();

        let handles: Vec<_> = lock(&self.workers).drain(..).collect();
        for handle in handles {
            if handle.join().is_err() {
                error!("decode worker exited with a panic");
            }
        }
        debug!("decode pool shut down");
    }
}

impl Drop for DecodePool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(
    worker_id: usize,
    mut rx: mpsc::UnboundedReceiver<WorkerRequest>,
    decoder: Arc<dyn ChunkDecoder>,
    pending: PendingMap,
) {
    while let Some(request) = rx.blocking_recv() {
        let result = catch_unwind(AssertUnwindSafe(|| decoder.decode_chunk(&request.chunk, &request.sources)))
            .map_err(|panic| {
                let reason = panic_message(panic.as_ref());
                error!(worker = worker_id, task = request.task_id, %reason, "decode worker panicked");
                PoolError::WorkerFailed {
                    worker: worker_id,
                    reason,
                }
            });

        // entry is gone if the pool was shut down meanwhile
        if let Some(tx) = lock(&pending).remove(&(worker_id, request.task_id)) {
            let _ = tx.send(result);
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

pub fn default_size() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}
