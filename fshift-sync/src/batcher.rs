//! Coalesces individual items into batched calls.
//!
//! Items added under the same batch key are collected until the batch reaches
//! `max_batch_size` or `max_wait` has passed since its first item, then handed
//! to the processor in one call. Result `i` goes to the caller of item `i`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use futures::future::{join_all, BoxFuture};
use tokio::sync::oneshot;
use tracing::debug;

use crate::config::BatchConfig;
use crate::error::{ApiError, Result};

pub type BatchProcessor<I, O> = Arc<dyn Fn(Vec<I>) -> BoxFuture<'static, Result<Vec<O>>> + Send + Sync>;

struct Pending<I, O> {
    generation: u64,
    items: Vec<I>,
    waiters: Vec<oneshot::Sender<Result<O>>>,
    processor: BatchProcessor<I, O>,
}

struct State<I, O> {
    pending: HashMap<String, Pending<I, O>>,
    next_generation: u64,
}

struct Inner<I, O> {
    config: BatchConfig,
    state: Mutex<State<I, O>>,
    batches_run: AtomicU64,
}

impl<I, O> Inner<I, O> {
    fn state(&self) -> MutexGuard<'_, State<I, O>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

pub struct RequestBatcher<I, O> {
    inner: Arc<Inner<I, O>>,
}

impl<I, O> Clone for RequestBatcher<I, O> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<I: Send + 'static, O: Send + 'static> RequestBatcher<I, O> {
    pub fn new(config: BatchConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                state: Mutex::new(State {
                    pending: HashMap::new(),
                    next_generation: 0,
                }),
                batches_run: AtomicU64::new(0),
            }),
        })
    }

    /// Queue `item` under `batch_key` and wait for its result.
    ///
    /// The processor given with the first item of a batch is the one that runs it.
    pub async fn add(&self, batch_key: &str, item: I, processor: BatchProcessor<I, O>) -> Result<O> {
        let (tx, rx) = oneshot::channel();

        let ready = {
            let mut state = self.inner.state();
            let generation = state.next_generation;
            let entry = state.pending.entry(batch_key.to_string()).or_insert_with(|| Pending {
                generation,
                items: Vec::new(),
                waiters: Vec::new(),
                processor,
            });
            let fresh = entry.generation == generation && entry.items.is_empty();
            let current_generation = entry.generation;
            entry.items.push(item);
            entry.waiters.push(tx);
            let full = entry.items.len() >= self.inner.config.max_batch_size;
            if fresh {
                state.next_generation += 1;
            }

            if full {
                state.pending.remove(batch_key)
            } else {
                if fresh {
                    self.spawn_timer(batch_key.to_string(), current_generation);
                }
                None
            }
        };

        if let Some(batch) = ready {
            debug!(batch_key, size = batch.items.len(), "batch: size limit reached");
            tokio::spawn(run_batch(Arc::clone(&self.inner), batch));
        }

        rx.await
            .map_err(|_| ApiError::Aborted("batch dropped before completing".into()))?
    }

    fn spawn_timer(&self, batch_key: String, generation: u64) {
        let inner = Arc::clone(&self.inner);
        let wait = inner.config.max_wait();
        tokio::spawn(async move {
            tokio::time::sleep(wait).await;
            let batch = {
                let mut state = inner.state();
                match state.pending.get(&batch_key) {
                    Some(p) if p.generation == generation => state.pending.remove(&batch_key),
                    _ => None,
                }
            };
            if let Some(batch) = batch {
                debug!(batch_key = %batch_key, size = batch.items.len(), "batch: wait elapsed");
                run_batch(inner, batch).await;
            }
        });
    }

    /// Run every pending batch now and wait for them to finish.
    pub async fn flush(&self) {
        let batches: Vec<_> = {
            let mut state = self.inner.state();
            state.pending.drain().map(|(_, batch)| batch).collect()
        };
        if batches.is_empty() {
            return;
        }
        debug!(count = batches.len(), "batch: flushing");
        join_all(batches.into_iter().map(|b| run_batch(Arc::clone(&self.inner), b))).await;
    }

    pub fn pending_items(&self, batch_key: &str) -> usize {
        self.inner
            .state()
            .pending
            .get(batch_key)
            .map_or(0, |p| p.items.len())
    }

    pub fn batches_run(&self) -> u64 {
        self.inner.batches_run.load(Ordering::Relaxed)
    }
}

async fn run_batch<I, O>(inner: Arc<Inner<I, O>>, batch: Pending<I, O>) {
    let Pending {
        items,
        waiters,
        processor,
        ..
    } = batch;
    let expected = items.len();
    inner.batches_run.fetch_add(1, Ordering::Relaxed);

    match processor(items).await {
        Ok(results) if results.len() == expected => {
            for (tx, result) in waiters.into_iter().zip(results) {
                let _ = tx.send(Ok(result));
            }
        }
        Ok(results) => {
            let err = ApiError::BatchMismatch {
                expected,
                got: results.len(),
            };
            for tx in waiters {
                let _ = tx.send(Err(err.clone()));
            }
        }
        Err(err) => {
            for tx in waiters {
                let _ = tx.send(Err(err.clone()));
            }
        }
    }
}
