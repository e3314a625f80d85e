//! Token bucket rate limiter with a priority wait queue.
//!
//! A call runs immediately when a token is available and nobody is waiting;
//! otherwise it is queued. Higher priority values leave the queue first and
//! equal priorities leave in submission order. A dispatcher task is spawned
//! while the queue is non-empty and hands out tokens as they refill.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::{oneshot, Semaphore};
use tokio::time::Instant;
use tracing::debug;

use crate::config::RateLimitConfig;
use crate::error::{ApiError, Result};

struct Waiter {
    priority: i32,
    seq: u64,
    tx: oneshot::Sender<()>,
}

impl PartialEq for Waiter {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for Waiter {}

impl PartialOrd for Waiter {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Waiter {
    // Max-heap: higher priority first, then lower sequence (older) first.
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

struct Bucket {
    tokens: f64,
    last_refill: Instant,
    queue: BinaryHeap<Waiter>,
    next_seq: u64,
    dispatcher_running: bool,
}

impl Bucket {
    fn refill(&mut self, config: &RateLimitConfig) {
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * config.refill_per_second).min(f64::from(config.capacity));
        self.last_refill = now;
    }
}

struct Inner {
    config: RateLimitConfig,
    bucket: Mutex<Bucket>,
    concurrency: Option<Semaphore>,
    completed: AtomicU64,
}

impl Inner {
    fn bucket(&self) -> MutexGuard<'_, Bucket> {
        self.bucket.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Snapshot of limiter state
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimiterStats {
    pub available_tokens: f64,
    pub queued: usize,
    pub completed: u64,
}

#[derive(Clone)]
pub struct RateLimiter {
    inner: Arc<Inner>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Result<Self> {
        config.validate()?;
        let bucket = Bucket {
            tokens: f64::from(config.capacity),
            last_refill: Instant::now(),
            queue: BinaryHeap::new(),
            next_seq: 0,
            dispatcher_running: false,
        };
        Ok(Self {
            inner: Arc::new(Inner {
                concurrency: config.max_concurrent.map(Semaphore::new),
                bucket: Mutex::new(bucket),
                completed: AtomicU64::new(0),
                config,
            }),
        })
    }

    /// Wait for a token at `priority`.
    pub async fn acquire(&self, priority: i32) -> Result<()> {
        let rx = {
            let mut bucket = self.inner.bucket();
            bucket.refill(&self.inner.config);
            if bucket.queue.is_empty() && bucket.tokens >= 1.0 {
                bucket.tokens -= 1.0;
                return Ok(());
            }

            let (tx, rx) = oneshot::channel();
            let seq = bucket.next_seq;
            bucket.next_seq += 1;
            bucket.queue.push(Waiter { priority, seq, tx });
            debug!(priority, seq, queued = bucket.queue.len(), "rate limit: request queued");

            if !bucket.dispatcher_running {
                bucket.dispatcher_running = true;
                tokio::spawn(dispatch(Arc::clone(&self.inner)));
            }
            rx
        };

        rx.await
            .map_err(|_| ApiError::Aborted("rate limiter dispatcher stopped".into()))
    }

    /// Run `f` once a token (and a concurrency slot, if capped) is available.
    pub async fn execute<F, Fut, T>(&self, priority: i32, f: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.acquire(priority).await?;
        let _permit = match &self.inner.concurrency {
            Some(sem) => Some(
                sem.acquire()
                    .await
                    .map_err(|_| ApiError::Aborted("concurrency limiter closed".into()))?,
            ),
            None => None,
        };
        let out = f().await;
        self.inner.completed.fetch_add(1, AtomicOrdering::Relaxed);
        out
    }

    pub fn stats(&self) -> RateLimiterStats {
        let mut bucket = self.inner.bucket();
        bucket.refill(&self.inner.config);
        RateLimiterStats {
            available_tokens: bucket.tokens,
            queued: bucket.queue.len(),
            completed: self.inner.completed.load(AtomicOrdering::Relaxed),
        }
    }
}

/// Longest single dispatcher sleep; the loop re-checks the bucket after it.
const MAX_DISPATCH_WAIT: Duration = Duration::from_secs(60);

/// Clears the running flag and fails queued waiters if the dispatcher stops
/// without draining the queue (panic or cancellation).
struct DispatchGuard {
    inner: Arc<Inner>,
    drained: bool,
}

impl Drop for DispatchGuard {
    fn drop(&mut self) {
        if self.drained {
            return;
        }
        let mut bucket = self.inner.bucket();
        bucket.dispatcher_running = false;
        // Dropping the senders wakes each waiter with `Aborted`.
        bucket.queue.clear();
    }
}

/// Time until `deficit` tokens have refilled, clamped to `MAX_DISPATCH_WAIT`.
fn refill_wait(deficit: f64, refill_per_second: f64) -> Duration {
    Duration::try_from_secs_f64(deficit / refill_per_second)
        .map_or(MAX_DISPATCH_WAIT, |d| d.min(MAX_DISPATCH_WAIT))
        .max(Duration::from_millis(1))
}

/// Release queued waiters as tokens refill; exits once the queue drains.
async fn dispatch(inner: Arc<Inner>) {
    let mut guard = DispatchGuard {
        inner,
        drained: false,
    };
    loop {
        let wait = {
            let mut bucket = guard.inner.bucket();
            bucket.refill(&guard.inner.config);
            while bucket.tokens >= 1.0 {
                let Some(waiter) = bucket.queue.pop() else {
                    break;
                };
                // A dropped receiver gave up waiting; keep its token.
                if waiter.tx.send(()).is_ok() {
                    bucket.tokens -= 1.0;
                }
            }
            if bucket.queue.is_empty() {
                bucket.dispatcher_running = false;
                drop(bucket);
                guard.drained = true;
                return;
            }
            refill_wait(1.0 - bucket.tokens, guard.inner.config.refill_per_second)
        };
        tokio::time::sleep(wait).await;
    }
}
