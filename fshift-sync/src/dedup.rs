//! In-flight request deduplication with an optional success cache.
//!
//! Concurrent calls with the same key share one spawned execution and observe
//! the same value or error. The in-flight entry is dropped when the work
//! settles, so failures are never reused.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::debug;

use crate::error::{ApiError, Result};

type SharedResult<T> = Shared<BoxFuture<'static, Result<T>>>;

/// Key for a call signature: `{endpoint}:{method}:{args}`.
///
/// Endpoint comes first so `invalidate("Shift:")` drops every call for an entity.
/// `Value` objects serialize with sorted keys, so equal arguments give equal keys.
pub fn dedup_key(endpoint: &str, method: &str, args: &Value) -> String {
    format!("{endpoint}:{method}:{args}")
}

struct InFlight<T> {
    generation: u64,
    fut: SharedResult<T>,
}

struct Cached<T> {
    value: T,
    expires_at: Instant,
}

struct State<T> {
    in_flight: HashMap<String, InFlight<T>>,
    cache: HashMap<String, Cached<T>>,
    next_generation: u64,
}

struct Inner<T> {
    state: Mutex<State<T>>,
    ttl: Option<Duration>,
    executions: AtomicU64,
}

impl<T: Clone> Inner<T> {
    fn state(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Drop the in-flight entry if it is still ours and cache a success.
    fn settle(&self, key: &str, generation: u64, result: &Result<T>) {
        let mut state = self.state();
        let ours = state
            .in_flight
            .get(key)
            .is_some_and(|f| f.generation == generation);
        if !ours {
            // Invalidated while running; the result is stale.
            return;
        }
        state.in_flight.remove(key);
        if let (Some(ttl), Ok(value)) = (self.ttl, result) {
            let now = Instant::now();
            state.cache.retain(|_, c| c.expires_at > now);
            state.cache.insert(
                key.to_string(),
                Cached {
                    value: value.clone(),
                    expires_at: now + ttl,
                },
            );
        }
    }
}

pub struct RequestDeduplicator<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for RequestDeduplicator<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Default for RequestDeduplicator<T> {
    fn default() -> Self {
        Self::new(None)
    }
}

impl<T: Clone + Send + Sync + 'static> RequestDeduplicator<T> {
    /// `cache_ttl` keeps successful results for that long after they settle.
    pub fn new(cache_ttl: Option<Duration>) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    in_flight: HashMap::new(),
                    cache: HashMap::new(),
                    next_generation: 0,
                }),
                ttl: cache_ttl,
                executions: AtomicU64::new(0),
            }),
        }
    }

    /// Run `f` unless an identical call is already running (or cached).
    ///
    /// The work runs on its own task, so a caller dropping out does not
    /// cancel it for the others. `f` is called after the internal lock is
    /// released and may use this deduplicator.
    pub async fn execute<F, Fut>(&self, key: &str, f: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let (shared, work_tx) = {
            let mut state = self.inner.state();

            if let Some(cached) = state.cache.get(key) {
                if cached.expires_at > Instant::now() {
                    debug!(key, "dedup: cache hit");
                    return Ok(cached.value.clone());
                }
                state.cache.remove(key);
            }

            if let Some(existing) = state.in_flight.get(key) {
                debug!(key, "dedup: joined in-flight request");
                (existing.fut.clone(), None)
            } else {
                let generation = state.next_generation;
                state.next_generation += 1;
                self.inner.executions.fetch_add(1, Ordering::Relaxed);

                // The entry is registered now; the work itself arrives once the lock is gone.
                let (work_tx, work_rx) = oneshot::channel::<BoxFuture<'static, Result<T>>>();
                let task_inner = Arc::clone(&self.inner);
                let task_key = key.to_string();
                let handle = tokio::spawn(async move {
                    let result = match work_rx.await {
                        Ok(work) => work.await,
                        Err(_) => Err(ApiError::Aborted("request was never started".into())),
                    };
                    task_inner.settle(&task_key, generation, &result);
                    result
                });

                let join_inner = Arc::clone(&self.inner);
                let join_key = key.to_string();
                let fut = async move {
                    match handle.await {
                        Ok(result) => result,
                        Err(e) => {
                            let err = ApiError::Aborted(e.to_string());
                            join_inner.settle(&join_key, generation, &Err(err.clone()));
                            Err(err)
                        }
                    }
                }
                .boxed()
                .shared();

                state.in_flight.insert(
                    key.to_string(),
                    InFlight {
                        generation,
                        fut: fut.clone(),
                    },
                );
                (fut, Some(work_tx))
            }
        };

        if let Some(work_tx) = work_tx {
            // The receiving task only goes away if it was aborted, which `shared` reports.
            let _ = work_tx.send(f().boxed());
        }
        shared.await
    }

    /// Drop in-flight and cached entries whose key starts with `prefix`.
    /// Returns the number of entries removed.
    pub fn invalidate(&self, prefix: &str) -> usize {
        let mut state = self.inner.state();
        let before = state.in_flight.len() + state.cache.len();
        state.in_flight.retain(|k, _| !k.starts_with(prefix));
        state.cache.retain(|k, _| !k.starts_with(prefix));
        let removed = before - state.in_flight.len() - state.cache.len();
        if removed > 0 {
            debug!(prefix, removed, "dedup: invalidated");
        }
        removed
    }

    pub fn clear(&self) {
        let mut state = self.inner.state();
        state.in_flight.clear();
        state.cache.clear();
    }

    /// Cached results held, including expired ones not yet pruned
    pub fn cached(&self) -> usize {
        self.inner.state().cache.len()
    }

    pub fn in_flight(&self) -> usize {
        self.inner.state().in_flight.len()
    }

    /// Number of times an underlying call was actually started
    pub fn executions(&self) -> u64 {
        self.inner.executions.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    fn slow_value(calls: Arc<AtomicUsize>, value: u32) -> impl Future<Output = Result<u32>> + Send + 'static {
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(value)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_identical_calls_run_once() {
        let dedup = RequestDeduplicator::<u32>::default();
        let calls = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let d = dedup.clone();
                let c = Arc::clone(&calls);
                tokio::spawn(async move { d.execute("Shift:list:{}", || slow_value(c, 7)).await })
            })
            .collect();

        for h in handles {
            assert_eq!(h.await.unwrap().unwrap(), 7);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(dedup.executions(), 1);
        assert_eq!(dedup.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_shared_then_not_reused() {
        let dedup = RequestDeduplicator::<u32>::default();
        let calls = Arc::new(AtomicUsize::new(0));

        let run = |d: RequestDeduplicator<u32>, c: Arc<AtomicUsize>| async move {
            d.execute("Debt:get:1", move || async move {
                c.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                Err::<u32, _>(ApiError::http(503, "down"))
            })
            .await
        };

        let (a, b) = tokio::join!(
            run(dedup.clone(), Arc::clone(&calls)),
            run(dedup.clone(), Arc::clone(&calls))
        );
        assert_eq!(a.unwrap_err(), ApiError::http(503, "down"));
        assert_eq!(b.unwrap_err(), ApiError::http(503, "down"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // Settled failure is gone; the next call runs again.
        let _ = run(dedup.clone(), Arc::clone(&calls)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sequential_calls_without_cache_rerun() {
        let dedup = RequestDeduplicator::<u32>::default();
        let calls = Arc::new(AtomicUsize::new(0));
        dedup.execute("k", || slow_value(Arc::clone(&calls), 1)).await.unwrap();
        dedup.execute("k", || slow_value(Arc::clone(&calls), 2)).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_ttl_and_invalidate() {
        let dedup = RequestDeduplicator::<u32>::new(Some(Duration::from_secs(5)));
        let calls = Arc::new(AtomicUsize::new(0));

        assert_eq!(dedup.execute("Goal:list:{}", || slow_value(Arc::clone(&calls), 1)).await.unwrap(), 1);
        assert_eq!(dedup.execute("Goal:list:{}", || slow_value(Arc::clone(&calls), 2)).await.unwrap(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        assert_eq!(dedup.invalidate("Goal:"), 1);
        assert_eq!(dedup.execute("Goal:list:{}", || slow_value(Arc::clone(&calls), 3)).await.unwrap(), 3);

        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(dedup.execute("Goal:list:{}", || slow_value(Arc::clone(&calls), 4)).await.unwrap(), 4);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_leaves_other_prefixes() {
        let dedup = RequestDeduplicator::<u32>::new(Some(Duration::from_secs(60)));
        let calls = Arc::new(AtomicUsize::new(0));
        dedup.execute("Shift:list:{}", || slow_value(Arc::clone(&calls), 1)).await.unwrap();
        dedup.execute("Debt:list:{}", || slow_value(Arc::clone(&calls), 2)).await.unwrap();

        assert_eq!(dedup.invalidate("Shift:"), 1);
        dedup.execute("Debt:list:{}", || slow_value(Arc::clone(&calls), 9)).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        dedup.clear();
        dedup.execute("Debt:list:{}", || slow_value(Arc::clone(&calls), 9)).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entries_are_pruned_across_keys() {
        let dedup = RequestDeduplicator::<u32>::new(Some(Duration::from_millis(1)));
        for i in 0..1000u32 {
            let key = format!("Transaction:get:{i}");
            dedup.execute(&key, move || async move { Ok(i) }).await.unwrap();
        }
        assert_eq!(dedup.cached(), 1000);

        tokio::time::advance(Duration::from_secs(10)).await;
        dedup.execute("Transaction:get:new", || async { Ok(0) }).await.unwrap();
        assert_eq!(dedup.cached(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_settle_keeps_newer_request() {
        let dedup = RequestDeduplicator::<u32>::new(Some(Duration::from_secs(60)));
        let calls = Arc::new(AtomicUsize::new(0));
        let key = "Shift:get:1";

        let first = {
            let (d, c) = (dedup.clone(), Arc::clone(&calls));
            tokio::spawn(async move { d.execute(key, || slow_value(c, 1)).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(dedup.invalidate("Shift:"), 1);

        let second = {
            let (d, c) = (dedup.clone(), Arc::clone(&calls));
            tokio::spawn(async move {
                d.execute(key, move || async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    Ok(2)
                })
                .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        // The invalidated call finishes first without evicting or caching over the new one.
        assert_eq!(first.await.unwrap().unwrap(), 1);
        assert_eq!(dedup.in_flight(), 1);
        assert_eq!(dedup.cached(), 0);

        let joined = dedup.execute(key, || slow_value(Arc::clone(&calls), 3)).await.unwrap();
        assert_eq!(joined, 2);
        assert_eq!(second.await.unwrap().unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        assert_eq!(dedup.execute(key, || slow_value(Arc::clone(&calls), 4)).await.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_work_may_use_the_deduplicator() {
        let dedup = RequestDeduplicator::<u32>::default();
        let inner = dedup.clone();
        let seen = dedup
            .execute("Goal:list:{}", move || {
                let in_flight = inner.in_flight() as u32;
                async move { Ok(in_flight) }
            })
            .await
            .unwrap();
        assert_eq!(seen, 1);
        assert_eq!(dedup.in_flight(), 0);
    }

    #[test]
    fn test_dedup_key_is_deterministic() {
        let a = dedup_key("Shift", "list", &json!({"sort": "-date", "limit": 10}));
        let b = dedup_key("Shift", "list", &json!({"limit": 10, "sort": "-date"}));
        assert_eq!(a, b);
        assert!(a.starts_with("Shift:list:"));
        assert_ne!(a, dedup_key("Shift", "list", &json!({"limit": 11, "sort": "-date"})));
    }
}
