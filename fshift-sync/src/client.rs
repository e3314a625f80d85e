//! Entity API client wrapped in rate limiting, dedup, batching and retry.
//!
//! Reads are deduplicated by call signature, then rate limited, then retried
//! on transient failures. Mutations are rate limited but only retried when a
//! predicate is opted into, and a successful mutation drops every cached or
//! in-flight read for its entity.

use std::sync::Arc;

use futures::FutureExt;
use serde_json::Value;
use tracing::debug;

use crate::batcher::{BatchProcessor, RequestBatcher};
use crate::config::OptimizerConfig;
use crate::dedup::RequestDeduplicator;
use crate::error::{ApiError, Result};
use crate::rate_limiter::{RateLimiter, RateLimiterStats};
use crate::retry::{retry_transient, retry_with_backoff, RetryPolicy};
use crate::transport::{ApiRequest, EntityTransport, Operation};

pub const READ_PRIORITY: i32 = 0;
/// Writes jump ahead of queued reads
pub const WRITE_PRIORITY: i32 = 1;

type RetryPredicate = Arc<dyn Fn(&ApiError) -> bool + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClientStats {
    pub limiter: RateLimiterStats,
    pub in_flight_reads: usize,
    pub transport_reads: u64,
    pub batches_sent: u64,
}

pub struct OptimizedClient<T> {
    transport: Arc<T>,
    limiter: RateLimiter,
    dedup: RequestDeduplicator<Value>,
    batcher: RequestBatcher<Value, Value>,
    retry: RetryPolicy,
    mutation_retry: Option<RetryPredicate>,
}

impl<T: EntityTransport + 'static> OptimizedClient<T> {
    pub fn new(transport: T, config: &OptimizerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            transport: Arc::new(transport),
            limiter: RateLimiter::new(config.rate_limit.clone())?,
            dedup: RequestDeduplicator::new(config.dedup.cache_ttl()),
            batcher: RequestBatcher::new(config.batch.clone())?,
            retry: RetryPolicy::from(&config.retry),
            mutation_retry: None,
        })
    }

    /// Retry mutations whose error satisfies `should_retry`.
    ///
    /// Only safe for operations the backend treats as idempotent.
    pub fn with_mutation_retry(mut self, should_retry: impl Fn(&ApiError) -> bool + Send + Sync + 'static) -> Self {
        self.mutation_retry = Some(Arc::new(should_retry));
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn stats(&self) -> ClientStats {
        ClientStats {
            limiter: self.limiter.stats(),
            in_flight_reads: self.dedup.in_flight(),
            transport_reads: self.dedup.executions(),
            batches_sent: self.batcher.batches_run(),
        }
    }

    /// Send any request through the path for its kind.
    pub async fn send(&self, request: ApiRequest, priority: i32) -> Result<Value> {
        if request.operation.is_mutation() {
            self.mutate(request, priority).await
        } else {
            self.read(request, priority).await
        }
    }

    async fn read(&self, request: ApiRequest, priority: i32) -> Result<Value> {
        let key = request.dedup_key();
        let transport = Arc::clone(&self.transport);
        let limiter = self.limiter.clone();
        let policy = self.retry.clone();

        self.dedup
            .execute(&key, move || async move {
                limiter
                    .execute(priority, || async {
                        retry_with_backoff(&policy, retry_transient, || transport.send(&request)).await
                    })
                    .await
            })
            .await
    }

    async fn mutate(&self, request: ApiRequest, priority: i32) -> Result<Value> {
        let result = self
            .limiter
            .execute(priority, || async {
                match &self.mutation_retry {
                    Some(should_retry) => {
                        retry_with_backoff(&self.retry, |e| should_retry(e), || self.transport.send(&request)).await
                    }
                    None => self.transport.send(&request).await,
                }
            })
            .await;

        if result.is_ok() {
            self.dedup.invalidate(&request.entity_prefix());
        }
        result
    }

    pub async fn list(&self, entity: &str, sort: Option<&str>, limit: Option<u32>) -> Result<Value> {
        let op = Operation::List {
            sort: sort.map(str::to_string),
            limit,
        };
        self.read(ApiRequest::new(entity, op), READ_PRIORITY).await
    }

    pub async fn get(&self, entity: &str, id: &str) -> Result<Value> {
        let op = Operation::Get { id: id.to_string() };
        self.read(ApiRequest::new(entity, op), READ_PRIORITY).await
    }

    pub async fn query(&self, entity: &str, filter: Value) -> Result<Value> {
        self.read(ApiRequest::new(entity, Operation::Query { filter }), READ_PRIORITY)
            .await
    }

    pub async fn create(&self, entity: &str, data: Value) -> Result<Value> {
        self.mutate(ApiRequest::new(entity, Operation::Create { data }), WRITE_PRIORITY)
            .await
    }

    pub async fn update(&self, entity: &str, id: &str, data: Value) -> Result<Value> {
        let op = Operation::Update {
            id: id.to_string(),
            data,
        };
        self.mutate(ApiRequest::new(entity, op), WRITE_PRIORITY).await
    }

    pub async fn delete(&self, entity: &str, id: &str) -> Result<Value> {
        let op = Operation::Delete { id: id.to_string() };
        self.mutate(ApiRequest::new(entity, op), WRITE_PRIORITY).await
    }

    /// Create a record, coalescing concurrent creates for the same entity
    /// into one bulk request.
    pub async fn create_batched(&self, entity: &str, data: Value) -> Result<Value> {
        let transport = Arc::clone(&self.transport);
        let limiter = self.limiter.clone();
        let entity_name = entity.to_string();
        let processor: BatchProcessor<Value, Value> = Arc::new(move |items: Vec<Value>| {
            let transport = Arc::clone(&transport);
            let limiter = limiter.clone();
            let request = ApiRequest::new(entity_name.clone(), Operation::BulkCreate { items });
            async move {
                debug!(entity = %request.entity, "bulk create");
                let created = limiter
                    .execute(WRITE_PRIORITY, || transport.send(&request))
                    .await?;
                match created {
                    Value::Array(records) => Ok(records),
                    other => Err(ApiError::Decode(format!("bulk create returned non-array: {other}"))),
                }
            }
            .boxed()
        });

        let created = self.batcher.add(entity, data, processor).await?;
        self.dedup.invalidate(&format!("{entity}:"));
        Ok(created)
    }

    /// Send any partially filled batches now.
    pub async fn flush(&self) {
        self.batcher.flush().await;
    }
}
