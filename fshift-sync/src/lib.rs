pub mod batcher;
pub mod client;
pub mod config;
pub mod dedup;
pub mod error;
pub mod http;
pub mod rate_limiter;
pub mod retry;
pub mod transport;

pub use batcher::{BatchProcessor, RequestBatcher};
pub use client::{ClientStats, OptimizedClient, READ_PRIORITY, WRITE_PRIORITY};
pub use config::{BatchConfig, DedupConfig, OptimizerConfig, RateLimitConfig, RetryConfig};
pub use dedup::{dedup_key, RequestDeduplicator};
pub use error::{ApiError, ErrorClass, Result};
pub use http::HttpTransport;
pub use rate_limiter::{RateLimiter, RateLimiterStats};
pub use retry::{retry_transient, retry_with_backoff, RetryPolicy};
pub use transport::{ApiRequest, EntityTransport, Operation};
