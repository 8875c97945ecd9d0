//! redis-stream-sink - CDC sink connector for Redis Streams
//!
//! Receives row-level change events (INSERT/UPDATE/DELETE) from an
//! upstream capture source and appends them, in order, to per-table Redis
//! Streams, batching writes for throughput while preserving per-table
//! ordering and at-least-once delivery under transient failures.
//!
//! # Architecture
//!
//! ```text
//! host ──► RedisSinkConnector (connect / write / close)
//!              │
//!              ├─ normalize ──► route ──► accumulate (per-stream batches)
//!              │                              │ sealed batch
//!              ▼                              ▼
//!        FailureReporter ◄─── DeliveryExecutor (worker per stream,
//!                                  │            retry + backoff)
//!                                  ▼
//!                             StreamStore ──► Redis Streams (XADD pipeline)
//! ```
//!
//! Ordering: one sequential worker per destination stream — batch N fully
//! resolves before batch N+1 starts; streams flush concurrently with each
//! other. Delivery is at-least-once: a batch that exhausts its retry
//! budget is surfaced to the host inside [`SinkError::WriteFailed`], never
//! dropped.
//!
//! # Example
//!
//! ```rust,ignore
//! use redis_stream_sink::{RedisSinkConfig, RedisSinkConnector, SourceChange};
//! use serde_json::json;
//!
//! let config = RedisSinkConfig::from_yaml(&host_supplied_yaml)?;
//! let mut connector = RedisSinkConnector::connect(config).await?;
//!
//! connector
//!     .write(vec![SourceChange::insert(
//!         "shop",
//!         "customers",
//!         json!({"id": 1, "name": "Ada"}),
//!     )])
//!     .await?;
//!
//! connector.close().await?;
//! ```

pub mod batch;
pub mod config;
pub mod connector;
pub mod error;
pub mod event;
pub mod executor;
pub mod metrics;
pub mod report;
pub mod retry;
pub mod route;
pub mod store;
pub mod testing;
pub mod types;

pub use batch::{Accumulator, Batch};
pub use config::RedisSinkConfig;
pub use connector::{CheckResult, RedisSinkConnector, WriteSummary};
pub use error::{Result, SinkError};
pub use event::{normalize, ChangeEvent, EventMetadata, Operation, SourceChange, StreamRecord};
pub use executor::{Delivery, DeliveryExecutor, DeliveryResult};
pub use metrics::{MetricsSnapshot, SinkMetrics};
pub use report::{FailureReporter, LogReporter};
pub use retry::RetryPolicy;
pub use route::{Router, StreamTarget};
pub use store::{RedisStreamStore, StreamStore};
pub use types::Password;
