//! Connector lifecycle
//!
//! `RedisSinkConnector` owns configuration and connection state and
//! exposes the contract the host orchestrator depends on:
//! [`connect`](RedisSinkConnector::connect),
//! [`write`](RedisSinkConnector::write) and
//! [`close`](RedisSinkConnector::close). `write` drives the whole
//! pipeline — normalize, route, accumulate, deliver — and blocks until
//! every batch it made ready has resolved.

use crate::batch::Accumulator;
use crate::config::RedisSinkConfig;
use crate::error::{Result, SinkError};
use crate::event::{normalize, SourceChange};
use crate::executor::DeliveryExecutor;
use crate::metrics::{MetricsSnapshot, SinkMetrics};
use crate::report::{FailureReporter, LogReporter};
use crate::route::Router;
use crate::store::{RedisStreamStore, StreamStore};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::oneshot;
use tracing::{info, warn};

/// Outcome of one `write` call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteSummary {
    /// Events accepted into the pipeline
    pub accepted: usize,
    /// Events skipped (unsupported kind or malformed)
    pub skipped: usize,
    /// Batches delivered during this call
    pub batches_delivered: usize,
    /// Stream entries acknowledged during this call
    pub records_delivered: usize,
}

/// Result of a non-destructive connectivity probe
#[derive(Debug, Clone)]
pub struct CheckResult {
    /// Whether configuration and connectivity both check out
    pub success: bool,
    /// Failure description, if any
    pub message: Option<String>,
}

impl CheckResult {
    /// Successful check
    pub fn success() -> Self {
        Self {
            success: true,
            message: None,
        }
    }

    /// Failed check with a reason
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
        }
    }
}

struct Inner {
    router: Router,
    accumulator: Accumulator,
    executor: DeliveryExecutor,
    key_fields: Vec<String>,
    reporter: Arc<dyn FailureReporter>,
}

/// CDC sink connector delivering change events to Redis Streams
pub struct RedisSinkConnector {
    inner: Option<Inner>,
    metrics: Arc<SinkMetrics>,
}

impl std::fmt::Debug for RedisSinkConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisSinkConnector")
            .field("running", &self.inner.is_some())
            .finish()
    }
}

impl RedisSinkConnector {
    /// Validate the configuration, establish the Redis connection and
    /// start the delivery pipeline.
    ///
    /// Fails with `Config` on invalid configuration and `Connection` when
    /// the destination is unreachable or rejects authentication.
    pub async fn connect(config: RedisSinkConfig) -> Result<Self> {
        config.ensure_valid()?;
        let store = Arc::new(RedisStreamStore::connect(&config).await?);
        Ok(Self::build(config, store))
    }

    /// Like [`connect`](Self::connect), but over a caller-supplied store.
    /// This is the seam integration tests use to run the full pipeline
    /// against an in-memory destination.
    pub async fn connect_with_store(
        config: RedisSinkConfig,
        store: Arc<dyn StreamStore>,
    ) -> Result<Self> {
        config.ensure_valid()?;
        store.ping().await?;
        Ok(Self::build(config, store))
    }

    fn build(config: RedisSinkConfig, store: Arc<dyn StreamStore>) -> Self {
        let metrics = Arc::new(SinkMetrics::new());
        let router = Router::new(&config.key_prefix, &config.stream_base_name);
        let accumulator = Accumulator::new(config.batch_size, config.linger());
        let executor = DeliveryExecutor::new(
            store,
            config.retry.clone(),
            config.flush_timeout(),
            config.max_in_flight,
            Arc::clone(&metrics),
        );

        info!(
            "sink connector ready (streams: {}{}:<table>, batch_size: {})",
            config.key_prefix, config.stream_base_name, config.batch_size
        );

        Self {
            inner: Some(Inner {
                router,
                accumulator,
                executor,
                key_fields: config.key_fields.clone(),
                reporter: Arc::new(LogReporter),
            }),
            metrics,
        }
    }

    /// Replace the failure reporter (builder-style)
    pub fn with_reporter(mut self, reporter: Arc<dyn FailureReporter>) -> Self {
        if let Some(inner) = self.inner.as_mut() {
            inner.reporter = reporter;
        }
        self
    }

    /// Non-destructive probe: validates the configuration and connects to
    /// the destination once, without starting a pipeline.
    pub async fn check(config: &RedisSinkConfig) -> CheckResult {
        if let Err(e) = config.ensure_valid() {
            return CheckResult::failure(e.to_string());
        }
        match RedisStreamStore::connect(config).await {
            Ok(_) => CheckResult::success(),
            Err(e) => CheckResult::failure(e.to_string()),
        }
    }

    /// Push a run of captured changes through the pipeline.
    ///
    /// Normalization failures are event-local: logged, counted in the
    /// summary, skipped. Every batch sealed by this call (size bound or
    /// linger expiry) is flushed before returning; if any batch exhausts
    /// its retry budget, the first such `WriteFailed` is returned after
    /// all remaining batches were still attempted.
    pub async fn write(&mut self, changes: Vec<SourceChange>) -> Result<WriteSummary> {
        let inner = self.inner.as_mut().ok_or(SinkError::Closed)?;

        let mut summary = WriteSummary::default();
        let mut pending = Vec::new();

        for change in changes {
            match normalize(change, &inner.key_fields) {
                Ok(event) => {
                    summary.accepted += 1;
                    self.metrics.events_received.fetch_add(1, Ordering::Relaxed);
                    let target = inner.router.route(&event);
                    if let Some((target, batch)) = inner.accumulator.push(target, event) {
                        pending.push(inner.executor.submit(target, batch).await?);
                    }
                }
                Err(e) if e.is_event_local() => {
                    warn!("skipping event: {}", e);
                    summary.skipped += 1;
                    self.metrics.events_skipped.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => return Err(e),
            }
        }

        for (target, batch) in inner.accumulator.drain_expired(Instant::now()) {
            pending.push(inner.executor.submit(target, batch).await?);
        }

        let (delivered_batches, delivered_records, first_failure) =
            await_deliveries(pending, inner.reporter.as_ref()).await;
        summary.batches_delivered = delivered_batches;
        summary.records_delivered = delivered_records;

        match first_failure {
            Some(err) => Err(err),
            None => Ok(summary),
        }
    }

    /// Flush everything still buffered and release the connection.
    ///
    /// Batches that cannot be delivered are reported through the failure
    /// reporter, never discarded silently. Idempotent: a second call is a
    /// no-op.
    pub async fn close(&mut self) -> Result<()> {
        let Some(mut inner) = self.inner.take() else {
            return Ok(());
        };

        let mut pending = Vec::new();
        for (target, batch) in inner.accumulator.drain_all() {
            if !batch.is_empty() {
                pending.push(inner.executor.submit(target, batch).await?);
            }
        }

        let (batches, records, failure) = await_deliveries(pending, inner.reporter.as_ref()).await;
        inner.executor.shutdown().await;

        if let Some(err) = failure {
            warn!("close completed with undelivered batches: {}", err);
        }
        info!(
            "sink connector closed ({} final batches, {} entries flushed)",
            batches, records
        );
        Ok(())
    }

    /// Check if the connector has been closed
    pub fn is_closed(&self) -> bool {
        self.inner.is_none()
    }

    /// Current pipeline counters
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

/// Await every outstanding acknowledgment; report failures and keep the
/// first one for the caller.
async fn await_deliveries(
    pending: Vec<oneshot::Receiver<crate::executor::DeliveryResult>>,
    reporter: &dyn FailureReporter,
) -> (usize, usize, Option<SinkError>) {
    let mut batches = 0;
    let mut records = 0;
    let mut first_failure = None;

    for rx in pending {
        match rx.await {
            Ok(Ok(delivery)) => {
                batches += 1;
                records += delivery.entries;
            }
            Ok(Err(err)) => {
                reporter.report(&err);
                if first_failure.is_none() {
                    first_failure = Some(err);
                }
            }
            Err(_) => {
                let err = SinkError::Internal("delivery worker dropped its acknowledgment".into());
                if first_failure.is_none() {
                    first_failure = Some(err);
                }
            }
        }
    }

    (batches, records, first_failure)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockStreamStore;
    use serde_json::json;

    fn config(batch_size: usize) -> RedisSinkConfig {
        RedisSinkConfig {
            batch_size,
            linger_ms: 60_000,
            ..RedisSinkConfig::default()
        }
    }

    #[tokio::test]
    async fn connect_rejects_invalid_config() {
        let bad = RedisSinkConfig {
            host: String::new(),
            ..RedisSinkConfig::default()
        };
        let err = RedisSinkConnector::connect_with_store(bad, Arc::new(MockStreamStore::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, SinkError::Config(_)));
    }

    #[tokio::test]
    async fn check_reports_invalid_config() {
        let bad = RedisSinkConfig {
            batch_size: 0,
            ..RedisSinkConfig::default()
        };
        let result = RedisSinkConnector::check(&bad).await;
        assert!(!result.success);
        assert!(result.message.unwrap().contains("batch_size"));
    }

    #[tokio::test]
    async fn write_after_close_fails_with_closed() {
        let store = Arc::new(MockStreamStore::new());
        let mut connector = RedisSinkConnector::connect_with_store(config(10), store)
            .await
            .unwrap();

        connector.close().await.unwrap();
        let err = connector
            .write(vec![SourceChange::insert("db", "t", json!({"id": 1}))])
            .await
            .unwrap_err();
        assert!(matches!(err, SinkError::Closed));
    }

    #[tokio::test]
    async fn skipped_events_are_counted_not_fatal() {
        let store = Arc::new(MockStreamStore::new());
        let mut connector = RedisSinkConnector::connect_with_store(config(1), store.clone())
            .await
            .unwrap();

        let summary = connector
            .write(vec![
                SourceChange::insert("db", "t", json!({"id": 1})).with_kind("TRUNCATE"),
                SourceChange::insert("db", "t", json!({"id": 2})),
            ])
            .await
            .unwrap();

        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.accepted, 1);
        assert_eq!(summary.records_delivered, 1);
        assert_eq!(connector.metrics().events_skipped, 1);

        connector.close().await.unwrap();
    }
}
