//! Batch delivery
//!
//! One worker task per destination stream, each behind a bounded queue:
//! flushes within a stream are strictly sequential (batch N fully resolves
//! before batch N+1 starts), flushes across streams run concurrently. A
//! full queue makes `submit` wait, which is the backpressure cap on
//! buffered batches.
//!
//! A flush is one pipelined, atomic append of the whole batch. Retryable
//! failures back off per the retry policy; once the budget is exhausted
//! the batch is returned inside `WriteFailed` — never dropped.

use crate::batch::Batch;
use crate::error::{Result, SinkError};
use crate::event::StreamRecord;
use crate::metrics::SinkMetrics;
use crate::retry::RetryPolicy;
use crate::route::StreamTarget;
use crate::store::StreamStore;
use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// Acknowledgment for a fully delivered batch
#[derive(Debug, Clone, Copy)]
pub struct Delivery {
    /// Number of stream entries appended
    pub entries: usize,
}

/// Outcome of one batch: delivered, or `WriteFailed` carrying the batch.
///
/// The destination append is atomic (see `store`), so there is no partial
/// acknowledgment state in between.
pub type DeliveryResult = std::result::Result<Delivery, SinkError>;

struct FlushJob {
    batch: Batch,
    done: oneshot::Sender<DeliveryResult>,
}

struct Worker {
    tx: mpsc::Sender<FlushJob>,
    handle: JoinHandle<()>,
}

/// Flushes sealed batches to the destination store
pub struct DeliveryExecutor {
    store: Arc<dyn StreamStore>,
    retry: RetryPolicy,
    flush_timeout: Duration,
    queue_capacity: usize,
    metrics: Arc<SinkMetrics>,
    workers: HashMap<StreamTarget, Worker>,
}

impl DeliveryExecutor {
    /// Create an executor over the given store
    pub fn new(
        store: Arc<dyn StreamStore>,
        retry: RetryPolicy,
        flush_timeout: Duration,
        queue_capacity: usize,
        metrics: Arc<SinkMetrics>,
    ) -> Self {
        Self {
            store,
            retry,
            flush_timeout,
            queue_capacity,
            metrics,
            workers: HashMap::new(),
        }
    }

    /// Hand a sealed batch to its stream's worker.
    ///
    /// Waits when the stream already has `queue_capacity` outstanding
    /// batches. The returned receiver resolves once the batch is delivered
    /// or has exhausted its retry budget.
    pub async fn submit(
        &mut self,
        target: StreamTarget,
        batch: Batch,
    ) -> Result<oneshot::Receiver<DeliveryResult>> {
        let needs_spawn = match self.workers.get(&target) {
            Some(worker) => worker.tx.is_closed(),
            None => true,
        };
        if needs_spawn {
            let worker = self.spawn_worker(target.clone());
            self.workers.insert(target.clone(), worker);
        }

        let worker = self.workers.get(&target).expect("worker just ensured");
        let (done_tx, done_rx) = oneshot::channel();
        worker
            .tx
            .send(FlushJob {
                batch,
                done: done_tx,
            })
            .await
            .map_err(|_| SinkError::Internal(format!("delivery worker for {target} terminated")))?;
        Ok(done_rx)
    }

    /// Stop all workers after they drain their queues
    pub async fn shutdown(&mut self) {
        for (target, worker) in self.workers.drain() {
            drop(worker.tx);
            if worker.handle.await.is_err() {
                error!("delivery worker for {} panicked during shutdown", target);
            }
        }
    }

    fn spawn_worker(&self, target: StreamTarget) -> Worker {
        let (tx, mut rx) = mpsc::channel::<FlushJob>(self.queue_capacity);
        let store = Arc::clone(&self.store);
        let retry = self.retry.clone();
        let flush_timeout = self.flush_timeout;
        let metrics = Arc::clone(&self.metrics);

        let handle = tokio::spawn(async move {
            debug!("delivery worker for {} started", target);
            while let Some(job) = rx.recv().await {
                let result =
                    flush_batch(&target, &*store, &retry, flush_timeout, &metrics, job.batch).await;
                // receiver may be gone if the caller gave up; delivery
                // already happened either way
                let _ = job.done.send(result);
            }
            debug!("delivery worker for {} stopped", target);
        });

        Worker { tx, handle }
    }
}

/// Encode and flush one batch, retrying retryable failures with backoff
async fn flush_batch(
    target: &StreamTarget,
    store: &dyn StreamStore,
    retry: &RetryPolicy,
    flush_timeout: Duration,
    metrics: &SinkMetrics,
    batch: Batch,
) -> DeliveryResult {
    // Encoding failures are deterministic; retrying cannot help.
    let encoded: Result<Vec<StreamRecord>> = batch.iter().map(StreamRecord::encode).collect();
    let records = match encoded {
        Ok(records) => records,
        Err(e) => {
            metrics.batches_failed.fetch_add(1, Ordering::Relaxed);
            error!("failed to encode event for {}: {}", target, e);
            return Err(SinkError::WriteFailed {
                stream: target.to_string(),
                attempts: 0,
                reason: e.to_string(),
                batch: batch.events,
            });
        }
    };

    let mut attempt = 0u32;
    loop {
        attempt += 1;
        let started = Instant::now();

        let outcome = match tokio::time::timeout(flush_timeout, store.append(target, &records)).await
        {
            Ok(result) => result,
            Err(_) => Err(SinkError::Timeout(format!(
                "flush to {} exceeded {}ms",
                target,
                flush_timeout.as_millis()
            ))),
        };

        match outcome {
            Ok(ids) => {
                let elapsed_us = started.elapsed().as_micros() as u64;
                metrics
                    .records_delivered
                    .fetch_add(ids.len() as u64, Ordering::Relaxed);
                metrics.batches_delivered.fetch_add(1, Ordering::Relaxed);
                metrics
                    .flush_latency_us
                    .fetch_add(elapsed_us, Ordering::Relaxed);
                debug!(
                    "delivered {} entries to {} on attempt {}",
                    ids.len(),
                    target,
                    attempt
                );
                return Ok(Delivery {
                    entries: records.len(),
                });
            }
            Err(e) if e.is_retryable() && attempt < retry.max_attempts() => {
                metrics.retries.fetch_add(1, Ordering::Relaxed);
                let delay = retry.delay_for_retry(attempt);
                warn!(
                    "flush to {} failed (attempt {}/{}), retrying in {:?}: {}",
                    target,
                    attempt,
                    retry.max_attempts(),
                    delay,
                    e
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                metrics.batches_failed.fetch_add(1, Ordering::Relaxed);
                error!(
                    "flush to {} failed permanently after {} attempts: {}",
                    target, attempt, e
                );
                return Err(SinkError::WriteFailed {
                    stream: target.to_string(),
                    attempts: attempt,
                    reason: e.to_string(),
                    batch: batch.events,
                });
            }
        }
    }
}
