//! Testing utilities
//!
//! In-memory [`StreamStore`] and a collecting [`FailureReporter`] for
//! exercising the pipeline without a Redis instance.
//!
//! # Example
//!
//! ```rust,ignore
//! let store = Arc::new(MockStreamStore::new().fail_times(2));
//! let connector = RedisSinkConnector::connect_with_store(config, store.clone()).await?;
//! connector.write(vec![SourceChange::insert("db", "t", json!({"id": 1}))]).await?;
//! assert_eq!(store.entries_for("gluesync:gluesync_events:t").len(), 1);
//! ```

use crate::error::{Result, SinkError};
use crate::event::StreamRecord;
use crate::report::FailureReporter;
use crate::route::StreamTarget;
use crate::store::StreamStore;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// In-memory stream store with failure injection.
///
/// Appends are all-or-nothing like the real store: a failing call records
/// nothing. Failure injection counts *calls*, so retries of the same batch
/// consume injected failures one by one.
#[derive(Debug, Default)]
pub struct MockStreamStore {
    entries: Mutex<HashMap<String, Vec<String>>>,
    attempts: AtomicU64,
    fail_remaining: AtomicU32,
    fail_forever: Mutex<Option<FailMode>>,
    next_id: AtomicU64,
}

#[derive(Debug, Clone, Copy)]
enum FailMode {
    Retryable,
    Fatal,
}

impl MockStreamStore {
    /// Create an empty store that accepts every append
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` append calls with a retryable connection error
    pub fn fail_times(self, n: u32) -> Self {
        self.fail_remaining.store(n, Ordering::SeqCst);
        self
    }

    /// Fail every append call with a retryable connection error
    pub fn fail_always(self) -> Self {
        *self.fail_forever.lock() = Some(FailMode::Retryable);
        self
    }

    /// Fail every append call with a non-retryable store error
    pub fn fail_always_fatal(self) -> Self {
        *self.fail_forever.lock() = Some(FailMode::Fatal);
        self
    }

    /// Start failing every append from this point on, with a retryable
    /// error (for scripted outage scenarios on an already-shared store)
    pub fn fail_from_now_on(&self) {
        *self.fail_forever.lock() = Some(FailMode::Retryable);
    }

    /// Stop failing (for scripted recovery scenarios)
    pub fn recover(&self) {
        self.fail_remaining.store(0, Ordering::SeqCst);
        *self.fail_forever.lock() = None;
    }

    /// Number of append calls observed, including failed ones
    pub fn append_attempts(&self) -> u64 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Raw JSON documents appended to a stream, in append order
    pub fn entries_for(&self, stream: &str) -> Vec<String> {
        self.entries
            .lock()
            .get(stream)
            .cloned()
            .unwrap_or_default()
    }

    /// Stream keys that received at least one entry
    pub fn streams(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    fn next_failure(&self) -> Option<FailMode> {
        if let Some(mode) = *self.fail_forever.lock() {
            return Some(mode);
        }
        let remaining = self.fail_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_remaining.store(remaining - 1, Ordering::SeqCst);
            return Some(FailMode::Retryable);
        }
        None
    }
}

#[async_trait]
impl StreamStore for MockStreamStore {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn append(&self, target: &StreamTarget, records: &[StreamRecord]) -> Result<Vec<String>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        match self.next_failure() {
            Some(FailMode::Retryable) => {
                return Err(SinkError::connection("injected transient failure"))
            }
            Some(FailMode::Fatal) => return Err(SinkError::Store("injected fatal failure".into())),
            None => {}
        }

        let mut entries = self.entries.lock();
        let stream = entries.entry(target.as_str().to_string()).or_default();
        let mut ids = Vec::with_capacity(records.len());
        for record in records {
            let id = format!("0-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
            stream.push(record.json.clone());
            ids.push(id);
        }
        Ok(ids)
    }
}

/// Reporter that collects reported failures for assertions
#[derive(Debug, Default)]
pub struct CollectingReporter {
    reports: Mutex<Vec<String>>,
}

impl CollectingReporter {
    /// Create an empty reporter
    pub fn new() -> Self {
        Self::default()
    }

    /// Rendered messages of everything reported so far
    pub fn reports(&self) -> Vec<String> {
        self.reports.lock().clone()
    }
}

impl FailureReporter for CollectingReporter {
    fn report(&self, error: &SinkError) {
        self.reports.lock().push(error.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::route::Router;

    fn record(json: &str) -> StreamRecord {
        StreamRecord {
            json: json.to_string(),
        }
    }

    #[tokio::test]
    async fn records_appends_in_order() {
        let store = MockStreamStore::new();
        let target = Router::new("", "events").target_for_table("t");

        store.append(&target, &[record("a"), record("b")]).await.unwrap();
        store.append(&target, &[record("c")]).await.unwrap();

        assert_eq!(store.entries_for("events:t"), vec!["a", "b", "c"]);
        assert_eq!(store.append_attempts(), 2);
    }

    #[tokio::test]
    async fn injected_failures_record_nothing() {
        let store = MockStreamStore::new().fail_times(1);
        let target = Router::new("", "events").target_for_table("t");

        assert!(store.append(&target, &[record("a")]).await.is_err());
        assert!(store.entries_for("events:t").is_empty());

        store.append(&target, &[record("a")]).await.unwrap();
        assert_eq!(store.entries_for("events:t").len(), 1);
    }
}
