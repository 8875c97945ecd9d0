//! End-to-end pipeline tests against the in-memory store

use redis_stream_sink::testing::{CollectingReporter, MockStreamStore};
use redis_stream_sink::{
    ChangeEvent, Operation, RedisSinkConfig, RedisSinkConnector, RetryPolicy, SinkError,
    SourceChange,
};
use serde_json::json;
use std::sync::Arc;

fn test_config(batch_size: usize) -> RedisSinkConfig {
    RedisSinkConfig {
        batch_size,
        key_prefix: String::new(),
        stream_base_name: "events".into(),
        // long linger so only the size bound seals batches unless a test
        // wants otherwise
        linger_ms: 60_000,
        retry: RetryPolicy {
            max_retries: 3,
            initial_delay_ms: 1,
            max_delay_ms: 5,
            jitter: 0.0,
            ..RetryPolicy::default()
        },
        ..RedisSinkConfig::default()
    }
}

async fn connect(
    config: RedisSinkConfig,
    store: Arc<MockStreamStore>,
) -> RedisSinkConnector {
    RedisSinkConnector::connect_with_store(config, store)
        .await
        .expect("connect")
}

fn decode(entries: &[String]) -> Vec<ChangeEvent> {
    entries
        .iter()
        .map(|json| serde_json::from_str(json).expect("stream entry decodes"))
        .collect()
}

fn ids(entries: &[String]) -> Vec<i64> {
    decode(entries)
        .iter()
        .map(|e| e.payload["id"].as_i64().unwrap())
        .collect()
}

#[tokio::test]
async fn three_inserts_yield_one_batch_in_submission_order() {
    let store = Arc::new(MockStreamStore::new());
    let mut connector = connect(test_config(3), store.clone()).await;

    let summary = connector
        .write(vec![
            SourceChange::insert("shop", "customers", json!({"id": 1})),
            SourceChange::insert("shop", "customers", json!({"id": 2})),
            SourceChange::insert("shop", "customers", json!({"id": 3})),
        ])
        .await
        .unwrap();

    assert_eq!(summary.accepted, 3);
    assert_eq!(summary.batches_delivered, 1);
    assert_eq!(summary.records_delivered, 3);
    assert_eq!(store.append_attempts(), 1);
    assert_eq!(ids(&store.entries_for("events:customers")), vec![1, 2, 3]);

    connector.close().await.unwrap();
}

#[tokio::test]
async fn batch_size_boundary_event_n_plus_one_starts_a_new_batch() {
    let store = Arc::new(MockStreamStore::new());
    let mut connector = connect(test_config(3), store.clone()).await;

    let changes: Vec<SourceChange> = (1..=4)
        .map(|id| SourceChange::insert("shop", "customers", json!({"id": id})))
        .collect();
    let summary = connector.write(changes).await.unwrap();

    // exactly one batch of 3 flushed; event 4 is still buffered
    assert_eq!(summary.batches_delivered, 1);
    assert_eq!(summary.records_delivered, 3);
    assert_eq!(store.entries_for("events:customers").len(), 3);

    // close flushes the open remainder
    connector.close().await.unwrap();
    assert_eq!(ids(&store.entries_for("events:customers")), vec![1, 2, 3, 4]);
}

#[tokio::test]
async fn per_table_order_holds_with_interleaved_targets() {
    let store = Arc::new(MockStreamStore::new());
    let mut connector = connect(test_config(2), store.clone()).await;

    connector
        .write(vec![
            SourceChange::insert("shop", "customers", json!({"id": 1})),
            SourceChange::insert("shop", "orders", json!({"id": 10})),
            SourceChange::insert("shop", "customers", json!({"id": 2})),
            SourceChange::insert("shop", "orders", json!({"id": 11})),
            SourceChange::insert("shop", "customers", json!({"id": 3})),
            SourceChange::insert("shop", "orders", json!({"id": 12})),
        ])
        .await
        .unwrap();
    connector.close().await.unwrap();

    assert_eq!(ids(&store.entries_for("events:customers")), vec![1, 2, 3]);
    assert_eq!(ids(&store.entries_for("events:orders")), vec![10, 11, 12]);
    assert_eq!(store.streams(), vec!["events:customers", "events:orders"]);
}

#[tokio::test]
async fn delete_entries_are_tombstones() {
    let store = Arc::new(MockStreamStore::new());
    let mut connector = connect(test_config(1), store.clone()).await;

    connector
        .write(vec![SourceChange::delete(
            "shop",
            "customers",
            json!({"id": 42, "name": "Ada", "email": "ada@example.com"}),
        )])
        .await
        .unwrap();

    let events = decode(&store.entries_for("events:customers"));
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].operation, Operation::Delete);
    // payload carries the key field and nothing else
    assert_eq!(events[0].payload.len(), 1);
    assert_eq!(events[0].payload["id"], json!(42));
    // prior state survives on the before side
    assert_eq!(events[0].before.as_ref().unwrap()["email"], json!("ada@example.com"));

    connector.close().await.unwrap();
}

#[tokio::test]
async fn stream_entries_round_trip_to_the_original_event() {
    let store = Arc::new(MockStreamStore::new());
    let mut connector = connect(test_config(1), store.clone()).await;

    connector
        .write(vec![SourceChange::update(
            "shop",
            "orders",
            Some(json!({"id": 3, "total": 10})),
            json!({"id": 3, "total": 12}),
        )])
        .await
        .unwrap();
    connector.close().await.unwrap();

    let events = decode(&store.entries_for("events:orders"));
    assert_eq!(events[0].operation, Operation::Update);
    assert_eq!(events[0].payload["total"], json!(12));
    assert_eq!(events[0].before.as_ref().unwrap()["total"], json!(10));
    assert_eq!(events[0].metadata.table, "orders");
    assert_eq!(events[0].metadata.database, "shop");
}

#[tokio::test]
async fn transient_failures_retry_and_deliver_exactly_once() {
    let store = Arc::new(MockStreamStore::new().fail_times(2));
    let mut connector = connect(test_config(2), store.clone()).await;

    let summary = connector
        .write(vec![
            SourceChange::insert("shop", "customers", json!({"id": 1})),
            SourceChange::insert("shop", "customers", json!({"id": 2})),
        ])
        .await
        .unwrap();

    assert_eq!(summary.batches_delivered, 1);
    // two failed attempts plus the successful third
    assert_eq!(store.append_attempts(), 3);
    // no duplicate entries
    assert_eq!(ids(&store.entries_for("events:customers")), vec![1, 2]);
    assert_eq!(connector.metrics().retries, 2);

    connector.close().await.unwrap();
}

#[tokio::test]
async fn retry_exhaustion_surfaces_write_failed_with_context() {
    let store = Arc::new(MockStreamStore::new().fail_always());
    let reporter = Arc::new(CollectingReporter::new());
    let mut connector = connect(test_config(2), store.clone())
        .await
        .with_reporter(reporter.clone());

    let err = connector
        .write(vec![
            SourceChange::insert("shop", "customers", json!({"id": 1})),
            SourceChange::insert("shop", "customers", json!({"id": 2})),
        ])
        .await
        .unwrap_err();

    match err {
        SinkError::WriteFailed {
            stream,
            attempts,
            batch,
            ..
        } => {
            assert_eq!(stream, "events:customers");
            assert_eq!(attempts, 4); // initial + 3 retries
            assert_eq!(batch.len(), 2);
        }
        other => panic!("expected WriteFailed, got {other:?}"),
    }

    // atomic pipeline: no partial entries appended
    assert!(store.entries_for("events:customers").is_empty());
    // the failure was also reported through the collaborator
    assert_eq!(reporter.reports().len(), 1);
    assert!(reporter.reports()[0].contains("events:customers"));

    connector.close().await.unwrap();
}

#[tokio::test]
async fn failure_on_one_stream_does_not_stop_the_other() {
    // 2 retryable failures hit the first flush; with 3 retries it still
    // succeeds, so both streams deliver even when one struggles
    let store = Arc::new(MockStreamStore::new().fail_times(2));
    let mut connector = connect(test_config(1), store.clone()).await;

    connector
        .write(vec![
            SourceChange::insert("shop", "customers", json!({"id": 1})),
            SourceChange::insert("shop", "orders", json!({"id": 10})),
        ])
        .await
        .unwrap();

    assert_eq!(ids(&store.entries_for("events:customers")), vec![1]);
    assert_eq!(ids(&store.entries_for("events:orders")), vec![10]);

    connector.close().await.unwrap();
}

#[tokio::test]
async fn close_is_idempotent() {
    let store = Arc::new(MockStreamStore::new());
    let mut connector = connect(test_config(10), store.clone()).await;

    connector
        .write(vec![SourceChange::insert("shop", "t", json!({"id": 1}))])
        .await
        .unwrap();

    connector.close().await.unwrap();
    connector.close().await.unwrap();
    assert!(connector.is_closed());

    // the buffered event was flushed exactly once
    assert_eq!(store.entries_for("events:t").len(), 1);
}

#[tokio::test]
async fn close_reports_undeliverable_batches_instead_of_dropping_them() {
    let store = Arc::new(MockStreamStore::new());
    let reporter = Arc::new(CollectingReporter::new());
    let mut connector = connect(test_config(10), store.clone())
        .await
        .with_reporter(reporter.clone());

    connector
        .write(vec![SourceChange::insert("shop", "t", json!({"id": 1}))])
        .await
        .unwrap();

    // destination goes dark before close
    store.fail_from_now_on();
    connector.close().await.unwrap();

    assert!(store.entries_for("events:t").is_empty());
    assert_eq!(reporter.reports().len(), 1);
    assert!(reporter.reports()[0].contains("events:t"));
}

#[tokio::test]
async fn linger_expiry_flushes_partial_batches() {
    let store = Arc::new(MockStreamStore::new());
    let config = RedisSinkConfig {
        linger_ms: 0,
        ..test_config(100)
    };
    let mut connector = connect(config, store.clone()).await;

    connector
        .write(vec![SourceChange::insert("shop", "t", json!({"id": 1}))])
        .await
        .unwrap();

    // far below batch_size, but linger already expired
    assert_eq!(store.entries_for("events:t").len(), 1);

    connector.close().await.unwrap();
}
