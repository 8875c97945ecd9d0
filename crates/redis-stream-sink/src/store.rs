//! Destination store seam
//!
//! `StreamStore` is the trait boundary between the delivery executor and
//! the destination; `RedisStreamStore` is the production implementation on
//! top of the `redis` crate's multiplexed connection manager. Appends go
//! out as one pipelined MULTI/EXEC round trip, so a batch is acknowledged
//! all-or-nothing — partial acknowledgment is unreachable.

use crate::config::RedisSinkConfig;
use crate::error::{Result, SinkError};
use crate::event::StreamRecord;
use crate::route::StreamTarget;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{Client, ConnectionAddr, ConnectionInfo, RedisConnectionInfo};
use tracing::{debug, info};

/// Append-only destination for encoded stream records
#[async_trait]
pub trait StreamStore: Send + Sync + 'static {
    /// Verify the destination is reachable
    async fn ping(&self) -> Result<()>;

    /// Append all records to the target stream in order, in one pipelined
    /// round trip. Returns the assigned entry ids. Either every record is
    /// acknowledged or none is.
    async fn append(&self, target: &StreamTarget, records: &[StreamRecord]) -> Result<Vec<String>>;
}

/// Redis Streams implementation of [`StreamStore`]
pub struct RedisStreamStore {
    manager: ConnectionManager,
}

impl RedisStreamStore {
    /// Establish the connection described by `config` and verify it with a
    /// PING, all within the configured connect timeout.
    pub async fn connect(config: &RedisSinkConfig) -> Result<Self> {
        let client = Client::open(connection_info(config))
            .map_err(|e| SinkError::connection(format!("invalid connection parameters: {e}")))?;

        let manager = tokio::time::timeout(config.connect_timeout(), ConnectionManager::new(client))
            .await
            .map_err(|_| {
                SinkError::connection(format!(
                    "connection to {}:{} timed out after {}ms",
                    config.host, config.port, config.connect_timeout_ms
                ))
            })?
            .map_err(map_redis_err)?;

        let store = Self { manager };
        store.ping().await?;
        info!(
            "connected to redis at {}:{} (ssl: {})",
            config.host, config.port, config.ssl
        );
        Ok(store)
    }
}

#[async_trait]
impl StreamStore for RedisStreamStore {
    async fn ping(&self) -> Result<()> {
        let mut conn = self.manager.clone();
        let reply: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(map_redis_err)?;
        if reply == "PONG" {
            Ok(())
        } else {
            Err(SinkError::connection(format!("unexpected PING reply: {reply}")))
        }
    }

    async fn append(&self, target: &StreamTarget, records: &[StreamRecord]) -> Result<Vec<String>> {
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let mut pipe = redis::pipe();
        pipe.atomic();
        for record in records {
            pipe.cmd("XADD")
                .arg(target.as_str())
                .arg("*")
                .arg("event")
                .arg(record.json.as_str());
        }

        let mut conn = self.manager.clone();
        let ids: Vec<String> = pipe.query_async(&mut conn).await.map_err(map_redis_err)?;
        debug!("appended {} entries to stream {}", ids.len(), target);
        Ok(ids)
    }
}

/// Translate connection parameters without going through a URL, so
/// passwords never need escaping.
fn connection_info(config: &RedisSinkConfig) -> ConnectionInfo {
    let addr = if config.ssl {
        ConnectionAddr::TcpTls {
            host: config.host.clone(),
            port: config.port,
            insecure: false,
            tls_params: None,
        }
    } else {
        ConnectionAddr::Tcp(config.host.clone(), config.port)
    };

    ConnectionInfo {
        addr,
        redis: RedisConnectionInfo {
            password: config.password.as_ref().map(|p| p.expose().to_string()),
            ..Default::default()
        },
    }
}

/// Classify redis errors into the sink taxonomy: transport-level problems
/// are retryable connection errors, command rejections are not.
fn map_redis_err(err: redis::RedisError) -> SinkError {
    use redis::ErrorKind;

    if err.is_timeout() {
        return SinkError::Timeout(err.to_string());
    }
    if err.is_io_error()
        || err.is_connection_dropped()
        || err.is_connection_refusal()
        || matches!(err.kind(), ErrorKind::BusyLoadingError | ErrorKind::TryAgain)
    {
        return SinkError::Connection(err.to_string());
    }
    if err.kind() == ErrorKind::AuthenticationFailed {
        return SinkError::Connection(format!("authentication failed: {err}"));
    }
    SinkError::Store(err.to_string())
}
