//! Connector configuration
//!
//! Loaded once at `connect`, immutable for the connector's lifetime.
//! Deserialized with serde (the host may hand over raw YAML), validated
//! with `validator` rules — violations are fatal `Config` errors at
//! connect, never per-event.

use crate::error::{Result, SinkError};
use crate::retry::RetryPolicy;
use crate::types::Password;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::Validate;

/// Configuration for the Redis Streams sink connector
#[derive(Debug, Clone, Deserialize, Serialize, Validate, JsonSchema)]
pub struct RedisSinkConfig {
    /// Redis host
    #[serde(default = "default_host")]
    #[validate(length(min = 1))]
    pub host: String,

    /// Redis port
    #[serde(default = "default_port")]
    #[validate(range(min = 1))]
    pub port: u16,

    /// Redis password (AUTH), if required
    #[serde(default)]
    pub password: Option<Password>,

    /// Connect with TLS (`rediss://`)
    #[serde(default)]
    pub ssl: bool,

    /// Base name shared by all destination streams
    #[serde(default = "default_stream_base_name")]
    #[validate(length(min = 1))]
    pub stream_base_name: String,

    /// Namespace prefix applied to every stream key (may be empty)
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Events per batch; a batch flushes the moment it reaches this size
    #[serde(default = "default_batch_size")]
    #[validate(range(min = 1, max = 100_000))]
    pub batch_size: usize,

    /// Identifying columns used to synthesize DELETE tombstones
    #[serde(default = "default_key_fields")]
    #[validate(length(min = 1))]
    pub key_fields: Vec<String>,

    /// Time-based flush bound for partially filled batches, in milliseconds
    #[serde(default = "default_linger_ms")]
    pub linger_ms: u64,

    /// Maximum outstanding batches per stream before `write` blocks
    #[serde(default = "default_max_in_flight")]
    #[validate(range(min = 1, max = 1_024))]
    pub max_in_flight: usize,

    /// Deadline for a single flush attempt, in milliseconds
    #[serde(default = "default_flush_timeout_ms")]
    #[validate(range(min = 100, max = 600_000))]
    pub flush_timeout_ms: u64,

    /// Deadline for establishing the connection at `connect`, in milliseconds
    #[serde(default = "default_connect_timeout_ms")]
    #[validate(range(min = 100, max = 600_000))]
    pub connect_timeout_ms: u64,

    /// Backoff policy for retryable flush failures
    #[serde(default)]
    #[validate(nested)]
    pub retry: RetryPolicy,
}

fn default_host() -> String {
    "localhost".to_string()
}
fn default_port() -> u16 {
    6379
}
fn default_stream_base_name() -> String {
    "gluesync_events".to_string()
}
fn default_key_prefix() -> String {
    "gluesync:".to_string()
}
fn default_batch_size() -> usize {
    100
}
fn default_key_fields() -> Vec<String> {
    vec!["id".to_string()]
}
fn default_linger_ms() -> u64 {
    500
}
fn default_max_in_flight() -> usize {
    4
}
fn default_flush_timeout_ms() -> u64 {
    30_000
}
fn default_connect_timeout_ms() -> u64 {
    10_000
}

impl Default for RedisSinkConfig {
    fn default() -> Self {
        // serde's defaults and Default must agree; an empty mapping is the
        // all-defaults config
        serde_yaml::from_str("{}").expect("empty config must deserialize")
    }
}

impl RedisSinkConfig {
    /// Parse a raw host-supplied YAML value
    pub fn from_yaml(value: &serde_yaml::Value) -> Result<Self> {
        serde_yaml::from_value(value.clone())
            .map_err(|e| SinkError::config(format!("invalid sink config: {e}")))
    }

    /// Run validation rules, mapping violations to a fatal `Config` error
    pub fn ensure_valid(&self) -> Result<()> {
        self.validate()
            .map_err(|e| SinkError::config(e.to_string()))
    }

    /// Per-attempt flush deadline
    pub fn flush_timeout(&self) -> Duration {
        Duration::from_millis(self.flush_timeout_ms)
    }

    /// Connection establishment deadline
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Linger bound for time-based flushes
    pub fn linger(&self) -> Duration {
        Duration::from_millis(self.linger_ms)
    }
}
