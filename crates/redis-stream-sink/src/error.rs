//! Error types for the Redis Streams sink
//!
//! The taxonomy separates failures by how they are handled: configuration
//! and connection failures are fatal at `connect`, per-event failures are
//! recovered locally (skip + log), and per-batch delivery failures are
//! retried up to a bound before being escalated as `WriteFailed`.

use crate::event::ChangeEvent;
use thiserror::Error;

/// Result type alias for sink operations
pub type Result<T> = std::result::Result<T, SinkError>;

/// Errors that can occur in the sink pipeline
#[derive(Debug, Error)]
pub enum SinkError {
    /// Configuration validation failed (fatal at connect, never retried)
    #[error("configuration error: {0}")]
    Config(String),

    /// Destination unreachable or authentication failure
    #[error("connection error: {0}")]
    Connection(String),

    /// A flush attempt exceeded its deadline
    #[error("timeout: {0}")]
    Timeout(String),

    /// The destination rejected a command (non-transient backend error)
    #[error("store error: {0}")]
    Store(String),

    /// An event's operation kind cannot be normalized (event is skipped)
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// An event is structurally unusable (event is skipped)
    #[error("malformed event: {0}")]
    MalformedEvent(String),

    /// Event serialization failed
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A batch exhausted its retry budget. Carries the batch so the host
    /// can alert or dead-letter; the sink never silently drops it.
    #[error("write to stream '{stream}' failed after {attempts} attempts: {reason}")]
    WriteFailed {
        /// Destination stream key
        stream: String,
        /// Number of flush attempts made (initial + retries)
        attempts: u32,
        /// Last error observed
        reason: String,
        /// The undelivered events, in capture order
        batch: Vec<ChangeEvent>,
    },

    /// The connector has been closed
    #[error("connector is closed")]
    Closed,

    /// Internal invariant violation
    #[error("internal error: {0}")]
    Internal(String),
}

impl SinkError {
    /// Check if a flush attempt that produced this error may succeed on retry
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Timeout(_))
    }

    /// Check if this error concerns a single event and is recovered locally
    /// (the event is skipped and the pipeline continues)
    pub fn is_event_local(&self) -> bool {
        matches!(self, Self::UnsupportedOperation(_) | Self::MalformedEvent(_))
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a connection error
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Create a malformed-event error
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedEvent(msg.into())
    }
}
