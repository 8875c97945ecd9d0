//! Failure reporting seam
//!
//! The lifecycle controller hands every exhausted batch to a
//! `FailureReporter` before surfacing the error, so the host can wire in
//! alerting or dead-lettering. The default implementation logs with full
//! context.

use crate::error::SinkError;
use tracing::error;

/// Receives batches that exhausted their retry budget
pub trait FailureReporter: Send + Sync {
    /// Called once per permanently failed batch
    fn report(&self, error: &SinkError);
}

/// Default reporter: structured error logging
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl FailureReporter for LogReporter {
    fn report(&self, error: &SinkError) {
        match error {
            SinkError::WriteFailed {
                stream,
                attempts,
                reason,
                batch,
            } => {
                error!(
                    "undelivered batch: stream={} events={} attempts={} reason={}",
                    stream,
                    batch.len(),
                    attempts,
                    reason
                );
            }
            other => error!("delivery failure: {}", other),
        }
    }
}
