//! Stream routing
//!
//! Maps a normalized event to its destination stream key. Routing is a
//! total, deterministic function of configuration and the event's table;
//! it has no per-event failure modes — a malformed routing config is
//! rejected at connect time, not here.

use crate::event::ChangeEvent;

/// Destination stream identity, e.g. `gluesync:gluesync_events:customers`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StreamTarget(String);

impl StreamTarget {
    /// The Redis stream key
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for StreamTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Derives stream targets from configuration and event metadata
#[derive(Debug, Clone)]
pub struct Router {
    /// `{key_prefix}{stream_base_name}`, computed once at connect
    namespace: String,
}

impl Router {
    /// Build a router from the configured prefix and base name
    pub fn new(key_prefix: &str, stream_base_name: &str) -> Self {
        Self {
            namespace: format!("{key_prefix}{stream_base_name}"),
        }
    }

    /// Destination stream for an event: `{namespace}:{table}`
    pub fn route(&self, event: &ChangeEvent) -> StreamTarget {
        self.target_for_table(event.table())
    }

    /// Destination stream for a table name
    pub fn target_for_table(&self, table: &str) -> StreamTarget {
        StreamTarget(format!("{}:{}", self.namespace, table))
    }
}
