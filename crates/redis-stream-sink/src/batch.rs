//! Batch accumulation
//!
//! One open batch per destination stream; a batch seals the moment it
//! reaches `batch_size` entries or its linger deadline passes. Insertion
//! order within a batch equals capture order, and a sealed batch is never
//! touched again — the executor takes it by move. Purely in-memory, no
//! observable failure modes.

use crate::event::ChangeEvent;
use crate::route::StreamTarget;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// An ordered run of events bound for one stream
#[derive(Debug, Clone, Default)]
pub struct Batch {
    /// Events in capture order
    pub events: Vec<ChangeEvent>,
}

impl Batch {
    /// Number of events in the batch
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Check if the batch is empty
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Iterate over events in capture order
    pub fn iter(&self) -> impl Iterator<Item = &ChangeEvent> {
        self.events.iter()
    }
}

impl IntoIterator for Batch {
    type Item = ChangeEvent;
    type IntoIter = std::vec::IntoIter<ChangeEvent>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.into_iter()
    }
}

#[derive(Debug)]
struct OpenBatch {
    events: Vec<ChangeEvent>,
    opened_at: Instant,
}

/// Groups normalized events into bounded per-stream batches
#[derive(Debug)]
pub struct Accumulator {
    batch_size: usize,
    linger: Duration,
    open: HashMap<StreamTarget, OpenBatch>,
}

impl Accumulator {
    /// Create an accumulator with the configured size bound and linger
    pub fn new(batch_size: usize, linger: Duration) -> Self {
        Self {
            batch_size,
            linger,
            open: HashMap::new(),
        }
    }

    /// Append an event to its stream's open batch.
    ///
    /// Returns the sealed batch when this event fills it; event N+1 then
    /// starts a fresh open batch for that stream.
    pub fn push(&mut self, target: StreamTarget, event: ChangeEvent) -> Option<(StreamTarget, Batch)> {
        let open = self.open.entry(target.clone()).or_insert_with(|| OpenBatch {
            events: Vec::with_capacity(self.batch_size),
            opened_at: Instant::now(),
        });
        open.events.push(event);

        if open.events.len() >= self.batch_size {
            let sealed = self.open.remove(&target).expect("open batch just inserted");
            Some((target, Batch { events: sealed.events }))
        } else {
            None
        }
    }

    /// Seal every open batch whose linger deadline has passed
    pub fn drain_expired(&mut self, now: Instant) -> Vec<(StreamTarget, Batch)> {
        let linger = self.linger;
        let expired: Vec<StreamTarget> = self
            .open
            .iter()
            .filter(|(_, open)| now.duration_since(open.opened_at) >= linger)
            .map(|(target, _)| target.clone())
            .collect();

        expired
            .into_iter()
            .filter_map(|target| {
                self.open
                    .remove(&target)
                    .map(|open| (target, Batch { events: open.events }))
            })
            .collect()
    }

    /// Seal and return every open batch (used by `close`)
    pub fn drain_all(&mut self) -> Vec<(StreamTarget, Batch)> {
        self.open
            .drain()
            .map(|(target, open)| (target, Batch { events: open.events }))
            .collect()
    }

    /// Number of events currently buffered for a stream
    pub fn open_len(&self, target: &StreamTarget) -> usize {
        self.open.get(target).map(|o| o.events.len()).unwrap_or(0)
    }

    /// Total number of buffered events across all streams
    pub fn buffered(&self) -> usize {
        self.open.values().map(|o| o.events.len()).sum()
    }
}
