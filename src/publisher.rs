// src/publisher.rs
//
// The two shared surfaces between the pipeline loop and the HTTP layer:
// the latest snapshot (whole-value swap) and the encoded frame fan-out.
// Nothing else crosses the thread boundary.

use crate::types::TrafficSnapshot;
use bytes::Bytes;
use parking_lot::RwLock;
use tokio::sync::broadcast;

/// Atomically publishes the latest aggregate snapshot. Writers replace the
/// whole value; readers get a copy and never observe a partial update.
#[derive(Default)]
pub struct StatePublisher {
    inner: RwLock<TrafficSnapshot>,
}

impl StatePublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, snapshot: TrafficSnapshot) {
        *self.inner.write() = snapshot;
    }

    pub fn get(&self) -> TrafficSnapshot {
        self.inner.read().clone()
    }
}

/// One-producer, N-consumer fan-out of encoded frame parts. Every stream
/// connection holds its own receiver; a consumer that stops reading lags
/// and drops frames on its own channel without slowing the producer or
/// the other consumers.
#[derive(Clone)]
pub struct FrameHub {
    tx: broadcast::Sender<Bytes>,
}

impl FrameHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Send a frame to all current subscribers. Having no subscribers is
    /// normal (nobody watching the stream) and not an error.
    pub fn publish(&self, part: Bytes) {
        let _ = self.tx.send(part);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Bytes> {
        self.tx.subscribe()
    }

    pub fn consumer_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
