//! Message bus records, subscriptions, and the in-process bus implementation.

pub mod memory;

pub use memory::InMemoryBus;

use tokio::sync::mpsc;

/// A record as delivered to a subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusRecord {
    pub topic: String,
    pub partition: u32,
    /// Position of the record within its partition, starting at 0.
    pub offset: u64,
    pub key: String,
    pub payload: String,
}

/// Where a published record was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordMetadata {
    pub topic: String,
    pub partition: u32,
    pub offset: u64,
}

/// Errors returned by bus operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BusError {
    #[error("message bus is closed")]
    Closed,
}

/// One member's view of a consumer group subscription.
#[derive(Debug)]
pub struct Subscription {
    pub topic: String,
    pub group: String,
    /// Index of this member within its group at join time.
    pub member_index: u32,
    receiver: mpsc::Receiver<BusRecord>,
}

impl Subscription {
    #[must_use]
    pub fn new(
        topic: impl Into<String>,
        group: impl Into<String>,
        member_index: u32,
        receiver: mpsc::Receiver<BusRecord>,
    ) -> Self {
        Self {
            topic: topic.into(),
            group: group.into(),
            member_index,
            receiver,
        }
    }

    /// Waits for the next record. Returns `None` once the bus has closed
    /// this subscription.
    pub async fn next(&mut self) -> Option<BusRecord> {
        self.receiver.recv().await
    }

    /// Returns the next record if one is already queued.
    pub fn try_next(&mut self) -> Option<BusRecord> {
        self.receiver.try_recv().ok()
    }
}
