use async_trait::async_trait;

use crate::bus::{BusError, RecordMetadata, Subscription};

/// Keyed, partitioned publish/subscribe transport.
///
/// Implementations: `InMemoryBus` (single process, tests). A networked
/// broker client plugs in behind the same trait.
///
/// Delivery contract expected by the rest of the server:
/// - at-least-once delivery to every subscribed consumer group
/// - exactly one member of a group receives a given record
/// - records with the same key land on the same partition and keep their
///   publish order; there is no ordering across partitions
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Publish `payload` on `topic`, routed to a partition by `key`.
    async fn publish(
        &self,
        topic: &str,
        key: &str,
        payload: String,
    ) -> Result<RecordMetadata, BusError>;

    /// Join consumer group `group` on `topic`.
    ///
    /// The returned subscription yields every record routed to the
    /// partitions this member owns.
    async fn subscribe(&self, topic: &str, group: &str) -> Result<Subscription, BusError>;
}
