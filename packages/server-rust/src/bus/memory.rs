//! In-process partitioned message bus.
//!
//! Topics are created on first use with a fixed number of partitions. A
//! record's partition is `hash_to_partition(key)`, and each partition keeps
//! its own offset counter. Every consumer group subscribed to a topic gets
//! each record once, delivered to the member that owns the partition
//! (`partition % member_count`).
//!
//! Delivery goes through bounded mpsc channels, so a slow consumer applies
//! backpressure to publishers on the partitions it owns. The bus keeps no
//! log: a record published while a topic has no subscribers is dropped.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use calcbus_core::partition::{assign_partitions, hash_to_partition, partition_owner};
use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use super::{BusError, BusRecord, RecordMetadata, Subscription};
use crate::traits::MessageBus;

/// Per-topic state: one offset counter per partition and the members of
/// each consumer group.
#[derive(Debug)]
struct Topic {
    /// Next offset per partition. Held across delivery so records of one
    /// partition reach subscribers in offset order.
    partitions: Vec<Mutex<u64>>,
    groups: RwLock<BTreeMap<String, Vec<mpsc::Sender<BusRecord>>>>,
}

impl Topic {
    fn new(partition_count: u32) -> Self {
        Self {
            partitions: (0..partition_count).map(|_| Mutex::new(0)).collect(),
            groups: RwLock::new(BTreeMap::new()),
        }
    }

    /// Sender of the member owning `partition` in `group`, if the group has
    /// any live member.
    fn owner(&self, group: &str, partition: u32) -> Option<mpsc::Sender<BusRecord>> {
        let groups = self.groups.read();
        let members = groups.get(group)?;
        if members.is_empty() {
            return None;
        }
        let count = u32::try_from(members.len()).unwrap_or(u32::MAX);
        members
            .get(partition_owner(partition, count) as usize)
            .cloned()
    }

    fn prune_closed(&self, group: &str) {
        if let Some(members) = self.groups.write().get_mut(group) {
            members.retain(|m| !m.is_closed());
        }
    }
}

/// Partitioned publish/subscribe bus living inside the process.
#[derive(Debug)]
pub struct InMemoryBus {
    partition_count: u32,
    channel_capacity: usize,
    topics: DashMap<String, Arc<Topic>>,
    closed: AtomicBool,
}

impl InMemoryBus {
    /// Creates a bus whose topics have `partition_count` partitions and
    /// whose subscriptions buffer up to `channel_capacity` records.
    #[must_use]
    pub fn new(partition_count: u32, channel_capacity: usize) -> Self {
        Self {
            partition_count: partition_count.max(1),
            channel_capacity: channel_capacity.max(1),
            topics: DashMap::new(),
            closed: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn partition_count(&self) -> u32 {
        self.partition_count
    }

    /// Closes the bus. Pending subscriptions drain what they already hold
    /// and then end; further publishes and subscribes fail with `Closed`.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        for topic in &self.topics {
            topic.value().groups.write().clear();
        }
        info!("in-memory bus closed");
    }

    fn topic(&self, name: &str) -> Arc<Topic> {
        Arc::clone(
            self.topics
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(Topic::new(self.partition_count)))
                .value(),
        )
    }

    fn ensure_open(&self) -> Result<(), BusError> {
        if self.closed.load(Ordering::SeqCst) {
            Err(BusError::Closed)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl MessageBus for InMemoryBus {
    async fn publish(
        &self,
        topic: &str,
        key: &str,
        payload: String,
    ) -> Result<RecordMetadata, BusError> {
        self.ensure_open()?;
        let state = self.topic(topic);
        let partition = hash_to_partition(key, self.partition_count);

        let mut next_offset = state.partitions[partition as usize].lock().await;
        let offset = *next_offset;
        *next_offset += 1;

        let record = BusRecord {
            topic: topic.to_string(),
            partition,
            offset,
            key: key.to_string(),
            payload,
        };

        let groups: Vec<String> = state.groups.read().keys().cloned().collect();
        if groups.is_empty() {
            debug!(topic, partition, offset, "no subscribers, record dropped");
        }

        for group in groups {
            // Retry on the next owner when a member has gone away.
            while let Some(tx) = state.owner(&group, partition) {
                if tx.send(record.clone()).await.is_ok() {
                    break;
                }
                warn!(topic, group = %group, partition, "group member gone, rebalancing");
                state.prune_closed(&group);
            }
        }

        Ok(RecordMetadata {
            topic: topic.to_string(),
            partition,
            offset,
        })
    }

    async fn subscribe(&self, topic: &str, group: &str) -> Result<Subscription, BusError> {
        self.ensure_open()?;
        let state = self.topic(topic);
        let (tx, rx) = mpsc::channel(self.channel_capacity);

        let (member_index, member_count) = {
            let mut groups = state.groups.write();
            let members = groups.entry(group.to_string()).or_default();
            members.retain(|m| !m.is_closed());
            members.push(tx);
            let count = u32::try_from(members.len()).unwrap_or(u32::MAX);
            (count - 1, count)
        };

        // Ownership is recomputed on every publish, so this is the
        // assignment as of joining.
        let partitions = assign_partitions(self.partition_count, member_index, member_count);
        info!(topic, group, member_index, member_count, ?partitions, "subscribed");
        Ok(Subscription::new(topic, group, member_index, rx))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn subscriber_receives_published_record() {
        let bus = InMemoryBus::new(4, 16);
        let mut sub = bus.subscribe("requests", "workers").await.unwrap();

        let meta = bus
            .publish("requests", "12345", "12345,sum,10,5".to_string())
            .await
            .unwrap();

        let record = sub.next().await.unwrap();
        assert_eq!(record.payload, "12345,sum,10,5");
        assert_eq!(record.key, "12345");
        assert_eq!(record.partition, meta.partition);
        assert_eq!(record.offset, 0);
        assert_eq!(meta.partition, hash_to_partition("12345", 4));
    }

    #[tokio::test]
    async fn same_key_gets_increasing_offsets_on_one_partition() {
        let bus = InMemoryBus::new(8, 16);
        let mut sub = bus.subscribe("t", "g").await.unwrap();

        for i in 0..5 {
            bus.publish("t", "same-key", format!("m{i}")).await.unwrap();
        }

        let mut offsets = Vec::new();
        let mut partitions = std::collections::HashSet::new();
        for _ in 0..5 {
            let r = sub.next().await.unwrap();
            offsets.push(r.offset);
            partitions.insert(r.partition);
        }
        assert_eq!(offsets, vec![0, 1, 2, 3, 4]);
        assert_eq!(partitions.len(), 1);
    }

    #[tokio::test]
    async fn every_group_gets_each_record_once() {
        let bus = InMemoryBus::new(4, 16);
        let mut a = bus.subscribe("t", "group-a").await.unwrap();
        let mut b = bus.subscribe("t", "group-b").await.unwrap();

        bus.publish("t", "k", "payload".to_string()).await.unwrap();

        assert_eq!(a.next().await.unwrap().payload, "payload");
        assert_eq!(b.next().await.unwrap().payload, "payload");
        assert!(a.try_next().is_none());
        assert!(b.try_next().is_none());
    }

    #[tokio::test]
    async fn members_of_one_group_split_partitions() {
        let bus = InMemoryBus::new(6, 64);
        let mut m0 = bus.subscribe("t", "g").await.unwrap();
        let mut m1 = bus.subscribe("t", "g").await.unwrap();
        assert_eq!(m0.member_index, 0);
        assert_eq!(m1.member_index, 1);

        for i in 0..40 {
            bus.publish("t", &format!("key-{i}"), i.to_string()).await.unwrap();
        }

        let mut total = 0;
        while let Some(r) = m0.try_next() {
            assert_eq!(partition_owner(r.partition, 2), 0);
            total += 1;
        }
        while let Some(r) = m1.try_next() {
            assert_eq!(partition_owner(r.partition, 2), 1);
            total += 1;
        }
        assert_eq!(total, 40);
    }

    #[tokio::test]
    async fn dropped_member_is_pruned_and_record_redelivered() {
        let bus = InMemoryBus::new(2, 16);
        let m0 = bus.subscribe("t", "g").await.unwrap();
        let mut m1 = bus.subscribe("t", "g").await.unwrap();
        drop(m0);

        for i in 0..6 {
            bus.publish("t", &format!("k{i}"), i.to_string()).await.unwrap();
        }

        let mut received = 0;
        while m1.try_next().is_some() {
            received += 1;
        }
        assert_eq!(received, 6);
    }

    #[tokio::test]
    async fn publish_without_subscribers_still_advances_offsets() {
        let bus = InMemoryBus::new(1, 4);
        bus.publish("t", "a", "x".to_string()).await.unwrap();
        bus.publish("t", "b", "y".to_string()).await.unwrap();

        let mut sub = bus.subscribe("t", "g").await.unwrap();
        let meta = bus.publish("t", "c", "z".to_string()).await.unwrap();
        assert_eq!(meta.offset, 2);
        let record = sub.next().await.unwrap();
        assert_eq!(record.payload, "z");
        assert_eq!(record.offset, 2);
    }

    #[tokio::test]
    async fn close_ends_subscriptions_and_rejects_publish() {
        let bus = InMemoryBus::new(2, 4);
        let mut sub = bus.subscribe("t", "g").await.unwrap();
        bus.close();

        let next = tokio::time::timeout(Duration::from_secs(1), sub.next())
            .await
            .unwrap();
        assert!(next.is_none());

        let err = bus.publish("t", "k", "x".to_string()).await.unwrap_err();
        assert_eq!(err, BusError::Closed);
        assert!(matches!(
            bus.subscribe("t", "g").await,
            Err(BusError::Closed)
        ));
    }
}
