//! Key-to-partition routing and consumer-group partition assignment.
//!
//! Records are published with a key (the request id). The partition of a
//! record is `fnv1a_hash(key) % partition_count`, so every record for the
//! same id lands on the same partition and keeps its relative order.
//!
//! - [`DEFAULT_PARTITION_COUNT`]: partitions per topic when not configured
//! - [`hash_to_partition`]: maps a key to a partition ID in `[0, partition_count)`
//! - [`assign_partitions`]: round-robin split of partitions across group members

use crate::hash::fnv1a_hash;

/// Default number of partitions per topic.
pub const DEFAULT_PARTITION_COUNT: u32 = 12;

// ---------------------------------------------------------------------------
// hash_to_partition
// ---------------------------------------------------------------------------

/// Compute the partition ID for a record key.
///
/// A `partition_count` of zero is treated as a single partition.
///
/// # Examples
///
/// ```
/// use calcbus_core::partition::hash_to_partition;
///
/// assert_eq!(hash_to_partition("hello", 271), 95);
/// assert_eq!(hash_to_partition("anything", 1), 0);
/// ```
#[must_use]
pub fn hash_to_partition(key: &str, partition_count: u32) -> u32 {
    fnv1a_hash(key) % partition_count.max(1)
}

// ---------------------------------------------------------------------------
// assign_partitions
// ---------------------------------------------------------------------------

/// Returns the partitions owned by member `member_index` of a consumer group
/// with `member_count` members.
///
/// Partition `p` belongs to member `p % member_count`. Every partition has
/// exactly one owner, so each record is delivered to one member per group.
/// Returns an empty list when `member_index >= member_count`.
#[must_use]
pub fn assign_partitions(partition_count: u32, member_index: u32, member_count: u32) -> Vec<u32> {
    if member_index >= member_count {
        return Vec::new();
    }
    (0..partition_count.max(1))
        .filter(|p| p % member_count == member_index)
        .collect()
}

/// Returns the group member that owns `partition_id`.
#[must_use]
pub fn partition_owner(partition_id: u32, member_count: u32) -> u32 {
    partition_id % member_count.max(1)
}
