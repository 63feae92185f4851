//! Pending-request registry: correlates published requests with the result
//! records that eventually answer them.
//!
//! Flow:
//! 1. The gateway calls `register(id)` and gets a [`PendingHandle`]
//! 2. The gateway publishes the request keyed by `id`
//! 3. The result listener calls `complete(id, outcome)` for each result
//! 4. The gateway calls `await_completion(handle, timeout)`
//!
//! Each entry owns the sending half of a `oneshot` channel and the handle
//! owns the receiving half. Whoever removes the entry from the map first
//! decides its fate: `complete` removes it and sends, the timeout path and
//! `evict` remove it and drop the sender. Waiting never touches the map.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use calcbus_core::Outcome;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::oneshot;
use tracing::{debug, warn};

// ---------------------------------------------------------------------------
// CorrelationError
// ---------------------------------------------------------------------------

/// Errors returned by the registry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CorrelationError {
    #[error("request id {id} is already pending")]
    DuplicateId { id: String },
    #[error("no result for request {id} within {timeout_ms}ms")]
    Timeout { id: String, timeout_ms: u64 },
    #[error("pending request {id} was evicted before completion")]
    Evicted { id: String },
}

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

/// Lifetime counters of a registry.
#[derive(Debug, Default)]
pub struct PendingStats {
    pub registered: AtomicU64,
    pub completed: AtomicU64,
    pub timed_out: AtomicU64,
    /// Removed by `evict` or by the stale-entry sweep.
    pub evicted: AtomicU64,
    /// Results that found no pending entry (or a caller that had gone).
    pub orphaned: AtomicU64,
    /// Entries released because their handle was dropped unconsumed.
    pub abandoned: AtomicU64,
}

/// Point-in-time copy of [`PendingStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PendingStatsSnapshot {
    pub registered: u64,
    pub completed: u64,
    pub timed_out: u64,
    pub evicted: u64,
    pub orphaned: u64,
    pub abandoned: u64,
}

impl PendingStats {
    #[must_use]
    pub fn snapshot(&self) -> PendingStatsSnapshot {
        PendingStatsSnapshot {
            registered: self.registered.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            timed_out: self.timed_out.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
            orphaned: self.orphaned.load(Ordering::Relaxed),
            abandoned: self.abandoned.load(Ordering::Relaxed),
        }
    }
}

// ---------------------------------------------------------------------------
// PendingEntry / PendingHandle
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct PendingEntry {
    sender: oneshot::Sender<Outcome>,
    /// Distinguishes this registration from a later one reusing the id.
    token: u64,
    created_at: Instant,
}

type EntryMap = DashMap<String, PendingEntry>;

/// Caller-side handle of a pending request.
///
/// Consumed by [`PendingRegistry::await_completion`]. Dropping a handle that
/// was never awaited (for example when the HTTP client disconnects) removes
/// its entry, so abandoned calls do not leak.
#[derive(Debug)]
pub struct PendingHandle {
    id: String,
    token: u64,
    receiver: oneshot::Receiver<Outcome>,
    entries: Arc<EntryMap>,
    stats: Arc<PendingStats>,
}

impl PendingHandle {
    /// Correlation id of this request.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Removes this handle's own entry. Returns `false` when the entry was
    /// already taken by a completion or an eviction.
    fn release(&self) -> bool {
        self.entries
            .remove_if(&self.id, |_, entry| entry.token == self.token)
            .is_some()
    }
}

impl Drop for PendingHandle {
    fn drop(&mut self) {
        if self.release() {
            self.stats.abandoned.fetch_add(1, Ordering::Relaxed);
            debug!(request_id = %self.id, "pending request abandoned by caller");
        }
    }
}

// ---------------------------------------------------------------------------
// PendingRegistry
// ---------------------------------------------------------------------------

/// Concurrency-safe table of in-flight requests.
///
/// Uses a sharded `DashMap`, so operations on different ids rarely contend
/// and no lock is held while a caller waits.
#[derive(Debug, Default)]
pub struct PendingRegistry {
    entries: Arc<EntryMap>,
    stats: Arc<PendingStats>,
    next_token: AtomicU64,
}

impl PendingRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `id` as pending.
    ///
    /// # Errors
    ///
    /// Returns `CorrelationError::DuplicateId` if `id` is already pending.
    pub fn register(&self, id: &str) -> Result<PendingHandle, CorrelationError> {
        match self.entries.entry(id.to_string()) {
            Entry::Occupied(_) => Err(CorrelationError::DuplicateId { id: id.to_string() }),
            Entry::Vacant(slot) => {
                let token = self.next_token.fetch_add(1, Ordering::Relaxed);
                let (sender, receiver) = oneshot::channel();
                slot.insert(PendingEntry {
                    sender,
                    token,
                    created_at: Instant::now(),
                });
                self.stats.registered.fetch_add(1, Ordering::Relaxed);
                debug!(request_id = %id, "registered pending request");

                Ok(PendingHandle {
                    id: id.to_string(),
                    token,
                    receiver,
                    entries: Arc::clone(&self.entries),
                    stats: Arc::clone(&self.stats),
                })
            }
        }
    }

    /// Fulfills the pending request `id` with `outcome`.
    ///
    /// Returns `false` when no entry exists (unknown id, already completed,
    /// timed out, or evicted) or when the waiting caller has gone. The
    /// caller should treat `false` as an orphan result.
    pub fn complete(&self, id: &str, outcome: Outcome) -> bool {
        let Some((_, entry)) = self.entries.remove(id) else {
            self.stats.orphaned.fetch_add(1, Ordering::Relaxed);
            return false;
        };

        let elapsed = entry.created_at.elapsed();
        if entry.sender.send(outcome).is_ok() {
            self.stats.completed.fetch_add(1, Ordering::Relaxed);
            debug!(
                request_id = %id,
                elapsed_ms = elapsed.as_millis(),
                "completed pending request"
            );
            true
        } else {
            self.stats.orphaned.fetch_add(1, Ordering::Relaxed);
            debug!(request_id = %id, "caller gone before completion");
            false
        }
    }

    /// Waits for the outcome of `handle` for at most `timeout`.
    ///
    /// Suspends only the calling task. On timeout the entry is evicted, so
    /// a result arriving later is an orphan. If a completion removes the
    /// entry in the same instant the deadline fires, the delivered outcome
    /// is returned instead of a timeout.
    ///
    /// # Errors
    ///
    /// Returns `CorrelationError::Timeout` when the deadline passes first,
    /// or `CorrelationError::Evicted` when the entry was evicted while
    /// waiting.
    pub async fn await_completion(
        &self,
        handle: PendingHandle,
        timeout: Duration,
    ) -> Result<Outcome, CorrelationError> {
        self.await_until(handle, tokio::time::Instant::now() + timeout, timeout)
            .await
    }

    /// Like [`await_completion`](Self::await_completion), but against a
    /// deadline fixed by the caller. `timeout` is the budget the deadline
    /// was derived from and is only reported in the error.
    ///
    /// A deadline already in the past still delivers an outcome that was
    /// completed before the call.
    ///
    /// # Errors
    ///
    /// Same as [`await_completion`](Self::await_completion).
    pub async fn await_until(
        &self,
        mut handle: PendingHandle,
        deadline: tokio::time::Instant,
        timeout: Duration,
    ) -> Result<Outcome, CorrelationError> {
        match tokio::time::timeout_at(deadline, &mut handle.receiver).await {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(_)) => Err(CorrelationError::Evicted {
                id: handle.id.clone(),
            }),
            Err(_elapsed) => self.resolve_after_deadline(handle, timeout).await,
        }
    }

    /// Settles a handle whose deadline has passed. Releasing the entry
    /// makes it a timeout; if the entry is already gone, whoever took it
    /// decides the outcome.
    async fn resolve_after_deadline(
        &self,
        mut handle: PendingHandle,
        timeout: Duration,
    ) -> Result<Outcome, CorrelationError> {
        if handle.release() {
            self.stats.timed_out.fetch_add(1, Ordering::Relaxed);
            let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
            warn!(request_id = %handle.id, timeout_ms, "pending request timed out");
            return Err(CorrelationError::Timeout {
                id: handle.id.clone(),
                timeout_ms,
            });
        }
        // A completion already sent, or an eviction dropped the sender.
        match (&mut handle.receiver).await {
            Ok(outcome) => Ok(outcome),
            Err(_) => Err(CorrelationError::Evicted {
                id: handle.id.clone(),
            }),
        }
    }

    /// Forcibly removes the pending request `id`. A caller waiting on it
    /// gets `CorrelationError::Evicted`.
    pub fn evict(&self, id: &str) -> bool {
        if self.entries.remove(id).is_some() {
            self.stats.evicted.fetch_add(1, Ordering::Relaxed);
            debug!(request_id = %id, "evicted pending request");
            true
        } else {
            false
        }
    }

    /// Removes entries older than `max_age`. Returns how many were removed.
    pub fn sweep_expired(&self, max_age: Duration) -> usize {
        let mut removed = 0;
        self.entries.retain(|id, entry| {
            let age = entry.created_at.elapsed();
            if age > max_age {
                warn!(
                    request_id = %id,
                    age_ms = age.as_millis(),
                    "sweeping stale pending request"
                );
                removed += 1;
                false
            } else {
                true
            }
        });
        self.stats
            .evicted
            .fetch_add(u64::try_from(removed).unwrap_or(u64::MAX), Ordering::Relaxed);
        removed
    }

    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_pending(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    #[must_use]
    pub fn stats(&self) -> &PendingStats {
        &self.stats
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
