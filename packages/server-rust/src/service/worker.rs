//! Subscription loop for bus consumers.
//!
//! Provides a `SubscriptionWorker` that drains a bus [`Subscription`] through
//! a `RecordHandler` implementation, with an optional periodic tick callback.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::oneshot;
use tracing::{debug, info};

use crate::bus::{BusRecord, Subscription};

// ---------------------------------------------------------------------------
// RecordHandler trait
// ---------------------------------------------------------------------------

/// Per-record logic run by a `SubscriptionWorker`.
///
/// A handler must not fail the loop: every error is turned into a log line
/// or an outbound record inside `handle`.
#[async_trait]
pub trait RecordHandler: Send + 'static {
    /// Process a single delivered record.
    async fn handle(&mut self, record: BusRecord);

    /// Called periodically (on each tick interval). Default is a no-op.
    async fn on_tick(&mut self) {}

    /// Called once when the worker is shutting down. Default is a no-op.
    async fn shutdown(&mut self) {}
}

// ---------------------------------------------------------------------------
// SubscriptionWorker
// ---------------------------------------------------------------------------

/// Background task consuming one subscription.
///
/// The spawned task:
/// 1. Waits for the next record on the subscription
/// 2. Calls `RecordHandler::handle()` for it, one record at a time
/// 3. Calls `RecordHandler::on_tick()` at the configured interval
/// 4. Calls `RecordHandler::shutdown()` when stopped or when the bus closes
///    the subscription
pub struct SubscriptionWorker {
    name: String,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl SubscriptionWorker {
    /// Spawns the loop for `subscription` driven by `handler`.
    pub fn start<H: RecordHandler>(
        name: impl Into<String>,
        mut handler: H,
        mut subscription: Subscription,
        tick_interval_ms: u64,
    ) -> Self {
        let name = name.into();
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let task_name = name.clone();

        let handle = tokio::spawn(async move {
            let mut tick_interval =
                tokio::time::interval(Duration::from_millis(tick_interval_ms.max(1)));
            // Skip the first immediate tick so on_tick doesn't fire at startup.
            tick_interval.tick().await;

            info!(
                worker = %task_name,
                topic = %subscription.topic,
                group = %subscription.group,
                member_index = subscription.member_index,
                "subscription worker started"
            );

            loop {
                tokio::select! {
                    record = subscription.next() => {
                        if let Some(record) = record {
                            handler.handle(record).await;
                        } else {
                            debug!(worker = %task_name, "subscription closed");
                            break;
                        }
                    }
                    _ = tick_interval.tick() => {
                        handler.on_tick().await;
                    }
                    _ = &mut shutdown_rx => {
                        break;
                    }
                }
            }

            handler.shutdown().await;
            info!(worker = %task_name, "subscription worker stopped");
        });

        Self {
            name,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the loop task is still alive.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stops the loop and waits for the handler's shutdown hook to finish.
    /// A record already being handled completes first.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
