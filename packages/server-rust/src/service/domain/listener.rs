//! Result listener: routes result records to the pending registry.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use calcbus_core::CalculationResult;
use tracing::{debug, info, warn};

use crate::bus::BusRecord;
use crate::service::registry::PendingRegistry;
use crate::service::worker::RecordHandler;

/// What happened to one result record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenOutcome {
    /// A waiting caller received the outcome.
    Delivered,
    /// No caller was waiting for this id.
    Orphan,
    /// The record could not be decoded.
    Malformed,
}

/// Consumes the result topic on behalf of one gateway instance.
pub struct ResultListener {
    registry: Arc<PendingRegistry>,
    /// Pending entries older than this are swept on each tick.
    stale_after: Duration,
}

impl ResultListener {
    #[must_use]
    pub fn new(registry: Arc<PendingRegistry>, stale_after: Duration) -> Self {
        Self {
            registry,
            stale_after,
        }
    }

    /// Decodes `payload` and completes the matching pending request.
    pub fn route(&self, payload: &str) -> ListenOutcome {
        let result = match CalculationResult::parse(payload) {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, "dropping malformed result record");
                return ListenOutcome::Malformed;
            }
        };

        if self.registry.complete(&result.id, result.outcome) {
            debug!(request_id = %result.id, "result delivered");
            ListenOutcome::Delivered
        } else {
            warn!(request_id = %result.id, "orphan result, no pending request");
            ListenOutcome::Orphan
        }
    }
}

#[async_trait]
impl RecordHandler for ResultListener {
    async fn handle(&mut self, record: BusRecord) {
        self.route(&record.payload);
    }

    async fn on_tick(&mut self) {
        let removed = self.registry.sweep_expired(self.stale_after);
        if removed > 0 {
            info!(removed, "swept stale pending requests");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
