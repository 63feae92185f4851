//! Worker dispatcher: request record in, result record out.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use calcbus_core::{
    diagnostics, CalculationRequest, CalculationResult, EvalError, Evaluator,
};
use tracing::{debug, error, warn};

use crate::bus::BusRecord;
use crate::service::worker::RecordHandler;
use crate::traits::MessageBus;

/// Counters kept by a [`WorkerDispatcher`].
#[derive(Debug, Default)]
pub struct DispatcherStats {
    /// Request records consumed.
    pub processed: AtomicU64,
    /// Requests answered with a diagnostic instead of a value.
    pub failed: AtomicU64,
    /// Result records that could not be published.
    pub publish_failures: AtomicU64,
}

/// Evaluates request records and publishes one result record for each.
///
/// Never retries: every inbound record yields exactly one publish attempt,
/// and no error stops the consuming loop.
pub struct WorkerDispatcher {
    evaluator: Evaluator,
    bus: Arc<dyn MessageBus>,
    result_topic: String,
    stats: Arc<DispatcherStats>,
}

impl WorkerDispatcher {
    #[must_use]
    pub fn new(evaluator: Evaluator, bus: Arc<dyn MessageBus>, result_topic: impl Into<String>) -> Self {
        Self {
            evaluator,
            bus,
            result_topic: result_topic.into(),
            stats: Arc::new(DispatcherStats::default()),
        }
    }

    /// Shared handle to the counters, readable after the dispatcher has
    /// moved into its worker task.
    #[must_use]
    pub fn stats(&self) -> Arc<DispatcherStats> {
        Arc::clone(&self.stats)
    }

    /// Turns one request payload into its result. Pure apart from logging.
    #[must_use]
    pub fn process(&self, payload: &str) -> CalculationResult {
        let request = match CalculationRequest::parse(payload) {
            Ok(request) => request,
            Err(e) => {
                let id = CalculationRequest::recover_id(payload).unwrap_or_default();
                warn!(request_id = %id, error = %e, "malformed request record");
                return CalculationResult::failure(id, diagnostics::PROCESSING_ERROR);
            }
        };

        match self.evaluator.evaluate_text(
            &request.operation,
            &request.operand1,
            &request.operand2,
        ) {
            Ok(value) => CalculationResult::success(request.id, &value),
            Err(e) => {
                debug!(request_id = %request.id, error = %e, "request failed evaluation");
                let tag = match e {
                    EvalError::UnknownOperation { .. } => diagnostics::INVALID_OPERATION,
                    EvalError::InvalidOperand { .. } | EvalError::DivisionByZero => {
                        diagnostics::PROCESSING_ERROR
                    }
                };
                CalculationResult::failure(request.id, tag)
            }
        }
    }
}

#[async_trait]
impl RecordHandler for WorkerDispatcher {
    async fn handle(&mut self, record: BusRecord) {
        debug!(
            partition = record.partition,
            offset = record.offset,
            key = %record.key,
            "request record received"
        );
        self.stats.processed.fetch_add(1, Ordering::Relaxed);

        let result = self.process(&record.payload);
        if !result.outcome.is_value() {
            self.stats.failed.fetch_add(1, Ordering::Relaxed);
        }
        if result.id.is_empty() {
            error!(
                partition = record.partition,
                offset = record.offset,
                "request record has no id, publishing unroutable diagnostic"
            );
        }

        match self
            .bus
            .publish(&self.result_topic, &result.id, result.to_record())
            .await
        {
            Ok(meta) => debug!(
                request_id = %result.id,
                partition = meta.partition,
                offset = meta.offset,
                "result published"
            ),
            Err(e) => {
                self.stats.publish_failures.fetch_add(1, Ordering::Relaxed);
                error!(request_id = %result.id, error = %e, "failed to publish result");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
