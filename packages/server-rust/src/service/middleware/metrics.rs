//! Instrumentation middleware for gateway calls.
//!
//! Records call duration and outcome in a `tracing` span per call.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use tower::{Layer, Service};
use tracing::{info_span, Instrument};

use crate::service::operation::{CalculationCall, GatewayError, GatewayReply};

// ---------------------------------------------------------------------------
// MetricsLayer
// ---------------------------------------------------------------------------

/// Tower layer that wraps each call in a `calculation` span.
#[derive(Debug, Clone)]
pub struct MetricsLayer;

impl<S> Layer<S> for MetricsLayer {
    type Service = MetricsService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        MetricsService { inner }
    }
}

// ---------------------------------------------------------------------------
// MetricsService
// ---------------------------------------------------------------------------

/// Service wrapper that records call duration and outcome in tracing spans.
#[derive(Debug, Clone)]
pub struct MetricsService<S> {
    inner: S,
}

/// Short label of a call's outcome for span fields.
fn outcome_label(result: &Result<GatewayReply, GatewayError>) -> &'static str {
    use crate::service::registry::CorrelationError;

    match result {
        Ok(_) => "ok",
        Err(GatewayError::InvalidOperand { .. }) => "invalid_operand",
        Err(GatewayError::DivisionByZero) => "division_by_zero",
        Err(GatewayError::Correlation(CorrelationError::Timeout { .. })) => "timeout",
        Err(GatewayError::Correlation(_)) => "correlation_error",
        Err(GatewayError::Publish { .. }) => "publish_error",
        Err(GatewayError::Failed { .. }) => "failed",
        Err(GatewayError::Overloaded) => "overloaded",
    }
}

impl<S> Service<CalculationCall> for MetricsService<S>
where
    S: Service<CalculationCall, Response = GatewayReply, Error = GatewayError> + Send,
    S::Future: Send + 'static,
{
    type Response = GatewayReply;
    type Error = GatewayError;
    type Future = Pin<Box<dyn Future<Output = Result<GatewayReply, GatewayError>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, call: CalculationCall) -> Self::Future {
        let operation = call.operation;

        let span = info_span!(
            "calculation",
            operation = %operation,
            request_id = tracing::field::Empty,
            duration_ms = tracing::field::Empty,
            outcome = tracing::field::Empty,
        );

        let fut = self.inner.call(call);

        Box::pin(
            async move {
                let start = Instant::now();
                let result = fut.await;

                #[allow(clippy::cast_possible_truncation)]
                let duration_ms = start.elapsed().as_millis() as u64;
                let outcome = outcome_label(&result);
                let request_id = match &result {
                    Ok(reply) => Some(reply.request_id.as_str()),
                    Err(e) => e.request_id(),
                };

                let span = tracing::Span::current();
                span.record("duration_ms", duration_ms);
                span.record("outcome", outcome);
                if let Some(id) = request_id {
                    span.record("request_id", id);
                }

                tracing::info!(
                    operation = %operation,
                    duration_ms,
                    outcome,
                    "calculation complete"
                );

                result
            }
            .instrument(span),
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
