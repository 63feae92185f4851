//! Gateway request handler: turns one synchronous call into a correlated
//! publish/await exchange over the bus.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use bigdecimal::{BigDecimal, Zero};
use calcbus_core::{parse_operand, CalculationRequest, Operation, Outcome};
use tokio::time::Instant;
use tower::Service;
use tracing::{debug, warn};

use crate::service::operation::{CalculationCall, GatewayError, GatewayReply};
use crate::service::registry::PendingRegistry;
use crate::traits::MessageBus;

/// Validates calls, publishes them as request records, and waits for the
/// matching result.
pub struct Gateway {
    registry: Arc<PendingRegistry>,
    bus: Arc<dyn MessageBus>,
    request_topic: String,
    timeout: Duration,
}

impl Gateway {
    #[must_use]
    pub fn new(
        registry: Arc<PendingRegistry>,
        bus: Arc<dyn MessageBus>,
        request_topic: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            registry,
            bus,
            request_topic: request_topic.into(),
            timeout,
        }
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<PendingRegistry> {
        &self.registry
    }

    /// Runs one call to completion.
    ///
    /// A zero divisor is rejected before anything is registered or
    /// published.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperand` or `DivisionByZero` for rejected input,
    /// `Publish` when the bus rejected the request, `Correlation` for a
    /// duplicate id, an eviction, or a deadline that passed while publishing
    /// or waiting, and `Failed` when the worker answered with a diagnostic.
    pub async fn calculate(&self, call: CalculationCall) -> Result<GatewayReply, GatewayError> {
        let a = validate_operand("operand1", call.operand1.as_deref())?;
        let b = validate_operand("operand2", call.operand2.as_deref())?;
        if call.operation == Operation::Divide && b.is_zero() {
            return Err(GatewayError::DivisionByZero);
        }

        // One deadline covers both the publish and the wait for the result.
        let deadline = Instant::now() + self.timeout;
        let request_id = uuid::Uuid::new_v4().to_string();
        let handle = self.registry.register(&request_id)?;

        let request = CalculationRequest::new(request_id.clone(), call.operation, &a, &b);
        let published = tokio::time::timeout_at(
            deadline,
            self.bus
                .publish(&self.request_topic, &request_id, request.to_record()),
        )
        .await;
        match published {
            Ok(Ok(meta)) => debug!(
                request_id = %request_id,
                partition = meta.partition,
                offset = meta.offset,
                "request published"
            ),
            Ok(Err(source)) => {
                self.registry.evict(&request_id);
                drop(handle);
                return Err(GatewayError::Publish { request_id, source });
            }
            Err(_elapsed) => warn!(
                request_id = %request_id,
                "bus did not accept the request before the deadline"
            ),
        }

        match self
            .registry
            .await_until(handle, deadline, self.timeout)
            .await?
        {
            Outcome::Value(result) => Ok(GatewayReply { request_id, result }),
            Outcome::Failure(reason) => Err(GatewayError::Failed { request_id, reason }),
        }
    }
}

fn validate_operand(name: &'static str, text: Option<&str>) -> Result<BigDecimal, GatewayError> {
    let text = text.ok_or_else(|| GatewayError::InvalidOperand {
        name,
        reason: "missing".to_string(),
    })?;
    parse_operand(text).map_err(|e| GatewayError::InvalidOperand {
        name,
        reason: e.to_string(),
    })
}

// ---------------------------------------------------------------------------
// GatewayService
// ---------------------------------------------------------------------------

/// `tower::Service` view of a shared [`Gateway`], the innermost service of
/// the gateway pipeline.
#[derive(Clone)]
pub struct GatewayService {
    gateway: Arc<Gateway>,
}

impl GatewayService {
    #[must_use]
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self { gateway }
    }
}

impl Service<CalculationCall> for GatewayService {
    type Response = GatewayReply;
    type Error = GatewayError;
    type Future = Pin<Box<dyn Future<Output = Result<GatewayReply, GatewayError>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, call: CalculationCall) -> Self::Future {
        let gateway = Arc::clone(&self.gateway);
        Box::pin(async move { gateway.calculate(call).await })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
