//! Gateway call, reply, and error types.

use calcbus_core::Operation;

use crate::bus::BusError;
use crate::service::registry::CorrelationError;

/// One synchronous calculation requested through the gateway.
///
/// Operands are the raw caller text; `None` means the caller left it out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalculationCall {
    pub operation: Operation,
    pub operand1: Option<String>,
    pub operand2: Option<String>,
}

impl CalculationCall {
    #[must_use]
    pub fn new(operation: Operation, operand1: impl Into<String>, operand2: impl Into<String>) -> Self {
        Self {
            operation,
            operand1: Some(operand1.into()),
            operand2: Some(operand2.into()),
        }
    }
}

/// Successful gateway answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayReply {
    /// Correlation id assigned to the call.
    pub request_id: String,
    /// Canonical decimal text of the result.
    pub result: String,
}

/// Errors surfaced to gateway callers.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("invalid operand {name}: {reason}")]
    InvalidOperand { name: &'static str, reason: String },
    #[error("division by zero")]
    DivisionByZero,
    #[error(transparent)]
    Correlation(#[from] CorrelationError),
    #[error("failed to publish request {request_id}: {source}")]
    Publish {
        request_id: String,
        #[source]
        source: BusError,
    },
    #[error("calculation {request_id} failed: {reason}")]
    Failed { request_id: String, reason: String },
    #[error("server overloaded, try again later")]
    Overloaded,
}

impl GatewayError {
    /// Correlation id of the call, when one had been assigned.
    #[must_use]
    pub fn request_id(&self) -> Option<&str> {
        match self {
            Self::Correlation(
                CorrelationError::DuplicateId { id }
                | CorrelationError::Timeout { id, .. }
                | CorrelationError::Evicted { id },
            ) => Some(id.as_str()),
            Self::Publish { request_id, .. } | Self::Failed { request_id, .. } => {
                Some(request_id.as_str())
            }
            Self::InvalidOperand { .. } | Self::DivisionByZero | Self::Overloaded => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_id_only_after_assignment() {
        assert_eq!(GatewayError::DivisionByZero.request_id(), None);
        assert_eq!(GatewayError::Overloaded.request_id(), None);

        let timeout: GatewayError = CorrelationError::Timeout {
            id: "abc".to_string(),
            timeout_ms: 10,
        }
        .into();
        assert_eq!(timeout.request_id(), Some("abc"));

        let failed = GatewayError::Failed {
            request_id: "def".to_string(),
            reason: "Invalid operation".to_string(),
        };
        assert_eq!(failed.request_id(), Some("def"));
    }

    #[test]
    fn call_new_fills_both_operands() {
        let call = CalculationCall::new(Operation::Divide, "10", "5");
        assert_eq!(call.operand1.as_deref(), Some("10"));
        assert_eq!(call.operand2.as_deref(), Some("5"));
    }
}
