//! Calculator endpoints: `GET /{sum,add,subtract,multiply,divide}?a=&b=`.

use axum::extract::{Query, State};
use axum::http::header::HeaderName;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use calcbus_core::Operation;
use serde::Deserialize;
use serde_json::json;
use tower::ServiceExt;
use tracing::debug;

use super::AppState;
use crate::network::middleware::CORRELATION_ID_HEADER;
use crate::service::{CalculationCall, CorrelationError, GatewayError};

/// Operands as given in the query string.
#[derive(Debug, Default, Deserialize)]
pub struct OperandQuery {
    pub a: Option<String>,
    pub b: Option<String>,
}

pub async fn sum_handler(state: State<AppState>, query: Query<OperandQuery>) -> Response {
    calculate(state, Operation::Add, query).await
}

/// Same as `/sum`.
pub async fn add_handler(state: State<AppState>, query: Query<OperandQuery>) -> Response {
    calculate(state, Operation::Add, query).await
}

pub async fn subtract_handler(state: State<AppState>, query: Query<OperandQuery>) -> Response {
    calculate(state, Operation::Subtract, query).await
}

pub async fn multiply_handler(state: State<AppState>, query: Query<OperandQuery>) -> Response {
    calculate(state, Operation::Multiply, query).await
}

pub async fn divide_handler(state: State<AppState>, query: Query<OperandQuery>) -> Response {
    calculate(state, Operation::Divide, query).await
}

async fn calculate(
    State(state): State<AppState>,
    operation: Operation,
    Query(query): Query<OperandQuery>,
) -> Response {
    if !state.shutdown.is_accepting() {
        return error_body(
            StatusCode::SERVICE_UNAVAILABLE,
            "Error: server is not accepting requests".to_string(),
            None,
        );
    }
    let _guard = state.shutdown.in_flight_guard();

    let call = CalculationCall {
        operation,
        operand1: query.a,
        operand2: query.b,
    };
    match state.gateway.clone().oneshot(call).await {
        Ok(reply) => {
            debug!(request_id = %reply.request_id, result = %reply.result, "calculation answered");
            let mut response = (StatusCode::OK, Json(json!({ "result": reply.result }))).into_response();
            set_correlation_id(&mut response, Some(&reply.request_id));
            response
        }
        Err(e) => error_response(&e),
    }
}

/// Status code and message for a failed call.
fn error_response(error: &GatewayError) -> Response {
    let (status, message) = match error {
        GatewayError::InvalidOperand { .. } => (StatusCode::BAD_REQUEST, format!("Error: {error}")),
        GatewayError::DivisionByZero => {
            (StatusCode::BAD_REQUEST, "Error: Division by zero".to_string())
        }
        GatewayError::Failed { reason, .. } => {
            (StatusCode::UNPROCESSABLE_ENTITY, format!("Error: {reason}"))
        }
        GatewayError::Correlation(CorrelationError::Timeout { .. }) => (
            StatusCode::GATEWAY_TIMEOUT,
            "Error: timed out waiting for the result".to_string(),
        ),
        GatewayError::Correlation(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, format!("Error: {error}"))
        }
        GatewayError::Publish { .. } => (
            StatusCode::BAD_GATEWAY,
            "Error: could not send the request".to_string(),
        ),
        GatewayError::Overloaded => (
            StatusCode::SERVICE_UNAVAILABLE,
            "Error: server overloaded, try again later".to_string(),
        ),
    };
    error_body(status, message, error.request_id())
}

fn error_body(status: StatusCode, message: String, request_id: Option<&str>) -> Response {
    let mut response = (status, Json(json!({ "error": message }))).into_response();
    set_correlation_id(&mut response, request_id);
    response
}

fn set_correlation_id(response: &mut Response, request_id: Option<&str>) {
    let Some(value) = request_id.and_then(|id| HeaderValue::from_str(id).ok()) else {
        return;
    };
    response
        .headers_mut()
        .insert(HeaderName::from_static(CORRELATION_ID_HEADER), value);
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use super::*;
    use crate::app::CalcbusApp;
    use crate::bus::InMemoryBus;
    use crate::network::ShutdownController;
    use crate::service::ServerConfig;

    async fn test_state(config: ServerConfig) -> (CalcbusApp, AppState) {
        let bus = Arc::new(InMemoryBus::new(config.partition_count, 64));
        let app = CalcbusApp::start(config, bus).await.unwrap();
        let state = AppState {
            gateway: app.pipeline(),
            registry: app.registry(),
            shutdown: Arc::new(ShutdownController::new()),
            start_time: Instant::now(),
        };
        state.shutdown.set_ready();
        (app, state)
    }

    fn query(a: &str, b: &str) -> Query<OperandQuery> {
        Query(OperandQuery {
            a: Some(a.to_string()),
            b: Some(b.to_string()),
        })
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn sum_returns_result_and_request_id() {
        let (mut app, state) = test_state(ServerConfig::default()).await;

        let response = sum_handler(State(state), query("10", "5")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(CORRELATION_ID_HEADER));
        assert_eq!(body_json(response).await, json!({ "result": "15" }));
        app.shutdown().await;
    }

    #[tokio::test]
    async fn each_route_maps_to_its_operation() {
        let (mut app, state) = test_state(ServerConfig::default()).await;

        let add = add_handler(State(state.clone()), query("1.5", "2.5")).await;
        assert_eq!(body_json(add).await["result"], "4");
        let sub = subtract_handler(State(state.clone()), query("10", "15")).await;
        assert_eq!(body_json(sub).await["result"], "-5");
        let mul = multiply_handler(State(state.clone()), query("2.5", "4")).await;
        assert_eq!(body_json(mul).await["result"], "10");
        let div = divide_handler(State(state), query("10.6", "5")).await;
        assert_eq!(body_json(div).await["result"], "2.12");
        app.shutdown().await;
    }

    #[tokio::test]
    async fn divide_by_zero_is_bad_request() {
        let (mut app, state) = test_state(ServerConfig::default()).await;

        let response = divide_handler(State(state.clone()), query("10", "0")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(!response.headers().contains_key(CORRELATION_ID_HEADER));
        assert_eq!(
            body_json(response).await,
            json!({ "error": "Error: Division by zero" })
        );
        assert_eq!(state.registry.stats().snapshot().registered, 0);
        app.shutdown().await;
    }

    #[tokio::test]
    async fn missing_operand_is_bad_request() {
        let (mut app, state) = test_state(ServerConfig::default()).await;

        let response = sum_handler(
            State(state),
            Query(OperandQuery {
                a: Some("1".to_string()),
                b: None,
            }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert!(body["error"].as_str().unwrap().contains("operand2"));
        app.shutdown().await;
    }

    #[tokio::test]
    async fn not_ready_is_service_unavailable() {
        let (mut app, state) = test_state(ServerConfig::default()).await;
        state.shutdown.trigger_shutdown();

        let response = sum_handler(State(state), query("1", "2")).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        app.shutdown().await;
    }

    #[test]
    fn error_status_mapping() {
        let cases = [
            (GatewayError::Overloaded, StatusCode::SERVICE_UNAVAILABLE),
            (
                GatewayError::Failed {
                    request_id: "r".to_string(),
                    reason: "Invalid operation".to_string(),
                },
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                CorrelationError::Timeout {
                    id: "r".to_string(),
                    timeout_ms: 1,
                }
                .into(),
                StatusCode::GATEWAY_TIMEOUT,
            ),
            (
                CorrelationError::Evicted { id: "r".to_string() }.into(),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                GatewayError::Publish {
                    request_id: "r".to_string(),
                    source: crate::bus::BusError::Closed,
                },
                StatusCode::BAD_GATEWAY,
            ),
        ];
        for (error, status) in cases {
            let response = error_response(&error);
            assert_eq!(response.status(), status, "{error}");
            if error.request_id().is_some() {
                assert_eq!(response.headers()[CORRELATION_ID_HEADER], "r");
            }
        }
    }

    #[tokio::test]
    async fn timeout_is_gateway_timeout() {
        let bus = Arc::new(InMemoryBus::new(1, 4));
        let registry = Arc::new(crate::service::PendingRegistry::new());
        // No worker consumes the request topic.
        let gateway = Arc::new(crate::service::Gateway::new(
            Arc::clone(&registry),
            bus,
            "requests",
            Duration::from_millis(30),
        ));
        let state = AppState {
            gateway: crate::service::build_gateway_pipeline(gateway, &ServerConfig::default()),
            registry,
            shutdown: Arc::new(ShutdownController::new()),
            start_time: Instant::now(),
        };
        state.shutdown.set_ready();

        let response = sum_handler(State(state.clone()), query("1", "2")).await;
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
        assert!(response.headers().contains_key(CORRELATION_ID_HEADER));
        assert_eq!(state.registry.pending_count(), 0);
        assert_eq!(state.shutdown.in_flight_count(), 0);
    }
}
