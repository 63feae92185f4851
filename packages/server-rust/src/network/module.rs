//! Network module with deferred startup lifecycle.
//!
//! `new()` assembles shared state, `start()` binds the TCP listener, and
//! `serve()` accepts connections. Binding before serving lets the binary
//! log the real port (useful with port 0) before traffic arrives.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tracing::info;

use super::config::NetworkConfig;
use super::handlers::{
    add_handler, divide_handler, health_handler, liveness_handler, multiply_handler,
    readiness_handler, subtract_handler, sum_handler, AppState,
};
use super::middleware::apply_http_layers;
use super::shutdown::ShutdownController;
use crate::service::{GatewayPipeline, PendingRegistry};

/// Manages the HTTP server lifecycle.
///
/// 1. `new()` -- builds the shared `AppState`
/// 2. `start()` -- binds the TCP listener to the configured address
/// 3. `serve()` -- accepts connections until shutdown is signalled, then drains
pub struct NetworkModule {
    config: NetworkConfig,
    listener: Option<TcpListener>,
    state: AppState,
}

impl NetworkModule {
    /// Creates the module without binding any port.
    #[must_use]
    pub fn new(config: NetworkConfig, gateway: GatewayPipeline, registry: Arc<PendingRegistry>) -> Self {
        let state = AppState {
            gateway,
            registry,
            shutdown: Arc::new(ShutdownController::new()),
            start_time: Instant::now(),
        };
        Self {
            config,
            listener: None,
            state,
        }
    }

    /// Shared shutdown controller, for callers that need the health state.
    #[must_use]
    pub fn shutdown_controller(&self) -> Arc<ShutdownController> {
        Arc::clone(&self.state.shutdown)
    }

    /// Assembles the axum router with all routes and middleware.
    ///
    /// Routes:
    /// - `GET /sum`, `/add`, `/subtract`, `/multiply`, `/divide` -- calculator
    /// - `GET /health` -- detailed health JSON
    /// - `GET /health/live` -- liveness probe
    /// - `GET /health/ready` -- readiness probe
    pub fn build_router(&self) -> Router {
        let router = Router::new()
            .route("/sum", get(sum_handler))
            .route("/add", get(add_handler))
            .route("/subtract", get(subtract_handler))
            .route("/multiply", get(multiply_handler))
            .route("/divide", get(divide_handler))
            .route("/health", get(health_handler))
            .route("/health/live", get(liveness_handler))
            .route("/health/ready", get(readiness_handler));

        apply_http_layers(router, &self.config).with_state(self.state.clone())
    }

    /// Binds the TCP listener to the configured host and port.
    ///
    /// Returns the actual bound port, which differs from the configured one
    /// when port 0 is used.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound (e.g., port in use).
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        let listener = TcpListener::bind(self.config.bind_addr()).await?;
        let port = listener.local_addr()?.port();

        info!(host = %self.config.host, port, "TCP listener bound");

        self.listener = Some(listener);
        Ok(port)
    }

    /// Serves connections until `shutdown` resolves, then waits up to
    /// `drain_timeout` for in-flight calculations.
    ///
    /// # Errors
    ///
    /// Returns an error if the server encounters a fatal I/O error.
    ///
    /// # Panics
    ///
    /// Panics if `start()` was not called before `serve()`.
    pub async fn serve(
        mut self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let listener = self
            .listener
            .take()
            .expect("start() must be called before serve()");
        let router = self.build_router();
        let controller = Arc::clone(&self.state.shutdown);
        let drain_controller = Arc::clone(&controller);

        controller.set_ready();
        info!("serving HTTP");

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                shutdown.await;
                drain_controller.trigger_shutdown();
            })
            .await?;

        controller.wait_for_drain(self.config.drain_timeout).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use super::*;
    use crate::app::CalcbusApp;
    use crate::bus::InMemoryBus;
    use crate::network::middleware::{CORRELATION_ID_HEADER, X_REQUEST_ID};
    use crate::network::HealthState;
    use crate::service::{build_gateway_pipeline, Gateway, ServerConfig};

    fn module(config: NetworkConfig) -> NetworkModule {
        let registry = Arc::new(PendingRegistry::new());
        let gateway = Arc::new(Gateway::new(
            Arc::clone(&registry),
            Arc::new(InMemoryBus::new(1, 4)),
            "requests",
            Duration::from_secs(1),
        ));
        NetworkModule::new(
            config,
            build_gateway_pipeline(gateway, &ServerConfig::default()),
            registry,
        )
    }

    /// Router backed by a running calculator, already marked ready.
    async fn live_router() -> (CalcbusApp, Router) {
        let config = ServerConfig::default();
        let bus = Arc::new(InMemoryBus::new(config.partition_count, 64));
        let app = CalcbusApp::start(config, bus).await.unwrap();
        let module = NetworkModule::new(NetworkConfig::default(), app.pipeline(), app.registry());
        module.shutdown_controller().set_ready();
        let router = module.build_router();
        (app, router)
    }

    async fn send_get(router: &Router, uri: &str) -> (StatusCode, axum::http::HeaderMap, serde_json::Value) {
        let response = router
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, headers, serde_json::from_slice(&bytes).unwrap())
    }

    fn ephemeral() -> NetworkConfig {
        NetworkConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            ..NetworkConfig::default()
        }
    }

    #[test]
    fn new_creates_module_without_binding() {
        let module = module(NetworkConfig::default());
        assert!(module.listener.is_none());
        assert_eq!(module.shutdown_controller().health_state(), HealthState::Starting);
    }

    #[tokio::test]
    async fn start_binds_to_os_assigned_port() {
        let mut module = module(ephemeral());
        let port = module.start().await.expect("start should succeed");
        assert!(port > 0, "OS-assigned port should be > 0");
        assert!(module.listener.is_some());
    }

    #[tokio::test]
    async fn serve_stops_on_signal_and_drains() {
        let mut module = module(ephemeral());
        module.start().await.unwrap();
        let controller = module.shutdown_controller();

        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let server = tokio::spawn(module.serve(async move {
            let _ = rx.await;
        }));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(controller.health_state(), HealthState::Ready);

        tx.send(()).unwrap();
        server.await.unwrap().unwrap();
        assert_eq!(controller.health_state(), HealthState::Stopped);
    }

    #[tokio::test]
    async fn sum_route_round_trip() {
        let (mut app, router) = live_router().await;

        let (status, headers, body) = send_get(&router, "/sum?a=10&b=5").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!({ "result": "15" }));
        let request_id = headers[CORRELATION_ID_HEADER].to_str().unwrap();
        assert!(uuid::Uuid::parse_str(request_id).is_ok());
        assert!(headers.contains_key(X_REQUEST_ID));
        app.shutdown().await;
    }

    #[tokio::test]
    async fn every_calculator_route_is_mounted() {
        let (mut app, router) = live_router().await;

        for (uri, expected) in [
            ("/add?a=1.5&b=2.5", "4"),
            ("/subtract?a=10&b=15", "-5"),
            ("/multiply?a=2.5&b=4", "10"),
            ("/divide?a=10.6&b=5", "2.12"),
        ] {
            let (status, _, body) = send_get(&router, uri).await;
            assert_eq!(status, StatusCode::OK, "{uri}");
            assert_eq!(body["result"], expected, "{uri}");
        }
        app.shutdown().await;
    }

    #[tokio::test]
    async fn divide_route_rejects_zero_divisor() {
        let (mut app, router) = live_router().await;

        let (status, headers, body) = send_get(&router, "/divide?a=1&b=0").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, serde_json::json!({ "error": "Error: Division by zero" }));
        assert!(!headers.contains_key(CORRELATION_ID_HEADER));
        assert_eq!(app.registry().stats().snapshot().registered, 0);
        app.shutdown().await;
    }

    #[tokio::test]
    async fn missing_query_operand_is_bad_request() {
        let (mut app, router) = live_router().await;

        let (status, _, body) = send_get(&router, "/sum?a=1").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let message = body["error"].as_str().unwrap();
        assert!(message.contains("operand2"), "{message}");
        assert!(message.contains("missing"), "{message}");
        app.shutdown().await;
    }

    #[tokio::test]
    async fn health_route_reports_ready() {
        let (mut app, router) = live_router().await;

        let (status, _, body) = send_get(&router, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["state"], "ready");
        app.shutdown().await;
    }

    #[tokio::test]
    #[should_panic(expected = "start() must be called before serve()")]
    async fn serve_panics_without_start() {
        let module = module(NetworkConfig::default());
        let _ = module.serve(std::future::pending::<()>()).await;
    }
}
