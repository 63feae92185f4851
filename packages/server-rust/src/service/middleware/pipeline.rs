//! Pipeline composition: combines all middleware layers into a single service stack.

use std::sync::Arc;

use tower::ServiceBuilder;

use super::load_shed::{LoadShedLayer, LoadShedService};
use super::metrics::{MetricsLayer, MetricsService};
use crate::service::config::ServerConfig;
use crate::service::gateway::{Gateway, GatewayService};

/// Fully layered gateway service. Cheap to clone; clones share the
/// load-shedding semaphore.
pub type GatewayPipeline = LoadShedService<MetricsService<GatewayService>>;

/// Build the gateway pipeline by wrapping the `Gateway` with middleware layers.
///
/// Layer order (outermost to innermost):
/// 1. `LoadShedLayer` -- reject when overloaded (fail fast before doing any work)
/// 2. `MetricsLayer` -- record timing and outcome (closest to the actual handler)
///
/// The correlation deadline is enforced by the gateway itself, which evicts
/// the pending entry when it fires.
#[must_use]
pub fn build_gateway_pipeline(gateway: Arc<Gateway>, config: &ServerConfig) -> GatewayPipeline {
    ServiceBuilder::new()
        .layer(LoadShedLayer::new(config.max_in_flight))
        .layer(MetricsLayer)
        .service(GatewayService::new(gateway))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
