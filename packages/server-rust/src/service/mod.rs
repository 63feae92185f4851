//! Correlation and calculation service layer.
//!
//! This module implements the request/response bridge over the bus:
//!
//! 1. **Gateway** (`gateway`): validate, register, publish, await
//! 2. **Middleware** (`middleware`): Tower layers (metrics, load-shedding)
//! 3. **Registry** (`registry`): pending-request correlation table
//! 4. **Domain handlers** (`domain`): worker dispatcher and result listener
//! 5. **Subscription workers** (`worker`): one loop per consumed topic

pub mod config;
pub mod domain;
pub mod gateway;
pub mod middleware;
pub mod operation;
pub mod registry;
pub mod worker;

// Re-export key types for convenient access.
pub use config::ServerConfig;
pub use domain::{ResultListener, WorkerDispatcher};
pub use gateway::{Gateway, GatewayService};
pub use middleware::{build_gateway_pipeline, GatewayPipeline};
pub use operation::{CalculationCall, GatewayError, GatewayReply};
pub use registry::{CorrelationError, PendingHandle, PendingRegistry};
pub use worker::{RecordHandler, SubscriptionWorker};
