//! HTTP handler definitions for the calcbus server.
//!
//! This module defines `AppState` (the shared state carried through axum
//! extractors) and re-exports all handler functions for convenient access
//! when building the router.

pub mod calculator;
pub mod health;

pub use calculator::{
    add_handler, divide_handler, multiply_handler, subtract_handler, sum_handler, OperandQuery,
};
pub use health::{health_handler, liveness_handler, readiness_handler};

use std::sync::Arc;
use std::time::Instant;

use super::ShutdownController;
use crate::service::{GatewayPipeline, PendingRegistry};

/// Shared application state passed to all axum handlers via `State` extraction.
///
/// Cloning is cheap: the pipeline clones share their semaphore and gateway,
/// everything else is behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Layered gateway service every calculator route calls into.
    pub gateway: GatewayPipeline,
    /// Pending-request table, read by the health endpoint.
    pub registry: Arc<PendingRegistry>,
    /// Graceful shutdown controller with health state and in-flight tracking.
    pub shutdown: Arc<ShutdownController>,
    /// Server process start time, used for uptime calculation.
    pub start_time: Instant,
}
