//! Process wiring: subscribes the worker dispatcher and the result listener
//! to the bus and builds the gateway pipeline on top of them.

use std::sync::Arc;

use calcbus_core::Evaluator;
use tracing::info;

use crate::service::domain::DispatcherStats;
use crate::service::{
    build_gateway_pipeline, Gateway, GatewayPipeline, PendingRegistry, ResultListener,
    ServerConfig, SubscriptionWorker, WorkerDispatcher,
};
use crate::traits::MessageBus;

/// Tick interval of the dispatcher loop. The dispatcher has no periodic
/// work, so this only sets how often its loop wakes when idle.
const DISPATCHER_TICK_MS: u64 = 60_000;

/// A running calculator: worker side and gateway side sharing one bus.
pub struct CalcbusApp {
    registry: Arc<PendingRegistry>,
    pipeline: GatewayPipeline,
    dispatcher_stats: Arc<DispatcherStats>,
    workers: Vec<SubscriptionWorker>,
}

impl CalcbusApp {
    /// Subscribes both consumer loops and builds the gateway.
    ///
    /// # Errors
    ///
    /// Returns an error if either subscription is refused by the bus.
    pub async fn start(config: ServerConfig, bus: Arc<dyn MessageBus>) -> anyhow::Result<Self> {
        let registry = Arc::new(PendingRegistry::new());

        let requests = bus
            .subscribe(&config.request_topic, &config.worker_group)
            .await?;
        let dispatcher = WorkerDispatcher::new(
            Evaluator::with_division_scale(config.division_scale),
            Arc::clone(&bus),
            config.result_topic.clone(),
        );
        let dispatcher_stats = dispatcher.stats();

        let results = bus
            .subscribe(&config.result_topic, &config.gateway_group)
            .await?;
        let listener = ResultListener::new(Arc::clone(&registry), config.stale_after());

        let workers = vec![
            SubscriptionWorker::start(
                "worker-dispatcher",
                dispatcher,
                requests,
                DISPATCHER_TICK_MS,
            ),
            SubscriptionWorker::start(
                "result-listener",
                listener,
                results,
                config.sweep_interval_ms,
            ),
        ];

        let gateway = Arc::new(Gateway::new(
            Arc::clone(&registry),
            bus,
            config.request_topic.clone(),
            config.request_timeout(),
        ));
        let pipeline = build_gateway_pipeline(gateway, &config);

        info!(
            request_topic = %config.request_topic,
            result_topic = %config.result_topic,
            timeout_ms = config.request_timeout_ms,
            division_scale = config.division_scale,
            "calculator started"
        );

        Ok(Self {
            registry,
            pipeline,
            dispatcher_stats,
            workers,
        })
    }

    #[must_use]
    pub fn registry(&self) -> Arc<PendingRegistry> {
        Arc::clone(&self.registry)
    }

    /// A clone of the layered gateway service.
    #[must_use]
    pub fn pipeline(&self) -> GatewayPipeline {
        self.pipeline.clone()
    }

    #[must_use]
    pub fn dispatcher_stats(&self) -> Arc<DispatcherStats> {
        Arc::clone(&self.dispatcher_stats)
    }

    /// Stops both consumer loops. Pending calls then end by timeout.
    pub async fn shutdown(&mut self) {
        for worker in &mut self.workers {
            worker.stop().await;
        }
        info!(pending = self.registry.pending_count(), "calculator stopped");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
