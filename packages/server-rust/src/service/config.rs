use std::time::Duration;

use calcbus_core::{DEFAULT_DIVISION_SCALE, DEFAULT_PARTITION_COUNT};

/// Topic carrying request records from the gateway to the worker.
pub const DEFAULT_REQUEST_TOPIC: &str = "calculation-requests";
/// Topic carrying result records from the worker back to the gateway.
pub const DEFAULT_RESULT_TOPIC: &str = "calculation-results";

/// Server-level configuration for the correlation pipeline.
///
/// Controls the correlation deadline, division precision, concurrency
/// limits, stale-entry sweeping, and bus topology.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// How long a gateway call waits for its result, in milliseconds.
    pub request_timeout_ms: u64,
    /// Fractional digits kept by division.
    pub division_scale: i64,
    /// Maximum number of concurrent gateway calls before load shedding.
    pub max_in_flight: u32,
    /// Interval between stale pending-entry sweeps in milliseconds.
    pub sweep_interval_ms: u64,
    /// Partitions per topic on the in-memory bus.
    pub partition_count: u32,
    /// Records buffered per subscription on the in-memory bus.
    pub bus_channel_capacity: usize,
    pub request_topic: String,
    pub result_topic: String,
    /// Consumer group of the worker dispatcher.
    pub worker_group: String,
    /// Consumer group of the result listener. Each gateway instance needs
    /// its own group so that it sees every result.
    pub gateway_group: String,
}

impl ServerConfig {
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Age after which the sweep treats a pending entry as leaked.
    #[must_use]
    pub fn stale_after(&self) -> Duration {
        self.request_timeout() * 2
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 30_000,
            division_scale: DEFAULT_DIVISION_SCALE,
            max_in_flight: 1000,
            sweep_interval_ms: 60_000,
            partition_count: DEFAULT_PARTITION_COUNT,
            bus_channel_capacity: 1024,
            request_topic: DEFAULT_REQUEST_TOPIC.to_string(),
            result_topic: DEFAULT_RESULT_TOPIC.to_string(),
            worker_group: "calculator-group".to_string(),
            gateway_group: "gateway-group".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_config_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.stale_after(), Duration::from_secs(60));
        assert_eq!(config.division_scale, 10);
        assert_eq!(config.max_in_flight, 1000);
        assert_eq!(config.request_topic, "calculation-requests");
        assert_eq!(config.result_topic, "calculation-results");
        assert_ne!(config.worker_group, config.gateway_group);
    }
}
