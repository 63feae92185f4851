//! `calcbus` -- calculator gateway and worker over an in-process bus.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use calcbus_server::app::CalcbusApp;
use calcbus_server::bus::InMemoryBus;
use calcbus_server::network::{NetworkConfig, NetworkModule};
use calcbus_server::service::ServerConfig;
use clap::{Parser, ValueEnum};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Synchronous calculator over an asynchronous message bus")]
struct Args {
    /// Address to bind
    #[arg(long, env = "CALCBUS_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Port to bind (0 picks a free port)
    #[arg(long, env = "CALCBUS_PORT", default_value_t = 8080)]
    port: u16,

    /// How long a call waits for its result, in milliseconds
    #[arg(long, env = "CALCBUS_REQUEST_TIMEOUT_MS", default_value_t = 30_000)]
    request_timeout_ms: u64,

    /// Fractional digits kept by division
    #[arg(long, env = "CALCBUS_DIVISION_SCALE", default_value_t = 10)]
    division_scale: i64,

    /// Concurrent calls before new ones are rejected
    #[arg(long, env = "CALCBUS_MAX_IN_FLIGHT", default_value_t = 1000)]
    max_in_flight: u32,

    /// Partitions per bus topic
    #[arg(long, env = "CALCBUS_PARTITIONS", default_value_t = 12)]
    partitions: u32,

    /// Records buffered per bus subscription
    #[arg(long, env = "CALCBUS_BUS_CHANNEL_CAPACITY", default_value_t = 1024)]
    bus_channel_capacity: usize,

    /// Interval between sweeps of stale pending requests, in milliseconds
    #[arg(long, env = "CALCBUS_SWEEP_INTERVAL_MS", default_value_t = 60_000)]
    sweep_interval_ms: u64,

    /// Allowed CORS origins, comma separated
    #[arg(long, env = "CALCBUS_CORS_ORIGINS", value_delimiter = ',', default_value = "*")]
    cors_origins: Vec<String>,

    #[arg(long, env = "CALCBUS_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

impl Args {
    fn server_config(&self) -> ServerConfig {
        ServerConfig {
            request_timeout_ms: self.request_timeout_ms,
            division_scale: self.division_scale,
            max_in_flight: self.max_in_flight,
            partition_count: self.partitions,
            bus_channel_capacity: self.bus_channel_capacity,
            sweep_interval_ms: self.sweep_interval_ms,
            ..ServerConfig::default()
        }
    }

    fn network_config(&self) -> NetworkConfig {
        // The HTTP deadline must outlast the correlation deadline.
        let request_timeout = Duration::from_millis(self.request_timeout_ms) + Duration::from_secs(5);
        NetworkConfig {
            host: self.host.clone(),
            port: self.port,
            cors_origins: self.cors_origins.clone(),
            request_timeout,
            drain_timeout: request_timeout,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.log_format);

    let server_config = args.server_config();
    let bus = Arc::new(InMemoryBus::new(
        server_config.partition_count,
        server_config.bus_channel_capacity,
    ));

    let mut app = CalcbusApp::start(server_config, bus.clone())
        .await
        .context("failed to start calculator")?;

    let mut network = NetworkModule::new(args.network_config(), app.pipeline(), app.registry());
    let port = network
        .start()
        .await
        .with_context(|| format!("failed to bind {}:{}", args.host, args.port))?;
    info!(port, "calcbus listening");

    network
        .serve(async {
            if let Err(e) = signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for Ctrl+C");
                return;
            }
            warn!("received Ctrl+C, shutting down");
        })
        .await
        .context("server exited with error")?;

    app.shutdown().await;
    bus.close();
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,tower_http=info"));

    let builder = tracing_subscriber::fmt().with_env_filter(env_filter);
    // Ignore error if already set.
    let _ = match format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().with_current_span(true).try_init(),
    };
}
