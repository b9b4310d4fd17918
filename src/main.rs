use std::path::PathBuf;

use clap::Parser;
use relay_core::RelayConfig;
use relay_server::ServerConfig;
use relay_telemetry::{LogFormat, TelemetryConfig};

/// Relay that queues viewer commands and dispatches them to executors.
#[derive(Debug, Parser)]
#[command(name = "relay", version, about)]
struct Cli {
    /// Address to bind.
    #[arg(long, env = "RELAY_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on.
    #[arg(long, env = "PORT", default_value_t = 3000)]
    port: u16,

    /// Minimum milliseconds between two accepted commands from one viewer.
    #[arg(long, env = "RELAY_COOLDOWN_MS", default_value_t = 1000)]
    cooldown_ms: u64,

    /// Maximum number of pending commands.
    #[arg(long, env = "RELAY_QUEUE_CAPACITY", default_value_t = 10)]
    queue_capacity: usize,

    /// Milliseconds between dispatch ticks.
    #[arg(long, env = "RELAY_TICK_MS", default_value_t = 500)]
    tick_interval_ms: u64,

    /// Outbound frames buffered per connection.
    #[arg(long, env = "RELAY_MAX_SEND_QUEUE", default_value_t = 256)]
    max_send_queue: usize,

    /// Seconds between WebSocket pings.
    #[arg(long, env = "RELAY_HEARTBEAT_SECS", default_value_t = 30)]
    heartbeat_interval_secs: u64,

    /// Seconds without a pong before a connection is dropped.
    #[arg(long, env = "RELAY_HEARTBEAT_TIMEOUT_SECS", default_value_t = 90)]
    heartbeat_timeout_secs: u64,

    /// Directory of static files to serve.
    #[arg(long, env = "RELAY_PUBLIC_DIR")]
    public_dir: Option<PathBuf>,

    /// Default log level; RUST_LOG takes precedence.
    #[arg(long, env = "RELAY_LOG_LEVEL", default_value = "info")]
    log_level: tracing::Level,

    /// `json` or `pretty`.
    #[arg(long, env = "RELAY_LOG_FORMAT", default_value = "json")]
    log_format: LogFormat,
}

impl Cli {
    fn relay_config(&self) -> RelayConfig {
        RelayConfig {
            cooldown_ms: self.cooldown_ms,
            queue_capacity: self.queue_capacity,
            tick_interval_ms: self.tick_interval_ms,
        }
    }

    fn server_config(&self) -> ServerConfig {
        ServerConfig {
            host: self.host.clone(),
            port: self.port,
            max_send_queue: self.max_send_queue,
            heartbeat_interval_secs: self.heartbeat_interval_secs,
            heartbeat_timeout_secs: self.heartbeat_timeout_secs,
            public_dir: self.public_dir.clone(),
            ..Default::default()
        }
    }

    fn telemetry_config(&self) -> TelemetryConfig {
        TelemetryConfig {
            log_level: self.log_level,
            module_levels: Vec::new(),
            format: self.log_format,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    relay_telemetry::init_telemetry(&cli.telemetry_config())?;

    tracing::info!("Starting relay");

    let handle = relay_server::start(cli.server_config(), cli.relay_config()).await?;
    tracing::info!(port = handle.port, "Relay ready");

    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down");
    handle.shutdown().await;
    Ok(())
}
