use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use relay_core::{ConfigError, RelayConfig};
use relay_engine::{spawn_relay, RelayHandle};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::api;
use crate::config::ServerConfig;
use crate::connection::{self, Connection, ConnectionHub};
use crate::websocket;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("failed to bind listener: {0}")]
    Io(#[from] std::io::Error),
}

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub relay: RelayHandle,
    pub hub: Arc<ConnectionHub>,
    pub config: Arc<ServerConfig>,
    pub started_at: Instant,
    pub shutdown: CancellationToken,
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    let public_dir = state.config.public_dir.clone();
    let router = Router::new()
        .route("/ws", get(ws_handler))
        .route("/api/stats", get(api::stats_handler))
        .route("/api/queue", get(api::queue_handler))
        .route("/health", get(api::health_handler))
        .with_state(state);

    let router = match public_dir {
        Some(dir) => router.fallback_service(ServeDir::new(dir)),
        None => router,
    };

    router
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Validate config, start the relay actor and serve HTTP/WebSocket.
/// Returns a handle used to shut everything down.
pub async fn start(config: ServerConfig, relay_config: RelayConfig) -> Result<ServerHandle, ServerError> {
    relay_config.validate()?;
    config.validate()?;

    let token = CancellationToken::new();

    let (relay, relay_task) = spawn_relay(&relay_config, token.clone());
    let hub = Arc::new(ConnectionHub::new());

    let cleanup_task = connection::start_cleanup_task(
        Arc::clone(&hub),
        config.heartbeat_interval(),
        config.heartbeat_timeout(),
        token.clone(),
    );

    let listener = tokio::net::TcpListener::bind(config.bind_addr()).await?;
    let local_addr = listener.local_addr()?;
    let shutdown_timeout = config.shutdown_timeout();

    let state = AppState {
        relay: relay.clone(),
        hub: Arc::clone(&hub),
        config: Arc::new(config),
        started_at: Instant::now(),
        shutdown: token.clone(),
    };
    let router = build_router(state);

    tracing::info!(
        port = local_addr.port(),
        cooldown_ms = relay_config.cooldown_ms,
        queue_capacity = relay_config.queue_capacity,
        "relay server started"
    );

    let serve_token = token.clone();
    let server_task = tokio::spawn(async move {
        let result = axum::serve(listener, router)
            .with_graceful_shutdown(serve_token.cancelled_owned())
            .await;
        if let Err(e) = result {
            tracing::error!(error = %e, "server error");
        }
    });

    Ok(ServerHandle {
        port: local_addr.port(),
        token,
        relay,
        hub,
        shutdown_timeout,
        tasks: vec![server_task, cleanup_task, relay_task],
    })
}

/// What a shutdown left behind.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Connections open when shutdown began; each was flushed and closed.
    pub sessions_released: usize,
    /// Commands still queued once dispatch stopped. They are never delivered.
    pub commands_discarded: usize,
    /// Whether some task had to be aborted after the timeout.
    pub timed_out: bool,
}

/// Handle returned by `start()`; keeps background tasks alive.
pub struct ServerHandle {
    pub port: u16,
    token: CancellationToken,
    relay: RelayHandle,
    hub: Arc<ConnectionHub>,
    shutdown_timeout: Duration,
    tasks: Vec<JoinHandle<()>>,
}

impl ServerHandle {
    /// Stop accepting connections and ticks, flush and close every
    /// session, then wait for the listener, the sweep and the relay actor.
    pub async fn shutdown(self) -> ShutdownReport {
        let Self {
            token,
            relay,
            hub,
            shutdown_timeout,
            tasks,
            ..
        } = self;

        let sessions_released = hub.count();
        token.cancel();

        // The actor stops ticking once cancelled but still answers queries,
        // so this count is final.
        let commands_discarded = relay.stats().await.map(|s| s.queue_length).unwrap_or(0);
        drop(relay);

        let timed_out = !join_within(tasks, shutdown_timeout).await;
        let report = ShutdownReport {
            sessions_released,
            commands_discarded,
            timed_out,
        };
        if timed_out {
            tracing::warn!(?report, "relay server stopped after aborting tasks");
        } else {
            tracing::info!(?report, "relay server stopped");
        }
        report
    }
}

/// Wait for every task, aborting the stragglers once `timeout` elapses.
/// Returns `false` if anything had to be aborted.
async fn join_within(tasks: Vec<JoinHandle<()>>, timeout: Duration) -> bool {
    let aborts: Vec<_> = tasks.iter().map(JoinHandle::abort_handle).collect();
    if tokio::time::timeout(timeout, futures::future::join_all(tasks))
        .await
        .is_ok()
    {
        return true;
    }
    for handle in aborts {
        handle.abort();
    }
    false
}

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    let max_message_size = state.config.max_message_size;
    ws.max_message_size(max_message_size)
        .on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle a new WebSocket connection.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let (tx, rx) = mpsc::channel(state.config.max_send_queue);
    let connection = Arc::new(Connection::new(tx, state.shutdown.child_token()));

    websocket::handle_ws_connection(
        socket,
        state.relay,
        state.hub,
        connection,
        rx,
        state.config.heartbeat_interval(),
    )
    .await;
}
