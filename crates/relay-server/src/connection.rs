//! Live WebSocket connections and their liveness tracking.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;
use relay_core::SessionId;
use relay_engine::SessionSink;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Outbound side of one WebSocket, shared between the relay and the
/// connection's writer task.
pub struct Connection {
    tx: mpsc::Sender<Arc<String>>,
    /// Cancelled to close the connection (heartbeat timeout or shutdown).
    closed: CancellationToken,
    connected_at: Instant,
    last_pong: Mutex<Instant>,
    dropped_messages: AtomicU64,
}

impl Connection {
    pub fn new(tx: mpsc::Sender<Arc<String>>, closed: CancellationToken) -> Self {
        let now = Instant::now();
        Self {
            tx,
            closed,
            connected_at: now,
            last_pong: Mutex::new(now),
            dropped_messages: AtomicU64::new(0),
        }
    }

    /// Queue a frame without waiting. Returns `false` if the buffer is full
    /// or the writer is gone.
    pub fn send(&self, frame: Arc<String>) -> bool {
        if self.tx.try_send(frame).is_ok() {
            true
        } else {
            self.dropped_messages.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    pub fn record_pong(&self) {
        *self.last_pong.lock() = Instant::now();
    }

    pub fn last_pong_elapsed(&self) -> Duration {
        self.last_pong.lock().elapsed()
    }

    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }

    pub fn close(&self) {
        self.closed.cancel();
    }

    pub fn closed(&self) -> &CancellationToken {
        &self.closed
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}

impl SessionSink for Connection {
    fn deliver(&self, frame: Arc<String>) -> bool {
        !self.is_closed() && self.send(frame)
    }
}

/// Every open connection, keyed by the session id the relay assigned.
#[derive(Default)]
pub struct ConnectionHub {
    connections: DashMap<SessionId, Arc<Connection>>,
}

impl ConnectionHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, session_id: SessionId, connection: Arc<Connection>) {
        self.connections.insert(session_id, connection);
    }

    pub fn remove(&self, session_id: &SessionId) -> Option<Arc<Connection>> {
        self.connections.remove(session_id).map(|(_, c)| c)
    }

    pub fn get(&self, session_id: &SessionId) -> Option<Arc<Connection>> {
        self.connections.get(session_id).map(|c| Arc::clone(c.value()))
    }

    pub fn count(&self) -> usize {
        self.connections.len()
    }

    /// Close connections that have not answered a ping within `timeout`.
    /// Their own tasks then run the normal disconnect path.
    pub fn close_dead(&self, timeout: Duration) -> usize {
        let dead: Vec<(SessionId, Arc<Connection>)> = self
            .connections
            .iter()
            .filter(|entry| entry.value().last_pong_elapsed() >= timeout && !entry.value().is_closed())
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect();

        for (session_id, connection) in &dead {
            tracing::info!(%session_id, age_secs = connection.age().as_secs(), "closing unresponsive connection");
            connection.close();
        }
        dead.len()
    }
}

/// Periodically close connections that stopped answering pings.
pub fn start_cleanup_task(
    hub: Arc<ConnectionHub>,
    interval: Duration,
    timeout: Duration,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let closed = hub.close_dead(timeout);
                    if closed > 0 {
                        tracing::info!(closed, "dead connection cleanup");
                    }
                }
            }
        }
    })
}
