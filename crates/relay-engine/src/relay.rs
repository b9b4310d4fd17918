//! The relay actor: a single task owning [`RelayState`].
//!
//! Sessions talk to it through a cloneable [`RelayHandle`]. Inputs and
//! dispatch ticks are handled one at a time in the same loop, so no two
//! mutations ever overlap and a tick can never re-enter itself. Ticks take
//! priority over inputs, so dispatch keeps its period under heavy traffic.

use std::sync::Arc;

use relay_core::{now_ms, CommandRequest, CommandSummary, RelayConfig, SessionId, Stats};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::broadcaster::{Broadcaster, SessionSink};
use crate::dispatcher::Dispatcher;
use crate::error::EngineError;
use crate::state::RelayState;

const INPUT_QUEUE: usize = 1024;

/// Everything that can happen to the relay, apart from the timer.
pub enum RelayInput {
    SessionConnected {
        sink: Arc<dyn SessionSink>,
        reply: oneshot::Sender<SessionId>,
    },
    SessionDisconnected {
        session_id: SessionId,
    },
    RegisterExecutor {
        session_id: SessionId,
    },
    CommandSubmitted {
        session_id: SessionId,
        request: CommandRequest,
    },
    CompletionReported {
        session_id: SessionId,
        report: Value,
    },
    Ping {
        session_id: SessionId,
    },
    StatsQuery {
        reply: oneshot::Sender<Stats>,
    },
    QueueQuery {
        reply: oneshot::Sender<Vec<CommandSummary>>,
    },
}

/// Cheap, cloneable entry point into the relay actor.
#[derive(Clone)]
pub struct RelayHandle {
    tx: mpsc::Sender<RelayInput>,
}

impl RelayHandle {
    /// Join the relay. The sink is attached before any event is produced
    /// for the new session, so the initial `stats_update` is never lost.
    pub async fn connect(&self, sink: Arc<dyn SessionSink>) -> Result<SessionId, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(RelayInput::SessionConnected { sink, reply }).await?;
        rx.await.map_err(|_| EngineError::Closed)
    }

    pub async fn disconnect(&self, session_id: SessionId) -> Result<(), EngineError> {
        self.send(RelayInput::SessionDisconnected { session_id }).await
    }

    pub async fn register_executor(&self, session_id: SessionId) -> Result<(), EngineError> {
        self.send(RelayInput::RegisterExecutor { session_id }).await
    }

    pub async fn submit(
        &self,
        session_id: SessionId,
        request: CommandRequest,
    ) -> Result<(), EngineError> {
        self.send(RelayInput::CommandSubmitted { session_id, request })
            .await
    }

    pub async fn report_completion(
        &self,
        session_id: SessionId,
        report: Value,
    ) -> Result<(), EngineError> {
        self.send(RelayInput::CompletionReported { session_id, report })
            .await
    }

    pub async fn ping(&self, session_id: SessionId) -> Result<(), EngineError> {
        self.send(RelayInput::Ping { session_id }).await
    }

    pub async fn stats(&self) -> Result<Stats, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(RelayInput::StatsQuery { reply }).await?;
        rx.await.map_err(|_| EngineError::Closed)
    }

    pub async fn queue(&self) -> Result<Vec<CommandSummary>, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(RelayInput::QueueQuery { reply }).await?;
        rx.await.map_err(|_| EngineError::Closed)
    }

    async fn send(&self, input: RelayInput) -> Result<(), EngineError> {
        self.tx.send(input).await.map_err(|_| EngineError::Closed)
    }
}

struct RelayActor {
    state: RelayState,
    broadcaster: Broadcaster,
}

impl RelayActor {
    fn handle(&mut self, input: RelayInput) {
        let now = now_ms();
        let out = match input {
            RelayInput::SessionConnected { sink, reply } => {
                let (session_id, out) = self.state.connect(now);
                self.broadcaster.attach(session_id.clone(), sink);
                if reply.send(session_id.clone()).is_err() {
                    debug!(%session_id, "connect caller went away");
                }
                out
            }
            RelayInput::SessionDisconnected { session_id } => {
                self.broadcaster.detach(&session_id);
                self.state.disconnect(&session_id)
            }
            RelayInput::RegisterExecutor { session_id } => {
                self.state.register_executor(&session_id)
            }
            RelayInput::CommandSubmitted { session_id, request } => {
                self.state.submit(&session_id, request, now)
            }
            RelayInput::CompletionReported { session_id, report } => {
                self.state.report_completion(&session_id, report)
            }
            RelayInput::Ping { session_id } => self.state.ping(&session_id, now),
            RelayInput::StatsQuery { reply } => {
                let _ = reply.send(self.state.stats());
                Vec::new()
            }
            RelayInput::QueueQuery { reply } => {
                let _ = reply.send(self.state.queue_snapshot());
                Vec::new()
            }
        };
        self.broadcaster.deliver(out);
    }

    fn tick(&mut self) {
        let out = Dispatcher::tick(&mut self.state, now_ms());
        self.broadcaster.deliver(out);
    }

    async fn run(
        mut self,
        mut rx: mpsc::Receiver<RelayInput>,
        dispatcher: Dispatcher,
        shutdown: CancellationToken,
    ) {
        let mut ticker = dispatcher.interval();

        loop {
            // Ticks before inputs: a full channel must not starve dispatch.
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => self.tick(),
                input = rx.recv() => match input {
                    Some(input) => self.handle(input),
                    None => return,
                },
            }
        }

        // Shutting down: no more ticks, release every session, and keep
        // answering inputs until the last handle is dropped.
        info!(
            pending = self.state.queue().len(),
            sessions = self.broadcaster.len(),
            "relay stopping dispatch"
        );
        self.broadcaster.clear();
        while let Some(input) = rx.recv().await {
            self.handle(input);
        }
        info!("relay stopped");
    }
}

/// Start the relay actor. Ticks stop when `shutdown` fires; the task ends
/// once every [`RelayHandle`] has been dropped.
pub fn spawn_relay(config: &RelayConfig, shutdown: CancellationToken) -> (RelayHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(INPUT_QUEUE);
    let actor = RelayActor {
        state: RelayState::new(config),
        broadcaster: Broadcaster::new(),
    };
    let dispatcher = Dispatcher::new(config.tick_interval());
    info!(
        cooldown_ms = config.cooldown_ms,
        queue_capacity = config.queue_capacity,
        tick_interval_ms = config.tick_interval_ms,
        "relay started"
    );
    let task = tokio::spawn(actor.run(rx, dispatcher, shutdown));
    (RelayHandle { tx }, task)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcaster::tests::RecordingSink;
    use std::time::Duration;

    fn config() -> RelayConfig {
        RelayConfig {
            cooldown_ms: 1000,
            queue_capacity: 10,
            tick_interval_ms: 500,
        }
    }

    async fn join(relay: &RelayHandle) -> (SessionId, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        let id = relay.connect(sink.clone()).await.unwrap();
        (id, sink)
    }

    #[tokio::test(start_paused = true)]
    async fn connect_receives_stats_first() {
        let (relay, _task) = spawn_relay(&config(), CancellationToken::new());
        let (_id, sink) = join(&relay).await;
        relay.stats().await.unwrap();

        let names = sink.names();
        assert_eq!(names[0], "stats_update");
        assert_eq!(names[1], "user_count_update");
    }

    #[tokio::test(start_paused = true)]
    async fn command_flows_to_executor_on_tick() {
        let (relay, _task) = spawn_relay(&config(), CancellationToken::new());
        let (sub, sub_sink) = join(&relay).await;
        let (exec, exec_sink) = join(&relay).await;
        relay.register_executor(exec).await.unwrap();
        relay.submit(sub, CommandRequest::new("move_up")).await.unwrap();

        assert_eq!(relay.stats().await.unwrap().queue_length, 1);
        assert!(!exec_sink.names().contains(&"execute_command".to_string()));

        tokio::time::sleep(Duration::from_millis(600)).await;

        let stats = relay.stats().await.unwrap();
        assert_eq!(stats.queue_length, 0);
        assert!(exec_sink.names().contains(&"execute_command".to_string()));
        assert!(!sub_sink.names().contains(&"execute_command".to_string()));
        assert!(sub_sink.names().contains(&"command_executed".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn single_tick_dispatches_single_command() {
        let cfg = RelayConfig {
            cooldown_ms: 0,
            ..config()
        };
        let (relay, _task) = spawn_relay(&cfg, CancellationToken::new());
        let (sub, _) = join(&relay).await;
        let (exec, exec_sink) = join(&relay).await;
        relay.register_executor(exec).await.unwrap();
        relay.submit(sub.clone(), CommandRequest::new("one")).await.unwrap();
        relay.submit(sub, CommandRequest::new("two")).await.unwrap();

        tokio::time::sleep(Duration::from_millis(510)).await;
        assert_eq!(relay.stats().await.unwrap().queue_length, 1);
        let executes = exec_sink
            .names()
            .into_iter()
            .filter(|n| n == "execute_command")
            .count();
        assert_eq!(executes, 1);

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(relay.stats().await.unwrap().queue_length, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn queue_query_is_point_in_time() {
        let (relay, _task) = spawn_relay(&config(), CancellationToken::new());
        let (sub, _) = join(&relay).await;
        relay.submit(sub, CommandRequest::new("look")).await.unwrap();

        let queue = relay.queue().await.unwrap();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].action, "look");
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_ticks_but_answers_queries() {
        let token = CancellationToken::new();
        let (relay, task) = spawn_relay(&config(), token.clone());
        let (sub, sink) = join(&relay).await;
        relay.submit(sub, CommandRequest::new("late")).await.unwrap();
        relay.stats().await.unwrap();

        token.cancel();
        tokio::time::sleep(Duration::from_secs(2)).await;

        // Still queued: the dispatcher no longer runs.
        assert_eq!(relay.stats().await.unwrap().queue_length, 1);
        assert!(!sink.names().contains(&"command_executed".to_string()));

        drop(relay);
        task.await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn ticks_keep_firing_under_input_flood() {
        let cfg = RelayConfig {
            cooldown_ms: 0,
            tick_interval_ms: 50,
            ..config()
        };
        let (relay, _task) = spawn_relay(&cfg, CancellationToken::new());
        let (exec, exec_sink) = join(&relay).await;
        relay.register_executor(exec).await.unwrap();

        let deadline = tokio::time::Instant::now() + Duration::from_millis(600);
        let mut flooders = Vec::new();
        for _ in 0..3 {
            let (sub, _) = join(&relay).await;
            let relay = relay.clone();
            flooders.push(tokio::spawn(async move {
                while tokio::time::Instant::now() < deadline {
                    relay.submit(sub.clone(), CommandRequest::new("spam")).await.unwrap();
                }
            }));
        }
        for flooder in flooders {
            flooder.await.unwrap();
        }

        let executes = exec_sink
            .names()
            .into_iter()
            .filter(|n| n == "execute_command")
            .count();
        // Twelve periods elapsed; allow for scheduling jitter.
        assert!(executes >= 3, "only {executes} dispatches during the flood");
    }

    #[tokio::test(start_paused = true)]
    async fn closed_relay_reports_error() {
        let token = CancellationToken::new();
        let (relay, task) = spawn_relay(&config(), token.clone());
        task.abort();
        let _ = task.await;
        assert!(matches!(relay.stats().await, Err(EngineError::Closed)));
    }
}
