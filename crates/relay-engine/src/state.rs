//! The relay's shared state and its transitions.
//!
//! Every method here is a synchronous state transition that returns the
//! events it produced. Nothing is sent from inside; the caller hands the
//! result to a [`Broadcaster`](crate::Broadcaster).

use relay_core::{
    Command, CommandRequest, CommandSummary, LastCommand, RelayConfig, RelayError, ServerEvent,
    SessionId, Stats,
};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::broadcaster::Outbound;
use crate::limiter::RateLimiter;
use crate::queue::CommandQueue;
use crate::registry::{RegisterOutcome, Role, SessionRegistry};

pub struct RelayState {
    pub(crate) registry: SessionRegistry,
    pub(crate) limiter: RateLimiter,
    pub(crate) queue: CommandQueue,
}

impl RelayState {
    pub fn new(config: &RelayConfig) -> Self {
        Self {
            registry: SessionRegistry::new(),
            limiter: RateLimiter::new(config.cooldown_ms),
            queue: CommandQueue::new(config.queue_capacity),
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn queue(&self) -> &CommandQueue {
        &self.queue
    }

    pub fn stats(&self) -> Stats {
        Stats {
            submitter_count: self.registry.submitter_count(),
            queue_length: self.queue.len(),
            executor_count: self.registry.executor_count(),
            total_commands: self.registry.total_commands(),
        }
    }

    pub fn queue_snapshot(&self) -> Vec<CommandSummary> {
        self.queue.summaries()
    }

    /// New connection: greet it with current stats, tell everyone the new count.
    pub fn connect(&mut self, now: i64) -> (SessionId, Vec<Outbound>) {
        let id = self.registry.connect(now);
        info!(
            session_id = %id,
            submitters = self.registry.submitter_count(),
            "session connected"
        );
        let out = vec![
            Outbound::to(&id, ServerEvent::StatsUpdate(self.stats())),
            self.user_count(),
        ];
        (id, out)
    }

    pub fn disconnect(&mut self, id: &SessionId) -> Vec<Outbound> {
        let role = self.registry.disconnect(id);
        self.limiter.forget(id);
        match role {
            Some(Role::Submitter) => {
                info!(
                    session_id = %id,
                    submitters = self.registry.submitter_count(),
                    "submitter disconnected"
                );
                vec![self.user_count()]
            }
            Some(Role::Executor) => {
                info!(
                    session_id = %id,
                    executors = self.registry.executor_count(),
                    "executor disconnected"
                );
                Vec::new()
            }
            None => Vec::new(),
        }
    }

    pub fn register_executor(&mut self, id: &SessionId) -> Vec<Outbound> {
        let registered = Outbound::to(
            id,
            ServerEvent::ExecutorRegistered {
                status: "success".into(),
            },
        );
        match self.registry.register_executor(id) {
            RegisterOutcome::Promoted => {
                info!(
                    session_id = %id,
                    executors = self.registry.executor_count(),
                    "executor registered"
                );
                vec![registered, self.user_count()]
            }
            RegisterOutcome::AlreadyExecutor => vec![registered],
            RegisterOutcome::Unknown => {
                warn!(session_id = %id, "executor registration for unknown session");
                Vec::new()
            }
        }
    }

    /// Run a submission through the gates: rate limit, then validation,
    /// then capacity. The first gate to refuse decides the rejection.
    pub fn submit(&mut self, id: &SessionId, request: CommandRequest, now: i64) -> Vec<Outbound> {
        match self.try_accept(id, request, now) {
            Ok((position, command)) => {
                debug!(
                    session_id = %id,
                    action = %command.action,
                    position,
                    "command queued"
                );
                let last_command = LastCommand {
                    action: command.action.clone(),
                    submitter_id_prefix: id.short(),
                };
                vec![
                    Outbound::to(id, ServerEvent::CommandQueued { position, command }),
                    Outbound::all(ServerEvent::QueueUpdate {
                        queue_length: self.queue.len(),
                        last_command,
                    }),
                ]
            }
            Err(err) => {
                debug!(session_id = %id, kind = err.error_kind(), "command rejected");
                err.to_event()
                    .map(|event| vec![Outbound::to(id, event)])
                    .unwrap_or_default()
            }
        }
    }

    fn try_accept(
        &mut self,
        id: &SessionId,
        request: CommandRequest,
        now: i64,
    ) -> Result<(usize, Command), RelayError> {
        if self.limiter.check_and_record(id, now) {
            return Err(RelayError::RateLimited {
                cooldown_ms: self.limiter.cooldown_ms(),
                retry_after_ms: self.limiter.retry_after_ms(id, now),
            });
        }

        let command = request.into_command(id.clone(), now)?;

        if !self.queue.try_enqueue(command.clone()) {
            return Err(RelayError::QueueFull {
                capacity: self.queue.capacity(),
            });
        }
        self.registry.increment_command_count(id);
        Ok((self.queue.len(), command))
    }

    /// Executors report completion; the report is relayed untouched.
    pub fn report_completion(&mut self, id: &SessionId, report: Value) -> Vec<Outbound> {
        if self.registry.role(id) != Some(Role::Executor) {
            warn!(session_id = %id, "completion report from non-executor ignored");
            return vec![Outbound::to(
                id,
                ServerEvent::InvalidCommand {
                    message: "Only executors may report command completion".into(),
                },
            )];
        }
        info!(session_id = %id, "command completed on executor");
        vec![Outbound::all(ServerEvent::CommandStatus(report))]
    }

    pub fn ping(&self, id: &SessionId, now: i64) -> Vec<Outbound> {
        vec![Outbound::to(id, ServerEvent::Pong { timestamp: now })]
    }

    fn user_count(&self) -> Outbound {
        Outbound::all(ServerEvent::UserCountUpdate {
            count: self.registry.submitter_count(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcaster::Target;
    use serde_json::json;

    fn state() -> RelayState {
        RelayState::new(&RelayConfig::default())
    }

    fn state_with_capacity(capacity: usize) -> RelayState {
        RelayState::new(&RelayConfig {
            queue_capacity: capacity,
            ..Default::default()
        })
    }

    fn names(out: &[Outbound]) -> Vec<&'static str> {
        out.iter().map(|o| o.event.name()).collect()
    }

    #[test]
    fn connect_greets_and_broadcasts_count() {
        let mut s = state();
        let (id, out) = s.connect(0);
        assert_eq!(names(&out), vec!["stats_update", "user_count_update"]);
        assert_eq!(out[0].target, Target::Session(id));
        assert_eq!(out[1].target, Target::All);
        assert_eq!(out[1].event, ServerEvent::UserCountUpdate { count: 1 });
    }

    #[test]
    fn accepted_command_acks_and_broadcasts() {
        let mut s = state();
        let (a, _) = s.connect(0);
        let out = s.submit(&a, CommandRequest::new("move_up"), 0);

        assert_eq!(names(&out), vec!["command_queued", "queue_update"]);
        match &out[0].event {
            ServerEvent::CommandQueued { position, command } => {
                assert_eq!(*position, 1);
                assert_eq!(command.action, "move_up");
            }
            other => panic!("unexpected: {other:?}"),
        }
        match &out[1].event {
            ServerEvent::QueueUpdate { queue_length, last_command } => {
                assert_eq!(*queue_length, 1);
                assert_eq!(last_command.submitter_id_prefix, a.short());
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(s.registry().get(&a).unwrap().command_count, 1);
    }

    #[test]
    fn cooldown_scenario() {
        let mut s = state();
        let (a, _) = s.connect(0);

        let out = s.submit(&a, CommandRequest::new("move_up"), 0);
        assert_eq!(out[0].event.name(), "command_queued");

        let out = s.submit(&a, CommandRequest::new("move_down"), 100);
        assert_eq!(names(&out), vec!["rate_limited"]);
        assert_eq!(out[0].target, Target::Session(a.clone()));
        match &out[0].event {
            ServerEvent::RateLimited { cooldown_ms, retry_after_ms, .. } => {
                assert_eq!(*cooldown_ms, 1000);
                assert_eq!(*retry_after_ms, 900);
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(s.queue().len(), 1);

        let out = s.submit(&a, CommandRequest::new("move_down"), 1000);
        assert_eq!(out[0].event.name(), "command_queued");
        assert_eq!(s.queue().len(), 2);
    }

    #[test]
    fn capacity_scenario() {
        let mut s = state_with_capacity(2);
        let ids: Vec<SessionId> = (0..3).map(|_| s.connect(0).0).collect();

        let first = s.submit(&ids[0], CommandRequest::new("a"), 0);
        let second = s.submit(&ids[1], CommandRequest::new("b"), 0);
        let third = s.submit(&ids[2], CommandRequest::new("c"), 0);

        assert!(matches!(first[0].event, ServerEvent::CommandQueued { position: 1, .. }));
        assert!(matches!(second[0].event, ServerEvent::CommandQueued { position: 2, .. }));
        assert_eq!(names(&third), vec!["queue_full"]);
        assert_eq!(s.queue().len(), 2);
    }

    #[test]
    fn invalid_command_is_rejected_without_queueing() {
        let mut s = state();
        let (a, _) = s.connect(0);
        let out = s.submit(&a, CommandRequest::from_value(json!({"data": {}})), 0);
        assert_eq!(names(&out), vec!["invalid_command"]);
        assert!(s.queue().is_empty());
        assert_eq!(s.registry().get(&a).unwrap().command_count, 0);
    }

    #[test]
    fn rate_limit_is_checked_before_validation() {
        let mut s = state();
        let (a, _) = s.connect(0);
        s.submit(&a, CommandRequest::new("ok"), 0);
        let out = s.submit(&a, CommandRequest::default(), 10);
        assert_eq!(names(&out), vec!["rate_limited"]);
    }

    #[test]
    fn rate_limit_is_checked_before_capacity() {
        let mut s = state_with_capacity(1);
        let (a, _) = s.connect(0);
        s.submit(&a, CommandRequest::new("a"), 0);
        let out = s.submit(&a, CommandRequest::new("b"), 10);
        assert_eq!(names(&out), vec!["rate_limited"]);
    }

    #[test]
    fn disconnect_clears_rate_window() {
        let mut s = state();
        let (a, _) = s.connect(0);
        s.submit(&a, CommandRequest::new("move_up"), 0);
        assert!(s.limiter().contains(&a));

        let out = s.disconnect(&a);
        assert_eq!(out[0].event, ServerEvent::UserCountUpdate { count: 0 });
        assert!(!s.limiter().contains(&a));
        assert!(s.registry().role(&a).is_none());

        let (b, _) = s.connect(50);
        let out = s.submit(&b, CommandRequest::new("move_up"), 50);
        assert_eq!(out[0].event.name(), "command_queued");
    }

    #[test]
    fn executor_registration_twice() {
        let mut s = state();
        let (e, _) = s.connect(0);
        let first = s.register_executor(&e);
        let second = s.register_executor(&e);

        assert_eq!(names(&first), vec!["executor_registered", "user_count_update"]);
        assert_eq!(names(&second), vec!["executor_registered"]);
        assert_eq!(s.registry().executor_count(), 1);
        assert_eq!(s.registry().submitter_count(), 0);
    }

    #[test]
    fn executor_disconnect_is_silent() {
        let mut s = state();
        let (e, _) = s.connect(0);
        s.register_executor(&e);
        assert!(s.disconnect(&e).is_empty());
        assert_eq!(s.registry().executor_count(), 0);
    }

    #[test]
    fn disconnect_unknown_is_noop() {
        let mut s = state();
        assert!(s.disconnect(&SessionId::new()).is_empty());
    }

    #[test]
    fn completion_from_executor_is_broadcast_verbatim() {
        let mut s = state();
        let (e, _) = s.connect(0);
        s.register_executor(&e);
        let report = json!({"action": "move_up", "success": true});
        let out = s.report_completion(&e, report.clone());
        assert_eq!(out, vec![Outbound::all(ServerEvent::CommandStatus(report))]);
    }

    #[test]
    fn completion_from_submitter_is_refused() {
        let mut s = state();
        let (a, _) = s.connect(0);
        let out = s.report_completion(&a, json!({"success": true}));
        assert_eq!(names(&out), vec!["invalid_command"]);
        assert_eq!(out[0].target, Target::Session(a));
    }

    #[test]
    fn huge_capacity_does_not_preallocate() {
        let mut s = state_with_capacity(usize::MAX);
        let (a, _) = s.connect(0);
        let out = s.submit(&a, CommandRequest::new("move_up"), 0);
        assert_eq!(out[0].event.name(), "command_queued");
    }

    #[test]
    fn ping_answers_pong() {
        let mut s = state();
        let (a, _) = s.connect(0);
        let out = s.ping(&a, 77);
        assert_eq!(out, vec![Outbound::to(&a, ServerEvent::Pong { timestamp: 77 })]);
    }

    #[test]
    fn stats_projection() {
        let mut s = state();
        let (a, _) = s.connect(0);
        let (b, _) = s.connect(0);
        let (e, _) = s.connect(0);
        s.register_executor(&e);
        s.submit(&a, CommandRequest::new("x"), 0);
        s.submit(&b, CommandRequest::new("y"), 0);

        let stats = s.stats();
        assert_eq!(stats.submitter_count, 2);
        assert_eq!(stats.executor_count, 1);
        assert_eq!(stats.queue_length, 2);
        assert_eq!(stats.total_commands, 2);

        let queue = s.queue_snapshot();
        assert_eq!(queue.len(), 2);
        assert_eq!(queue[0].action, "x");
        assert_eq!(queue[1].action, "y");
    }
}
