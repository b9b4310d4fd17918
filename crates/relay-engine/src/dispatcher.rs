//! Timer-driven drain of the command queue.
//!
//! One command leaves the queue per tick, however deep the queue is, and is
//! fanned out to every registered executor. With no executor connected the
//! command is dropped. Delivery is at-most-once.

use std::time::Duration;

use relay_core::{RelayError, ServerEvent};
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{info, warn};

use crate::broadcaster::Outbound;
use crate::state::RelayState;

pub struct Dispatcher {
    period: Duration,
}

impl Dispatcher {
    pub fn new(period: Duration) -> Self {
        Self { period }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Ticker for the relay loop. The first tick fires one period from now;
    /// a late tick delays the schedule instead of bursting to catch up.
    pub fn interval(&self) -> Interval {
        let mut ticker = interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    }

    /// Dequeue at most one command and produce its deliveries.
    pub fn tick(state: &mut RelayState, now: i64) -> Vec<Outbound> {
        let Some(command) = state.queue.dequeue_one() else {
            return Vec::new();
        };

        let executors = state.registry.executor_ids();
        if executors.is_empty() {
            let err = RelayError::NoExecutorAvailable;
            warn!(
                action = %command.action,
                kind = err.error_kind(),
                "dropping command, no executor connected"
            );
        } else {
            info!(
                action = %command.action,
                executors = executors.len(),
                "dispatching command"
            );
        }

        let mut out: Vec<Outbound> = executors
            .iter()
            .map(|executor| {
                Outbound::to(
                    executor,
                    ServerEvent::ExecuteCommand {
                        command: command.clone(),
                    },
                )
            })
            .collect();

        out.push(Outbound::all(ServerEvent::CommandExecuted {
            command,
            queue_length: state.queue.len(),
            timestamp: now,
            executor_count: executors.len(),
        }));
        out
    }
}
