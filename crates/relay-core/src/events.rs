use serde::Serialize;
use serde_json::Value;

use crate::command::Command;

/// Events pushed from the relay to connected sessions.
///
/// Serialized as `{"event": "<name>", "data": {...}}`, one per WebSocket frame.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    ExecutorRegistered {
        status: String,
    },

    StatsUpdate(Stats),

    UserCountUpdate {
        count: usize,
    },

    RateLimited {
        message: String,
        cooldown_ms: u64,
        retry_after_ms: u64,
    },

    InvalidCommand {
        message: String,
    },

    QueueFull {
        message: String,
    },

    /// Ack to the submitter; `position` is 1-based.
    CommandQueued {
        position: usize,
        command: Command,
    },

    QueueUpdate {
        queue_length: usize,
        last_command: LastCommand,
    },

    /// Only ever sent to executors.
    ExecuteCommand {
        command: Command,
    },

    CommandExecuted {
        command: Command,
        queue_length: usize,
        timestamp: i64,
        executor_count: usize,
    },

    /// Completion report from an executor, relayed as-is.
    CommandStatus(Value),

    Pong {
        timestamp: i64,
    },
}

impl ServerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ExecutorRegistered { .. } => "executor_registered",
            Self::StatsUpdate(_) => "stats_update",
            Self::UserCountUpdate { .. } => "user_count_update",
            Self::RateLimited { .. } => "rate_limited",
            Self::InvalidCommand { .. } => "invalid_command",
            Self::QueueFull { .. } => "queue_full",
            Self::CommandQueued { .. } => "command_queued",
            Self::QueueUpdate { .. } => "queue_update",
            Self::ExecuteCommand { .. } => "execute_command",
            Self::CommandExecuted { .. } => "command_executed",
            Self::CommandStatus(_) => "command_status",
            Self::Pong { .. } => "pong",
        }
    }
}

/// Point-in-time counters, pushed on connect and served by `/api/stats`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub submitter_count: usize,
    pub queue_length: usize,
    pub executor_count: usize,
    /// Accepted commands summed over currently connected submitters.
    pub total_commands: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LastCommand {
    pub action: String,
    pub submitter_id_prefix: String,
}

/// Public projection of a queued command.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandSummary {
    pub action: String,
    pub timestamp: i64,
    pub submitter_id_prefix: String,
}

impl From<&Command> for CommandSummary {
    fn from(cmd: &Command) -> Self {
        Self {
            action: cmd.action.clone(),
            timestamp: cmd.timestamp,
            submitter_id_prefix: cmd.submitter.short(),
        }
    }
}
