use crate::events::ServerEvent;
use crate::ids::SessionId;

/// Every failure the relay can observe. None of them is fatal to the process.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum RelayError {
    // Rejections, reported back to the submitting session only
    #[error("invalid command: {0}")]
    InvalidCommand(String),
    #[error("rate limited, retry in {retry_after_ms}ms")]
    RateLimited { cooldown_ms: u64, retry_after_ms: u64 },
    #[error("command queue is full ({capacity} pending)")]
    QueueFull { capacity: usize },

    // Operational, logged and otherwise swallowed
    #[error("no executor available")]
    NoExecutorAvailable,
    #[error("delivery to {session_id} failed: {reason}")]
    TransportFailure { session_id: SessionId, reason: String },
}

impl RelayError {
    /// Whether this error is answered with a unicast notice to the submitter.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::InvalidCommand(_) | Self::RateLimited { .. } | Self::QueueFull { .. }
        )
    }

    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::InvalidCommand(_) => "invalid_command",
            Self::RateLimited { .. } => "rate_limited",
            Self::QueueFull { .. } => "queue_full",
            Self::NoExecutorAvailable => "no_executor_available",
            Self::TransportFailure { .. } => "transport_failure",
        }
    }

    /// The notice sent to the offending session, for rejections.
    pub fn to_event(&self) -> Option<ServerEvent> {
        match self {
            Self::InvalidCommand(reason) => Some(ServerEvent::InvalidCommand {
                message: format!("Invalid command format: {reason}"),
            }),
            Self::RateLimited {
                cooldown_ms,
                retry_after_ms,
            } => Some(ServerEvent::RateLimited {
                message: "Please wait before sending another command".into(),
                cooldown_ms: *cooldown_ms,
                retry_after_ms: *retry_after_ms,
            }),
            Self::QueueFull { .. } => Some(ServerEvent::QueueFull {
                message: "Command queue is full, please try again later".into(),
            }),
            Self::NoExecutorAvailable | Self::TransportFailure { .. } => None,
        }
    }
}
