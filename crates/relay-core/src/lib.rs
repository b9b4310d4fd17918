pub mod command;
pub mod config;
pub mod errors;
pub mod events;
pub mod ids;

pub use command::{Command, CommandRequest};
pub use config::{ConfigError, RelayConfig};
pub use errors::RelayError;
pub use events::{CommandSummary, LastCommand, ServerEvent, Stats};
pub use ids::SessionId;

/// Current wall-clock time as Unix milliseconds.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
