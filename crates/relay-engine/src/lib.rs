pub mod broadcaster;
pub mod dispatcher;
pub mod error;
pub mod limiter;
pub mod queue;
pub mod registry;
pub mod relay;
pub mod state;

pub use broadcaster::{Broadcaster, Outbound, SessionSink, Target};
pub use dispatcher::Dispatcher;
pub use error::EngineError;
pub use limiter::RateLimiter;
pub use queue::CommandQueue;
pub use registry::{RegisterOutcome, Role, SessionRecord, SessionRegistry};
pub use relay::{spawn_relay, RelayHandle, RelayInput};
pub use state::RelayState;
