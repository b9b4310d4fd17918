pub mod api;
pub mod config;
pub mod connection;
pub mod protocol;
pub mod server;
pub mod websocket;

pub use config::ServerConfig;
pub use server::{build_router, start, AppState, ServerError, ServerHandle, ShutdownReport};
