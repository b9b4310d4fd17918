#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("relay is shut down")]
    Closed,
}
