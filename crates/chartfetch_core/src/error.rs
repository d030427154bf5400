use thiserror::Error;

/// Failure of an operation that crosses, or is about to cross, the engine boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// Required input was missing or empty; caught before the engine saw it,
    /// or reported by the engine as a rejected argument.
    #[error("validation failed: {0}")]
    Validation(String),
    /// The engine rejected the call or the transport failed.
    #[error("engine call failed: {0}")]
    Io(String),
    /// The orchestrator driver has shut down.
    #[error("orchestrator is no longer running")]
    Closed,
}

impl EngineError {
    pub fn validation(message: impl Into<String>) -> Self {
        EngineError::Validation(message.into())
    }

    pub fn io(message: impl Into<String>) -> Self {
        EngineError::Io(message.into())
    }
}
