use thiserror::Error;

/// Per-task execution failures. These are captured into the TaskResult and
/// never abort the batch on their own.
#[derive(Error, Debug)]
pub enum TaskError {
    #[error("spawn failed: {0}")]
    Spawn(String),

    #[error("backend executable not found: {0}")]
    BackendNotFound(String),

    #[error("timeout after {0}s")]
    Timeout(u64),

    #[error("cancelled")]
    Cancelled,

    #[error("precondition failed: {0}")]
    Precondition(String),

    #[error("backend produced no agent message")]
    EmptyOutput,

    #[error("stream io error: {stream}: {source}")]
    StreamIo {
        stream: &'static str,
        source: std::io::Error,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl TaskError {
    /// Exit code recorded in the TaskResult for this failure kind.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::BackendNotFound(_) => crate::error::EXIT_BACKEND_NOT_FOUND,
            Self::Timeout(_) => crate::error::EXIT_TIMEOUT,
            Self::Cancelled => crate::error::EXIT_INTERRUPTED,
            _ => crate::error::EXIT_FAILURE,
        }
    }
}
