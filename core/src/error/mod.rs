mod config;
mod task;
mod worktree;

pub use config::ConfigError;
pub use task::TaskError;
pub use worktree::WorktreeError;

use thiserror::Error;

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;
pub const EXIT_TIMEOUT: i32 = 124;
pub const EXIT_BACKEND_NOT_FOUND: i32 = 127;
pub const EXIT_INTERRUPTED: i32 = 130;

/// Top-level error for the binary. Everything that escapes the engine is one
/// of these; per-task failures are captured in TaskResults instead.
#[derive(Error, Debug)]
pub enum CliError {
    #[error("invalid config: {0}")]
    Config(#[from] ConfigError),

    #[error("task failed: {0}")]
    Task(#[from] TaskError),

    #[error("worktree error: {0}")]
    Worktree(#[from] WorktreeError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl CliError {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => EXIT_FAILURE,
            Self::Task(e) => e.exit_code(),
            Self::Worktree(_) => EXIT_FAILURE,
            Self::Io(_) => EXIT_FAILURE,
            Self::Other(_) => EXIT_FAILURE,
        }
    }
}
