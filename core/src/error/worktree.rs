use std::path::PathBuf;
use thiserror::Error;

/// Failures from the version-control worktree manager.
#[derive(Error, Debug)]
pub enum WorktreeError {
    #[error("not a git repository: {path}")]
    NotARepository { path: PathBuf },

    #[error("branch '{branch}' already exists")]
    BranchExists { branch: String },

    #[error("path is not a worktree of this repository: {path}")]
    NotAWorktree { path: PathBuf },

    #[error("git command failed: {message}")]
    GitFailed { message: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorktreeError {
    pub fn git_failed(message: impl Into<String>) -> Self {
        Self::GitFailed {
            message: message.into(),
        }
    }
}
