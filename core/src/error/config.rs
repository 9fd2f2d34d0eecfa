use thiserror::Error;

/// Configuration-level failures: batch grammar, task validation, backend
/// resolution. All of these abort before any task is launched (exit 1).
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("no task blocks found (missing ---TASK--- marker?)")]
    NoTasks,

    #[error("task #{task_index}: missing ---CONTENT--- marker")]
    MissingContentMarker { task_index: usize },

    #[error("task #{task_index} line {line}: invalid header line: {text}")]
    InvalidHeaderLine {
        task_index: usize,
        line: usize,
        text: String,
    },

    #[error("task #{task_index}: missing required header 'id'")]
    MissingId { task_index: usize },

    #[error("task #{task_index} line {line}: invalid task id: {id}")]
    InvalidId {
        task_index: usize,
        line: usize,
        id: String,
    },

    #[error("duplicate task id: {0}")]
    DuplicateId(String),

    #[error("unknown dependency '{dep}' on task '{task}'")]
    UnknownDependency { task: String, dep: String },

    #[error("cycle detected: {0}")]
    CircularDependency(String),

    #[error("unknown backend: {0}")]
    UnknownBackend(String),

    #[error("task #{task_index} line {line}: invalid value for {key}: {value}")]
    InvalidValue {
        task_index: usize,
        line: usize,
        key: &'static str,
        value: String,
    },

    #[error("config file error: {0}")]
    File(String),
}
