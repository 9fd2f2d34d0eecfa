//! Public facade for the CLI crate: the few types and entry points the
//! binary needs, re-exported in one place.

use std::sync::Arc;

use tokio::sync::watch;

pub use crate::backend::BackendKind;
pub use crate::batch::{parse_batch, to_batch_text, ReasoningEffort, TaskSpec};
pub use crate::config::{
    load_agent_config, AgentConfig, AgentPreset, EngineConfig, MAX_WORKER_CAP,
};
pub use crate::error::{
    CliError, ConfigError, TaskError, EXIT_FAILURE, EXIT_INTERRUPTED, EXIT_SUCCESS, EXIT_TIMEOUT,
};
pub use crate::pipeline::PipelineContext;
pub use crate::scheduler::{BatchReport, SchedulerOpts, TaskResult, TaskState};

/// Fresh run identifier for log directories.
pub fn new_run_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Execute one task through the pipeline.
pub async fn run_single_task(
    ctx: Arc<PipelineContext>,
    task: TaskSpec,
    cancel: watch::Receiver<bool>,
) -> TaskResult {
    crate::pipeline::execute_task(&ctx, &task, cancel).await
}

/// Execute a batch through the scheduler with the pipeline as executor.
pub async fn run_parallel(
    ctx: Arc<PipelineContext>,
    tasks: Vec<TaskSpec>,
    opts: SchedulerOpts,
    cancel: watch::Receiver<bool>,
) -> Result<BatchReport, ConfigError> {
    let task_cancel = cancel.clone();
    let executor = move |task: TaskSpec| {
        let ctx = ctx.clone();
        let cancel = task_cancel.clone();
        async move { crate::pipeline::execute_task(&ctx, &task, cancel).await }
    };
    crate::scheduler::run_batch(&tasks, &opts, cancel, executor).await
}
