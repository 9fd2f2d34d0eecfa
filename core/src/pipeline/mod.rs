//! Per-task execution pipeline: argument assembly, process lifecycle,
//! stream handling, timeout and cancellation.

mod process;
mod prompt;
mod summary;

pub use process::{LineStream, LineTap, DRAIN_TIMEOUT, STDERR_CAPTURE, STDOUT_CAPTURE, TERM_GRACE};
pub use prompt::{
    append_skills_section, read_agent_prompt_file, should_use_stdin, wrap_with_agent_prompt,
    STDIN_LENGTH_THRESHOLD, STDIN_SPECIAL_CHARS,
};
pub use summary::{extract_summary, TaskSummary, COVERAGE_TARGET};

use std::path::PathBuf;
use std::time::{Duration, Instant};

use tokio::sync::watch;

use crate::backend::{self, BackendKind};
use crate::batch::TaskSpec;
use crate::config::{AgentConfig, EngineConfig};
use crate::error::{TaskError, EXIT_FAILURE, EXIT_INTERRUPTED, EXIT_TIMEOUT};
use crate::scheduler::{TaskResult, TaskState};
use crate::stream::{StreamEvent, StreamParser};
use crate::tasklog::TaskLogger;

/// Shared, read-only context for every task in a run.
pub struct PipelineContext {
    pub engine: EngineConfig,
    pub agents: AgentConfig,
    pub run_id: String,
}

/// Run a single task end to end. All failures are folded into the returned
/// TaskResult; this function itself never aborts the batch.
pub async fn execute_task(
    ctx: &PipelineContext,
    task: &TaskSpec,
    mut cancel: watch::Receiver<bool>,
) -> TaskResult {
    let started = Instant::now();

    if *cancel.borrow() {
        return TaskResult::unstarted(&task.id, TaskState::Cancelled, "cancelled before start");
    }

    match run_pipeline(ctx, task, &mut cancel, started).await {
        Ok(result) => result,
        Err(e) => {
            let exit_code = e.exit_code();
            let state = match exit_code {
                EXIT_TIMEOUT => TaskState::TimedOut,
                EXIT_INTERRUPTED => TaskState::Cancelled,
                _ => TaskState::Failed,
            };
            TaskResult {
                task_id: task.id.clone(),
                state,
                session_id: None,
                agent_message: String::new(),
                log_dir: None,
                exit_code,
                error: Some(e.to_string()),
                summary: None,
                duration_ms: started.elapsed().as_millis() as u64,
            }
        }
    }
}

async fn run_pipeline(
    ctx: &PipelineContext,
    task: &TaskSpec,
    cancel: &mut watch::Receiver<bool>,
    started: Instant,
) -> Result<TaskResult, TaskError> {
    // Step 1-2: preset merge, backend resolution, working directory.
    let mut task = merge_preset(task, &ctx.agents)?;
    if task.model.is_none() {
        task.model = ctx.agents.default_model.clone();
    }
    let backend = resolve_backend(&task, &ctx.agents)?;
    let workdir = resolve_workdir(ctx, &task).await?;

    // Step 3: final prompt.
    let final_prompt = assemble_prompt(ctx, &task, &workdir)?;

    // Step 4-5: argv/env and the stdin strategy.
    let via_stdin = should_use_stdin(&final_prompt, task.force_stdin);
    let skip_permissions = effective_skip_permissions(&task, &ctx.engine);
    let overrides = ctx.agents.backends.get(backend.as_str());
    let launch = backend::assemble(
        backend,
        &task,
        overrides,
        skip_permissions,
        &final_prompt,
        via_stdin,
    );

    // Step 6: log sink, then spawn.
    let mut argv = vec![launch.program.clone()];
    argv.extend(launch.args.iter().cloned());
    let mut logger = TaskLogger::create(
        &ctx.engine.tmpdir,
        &ctx.run_id,
        &task.id,
        argv,
        launch.env.clone(),
        &workdir,
    )
    .await?;

    let mut spawned = match process::spawn(&launch, &workdir, &final_prompt) {
        Ok(s) => s,
        Err(e) => {
            let exit_code = e.exit_code();
            let result = TaskResult {
                task_id: task.id.clone(),
                state: TaskState::Failed,
                session_id: None,
                agent_message: String::new(),
                log_dir: Some(logger.dir().to_path_buf()),
                exit_code,
                error: Some(e.to_string()),
                summary: None,
                duration_ms: started.elapsed().as_millis() as u64,
            };
            logger.finalize("context-cancel", &result).await;
            return Ok(result);
        }
    };

    tracing::info!(
        task_id = %task.id,
        backend = %backend,
        workdir = %workdir.display(),
        via_stdin,
        "task started"
    );

    // Step 7-10: pump streams, enforce timeout/cancellation, drain.
    let mut parser = StreamParser::new(backend);
    let stderr_filters = backend.stderr_filters();

    let timeout = Duration::from_millis(ctx.engine.timeout_ms);
    let timeout_sleep = tokio::time::sleep(timeout);
    tokio::pin!(timeout_sleep);

    let mut timed_out = false;
    let mut cancelled = false;
    let mut cancel_open = true;
    let child_pid = spawned.child.id();

    let exit_status = 'run: {
        // Normal operation: pump lines until the child exits, the timeout
        // fires, or cancellation arrives.
        loop {
            tokio::select! {
                status = spawned.child.wait() => break 'run status,

                _ = &mut timeout_sleep => {
                    tracing::warn!(
                        task_id = %task.id,
                        timeout_ms = ctx.engine.timeout_ms,
                        "task timed out, sending SIGTERM"
                    );
                    timed_out = true;
                    process::request_termination(child_pid);
                    break;
                }

                changed = cancel.changed(), if cancel_open => {
                    match changed {
                        Ok(()) if *cancel.borrow() => {
                            tracing::warn!(task_id = %task.id, "cancellation received, sending SIGTERM");
                            cancelled = true;
                            process::request_termination(child_pid);
                            break;
                        }
                        Ok(()) => {}
                        Err(_) => cancel_open = false,
                    }
                }

                tap = spawned.line_rx.recv() => {
                    if let Some(tap) = tap {
                        handle_tap(&tap, &mut parser, &mut logger, stderr_filters).await;
                    }
                }
            }
        }

        // Grace period after SIGTERM: keep draining, escalate to SIGKILL
        // once it expires.
        let kill_at = tokio::time::Instant::now() + TERM_GRACE;
        let mut killed = false;
        loop {
            tokio::select! {
                status = spawned.child.wait() => break 'run status,

                _ = tokio::time::sleep_until(kill_at), if !killed => {
                    tracing::warn!(task_id = %task.id, "grace period expired, sending SIGKILL");
                    process::force_kill(child_pid);
                    killed = true;
                }

                tap = spawned.line_rx.recv() => {
                    if let Some(tap) = tap {
                        handle_tap(&tap, &mut parser, &mut logger, stderr_filters).await;
                    }
                }
            }
        }
    };

    // Step 10: post-exit drain, bounded at 500 ms.
    let drain_deadline = tokio::time::Instant::now() + DRAIN_TIMEOUT;
    let close_reason = loop {
        tokio::select! {
            _ = tokio::time::sleep_until(drain_deadline) => break "drain-timeout",
            tap = spawned.line_rx.recv() => {
                match tap {
                    Some(tap) => handle_tap(&tap, &mut parser, &mut logger, stderr_filters).await,
                    None => break if cancelled { "context-cancel" } else { "wait-done" },
                }
            }
        }
    };
    spawned.out_task.abort();
    spawned.err_task.abort();

    // Step 11: classify and freeze the result.
    let raw_exit = match exit_status {
        Ok(status) => status.code().unwrap_or(EXIT_FAILURE),
        Err(e) => {
            tracing::error!(error.kind = "process.wait_failed", error.message = %e);
            EXIT_FAILURE
        }
    };

    let agent_message = parser.final_agent_message();
    let session_id = parser.session_id().map(str::to_string);

    let (state, exit_code, error) = if timed_out {
        (
            TaskState::TimedOut,
            EXIT_TIMEOUT,
            Some(format!("timeout after {}ms", ctx.engine.timeout_ms)),
        )
    } else if cancelled {
        (TaskState::Cancelled, EXIT_INTERRUPTED, Some("cancelled".to_string()))
    } else if raw_exit == EXIT_TIMEOUT {
        (TaskState::TimedOut, EXIT_TIMEOUT, None)
    } else if raw_exit == EXIT_INTERRUPTED {
        (TaskState::Cancelled, EXIT_INTERRUPTED, None)
    } else if raw_exit == 0 && !agent_message.trim().is_empty() {
        (TaskState::Succeeded, 0, None)
    } else if raw_exit == 0 {
        let mut msg = TaskError::EmptyOutput.to_string();
        let stdout_tail = spawned.stdout_tail.tail_string();
        if !stdout_tail.trim().is_empty() {
            msg = format!("{msg}; stdout tail: {}", stdout_tail.trim());
        }
        (TaskState::Failed, EXIT_FAILURE, Some(msg))
    } else {
        let stderr_tail = spawned.stderr_tail.tail_string();
        let msg = if stderr_tail.trim().is_empty() {
            format!("backend exited with {raw_exit}")
        } else {
            format!("backend exited with {raw_exit}: {}", stderr_tail.trim())
        };
        (TaskState::Failed, raw_exit, Some(msg))
    };

    let summary = extract_summary(&agent_message);
    let result = TaskResult {
        task_id: task.id.clone(),
        state,
        session_id,
        agent_message,
        log_dir: Some(logger.dir().to_path_buf()),
        exit_code,
        error,
        summary,
        duration_ms: started.elapsed().as_millis() as u64,
    };

    logger.finalize(close_reason, &result).await;
    tracing::info!(
        task_id = %task.id,
        state = result.state.as_str(),
        exit_code = result.exit_code,
        duration_ms = result.duration_ms,
        close_reason,
        "task finished"
    );

    Ok(result)
}

async fn handle_tap(
    tap: &LineTap,
    parser: &mut StreamParser,
    logger: &mut TaskLogger,
    stderr_filters: &[&str],
) {
    match tap.stream {
        LineStream::Stdout => {
            logger.stdout_line(&tap.line).await;
            for event in parser.parse_line(&tap.line) {
                if let StreamEvent::Error { message } = &event {
                    tracing::warn!(error.kind = "backend.error_event", message = %message);
                }
                logger.event(&event).await;
            }
        }
        LineStream::Stderr => {
            if stderr_filters.iter().any(|f| tap.line.contains(f)) {
                return;
            }
            logger.stderr_line(&tap.line).await;
        }
    }
}

/// Merge the named agent preset into the task. Explicit task fields win;
/// a task backend that disagrees with the preset's is kept with a warning.
fn merge_preset(task: &TaskSpec, agents: &AgentConfig) -> Result<TaskSpec, TaskError> {
    let mut task = task.clone();
    let Some(name) = task.agent.clone() else {
        return Ok(task);
    };

    let Some(preset) = agents.agents.get(&name) else {
        return Err(TaskError::Precondition(format!(
            "agent preset not found: {name}"
        )));
    };

    if let (Some(task_backend), Some(preset_backend)) =
        (task.backend.as_deref(), preset.backend.as_deref())
    {
        if !task_backend.eq_ignore_ascii_case(preset_backend) {
            tracing::warn!(
                agent = %name,
                task_backend,
                preset_backend,
                "task backend overrides agent preset backend"
            );
        }
    }

    if task.backend.is_none() {
        task.backend = preset.backend.clone();
    }
    if task.model.is_none() {
        task.model = preset.model.clone();
    }
    if task.prompt_file.is_none() {
        task.prompt_file = preset.prompt_file.clone();
    }
    if task.reasoning_effort.is_none() {
        task.reasoning_effort = preset
            .reasoning_effort
            .as_deref()
            .and_then(crate::batch::ReasoningEffort::parse);
    }
    if task.skip_permissions.is_none() && preset.skip_permissions {
        task.skip_permissions = Some(true);
    }
    if task.allowed_tools.is_empty() {
        task.allowed_tools = preset.allowed_tools.clone();
    }
    if task.disallowed_tools.is_empty() {
        task.disallowed_tools = preset.disallowed_tools.clone();
    }

    Ok(task)
}

fn resolve_backend(task: &TaskSpec, agents: &AgentConfig) -> Result<BackendKind, TaskError> {
    let name = task
        .backend
        .clone()
        .unwrap_or_else(|| agents.default_backend.clone());
    BackendKind::parse(&name).map_err(|e| TaskError::Precondition(e.to_string()))
}

async fn resolve_workdir(ctx: &PipelineContext, task: &TaskSpec) -> Result<PathBuf, TaskError> {
    let base = match &task.workdir {
        Some(dir) => crate::util::expand_tilde(dir),
        None => std::env::current_dir()?,
    };

    if !task.worktree {
        return Ok(base);
    }

    // An externally provisioned worktree wins; a fresh --worktree flag in
    // that context is a no-op beyond validation.
    if let Some(external) = &ctx.engine.external_worktree {
        let handle = crate::worktree::reuse(external, &task.id)
            .await
            .map_err(|e| TaskError::Precondition(e.to_string()))?;
        return Ok(handle.path);
    }

    let handle = crate::worktree::provision(&base, &task.id)
        .await
        .map_err(|e| TaskError::Precondition(e.to_string()))?;
    Ok(handle.path)
}

fn assemble_prompt(
    ctx: &PipelineContext,
    task: &TaskSpec,
    workdir: &std::path::Path,
) -> Result<String, TaskError> {
    let mut prompt = task.prompt.clone();

    if let Some(path) = &task.prompt_file {
        let contents = read_agent_prompt_file(
            path,
            &ctx.engine.prompt_file_roots,
            ctx.engine.allow_prompt_file_anywhere,
        )?;
        if !contents.is_empty() {
            prompt = wrap_with_agent_prompt(&contents, &prompt);
        }
    }

    let skill_names = if task.skills.is_empty() {
        crate::skills::detect_project_skills(workdir)
    } else {
        task.skills.clone()
    };
    if !skill_names.is_empty() {
        let blocks = crate::skills::resolve_skill_blocks(&skill_names, ctx.engine.skill_budget);
        prompt = append_skills_section(&prompt, &crate::skills::render_skill_blocks(&blocks));
    }

    Ok(prompt)
}

fn effective_skip_permissions(task: &TaskSpec, engine: &EngineConfig) -> Option<bool> {
    match task.skip_permissions {
        Some(v) => Some(v),
        None if engine.skip_permissions => Some(true),
        None => None,
    }
}
