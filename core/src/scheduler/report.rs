use std::fmt::Write as _;
use std::path::PathBuf;

use serde::Serialize;

use crate::error::{EXIT_FAILURE, EXIT_INTERRUPTED, EXIT_SUCCESS, EXIT_TIMEOUT};
use crate::pipeline::TaskSummary;

/// Terminal state of an attempted task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskState {
    Succeeded,
    Failed,
    Skipped,
    Cancelled,
    TimedOut,
}

impl TaskState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
            Self::Cancelled => "cancelled",
            Self::TimedOut => "timed-out",
        }
    }
}

/// Produced exactly once per attempted task; frozen once the worker records
/// the terminal state.
#[derive(Debug, Clone, Serialize)]
pub struct TaskResult {
    pub task_id: String,
    pub state: TaskState,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    pub agent_message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,

    pub exit_code: i32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<TaskSummary>,

    pub duration_ms: u64,
}

impl TaskResult {
    /// Placeholder result for a task that never ran.
    pub fn unstarted(task_id: &str, state: TaskState, reason: &str) -> Self {
        let exit_code = match state {
            TaskState::Succeeded => EXIT_SUCCESS,
            TaskState::TimedOut => EXIT_TIMEOUT,
            TaskState::Cancelled => EXIT_INTERRUPTED,
            _ => EXIT_FAILURE,
        };
        Self {
            task_id: task_id.to_string(),
            state,
            session_id: None,
            agent_message: String::new(),
            log_dir: None,
            exit_code,
            error: Some(reason.to_string()),
            summary: None,
            duration_ms: 0,
        }
    }
}

/// Aggregate outcome of one parallel invocation. Results keep submission
/// order regardless of completion order.
#[derive(Debug, Serialize)]
pub struct BatchReport {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub cancelled: usize,
    pub timed_out: usize,
    pub results: Vec<TaskResult>,
    pub exit_code: i32,
}

impl BatchReport {
    pub fn new(results: Vec<TaskResult>, externally_cancelled: bool) -> Self {
        let count = |s: TaskState| results.iter().filter(|r| r.state == s).count();
        let succeeded = count(TaskState::Succeeded);
        let failed = count(TaskState::Failed);
        let skipped = count(TaskState::Skipped);
        let cancelled = count(TaskState::Cancelled);
        let timed_out = count(TaskState::TimedOut);

        // Candidate codes per failure kind present; ties resolve to the
        // numerically smallest, so timeout + failure yields 1.
        let mut candidates: Vec<i32> = Vec::new();
        if failed > 0 || skipped > 0 || (cancelled > 0 && !externally_cancelled) {
            candidates.push(EXIT_FAILURE);
        }
        if timed_out > 0 {
            candidates.push(EXIT_TIMEOUT);
        }
        if externally_cancelled {
            candidates.push(EXIT_INTERRUPTED);
        }
        let exit_code = candidates.into_iter().min().unwrap_or(EXIT_SUCCESS);

        Self {
            total: results.len(),
            succeeded,
            failed,
            skipped,
            cancelled,
            timed_out,
            results,
            exit_code,
        }
    }

    /// Human-readable report: header counts, then one section per task in
    /// submission order.
    pub fn render(&self, full_output: bool) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "{} tasks: {} succeeded, {} failed, {} skipped, {} cancelled, {} timed-out",
            self.total, self.succeeded, self.failed, self.skipped, self.cancelled, self.timed_out
        );

        for r in &self.results {
            let _ = writeln!(out);
            let _ = writeln!(out, "[{}] {} (exit {})", r.task_id, r.state.as_str(), r.exit_code);
            if let Some(session) = &r.session_id {
                let _ = writeln!(out, "  session: {session}");
            }
            if let Some(err) = &r.error {
                let _ = writeln!(out, "  error: {err}");
            }
            if let Some(summary) = &r.summary {
                if !summary.did.is_empty() {
                    let _ = writeln!(out, "  did: {}", summary.did);
                }
                if !summary.files.is_empty() {
                    let _ = writeln!(out, "  files: {}", summary.files);
                }
                if !summary.tests.is_empty() {
                    let _ = writeln!(out, "  tests: {}", summary.tests);
                }
                if !summary.coverage.is_empty() {
                    let flag = if summary.below_threshold {
                        " (below-threshold)"
                    } else {
                        ""
                    };
                    let _ = writeln!(out, "  coverage: {}{flag}", summary.coverage);
                }
            }
            if let Some(dir) = &r.log_dir {
                let _ = writeln!(out, "  log: {}", dir.display());
            }
            if full_output && !r.agent_message.is_empty() {
                let _ = writeln!(out, "  output:");
                for line in r.agent_message.lines() {
                    let _ = writeln!(out, "    {line}");
                }
            }
        }
        out
    }
}
