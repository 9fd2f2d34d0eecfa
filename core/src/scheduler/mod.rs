//! Parallel task scheduler: dependency resolution, bounded worker pool,
//! skip propagation, fail-fast, and external cancellation.

mod graph;
mod report;

pub use graph::TaskGraph;
pub use report::{BatchReport, TaskResult, TaskState};

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;

use futures::stream::FuturesUnordered;
use futures::StreamExt;
use tokio::sync::{watch, Semaphore};

use crate::batch::TaskSpec;
use crate::config::MAX_WORKER_CAP;
use crate::error::ConfigError;

#[derive(Debug, Clone)]
pub struct SchedulerOpts {
    /// Worker-pool capacity; 0 means unbounded (still capped at 100).
    pub max_workers: usize,
    /// Cancel not-yet-started tasks after the first terminal failure.
    pub fail_fast: bool,
}

impl Default for SchedulerOpts {
    fn default() -> Self {
        Self {
            max_workers: 0,
            fail_fast: false,
        }
    }
}

fn effective_capacity(max_workers: usize) -> usize {
    if max_workers == 0 {
        MAX_WORKER_CAP
    } else {
        max_workers.min(MAX_WORKER_CAP)
    }
}

/// Execute a batch honoring the dependency DAG.
///
/// The executor is an injected async closure so callers (and tests) decide
/// what "running a task" means; the production binding is
/// [`crate::pipeline::execute_task`]. A task runs only after every
/// dependency reached a terminal state; a task with a non-succeeded
/// dependency is skipped without executing. Results come back in submission
/// order.
pub async fn run_batch<F, Fut>(
    tasks: &[TaskSpec],
    opts: &SchedulerOpts,
    cancel: watch::Receiver<bool>,
    executor: F,
) -> Result<BatchReport, ConfigError>
where
    F: Fn(TaskSpec) -> Fut + Clone,
    Fut: Future<Output = TaskResult>,
{
    let graph = TaskGraph::build(tasks)?;
    let n = tasks.len();

    let mut in_degree = graph.in_degree.clone();
    let mut dep_failed = vec![false; n];
    let mut started = vec![false; n];
    let mut results: Vec<Option<TaskResult>> = (0..n).map(|_| None).collect();
    let mut finished = 0usize;

    let mut ready: VecDeque<usize> = graph.initially_ready().into();
    let mut running = FuturesUnordered::new();
    let sem = Arc::new(Semaphore::new(effective_capacity(opts.max_workers)));

    let mut cancel_rx = cancel;
    let mut cancel_open = true;
    let mut externally_cancelled = *cancel_rx.borrow();
    let mut abort_new = externally_cancelled;

    tracing::info!(
        total = n,
        capacity = effective_capacity(opts.max_workers),
        fail_fast = opts.fail_fast,
        "batch started"
    );

    while finished < n {
        // Launch (or immediately resolve) everything that became ready.
        while let Some(idx) = ready.pop_front() {
            if results[idx].is_some() {
                continue;
            }
            if abort_new {
                record_terminal(
                    &graph,
                    TaskResult::unstarted(&tasks[idx].id, TaskState::Cancelled, "cancelled"),
                    idx,
                    &mut results,
                    &mut in_degree,
                    &mut dep_failed,
                    &mut ready,
                    &mut finished,
                );
                continue;
            }
            if dep_failed[idx] {
                record_terminal(
                    &graph,
                    TaskResult::unstarted(&tasks[idx].id, TaskState::Skipped, "dependency-failed"),
                    idx,
                    &mut results,
                    &mut in_degree,
                    &mut dep_failed,
                    &mut ready,
                    &mut finished,
                );
                continue;
            }

            // A task counts as started only once it holds a pool permit;
            // everything still queued here stays eligible for fail-fast
            // and cancellation.
            let Ok(permit) = sem.clone().try_acquire_owned() else {
                ready.push_front(idx);
                break;
            };
            started[idx] = true;
            let task = tasks[idx].clone();
            let executor = executor.clone();
            running.push(async move {
                let _permit = permit;
                let result = executor(task).await;
                (idx, result)
            });
        }

        if finished == n {
            break;
        }

        tokio::select! {
            Some((idx, result)) = running.next(), if !running.is_empty() => {
                let failed = result.state != TaskState::Succeeded;
                record_terminal(
                    &graph,
                    result,
                    idx,
                    &mut results,
                    &mut in_degree,
                    &mut dep_failed,
                    &mut ready,
                    &mut finished,
                );
                if failed && opts.fail_fast && !abort_new {
                    tracing::warn!(task_id = %tasks[idx].id, "fail-fast: cancelling not-yet-started tasks");
                    abort_new = true;
                    cancel_unstarted(&graph, tasks, &started, &mut results, &mut in_degree,
                        &mut dep_failed, &mut ready, &mut finished);
                }
            }

            changed = cancel_rx.changed(), if cancel_open => {
                match changed {
                    Ok(()) if *cancel_rx.borrow() => {
                        tracing::warn!("external cancellation: marking not-yet-started tasks cancelled");
                        externally_cancelled = true;
                        abort_new = true;
                        cancel_unstarted(&graph, tasks, &started, &mut results, &mut in_degree,
                            &mut dep_failed, &mut ready, &mut finished);
                    }
                    Ok(()) => {}
                    Err(_) => cancel_open = false,
                }
            }
        }
    }

    let results: Vec<TaskResult> = results.into_iter().map(Option::unwrap).collect();
    let report = BatchReport::new(results, externally_cancelled);
    tracing::info!(
        total = report.total,
        succeeded = report.succeeded,
        failed = report.failed,
        skipped = report.skipped,
        exit_code = report.exit_code,
        "batch finished"
    );
    Ok(report)
}

/// Freeze one task's terminal state and propagate readiness to its
/// dependents. A non-succeeded terminal marks every dependent dep-failed;
/// the skip materializes once the dependent's remaining dependencies have
/// also terminated.
#[allow(clippy::too_many_arguments)]
fn record_terminal(
    graph: &TaskGraph,
    result: TaskResult,
    idx: usize,
    results: &mut [Option<TaskResult>],
    in_degree: &mut [usize],
    dep_failed: &mut [bool],
    ready: &mut VecDeque<usize>,
    finished: &mut usize,
) {
    let ok = result.state == TaskState::Succeeded;
    debug_assert!(results[idx].is_none(), "terminal state recorded twice");
    results[idx] = Some(result);
    *finished += 1;

    for &dep in &graph.dependents[idx] {
        if results[dep].is_some() {
            continue;
        }
        if !ok {
            dep_failed[dep] = true;
        }
        in_degree[dep] -= 1;
        if in_degree[dep] == 0 {
            ready.push_back(dep);
        }
    }
}

/// Mark every task that has not started (ready or still blocked) as
/// cancelled. In-flight tasks keep running until they terminate on their
/// own.
#[allow(clippy::too_many_arguments)]
fn cancel_unstarted(
    graph: &TaskGraph,
    tasks: &[TaskSpec],
    started: &[bool],
    results: &mut [Option<TaskResult>],
    in_degree: &mut [usize],
    dep_failed: &mut [bool],
    ready: &mut VecDeque<usize>,
    finished: &mut usize,
) {
    for idx in 0..tasks.len() {
        if started[idx] || results[idx].is_some() {
            continue;
        }
        // Force readiness bookkeeping through the normal path so dependents
        // of a cancelled task still settle.
        in_degree[idx] = 0;
        record_terminal(
            graph,
            TaskResult::unstarted(&tasks[idx].id, TaskState::Cancelled, "cancelled"),
            idx,
            results,
            in_degree,
            dep_failed,
            ready,
            finished,
        );
    }
    ready.clear();
}
