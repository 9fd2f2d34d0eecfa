//! Batch scheduler behavior with stubbed executors: dependency ordering,
//! skip propagation, concurrency bounds, fail-fast, and cancellation.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use codeagent_core::batch::TaskSpec;
use codeagent_core::error::ConfigError;
use codeagent_core::scheduler::{run_batch, BatchReport, SchedulerOpts, TaskResult, TaskState};
use tokio::sync::watch;

fn task(id: &str, deps: &[&str]) -> TaskSpec {
    let mut t = TaskSpec::new(id, format!("body of {id}"));
    t.dependencies = deps.iter().map(|s| s.to_string()).collect();
    t
}

fn done(id: &str, state: TaskState) -> TaskResult {
    let mut r = TaskResult::unstarted(id, state, "stub");
    if state == TaskState::Succeeded {
        r.error = None;
        r.agent_message = "ok".to_string();
    }
    r
}

fn no_cancel() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    // Leak the sender so the channel stays open for the whole test.
    std::mem::forget(tx);
    rx
}

async fn run_ok<F, Fut>(tasks: &[TaskSpec], opts: &SchedulerOpts, executor: F) -> BatchReport
where
    F: Fn(TaskSpec) -> Fut + Clone,
    Fut: std::future::Future<Output = TaskResult>,
{
    run_batch(tasks, opts, no_cancel(), executor)
        .await
        .expect("batch should be accepted")
}

#[tokio::test]
async fn dependency_failure_skips_transitive_dependents() {
    // S2: A fails with exit 2; B and C never run.
    let tasks = vec![task("A", &[]), task("B", &["A"]), task("C", &["B"])];
    let launched = Arc::new(Mutex::new(Vec::<String>::new()));

    let launched_c = launched.clone();
    let report = run_ok(&tasks, &SchedulerOpts::default(), move |t: TaskSpec| {
        let launched = launched_c.clone();
        async move {
            launched.lock().unwrap().push(t.id.clone());
            let mut r = done(&t.id, TaskState::Failed);
            r.exit_code = 2;
            r
        }
    })
    .await;

    assert_eq!(*launched.lock().unwrap(), vec!["A".to_string()]);
    assert_eq!(report.results[0].state, TaskState::Failed);
    assert_eq!(report.results[0].exit_code, 2);
    assert_eq!(report.results[1].state, TaskState::Skipped);
    assert_eq!(report.results[1].error.as_deref(), Some("dependency-failed"));
    assert_eq!(report.results[2].state, TaskState::Skipped);
    assert_eq!(report.exit_code, 1);
}

#[tokio::test]
async fn results_keep_submission_order() {
    // Completion order is reversed by sleep durations; the report is not.
    let tasks = vec![task("slow", &[]), task("mid", &[]), task("fast", &[])];
    let report = run_ok(&tasks, &SchedulerOpts::default(), |t: TaskSpec| async move {
        let ms = match t.id.as_str() {
            "slow" => 60,
            "mid" => 30,
            _ => 1,
        };
        tokio::time::sleep(Duration::from_millis(ms)).await;
        done(&t.id, TaskState::Succeeded)
    })
    .await;

    let ids: Vec<&str> = report.results.iter().map(|r| r.task_id.as_str()).collect();
    assert_eq!(ids, vec!["slow", "mid", "fast"]);
    assert_eq!(report.exit_code, 0);
    assert_eq!(report.succeeded, 3);
}

#[tokio::test]
async fn independent_tasks_run_in_parallel() {
    // S3: three 100 ms tasks; 3 workers finish well under 250 ms, a single
    // worker needs over 300 ms.
    let tasks = vec![task("a", &[]), task("b", &[]), task("c", &[])];
    let exec = |t: TaskSpec| async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        done(&t.id, TaskState::Succeeded)
    };

    let start = Instant::now();
    let opts = SchedulerOpts {
        max_workers: 3,
        fail_fast: false,
    };
    run_ok(&tasks, &opts, exec).await;
    assert!(
        start.elapsed() < Duration::from_millis(250),
        "parallel run took {:?}",
        start.elapsed()
    );

    let start = Instant::now();
    let opts = SchedulerOpts {
        max_workers: 1,
        fail_fast: false,
    };
    run_ok(&tasks, &opts, exec).await;
    assert!(
        start.elapsed() > Duration::from_millis(300),
        "serial run took {:?}",
        start.elapsed()
    );
}

#[tokio::test]
async fn dependencies_complete_before_dependents_start() {
    let tasks = vec![
        task("a", &[]),
        task("b", &["a"]),
        task("c", &["a"]),
        task("d", &["b", "c"]),
    ];
    let events = Arc::new(Mutex::new(Vec::<(String, &'static str)>::new()));

    let ev = events.clone();
    run_ok(&tasks, &SchedulerOpts::default(), move |t: TaskSpec| {
        let events = ev.clone();
        async move {
            events.lock().unwrap().push((t.id.clone(), "start"));
            tokio::time::sleep(Duration::from_millis(10)).await;
            events.lock().unwrap().push((t.id.clone(), "end"));
            done(&t.id, TaskState::Succeeded)
        }
    })
    .await;

    let events = events.lock().unwrap();
    let pos = |id: &str, kind: &str| {
        events
            .iter()
            .position(|(i, k)| i == id && *k == kind)
            .unwrap()
    };
    for (dep, dependent) in [("a", "b"), ("a", "c"), ("b", "d"), ("c", "d")] {
        assert!(
            pos(dep, "end") < pos(dependent, "start"),
            "{dependent} started before {dep} finished"
        );
    }
}

#[tokio::test]
async fn concurrency_never_exceeds_worker_count() {
    let tasks: Vec<TaskSpec> = (0..12).map(|i| task(&format!("t{i}"), &[])).collect();
    let current = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let (cur, pk) = (current.clone(), peak.clone());
    let opts = SchedulerOpts {
        max_workers: 3,
        fail_fast: false,
    };
    run_ok(&tasks, &opts, move |t: TaskSpec| {
        let current = cur.clone();
        let peak = pk.clone();
        async move {
            let now = current.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            current.fetch_sub(1, Ordering::SeqCst);
            done(&t.id, TaskState::Succeeded)
        }
    })
    .await;

    assert!(peak.load(Ordering::SeqCst) <= 3, "peak {}", peak.load(Ordering::SeqCst));
}

#[tokio::test]
async fn cycle_is_rejected_before_any_task_starts() {
    // S5: A <-> B.
    let tasks = vec![task("A", &["B"]), task("B", &["A"])];
    let launched = Arc::new(AtomicUsize::new(0));

    let l = launched.clone();
    let err = run_batch(&tasks, &SchedulerOpts::default(), no_cancel(), move |t| {
        let launched = l.clone();
        async move {
            launched.fetch_add(1, Ordering::SeqCst);
            done(&t.id, TaskState::Succeeded)
        }
    })
    .await
    .unwrap_err();

    let ConfigError::CircularDependency(path) = err else {
        panic!("expected cycle rejection");
    };
    assert!(path.contains(" -> "));
    assert_eq!(launched.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn duplicate_ids_rejected_before_any_task_starts() {
    let tasks = vec![task("x", &[]), task("x", &[])];
    let err = run_batch(&tasks, &SchedulerOpts::default(), no_cancel(), |t| async move {
        done(&t.id, TaskState::Succeeded)
    })
    .await
    .unwrap_err();
    assert!(matches!(err, ConfigError::DuplicateId(_)));
}

#[tokio::test]
async fn fail_fast_cancels_not_yet_started_tasks() {
    // One worker: "boom" fails while "later" is still queued.
    let tasks = vec![task("boom", &[]), task("later", &[])];
    let opts = SchedulerOpts {
        max_workers: 1,
        fail_fast: true,
    };

    let report = run_ok(&tasks, &opts, |t: TaskSpec| async move {
        if t.id == "boom" {
            tokio::time::sleep(Duration::from_millis(20)).await;
            done(&t.id, TaskState::Failed)
        } else {
            done(&t.id, TaskState::Succeeded)
        }
    })
    .await;

    assert_eq!(report.results[0].state, TaskState::Failed);
    assert_eq!(report.results[1].state, TaskState::Cancelled);
    assert_eq!(report.exit_code, 1);
}

#[tokio::test]
async fn timeout_only_batch_exits_124() {
    let tasks = vec![task("t", &[])];
    let report = run_ok(&tasks, &SchedulerOpts::default(), |t: TaskSpec| async move {
        done(&t.id, TaskState::TimedOut)
    })
    .await;
    assert_eq!(report.exit_code, 124);

    // Timeout plus a failure resolves to the smaller code.
    let tasks = vec![task("t", &[]), task("f", &[])];
    let report = run_ok(&tasks, &SchedulerOpts::default(), |t: TaskSpec| async move {
        if t.id == "t" {
            done(&t.id, TaskState::TimedOut)
        } else {
            done(&t.id, TaskState::Failed)
        }
    })
    .await;
    assert_eq!(report.exit_code, 1);
}

#[tokio::test]
async fn external_cancellation_marks_queued_tasks_and_exits_130() {
    let tasks = vec![task("running", &[]), task("queued", &[])];
    let (cancel_tx, cancel_rx) = watch::channel(false);

    let opts = SchedulerOpts {
        max_workers: 1,
        fail_fast: false,
    };

    let batch = run_batch(&tasks, &opts, cancel_rx, |t: TaskSpec| async move {
        if t.id == "running" {
            tokio::time::sleep(Duration::from_millis(80)).await;
        }
        done(&t.id, TaskState::Succeeded)
    });

    let canceller = async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel_tx.send(true).unwrap();
        // Keep the sender alive until the batch settles.
        tokio::time::sleep(Duration::from_millis(200)).await;
    };

    let (report, _) = tokio::join!(batch, canceller);
    let report = report.unwrap();

    // The in-flight task ran to completion; the queued one never started.
    assert_eq!(report.results[0].state, TaskState::Succeeded);
    assert_eq!(report.results[1].state, TaskState::Cancelled);
    assert_eq!(report.exit_code, 130);
}

#[tokio::test]
async fn unbounded_pool_still_runs_everything() {
    let tasks: Vec<TaskSpec> = (0..150).map(|i| task(&format!("t{i}"), &[])).collect();
    let report = run_ok(&tasks, &SchedulerOpts::default(), |t: TaskSpec| async move {
        done(&t.id, TaskState::Succeeded)
    })
    .await;
    assert_eq!(report.total, 150);
    assert_eq!(report.succeeded, 150);
}
