//! Application glue: turn parsed arguments into engine invocations and
//! render the canonical output.

use std::io::Read;
use std::sync::Arc;

use codeagent_core::api::{
    self, load_agent_config, CliError, EngineConfig, PipelineContext, SchedulerOpts, TaskSpec,
    TaskState,
};
use tokio::sync::watch;

use crate::args::{Args, Commands};

pub async fn run(args: Args) -> Result<i32, CliError> {
    let mut engine = EngineConfig::from_env();
    if args.skip_permissions {
        engine.skip_permissions = true;
    }

    let agents = load_agent_config()?;
    let ctx = Arc::new(PipelineContext {
        engine,
        agents,
        run_id: api::new_run_id(),
    });

    let (cancel_tx, cancel_rx) = watch::channel(false);
    spawn_interrupt_listener(cancel_tx);

    if args.parallel {
        if args.task.is_some() || args.workdir.is_some() || args.command.is_some() {
            return Err(CliError::Other(anyhow::anyhow!(
                "--parallel takes the task config on stdin and no positional arguments"
            )));
        }
        return run_parallel(ctx, &args, cancel_rx).await;
    }

    let (session_id, task_text, workdir) = match &args.command {
        Some(Commands::Resume {
            session_id,
            task,
            workdir,
        }) => (Some(session_id.clone()), task.clone(), workdir.clone()),
        None => (None, args.task.clone(), args.workdir.clone()),
    };

    let Some(task_text) = task_text else {
        return Err(CliError::Other(anyhow::anyhow!(
            "missing task argument (use - to read from stdin, --help for usage)"
        )));
    };

    let (prompt, from_stdin) = if task_text == "-" {
        (read_stdin()?, true)
    } else {
        (task_text, false)
    };
    if prompt.trim().is_empty() {
        return Err(CliError::Other(anyhow::anyhow!("task text is empty")));
    }

    let mut task = TaskSpec::new("main", prompt);
    task.workdir = workdir;
    task.backend = args.backend.clone();
    task.model = args.model.clone();
    task.agent = args.agent.clone();
    task.prompt_file = args.prompt_file.clone();
    task.skills = args.skills.clone();
    task.reasoning_effort = args
        .reasoning_effort
        .and_then(|e| api::ReasoningEffort::parse(e.as_str()));
    task.worktree = args.worktree;
    task.session_id = session_id;
    task.force_stdin = from_stdin;
    if args.skip_permissions {
        task.skip_permissions = Some(true);
    }

    let result = api::run_single_task(ctx, task, cancel_rx).await;
    print_single_result(&result);
    Ok(result.exit_code)
}

async fn run_parallel(
    ctx: Arc<PipelineContext>,
    args: &Args,
    cancel_rx: watch::Receiver<bool>,
) -> Result<i32, CliError> {
    let input = read_stdin()?;
    let mut tasks = api::parse_batch(&input)?;

    // CLI flags act as defaults for tasks that did not set their own.
    for task in &mut tasks {
        if task.backend.is_none() {
            task.backend = args.backend.clone();
        }
        if task.model.is_none() {
            task.model = args.model.clone();
        }
        if task.agent.is_none() {
            task.agent = args.agent.clone();
        }
        if task.skills.is_empty() {
            task.skills = args.skills.clone();
        }
        if args.worktree {
            task.worktree = true;
        }
        if args.skip_permissions {
            task.skip_permissions = Some(true);
        }
    }

    let opts = SchedulerOpts {
        max_workers: ctx.engine.max_workers,
        fail_fast: ctx.engine.fail_fast,
    };

    let report = api::run_parallel(ctx, tasks, opts, cancel_rx).await?;
    print!("{}", report.render(args.full_output));
    Ok(report.exit_code)
}

fn print_single_result(result: &api::TaskResult) {
    match result.state {
        TaskState::Succeeded => {
            println!("{}", result.agent_message);
        }
        _ => {
            if !result.agent_message.is_empty() {
                println!("{}", result.agent_message);
            }
            if let Some(err) = &result.error {
                eprintln!("error: {err}");
            }
            if let Some(dir) = &result.log_dir {
                eprintln!("log: {}", dir.display());
            }
        }
    }
    if let Some(session) = &result.session_id {
        println!("---");
        println!("SESSION_ID: {session}");
    }
}

fn read_stdin() -> Result<String, CliError> {
    let mut buf = String::new();
    std::io::stdin().read_to_string(&mut buf)?;
    Ok(buf)
}

fn spawn_interrupt_listener(tx: watch::Sender<bool>) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling tasks");
            let _ = tx.send(true);
        }
        // Keep the sender alive so receivers never observe a closed
        // channel before the signal fires.
        std::future::pending::<()>().await;
    });
}
