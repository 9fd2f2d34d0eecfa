use clap::{Parser, Subcommand, ValueEnum};

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum EffortArg {
    Low,
    Medium,
    High,
}

impl EffortArg {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// codeagent - unified wrapper for AI coding backends.
///
/// Single task: `codeagent [flags] <task-or-dash> [workdir]`; a literal `-`
/// reads the task from stdin. Parallel: `codeagent --parallel` with the
/// batch config on stdin.
#[derive(Parser, Debug, Clone)]
#[command(name = "codeagent", version, about, after_help = EXIT_CODES_HELP)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Backend to run the task with.
    #[arg(long, value_parser = ["codex", "claude", "gemini", "opencode"])]
    pub backend: Option<String>,

    /// Model name passed through to the backend.
    #[arg(long)]
    pub model: Option<String>,

    /// Agent preset name from ~/.codeagent/config.json.
    #[arg(long)]
    pub agent: Option<String>,

    /// Prompt file wrapped around the task (must live under an allowed
    /// config directory).
    #[arg(long)]
    pub prompt_file: Option<String>,

    /// Skills to inject, comma-separated. Auto-detected from the working
    /// directory when omitted.
    #[arg(long, value_delimiter = ',')]
    pub skills: Vec<String>,

    #[arg(long, value_enum)]
    pub reasoning_effort: Option<EffortArg>,

    /// Pass the backend's permission-bypass flags.
    #[arg(long)]
    pub skip_permissions: bool,

    /// Run the task in an isolated git worktree.
    #[arg(long)]
    pub worktree: bool,

    /// Parallel mode: read the batch task config from stdin.
    #[arg(long)]
    pub parallel: bool,

    /// Include full agent output in the parallel report.
    #[arg(long)]
    pub full_output: bool,

    /// The task text, or `-` to read it from stdin.
    pub task: Option<String>,

    /// Working directory for the task.
    pub workdir: Option<String>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Resume a prior backend conversation.
    Resume {
        /// Session id reported by a previous run.
        session_id: String,
        /// The task text, or `-` to read it from stdin.
        task: Option<String>,
        /// Working directory for the task.
        workdir: Option<String>,
    },
}

const EXIT_CODES_HELP: &str = "\
Environment:
    CODEAGENT_TIMEOUT               Per-task timeout in ms (default 7200000)
    CODEAGENT_MAX_PARALLEL_WORKERS  0 = unbounded (capped at 100)
    CODEAGENT_SKIP_PERMISSIONS      Pass backend bypass flags
    CODEAGENT_TMPDIR                Log/temp directory override
    CODEAGENT_WORKTREE              Reuse an externally provisioned worktree

Exit codes:
    0    success
    1    general failure (bad config, empty output)
    124  timeout
    127  backend executable not found
    130  interrupted
    *    passthrough from the backend process";
