//! Version-control worktree provisioning.
//!
//! A task that asks for isolation gets its own worktree under `.worktrees/`
//! on a dedicated branch. Destruction is deliberately not exposed: leftover
//! worktrees are the invoking workflow's to clean up.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;

use crate::error::WorktreeError;

/// Handle for a provisioned (or reused) working tree.
#[derive(Debug, Clone)]
pub struct WorktreeHandle {
    pub task_id: String,
    pub path: PathBuf,
    pub branch: String,
    /// Supplied externally rather than created here.
    pub reused: bool,
}

const WORKTREE_DIR: &str = ".worktrees";

struct GitOutput {
    stdout: String,
    stderr: String,
    success: bool,
}

async fn git(repo: &Path, args: &[&str]) -> Result<GitOutput, WorktreeError> {
    tracing::debug!(?args, repo = %repo.display(), "running git");
    let output = Command::new("git")
        .args(args)
        .current_dir(repo)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    Ok(GitOutput {
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        success: output.status.success(),
    })
}

async fn git_checked(repo: &Path, args: &[&str]) -> Result<String, WorktreeError> {
    let out = git(repo, args).await?;
    if !out.success {
        return Err(WorktreeError::git_failed(format!(
            "git {} failed: {}",
            args.join(" "),
            out.stderr.trim()
        )));
    }
    Ok(out.stdout)
}

async fn is_repository(path: &Path) -> Result<bool, WorktreeError> {
    Ok(git(path, &["rev-parse", "--git-dir"]).await?.success)
}

async fn branch_exists(repo: &Path, branch: &str) -> Result<bool, WorktreeError> {
    Ok(git(
        repo,
        &["rev-parse", "--verify", &format!("refs/heads/{branch}")],
    )
    .await?
    .success)
}

/// Create a fresh worktree for `task_id` at `.worktrees/do-{task_id}` on a
/// new branch `do/{task_id}`, rooted in the repository containing `repo_dir`.
pub async fn provision(repo_dir: &Path, task_id: &str) -> Result<WorktreeHandle, WorktreeError> {
    if !is_repository(repo_dir).await? {
        return Err(WorktreeError::NotARepository {
            path: repo_dir.to_path_buf(),
        });
    }

    let root = git_checked(repo_dir, &["rev-parse", "--show-toplevel"]).await?;
    let root = PathBuf::from(root.trim());

    let branch = format!("do/{task_id}");
    if branch_exists(&root, &branch).await? {
        return Err(WorktreeError::BranchExists { branch });
    }

    let dir = root.join(WORKTREE_DIR);
    tokio::fs::create_dir_all(&dir).await?;
    let path = dir.join(format!("do-{task_id}"));

    tracing::info!(task_id, branch = %branch, path = %path.display(), "provisioning worktree");
    git_checked(
        &root,
        &[
            "worktree",
            "add",
            "-b",
            &branch,
            path.to_str().ok_or_else(|| {
                WorktreeError::git_failed("worktree path is not valid unicode")
            })?,
        ],
    )
    .await?;

    Ok(WorktreeHandle {
        task_id: task_id.to_string(),
        path: tokio::fs::canonicalize(&path).await.unwrap_or(path),
        branch,
        reused: false,
    })
}

/// Validate an externally supplied worktree path and wrap it in a handle.
/// The path must exist and be a working tree of the surrounding repository.
pub async fn reuse(path: &Path, task_id: &str) -> Result<WorktreeHandle, WorktreeError> {
    if !path.is_dir() {
        return Err(WorktreeError::NotAWorktree {
            path: path.to_path_buf(),
        });
    }
    if !is_repository(path).await? {
        return Err(WorktreeError::NotAWorktree {
            path: path.to_path_buf(),
        });
    }

    let listed = git_checked(path, &["worktree", "list", "--porcelain"]).await?;
    let canonical = tokio::fs::canonicalize(path).await?;
    let known = listed
        .lines()
        .filter_map(|l| l.strip_prefix("worktree "))
        .any(|p| Path::new(p) == canonical);
    if !known {
        return Err(WorktreeError::NotAWorktree {
            path: path.to_path_buf(),
        });
    }

    let branch = git_checked(path, &["rev-parse", "--abbrev-ref", "HEAD"])
        .await
        .map(|s| s.trim().to_string())
        .unwrap_or_default();

    tracing::info!(task_id, path = %canonical.display(), "reusing external worktree");
    Ok(WorktreeHandle {
        task_id: task_id.to_string(),
        path: canonical,
        branch,
        reused: true,
    })
}
