//! Child process plumbing: spawn, stream pumps, graceful termination.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::backend::LaunchSpec;
use crate::error::TaskError;
use crate::util::RingTail;

/// Grace between SIGTERM and SIGKILL.
pub const TERM_GRACE: Duration = Duration::from_secs(5);

/// How long to wait for the pipe pumps after the child exits.
pub const DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Bytes of stdout retained for the result tail.
pub const STDOUT_CAPTURE: usize = 64 * 1024;

/// Bytes of stderr retained for the result tail.
pub const STDERR_CAPTURE: usize = 4 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineStream {
    Stdout,
    Stderr,
}

#[derive(Debug)]
pub struct LineTap {
    pub line: String,
    pub stream: LineStream,
}

#[derive(Debug)]
pub struct SpawnedChild {
    pub child: Child,
    pub line_rx: mpsc::Receiver<LineTap>,
    pub out_task: JoinHandle<Result<u64, TaskError>>,
    pub err_task: JoinHandle<Result<u64, TaskError>>,
    pub stdout_tail: Arc<RingTail>,
    pub stderr_tail: Arc<RingTail>,
    /// Keeps the prompt writer alive until it has closed the child stdin.
    _stdin_task: Option<JoinHandle<()>>,
}

/// Spawn the backend process with piped stdio. The prompt is either already
/// in argv (per the launch spec) or written to stdin here and the pipe
/// closed so the child sees EOF.
///
/// Always uses the process-spawn API directly; no shell is ever involved.
pub fn spawn(
    spec: &LaunchSpec,
    workdir: &std::path::Path,
    prompt: &str,
) -> Result<SpawnedChild, TaskError> {
    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args)
        .current_dir(workdir)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    for (k, v) in &spec.env {
        cmd.env(k, v);
    }

    if spec.prompt_in_argv {
        cmd.stdin(Stdio::null());
    } else {
        cmd.stdin(Stdio::piped());
    }

    let mut child = cmd.spawn().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            TaskError::BackendNotFound(spec.program.clone())
        } else {
            TaskError::Spawn(format!("{}: {e}", spec.program))
        }
    })?;

    let stdin_task = if !spec.prompt_in_argv {
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| TaskError::Spawn("no stdin pipe".into()))?;
        let payload = prompt.to_string();
        Some(tokio::spawn(async move {
            if let Err(e) = stdin.write_all(payload.as_bytes()).await {
                tracing::warn!(error.message = %e, "failed writing prompt to child stdin");
            }
            let _ = stdin.shutdown().await;
        }))
    } else {
        None
    };

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| TaskError::Spawn("no stdout pipe".into()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| TaskError::Spawn("no stderr pipe".into()))?;

    let stdout_tail = RingTail::new(STDOUT_CAPTURE);
    let stderr_tail = RingTail::new(STDERR_CAPTURE);

    let (line_tx, line_rx) = mpsc::channel::<LineTap>(1024);
    let out_task = pump(stdout, stdout_tail.clone(), line_tx.clone(), LineStream::Stdout);
    let err_task = pump(stderr, stderr_tail.clone(), line_tx, LineStream::Stderr);

    Ok(SpawnedChild {
        child,
        line_rx,
        out_task,
        err_task,
        stdout_tail,
        stderr_tail,
        _stdin_task: stdin_task,
    })
}

/// Read a child pipe line by line, feeding the raw bytes into the ring tail
/// and delivering each complete line over the channel. A trailing partial
/// line is delivered when the pipe hits EOF.
fn pump<R>(
    rd: R,
    ring: Arc<RingTail>,
    line_tx: mpsc::Sender<LineTap>,
    stream: LineStream,
) -> JoinHandle<Result<u64, TaskError>>
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    let label = match stream {
        LineStream::Stdout => "stdout",
        LineStream::Stderr => "stderr",
    };
    tokio::spawn(async move {
        let mut reader = BufReader::new(rd);
        let mut raw: Vec<u8> = Vec::new();
        let mut total = 0u64;

        loop {
            raw.clear();
            let n = reader
                .read_until(b'\n', &mut raw)
                .await
                .map_err(|e| TaskError::StreamIo {
                    stream: label,
                    source: e,
                })?;
            if n == 0 {
                break;
            }
            total += n as u64;
            ring.push(&raw);

            let line = String::from_utf8_lossy(strip_line_ending(&raw)).into_owned();
            if raw.last() != Some(&b'\n') && line.is_empty() {
                // EOF fragment with nothing in it.
                continue;
            }
            let _ = line_tx.send(LineTap { line, stream }).await;
        }

        Ok(total)
    })
}

fn strip_line_ending(raw: &[u8]) -> &[u8] {
    let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
    raw.strip_suffix(b"\r").unwrap_or(raw)
}

/// Ask the child to terminate. On Unix this is SIGTERM so the backend can
/// flush its output; the SIGKILL escalation is the caller's 5 s timer.
///
/// Signals go through the OS pid rather than the `Child` handle so the
/// caller can keep awaiting `wait()` while the timers fire.
pub fn request_termination(pid: Option<u32>) {
    signal_pid(pid, false);
}

/// Escalation: forcibly kill the child.
pub fn force_kill(pid: Option<u32>) {
    signal_pid(pid, true);
}

#[cfg(unix)]
fn signal_pid(pid: Option<u32>, kill: bool) {
    let Some(pid) = pid else { return };
    let sig = if kill { libc::SIGKILL } else { libc::SIGTERM };
    unsafe {
        libc::kill(pid as libc::pid_t, sig);
    }
}

#[cfg(not(unix))]
fn signal_pid(pid: Option<u32>, kill: bool) {
    // No graceful termination on this platform; kill_on_drop is the
    // backstop when the pipeline gives up on the child.
    if let Some(pid) = pid {
        tracing::warn!(pid, kill, "process signalling is unsupported on this platform");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pump_flushes_final_partial_line() {
        let (mut wr, rd) = tokio::io::duplex(1024);
        let ring = RingTail::new(1024);
        let (tx, mut rx) = mpsc::channel::<LineTap>(8);

        let task = pump(rd, ring.clone(), tx, LineStream::Stdout);
        wr.write_all(b"one\ntwo").await.unwrap();
        drop(wr);

        let first = rx.recv().await.unwrap();
        assert_eq!(first.line, "one");
        let second = rx.recv().await.unwrap();
        assert_eq!(second.line, "two");
        assert!(rx.recv().await.is_none());

        task.await.unwrap().unwrap();
        assert_eq!(ring.tail_string(), "one\ntwo");
    }

    #[tokio::test]
    async fn pump_strips_crlf() {
        let (mut wr, rd) = tokio::io::duplex(64);
        let ring = RingTail::new(64);
        let (tx, mut rx) = mpsc::channel::<LineTap>(8);
        let task = pump(rd, ring, tx, LineStream::Stderr);

        wr.write_all(b"line\r\n").await.unwrap();
        drop(wr);

        let tap = rx.recv().await.unwrap();
        assert_eq!(tap.line, "line");
        assert_eq!(tap.stream, LineStream::Stderr);
        task.await.unwrap().unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn spawn_missing_binary_reports_backend_not_found() {
        let spec = LaunchSpec {
            program: "definitely-not-a-real-backend-xyz".into(),
            args: vec![],
            env: vec![],
            prompt_in_argv: true,
        };
        let err = spawn(&spec, std::path::Path::new("."), "").unwrap_err();
        assert!(matches!(err, TaskError::BackendNotFound(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn spawn_writes_prompt_via_stdin() {
        let spec = LaunchSpec {
            program: "cat".into(),
            args: vec![],
            env: vec![],
            prompt_in_argv: false,
        };
        let mut spawned = spawn(&spec, std::path::Path::new("."), "hello stdin").unwrap();
        let status = spawned.child.wait().await.unwrap();
        assert!(status.success());

        let tap = spawned.line_rx.recv().await.unwrap();
        assert_eq!(tap.line, "hello stdin");
    }
}
