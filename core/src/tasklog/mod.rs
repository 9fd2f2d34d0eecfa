//! Per-task structured log sinks.
//!
//! Every executed task gets its own directory under
//! `{tmpdir}/codeagent/{run_id}/{task_id}/` holding the raw streams, the
//! canonical event stream, and metadata bracketing the run. The directory
//! path travels in the TaskResult so reports can point at it. Rotation and
//! cleanup are somebody else's problem.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;

use crate::stream::StreamEvent;

#[derive(Debug, Serialize)]
pub struct LogMeta {
    pub task_id: String,
    pub argv: Vec<String>,
    pub env_delta: Vec<(String, String)>,
    pub workdir: String,
    pub started_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<String>,
    /// Why the post-exit drain ended: wait-done, drain-timeout, or
    /// context-cancel.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub close_reason: Option<String>,
}

pub struct TaskLogger {
    dir: PathBuf,
    stdout: File,
    stderr: File,
    events: File,
    meta: LogMeta,
}

impl TaskLogger {
    pub async fn create(
        root: &Path,
        run_id: &str,
        task_id: &str,
        argv: Vec<String>,
        env_delta: Vec<(String, String)>,
        workdir: &Path,
    ) -> std::io::Result<Self> {
        let dir = root.join("codeagent").join(run_id).join(task_id);
        tokio::fs::create_dir_all(&dir).await?;

        let open = |name: &str| {
            let path = dir.join(name);
            async move {
                OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .await
            }
        };

        let meta = LogMeta {
            task_id: task_id.to_string(),
            argv,
            env_delta,
            workdir: workdir.display().to_string(),
            started_at: chrono::Utc::now().to_rfc3339(),
            ended_at: None,
            close_reason: None,
        };

        let logger = Self {
            stdout: open("stdout.log").await?,
            stderr: open("stderr.log").await?,
            events: open("events.jsonl").await?,
            dir,
            meta,
        };
        logger.write_meta().await?;
        Ok(logger)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn write_meta(&self) -> std::io::Result<()> {
        let json = serde_json::to_vec_pretty(&self.meta).unwrap_or_default();
        tokio::fs::write(self.dir.join("meta.json"), json).await
    }

    pub async fn stdout_line(&mut self, line: &str) {
        let _ = self.stdout.write_all(line.as_bytes()).await;
        let _ = self.stdout.write_all(b"\n").await;
    }

    pub async fn stderr_line(&mut self, line: &str) {
        let _ = self.stderr.write_all(line.as_bytes()).await;
        let _ = self.stderr.write_all(b"\n").await;
    }

    pub async fn event(&mut self, ev: &StreamEvent) {
        if let Ok(mut line) = serde_json::to_vec(ev) {
            line.push(b'\n');
            let _ = self.events.write_all(&line).await;
        }
    }

    /// Close the log: stamp the end time and drain reason, flush streams,
    /// and persist the frozen result next to them.
    pub async fn finalize<T: Serialize>(&mut self, close_reason: &str, result: &T) {
        self.meta.ended_at = Some(chrono::Utc::now().to_rfc3339());
        self.meta.close_reason = Some(close_reason.to_string());
        let _ = self.write_meta().await;

        let _ = self.stdout.flush().await;
        let _ = self.stderr.flush().await;
        let _ = self.events.flush().await;

        if let Ok(json) = serde_json::to_vec_pretty(result) {
            let _ = tokio::fs::write(self.dir.join("result.json"), json).await;
        }
    }
}
