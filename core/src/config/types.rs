use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// User preset file (`~/.codeagent/config.json`). Read once per process and
/// treated as immutable afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AgentConfig {
    #[serde(default = "default_backend_name")]
    pub default_backend: String,

    #[serde(default)]
    pub default_model: Option<String>,

    /// Per-backend connection overrides, keyed by backend name.
    #[serde(default)]
    pub backends: HashMap<String, BackendOverrides>,

    /// Named agent presets, keyed by preset name.
    #[serde(default)]
    pub agents: HashMap<String, AgentPreset>,
}

fn default_backend_name() -> String {
    "codex".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BackendOverrides {
    #[serde(default)]
    pub base_url: Option<String>,

    #[serde(default)]
    pub api_key: Option<String>,

    /// Extra environment variables forwarded to the child process.
    #[serde(default)]
    pub env: HashMap<String, String>,
}

/// A named bundle of defaults merged into a Task. Task fields win on
/// conflict.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AgentPreset {
    #[serde(default)]
    pub backend: Option<String>,

    #[serde(default)]
    pub model: Option<String>,

    #[serde(default)]
    pub prompt_file: Option<String>,

    #[serde(default)]
    pub reasoning_effort: Option<String>,

    #[serde(default)]
    pub skip_permissions: bool,

    #[serde(default)]
    pub allowed_tools: Vec<String>,

    #[serde(default)]
    pub disallowed_tools: Vec<String>,

    #[serde(default)]
    pub env: HashMap<String, String>,
}

/// Runtime knobs for the engine, resolved from environment variables on top
/// of built-in defaults.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Per-task wall-clock timeout in milliseconds.
    pub timeout_ms: u64,

    /// Worker-pool capacity. 0 means unbounded (internally capped at 100).
    pub max_workers: usize,

    /// Cancel not-yet-started tasks after the first terminal failure.
    pub fail_fast: bool,

    /// Pass backend bypass/yolo flags.
    pub skip_permissions: bool,

    /// Root directory for per-task logs and scratch space.
    pub tmpdir: PathBuf,

    /// Byte budget for injected skill content.
    pub skill_budget: usize,

    /// Directories a `--prompt-file` path must resolve under.
    pub prompt_file_roots: Vec<PathBuf>,

    /// Disable the prompt-file allow-list (warn instead of reject).
    pub allow_prompt_file_anywhere: bool,

    /// Externally provisioned worktree path, reused instead of created.
    pub external_worktree: Option<PathBuf>,
}

pub const DEFAULT_TIMEOUT_MS: u64 = 7_200_000;
pub const MAX_WORKER_CAP: usize = 100;
pub const DEFAULT_SKILL_BUDGET: usize = 16_000;

impl Default for EngineConfig {
    fn default() -> Self {
        let home = crate::util::home_dir().unwrap_or_else(|| PathBuf::from("."));
        Self {
            timeout_ms: DEFAULT_TIMEOUT_MS,
            max_workers: 0,
            fail_fast: false,
            skip_permissions: false,
            tmpdir: std::env::temp_dir(),
            skill_budget: DEFAULT_SKILL_BUDGET,
            prompt_file_roots: vec![
                home.join(".claude"),
                home.join(".codex"),
                home.join(".codeagent").join("agents"),
            ],
            allow_prompt_file_anywhere: false,
            external_worktree: None,
        }
    }
}

impl EngineConfig {
    /// Effective worker-pool capacity after applying the hard cap.
    pub fn worker_capacity(&self) -> usize {
        if self.max_workers == 0 {
            MAX_WORKER_CAP
        } else {
            self.max_workers.min(MAX_WORKER_CAP)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preset_file_parses_with_partial_fields() {
        let raw = r#"{
            "default_backend": "claude",
            "backends": {
                "claude": {"base_url": "https://proxy", "api_key": "k"}
            },
            "agents": {
                "reviewer": {"backend": "claude", "model": "opus", "skip_permissions": true}
            }
        }"#;
        let cfg: AgentConfig = serde_json::from_str(raw).unwrap();
        assert_eq!(cfg.default_backend, "claude");
        assert!(cfg.default_model.is_none());
        assert_eq!(
            cfg.backends["claude"].base_url.as_deref(),
            Some("https://proxy")
        );
        let preset = &cfg.agents["reviewer"];
        assert_eq!(preset.model.as_deref(), Some("opus"));
        assert!(preset.skip_permissions);
        assert!(preset.allowed_tools.is_empty());
    }

    #[test]
    fn empty_file_yields_codex_default() {
        let cfg: AgentConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.default_backend, "codex");
    }

    #[test]
    fn worker_capacity_caps_at_100() {
        let mut cfg = EngineConfig::default();
        assert_eq!(cfg.worker_capacity(), 100);
        cfg.max_workers = 4;
        assert_eq!(cfg.worker_capacity(), 4);
        cfg.max_workers = 5000;
        assert_eq!(cfg.worker_capacity(), 100);
    }
}
