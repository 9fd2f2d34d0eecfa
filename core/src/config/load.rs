use std::path::PathBuf;

use super::types::{AgentConfig, EngineConfig, DEFAULT_TIMEOUT_MS};
use crate::backend::BackendKind;
use crate::error::ConfigError;

/// Default codeagent data directory: `~/.codeagent`.
pub fn data_dir() -> Option<PathBuf> {
    crate::util::home_dir().map(|h| h.join(".codeagent"))
}

/// Load the user preset file, pruning presets that name unknown backends.
///
/// A missing file is not an error; it yields the built-in defaults.
pub fn load_agent_config() -> Result<AgentConfig, ConfigError> {
    let Some(path) = data_dir().map(|d| d.join("config.json")) else {
        return Ok(AgentConfig::default());
    };
    if !path.exists() {
        return Ok(AgentConfig::default());
    }

    let raw = std::fs::read_to_string(&path)
        .map_err(|e| ConfigError::File(format!("{}: {e}", path.display())))?;
    let mut cfg: AgentConfig = serde_json::from_str(&raw)
        .map_err(|e| ConfigError::File(format!("{}: {e}", path.display())))?;

    cfg.agents.retain(|name, preset| {
        let Some(backend) = preset.backend.as_deref() else {
            return true;
        };
        if BackendKind::parse(backend).is_ok() {
            true
        } else {
            tracing::warn!(
                agent = %name,
                backend = %backend,
                "ignoring agent preset for unknown backend"
            );
            false
        }
    });

    Ok(cfg)
}

fn env_u64(key: &str) -> Option<u64> {
    let v = std::env::var(key).ok()?;
    let v = v.trim();
    if v.is_empty() {
        return None;
    }
    match v.parse::<u64>() {
        Ok(n) => Some(n),
        Err(_) => {
            tracing::warn!(var = key, value = %v, "ignoring non-numeric environment value");
            None
        }
    }
}

fn env_flag(key: &str) -> bool {
    std::env::var_os(key)
        .map(|v| !v.is_empty() && v != "0" && v.to_string_lossy() != "false")
        .unwrap_or(false)
}

impl EngineConfig {
    /// Resolve the engine configuration from `CODEAGENT_*` environment
    /// variables layered over the defaults.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        cfg.timeout_ms = env_u64("CODEAGENT_TIMEOUT").unwrap_or(DEFAULT_TIMEOUT_MS);
        if let Some(n) = env_u64("CODEAGENT_MAX_PARALLEL_WORKERS") {
            cfg.max_workers = n as usize;
        }
        cfg.fail_fast = env_flag("CODEAGENT_FAIL_FAST");
        cfg.skip_permissions = env_flag("CODEAGENT_SKIP_PERMISSIONS");

        if let Ok(dir) = std::env::var("CODEAGENT_TMPDIR") {
            if !dir.trim().is_empty() {
                cfg.tmpdir = PathBuf::from(dir);
            }
        }
        if let Ok(path) = std::env::var("CODEAGENT_WORKTREE") {
            if !path.trim().is_empty() {
                cfg.external_worktree = Some(PathBuf::from(path));
            }
        }

        cfg
    }
}
