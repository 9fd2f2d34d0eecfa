//! Backend adapter layer.
//!
//! Each supported backend is one variant of [`BackendKind`]; resolution,
//! argv/env assembly and stderr filtering all dispatch on the variant. There
//! is deliberately no open registration: a new backend is a new variant.

mod claude;
mod codex;
mod gemini;
mod opencode;

use std::fmt;

use crate::batch::TaskSpec;
use crate::config::BackendOverrides;
use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Codex,
    Claude,
    Gemini,
    Opencode,
}

impl BackendKind {
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        match s.to_ascii_lowercase().as_str() {
            "codex" => Ok(Self::Codex),
            "claude" => Ok(Self::Claude),
            "gemini" => Ok(Self::Gemini),
            "opencode" => Ok(Self::Opencode),
            other => Err(ConfigError::UnknownBackend(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Codex => "codex",
            Self::Claude => "claude",
            Self::Gemini => "gemini",
            Self::Opencode => "opencode",
        }
    }

    /// Executable looked up on PATH.
    pub fn command(&self) -> &'static str {
        self.as_str()
    }

    /// Substring denylist applied to child stderr before recording. The
    /// defaults only cover well-known interpreter noise; callers may replace
    /// the list wholesale.
    pub fn stderr_filters(&self) -> &'static [&'static str] {
        match self {
            Self::Claude | Self::Opencode => {
                &["ExperimentalWarning", "DeprecationWarning", "punycode"]
            }
            Self::Gemini => &["DeprecationWarning", "[dotenv"],
            Self::Codex => &[],
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The argv/env/parser triple handed to the process layer.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Environment deltas layered over the inherited environment.
    pub env: Vec<(String, String)>,
    /// True when the final prompt was appended as the last argv element;
    /// false when the child must read it from stdin.
    pub prompt_in_argv: bool,
}

/// Assemble the launch plan for a task.
///
/// `skip_permissions` is tri-state: `None` means the caller expressed no
/// preference, which codex treats as bypass-on (its documented default) and
/// every other backend treats as prompts-on.
pub fn assemble(
    kind: BackendKind,
    task: &TaskSpec,
    overrides: Option<&BackendOverrides>,
    skip_permissions: Option<bool>,
    prompt: &str,
    prompt_via_stdin: bool,
) -> LaunchSpec {
    let mut spec = match kind {
        BackendKind::Codex => codex::assemble(task, skip_permissions),
        BackendKind::Claude => claude::assemble(task, overrides, skip_permissions),
        BackendKind::Gemini => gemini::assemble(task, skip_permissions),
        BackendKind::Opencode => opencode::assemble(task),
    };

    if let Some(ovr) = overrides {
        for (k, v) in &ovr.env {
            spec.env.push((k.clone(), v.clone()));
        }
    }

    if prompt_via_stdin {
        if kind == BackendKind::Codex {
            // Codex takes an explicit "-" to read the prompt from stdin.
            spec.args.push("-".to_string());
        }
        spec.prompt_in_argv = false;
    } else {
        spec.args.push(prompt.to_string());
        spec.prompt_in_argv = true;
    }

    spec
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_backend_is_invalid_config() {
        assert!(matches!(
            BackendKind::parse("cursor"),
            Err(ConfigError::UnknownBackend(name)) if name == "cursor"
        ));
    }

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!(BackendKind::parse("Claude").unwrap(), BackendKind::Claude);
        assert_eq!(BackendKind::parse("CODEX").unwrap(), BackendKind::Codex);
    }

    #[test]
    fn prompt_lands_in_argv_when_safe() {
        let task = TaskSpec::new("t", "hello");
        let spec = assemble(BackendKind::Codex, &task, None, None, "hello", false);
        assert!(spec.prompt_in_argv);
        assert_eq!(spec.args.last().map(String::as_str), Some("hello"));
    }

    #[test]
    fn codex_stdin_mode_appends_dash() {
        let task = TaskSpec::new("t", "multi\nline");
        let spec = assemble(BackendKind::Codex, &task, None, None, "multi\nline", true);
        assert!(!spec.prompt_in_argv);
        assert_eq!(spec.args.last().map(String::as_str), Some("-"));
    }
}
