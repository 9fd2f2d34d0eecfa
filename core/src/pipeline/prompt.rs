//! Final-prompt assembly: agent prompt file, skill injection, stdin
//! heuristic.

use std::path::{Path, PathBuf};

use crate::error::TaskError;

/// Characters that force the prompt through stdin instead of argv. Any of
/// these in an argv element is a shell-escaping hazard somewhere down the
/// line, even though we never spawn through a shell ourselves.
pub const STDIN_SPECIAL_CHARS: &[char] = &['\n', '\\', '"', '\'', '`', '$'];

/// Prompts longer than this go through stdin regardless of content.
pub const STDIN_LENGTH_THRESHOLD: usize = 8 * 1024;

pub fn should_use_stdin(prompt: &str, forced: bool) -> bool {
    forced || prompt.len() > STDIN_LENGTH_THRESHOLD || prompt.contains(STDIN_SPECIAL_CHARS)
}

pub fn wrap_with_agent_prompt(agent_prompt: &str, task_body: &str) -> String {
    format!("<agent-prompt>\n{agent_prompt}\n</agent-prompt>\n\n{task_body}")
}

pub fn append_skills_section(prompt: &str, skill_blocks: &str) -> String {
    if skill_blocks.is_empty() {
        return prompt.to_string();
    }
    format!("{prompt}\n\n# Domain Best Practices\n\n{skill_blocks}")
}

/// Read an agent prompt file, enforcing the allow-list of user directories.
///
/// The path gets `~` expansion and absolutization first; unless
/// `allow_anywhere` is set, both the literal path and its symlink-resolved
/// form must land under one of `roots`. Outside paths are rejected so a task
/// cannot exfiltrate arbitrary files into a backend prompt.
pub fn read_agent_prompt_file(
    raw: &str,
    roots: &[PathBuf],
    allow_anywhere: bool,
) -> Result<String, TaskError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(String::new());
    }

    let expanded = crate::util::expand_tilde(raw);
    let abs = absolutize(&expanded)?;

    if !within_any(&abs, roots) {
        if allow_anywhere {
            tracing::warn!(path = %abs.display(), "reading prompt file outside allowed dirs");
        } else {
            return Err(TaskError::Precondition(format!(
                "prompt file must be under one of: {}",
                roots
                    .iter()
                    .map(|r| r.display().to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            )));
        }
    } else if !allow_anywhere {
        // Re-check with symlinks resolved on both sides so a link inside an
        // allowed root cannot point elsewhere.
        if let Ok(resolved) = std::fs::canonicalize(&abs) {
            let resolved_roots: Vec<PathBuf> = roots
                .iter()
                .filter_map(|r| std::fs::canonicalize(r).ok())
                .collect();
            if !resolved_roots.is_empty() && !within_any(&resolved, &resolved_roots) {
                return Err(TaskError::Precondition(format!(
                    "prompt file resolves outside allowed dirs: {}",
                    resolved.display()
                )));
            }
        }
    }

    let data = std::fs::read_to_string(&abs)?;
    Ok(data.trim_end_matches(['\r', '\n']).to_string())
}

fn absolutize(path: &Path) -> Result<PathBuf, TaskError> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

fn within_any(path: &Path, roots: &[PathBuf]) -> bool {
    roots.iter().any(|r| path.starts_with(r))
}
