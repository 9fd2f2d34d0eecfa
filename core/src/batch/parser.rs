//! Batch task-config parser.
//!
//! Line-oriented grammar:
//!
//! ```text
//! ---TASK---
//! id: task1
//! workdir: /path
//! dependencies: a, b
//! ---CONTENT---
//! Task body, possibly multiple lines,
//! up to the next ---TASK--- or end of input.
//! ```

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

use super::types::{ReasoningEffort, TaskSpec};
use crate::error::ConfigError;

const TASK_MARKER: &str = "---TASK---";
const CONTENT_MARKER: &str = "---CONTENT---";

fn id_regex() -> &'static Regex {
    static ID_REGEX: OnceLock<Regex> = OnceLock::new();
    ID_REGEX.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]{1,128}$").unwrap())
}

/// Parse batch input into a task list.
///
/// Header invariants (required id, id character class, known value shapes)
/// are enforced here with the offending task index and line number; graph
/// invariants (unknown dependencies, cycles) are the scheduler's job.
pub fn parse_batch(input: &str) -> Result<Vec<TaskSpec>, ConfigError> {
    let lines: Vec<&str> = input.lines().collect();
    let mut tasks: Vec<TaskSpec> = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        if lines[i].trim() != TASK_MARKER {
            i += 1;
            continue;
        }
        i += 1;
        let task_index = tasks.len() + 1;

        let mut spec = TaskSpec::default();
        let mut id_seen = false;
        let mut saw_content_marker = false;

        // Header region.
        while i < lines.len() {
            let line_no = i + 1;
            let trimmed = lines[i].trim();
            i += 1;

            if trimmed.is_empty() {
                continue;
            }
            if trimmed == CONTENT_MARKER {
                saw_content_marker = true;
                break;
            }
            if trimmed == TASK_MARKER {
                return Err(ConfigError::MissingContentMarker { task_index });
            }

            let Some((key, value)) = trimmed.split_once(':') else {
                return Err(ConfigError::InvalidHeaderLine {
                    task_index,
                    line: line_no,
                    text: trimmed.to_string(),
                });
            };
            let key = key.trim().to_ascii_lowercase();
            let value = value.trim();

            match key.as_str() {
                "id" => {
                    if !id_regex().is_match(value) {
                        return Err(ConfigError::InvalidId {
                            task_index,
                            line: line_no,
                            id: value.to_string(),
                        });
                    }
                    spec.id = value.to_string();
                    id_seen = true;
                }
                "workdir" => spec.workdir = non_empty(value),
                "backend" => spec.backend = non_empty(value),
                "agent" => spec.agent = non_empty(value),
                "dependencies" => spec.dependencies = split_csv(value),
                "session_id" => spec.session_id = non_empty(value),
                "skills" => spec.skills = split_csv(value),
                "worktree" => {
                    spec.worktree = parse_bool(value).ok_or(ConfigError::InvalidValue {
                        task_index,
                        line: line_no,
                        key: "worktree",
                        value: value.to_string(),
                    })?;
                }
                "prompt_file" => spec.prompt_file = non_empty(value),
                "reasoning_effort" => {
                    spec.reasoning_effort =
                        Some(
                            ReasoningEffort::parse(value).ok_or(ConfigError::InvalidValue {
                                task_index,
                                line: line_no,
                                key: "reasoning_effort",
                                value: value.to_string(),
                            })?,
                        );
                }
                other => {
                    tracing::warn!(
                        task_index,
                        line = line_no,
                        key = other,
                        "discarding unknown batch header key"
                    );
                }
            }
        }

        if !saw_content_marker {
            return Err(ConfigError::MissingContentMarker { task_index });
        }
        if !id_seen {
            return Err(ConfigError::MissingId { task_index });
        }

        // Body runs to the next ---TASK--- or end of input.
        let body_start = i;
        while i < lines.len() && lines[i].trim() != TASK_MARKER {
            i += 1;
        }
        spec.prompt = lines[body_start..i].join("\n").trim().to_string();

        tasks.push(spec);
    }

    if tasks.is_empty() {
        return Err(ConfigError::NoTasks);
    }

    let mut seen: HashSet<&str> = HashSet::new();
    for t in &tasks {
        if !seen.insert(t.id.as_str()) {
            return Err(ConfigError::DuplicateId(t.id.clone()));
        }
    }

    Ok(tasks)
}

/// Reserialize tasks into canonical batch form. Parsing the output yields
/// the same task list (whitespace normalized).
pub fn to_batch_text(tasks: &[TaskSpec]) -> String {
    let mut out = String::new();
    for t in tasks {
        out.push_str(TASK_MARKER);
        out.push('\n');
        push_header(&mut out, "id", Some(&t.id));
        push_header(&mut out, "workdir", t.workdir.as_deref());
        push_header(&mut out, "backend", t.backend.as_deref());
        push_header(&mut out, "agent", t.agent.as_deref());
        if !t.dependencies.is_empty() {
            push_header(&mut out, "dependencies", Some(&t.dependencies.join(", ")));
        }
        push_header(&mut out, "session_id", t.session_id.as_deref());
        if !t.skills.is_empty() {
            push_header(&mut out, "skills", Some(&t.skills.join(", ")));
        }
        if t.worktree {
            push_header(&mut out, "worktree", Some("true"));
        }
        push_header(&mut out, "prompt_file", t.prompt_file.as_deref());
        push_header(
            &mut out,
            "reasoning_effort",
            t.reasoning_effort.map(|e| e.as_str()),
        );
        out.push_str(CONTENT_MARKER);
        out.push('\n');
        out.push_str(&t.prompt);
        out.push('\n');
    }
    out
}

fn push_header(out: &mut String, key: &str, value: Option<&str>) {
    if let Some(v) = value {
        out.push_str(key);
        out.push_str(": ");
        out.push_str(v);
        out.push('\n');
    }
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" | "" => Some(false),
        _ => None,
    }
}
