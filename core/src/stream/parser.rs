//! Line-oriented decoding of backend stdout into canonical events.
//!
//! Intentionally best-effort: unrecognized JSON objects become opaque text
//! events, malformed lines are logged and skipped, and nothing here is fatal
//! to the task.

use serde_json::Value;

use super::event::StreamEvent;
use crate::backend::BackendKind;

/// Hard cap on a single stdout line. Anything longer is cut down and flagged
/// with a `Truncated` event.
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

pub struct StreamParser {
    backend: BackendKind,
    fragments: Vec<String>,
    final_message: Option<String>,
    session_id: Option<String>,
}

impl StreamParser {
    pub fn new(backend: BackendKind) -> Self {
        Self {
            backend,
            fragments: Vec::new(),
            final_message: None,
            session_id: None,
        }
    }

    /// Session id reported by the backend, if any line carried one.
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// The final agent message: the last event marked final, or the
    /// accumulated text fragments when none was.
    pub fn final_agent_message(&self) -> String {
        if let Some(msg) = &self.final_message {
            return msg.clone();
        }
        self.fragments.join("")
    }

    pub fn parse_line(&mut self, line: &str) -> Vec<StreamEvent> {
        let mut out = Vec::new();
        let mut line = line;

        if line.len() > MAX_LINE_BYTES {
            tracing::warn!(
                bytes = line.len(),
                backend = %self.backend,
                "stdout line exceeds cap, truncating"
            );
            out.push(StreamEvent::Truncated { bytes: line.len() });
            let mut end = MAX_LINE_BYTES;
            while end > 0 && !line.is_char_boundary(end) {
                end -= 1;
            }
            line = &line[..end];
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            return out;
        }

        if !(trimmed.starts_with('{') && trimmed.ends_with('}')) {
            out.push(StreamEvent::Text {
                raw: trimmed.to_string(),
            });
            return out;
        }

        let value: Value = match serde_json::from_str(trimmed) {
            Ok(v) => v,
            Err(e) => {
                tracing::debug!(
                    error.kind = "stream.parse_failed",
                    error.message = %e,
                    line = %preview(trimmed),
                    "skipping malformed json line"
                );
                return out;
            }
        };

        out.extend(self.map_value(&value, trimmed));
        for ev in &out {
            self.observe(ev);
        }
        out
    }

    fn observe(&mut self, ev: &StreamEvent) {
        match ev {
            StreamEvent::AgentMessage { text, is_final } => {
                if *is_final {
                    self.final_message = Some(text.clone());
                } else {
                    self.fragments.push(text.clone());
                }
            }
            StreamEvent::Session { id } => {
                self.session_id = Some(id.clone());
            }
            _ => {}
        }
    }

    fn map_value(&self, v: &Value, raw: &str) -> Vec<StreamEvent> {
        let ty = v.get("type").and_then(Value::as_str).unwrap_or("");

        // Canonical shape shared by the codex/opencode dialects.
        if ty == "agent_message" {
            if let Some(text) = v.get("text").and_then(Value::as_str) {
                let is_final = v.get("final").and_then(Value::as_bool).unwrap_or(false);
                return vec![StreamEvent::AgentMessage {
                    text: text.to_string(),
                    is_final,
                }];
            }
        }

        // Codex item stream: item.completed carrying an agent_message item.
        if ty == "item.completed" || ty == "item.started" {
            if let Some(item) = v.get("item") {
                let item_ty = item.get("type").and_then(Value::as_str).unwrap_or("");
                if item_ty == "agent_message" {
                    if let Some(text) = item.get("text").and_then(Value::as_str) {
                        return vec![StreamEvent::AgentMessage {
                            text: text.to_string(),
                            is_final: ty == "item.completed",
                        }];
                    }
                }
                if item_ty.contains("tool") || item_ty == "command_execution" {
                    return vec![StreamEvent::ToolCall { payload: v.clone() }];
                }
            }
        }

        // Claude stream-json: assistant messages carry content items.
        if ty == "assistant" {
            if let Some(items) = v
                .get("message")
                .and_then(|m| m.get("content"))
                .and_then(Value::as_array)
            {
                let mut events = Vec::new();
                for item in items {
                    match item.get("type").and_then(Value::as_str).unwrap_or("") {
                        "text" | "output_text" => {
                            if let Some(t) = item.get("text").and_then(Value::as_str) {
                                if !t.is_empty() {
                                    events.push(StreamEvent::AgentMessage {
                                        text: t.to_string(),
                                        is_final: false,
                                    });
                                }
                            }
                        }
                        "tool_use" => {
                            events.push(StreamEvent::ToolCall {
                                payload: item.clone(),
                            });
                        }
                        _ => {}
                    }
                }
                if !events.is_empty() {
                    return events;
                }
            }
        }

        // Claude terminal result: final message plus the session id.
        if ty == "result" {
            let mut events = Vec::new();
            if let Some(id) = v.get("session_id").and_then(Value::as_str) {
                events.push(StreamEvent::Session { id: id.to_string() });
            }
            if let Some(text) = v.get("result").and_then(Value::as_str) {
                events.push(StreamEvent::AgentMessage {
                    text: text.to_string(),
                    is_final: true,
                });
            }
            if !events.is_empty() {
                return events;
            }
        }

        // Session announcements in the various dialects.
        if ty == "session" || ty == "session.created" || ty == "system" {
            if let Some(id) = v
                .get("session_id")
                .or_else(|| v.get("id"))
                .and_then(Value::as_str)
            {
                return vec![StreamEvent::Session { id: id.to_string() }];
            }
        }
        if ty.is_empty() {
            if let Some(id) = v.get("session_id").and_then(Value::as_str) {
                return vec![StreamEvent::Session { id: id.to_string() }];
            }
        }

        if ty == "tool_call" || ty == "tool_use" || ty == "tool.request" || ty == "tool.result" {
            return vec![StreamEvent::ToolCall { payload: v.clone() }];
        }

        if ty == "usage" || (ty.is_empty() && v.get("usage").is_some()) {
            return vec![StreamEvent::Usage { payload: v.clone() }];
        }

        if ty == "error" {
            let message = v
                .get("message")
                .or_else(|| v.get("error"))
                .and_then(Value::as_str)
                .unwrap_or("unknown backend error")
                .to_string();
            return vec![StreamEvent::Error { message }];
        }

        vec![StreamEvent::Text {
            raw: raw.to_string(),
        }]
    }
}

fn preview(s: &str) -> String {
    const MAX: usize = 160;
    if s.len() <= MAX {
        return s.to_string();
    }
    let end = s
        .char_indices()
        .take_while(|(i, _)| *i < MAX)
        .last()
        .map(|(i, c)| i + c.len_utf8())
        .unwrap_or(0);
    format!("{}...", &s[..end])
}
