use serde::Serialize;
use serde_json::Value;

/// Normalized form of a backend stdout line.
///
/// Backends emit their own JSON-line dialects; the parser maps every line
/// into one of these before anything downstream sees it.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum StreamEvent {
    AgentMessage {
        text: String,
        #[serde(rename = "final")]
        is_final: bool,
    },
    ToolCall {
        payload: Value,
    },
    Session {
        id: String,
    },
    Usage {
        payload: Value,
    },
    Error {
        message: String,
    },
    /// Non-JSON line, or a JSON object the parser does not recognize.
    Text {
        raw: String,
    },
    /// A line exceeded the per-line cap and was cut down.
    Truncated {
        bytes: usize,
    },
}
