//! Outgoing relay events and their wire framing
//!
//! Each event becomes one self-contained frame:
//! ```text
//! data: {"type":"progress","tokens":5,"elapsed":0,"preview":"Here is"}
//!
//! data: {"content":[{"type":"text","text":"Here is a recipe"}],"done":true}
//!
//! ```
//! Failures use `data: {"error":"..."}` instead of the completion frame.

use bytes::Bytes;
use serde_json::{Value, json};

/// Event emitted by the relay to the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayEvent {
    /// Periodic progress report; not content
    Progress {
        tokens: u64,
        elapsed_secs: u64,
        preview: String,
    },
    /// Terminal: the full assembled answer
    Completion { full_text: String },
    /// Terminal: human-readable failure
    Error { message: String },
}

impl RelayEvent {
    /// Returns true for completion and error events
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completion { .. } | Self::Error { .. })
    }

    /// JSON payload as sent on the wire
    pub fn to_json(&self) -> Value {
        match self {
            Self::Progress {
                tokens,
                elapsed_secs,
                preview,
            } => json!({
                "type": "progress",
                "tokens": tokens,
                "elapsed": elapsed_secs,
                "preview": preview,
            }),
            Self::Completion { full_text } => json!({
                "content": [{"type": "text", "text": full_text}],
                "done": true,
            }),
            Self::Error { message } => json!({ "error": message }),
        }
    }

    /// Parse a wire payload back into an event
    pub fn from_json(value: &Value) -> Option<Self> {
        if let Some(message) = value.get("error") {
            return Some(Self::Error {
                message: message.as_str()?.to_string(),
            });
        }

        if value.get("done").and_then(Value::as_bool) == Some(true) {
            let full_text = value.get("content")?.get(0)?.get("text")?.as_str()?;
            return Some(Self::Completion {
                full_text: full_text.to_string(),
            });
        }

        if value.get("type").and_then(Value::as_str) == Some("progress") {
            return Some(Self::Progress {
                tokens: value.get("tokens")?.as_u64()?,
                elapsed_secs: value.get("elapsed")?.as_u64()?,
                preview: value.get("preview")?.as_str()?.to_string(),
            });
        }

        None
    }

    /// Serialize into one `data: <json>\n\n` frame
    pub fn to_frame(&self) -> Bytes {
        Bytes::from(format!("data: {}\n\n", self.to_json()))
    }

    /// Parse a full `data: <json>` frame (trailing blank line optional)
    pub fn from_frame(frame: &str) -> Option<Self> {
        let payload = frame.trim_end_matches('\n').strip_prefix("data: ")?;
        let value: Value = serde_json::from_str(payload).ok()?;
        Self::from_json(&value)
    }
}
