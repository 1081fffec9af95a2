//! Non-streaming Messages API response

use serde::{Deserialize, Serialize};

/// The only stop reason this proxy reports
pub const STOP_REASON: &str = "end_turn";

/// Token counts reported to clients.
///
/// The Copilot session does not report usage, so every response carries
/// [`Usage::PLACEHOLDER`] until real token counting is wired in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl Usage {
    pub const PLACEHOLDER: Usage = Usage {
        input_tokens: 10,
        output_tokens: 10,
    };
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextContent {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
}

/// Aggregated assistant reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagesResponse {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub role: String,
    pub model: String,
    pub content: Vec<TextContent>,
    pub stop_reason: String,
    pub stop_sequence: Option<String>,
    pub usage: Usage,
}

impl MessagesResponse {
    /// Single-text-block reply
    pub fn text(id: String, model: String, text: String) -> Self {
        Self {
            id,
            kind: "message".to_string(),
            role: "assistant".to_string(),
            model,
            content: vec![TextContent {
                kind: "text".to_string(),
                text,
            }],
            stop_reason: STOP_REASON.to_string(),
            stop_sequence: None,
            usage: Usage::PLACEHOLDER,
        }
    }
}

/// Message id derived from the backend session id
pub fn message_id(session_id: &str) -> String {
    format!("msg_copilot_{}", session_id)
}
