//! Inbound `POST /v1/messages` body

use serde::{Deserialize, Serialize};

use super::types::{Content, Message};

/// Anthropic Messages API request.
///
/// `max_tokens` and `temperature` are accepted for compatibility; the
/// Copilot session does not take sampling parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessagesRequest {
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<Content>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub stream: bool,
}

impl MessagesRequest {
    /// Requested model, or `default` when the request leaves it empty.
    pub fn resolved_model<'a>(&'a self, default: &'a str) -> &'a str {
        let model = self.model.trim();
        if model.is_empty() {
            default
        } else {
            model
        }
    }
}
