//! Anthropic SSE frames for streamed replies
//!
//! A streamed exchange emits exactly `message_start`, one
//! `content_block_delta` per piece of assistant text, then
//! `content_block_stop`, `message_delta` and `message_stop`.

use bytes::Bytes;
use serde_json::{json, Value};

use super::response::{Usage, STOP_REASON};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamFrame {
    MessageStart { id: String, model: String },
    ContentBlockDelta { text: String },
    ContentBlockStop,
    MessageDelta,
    MessageStop,
}

impl StreamFrame {
    /// SSE event name, identical to the payload's `type`
    pub fn name(&self) -> &'static str {
        match self {
            StreamFrame::MessageStart { .. } => "message_start",
            StreamFrame::ContentBlockDelta { .. } => "content_block_delta",
            StreamFrame::ContentBlockStop => "content_block_stop",
            StreamFrame::MessageDelta => "message_delta",
            StreamFrame::MessageStop => "message_stop",
        }
    }

    pub fn payload(&self) -> Value {
        match self {
            StreamFrame::MessageStart { id, model } => json!({
                "type": self.name(),
                "message": {
                    "id": id,
                    "type": "message",
                    "role": "assistant",
                    "model": model,
                    "content": [],
                    "stop_reason": null,
                    "stop_sequence": null,
                    "usage": {"input_tokens": Usage::PLACEHOLDER.input_tokens, "output_tokens": 0}
                }
            }),
            StreamFrame::ContentBlockDelta { text } => json!({
                "type": self.name(),
                "index": 0,
                "delta": {"type": "text_delta", "text": text}
            }),
            StreamFrame::ContentBlockStop => json!({
                "type": self.name(),
                "index": 0
            }),
            StreamFrame::MessageDelta => json!({
                "type": self.name(),
                "delta": {"stop_reason": STOP_REASON, "stop_sequence": null},
                "usage": {"output_tokens": Usage::PLACEHOLDER.output_tokens}
            }),
            StreamFrame::MessageStop => json!({"type": self.name()}),
        }
    }

    /// Frames that close every stream, in order
    pub fn closing() -> [StreamFrame; 3] {
        [
            StreamFrame::ContentBlockStop,
            StreamFrame::MessageDelta,
            StreamFrame::MessageStop,
        ]
    }
}

/// Format a frame as `event: <name>\ndata: <json>\n\n`.
pub fn format_frame(frame: &StreamFrame) -> Bytes {
    Bytes::from(format!(
        "event: {}\ndata: {}\n\n",
        frame.name(),
        frame.payload()
    ))
}
