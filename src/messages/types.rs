//! Content types shared by inbound messages and the system prompt

use serde::{Deserialize, Serialize};

/// Message or system content: either a bare string or a list of blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

/// One typed content block. Only `text` blocks carry prompt text; other
/// block kinds (images, tool results, ...) are accepted and ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: "text".to_string(),
            text: Some(text.into()),
        }
    }

    /// The block's text if it is a `text` block
    pub fn as_text(&self) -> Option<&str> {
        if self.kind == "text" {
            self.text.as_deref()
        } else {
            None
        }
    }
}

impl Content {
    /// Text of each `text` piece, in order. A bare string is one piece.
    pub fn text_parts(&self) -> Vec<&str> {
        match self {
            Content::Text(text) => vec![text.as_str()],
            Content::Blocks(blocks) => blocks.iter().filter_map(ContentBlock::as_text).collect(),
        }
    }

    /// All text pieces joined with no separator.
    pub fn resolve_text(&self) -> String {
        self.text_parts().concat()
    }
}

impl From<&str> for Content {
    fn from(text: &str) -> Self {
        Content::Text(text.to_string())
    }
}

/// One conversation turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    /// Missing or `null` content renders as an empty turn
    #[serde(default)]
    pub content: Option<Content>,
}

impl Message {
    pub fn new(role: impl Into<String>, content: impl Into<Content>) -> Self {
        Self {
            role: role.into(),
            content: Some(content.into()),
        }
    }

    pub fn resolved_content(&self) -> String {
        self.content
            .as_ref()
            .map(Content::resolve_text)
            .unwrap_or_default()
    }
}
