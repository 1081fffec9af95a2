//! Flattening of a Messages request into a single prompt string
//!
//! The backend session takes one prompt per turn, so the system prompt and the
//! whole conversation history are rendered as role-prefixed lines:
//!
//! ```text
//! System: <system text>
//!
//! user: <turn text>
//! assistant: <turn text>
//! ```

use super::request::MessagesRequest;

/// Render `request` as the prompt sent to the backend.
///
/// Each system text piece becomes its own `System: ...` paragraph; each turn
/// becomes one `<role>: <text>` line with its text blocks concatenated.
pub fn normalize(request: &MessagesRequest) -> String {
    let mut prompt = String::new();

    if let Some(system) = &request.system {
        for text in system.text_parts() {
            prompt.push_str("System: ");
            prompt.push_str(text);
            prompt.push_str("\n\n");
        }
    }

    for message in &request.messages {
        prompt.push_str(&message.role);
        prompt.push_str(": ");
        prompt.push_str(&message.resolved_content());
        prompt.push('\n');
    }

    prompt
}
