//! Anthropic Messages API surface
//!
//! Request and response types for `POST /v1/messages`, the prompt flattening
//! applied to inbound requests, and the translation of backend session events
//! into either one JSON reply or an SSE frame stream.

pub mod prompt;
pub mod request;
pub mod response;
pub mod streaming;
pub mod translate;
pub mod types;

pub use prompt::normalize;
pub use request::MessagesRequest;
pub use response::{message_id, MessagesResponse, Usage};
pub use streaming::{format_frame, StreamFrame};
pub use translate::{Exchange, ExchangeState};
pub use types::{Content, ContentBlock, Message};
