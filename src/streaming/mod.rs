//! Line framing for the upstream SSE body
//!
//! The Copilot chat endpoint answers with OpenAI-style server-sent events.
//! Byte chunks from the HTTP body rarely align with line boundaries, so they
//! pass through [`SseLineBuffer`] before [`parse_data_line`] classifies them.

/// Payload marker that ends an OpenAI-style stream
pub const DONE_MARKER: &str = "[DONE]";

/// Buffer for accumulating incomplete SSE lines across chunk boundaries.
///
/// # Example
/// ```
/// use copilot_proxy::streaming::SseLineBuffer;
///
/// let mut buffer = SseLineBuffer::new();
///
/// assert!(buffer.feed(b"data: {\"content\":\"hel").is_empty());
///
/// let lines = buffer.feed(b"lo\"}\r\n");
/// assert_eq!(lines, vec!["data: {\"content\":\"hello\"}"]);
/// ```
#[derive(Debug, Default)]
pub struct SseLineBuffer {
    incomplete: String,
}

impl SseLineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a body chunk and return the lines it completed.
    ///
    /// Line terminators (`\n` or `\r\n`) are stripped and blank separator
    /// lines are skipped. Invalid UTF-8 is replaced rather than rejected.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        self.incomplete.push_str(&String::from_utf8_lossy(bytes));

        let mut lines = Vec::new();
        while let Some(newline_pos) = self.incomplete.find('\n') {
            let line: String = self.incomplete.drain(..=newline_pos).collect();
            let line = line.trim_end_matches(['\n', '\r']);
            if !line.is_empty() {
                lines.push(line.to_string());
            }
        }
        lines
    }

    /// Take whatever is left once the body has ended.
    ///
    /// A server that closes without a final newline still delivered a line.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.incomplete);
        let rest = rest.trim_end_matches('\r');
        (!rest.is_empty()).then(|| rest.to_string())
    }

    pub fn has_incomplete(&self) -> bool {
        !self.incomplete.is_empty()
    }
}

/// Classification of one SSE line
#[derive(Debug, PartialEq, Eq)]
pub enum SseLine<'a> {
    /// `data: [DONE]`
    Done,
    /// `data: <payload>`
    Data(&'a str),
    /// Comments, `event:`/`id:`/`retry:` fields
    Other,
}

/// Classify a complete SSE line.
pub fn parse_data_line(line: &str) -> SseLine<'_> {
    match line.strip_prefix("data:") {
        Some(payload) => {
            let payload = payload.trim();
            if payload == DONE_MARKER {
                SseLine::Done
            } else {
                SseLine::Data(payload)
            }
        }
        None => SseLine::Other,
    }
}
