//! Incremental decoder for the `text/event-stream` body of a streamed
//! completion.
//!
//! Network chunks may split a line, or a multi-byte character, anywhere. The
//! decoder keeps raw bytes until a full line is available and only then
//! decodes it.

use crate::api::ChatCompletionChunk;

/// What a single complete line contributed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    /// A non-empty content delta.
    Token(String),
    /// The terminating `data: [DONE]` sentinel.
    Done,
    /// An error object sent in place of a chunk.
    Error(String),
}

#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a network chunk and returns the events of every line it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.buffer[start..].iter().position(|b| *b == b'\n') {
            let end = start + offset;
            let line = String::from_utf8_lossy(&self.buffer[start..end]);
            if let Some(event) = parse_line(&line) {
                events.push(event);
            }
            start = end + 1;
        }
        self.buffer.drain(..start);
        events
    }

    /// Processes a trailing line left without a newline at end of body.
    pub fn finish(&mut self) -> Option<SseEvent> {
        let rest = std::mem::take(&mut self.buffer);
        parse_line(&String::from_utf8_lossy(&rest))
    }
}

fn parse_line(line: &str) -> Option<SseEvent> {
    let line = line.trim_end_matches('\r');
    let payload = line.strip_prefix("data:")?.trim();
    if payload.is_empty() {
        return None;
    }
    if payload == "[DONE]" {
        return Some(SseEvent::Done);
    }

    match serde_json::from_str::<ChatCompletionChunk>(payload) {
        Ok(chunk) => {
            if let Some(err) = chunk.error {
                return Some(SseEvent::Error(err.message));
            }
            let text: String = chunk
                .choices
                .into_iter()
                .filter_map(|c| c.delta.content)
                .collect();
            (!text.is_empty()).then_some(SseEvent::Token(text))
        }
        Err(e) => {
            tracing::warn!(error = %e, "skipping unparseable stream line");
            None
        }
    }
}
