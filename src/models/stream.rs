use serde_json::json;

pub const DONE_SENTINEL: &str = "[DONE]";

/// One item of a relayed analysis. `Done` and `Error` are terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamChunk {
    Content(String),
    Done,
    Error(String),
}

impl StreamChunk {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StreamChunk::Content(_))
    }

    /// Payload of the `data:` line carrying this chunk.
    pub fn to_event_data(&self) -> String {
        match self {
            StreamChunk::Content(text) => json!({ "content": text }).to_string(),
            StreamChunk::Done => DONE_SENTINEL.to_string(),
            StreamChunk::Error(message) => json!({ "error": message }).to_string(),
        }
    }
}
