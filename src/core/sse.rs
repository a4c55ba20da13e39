//! Server-Sent Events plumbing.
//!
//! The server streams newline-delimited `data:` frames for both chat
//! responses and upload progress. [`SseFrames`] does the transport-level
//! buffering and frame splitting; the event enums decode each payload
//! once, at the channel boundary, into a tagged variant. Unknown event
//! types and malformed frames are logged and skipped so a single bad
//! frame never kills a live stream.

use std::time::Duration;

use serde::Deserialize;

use super::models::{ProcessingStatus, QuerySource};

/// How long stream collectors wait for a terminal event before giving up.
pub const COMPLETION_TIMEOUT: Duration = Duration::from_secs(60);

// ============================================================================
// Frame splitting
// ============================================================================

/// Incremental SSE frame parser.
///
/// Feed raw response bytes with [`push`](Self::push); complete `data:`
/// payloads come back in arrival order. Partial frames stay buffered
/// across pushes.
#[derive(Debug, Default)]
pub struct SseFrames {
    buffer: String,
}

impl SseFrames {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume a chunk of bytes, returning any completed `data:` payloads.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.push_str(&String::from_utf8_lossy(bytes));

        let mut payloads = Vec::new();
        while let Some(pos) = self.buffer.find("\n\n") {
            let frame = self.buffer[..pos].to_string();
            self.buffer.drain(..pos + 2);

            for line in frame.lines() {
                if let Some(data) = line.strip_prefix("data: ") {
                    payloads.push(data.to_string());
                }
            }
        }
        payloads
    }

    /// Drain a trailing frame after the transport closed without a final
    /// blank line.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        rest.lines()
            .find_map(|line| line.strip_prefix("data: "))
            .map(|data| data.to_string())
    }
}

// ============================================================================
// Chat stream events
// ============================================================================

/// One event on the chat message stream.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatStreamEvent {
    /// Token delta to append to the in-flight assistant message.
    Content(String),
    /// Citations for the in-flight message (replace, not append).
    Sources(Vec<QuerySource>),
    /// The message is finished; freeze and persist it.
    Complete,
    /// Server-side failure; abort the stream and surface the message.
    Error(String),
}

/// Raw chat chunk as sent by the server.
#[derive(Debug, Deserialize)]
struct ChatChunkWire {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: serde_json::Value,
}

impl ChatStreamEvent {
    /// Decode one `data:` payload. Returns `None` for unknown event types
    /// (forward compatibility) and malformed frames (logged, skipped).
    pub fn decode(payload: &str) -> Option<Self> {
        let chunk: ChatChunkWire = match serde_json::from_str(payload) {
            Ok(chunk) => chunk,
            Err(e) => {
                log::warn!("Skipping malformed chat frame: {e} ({payload:.120})");
                return None;
            }
        };

        match chunk.kind.as_str() {
            "content" => match chunk.data.as_str() {
                Some(delta) => Some(ChatStreamEvent::Content(delta.to_string())),
                None => {
                    log::warn!("Chat content frame without string data");
                    None
                }
            },
            "sources" => match serde_json::from_value::<Vec<QuerySource>>(chunk.data) {
                Ok(sources) => Some(ChatStreamEvent::Sources(sources)),
                Err(e) => {
                    log::warn!("Skipping malformed sources frame: {e}");
                    None
                }
            },
            "complete" => Some(ChatStreamEvent::Complete),
            "error" => Some(ChatStreamEvent::Error(extract_error(&chunk.data))),
            other => {
                log::debug!("Ignoring unknown chat event type {other:?}");
                None
            }
        }
    }
}

/// Error payloads arrive either as `{"error": "..."}` or a bare string.
fn extract_error(data: &serde_json::Value) -> String {
    data.get("error")
        .and_then(|v| v.as_str())
        .or_else(|| data.as_str())
        .unwrap_or("stream error")
        .to_string()
}

// ============================================================================
// Upload stream events
// ============================================================================

/// One event on the upload progress stream.
#[derive(Debug, Clone)]
pub enum UploadStreamEvent {
    /// Full status snapshot from the processing pipeline.
    Status(ProcessingStatus),
    /// Server-side failure frame.
    Error(String),
}

impl UploadStreamEvent {
    /// Decode one `data:` payload; malformed frames are logged and skipped.
    pub fn decode(payload: &str) -> Option<Self> {
        if let Ok(status) = serde_json::from_str::<ProcessingStatus>(payload) {
            return Some(UploadStreamEvent::Status(status));
        }
        match serde_json::from_str::<serde_json::Value>(payload) {
            Ok(value) if value.get("error").is_some() => {
                Some(UploadStreamEvent::Error(extract_error(&value)))
            }
            Ok(_) => {
                log::debug!("Ignoring unrecognized upload frame: {payload:.120}");
                None
            }
            Err(e) => {
                log::warn!("Skipping malformed upload frame: {e}");
                None
            }
        }
    }
}
