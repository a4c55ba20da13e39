//! Chat session controller.
//!
//! Owns the conversation state for one document: the lazily-created
//! session, the immutable message history, and the in-flight assistant
//! message while a response is streaming. Exactly one stream may be
//! active at a time; `send_message` is a no-op while one is.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::api::ApiClient;
use super::error::{ApiError, Result};
use super::models::{ChatMessage, ChatSession, NewChatRequest, QuerySource};
use super::sse::{ChatStreamEvent, COMPLETION_TIMEOUT};

/// Assistant message being accumulated from the stream.
///
/// Content is append-only; sources are replaced wholesale when the
/// `sources` event arrives (after content, per the server protocol).
#[derive(Debug, Default)]
struct PendingAssistant {
    content: String,
    sources: Vec<QuerySource>,
}

/// What the UI should do after applying a stream event.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatUpdate {
    /// The live buffer changed; re-render the streaming tail.
    Appended,
    /// The assistant message was frozen and appended to history.
    Completed,
    /// The stream failed; surface the message and reset.
    Failed(String),
}

pub struct ChatController {
    api: ApiClient,
    session: Option<ChatSession>,
    /// Tokens of the in-flight response, for display while streaming.
    live_buffer: String,
    pending: Option<PendingAssistant>,
    stream_task: Option<JoinHandle<()>>,
}

impl ChatController {
    pub fn new(api: ApiClient) -> Self {
        Self {
            api,
            session: None,
            live_buffer: String::new(),
            pending: None,
            stream_task: None,
        }
    }

    pub fn session(&self) -> Option<&ChatSession> {
        self.session.as_ref()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        self.session.as_ref().map(|s| s.messages.as_slice()).unwrap_or(&[])
    }

    pub fn live_buffer(&self) -> &str {
        &self.live_buffer
    }

    pub fn is_streaming(&self) -> bool {
        self.pending.is_some()
    }

    /// Adopt an existing session (e.g. resumed from the session list).
    pub fn attach_session(&mut self, session: ChatSession) {
        self.cancel();
        self.session = Some(session);
    }

    /// Create a session for `document_id` on first use.
    ///
    /// Idempotent: if a session for this document already exists in
    /// memory, no request is made.
    pub async fn ensure_session(&mut self, document_id: &str) -> Result<&ChatSession> {
        let have_session = self
            .session
            .as_ref()
            .is_some_and(|s| s.document_id == document_id);

        if !have_session {
            let session = self
                .api
                .create_chat(&NewChatRequest {
                    document_id: document_id.to_string(),
                    title: None,
                })
                .await?;
            log::info!("Created chat session {} for document {document_id}", session.id);
            self.cancel();
            self.session = Some(session);
        }

        match &self.session {
            Some(session) => Ok(session),
            None => Err(ApiError::Unexpected(
                "session missing after creation".to_string(),
            )),
        }
    }

    /// Whether `send_message` would actually send.
    pub fn can_send(&self, text: &str) -> bool {
        self.session.is_some() && !self.is_streaming() && !text.trim().is_empty()
    }

    /// Send a user message and start streaming the response.
    ///
    /// Preconditions (session exists, nothing streaming, non-blank text)
    /// failing make this a no-op returning `false`. On success the user
    /// message is appended immediately and stream events are handed to
    /// `forward` as they arrive — feed them back into
    /// [`apply_event`](Self::apply_event). A failure to open the stream
    /// arrives through `forward` as an `Error` event, same as any other
    /// stream failure.
    pub fn send_message<F>(&mut self, text: &str, include_context: bool, forward: F) -> bool
    where
        F: Fn(ChatStreamEvent) + Send + 'static,
    {
        if !self.can_send(text) {
            log::debug!("send_message ignored (streaming or empty input)");
            return false;
        }
        let text = text.trim().to_string();
        let Some(session) = self.session.as_mut() else {
            return false;
        };
        let session_id = session.id.clone();

        // Optimistic append; the server echoes nothing back for it.
        session.messages.push(ChatMessage::user(text.clone()));

        self.begin_stream();
        let api = self.api.clone();
        self.stream_task = Some(tokio::spawn(async move {
            match api.open_chat_stream(&session_id, &text, include_context).await {
                Ok(rx) => forward_events(rx, forward).await,
                Err(e) => forward(ChatStreamEvent::Error(e.to_string())),
            }
        }));
        true
    }

    fn begin_stream(&mut self) {
        self.live_buffer.clear();
        self.pending = Some(PendingAssistant::default());
    }

    /// Advance the state machine with one stream event.
    ///
    /// Events arriving after a cancel (no accumulator) are dropped.
    pub fn apply_event(&mut self, event: ChatStreamEvent) -> Option<ChatUpdate> {
        let Some(pending) = self.pending.as_mut() else {
            log::debug!("Dropping stream event after cancel: {event:?}");
            return None;
        };

        match event {
            ChatStreamEvent::Content(delta) => {
                self.live_buffer.push_str(&delta);
                pending.content.push_str(&delta);
                Some(ChatUpdate::Appended)
            }
            ChatStreamEvent::Sources(sources) => {
                pending.sources = sources;
                Some(ChatUpdate::Appended)
            }
            ChatStreamEvent::Complete => {
                if let Some(done) = self.pending.take() {
                    if let Some(session) = self.session.as_mut() {
                        session
                            .messages
                            .push(ChatMessage::assistant(done.content, done.sources));
                    }
                }
                self.live_buffer.clear();
                self.stream_task = None;
                Some(ChatUpdate::Completed)
            }
            ChatStreamEvent::Error(message) => {
                log::error!("Chat stream error: {message}");
                self.pending = None;
                self.live_buffer.clear();
                self.stream_task = None;
                Some(ChatUpdate::Failed(message))
            }
        }
    }

    /// Stop the active stream and discard the partial response.
    pub fn cancel(&mut self) {
        if let Some(task) = self.stream_task.take() {
            task.abort();
            log::info!("Chat stream canceled by user");
        }
        self.pending = None;
        self.live_buffer.clear();
    }

    /// Clear history on the server, then truncate locally.
    ///
    /// With `keep_system_messages`, system/context messages survive on
    /// both sides.
    pub async fn clear_history(&mut self, keep_system_messages: bool) -> Result<()> {
        let Some(session) = self.session.as_ref() else {
            return Ok(());
        };
        self.api
            .clear_history(&session.id, keep_system_messages)
            .await?;

        self.truncate_local(keep_system_messages);
        Ok(())
    }

    /// Local half of a history clear, for callers that already made the
    /// server call themselves.
    pub fn truncate_local(&mut self, keep_system_messages: bool) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if keep_system_messages {
            session.messages.retain(|m| m.is_system());
        } else {
            session.messages.clear();
        }
    }
}

/// Forward stream events from the reader channel into the caller's sink.
async fn forward_events<F>(mut rx: mpsc::Receiver<ChatStreamEvent>, forward: F)
where
    F: Fn(ChatStreamEvent) + Send + 'static,
{
    while let Some(event) = rx.recv().await {
        forward(event);
    }
}

/// Drain a chat stream into the final assistant message.
///
/// Convenience for non-interactive callers; rejects if no terminal event
/// arrives within [`COMPLETION_TIMEOUT`].
pub async fn collect_response(mut rx: mpsc::Receiver<ChatStreamEvent>) -> Result<ChatMessage> {
    let collect = async {
        let mut pending = PendingAssistant::default();
        while let Some(event) = rx.recv().await {
            match event {
                ChatStreamEvent::Content(delta) => pending.content.push_str(&delta),
                ChatStreamEvent::Sources(sources) => pending.sources = sources,
                ChatStreamEvent::Complete => {
                    return Ok(ChatMessage::assistant(pending.content, pending.sources));
                }
                ChatStreamEvent::Error(message) => {
                    return Err(ApiError::Unexpected(format!("stream error: {message}")));
                }
            }
        }
        Err(ApiError::Unexpected("stream closed before completion".to_string()))
    };

    tokio::time::timeout(COMPLETION_TIMEOUT, collect)
        .await
        .map_err(|_| ApiError::Unexpected("timed out waiting for stream completion".to_string()))?
}
