//! Wire types for the TLF document/chat API.
//!
//! Field names mirror the server's JSON exactly; the client never invents
//! state, it round-trips what the server reports. Timestamps arrive as
//! naive ISO-8601 strings (server local time), hence `NaiveDateTime`.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Document processing
// ============================================================================

/// Backend processing pipeline state for a document.
///
/// The server reports granular phases; the client mostly cares about
/// "still going" vs. terminal, exposed via [`is_terminal`](Self::is_terminal).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingState {
    Queued,
    ExtractingText,
    Chunking,
    ExtractingTlfMetadata,
    BuildingIndex,
    Completed,
    Failed,
}

impl ProcessingState {
    /// Completed or failed — no further updates will arrive.
    pub fn is_terminal(self) -> bool {
        matches!(self, ProcessingState::Completed | ProcessingState::Failed)
    }

    pub fn is_failed(self) -> bool {
        self == ProcessingState::Failed
    }

    /// Human-readable phase label for progress display.
    pub fn label(self) -> &'static str {
        match self {
            ProcessingState::Queued => "queued",
            ProcessingState::ExtractingText => "extracting text",
            ProcessingState::Chunking => "chunking",
            ProcessingState::ExtractingTlfMetadata => "extracting TLF metadata",
            ProcessingState::BuildingIndex => "building index",
            ProcessingState::Completed => "completed",
            ProcessingState::Failed => "failed",
        }
    }
}

/// Processing status snapshot, returned by upload and status endpoints
/// and streamed over the upload SSE channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingStatus {
    pub document_id: String,
    pub status: ProcessingState,
    /// Progress percentage (0-100).
    pub progress: u8,
    #[serde(default)]
    pub message: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub total_pages: Option<u32>,
    #[serde(default)]
    pub processed_pages: Option<u32>,
    #[serde(default)]
    pub total_chunks: Option<u32>,
    #[serde(default)]
    pub tlf_outputs_found: Option<u32>,
}

/// Full document record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentInfo {
    pub document_id: String,
    pub filename: String,
    #[serde(default)]
    pub compound: Option<String>,
    #[serde(default)]
    pub study_id: Option<String>,
    #[serde(default)]
    pub deliverable: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub status: ProcessingState,
    pub created_at: NaiveDateTime,
    #[serde(default)]
    pub processed_at: Option<NaiveDateTime>,
    #[serde(default)]
    pub total_pages: Option<u32>,
    #[serde(default)]
    pub total_chunks: u32,
    #[serde(default)]
    pub tlf_outputs_found: u32,
}

impl DocumentInfo {
    /// A document is chat-ready once processing completed.
    pub fn is_chat_ready(&self) -> bool {
        self.status == ProcessingState::Completed
    }
}

/// Aggregate statistics over all documents.
#[derive(Debug, Clone, Deserialize)]
pub struct DocumentSummary {
    pub total_documents: u32,
    #[serde(default)]
    pub by_status: std::collections::HashMap<String, u32>,
    #[serde(default)]
    pub total_tlf_outputs: u32,
    #[serde(default)]
    pub recent_documents: Vec<DocumentInfo>,
}

// ============================================================================
// Catalog (compound -> study -> deliverable -> document)
// ============================================================================

/// Per-compound aggregate in the catalog listing.
#[derive(Debug, Clone, Deserialize)]
pub struct CompoundSummary {
    pub compound: String,
    pub study_count: u32,
    pub deliverable_count: u32,
    pub document_count: u32,
    #[serde(default)]
    pub studies: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompoundsResponse {
    #[serde(default)]
    pub compounds: Vec<String>,
    #[serde(default)]
    pub compound_details: Vec<CompoundSummary>,
    #[serde(default)]
    pub total_compounds: u32,
}

/// Per-study aggregate under one compound.
#[derive(Debug, Clone, Deserialize)]
pub struct StudySummary {
    pub study_id: String,
    pub deliverable_count: u32,
    pub document_count: u32,
    #[serde(default)]
    pub deliverables: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StudiesResponse {
    pub compound: String,
    #[serde(default)]
    pub studies: Vec<String>,
    #[serde(default)]
    pub study_details: Vec<StudySummary>,
    #[serde(default)]
    pub total_studies: u32,
}

/// Per-deliverable aggregate under one compound/study.
#[derive(Debug, Clone, Deserialize)]
pub struct DeliverableSummary {
    pub deliverable: String,
    pub document_count: u32,
    #[serde(default)]
    pub latest_upload: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeliverablesResponse {
    pub compound: String,
    pub study_id: String,
    #[serde(default)]
    pub deliverables: Vec<String>,
    #[serde(default)]
    pub deliverable_details: Vec<DeliverableSummary>,
    #[serde(default)]
    pub total_deliverables: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeliverableDocumentsResponse {
    pub compound: String,
    pub study_id: String,
    pub deliverable: String,
    #[serde(default)]
    pub documents: Vec<DocumentInfo>,
    #[serde(default)]
    pub document_count: u32,
}

// ============================================================================
// Chat
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

/// A citation from an assistant message back into the source document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuerySource {
    #[serde(default)]
    pub output_type: Option<String>,
    #[serde(default)]
    pub output_number: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub page_number: Option<u32>,
    pub confidence: f64,
    #[serde(default)]
    pub chunk_count: u32,
}

/// One message in a chat conversation.
///
/// `content` is only ever appended to while the message is being streamed;
/// once the stream completes the message is frozen.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub role: MessageRole,
    pub content: String,
    pub timestamp: NaiveDateTime,
    #[serde(default)]
    pub sources_used: Vec<QuerySource>,
}

impl ChatMessage {
    fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            timestamp: chrono::Local::now().naive_local(),
            sources_used: Vec::new(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    pub fn assistant(content: impl Into<String>, sources: Vec<QuerySource>) -> Self {
        let mut msg = Self::new(MessageRole::Assistant, content);
        msg.sources_used = sources;
        msg
    }

    pub fn is_system(&self) -> bool {
        self.role == MessageRole::System
    }
}

/// A chat session bound to one document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: String,
    pub document_id: String,
    #[serde(default = "default_session_title")]
    pub title: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

fn default_session_title() -> String {
    "New Chat".to_string()
}

/// Summary row for session listings.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatSessionSummary {
    pub id: String,
    pub document_id: String,
    pub title: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    pub total_messages: u32,
    #[serde(default)]
    pub last_message_preview: Option<String>,
}

/// Body for `POST /chat/new`.
#[derive(Debug, Clone, Serialize)]
pub struct NewChatRequest {
    pub document_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// Body for `PUT /chat/session/{id}`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct UpdateChatRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_window: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExamplesResponse {
    #[serde(default)]
    pub examples: Vec<String>,
}

// ============================================================================
// Health
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    #[serde(default)]
    pub services: std::collections::HashMap<String, String>,
    #[serde(default)]
    pub version: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SystemStats {
    pub total_documents: u32,
    pub total_chunks: u32,
    pub total_queries: u32,
    pub average_processing_time_seconds: f64,
    pub uptime_seconds: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_processing_state_terminal() {
        assert!(ProcessingState::Completed.is_terminal());
        assert!(ProcessingState::Failed.is_terminal());
        assert!(!ProcessingState::Queued.is_terminal());
        assert!(!ProcessingState::BuildingIndex.is_terminal());
    }

    #[test]
    fn test_processing_state_wire_names() {
        let state: ProcessingState =
            serde_json::from_str("\"extracting_tlf_metadata\"").unwrap();
        assert_eq!(state, ProcessingState::ExtractingTlfMetadata);
        assert_eq!(
            serde_json::to_string(&ProcessingState::ExtractingText).unwrap(),
            "\"extracting_text\""
        );
    }

    #[test]
    fn test_processing_status_deserialize() {
        let json = r#"{
            "document_id": "abc",
            "status": "chunking",
            "progress": 42,
            "message": "Chunking document",
            "created_at": "2025-03-01T10:00:00",
            "updated_at": "2025-03-01T10:00:05.123456"
        }"#;
        let status: ProcessingStatus = serde_json::from_str(json).unwrap();
        assert_eq!(status.status, ProcessingState::Chunking);
        assert_eq!(status.progress, 42);
        assert!(status.error_message.is_none());
        assert!(status.tlf_outputs_found.is_none());
    }

    #[test]
    fn test_chat_message_constructors() {
        let user = ChatMessage::user("  hi  ");
        assert_eq!(user.role, MessageRole::User);
        assert!(user.sources_used.is_empty());

        let sources = vec![QuerySource {
            output_type: Some("table".to_string()),
            output_number: Some("14.1.1".to_string()),
            title: None,
            page_number: Some(12),
            confidence: 0.9,
            chunk_count: 3,
        }];
        let assistant = ChatMessage::assistant("answer", sources.clone());
        assert_eq!(assistant.role, MessageRole::Assistant);
        assert_eq!(assistant.sources_used, sources);
        assert!(!assistant.is_system());
    }

    #[test]
    fn test_session_default_title() {
        let json = r#"{
            "id": "s1",
            "document_id": "d1",
            "created_at": "2025-03-01T10:00:00",
            "updated_at": "2025-03-01T10:00:00"
        }"#;
        let session: ChatSession = serde_json::from_str(json).unwrap();
        assert_eq!(session.title, "New Chat");
        assert!(session.messages.is_empty());
    }
}
