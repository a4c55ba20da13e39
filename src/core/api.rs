//! HTTP client for the TLF document/chat service.
//!
//! Thin typed wrapper over the versioned REST surface plus the two SSE
//! channels (chat responses, upload progress). All URLs are built from
//! the server URL and the resolved base path handed in at construction;
//! nothing here reads ambient state.

use std::path::Path;

use futures_util::StreamExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;

use super::error::{ApiError, Result};
use super::models::{
    ChatSession, ChatSessionSummary, CompoundsResponse, DeliverableDocumentsResponse,
    DeliverablesResponse, DocumentInfo, DocumentSummary, ExamplesResponse, HealthResponse,
    NewChatRequest, ProcessingStatus, StudiesResponse, SystemStats, UpdateChatRequest,
};
use super::sse::{ChatStreamEvent, SseFrames, UploadStreamEvent};

/// Chunk size for the streamed multipart upload body.
const UPLOAD_CHUNK_SIZE: usize = 64 * 1024;

/// Optional filters for `GET /documents/list`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DocumentListQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_filter: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compound_filter: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub study_filter: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deliverable_filter: Option<String>,
}

/// Metadata accompanying a document upload.
#[derive(Debug, Clone)]
pub struct UploadFields {
    pub compound: String,
    pub study_id: String,
    pub deliverable: String,
    pub description: Option<String>,
}

/// Typed client for the document/chat API.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    api_root: String,
}

impl ApiClient {
    /// Build a client from the server URL and the resolved base path.
    pub fn new(server_url: &str, base_path: &str) -> Self {
        let api_root = format!("{}{}/api/v1", server_url.trim_end_matches('/'), base_path);
        log::info!("API root: {api_root}");
        Self {
            http: reqwest::Client::new(),
            api_root,
        }
    }

    /// Absolute URL for an API path (`path` starts with `/`).
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_root, path)
    }

    /// URL serving the raw document bytes, for an external viewer.
    pub fn serve_url(&self, document_id: &str) -> String {
        self.url(&format!("/documents/serve/{document_id}"))
    }

    // ── Request plumbing ────────────────────────────────────────────────

    /// Check the response status; non-2xx becomes `ApiError::Api` carrying
    /// the server's `detail` message when one is present.
    async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| {
                v.get("detail")
                    .or_else(|| v.get("message"))
                    .and_then(|d| d.as_str())
                    .map(String::from)
            })
            .unwrap_or_else(|| "server error".to_string());

        Err(ApiError::Api {
            status: status.as_u16(),
            message,
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self
            .http
            .get(self.url(path))
            .send()
            .await
            .map_err(ApiError::from_transport)?;
        Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| ApiError::Unexpected(format!("decode failed: {e}")))
    }

    async fn get_json_query<T: DeserializeOwned, Q: Serialize>(
        &self,
        path: &str,
        query: &Q,
    ) -> Result<T> {
        let response = self
            .http
            .get(self.url(path))
            .query(query)
            .send()
            .await
            .map_err(ApiError::from_transport)?;
        Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| ApiError::Unexpected(format!("decode failed: {e}")))
    }

    // ── Health ──────────────────────────────────────────────────────────

    pub async fn health(&self) -> Result<HealthResponse> {
        self.get_json("/health").await
    }

    pub async fn system_stats(&self) -> Result<SystemStats> {
        self.get_json("/health/stats").await
    }

    /// Detailed health report; shape varies with deployment, kept untyped.
    pub async fn health_detailed(&self) -> Result<serde_json::Value> {
        self.get_json("/health/detailed").await
    }

    // ── Catalog ─────────────────────────────────────────────────────────

    pub async fn compounds(&self) -> Result<CompoundsResponse> {
        self.get_json("/documents/compounds").await
    }

    pub async fn studies(&self, compound: &str) -> Result<StudiesResponse> {
        self.get_json(&format!("/documents/studies/{compound}")).await
    }

    pub async fn deliverables(&self, compound: &str, study_id: &str) -> Result<DeliverablesResponse> {
        self.get_json(&format!("/documents/deliverables/{compound}/{study_id}"))
            .await
    }

    pub async fn deliverable_documents(
        &self,
        compound: &str,
        study_id: &str,
        deliverable: &str,
    ) -> Result<DeliverableDocumentsResponse> {
        self.get_json(&format!(
            "/documents/documents/{compound}/{study_id}/{deliverable}"
        ))
        .await
    }

    /// Full hierarchical structure in one call.
    pub async fn structure(&self) -> Result<serde_json::Value> {
        self.get_json("/documents/structure").await
    }

    // ── Documents ───────────────────────────────────────────────────────

    pub async fn document_info(&self, document_id: &str) -> Result<DocumentInfo> {
        self.get_json(&format!("/documents/info/{document_id}")).await
    }

    pub async fn list_documents(&self, query: &DocumentListQuery) -> Result<Vec<DocumentInfo>> {
        self.get_json_query("/documents/list", query).await
    }

    pub async fn documents_summary(&self) -> Result<DocumentSummary> {
        self.get_json("/documents/summary").await
    }

    pub async fn delete_document(&self, document_id: &str) -> Result<()> {
        let response = self
            .http
            .delete(self.url(&format!("/documents/{document_id}")))
            .send()
            .await
            .map_err(ApiError::from_transport)?;
        Self::check(response).await?;
        Ok(())
    }

    /// Poll fallback for processing progress.
    pub async fn processing_status(&self, document_id: &str) -> Result<ProcessingStatus> {
        self.get_json(&format!("/documents/status/{document_id}")).await
    }

    /// Upload one PDF as multipart form data, streaming the file body.
    ///
    /// `on_progress` is called with (bytes sent, total bytes) as chunks go
    /// out, giving the caller byte-level upload progress.
    pub async fn upload_document<F>(
        &self,
        file_path: &Path,
        fields: &UploadFields,
        on_progress: Option<F>,
    ) -> Result<ProcessingStatus>
    where
        F: Fn(u64, u64) + Send + Sync + 'static,
    {
        let file_name = file_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| ApiError::Unexpected("upload path has no file name".to_string()))?;

        let metadata = tokio::fs::metadata(file_path)
            .await
            .map_err(|e| ApiError::Unexpected(format!("cannot read {}: {e}", file_path.display())))?;
        let total = metadata.len();

        let mut file = tokio::fs::File::open(file_path)
            .await
            .map_err(|e| ApiError::Unexpected(format!("cannot open {}: {e}", file_path.display())))?;

        // Chunked body that reports bytes sent as they are handed to the
        // transport.
        let body_stream = async_stream::stream! {
            let mut sent: u64 = 0;
            loop {
                let mut chunk = vec![0u8; UPLOAD_CHUNK_SIZE];
                match file.read(&mut chunk).await {
                    Ok(0) => break,
                    Ok(n) => {
                        chunk.truncate(n);
                        sent += n as u64;
                        if let Some(ref progress) = on_progress {
                            progress(sent, total);
                        }
                        yield Ok::<_, std::io::Error>(chunk);
                    }
                    Err(e) => {
                        yield Err(e);
                        break;
                    }
                }
            }
        };

        let part = reqwest::multipart::Part::stream_with_length(
            reqwest::Body::wrap_stream(body_stream),
            total,
        )
        .file_name(file_name)
        .mime_str("application/pdf")
        .map_err(|e| ApiError::Unexpected(e.to_string()))?;

        let mut form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("compound", fields.compound.clone())
            .text("study_id", fields.study_id.clone())
            .text("deliverable", fields.deliverable.clone());
        if let Some(description) = &fields.description {
            form = form.text("description", description.clone());
        }

        let response = self
            .http
            .post(self.url("/documents/upload"))
            .multipart(form)
            .send()
            .await
            .map_err(ApiError::from_transport)?;
        Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| ApiError::Unexpected(format!("decode failed: {e}")))
    }

    // ── Chat sessions ───────────────────────────────────────────────────

    pub async fn create_chat(&self, request: &NewChatRequest) -> Result<ChatSession> {
        let response = self
            .http
            .post(self.url("/chat/new"))
            .json(request)
            .send()
            .await
            .map_err(ApiError::from_transport)?;
        Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| ApiError::Unexpected(format!("decode failed: {e}")))
    }

    pub async fn chat_session(&self, session_id: &str) -> Result<ChatSession> {
        self.get_json(&format!("/chat/session/{session_id}")).await
    }

    pub async fn list_sessions(
        &self,
        document_id: Option<&str>,
    ) -> Result<Vec<ChatSessionSummary>> {
        let query: Vec<(&str, &str)> = document_id
            .into_iter()
            .map(|id| ("document_id", id))
            .collect();
        self.get_json_query("/chat/sessions", &query).await
    }

    pub async fn update_session(
        &self,
        session_id: &str,
        request: &UpdateChatRequest,
    ) -> Result<ChatSession> {
        let response = self
            .http
            .put(self.url(&format!("/chat/session/{session_id}")))
            .json(request)
            .send()
            .await
            .map_err(ApiError::from_transport)?;
        Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| ApiError::Unexpected(format!("decode failed: {e}")))
    }

    pub async fn delete_session(&self, session_id: &str) -> Result<()> {
        let response = self
            .http
            .delete(self.url(&format!("/chat/session/{session_id}")))
            .send()
            .await
            .map_err(ApiError::from_transport)?;
        Self::check(response).await?;
        Ok(())
    }

    /// Truncate session history on the server. Returns the session as it
    /// stands after the clear.
    pub async fn clear_history(
        &self,
        session_id: &str,
        keep_system_messages: bool,
    ) -> Result<ChatSession> {
        let response = self
            .http
            .post(self.url(&format!("/chat/session/{session_id}/clear")))
            .query(&[("keep_system_messages", keep_system_messages)])
            .send()
            .await
            .map_err(ApiError::from_transport)?;
        Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| ApiError::Unexpected(format!("decode failed: {e}")))
    }

    pub async fn chat_examples(&self) -> Result<Vec<String>> {
        let response: ExamplesResponse = self.get_json("/chat/examples").await?;
        Ok(response.examples)
    }

    // ── Streams ─────────────────────────────────────────────────────────

    /// Open the chat message stream for one send.
    ///
    /// Typed events arrive on the returned channel; a mid-stream transport
    /// failure is surfaced as a final `Error` event. Dropping the receiver
    /// cancels the reader task.
    pub async fn open_chat_stream(
        &self,
        session_id: &str,
        message: &str,
        include_context: bool,
    ) -> Result<mpsc::Receiver<ChatStreamEvent>> {
        let response = self
            .http
            .get(self.url("/chat/message-stream"))
            .query(&[
                ("session_id", session_id),
                ("message", message),
                ("include_context", if include_context { "true" } else { "false" }),
            ])
            .send()
            .await
            .map_err(ApiError::from_transport)?;
        let response = Self::check(response).await?;

        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(async move {
            let mut frames = SseFrames::new();
            let mut stream = response.bytes_stream();

            while let Some(chunk) = stream.next().await {
                match chunk {
                    Ok(bytes) => {
                        for payload in frames.push(&bytes) {
                            if let Some(event) = ChatStreamEvent::decode(&payload) {
                                let terminal = matches!(
                                    event,
                                    ChatStreamEvent::Complete | ChatStreamEvent::Error(_)
                                );
                                if tx.send(event).await.is_err() || terminal {
                                    return;
                                }
                            }
                        }
                    }
                    Err(e) => {
                        log::error!("Chat stream transport error: {e}");
                        let _ = tx
                            .send(ChatStreamEvent::Error(format!("connection lost: {e}")))
                            .await;
                        return;
                    }
                }
            }

            if let Some(payload) = frames.finish() {
                if let Some(event) = ChatStreamEvent::decode(&payload) {
                    let _ = tx.send(event).await;
                }
            }
            log::debug!("Chat stream closed");
        });

        Ok(rx)
    }

    /// Open the upload progress stream for one document.
    ///
    /// The channel closes after a terminal status frame, or early on a
    /// transport failure — callers fall back to polling when it closes
    /// before a terminal status arrived.
    pub async fn open_upload_stream(
        &self,
        document_id: &str,
    ) -> Result<mpsc::Receiver<UploadStreamEvent>> {
        let response = self
            .http
            .get(self.url(&format!("/documents/upload-stream/{document_id}")))
            .send()
            .await
            .map_err(ApiError::from_transport)?;
        let response = Self::check(response).await?;

        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(async move {
            let mut frames = SseFrames::new();
            let mut stream = response.bytes_stream();

            while let Some(chunk) = stream.next().await {
                match chunk {
                    Ok(bytes) => {
                        for payload in frames.push(&bytes) {
                            if let Some(event) = UploadStreamEvent::decode(&payload) {
                                let terminal = match &event {
                                    UploadStreamEvent::Status(s) => s.status.is_terminal(),
                                    UploadStreamEvent::Error(_) => true,
                                };
                                if tx.send(event).await.is_err() || terminal {
                                    return;
                                }
                            }
                        }
                    }
                    Err(e) => {
                        // Closing pre-terminal tells the monitor to poll.
                        log::warn!("Upload stream transport error: {e}");
                        return;
                    }
                }
            }
            log::debug!("Upload stream closed");
        });

        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_building_with_base_path() {
        let client = ApiClient::new("http://localhost:8000/", "/s/abc/p/8787");
        assert_eq!(
            client.serve_url("doc-1"),
            "http://localhost:8000/s/abc/p/8787/api/v1/documents/serve/doc-1"
        );
    }

    #[test]
    fn test_url_building_site_root() {
        let client = ApiClient::new("http://localhost:8000", "");
        assert_eq!(
            client.url("/documents/compounds"),
            "http://localhost:8000/api/v1/documents/compounds"
        );
    }
}
