//! Chat session and streaming integration tests.

use serde_json::json;
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use tlfchat::core::api::ApiClient;
use tlfchat::core::chat::{collect_response, ChatController, ChatUpdate};
use tlfchat::core::models::{MessageRole, UpdateChatRequest};
use tlfchat::core::sse::ChatStreamEvent;

fn client(server: &MockServer) -> ApiClient {
    ApiClient::new(server.uri().as_str(), "")
}

fn session_json() -> serde_json::Value {
    json!({
        "id": "sess-1",
        "document_id": "doc-1",
        "title": "New Chat",
        "created_at": "2025-03-01T10:00:00",
        "updated_at": "2025-03-01T10:00:00",
        "messages": []
    })
}

/// An SSE body: each payload wrapped as a `data:` frame.
fn sse_body(payloads: &[serde_json::Value]) -> String {
    payloads
        .iter()
        .map(|p| format!("data: {p}\n\n"))
        .collect::<String>()
}

fn chunk(kind: &str, data: serde_json::Value) -> serde_json::Value {
    json!({
        "session_id": "sess-1",
        "message_id": "msg-1",
        "type": kind,
        "data": data
    })
}

// =============================================================================
// Session lifecycle
// =============================================================================

#[tokio::test]
async fn test_create_chat_posts_document_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chat/new"))
        .and(body_json(json!({"document_id": "doc-1"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(session_json()))
        .expect(1)
        .mount(&server)
        .await;

    let mut controller = ChatController::new(client(&server));
    let session = controller.ensure_session("doc-1").await.unwrap();
    assert_eq!(session.id, "sess-1");

    // Second call for the same document makes no further request; the
    // expect(1) above is verified when the server drops.
    let again = controller.ensure_session("doc-1").await.unwrap();
    assert_eq!(again.id, "sess-1");
}

#[tokio::test]
async fn test_clear_history_hits_clear_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chat/session/sess-1/clear"))
        .and(query_param("keep_system_messages", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(session_json()))
        .expect(1)
        .mount(&server)
        .await;

    let session = client(&server).clear_history("sess-1", true).await.unwrap();
    assert!(session.messages.is_empty());
}

#[tokio::test]
async fn test_controller_clear_truncates_locally_after_server_ack() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chat/new"))
        .respond_with(ResponseTemplate::new(200).set_body_json(session_json()))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chat/session/sess-1/clear"))
        .and(query_param("keep_system_messages", "false"))
        .respond_with(ResponseTemplate::new(200).set_body_json(session_json()))
        .expect(1)
        .mount(&server)
        .await;

    let mut controller = ChatController::new(client(&server));
    controller.ensure_session("doc-1").await.unwrap();
    controller.send_message("What was the dropout rate?", true, |_| {});
    controller.cancel();
    assert_eq!(controller.messages().len(), 1);

    controller.clear_history(false).await.unwrap();
    assert!(controller.messages().is_empty());
}

#[tokio::test]
async fn test_session_listing_and_fetch() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/chat/sessions"))
        .and(query_param("document_id", "doc-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "id": "sess-1",
            "document_id": "doc-1",
            "title": "New Chat",
            "created_at": "2025-03-01T10:00:00",
            "updated_at": "2025-03-01T10:05:00",
            "total_messages": 4,
            "last_message_preview": "The incidence was 12%."
        }])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/chat/session/sess-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(session_json()))
        .mount(&server)
        .await;

    let summaries = client(&server).list_sessions(Some("doc-1")).await.unwrap();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].total_messages, 4);

    let session = client(&server).chat_session(&summaries[0].id).await.unwrap();
    assert_eq!(session.document_id, "doc-1");
}

#[tokio::test]
async fn test_update_and_delete_session() {
    let server = MockServer::start().await;
    let mut renamed = session_json();
    renamed["title"] = json!("AE review");
    Mock::given(method("PUT"))
        .and(path("/api/v1/chat/session/sess-1"))
        .and(body_json(json!({"title": "AE review"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(renamed))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/api/v1/chat/session/sess-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"message": "deleted"})))
        .expect(1)
        .mount(&server)
        .await;

    let request = UpdateChatRequest {
        title: Some("AE review".to_string()),
        ..Default::default()
    };
    let session = client(&server)
        .update_session("sess-1", &request)
        .await
        .unwrap();
    assert_eq!(session.title, "AE review");

    client(&server).delete_session("sess-1").await.unwrap();
}

#[tokio::test]
async fn test_chat_examples_unwraps_envelope() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/chat/examples"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "examples": ["What was the incidence of serious adverse events?"]
        })))
        .mount(&server)
        .await;

    let examples = client(&server).chat_examples().await.unwrap();
    assert_eq!(examples.len(), 1);
}

// =============================================================================
// Streaming
// =============================================================================

#[tokio::test]
async fn test_stream_decodes_content_sources_complete() {
    let server = MockServer::start().await;
    let body = sse_body(&[
        chunk("content", json!("The incidence ")),
        chunk("content", json!("was 12%.")),
        chunk(
            "sources",
            json!([{
                "output_type": "table",
                "output_number": "14.3.1",
                "title": "Adverse Events",
                "page_number": 42,
                "confidence": 0.93,
                "chunk_count": 3
            }]),
        ),
        chunk("complete", json!(null)),
    ]);
    Mock::given(method("GET"))
        .and(path("/api/v1/chat/message-stream"))
        .and(query_param("session_id", "sess-1"))
        .and(query_param("include_context", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let rx = client(&server)
        .open_chat_stream("sess-1", "What was the AE incidence?", true)
        .await
        .unwrap();
    let message = collect_response(rx).await.unwrap();

    assert_eq!(message.role, MessageRole::Assistant);
    assert_eq!(message.content, "The incidence was 12%.");
    assert_eq!(message.sources_used.len(), 1);
    assert_eq!(message.sources_used[0].page_number, Some(42));
}

#[tokio::test]
async fn test_stream_error_frame_rejects() {
    let server = MockServer::start().await;
    let body = sse_body(&[
        chunk("content", json!("part")),
        chunk("error", json!("No index available for this document")),
    ]);
    Mock::given(method("GET"))
        .and(path("/api/v1/chat/message-stream"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let rx = client(&server)
        .open_chat_stream("sess-1", "hello", true)
        .await
        .unwrap();
    let err = collect_response(rx).await.unwrap_err();
    assert!(err.to_string().contains("No index available"));
}

#[tokio::test]
async fn test_stream_skips_malformed_and_unknown_frames() {
    let server = MockServer::start().await;
    let body = format!(
        "data: not json\n\n{}data: {}\n\n{}",
        sse_body(&[chunk("heartbeat", json!(null))]),
        chunk("content", json!("ok")),
        sse_body(&[chunk("complete", json!(null))]),
    );
    Mock::given(method("GET"))
        .and(path("/api/v1/chat/message-stream"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let rx = client(&server)
        .open_chat_stream("sess-1", "hello", false)
        .await
        .unwrap();
    let message = collect_response(rx).await.unwrap();
    assert_eq!(message.content, "ok");
}

// =============================================================================
// Controller end-to-end
// =============================================================================

#[tokio::test]
async fn test_send_message_drives_controller_to_completion() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chat/new"))
        .respond_with(ResponseTemplate::new(200).set_body_json(session_json()))
        .mount(&server)
        .await;
    let body = sse_body(&[
        chunk("content", json!("Answer.")),
        chunk("complete", json!(null)),
    ]);
    Mock::given(method("GET"))
        .and(path("/api/v1/chat/message-stream"))
        .and(query_param("message", "What is table 14.1.1?"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let mut controller = ChatController::new(client(&server));
    controller.ensure_session("doc-1").await.unwrap();

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<ChatStreamEvent>();
    let sent = controller.send_message("What is table 14.1.1?", true, move |ev| {
        let _ = tx.send(ev);
    });
    assert!(sent);
    assert!(controller.is_streaming());
    // The user message is visible immediately.
    assert_eq!(controller.messages().len(), 1);
    assert_eq!(controller.messages()[0].role, MessageRole::User);

    let mut last = None;
    let deadline = tokio::time::timeout(std::time::Duration::from_secs(5), async {
        while let Some(event) = rx.recv().await {
            last = controller.apply_event(event);
            if matches!(last, Some(ChatUpdate::Completed) | Some(ChatUpdate::Failed(_))) {
                break;
            }
        }
    });
    deadline.await.unwrap();

    assert_eq!(last, Some(ChatUpdate::Completed));
    assert_eq!(controller.messages().len(), 2);
    assert_eq!(controller.messages()[1].content, "Answer.");
    assert!(!controller.is_streaming());
}

#[tokio::test]
async fn test_send_message_open_failure_surfaces_as_error_event() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chat/new"))
        .respond_with(ResponseTemplate::new(200).set_body_json(session_json()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/chat/message-stream"))
        .respond_with(
            ResponseTemplate::new(500).set_body_json(json!({"detail": "index unavailable"})),
        )
        .mount(&server)
        .await;

    let mut controller = ChatController::new(client(&server));
    controller.ensure_session("doc-1").await.unwrap();

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<ChatStreamEvent>();
    assert!(controller.send_message("hello", true, move |ev| {
        let _ = tx.send(ev);
    }));

    let event = tokio::time::timeout(std::time::Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    let update = controller.apply_event(event);
    match update {
        Some(ChatUpdate::Failed(message)) => assert!(message.contains("index unavailable")),
        other => panic!("expected Failed, got {other:?}"),
    }
    // The optimistic user message stays; the partial answer is gone.
    assert_eq!(controller.messages().len(), 1);
    assert!(controller.live_buffer().is_empty());
}
