//! REST client integration tests against a mock server.

use serde_json::json;
use tempfile::Builder;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use tlfchat::core::api::{ApiClient, DocumentListQuery, UploadFields};
use tlfchat::core::error::ApiError;
use tlfchat::core::models::ProcessingState;

fn client(server: &MockServer) -> ApiClient {
    ApiClient::new(server.uri().as_str(), "")
}

fn status_json(state: &str, progress: u8) -> serde_json::Value {
    json!({
        "document_id": "doc-1",
        "status": state,
        "progress": progress,
        "created_at": "2025-03-01T10:00:00",
        "updated_at": "2025-03-01T10:00:05"
    })
}

// =============================================================================
// Error taxonomy
// =============================================================================

#[tokio::test]
async fn test_api_error_carries_detail_message() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/documents/info/missing"))
        .respond_with(
            ResponseTemplate::new(404).set_body_json(json!({"detail": "Document not found"})),
        )
        .mount(&server)
        .await;

    let err = client(&server).document_info("missing").await.unwrap_err();
    match err {
        ApiError::Api { status, message } => {
            assert_eq!(status, 404);
            assert_eq!(message, "Document not found");
        }
        other => panic!("expected Api error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_api_error_without_body_uses_generic_message() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/health"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let err = client(&server).health().await.unwrap_err();
    assert!(err.to_string().contains("server error"));
    assert!(err.is_status(500));
}

#[tokio::test]
async fn test_unreachable_server_is_no_response() {
    // Nothing listens on this port.
    let client = ApiClient::new("http://127.0.0.1:9", "");
    let err = client.health().await.unwrap_err();
    assert!(matches!(err, ApiError::NoResponse(_)));
}

// =============================================================================
// Catalog and documents
// =============================================================================

#[tokio::test]
async fn test_base_path_prefixes_every_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/s/user/p/4242/api/v1/documents/compounds"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "compounds": ["AB-123"],
            "compound_details": [],
            "total_compounds": 1
        })))
        .mount(&server)
        .await;

    let client = ApiClient::new(server.uri().as_str(), "/s/user/p/4242");
    let response = client.compounds().await.unwrap();
    assert_eq!(response.compounds, vec!["AB-123"]);
}

#[tokio::test]
async fn test_deliverable_documents_path() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/documents/documents/AB-123/AB-123-001/Final CSR"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "compound": "AB-123",
            "study_id": "AB-123-001",
            "deliverable": "Final CSR",
            "documents": [{
                "document_id": "doc-1",
                "filename": "ae_tables.pdf",
                "status": "completed",
                "created_at": "2025-03-01T10:00:00",
                "total_chunks": 40,
                "tlf_outputs_found": 12
            }],
            "document_count": 1
        })))
        .mount(&server)
        .await;

    let response = client(&server)
        .deliverable_documents("AB-123", "AB-123-001", "Final CSR")
        .await
        .unwrap();
    assert_eq!(response.documents.len(), 1);
    assert!(response.documents[0].is_chat_ready());
}

#[tokio::test]
async fn test_list_documents_sends_filters_as_query() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/documents/list"))
        .and(query_param("status_filter", "completed"))
        .and(query_param("limit", "5"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let query = DocumentListQuery {
        limit: Some(5),
        status_filter: Some("completed".to_string()),
        ..Default::default()
    };
    let docs = client(&server).list_documents(&query).await.unwrap();
    assert!(docs.is_empty());
}

#[tokio::test]
async fn test_delete_document() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/api/v1/documents/doc-1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"message": "deleted"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    client(&server).delete_document("doc-1").await.unwrap();
}

#[tokio::test]
async fn test_processing_status_poll() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/documents/status/doc-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(status_json("building_index", 80)))
        .mount(&server)
        .await;

    let status = client(&server).processing_status("doc-1").await.unwrap();
    assert_eq!(status.status, ProcessingState::BuildingIndex);
    assert_eq!(status.progress, 80);
}

#[tokio::test]
async fn test_documents_summary_and_structure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/documents/summary"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "total_documents": 7,
            "by_status": {"completed": 6, "failed": 1},
            "total_tlf_outputs": 84
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/documents/structure"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "AB-123": {"AB-123-001": ["Final CSR"]}
        })))
        .mount(&server)
        .await;

    let summary = client(&server).documents_summary().await.unwrap();
    assert_eq!(summary.total_documents, 7);
    assert_eq!(summary.by_status.get("completed"), Some(&6));

    let structure = client(&server).structure().await.unwrap();
    assert!(structure.get("AB-123").is_some());
}

#[tokio::test]
async fn test_health_stats_and_detailed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/health/stats"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "total_documents": 12,
            "total_chunks": 480,
            "total_queries": 33,
            "average_processing_time_seconds": 41.5,
            "uptime_seconds": 86400
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/health/detailed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "healthy",
            "checks": {"index": "ok", "storage": "ok"}
        })))
        .mount(&server)
        .await;

    let stats = client(&server).system_stats().await.unwrap();
    assert_eq!(stats.total_documents, 12);
    assert_eq!(stats.uptime_seconds, 86400);

    let detailed = client(&server).health_detailed().await.unwrap();
    assert_eq!(detailed["checks"]["index"], "ok");
}

// =============================================================================
// Upload
// =============================================================================

#[tokio::test]
async fn test_upload_streams_file_and_reports_progress() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/documents/upload"))
        .respond_with(ResponseTemplate::new(200).set_body_json(status_json("queued", 0)))
        .mount(&server)
        .await;

    let file = Builder::new().suffix(".pdf").tempfile().unwrap();
    std::fs::write(file.path(), vec![0x25u8; 150_000]).unwrap();

    let progress = std::sync::Arc::new(std::sync::Mutex::new(Vec::<(u64, u64)>::new()));
    let sink = std::sync::Arc::clone(&progress);

    let fields = UploadFields {
        compound: "AB-123".to_string(),
        study_id: "AB-123-001".to_string(),
        deliverable: "Final CSR".to_string(),
        description: None,
    };
    let status = client(&server)
        .upload_document(
            file.path(),
            &fields,
            Some(move |sent, total| sink.lock().unwrap().push((sent, total))),
        )
        .await
        .unwrap();

    assert_eq!(status.status, ProcessingState::Queued);

    let progress = progress.lock().unwrap();
    // 150 KB in 64 KB chunks: three callbacks, last one complete.
    assert_eq!(progress.len(), 3);
    assert_eq!(progress.last().copied(), Some((150_000, 150_000)));
}

#[tokio::test]
async fn test_upload_surfaces_server_rejection() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/documents/upload"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({"detail": "Only PDF files are supported"})),
        )
        .mount(&server)
        .await;

    let file = Builder::new().suffix(".pdf").tempfile().unwrap();
    std::fs::write(file.path(), b"%PDF-1.4").unwrap();

    let fields = UploadFields {
        compound: "AB-123".to_string(),
        study_id: "AB-123-001".to_string(),
        deliverable: "Final CSR".to_string(),
        description: None,
    };
    let err = client(&server)
        .upload_document(file.path(), &fields, None::<fn(u64, u64)>)
        .await
        .unwrap_err();
    assert!(err.is_status(400));
    assert!(err.to_string().contains("Only PDF files"));
}
