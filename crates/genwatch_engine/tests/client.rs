use std::time::Duration;

use futures_util::StreamExt;
use genwatch_core::{GenerationConfig, JobId, JobStatus, WebSearchMode};
use genwatch_engine::{
    ClientSettings, FailureKind, GenerationBackend, ReqwestBackend, StreamEvent, MAX_EVENT_BYTES,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn backend_for(server: &MockServer) -> ReqwestBackend {
    ReqwestBackend::new(ClientSettings {
        base_url: format!("{}/api/", server.uri()),
        ..ClientSettings::default()
    })
    .expect("valid base url")
}

#[tokio::test]
async fn fetch_document_reads_status_and_log() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/documents/doc-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "document": {
                "id": "doc-1",
                "status": "generating",
                "generation_log": ["outline", "chapter 1"],
                "content": null
            }
        })))
        .mount(&server)
        .await;

    let snapshot = backend_for(&server)
        .fetch_document(&JobId::new("doc-1"))
        .await
        .expect("fetch ok");
    assert_eq!(snapshot.status, JobStatus::Generating);
    assert_eq!(snapshot.generation_log, vec!["outline", "chapter 1"]);
    assert_eq!(snapshot.content, None);
}

#[tokio::test]
async fn http_errors_keep_their_status_code() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/documents/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let err = backend_for(&server)
        .fetch_document(&JobId::new("missing"))
        .await
        .unwrap_err();
    assert_eq!(err.kind, FailureKind::HttpStatus(404));
}

#[tokio::test]
async fn malformed_payload_is_a_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tests/test-1"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>gateway</html>"))
        .mount(&server)
        .await;

    let err = backend_for(&server)
        .fetch_test(&JobId::new("test-1"))
        .await
        .unwrap_err();
    assert_eq!(err.kind, FailureKind::Decode);
}

#[tokio::test]
async fn slow_requests_time_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/documents/doc-1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_millis(250))
                .set_body_json(json!({ "document": { "status": "pending" } })),
        )
        .mount(&server)
        .await;

    let backend = ReqwestBackend::new(ClientSettings {
        base_url: format!("{}/api", server.uri()),
        request_timeout: Duration::from_millis(50),
        ..ClientSettings::default()
    })
    .unwrap();
    let err = backend
        .fetch_document(&JobId::new("doc-1"))
        .await
        .unwrap_err();
    assert_eq!(err.kind, FailureKind::Timeout);
}

#[tokio::test]
async fn create_and_start_document() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/workspaces/ws-1/documents"))
        .and(body_json(json!({ "title": "Cells", "page_count": 4, "web_search": "auto" })))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(json!({ "document": { "id": "doc-9" } })),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/documents/doc-9/generate"))
        .and(body_json(json!({ "custom_instructions": "short", "web_search": "auto" })))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;

    let config = GenerationConfig {
        title: "Cells".to_string(),
        page_count: Some(4),
        web_search: WebSearchMode::Auto,
        ..GenerationConfig::default()
    };
    let backend = backend_for(&server);
    let job_id = backend.create_document("ws-1", &config).await.unwrap();
    assert_eq!(job_id, JobId::new("doc-9"));

    let config = GenerationConfig {
        custom_instructions: Some("short".to_string()),
        ..config
    };
    backend.start_document(&job_id, &config).await.unwrap();
}

#[tokio::test]
async fn cancel_and_restart_hit_their_endpoints() {
    let server = MockServer::start().await;
    for endpoint in ["cancel", "restart", "edit-and-restart"] {
        Mock::given(method("POST"))
            .and(path(format!("/api/documents/doc-1/{endpoint}")))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
    }

    let backend = backend_for(&server);
    let id = JobId::new("doc-1");
    backend.cancel_document(&id).await.unwrap();
    backend.restart_document(&id, None).await.unwrap();
    let edited = GenerationConfig {
        title: "Cells II".to_string(),
        ..GenerationConfig::default()
    };
    backend.restart_document(&id, Some(&edited)).await.unwrap();
}

#[tokio::test]
async fn question_stream_decodes_server_sent_events() {
    let server = MockServer::start().await;
    let body = concat!(
        ": connected\n\n",
        "data: {\"type\":\"question\",\"question\":{\"id\":1}}\n\n",
        "data: {\"type\":\"question\",\"question\":{\"id\":2}}\r\n\r\n",
        "data: {\"type\":\"complete\"}\n\n",
    );
    Mock::given(method("GET"))
        .and(path("/api/tests/test-1/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let stream = backend_for(&server)
        .open_test_stream(&JobId::new("test-1"))
        .await
        .unwrap();
    let events: Vec<_> = stream.collect().await;
    assert_eq!(
        events,
        vec![
            Ok(StreamEvent::Question {
                question: json!({ "id": 1 })
            }),
            Ok(StreamEvent::Question {
                question: json!({ "id": 2 })
            }),
            Ok(StreamEvent::Complete),
        ]
    );
}

#[tokio::test]
async fn runaway_stream_line_ends_with_a_decode_error() {
    let server = MockServer::start().await;
    let mut body = String::from("data: {\"type\":\"question\",\"question\":{\"id\":1}}\n\ndata: ");
    body.push_str(&"x".repeat(MAX_EVENT_BYTES + 1));
    Mock::given(method("GET"))
        .and(path("/api/tests/test-1/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let stream = backend_for(&server)
        .open_test_stream(&JobId::new("test-1"))
        .await
        .unwrap();
    let events: Vec<_> = stream.collect().await;
    assert_eq!(events.len(), 2, "{events:?}");
    assert!(events[0].is_ok());
    let err = events[1].as_ref().unwrap_err();
    assert_eq!(err.kind, FailureKind::Decode);
}

#[tokio::test]
async fn test_session_endpoints() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/workspaces/ws-1/tests"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "test": { "id": "test-4" } })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/tests/test-4/answer"))
        .and(body_json(json!({ "question_id": "q1", "answer": "B" })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/tests/test-4/complete"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let backend = backend_for(&server);
    let config = GenerationConfig {
        title: "Quiz".to_string(),
        question_count: Some(5),
        ..GenerationConfig::default()
    };
    let id = backend.create_test("ws-1", &config).await.unwrap();
    assert_eq!(id, JobId::new("test-4"));
    backend.submit_answer(&id, "q1", "B").await.unwrap();
    backend.complete_test(&id).await.unwrap();
}

#[test]
fn invalid_base_url_is_rejected() {
    let err = ReqwestBackend::new(ClientSettings {
        base_url: "not a url".to_string(),
        ..ClientSettings::default()
    })
    .unwrap_err();
    assert_eq!(err.kind, FailureKind::InvalidUrl);
}

#[tokio::test]
async fn job_ids_stay_a_single_path_segment() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/documents/a%2Fb%3Fx"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "document": { "id": "a/b?x", "status": "generating", "generation_log": [] }
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/documents/a%2Fb%3Fx/cancel"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let backend = backend_for(&server);
    let id = JobId::new("a/b?x");
    let snapshot = backend.fetch_document(&id).await.expect("fetch ok");
    assert_eq!(snapshot.status, JobStatus::Generating);
    backend.cancel_document(&id).await.expect("cancel ok");
}

#[test]
fn base_url_without_a_path_is_rejected() {
    let err = ReqwestBackend::new(ClientSettings {
        base_url: "mailto:ops@example.com".to_string(),
        ..ClientSettings::default()
    })
    .unwrap_err();
    assert_eq!(err.kind, FailureKind::InvalidUrl);
}
