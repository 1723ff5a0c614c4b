//! Export client integration tests.
//!
//! These tests run `BulkFhirClient` and `JobMonitor` against a wiremock
//! server:
//! - Token requests and bearer propagation
//! - Kick-off request shape and Content-Location handling
//! - Pending and complete job status parsing
//! - Silent re-authentication while monitoring
//! - Result file streaming and retryable statuses

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use serde_json::json;
use tokio::io::AsyncReadExt;
use wiremock::matchers::{body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use bulkfhir_core::{
    config::{MonitorConfig, ServerConfig},
    BulkDataClient, BulkFhirClient, BulkFhirError, JobMonitor, JobStatus, MonitorEvent,
    ResourceType,
};

const TOKEN: &str = "test-token";
/// base64("id:secret")
const BASIC_AUTH: &str = "Basic aWQ6c2VjcmV0";

fn server_config(server: &MockServer) -> ServerConfig {
    ServerConfig {
        base_url: format!("{}/api/v2", server.uri()),
        auth_url: format!("{}/auth/token", server.uri()),
        client_id: "id".to_string(),
        client_secret: "secret".to_string(),
        scopes: vec![],
        request_timeout_secs: 5,
    }
}

async fn mount_token(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/auth/token"))
        .and(header("Authorization", BASIC_AUTH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": TOKEN,
            "token_type": "bearer",
            "expires_in": 1200
        })))
        .mount(server)
        .await;
}

async fn authenticated_client(server: &MockServer) -> BulkFhirClient {
    mount_token(server).await;
    let client = BulkFhirClient::new(server_config(server)).expect("client");
    client.authenticate().await.expect("authenticate");
    client
}

fn complete_body(server: &MockServer) -> serde_json::Value {
    json!({
        "transactionTime": "2021-01-01T00:00:00.000Z",
        "request": format!("{}/api/v2/Group/all/$export", server.uri()),
        "requiresAccessToken": true,
        "output": [
            { "type": "Patient", "url": format!("{}/data/patient-1.ndjson", server.uri()) },
            { "type": "Coverage", "url": format!("{}/data/coverage-1.ndjson", server.uri()) },
            { "type": "Patient", "url": format!("{}/data/patient-2.ndjson", server.uri()) }
        ],
        "error": []
    })
}

#[tokio::test]
async fn test_authenticate_returns_token() {
    let server = MockServer::start().await;
    mount_token(&server).await;

    let client = BulkFhirClient::new(server_config(&server)).unwrap();
    assert_eq!(client.authenticate().await.unwrap(), TOKEN);
}

#[tokio::test]
async fn test_authenticate_sends_scopes_as_form() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/token"))
        .and(body_string_contains("grant_type=client_credentials"))
        .and(body_string_contains("scope=system%2F*.read"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "access_token": TOKEN })))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = server_config(&server);
    config.scopes = vec!["system/*.read".to_string()];
    let client = BulkFhirClient::new(config).unwrap();
    assert_eq!(client.authenticate().await.unwrap(), TOKEN);
}

#[tokio::test]
async fn test_authenticate_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/token"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let client = BulkFhirClient::new(server_config(&server)).unwrap();
    assert!(matches!(
        client.authenticate().await,
        Err(BulkFhirError::AuthFailure(_))
    ));
}

#[tokio::test]
async fn test_authenticate_empty_token_fails() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "access_token": "" })))
        .mount(&server)
        .await;

    let client = BulkFhirClient::new(server_config(&server)).unwrap();
    assert!(matches!(
        client.authenticate().await,
        Err(BulkFhirError::AuthFailure(_))
    ));
}

#[tokio::test]
async fn test_start_export_before_authenticate_makes_no_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(202))
        .expect(0)
        .mount(&server)
        .await;

    let client = BulkFhirClient::new(server_config(&server)).unwrap();
    let result = client
        .start_export(&[ResourceType::Patient], None, "all")
        .await;
    assert_eq!(result.unwrap_err(), BulkFhirError::Unauthorized);
}

#[tokio::test]
async fn test_start_export_request_shape() {
    let server = MockServer::start().await;
    let client = authenticated_client(&server).await;
    let status_url = format!("{}/jobs/42", server.uri());

    Mock::given(method("GET"))
        .and(path("/api/v2/Group/all/$export"))
        .and(header("Authorization", "Bearer test-token"))
        .and(header("Accept", "application/fhir+json"))
        .and(header("Prefer", "respond-async"))
        .and(query_param("_type", "Patient,Coverage"))
        .and(query_param("_since", "2021-06-01T12:30:00.000Z"))
        .respond_with(ResponseTemplate::new(202).insert_header("Content-Location", status_url.as_str()))
        .expect(1)
        .mount(&server)
        .await;

    let since = Utc.with_ymd_and_hms(2021, 6, 1, 12, 30, 0).unwrap();
    let url = client
        .start_export(
            &[ResourceType::Patient, ResourceType::Coverage],
            Some(since),
            "all",
        )
        .await
        .unwrap();
    assert_eq!(url, status_url);
}

#[tokio::test]
async fn test_start_export_missing_content_location() {
    let server = MockServer::start().await;
    let client = authenticated_client(&server).await;

    Mock::given(method("GET"))
        .and(path("/api/v2/Group/all/$export"))
        .respond_with(ResponseTemplate::new(202))
        .mount(&server)
        .await;

    assert_eq!(
        client
            .start_export(&[ResourceType::Patient], None, "all")
            .await
            .unwrap_err(),
        BulkFhirError::HeaderCountMismatch {
            header: "Content-Location",
            count: 0,
        }
    );
}

#[tokio::test]
async fn test_start_export_unexpected_status() {
    let server = MockServer::start().await;
    let client = authenticated_client(&server).await;

    Mock::given(method("GET"))
        .and(path("/api/v2/Group/all/$export"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    assert_eq!(
        client
            .start_export(&[ResourceType::Patient], None, "all")
            .await
            .unwrap_err(),
        BulkFhirError::UnexpectedStatus { status: 500 }
    );
}

#[tokio::test]
async fn test_job_status_pending() {
    let server = MockServer::start().await;
    let client = authenticated_client(&server).await;

    Mock::given(method("GET"))
        .and(path("/jobs/42"))
        .and(header("Authorization", "Bearer test-token"))
        .respond_with(
            ResponseTemplate::new(202).insert_header("X-Progress", "Retrieval is 50% complete (50%)"),
        )
        .mount(&server)
        .await;

    let status = client
        .job_status(&format!("{}/jobs/42", server.uri()))
        .await
        .unwrap();
    assert_eq!(status, JobStatus::pending(50));
}

#[tokio::test]
async fn test_job_status_bad_progress() {
    let server = MockServer::start().await;
    let client = authenticated_client(&server).await;

    Mock::given(method("GET"))
        .and(path("/jobs/42"))
        .respond_with(ResponseTemplate::new(202).insert_header("X-Progress", "working on it"))
        .mount(&server)
        .await;

    assert!(matches!(
        client.job_status(&format!("{}/jobs/42", server.uri())).await,
        Err(BulkFhirError::ProgressParseFailure(_))
    ));
}

#[tokio::test]
async fn test_job_status_complete() {
    let server = MockServer::start().await;
    let client = authenticated_client(&server).await;

    Mock::given(method("GET"))
        .and(path("/jobs/42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(complete_body(&server)))
        .mount(&server)
        .await;

    let status = client
        .job_status(&format!("{}/jobs/42", server.uri()))
        .await
        .unwrap();

    assert!(status.is_complete);
    assert_eq!(status.percent_complete, 100);
    assert_eq!(
        status.result_urls[&ResourceType::Patient],
        vec![
            format!("{}/data/patient-1.ndjson", server.uri()),
            format!("{}/data/patient-2.ndjson", server.uri()),
        ]
    );
    assert_eq!(status.result_urls[&ResourceType::Coverage].len(), 1);
    assert_eq!(
        status.transaction_time,
        Some(Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap())
    );
}

#[tokio::test]
async fn test_job_status_unauthorized() {
    let server = MockServer::start().await;
    let client = authenticated_client(&server).await;

    Mock::given(method("GET"))
        .and(path("/jobs/42"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    assert_eq!(
        client
            .job_status(&format!("{}/jobs/42", server.uri()))
            .await
            .unwrap_err(),
        BulkFhirError::Unauthorized
    );
}

#[tokio::test]
async fn test_get_data_streams_body() {
    let server = MockServer::start().await;
    let client = authenticated_client(&server).await;
    let body = "{\"resourceType\":\"Patient\",\"id\":\"1\"}\n{\"resourceType\":\"Patient\",\"id\":\"2\"}\n";

    Mock::given(method("GET"))
        .and(path("/data/patient-1.ndjson"))
        .and(header("Authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(&server)
        .await;

    let mut stream = client
        .get_data(&format!("{}/data/patient-1.ndjson", server.uri()))
        .await
        .ok()
        .expect("data stream");
    let mut read = String::new();
    stream.read_to_string(&mut read).await.unwrap();
    assert_eq!(read, body);
}

#[tokio::test]
async fn test_get_data_not_found_is_retryable() {
    let server = MockServer::start().await;
    let client = authenticated_client(&server).await;

    Mock::given(method("GET"))
        .and(path("/data/missing.ndjson"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let err = client
        .get_data(&format!("{}/data/missing.ndjson", server.uri()))
        .await
        .err()
        .expect("error");
    assert_eq!(err, BulkFhirError::RetryableStatus { status: 404 });
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_monitor_reauthenticates_and_completes() {
    let server = MockServer::start().await;
    let client = Arc::new(authenticated_client(&server).await);

    Mock::given(method("GET"))
        .and(path("/jobs/42"))
        .respond_with(ResponseTemplate::new(202).insert_header("X-Progress", "(10%)"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/jobs/42"))
        .respond_with(ResponseTemplate::new(401))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/jobs/42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(complete_body(&server)))
        .mount(&server)
        .await;

    let config = MonitorConfig {
        check_period_ms: 10,
        timeout_ms: 10_000,
        buffer_size: 10,
    };
    let monitor = JobMonitor::new(client.clone(), config);
    let mut rx = monitor.spawn(format!("{}/jobs/42", server.uri()));

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }

    assert_eq!(events.len(), 2);
    assert_eq!(events[0], MonitorEvent::Status(JobStatus::pending(10)));
    assert!(events[1].is_complete());

    let token_requests = server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|r| r.url.path() == "/auth/token")
        .count();
    assert_eq!(token_requests, 2);
}

#[tokio::test]
async fn test_monitor_times_out() {
    let server = MockServer::start().await;
    let client = Arc::new(authenticated_client(&server).await);

    Mock::given(method("GET"))
        .and(path("/jobs/42"))
        .respond_with(ResponseTemplate::new(202).insert_header("X-Progress", "(1%)"))
        .mount(&server)
        .await;

    let config = MonitorConfig {
        check_period_ms: 20,
        timeout_ms: 100,
        buffer_size: 10,
    };
    let mut rx = JobMonitor::new(client, config).spawn(format!("{}/jobs/42", server.uri()));

    let mut last = None;
    let mut count = 0;
    while let Some(event) = rx.recv().await {
        count += 1;
        last = Some(event);
    }

    assert!(count >= 2);
    assert!(last.expect("at least one event").is_timeout());
}

#[tokio::test]
async fn test_start_export_duplicate_content_location() {
    let server = MockServer::start().await;
    let client = authenticated_client(&server).await;

    Mock::given(method("GET"))
        .and(path("/api/v2/Group/all/$export"))
        .respond_with(
            ResponseTemplate::new(202)
                .append_header("Content-Location", "https://a.example.com/jobs/1")
                .append_header("Content-Location", "https://b.example.com/jobs/1"),
        )
        .mount(&server)
        .await;

    assert_eq!(
        client
            .start_export(&[ResourceType::Patient], None, "all")
            .await
            .unwrap_err(),
        BulkFhirError::HeaderCountMismatch {
            header: "Content-Location",
            count: 2,
        }
    );
}

#[tokio::test]
async fn test_job_status_missing_progress_header() {
    let server = MockServer::start().await;
    let client = authenticated_client(&server).await;

    Mock::given(method("GET"))
        .and(path("/jobs/42"))
        .respond_with(ResponseTemplate::new(202))
        .mount(&server)
        .await;

    assert_eq!(
        client
            .job_status(&format!("{}/jobs/42", server.uri()))
            .await
            .unwrap_err(),
        BulkFhirError::HeaderCountMismatch {
            header: "X-Progress",
            count: 0,
        }
    );
}

#[tokio::test]
async fn test_job_status_duplicate_progress_header() {
    let server = MockServer::start().await;
    let client = authenticated_client(&server).await;

    Mock::given(method("GET"))
        .and(path("/jobs/42"))
        .respond_with(
            ResponseTemplate::new(202)
                .append_header("X-Progress", "(10%)")
                .append_header("X-Progress", "(20%)"),
        )
        .mount(&server)
        .await;

    assert_eq!(
        client
            .job_status(&format!("{}/jobs/42", server.uri()))
            .await
            .unwrap_err(),
        BulkFhirError::HeaderCountMismatch {
            header: "X-Progress",
            count: 2,
        }
    );
}

/// Nothing listens on port 1, so requests fail before any response.
const UNREACHABLE_STATUS_URL: &str = "http://127.0.0.1:1/jobs/42";

#[tokio::test]
async fn test_job_status_connection_failure_is_transport_error() {
    let server = MockServer::start().await;
    let client = authenticated_client(&server).await;

    assert!(matches!(
        client.job_status(UNREACHABLE_STATUS_URL).await,
        Err(BulkFhirError::Transport(_))
    ));
}

#[tokio::test]
async fn test_monitor_reports_transport_errors_until_timeout() {
    let server = MockServer::start().await;
    let client = Arc::new(authenticated_client(&server).await);

    let config = MonitorConfig {
        check_period_ms: 20,
        timeout_ms: 150,
        buffer_size: 100,
    };
    let mut rx = JobMonitor::new(client, config).spawn(UNREACHABLE_STATUS_URL);

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }

    assert!(events.len() >= 2);
    let (last, polls) = events.split_last().expect("events");
    assert!(last.is_timeout());
    assert!(polls
        .iter()
        .all(|e| matches!(e, MonitorEvent::Error(BulkFhirError::Transport(_)))));
}
