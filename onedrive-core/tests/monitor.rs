use std::time::Duration;

use onedrive_core::{JobStatus, OneDriveClient, OneDriveError, OperationState};
use serde_json::json;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> OneDriveClient {
    OneDriveClient::with_base_url(&server.uri(), "test-token").unwrap()
}

fn monitor_url(server: &MockServer) -> Url {
    Url::parse(&format!("{}/monitor/job-1", server.uri())).unwrap()
}

#[tokio::test]
async fn poll_reports_progress() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/monitor/job-1"))
        .respond_with(ResponseTemplate::new(202).set_body_json(json!({
            "operation": "ItemCopy",
            "percentageComplete": 42.5,
            "status": "inProgress"
        })))
        .mount(&server)
        .await;

    let operation = client(&server).operation(monitor_url(&server));
    match operation.poll().await.unwrap() {
        OperationState::Pending(status) => {
            assert_eq!(status.status, JobStatus::InProgress);
            assert_eq!(status.percentage_complete, Some(42.5));
            assert_eq!(status.operation.as_deref(), Some("ItemCopy"));
        }
        OperationState::Completed(_) => panic!("operation should still be pending"),
    }
}

#[tokio::test]
async fn wait_finishes_on_see_other_redirect() {
    let server = MockServer::start().await;
    let item_url = format!("{}/drive/items/NEW", server.uri());

    Mock::given(method("GET"))
        .and(path("/monitor/job-1"))
        .respond_with(ResponseTemplate::new(202).set_body_json(json!({
            "percentageComplete": 10.0,
            "status": "inProgress"
        })))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/monitor/job-1"))
        .respond_with(ResponseTemplate::new(303).insert_header("Location", item_url.as_str()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/drive/items/NEW"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let done = client(&server)
        .operation(monitor_url(&server))
        .with_poll_interval(Duration::from_millis(10))
        .wait()
        .await
        .unwrap();

    assert_eq!(done.resource_location.map(String::from), Some(item_url));
}

#[tokio::test]
async fn wait_finishes_at_full_percentage() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/monitor/job-1"))
        .respond_with(ResponseTemplate::new(202).set_body_json(json!({
            "percentageComplete": 100.0,
            "status": "inProgress",
            "resourceId": "NEW"
        })))
        .mount(&server)
        .await;

    let done = client(&server)
        .operation(monitor_url(&server))
        .with_poll_interval(Duration::from_millis(10))
        .wait()
        .await
        .unwrap();

    assert_eq!(done.resource_id.as_deref(), Some("NEW"));
    assert!(done.resource_location.is_none());
}

#[tokio::test]
async fn wait_finishes_on_completed_status() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/monitor/job-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "completed",
            "resourceId": "NEW"
        })))
        .mount(&server)
        .await;

    let done = client(&server)
        .operation(monitor_url(&server))
        .wait()
        .await
        .unwrap();

    assert_eq!(done.resource_id.as_deref(), Some("NEW"));
}

#[tokio::test]
async fn wait_fails_on_failed_status() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/monitor/job-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "failed",
            "statusDescription": "quota exceeded"
        })))
        .mount(&server)
        .await;

    let err = client(&server)
        .operation(monitor_url(&server))
        .wait()
        .await
        .expect_err("expected failure");

    assert!(matches!(err, OneDriveError::OperationFailed(msg) if msg == "quota exceeded"));
}

#[tokio::test]
async fn wait_times_out_while_pending() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/monitor/job-1"))
        .respond_with(ResponseTemplate::new(202).set_body_json(json!({
            "percentageComplete": 0.0,
            "status": "notStarted"
        })))
        .mount(&server)
        .await;

    let err = client(&server)
        .operation(monitor_url(&server))
        .with_poll_interval(Duration::from_millis(10))
        .with_timeout(Duration::from_millis(50))
        .wait()
        .await
        .expect_err("expected timeout");

    assert!(matches!(err, OneDriveError::Timeout));
}

#[tokio::test]
async fn poll_tolerates_unknown_status_values() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/monitor/job-1"))
        .respond_with(ResponseTemplate::new(202).set_body_json(json!({
            "status": "somethingNew"
        })))
        .mount(&server)
        .await;

    let state = client(&server)
        .operation(monitor_url(&server))
        .poll()
        .await
        .unwrap();

    assert!(matches!(state, OperationState::Pending(s) if s.status == JobStatus::Unknown));
}
