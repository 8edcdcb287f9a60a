//! End-to-end tests: real HTTP fetcher against a mock server, driven through
//! the REST router.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use axum::body::Body;
use axum::http::{Request, StatusCode};
use file_downloader::api::create_router;
use file_downloader::types::{CreateTaskResponse, TaskStatusResponse};
use file_downloader::{Config, FileDownloader, Status, TaskId, TaskStore};
use std::path::Path;
use std::time::Duration;
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_in(root: &Path) -> Config {
    let mut config = Config::default();
    config.download.download_dir = root.join("downloads");
    config.persistence.state_dir = root.join("state");
    config.worker.count = 2;
    config
}

async fn mock_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/a.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("hi"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/a.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("hi"))
        .mount(&server)
        .await;
    Mock::given(path("/b.txt"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    server
}

async fn status_of(app: &axum::Router, id: &str) -> TaskStatusResponse {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/api/v1/tasks/{id}/status"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

async fn wait_until_settled(app: &axum::Router, id: &str) -> TaskStatusResponse {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let status = status_of(app, id).await;
            if status.files.iter().all(|f| !f.status.is_incomplete()) {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    })
    .await
    .expect("task did not settle in time")
}

#[tokio::test]
async fn test_submit_download_and_recover_over_http() {
    let server = mock_server().await;
    let temp_dir = tempfile::tempdir().unwrap();
    let url_a = format!("{}/a.txt", server.uri());
    let url_b = format!("{}/b.txt", server.uri());

    // First run: one file succeeds, one fails
    let downloader = FileDownloader::new(config_in(temp_dir.path()))
        .await
        .unwrap();
    downloader.pool().start().await;
    let app = create_router(downloader.clone());

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/tasks")
                .header("content-type", "application/json")
                .body(Body::from(
                    serde_json::json!({ "urls": [url_a, url_b] }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let created: CreateTaskResponse = serde_json::from_slice(&body).unwrap();

    wait_until_settled(&app, &created.task_id).await;
    downloader.shutdown().await;

    let task = downloader
        .get_task(&TaskId::from(created.task_id.as_str()))
        .await
        .unwrap();
    assert_eq!(task.files[0].status, Status::Completed);
    assert_eq!(task.files[0].filename, "a.txt");
    assert_eq!(task.files[0].size, 2);
    assert_eq!(task.files[0].downloaded, 2);
    assert_eq!(task.files[1].status, Status::Failed);
    assert_eq!(task.files[1].downloaded, 0);
    assert_eq!(task.status, Status::Downloading);
    assert_eq!(task.progress, 100);

    let saved = tokio::fs::read_to_string(temp_dir.path().join("downloads").join("a.txt"))
        .await
        .unwrap();
    assert_eq!(saved, "hi");

    // The persisted record matches the live state after shutdown
    let store = TaskStore::new(temp_dir.path().join("state"));
    let record = store.load(&task.id).await.unwrap();
    assert_eq!(record, task);

    // Second run: recovery retries only the failed file
    let restarted = FileDownloader::new(config_in(temp_dir.path()))
        .await
        .unwrap();
    restarted.pool().start().await;
    let report = restarted.recover().await;
    assert_eq!(report.queued, 1);

    let app = create_router(restarted.clone());
    let settled = wait_until_settled(&app, &created.task_id).await;
    restarted.shutdown().await;

    assert_eq!(settled.files[0].status, Status::Completed);
    assert_eq!(settled.files[1].status, Status::Failed);

    // a.txt was fetched once, b.txt probed once per run
    let requests = server.received_requests().await.unwrap();
    let a_gets = requests
        .iter()
        .filter(|r| r.method.as_str() == "GET" && r.url.path() == "/a.txt")
        .count();
    let b_probes = requests.iter().filter(|r| r.url.path() == "/b.txt").count();
    assert_eq!(a_gets, 1);
    assert_eq!(b_probes, 2);
}

#[tokio::test]
async fn test_unknown_task_over_http() {
    let temp_dir = tempfile::tempdir().unwrap();
    let downloader = FileDownloader::new(config_in(temp_dir.path()))
        .await
        .unwrap();
    let app = create_router(downloader);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/v1/tasks/task_0_0/status")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
