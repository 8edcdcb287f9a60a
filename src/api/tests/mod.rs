use super::*;
use crate::service::test_helpers::{MockFetcher, create_test_downloader};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;


/// Test downloader whose fetcher never touches the network
async fn test_downloader() -> (FileDownloader, tempfile::TempDir) {
    create_test_downloader(Arc::new(MockFetcher::succeeding(4))).await
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

fn post_json(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_api_server_stops_on_cancel() {
    let (downloader, _temp_dir) = test_downloader().await;
    let shutdown = CancellationToken::new();

    let api_handle = tokio::spawn(start_api_server(downloader, shutdown.clone()));

    // Give it a moment to start
    tokio::time::sleep(Duration::from_millis(100)).await;
    shutdown.cancel();

    tokio::time::timeout(Duration::from_secs(5), api_handle)
        .await
        .expect("server did not stop")
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_cors_enabled() {
    let (downloader, _temp_dir) = test_downloader().await;
    let app = create_router(downloader);

    let request = Request::builder()
        .uri("/health")
        .header("Origin", "http://localhost:3000")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response.headers().contains_key("access-control-allow-origin"),
        "CORS header should be present when CORS is enabled"
    );
}

#[tokio::test]
async fn test_cors_disabled() {
    let temp_dir = tempfile::tempdir().unwrap();
    let mut config = crate::service::test_helpers::test_config(temp_dir.path());
    config.server.api.cors_enabled = false;
    let downloader = FileDownloader::with_fetcher(config, Arc::new(MockFetcher::default()))
        .await
        .unwrap();

    let request = Request::builder()
        .uri("/health")
        .header("Origin", "http://localhost:3000")
        .body(Body::empty())
        .unwrap();
    let response = create_router(downloader).oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(!response.headers().contains_key("access-control-allow-origin"));
}

#[test]
fn test_cors_layer_specific_origins() {
    // Must not panic on unparseable entries
    let _ = build_cors_layer(&["http://localhost:3000".to_string(), "\n".to_string()]);
    let _ = build_cors_layer(&[]);
}
