use super::*;
use crate::dispatcher::test_helpers::{
    GatedTransport, RecordingTransport, create_test_dispatcher, test_config, wait_for_idle,
};
use crate::error::{ApiError, TransportError};
use crate::transport::Transport;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use serde_json::{Value, json};
use std::time::Duration;
use tower::ServiceExt;


/// Router over a dispatcher using `transport`, plus the dispatcher itself
fn create_test_app(transport: Arc<dyn Transport>) -> (Router, Arc<Dispatcher>, LogBuffer) {
    let dispatcher = Arc::new(create_test_dispatcher(transport));
    let logs = LogBuffer::new(10);
    let app = create_router(dispatcher.clone(), dispatcher.get_config(), logs.clone());
    (app, dispatcher, logs)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn post_empty(uri: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_json(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

async fn api_error(response: Response) -> ApiError {
    serde_json::from_value(body_json(response).await).unwrap()
}

#[tokio::test]
async fn test_api_server_spawns() {
    let mut config = test_config();
    // Port 0 = OS assigns a free port
    config.server.api.bind_address = "127.0.0.1:0".parse().unwrap();
    let config = Arc::new(config);
    let dispatcher = Arc::new(create_test_dispatcher(RecordingTransport::new()));

    let api_handle = tokio::spawn({
        let dispatcher = dispatcher.clone();
        let config = config.clone();
        async move { start_api_server(dispatcher, config, LogBuffer::new(10)).await }
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!api_handle.is_finished(), "server should still be serving");
    api_handle.abort();
}

#[tokio::test]
async fn test_api_server_stops_on_shutdown_signal() {
    let mut config = test_config();
    config.server.api.bind_address = "127.0.0.1:0".parse().unwrap();
    let dispatcher = Arc::new(create_test_dispatcher(RecordingTransport::new()));
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();

    let server = tokio::spawn(start_api_server_with_shutdown(
        dispatcher,
        Arc::new(config),
        LogBuffer::new(10),
        async move {
            rx.await.ok();
        },
    ));

    tokio::time::sleep(Duration::from_millis(50)).await;
    tx.send(()).unwrap();
    let result = tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .unwrap()
        .unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_cors_enabled() {
    let (app, _dispatcher, _logs) = create_test_app(RecordingTransport::new());

    let request = Request::builder()
        .uri("/health")
        .header("Origin", "http://localhost:3000")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response
            .headers()
            .contains_key("access-control-allow-origin"),
        "CORS header should be present when CORS is enabled"
    );
}

#[tokio::test]
async fn test_cors_disabled() {
    let dispatcher = Arc::new(create_test_dispatcher(RecordingTransport::new()));
    let mut config = test_config();
    config.server.api.cors_enabled = false;
    let app = create_router(dispatcher, Arc::new(config), LogBuffer::new(10));

    let request = Request::builder()
        .uri("/health")
        .header("Origin", "http://localhost:3000")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert!(
        !response
            .headers()
            .contains_key("access-control-allow-origin")
    );
}

#[tokio::test]
async fn test_swagger_ui_can_be_disabled() {
    let dispatcher = Arc::new(create_test_dispatcher(RecordingTransport::new()));
    let mut config = test_config();
    config.server.api.swagger_ui = false;
    let app = create_router(dispatcher, Arc::new(config), LogBuffer::new(10));

    let response = app.oneshot(get("/swagger-ui/")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
