//! Shared test helpers for API integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, Request, StatusCode, header};
use serde_json::Value;
use tower::ServiceExt;

use cadhub_api::{AppState, build_router};
use cadhub_cache::Broker;
use cadhub_converter::testing::{FakeCadKernel, FakeExternalTool, FakeMeshProcessor};
use cadhub_converter::{ConversionMetrics, Dispatcher};
use cadhub_core::config::{AppConfig, StorageConfig};
use cadhub_core::types::id::JobId;
use cadhub_service::StorageLayout;
use cadhub_worker::ConversionJobHandler;

const BOUNDARY: &str = "cadhub-test-boundary";

/// Test application context
pub struct TestApp {
    /// The Axum router for making test requests
    pub router: Router,
    /// Shared state behind the router
    pub state: AppState,
    /// Storage directories
    pub layout: StorageLayout,
    /// Keeps the data root alive
    pub root: tempfile::TempDir,
}

/// A buffered response
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub bytes: Bytes,
    pub body: Value,
}

impl TestApp {
    /// Create a new test application with default configuration
    pub async fn new() -> Self {
        Self::with_config(AppConfig::default()).await
    }

    /// Create a new test application; storage is redirected to a temp dir
    pub async fn with_config(mut config: AppConfig) -> Self {
        let root = tempfile::tempdir().expect("tempdir");
        config.storage = StorageConfig::rooted_at(root.path());

        let layout = StorageLayout::from_config(&config.storage);
        layout.init().await.expect("init storage");

        let broker = Broker::in_memory(Duration::from_millis(50));
        let metrics = Arc::new(ConversionMetrics::new());
        let state = AppState::new(config, broker, layout.clone(), metrics);
        let router = build_router(state.clone());

        Self {
            router,
            state,
            layout,
            root,
        }
    }

    /// Send a request and buffer the response
    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router response");

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body");
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);

        TestResponse {
            status,
            headers,
            bytes,
            body,
        }
    }

    /// GET `uri`
    pub async fn get(&self, uri: &str) -> TestResponse {
        let request = Request::builder()
            .method("GET")
            .uri(uri)
            .body(Body::empty())
            .expect("request");
        self.send(request).await
    }

    /// POST a multipart upload to `/convert`
    pub async fn upload(&self, field: &str, filename: &str, content: &[u8]) -> TestResponse {
        let request = Request::builder()
            .method("POST")
            .uri("/convert")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(multipart_body(field, filename, content)))
            .expect("request");
        self.send(request).await
    }

    /// Upload `filename` under the `file` field and return the task id
    pub async fn submit(&self, filename: &str, content: &[u8]) -> JobId {
        let response = self.upload("file", filename, content).await;
        assert_eq!(response.status, StatusCode::ACCEPTED, "{}", response.body);
        response.body["task_id"]
            .as_str()
            .expect("task_id")
            .parse()
            .expect("valid task id")
    }

    /// A job handler over this app's store and storage, backed by fakes
    pub fn worker(&self, kernel: FakeCadKernel, tool: FakeExternalTool) -> ConversionJobHandler {
        let dispatcher = Dispatcher::new(
            Arc::new(kernel),
            Arc::new(FakeMeshProcessor::default()),
            Arc::new(tool),
        )
        .with_metrics(Arc::clone(&self.state.metrics));
        ConversionJobHandler::new(
            Arc::clone(&self.state.broker.store),
            dispatcher,
            self.layout.clone(),
        )
    }
}

/// Single-field multipart/form-data body
pub fn multipart_body(field: &str, filename: &str, content: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\n\
             Content-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\n\
             Content-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}
