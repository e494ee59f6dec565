//! Integration tests for the conversion HTTP surface.

mod helpers;

use axum::http::{StatusCode, header};

use cadhub_converter::testing::{FAKE_GLB, FakeCadKernel, FakeExternalTool};
use cadhub_core::config::AppConfig;
use cadhub_core::types::id::JobId;
use cadhub_worker::ProcessOutcome;

#[tokio::test]
async fn test_root_welcome() {
    let app = helpers::TestApp::new().await;
    let response = app.get("/").await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["message"], "Welcome to the CAD Converter API!");
}

#[tokio::test]
async fn test_health_reports_broker_and_metrics() {
    let app = helpers::TestApp::new().await;
    let response = app.get("/health").await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["status"], "ok");
    assert_eq!(response.body["queue_depth"], 0);
    assert_eq!(response.body["conversions"]["conversions_started"], 0);
}

#[tokio::test]
async fn test_convert_accepts_and_queues() {
    let app = helpers::TestApp::new().await;
    let response = app.upload("file", "part.step", b"ISO-10303-21;").await;

    assert_eq!(response.status, StatusCode::ACCEPTED);
    let task_id = response.body["task_id"].as_str().unwrap().to_string();
    assert_eq!(response.body["status_url"], format!("/status/{task_id}"));

    let status = app.get(&format!("/status/{task_id}")).await;
    assert_eq!(status.status, StatusCode::OK);
    assert_eq!(status.body["task_id"], task_id);
    assert_eq!(status.body["state"], "QUEUED");
    assert!(status.body["details"].is_null());
    assert!(status.body.get("download_url").is_none());
}

#[tokio::test]
async fn test_convert_rejects_unsupported_format() {
    let app = helpers::TestApp::new().await;
    let response = app.upload("file", "drawing.dwg", b"AC1032").await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["error"], "UNSUPPORTED_FORMAT");
    assert!(
        response.body["message"]
            .as_str()
            .unwrap()
            .contains(".dwg")
    );
}

#[tokio::test]
async fn test_convert_requires_file_field() {
    let app = helpers::TestApp::new().await;
    let response = app.upload("attachment", "part.step", b"ISO-10303-21;").await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["error"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_oversized_upload_is_rejected() {
    let mut config = AppConfig::default();
    config.server.max_upload_size_bytes = 64;
    let app = helpers::TestApp::with_config(config).await;

    let response = app.upload("file", "mesh.stl", &[b's'; 4096]).await;

    assert_eq!(response.status, StatusCode::PAYLOAD_TOO_LARGE);
    let uploads = std::fs::read_dir(app.layout.uploads_dir()).unwrap();
    assert_eq!(uploads.count(), 0);
}

#[tokio::test]
async fn test_unknown_task_is_not_found() {
    let app = helpers::TestApp::new().await;

    let response = app.get(&format!("/status/{}", JobId::new())).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.body["error"], "NOT_FOUND");

    let response = app.get("/status/not-a-task").await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);

    let response = app.get(&format!("/download/{}", JobId::new())).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_download_unavailable_until_succeeded() {
    let app = helpers::TestApp::new().await;
    let task_id = app.submit("mesh.obj", b"v 0 0 0").await;

    let response = app.get(&format!("/download/{task_id}")).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.body["message"], "Task not complete or failed.");
}

#[tokio::test]
async fn test_mesh_conversion_end_to_end() {
    let app = helpers::TestApp::new().await;
    let task_id = app.submit("mesh.obj", b"v 0 0 0").await;

    let worker = app.worker(FakeCadKernel::default(), FakeExternalTool::succeeding());
    let delivery = app.state.broker.queue.dequeue().await.unwrap().unwrap();
    assert_eq!(delivery.job_id, task_id);
    let outcome = worker.process(delivery.job_id).await.unwrap();
    assert!(matches!(outcome, ProcessOutcome::Finished(_)));

    let status = app.get(&format!("/status/{task_id}")).await;
    assert_eq!(status.body["state"], "SUCCEEDED");
    assert_eq!(status.body["details"]["status"], "SUCCESS");
    assert!(
        status.body["details"]["result_path"]
            .as_str()
            .unwrap()
            .ends_with(".glb")
    );
    let download_url = status.body["download_url"].as_str().unwrap().to_string();
    assert_eq!(download_url, format!("/download/{task_id}"));

    let download = app.get(&download_url).await;
    assert_eq!(download.status, StatusCode::OK);
    assert_eq!(download.headers[header::CONTENT_TYPE], "model/gltf-binary");
    let disposition = download.headers[header::CONTENT_DISPOSITION]
        .to_str()
        .unwrap();
    assert!(disposition.starts_with("attachment; filename=\"mesh_"));
    assert!(disposition.ends_with(".glb\""));
    assert_eq!(&download.bytes[..], FAKE_GLB);

    let health = app.get("/health").await;
    assert_eq!(health.body["conversions"]["conversions_succeeded"], 1);
    assert_eq!(health.body["conversions"]["direct_mesh_runs"], 1);
}

#[tokio::test]
async fn test_failed_conversion_exposes_error() {
    let app = helpers::TestApp::new().await;
    let task_id = app.submit("model.fbx", b"Kaydara FBX Binary").await;

    let worker = app.worker(
        FakeCadKernel::default(),
        FakeExternalTool::failing(1, "bad input"),
    );
    worker.process(task_id).await.unwrap();

    let status = app.get(&format!("/status/{task_id}")).await;
    assert_eq!(status.body["state"], "FAILED");
    assert_eq!(status.body["details"]["kind"], "ExternalToolFailure");
    assert!(
        status.body["details"]["message"]
            .as_str()
            .unwrap()
            .contains("bad input")
    );
    assert!(status.body.get("download_url").is_none());

    let download = app.get(&format!("/download/{task_id}")).await;
    assert_eq!(download.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_missing_artifact_is_not_found() {
    let app = helpers::TestApp::new().await;
    let task_id = app.submit("part.stp", b"ISO-10303-21;").await;

    let worker = app.worker(
        FakeCadKernel::with_objects(&[("Body", true)]),
        FakeExternalTool::succeeding(),
    );
    worker.process(task_id).await.unwrap();

    let status = app.get(&format!("/status/{task_id}")).await;
    assert_eq!(status.body["state"], "SUCCEEDED");
    let result = status.body["details"]["result_path"].as_str().unwrap();
    std::fs::remove_file(result).unwrap();

    let download = app.get(&format!("/download/{task_id}")).await;
    assert_eq!(download.status, StatusCode::NOT_FOUND);
    assert_eq!(download.body["message"], "Converted file not found.");
}
