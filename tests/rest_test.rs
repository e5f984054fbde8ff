//! REST boundary integration tests.
//!
//! Drives the axum router in-process over a local-pool-backed service.
#![cfg(feature = "server")]

use std::io::Cursor;
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use metrics_util::debugging::{DebugValue, DebuggingRecorder};
use tempfile::TempDir;
use tower::ServiceExt;

use artgate::server::model::{ErrorResponse, StartResponse, StatusResponse};
use artgate::server::{AppState, router};
use artgate::{Artgate, FitConfig, Status, telemetry};

fn jpeg(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_pixel(width, height, Rgb([90, 120, 150]));
    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Jpeg)
        .unwrap();
    buf
}

async fn test_router() -> (TempDir, Router) {
    let dir = TempDir::new().unwrap();
    let local_dir = dir.path().join("local");
    std::fs::create_dir_all(&local_dir).unwrap();
    std::fs::write(local_dir.join("seed.jpeg"), jpeg(64, 64)).unwrap();

    let prompts_path = dir.path().join("prompts.toml");
    std::fs::write(&prompts_path, "prompts = []\n").unwrap();

    let service = Artgate::builder()
        .fit(FitConfig {
            width: 64,
            height: 64,
            fit_threshold: 0.05,
        })
        .local_pool(&local_dir)
        .local_threshold(std::time::Duration::ZERO)
        .images_dir(dir.path().join("images"), 100, 120)
        .temp_dir(dir.path().join("tmp"), 5, 10)
        .placeholder(dir.path().join("black.jpeg"))
        .prompts_file(&prompts_path)
        .build()
        .unwrap();
    service.start().await.unwrap();

    // Seed the manager's long-lived pool for local operations.
    std::fs::write(
        service.manager().pool().dir().join("pooled.jpeg"),
        jpeg(64, 64),
    )
    .unwrap();
    service.manager().pool().scan().unwrap();

    let state = AppState {
        manager: service.manager(),
        prompts: service.prompts(),
    };
    (dir, router(state))
}

fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn local_operation_round_trip() {
    let (_dir, app) = test_router().await;

    // Start a local operation.
    let response = app
        .clone()
        .oneshot(post_json(
            "/operation/start",
            serde_json::json!({"type": "local"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let started: StartResponse = body_json(response).await;
    assert!(!started.id.is_empty());
    assert_eq!(started.status, Status::Done, "local operations are born done");

    // It is already done.
    let response = app
        .clone()
        .oneshot(get(&format!("/operation/status/{}", started.id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let status: StatusResponse = body_json(response).await;
    assert_eq!(status.id, started.id);
    assert_eq!(status.status, Status::Done);

    // The result decodes back to a target-sized JPEG.
    let response = app
        .oneshot(get(&format!("/operation/result/{}", started.id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let result: artgate::server::model::ResultResponse = body_json(response).await;
    assert_eq!(result.status, Status::Done);
    let bytes = BASE64.decode(result.response.image.as_bytes()).unwrap();
    let img = image::load_from_memory(&bytes).unwrap();
    assert_eq!((img.width(), img.height()), (64, 64));
}

#[tokio::test]
async fn result_streams_in_configured_chunks() {
    let (_dir, app) = test_router().await;

    let response = app
        .clone()
        .oneshot(post_json(
            "/operation/start",
            serde_json::json!({"type": "local"}),
        ))
        .await
        .unwrap();
    let started: StartResponse = body_json(response).await;

    // A tiny chunk size forces many body frames; the collected stream
    // must still be the complete JSON document.
    let response = app
        .clone()
        .oneshot(get(&format!(
            "/operation/result/{}?chunk_size=7",
            started.id
        )))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "application/json"
    );
    let result: artgate::server::model::ResultResponse = body_json(response).await;
    let bytes = BASE64.decode(result.response.image.as_bytes()).unwrap();
    assert_eq!(image::load_from_memory(&bytes).unwrap().width(), 64);

    // A malformed chunk size falls back to the default instead of failing.
    let response = app
        .oneshot(get(&format!(
            "/operation/result/{}?chunk_size=banana",
            started.id
        )))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let result: artgate::server::model::ResultResponse = body_json(response).await;
    assert!(!result.response.image.is_empty());
}

#[test]
fn request_counters_record_the_outcome() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();

    // A current-thread runtime keeps the handlers on this thread, where
    // the local recorder is installed.
    metrics::with_local_recorder(&recorder, || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let (_dir, app) = test_router().await;

            let response = app
                .clone()
                .oneshot(post_json(
                    "/operation/start",
                    serde_json::json!({"type": "local"}),
                ))
                .await
                .unwrap();
            let started: StartResponse = body_json(response).await;

            // One ok and one failed call per counter.
            app.clone()
                .oneshot(get(&format!("/operation/status/{}", started.id)))
                .await
                .unwrap();
            app.clone()
                .oneshot(get("/operation/status/i0-12345"))
                .await
                .unwrap();
            app.clone()
                .oneshot(get(&format!("/operation/result/{}", started.id)))
                .await
                .unwrap();
            app.oneshot(get("/operation/result/i0-12345")).await.unwrap();
        });
    });

    let snapshot = snapshotter.snapshot().into_vec();
    let count = |name: &str, status: &str| -> u64 {
        snapshot
            .iter()
            .filter(|(key, _, _, _)| {
                key.key().name() == name
                    && key
                        .key()
                        .labels()
                        .any(|l| l.key() == "status" && l.value() == status)
            })
            .map(|(_, _, _, value)| match value {
                DebugValue::Counter(v) => *v,
                _ => 0,
            })
            .sum()
    };

    assert_eq!(count(telemetry::STATUS_CHECKS_TOTAL, "ok"), 1);
    assert_eq!(count(telemetry::STATUS_CHECKS_TOTAL, "error"), 1);
    assert_eq!(count(telemetry::IMAGES_SERVED_TOTAL, "ok"), 1);
    assert_eq!(count(telemetry::IMAGES_SERVED_TOTAL, "error"), 1);
}

#[tokio::test]
async fn unknown_operation_maps_to_not_found() {
    let (_dir, app) = test_router().await;

    let response = app
        .oneshot(get("/operation/status/i0-12345"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let err: ErrorResponse = body_json(response).await;
    assert_eq!(err.error.code, "not_found");
    assert!(err.error.dev_message.is_some());
}

#[tokio::test]
async fn result_before_completion_is_a_conflict() {
    let (_dir, app) = test_router().await;

    let response = app
        .oneshot(get("/operation/result/i0-12345"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let err: ErrorResponse = body_json(response).await;
    assert_eq!(err.error.code, "not_complete");
}

#[tokio::test]
async fn prompt_add_persists() {
    let (_dir, app) = test_router().await;

    let response = app
        .clone()
        .oneshot(post_json(
            "/prompt/add",
            serde_json::json!({"prompt": "city at night", "negative": "daylight"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .oneshot(post_json("/prompt/add", serde_json::json!({"prompt": "  "})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
