//! HTTP-level tests for the ingress handlers: request validation, the SSE
//! status stream, and the deprecated render callback.

mod common;

use common::TestHarness;
use reelforge::store::{Scene, SceneStatus, VideoScript, WorkflowStatus};
use serde_json::{json, Value};

fn generate_body() -> Value {
    json!({
        "source": "text",
        "content": "# My Project\nIt does things.",
        "style": "tech",
        "duration": 30,
        "apiKeys": {
            "kieApiKey": "kie",
            "muxTokenId": "mux-id",
            "muxTokenSecret": "mux-secret",
            "llmApiKey": "llm"
        }
    })
}

fn one_scene_script() -> VideoScript {
    VideoScript {
        title: "t".into(),
        total_duration: 15,
        scenes: vec![Scene {
            scene_number: 1,
            duration: 15,
            description: "d".into(),
            narration_text: None,
            prompt: "p".into(),
        }],
    }
}

#[tokio::test]
async fn generate_rejects_bad_duration() {
    let (_h, addr) = TestHarness::with_server().await;
    let client = reqwest::Client::new();

    let mut body = generate_body();
    body["duration"] = json!(45);

    let resp = client
        .post(format!("http://{addr}/api/generate"))
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let error: Value = resp.json().await.unwrap();
    assert_eq!(error["error"], "Invalid request data");
    assert!(error["details"].as_str().unwrap().contains("duration"));
}

#[tokio::test]
async fn generate_rejects_unknown_style() {
    let (_h, addr) = TestHarness::with_server().await;
    let client = reqwest::Client::new();

    let mut body = generate_body();
    body["style"] = json!("vaporwave");

    let resp = client
        .post(format!("http://{addr}/api/generate"))
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn generate_rejects_empty_content() {
    let (_h, addr) = TestHarness::with_server().await;
    let client = reqwest::Client::new();

    let mut body = generate_body();
    body["content"] = json!("   ");

    let resp = client
        .post(format!("http://{addr}/api/generate"))
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn generate_rejects_missing_credentials() {
    let (harness, addr) = TestHarness::with_server().await;
    let client = reqwest::Client::new();

    let mut body = generate_body();
    body["apiKeys"]["muxTokenSecret"] = json!("");

    let resp = client
        .post(format!("http://{addr}/api/generate"))
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let error: Value = resp.json().await.unwrap();
    assert!(error["details"].as_str().unwrap().contains("muxTokenSecret"));

    // Validation failed before any workflow was created.
    assert!(harness.store.is_empty());
}

#[tokio::test]
async fn generate_rejects_non_github_url_source() {
    let (_h, addr) = TestHarness::with_server().await;
    let client = reqwest::Client::new();

    let mut body = generate_body();
    body["source"] = json!("url");
    body["content"] = json!("https://example.com/owner/repo");

    let resp = client
        .post(format!("http://{addr}/api/generate"))
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn status_unknown_id_is_not_found() {
    let (_h, addr) = TestHarness::with_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!(
            "http://{addr}/api/status/00000000-0000-0000-0000-000000000000"
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn status_stream_for_terminal_workflow_sends_one_snapshot_and_closes() {
    let (harness, addr) = TestHarness::with_server().await;
    let record = harness.store.create("readme".to_string());
    harness.store.set_result(record.id, "pb-1", Some("http://v/final.mp4"));

    let client = reqwest::Client::new();
    let resp = client
        .get(format!("http://{addr}/api/status/{}", record.id))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let content_type = resp
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(
        content_type.contains("text/event-stream"),
        "expected SSE content-type, got: {content_type}"
    );

    // The stream closes on its own, so reading the body terminates.
    let body = resp.text().await.unwrap();
    assert_eq!(body.matches("data:").count(), 1);
    assert!(body.contains("\"status\":\"ready\""));
    assert!(body.contains("pb-1"));
}

#[tokio::test]
async fn status_stream_closes_after_terminal_transition() {
    let (harness, addr) = TestHarness::with_server().await;
    let record = harness.store.create("readme".to_string());

    let store = harness.store.clone();
    let id = record.id;
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        store.set_status(id, WorkflowStatus::Scripting, None);
        store.set_status(id, WorkflowStatus::Error, Some("boom"));
    });

    let client = reqwest::Client::new();
    let resp = client
        .get(format!("http://{addr}/api/status/{}", record.id))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let body = resp.text().await.unwrap();
    // Initial snapshot + two transitions, the last of which is terminal.
    assert_eq!(body.matches("data:").count(), 3);
    assert!(body.contains("\"status\":\"analyzing\""));
    assert!(body.contains("\"status\":\"scripting\""));
    assert!(body.contains("\"status\":\"error\""));
    assert!(body.contains("boom"));
}

#[tokio::test]
async fn callback_for_unknown_job_is_accepted_noop() {
    let (_h, addr) = TestHarness::with_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("http://{addr}/api/render-callback"))
        .json(&json!({"jobId": "nope", "status": "succeeded", "assetUrl": "http://v/1.mp4"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["message"], "OK");
}

#[tokio::test]
async fn callback_updates_scene_state() {
    let (harness, addr) = TestHarness::with_server().await;
    let record = harness.store.create("readme".to_string());
    harness.store.set_script(record.id, one_scene_script());
    harness.store.set_scene_job_id(record.id, 1, "job-1");

    let client = reqwest::Client::new();
    let resp = client
        .post(format!("http://{addr}/api/render-callback"))
        .json(&json!({"jobId": "job-1", "status": "succeeded", "assetUrl": "http://v/1.mp4"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let updated = harness.store.get(record.id).unwrap();
    assert_eq!(updated.scenes[0].status, SceneStatus::Ready);
    assert_eq!(updated.scenes[0].asset_url.as_deref(), Some("http://v/1.mp4"));
    // The callback only updates scene state; it never finalizes.
    assert_eq!(updated.status, WorkflowStatus::Analyzing);
    assert!(updated.playback_id.is_none());
}

#[tokio::test]
async fn failed_callback_marks_workflow_error() {
    let (harness, addr) = TestHarness::with_server().await;
    let record = harness.store.create("readme".to_string());
    harness.store.set_script(record.id, one_scene_script());
    harness.store.set_scene_job_id(record.id, 1, "job-1");

    let client = reqwest::Client::new();
    let resp = client
        .post(format!("http://{addr}/api/render-callback"))
        .json(&json!({"jobId": "job-1", "status": "failed", "error": "content policy"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let updated = harness.store.get(record.id).unwrap();
    assert_eq!(updated.scenes[0].status, SceneStatus::Failed);
    assert_eq!(updated.status, WorkflowStatus::Error);
    assert!(updated.error.as_deref().unwrap().contains("content policy"));
}

#[tokio::test]
async fn health_check_is_ok() {
    let (_h, addr) = TestHarness::with_server().await;
    let resp = reqwest::get(format!("http://{addr}/health")).await.unwrap();
    assert_eq!(resp.status(), 200);
}
