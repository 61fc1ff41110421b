//! Deprecated push-callback ingress for render-job completion.
//!
//! Kept for backward compatibility with deployments that register a
//! callback URL when submitting render jobs. Under the per-request
//! credential model the callback cannot recover the credentials needed to
//! merge and publish, so it only updates scene state opportunistically and
//! never drives finalization; the polling loop in the pipeline remains the
//! source of truth.

use crate::server::AppContext;
use crate::store::{SceneStatus, WorkflowStatus};
use axum::{extract::State, routing::post, Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

pub fn callback_routes() -> Router<AppContext> {
    Router::new().route("/render-callback", post(render_callback))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderCallback {
    pub job_id: String,
    pub status: CallbackStatus,
    #[serde(default)]
    pub asset_url: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallbackStatus {
    Succeeded,
    Failed,
}

async fn render_callback(
    State(ctx): State<AppContext>,
    Json(payload): Json<RenderCallback>,
) -> Json<Value> {
    let Some((record, scene_number)) = ctx.store.find_by_job_id(&payload.job_id) else {
        // Unknown job ids are accepted no-ops; the workflow may already have
        // been cleaned up.
        tracing::warn!(job = %payload.job_id, "callback for unknown render job");
        return Json(json!({"message": "OK"}));
    };

    match payload.status {
        CallbackStatus::Succeeded => match payload.asset_url.as_deref() {
            Some(url) => {
                tracing::info!(
                    workflow = %record.id,
                    scene = scene_number,
                    "render callback reported scene ready"
                );
                ctx.store
                    .set_scene_status(record.id, scene_number, SceneStatus::Ready, Some(url));
            }
            None => {
                tracing::warn!(
                    workflow = %record.id,
                    scene = scene_number,
                    "succeeded callback without an asset URL ignored"
                );
            }
        },
        CallbackStatus::Failed => {
            ctx.store
                .set_scene_status(record.id, scene_number, SceneStatus::Failed, None);
            let message = payload
                .error
                .unwrap_or_else(|| format!("scene {scene_number} render failed"));
            ctx.store
                .set_status(record.id, WorkflowStatus::Error, Some(&message));
        }
    }

    Json(json!({"message": "OK"}))
}
