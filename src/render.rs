//! Text-to-video render jobs via the Kie.ai jobs API.
//!
//! Rendering is asynchronous on the upstream side: `submit` returns a job id
//! and the caller polls `poll` until the job reaches a terminal state. The
//! upstream API spells task ids, states, and result URLs several different
//! ways depending on model and account tier, so parsing is deliberately
//! tolerant and normalizes everything into [`RenderJobStatus`].
//!
//! Requests are rate limited with a token bucket so that a burst of scene
//! submissions cannot trip upstream throttling.

use std::num::NonZeroU32;
use std::time::Duration;

use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

const KIE_API_BASE: &str = "https://api.kie.ai/api/v1/jobs";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Render quality tier, mapped to an upstream model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QualityTier {
    #[default]
    Base,
    Pro,
    ProHd,
}

impl QualityTier {
    fn model(&self) -> &'static str {
        match self {
            QualityTier::Base => "sora-2-text-to-video",
            QualityTier::Pro | QualityTier::ProHd => "sora-2-pro-text-to-video",
        }
    }

    fn size(&self) -> Option<&'static str> {
        match self {
            QualityTier::Base => None,
            QualityTier::Pro => Some("standard"),
            QualityTier::ProHd => Some("high"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderState {
    Pending,
    Processing,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone)]
pub struct RenderJobStatus {
    pub state: RenderState,
    pub asset_url: Option<String>,
    pub error: Option<String>,
}

/// Async trait for the scene render backend.
#[async_trait]
pub trait SceneRenderer: Send + Sync {
    /// Submit a render job. Returns the upstream job id.
    async fn submit(&self, prompt: &str, quality: QualityTier) -> Result<String>;

    /// Fetch the current state of a job. Repeated polling is the caller's
    /// responsibility.
    async fn poll(&self, job_id: &str) -> Result<RenderJobStatus>;
}

pub struct KieClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    rate_limiter: RateLimiter<
        governor::state::NotKeyed,
        governor::state::InMemoryState,
        governor::clock::DefaultClock,
    >,
}

impl KieClient {
    /// Rate limiting is configured at 2 requests per second.
    pub fn new(api_key: String) -> Self {
        Self::with_base_url(api_key, KIE_API_BASE.to_string())
    }

    /// Point the client at a different endpoint (used by tests).
    pub fn with_base_url(api_key: String, base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("Failed to build HTTP client with timeout: {}", e);
                reqwest::Client::new()
            });

        let quota = Quota::per_second(NonZeroU32::new(2).unwrap());

        Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            rate_limiter: RateLimiter::direct(quota),
        }
    }
}

#[async_trait]
impl SceneRenderer for KieClient {
    async fn submit(&self, prompt: &str, quality: QualityTier) -> Result<String> {
        #[derive(Serialize)]
        struct CreateTaskRequest<'a> {
            model: &'static str,
            input: TaskInput<'a>,
        }

        #[derive(Serialize)]
        struct TaskInput<'a> {
            prompt: &'a str,
            aspect_ratio: &'static str,
            n_frames: &'static str,
            remove_watermark: bool,
            #[serde(skip_serializing_if = "Option::is_none")]
            size: Option<&'static str>,
        }

        self.rate_limiter.until_ready().await;

        let request = CreateTaskRequest {
            model: quality.model(),
            input: TaskInput {
                prompt,
                aspect_ratio: "landscape",
                n_frames: "15",
                remove_watermark: true,
                size: quality.size(),
            },
        };

        tracing::debug!(
            model = request.model,
            prompt_len = prompt.len(),
            "submitting render job"
        );

        let response = self
            .client
            .post(format!("{}/createTask", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::provider(format!(
                "render API error: {status} - {body}"
            )));
        }

        let body: Value = response.json().await?;
        extract_job_id(&body)
            .ok_or_else(|| Error::provider(format!("no job id in render response: {body}")))
    }

    async fn poll(&self, job_id: &str) -> Result<RenderJobStatus> {
        self.rate_limiter.until_ready().await;

        let response = self
            .client
            .get(format!("{}/recordInfo", self.base_url))
            .query(&[("taskId", job_id)])
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::provider(format!(
                "render API error: {status} - {body}"
            )));
        }

        let body: Value = response.json().await?;
        Ok(parse_record_info(&body))
    }
}

/// The create-task response carries the job id under one of several keys
/// depending on the upstream model.
fn extract_job_id(body: &Value) -> Option<String> {
    let candidates = [
        body.get("taskId"),
        body.get("task_id"),
        body.get("id"),
        body.get("data").and_then(|d| d.get("taskId")),
    ];
    candidates
        .into_iter()
        .flatten()
        .find_map(|v| v.as_str())
        .map(str::to_string)
}

fn parse_record_info(body: &Value) -> RenderJobStatus {
    let data = body.get("data").unwrap_or(body);

    let raw_state = data
        .get("state")
        .or_else(|| data.get("status"))
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_lowercase();

    let state = match raw_state.as_str() {
        "success" | "succeed" | "succeeded" | "completed" | "complete" => RenderState::Succeeded,
        "fail" | "failed" => RenderState::Failed,
        "processing" | "running" | "generating" => RenderState::Processing,
        _ => RenderState::Pending,
    };

    let asset_url = if state == RenderState::Succeeded {
        extract_asset_url(data)
    } else {
        None
    };

    let error = ["failMsg", "error", "fail_msg"]
        .iter()
        .find_map(|key| data.get(*key))
        .and_then(|v| v.as_str())
        .map(str::to_string);

    RenderJobStatus {
        state,
        asset_url,
        error,
    }
}

/// Successful jobs put the asset URL inside `resultJson` (sometimes a JSON
/// string, sometimes an object), with flat fallbacks beside it.
fn extract_asset_url(data: &Value) -> Option<String> {
    if let Some(result_json) = data.get("resultJson") {
        let parsed: Option<Value> = match result_json {
            Value::String(s) => serde_json::from_str(s).ok(),
            other => Some(other.clone()),
        };
        if let Some(result) = parsed {
            let from_list = ["resultUrls", "result_urls", "video_urls"]
                .iter()
                .find_map(|key| result.get(*key))
                .and_then(|urls| urls.get(0))
                .and_then(|v| v.as_str())
                .map(str::to_string);
            let url = from_list.or_else(|| {
                ["videoUrl", "video_url"]
                    .iter()
                    .find_map(|key| result.get(*key))
                    .and_then(|v| v.as_str())
                    .map(str::to_string)
            });
            if url.is_some() {
                return url;
            }
        }
    }

    ["videoUrl", "video_url"]
        .iter()
        .find_map(|key| data.get(*key))
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .or_else(|| {
            data.get("output")
                .and_then(|o| o.get("videoUrl").or_else(|| o.get("video_url")))
                .and_then(|v| v.as_str())
                .map(str::to_string)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn quality_tier_model_mapping() {
        assert_eq!(QualityTier::Base.model(), "sora-2-text-to-video");
        assert_eq!(QualityTier::Pro.model(), "sora-2-pro-text-to-video");
        assert_eq!(QualityTier::ProHd.model(), "sora-2-pro-text-to-video");
        assert_eq!(QualityTier::Base.size(), None);
        assert_eq!(QualityTier::Pro.size(), Some("standard"));
        assert_eq!(QualityTier::ProHd.size(), Some("high"));
    }

    #[test]
    fn quality_tier_wire_names() {
        assert_eq!(
            serde_json::to_string(&QualityTier::ProHd).unwrap(),
            "\"pro-hd\""
        );
        let parsed: QualityTier = serde_json::from_str("\"base\"").unwrap();
        assert_eq!(parsed, QualityTier::Base);
    }

    #[test]
    fn extract_job_id_variants() {
        assert_eq!(
            extract_job_id(&json!({"taskId": "a"})).as_deref(),
            Some("a")
        );
        assert_eq!(
            extract_job_id(&json!({"task_id": "b"})).as_deref(),
            Some("b")
        );
        assert_eq!(extract_job_id(&json!({"id": "c"})).as_deref(), Some("c"));
        assert_eq!(
            extract_job_id(&json!({"data": {"taskId": "d"}})).as_deref(),
            Some("d")
        );
        assert_eq!(extract_job_id(&json!({"message": "ok"})), None);
    }

    #[test]
    fn parse_record_info_success_with_result_json_string() {
        let body = json!({
            "data": {
                "state": "success",
                "resultJson": "{\"resultUrls\": [\"http://v/1.mp4\"]}"
            }
        });
        let status = parse_record_info(&body);
        assert_eq!(status.state, RenderState::Succeeded);
        assert_eq!(status.asset_url.as_deref(), Some("http://v/1.mp4"));
    }

    #[test]
    fn parse_record_info_success_with_flat_url() {
        let body = json!({
            "data": {"status": "Succeed", "videoUrl": "http://v/2.mp4"}
        });
        let status = parse_record_info(&body);
        assert_eq!(status.state, RenderState::Succeeded);
        assert_eq!(status.asset_url.as_deref(), Some("http://v/2.mp4"));
    }

    #[test]
    fn parse_record_info_failed_with_message() {
        let body = json!({
            "data": {"state": "failed", "failMsg": "content policy"}
        });
        let status = parse_record_info(&body);
        assert_eq!(status.state, RenderState::Failed);
        assert_eq!(status.error.as_deref(), Some("content policy"));
        assert!(status.asset_url.is_none());
    }

    #[test]
    fn parse_record_info_unknown_state_is_pending() {
        let status = parse_record_info(&json!({"data": {"state": "queueing"}}));
        assert_eq!(status.state, RenderState::Pending);

        let status = parse_record_info(&json!({"data": {}}));
        assert_eq!(status.state, RenderState::Pending);
    }

    #[test]
    fn parse_record_info_without_data_wrapper() {
        let status = parse_record_info(&json!({"state": "processing"}));
        assert_eq!(status.state, RenderState::Processing);
    }
}
