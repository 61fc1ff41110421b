use crate::github;
use crate::llm::{self, LlmKind, ScriptOptions, VideoStyle};
use crate::merge::FfmpegMerger;
use crate::pipeline::Pipeline;
use crate::publish::MuxClient;
use crate::render::{KieClient, QualityTier};
use crate::server::AppContext;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

pub fn generate_routes() -> Router<AppContext> {
    Router::new().route("/generate", post(generate))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub source: SourceKind,
    pub content: String,
    pub style: VideoStyle,
    pub duration: u32,
    #[serde(default)]
    pub quality: Option<QualityTier>,
    #[serde(default)]
    pub provider: Option<LlmKind>,
    #[serde(default)]
    pub model: Option<String>,
    pub api_keys: ApiKeys,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Url,
    Text,
}

/// Per-request upstream credentials. All four are required; none are kept
/// beyond the workflow's in-memory lifetime.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiKeys {
    pub kie_api_key: String,
    pub mux_token_id: String,
    pub mux_token_secret: String,
    pub llm_api_key: String,
}

#[derive(Serialize)]
struct GenerateResponse {
    id: Uuid,
    message: &'static str,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

type ApiError = (StatusCode, Json<ErrorBody>);

fn bad_request(error: &str, details: Option<String>) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorBody {
            error: error.to_string(),
            details,
        }),
    )
}

fn validate(request: &GenerateRequest) -> Result<(), String> {
    let mut problems = Vec::new();

    if request.content.trim().is_empty() {
        problems.push("content must not be empty");
    }
    if !matches!(request.duration, 15 | 30 | 60) {
        problems.push("duration must be 15, 30 or 60");
    }
    if request.source == SourceKind::Url
        && !request.content.trim().is_empty()
        && !github::is_valid_github_url(&request.content)
    {
        problems.push("content must be a GitHub repository URL");
    }

    let keys = &request.api_keys;
    if keys.kie_api_key.trim().is_empty() {
        problems.push("kieApiKey is required");
    }
    if keys.mux_token_id.trim().is_empty() {
        problems.push("muxTokenId is required");
    }
    if keys.mux_token_secret.trim().is_empty() {
        problems.push("muxTokenSecret is required");
    }
    if keys.llm_api_key.trim().is_empty() {
        problems.push("llmApiKey is required");
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(problems.join("; "))
    }
}

/// Accept a creation request, start the pipeline detached, and return the
/// workflow id immediately. The response never waits on the pipeline.
async fn generate(
    State(ctx): State<AppContext>,
    payload: Result<Json<GenerateRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<GenerateResponse>), ApiError> {
    let Json(request) =
        payload.map_err(|rejection| bad_request("Invalid request data", Some(rejection.body_text())))?;

    if let Err(details) = validate(&request) {
        return Err(bad_request("Invalid request data", Some(details)));
    }

    let source_text = match request.source {
        SourceKind::Url => github::fetch_readme(&request.content)
            .await
            .map_err(|e| bad_request("Failed to fetch README", Some(e.to_string())))?,
        SourceKind::Text => request.content.clone(),
    };

    let record = ctx.store.create(source_text);
    tracing::info!(workflow = %record.id, "workflow created");

    let provider_kind = request
        .provider
        .unwrap_or(ctx.config.pipeline.default_provider);
    let llm = llm::create_provider(
        provider_kind,
        request.model.clone(),
        request.api_keys.llm_api_key.clone(),
    );
    let renderer = Arc::new(KieClient::new(request.api_keys.kie_api_key.clone()));
    let publisher = Arc::new(
        MuxClient::new(
            request.api_keys.mux_token_id.clone(),
            request.api_keys.mux_token_secret.clone(),
        )
        .with_ready_polling(
            ctx.config.pipeline.publish_poll_attempts,
            ctx.config.pipeline.publish_poll_interval(),
        ),
    );
    let merger = Arc::new(FfmpegMerger::new());

    let options = ScriptOptions {
        style: request.style,
        duration: request.duration,
    };
    let quality = request.quality.unwrap_or_default();

    let _detached = Pipeline::new(
        ctx.store.clone(),
        ctx.config.pipeline.clone(),
        llm,
        renderer,
        publisher,
        merger,
    )
    .spawn(record.id, options, quality);

    Ok((
        StatusCode::ACCEPTED,
        Json(GenerateResponse {
            id: record.id,
            message: "Video generation started",
        }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys() -> ApiKeys {
        ApiKeys {
            kie_api_key: "k".into(),
            mux_token_id: "m".into(),
            mux_token_secret: "s".into(),
            llm_api_key: "l".into(),
        }
    }

    fn request() -> GenerateRequest {
        GenerateRequest {
            source: SourceKind::Text,
            content: "# Project".into(),
            style: VideoStyle::Tech,
            duration: 30,
            quality: None,
            provider: None,
            model: None,
            api_keys: keys(),
        }
    }

    #[test]
    fn validate_accepts_well_formed_request() {
        assert!(validate(&request()).is_ok());
    }

    #[test]
    fn validate_rejects_empty_content() {
        let mut req = request();
        req.content = "   ".into();
        assert!(validate(&req).unwrap_err().contains("content"));
    }

    #[test]
    fn validate_rejects_bad_duration() {
        let mut req = request();
        req.duration = 45;
        assert!(validate(&req).unwrap_err().contains("duration"));
    }

    #[test]
    fn validate_rejects_non_github_url_source() {
        let mut req = request();
        req.source = SourceKind::Url;
        req.content = "https://example.com/owner/repo".into();
        assert!(validate(&req).unwrap_err().contains("GitHub"));
    }

    #[test]
    fn validate_requires_every_credential() {
        for blank in ["kie", "mux_id", "mux_secret", "llm"] {
            let mut req = request();
            match blank {
                "kie" => req.api_keys.kie_api_key = String::new(),
                "mux_id" => req.api_keys.mux_token_id = String::new(),
                "mux_secret" => req.api_keys.mux_token_secret = String::new(),
                _ => req.api_keys.llm_api_key = String::new(),
            }
            assert!(validate(&req).is_err(), "missing {blank} should fail");
        }
    }

    #[test]
    fn request_parses_wire_format() {
        let body = serde_json::json!({
            "source": "text",
            "content": "# Readme",
            "style": "energetic",
            "duration": 60,
            "quality": "pro-hd",
            "provider": "anthropic",
            "apiKeys": {
                "kieApiKey": "a",
                "muxTokenId": "b",
                "muxTokenSecret": "c",
                "llmApiKey": "d"
            }
        });
        let parsed: GenerateRequest = serde_json::from_value(body).unwrap();
        assert_eq!(parsed.style, VideoStyle::Energetic);
        assert_eq!(parsed.quality, Some(QualityTier::ProHd));
        assert_eq!(parsed.provider, Some(LlmKind::Anthropic));
        assert_eq!(parsed.api_keys.mux_token_secret, "c");
    }
}
