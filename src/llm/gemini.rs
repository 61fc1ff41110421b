//! Google Gemini backend via the `generateContent` REST API.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{
    parse_model_json, script_prompt, validate_script, LlmKind, LlmProvider, ScriptOptions,
    ANALYZE_PROMPT,
};
use crate::error::{Error, Result};
use crate::store::{ReadmeAnalysis, VideoScript};

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

pub struct GeminiProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiProvider {
    pub fn new(model: Option<String>, api_key: String) -> Self {
        Self::with_base_url(model, api_key, API_BASE.to_string())
    }

    /// Point the provider at a different endpoint (used by tests).
    pub fn with_base_url(model: Option<String>, api_key: String, base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("Failed to build HTTP client with timeout: {}", e);
                reqwest::Client::new()
            });

        Self {
            client,
            api_key,
            model: model.unwrap_or_else(|| LlmKind::Gemini.default_model().to_string()),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct GenerateRequest<'a> {
            system_instruction: Content<'a>,
            contents: Vec<Content<'a>>,
        }

        #[derive(Serialize)]
        struct Content<'a> {
            parts: Vec<Part<'a>>,
        }

        #[derive(Serialize)]
        struct Part<'a> {
            text: &'a str,
        }

        #[derive(Deserialize)]
        struct GenerateResponse {
            candidates: Vec<Candidate>,
        }

        #[derive(Deserialize)]
        struct Candidate {
            content: ResponseContent,
        }

        #[derive(Deserialize)]
        struct ResponseContent {
            parts: Vec<ResponsePart>,
        }

        #[derive(Deserialize)]
        struct ResponsePart {
            #[serde(default)]
            text: String,
        }

        let request = GenerateRequest {
            system_instruction: Content {
                parts: vec![Part { text: system }],
            },
            contents: vec![Content {
                parts: vec![Part { text: user }],
            }],
        };

        let response = self
            .client
            .post(format!(
                "{}/models/{}:generateContent",
                self.base_url, self.model
            ))
            .query(&[("key", self.api_key.as_str())])
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::provider(format!(
                "Gemini API error: {status} - {body}"
            )));
        }

        let parsed: GenerateResponse = response.json().await?;
        let text = parsed
            .candidates
            .into_iter()
            .next()
            .map(|candidate| {
                candidate
                    .content
                    .parts
                    .into_iter()
                    .map(|part| part.text)
                    .collect::<String>()
            })
            .unwrap_or_default();

        if text.is_empty() {
            return Err(Error::provider("empty response from Gemini"));
        }
        Ok(text)
    }
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    fn name(&self) -> &'static str {
        "gemini"
    }

    async fn analyze(&self, readme: &str) -> Result<ReadmeAnalysis> {
        let text = self.complete(ANALYZE_PROMPT, readme).await?;
        parse_model_json(&text, "README analysis")
    }

    async fn generate_script(
        &self,
        analysis: &ReadmeAnalysis,
        options: ScriptOptions,
    ) -> Result<VideoScript> {
        let system = script_prompt(options);
        let user = serde_json::to_string_pretty(analysis)
            .map_err(|e| Error::provider(format!("failed to serialize analysis: {e}")))?;
        let text = self.complete(&system, &user).await?;
        let script: VideoScript = parse_model_json(&text, "video script")?;
        validate_script(&script, options)?;
        Ok(script)
    }
}
