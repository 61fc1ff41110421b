//! Anthropic messages-API backend.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{
    parse_model_json, script_prompt, validate_script, LlmKind, LlmProvider, ScriptOptions,
    ANALYZE_PROMPT,
};
use crate::error::{Error, Result};
use crate::store::{ReadmeAnalysis, VideoScript};

const API_BASE: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

pub struct AnthropicProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl AnthropicProvider {
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
            model: model.unwrap_or_else(|| LlmKind::Anthropic.default_model().to_string()),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn complete(&self, system: &str, user: &str, max_tokens: u32) -> Result<String> {
        #[derive(Serialize)]
        struct MessagesRequest<'a> {
            model: &'a str,
            max_tokens: u32,
            system: &'a str,
            messages: Vec<Message<'a>>,
        }

        #[derive(Serialize)]
        struct Message<'a> {
            role: &'static str,
            content: &'a str,
        }

        #[derive(Deserialize)]
        struct MessagesResponse {
            content: Vec<ContentBlock>,
        }

        #[derive(Deserialize)]
        struct ContentBlock {
            #[serde(rename = "type")]
            kind: String,
            #[serde(default)]
            text: String,
        }

        let request = MessagesRequest {
            model: &self.model,
            max_tokens,
            system,
            messages: vec![Message {
                role: "user",
                content: user,
            }],
        };

        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::provider(format!(
                "Anthropic API error: {status} - {body}"
            )));
        }

        let parsed: MessagesResponse = response.json().await?;
        parsed
            .content
            .into_iter()
            .find(|block| block.kind == "text")
            .map(|block| block.text)
            .ok_or_else(|| Error::provider("unexpected response type from Anthropic"))
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    async fn analyze(&self, readme: &str) -> Result<ReadmeAnalysis> {
        let text = self.complete(ANALYZE_PROMPT, readme, 2048).await?;
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
        let text = self.complete(&system, &user, 4096).await?;
        let script: VideoScript = parse_model_json(&text, "video script")?;
        validate_script(&script, options)?;
        Ok(script)
    }
}
