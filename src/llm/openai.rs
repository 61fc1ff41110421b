//! OpenAI chat-completions backend.
//!
//! Also the transport for [`super::OpenRouterProvider`], which speaks the
//! same wire protocol against a different endpoint.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{
    parse_model_json, script_prompt, validate_script, LlmKind, LlmProvider, ScriptOptions,
    ANALYZE_PROMPT,
};
use crate::error::{Error, Result};
use crate::store::{ReadmeAnalysis, VideoScript};

const API_BASE: &str = "https://api.openai.com/v1";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    provider_label: &'static str,
}

impl OpenAiProvider {
    pub fn new(model: Option<String>, api_key: String) -> Self {
        let model = model.unwrap_or_else(|| LlmKind::Openai.default_model().to_string());
        Self::for_endpoint(API_BASE, model, api_key, "OpenAI")
    }

    /// Build a client for any OpenAI-compatible chat-completions endpoint.
    /// `provider_label` is used in error messages.
    pub(crate) fn for_endpoint(
        base_url: &str,
        model: String,
        api_key: String,
        provider_label: &'static str,
    ) -> Self {
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
            model,
            base_url: base_url.trim_end_matches('/').to_string(),
            provider_label,
        }
    }

    pub(crate) async fn complete(
        &self,
        system: &str,
        user: &str,
        max_tokens: u32,
    ) -> Result<String> {
        #[derive(Serialize)]
        struct ChatRequest<'a> {
            model: &'a str,
            max_tokens: u32,
            messages: Vec<ChatMessage<'a>>,
        }

        #[derive(Serialize)]
        struct ChatMessage<'a> {
            role: &'static str,
            content: &'a str,
        }

        #[derive(Deserialize)]
        struct ChatResponse {
            choices: Vec<Choice>,
        }

        #[derive(Deserialize)]
        struct Choice {
            message: ResponseMessage,
        }

        #[derive(Deserialize)]
        struct ResponseMessage {
            content: Option<String>,
        }

        let request = ChatRequest {
            model: &self.model,
            max_tokens,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::provider(format!(
                "{} API error: {status} - {body}",
                self.provider_label
            )));
        }

        let parsed: ChatResponse = response.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.is_empty())
            .ok_or_else(|| {
                Error::provider(format!("empty response from {}", self.provider_label))
            })
    }

    pub(crate) async fn run_analyze(&self, readme: &str) -> Result<ReadmeAnalysis> {
        let text = self.complete(ANALYZE_PROMPT, readme, 4096).await?;
        parse_model_json(&text, "README analysis")
    }

    pub(crate) async fn run_generate_script(
        &self,
        analysis: &ReadmeAnalysis,
        options: ScriptOptions,
    ) -> Result<VideoScript> {
        let system = script_prompt(options);
        let user = serde_json::to_string_pretty(analysis)
            .map_err(|e| Error::provider(format!("failed to serialize analysis: {e}")))?;
        let text = self.complete(&system, &user, 8192).await?;
        let script: VideoScript = parse_model_json(&text, "video script")?;
        validate_script(&script, options)?;
        Ok(script)
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn analyze(&self, readme: &str) -> Result<ReadmeAnalysis> {
        self.run_analyze(readme).await
    }

    async fn generate_script(
        &self,
        analysis: &ReadmeAnalysis,
        options: ScriptOptions,
    ) -> Result<VideoScript> {
        self.run_generate_script(analysis, options).await
    }
}
