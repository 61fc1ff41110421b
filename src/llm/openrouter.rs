//! OpenRouter backend: OpenAI-compatible chat completions against the
//! OpenRouter gateway, which fronts free-tier and commercial models alike.

use async_trait::async_trait;

use super::openai::OpenAiProvider;
use super::{LlmKind, LlmProvider, ScriptOptions};
use crate::error::Result;
use crate::store::{ReadmeAnalysis, VideoScript};

const API_BASE: &str = "https://openrouter.ai/api/v1";

pub struct OpenRouterProvider(OpenAiProvider);

impl OpenRouterProvider {
    pub fn new(model: Option<String>, api_key: String) -> Self {
        let model = model.unwrap_or_else(|| LlmKind::Openrouter.default_model().to_string());
        Self(OpenAiProvider::for_endpoint(
            API_BASE,
            model,
            api_key,
            "OpenRouter",
        ))
    }
}

#[async_trait]
impl LlmProvider for OpenRouterProvider {
    fn name(&self) -> &'static str {
        "openrouter"
    }

    async fn analyze(&self, readme: &str) -> Result<ReadmeAnalysis> {
        self.0.run_analyze(readme).await
    }

    async fn generate_script(
        &self,
        analysis: &ReadmeAnalysis,
        options: ScriptOptions,
    ) -> Result<VideoScript> {
        self.0.run_generate_script(analysis, options).await
    }
}
