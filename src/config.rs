//! Service configuration, loaded from an optional TOML file with serde
//! defaults for everything.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::llm::LlmKind;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub pipeline: PipelineSettings,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Pacing and polling bounds for the pipeline, plus workflow retention.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineSettings {
    /// Delay between consecutive scene-job submissions (upstream courtesy).
    #[serde(default = "default_scene_submit_delay")]
    pub scene_submit_delay_secs: u64,

    /// Polling budget per render job: attempts x interval (default ~10 min).
    #[serde(default = "default_render_poll_attempts")]
    pub render_poll_attempts: u32,

    #[serde(default = "default_render_poll_interval")]
    pub render_poll_interval_secs: u64,

    /// Polling budget for published-asset readiness.
    #[serde(default = "default_publish_poll_attempts")]
    pub publish_poll_attempts: u32,

    #[serde(default = "default_publish_poll_interval")]
    pub publish_poll_interval_secs: u64,

    /// Workflows older than this are swept out of the store, terminal or not.
    #[serde(default = "default_retention")]
    pub retention_secs: u64,

    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,

    /// LLM backend used when the request does not name one.
    #[serde(default = "default_llm_provider")]
    pub default_provider: LlmKind,
}

fn default_scene_submit_delay() -> u64 {
    2
}
fn default_render_poll_attempts() -> u32 {
    60
}
fn default_render_poll_interval() -> u64 {
    10
}
fn default_publish_poll_attempts() -> u32 {
    60
}
fn default_publish_poll_interval() -> u64 {
    3
}
fn default_retention() -> u64 {
    3600
}
fn default_cleanup_interval() -> u64 {
    300
}
fn default_llm_provider() -> LlmKind {
    LlmKind::Openrouter
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            scene_submit_delay_secs: default_scene_submit_delay(),
            render_poll_attempts: default_render_poll_attempts(),
            render_poll_interval_secs: default_render_poll_interval(),
            publish_poll_attempts: default_publish_poll_attempts(),
            publish_poll_interval_secs: default_publish_poll_interval(),
            retention_secs: default_retention(),
            cleanup_interval_secs: default_cleanup_interval(),
            default_provider: default_llm_provider(),
        }
    }
}

impl PipelineSettings {
    pub fn scene_submit_delay(&self) -> Duration {
        Duration::from_secs(self.scene_submit_delay_secs)
    }

    pub fn render_poll_interval(&self) -> Duration {
        Duration::from_secs(self.render_poll_interval_secs)
    }

    pub fn publish_poll_interval(&self) -> Duration {
        Duration::from_secs(self.publish_poll_interval_secs)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}

/// Load configuration from `path`, or fall back to defaults when no path is
/// given or the file does not exist.
pub fn load_config_or_default(path: Option<&Path>) -> Result<Config> {
    let Some(path) = path else {
        return Ok(Config::default());
    };

    if !path.exists() {
        tracing::info!("Config file {:?} not found, using defaults", path);
        return Ok(Config::default());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {path:?}"))?;
    toml::from_str(&content).with_context(|| format!("Failed to parse config file {path:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.pipeline.render_poll_attempts, 60);
        assert_eq!(config.pipeline.render_poll_interval_secs, 10);
        assert_eq!(config.pipeline.scene_submit_delay_secs, 2);
        assert_eq!(config.pipeline.default_provider, LlmKind::Openrouter);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [server]
            port = 9090

            [pipeline]
            render_poll_attempts = 5
            default_provider = "anthropic"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.pipeline.render_poll_attempts, 5);
        assert_eq!(config.pipeline.render_poll_interval_secs, 10);
        assert_eq!(config.pipeline.default_provider, LlmKind::Anthropic);
    }

    #[test]
    fn duration_accessors() {
        let settings = PipelineSettings::default();
        assert_eq!(settings.scene_submit_delay(), Duration::from_secs(2));
        assert_eq!(settings.render_poll_interval(), Duration::from_secs(10));
        assert_eq!(settings.retention(), Duration::from_secs(3600));
    }

    #[test]
    fn empty_toml_is_all_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.pipeline.retention_secs, 3600);
    }
}
