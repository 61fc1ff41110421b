//! LLM backends for README analysis and script generation.
//!
//! This module defines the [`LlmProvider`] trait that all language-model
//! backends (Anthropic, OpenAI, OpenRouter, Gemini) implement, along with
//! the prompts shared by every backend and a factory keyed by [`LlmKind`].
//!
//! Every backend is expected to return bare JSON; models that wrap their
//! output in Markdown code fences are tolerated by stripping the fences
//! before parsing. Output that still fails to parse, or a script that does
//! not match the requested scene plan, is a provider error.

pub mod anthropic;
pub mod gemini;
pub mod openai;
pub mod openrouter;

pub use anthropic::AnthropicProvider;
pub use gemini::GeminiProvider;
pub use openai::OpenAiProvider;
pub use openrouter::OpenRouterProvider;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::store::{ReadmeAnalysis, VideoScript};

/// Fixed length of one rendered scene in seconds. The script planner slices
/// the requested total duration into scenes of this size.
pub const SCENE_LENGTH_SECS: u32 = 15;

/// Which LLM backend serves a workflow, selected per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmKind {
    Anthropic,
    Openai,
    Openrouter,
    Gemini,
}

impl LlmKind {
    /// Model used when the request does not pin one.
    pub fn default_model(&self) -> &'static str {
        match self {
            LlmKind::Anthropic => "claude-sonnet-4-5-20250929",
            LlmKind::Openai => "gpt-5.2",
            LlmKind::Openrouter => "google/gemini-2.0-flash-exp:free",
            LlmKind::Gemini => "gemini-2.5-flash",
        }
    }
}

/// Visual/narration register for the generated script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoStyle {
    Tech,
    Minimal,
    Energetic,
}

/// Caller options for the scripting stage.
#[derive(Debug, Clone, Copy)]
pub struct ScriptOptions {
    pub style: VideoStyle,
    /// Total video length in seconds (15, 30 or 60).
    pub duration: u32,
}

impl ScriptOptions {
    pub fn scene_count(&self) -> u32 {
        self.duration.div_ceil(SCENE_LENGTH_SECS)
    }
}

/// Async trait implemented by every LLM backend.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Short, lowercase identifier for this backend (e.g. `"anthropic"`).
    fn name(&self) -> &'static str;

    /// Extract a structured summary from raw README text.
    async fn analyze(&self, readme: &str) -> Result<ReadmeAnalysis>;

    /// Turn an analysis into an ordered scene plan. The returned script has
    /// exactly `ceil(duration / 15)` scenes numbered contiguously from 1.
    async fn generate_script(
        &self,
        analysis: &ReadmeAnalysis,
        options: ScriptOptions,
    ) -> Result<VideoScript>;
}

/// Build the backend selected by `kind`, using its default model when the
/// request does not specify one.
pub fn create_provider(
    kind: LlmKind,
    model: Option<String>,
    api_key: String,
) -> Box<dyn LlmProvider> {
    match kind {
        LlmKind::Anthropic => Box::new(AnthropicProvider::new(model, api_key)),
        LlmKind::Openai => Box::new(OpenAiProvider::new(model, api_key)),
        LlmKind::Openrouter => Box::new(OpenRouterProvider::new(model, api_key)),
        LlmKind::Gemini => Box::new(GeminiProvider::new(model, api_key)),
    }
}

/// Parse a model response as JSON, tolerating Markdown code fences.
pub(crate) fn parse_model_json<T: DeserializeOwned>(raw: &str, what: &str) -> Result<T> {
    let cleaned = raw.replace("```json", "").replace("```", "");
    serde_json::from_str(cleaned.trim())
        .map_err(|e| Error::provider(format!("failed to parse {what} response: {e}")))
}

/// Reject scripts that do not match the requested scene plan.
pub(crate) fn validate_script(script: &VideoScript, options: ScriptOptions) -> Result<()> {
    let expected = options.scene_count() as usize;
    if script.scenes.len() != expected {
        return Err(Error::provider(format!(
            "script has {} scenes, expected {expected}",
            script.scenes.len()
        )));
    }
    for (index, scene) in script.scenes.iter().enumerate() {
        let expected_number = index as u32 + 1;
        if scene.scene_number != expected_number {
            return Err(Error::provider(format!(
                "script scene numbering is not contiguous: got {} at position {expected_number}",
                scene.scene_number
            )));
        }
    }
    Ok(())
}

pub(crate) const ANALYZE_PROMPT: &str = r#"Analyze this README and extract structured information for creating a promotional video.

Return a JSON object with this exact structure:
{
  "projectName": "Name of the project",
  "tagline": "A catchy one-line description (max 10 words)",
  "problem": "The problem this project solves (1-2 sentences)",
  "solution": "How the project solves it (1-2 sentences)",
  "features": ["Feature 1", "Feature 2", "Feature 3"] (max 5 key features),
  "techStack": ["Tech1", "Tech2"] (main technologies used),
  "targetAudience": "Who would benefit from this project"
}

Only return valid JSON, no markdown formatting or explanation."#;

struct StyleGuide {
    visual: &'static str,
    narrator: &'static str,
    audio: &'static str,
}

fn style_guide(style: VideoStyle) -> StyleGuide {
    match style {
        VideoStyle::Tech => StyleGuide {
            visual: "Dynamic tech-focused visuals: sleek interfaces on screens, futuristic holographic displays, abstract data visualizations, clean modern aesthetics with blue and purple tones.",
            narrator: "A confident tech-savvy narrator with clear, enthusiastic voice explaining the app features.",
            audio: "Modern electronic ambient music, subtle tech sound effects, keyboard clicks, notification sounds.",
        },
        VideoStyle::Minimal => StyleGuide {
            visual: "Clean, minimalist visuals: bright white spaces, elegant smooth animations, soft gradients, calm and professional atmosphere.",
            narrator: "A calm, professional narrator with warm, reassuring voice describing the simplicity and elegance.",
            audio: "Soft piano or acoustic background music, gentle ambient sounds, peaceful atmosphere.",
        },
        VideoStyle::Energetic => StyleGuide {
            visual: "Vibrant, high-energy visuals: bold colors, dynamic camera movements, exciting transitions, celebratory and inspiring atmosphere.",
            narrator: "An energetic, excited narrator with dynamic voice showcasing amazing features.",
            audio: "Upbeat electronic music, exciting sound effects, dynamic whooshes and impacts.",
        },
    }
}

fn narrative_arc(scene_count: u32) -> &'static str {
    match scene_count {
        1 => "Scene 1 (COMPLETE): Create a compelling 15-second overview that hooks attention, briefly introduces the problem, presents the app as the solution, and ends with a strong call-to-action. Pack maximum impact into this single scene.",
        2 => "Scene 1 (HOOK + PROBLEM): Grab attention, introduce the problem the app solves, show pain points.\nScene 2 (SOLUTION + CTA): Present the app as the solution, highlight key features, end with inspiring call-to-action.",
        _ => "Scene 1 (HOOK): Grab attention with a striking opening, introduce the core concept.\nScene 2 (PROBLEM): Present the problem/challenge that users face, build tension.\nScene 3 (SOLUTION): Introduce the app as the solution, show how it works visually.\nScene 4 (FEATURES + CTA): Highlight 2-3 key features, end with inspiring call-to-action and emotional payoff.",
    }
}

/// System prompt for the scripting stage.
pub(crate) fn script_prompt(options: ScriptOptions) -> String {
    let scene_count = options.scene_count();
    let style = style_guide(options.style);

    let scene_structure = (1..=scene_count)
        .map(|n| {
            format!(
                r#"    {{
      "sceneNumber": {n},
      "duration": {SCENE_LENGTH_SECS},
      "description": "What happens on screen in scene {n}",
      "narrationText": "What the narrator says in scene {n} (2-3 sentences)",
      "prompt": "Detailed prompt for scene {n} with narration and audio"
    }}"#
            )
        })
        .collect::<Vec<_>>()
        .join(",\n");

    format!(
        r#"Create a promotional and explanatory video script based on the project analysis provided.

PURPOSE: Create a video that BOTH promotes the app AND explains its key features. The video must have:
1. A NARRATOR speaking throughout, explaining the app
2. Visual demonstrations of the concepts
3. Background music and sound effects
4. A clear NARRATIVE ARC across all scenes

Requirements:
- Create exactly {scene_count} scenes (each ~{SCENE_LENGTH_SECS} seconds)
- Total duration: approximately {duration} seconds
- Visual Style: {visual}
- Narration Style: {narrator}
- Audio Atmosphere: {audio}

NARRATIVE ARC (follow this structure):
{arc}

Return a JSON object with this exact structure:
{{
  "title": "Video title",
  "totalDuration": {duration},
  "scenes": [
{scene_structure}
  ]
}}

CRITICAL - Each scene's prompt MUST include these AUDIO elements:
1. A NARRATOR/PRESENTER describing the app (describe their voice, tone, what they're saying)
2. Background MUSIC style (electronic, orchestral, ambient, etc.) - CONSISTENT across all scenes
3. Sound EFFECTS that match the visuals (clicks, whooshes, notifications, etc.)

IMPORTANT for multi-scene coherence:
- Use the SAME narrator voice style across all scenes
- Keep the SAME music style/mood throughout (builds intensity toward the end)
- Each scene should flow naturally into the next
- The narration should tell a COMPLETE STORY across all scenes
- Visual style should be consistent but each scene has unique content

For each prompt:
- Be specific and descriptive (80-120 words)
- ALWAYS include narrator speaking and what they say
- Include camera movement (slow zoom, pan, tracking shot)
- Describe lighting and atmosphere
- Specify the music mood and sound effects
- Do NOT include on-screen text or typography
- Use abstract/metaphorical visuals to represent app concepts

CRITICAL - Content Policy (to avoid AI video generation rejection):
- NEVER mention brand names, company names, or product names in visuals
- NEVER reference copyrighted characters, logos, or intellectual property
- NEVER describe specific real-world products or interfaces
- Use generic terms: "smartphone" not a phone brand, "laptop" not a laptop brand
- The narrator CAN mention the app name, but visuals must be abstract
- Avoid references to movies, games, TV shows, or celebrities
- Use generic descriptions: "developer working", "abstract data flow", "futuristic dashboard"

Only return valid JSON, no markdown formatting or explanation."#,
        duration = options.duration,
        visual = style.visual,
        narrator = style.narrator,
        audio = style.audio,
        arc = narrative_arc(scene_count),
    )
}
