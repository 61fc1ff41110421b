use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One end-to-end run of README -> analysis -> script -> rendered scenes ->
/// published video. Mutable fields are written only by the owning pipeline
/// task; everyone else sees cloned snapshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowRecord {
    pub id: Uuid,
    pub status: WorkflowStatus,
    pub source_text: String,
    pub analysis: Option<ReadmeAnalysis>,
    pub script: Option<VideoScript>,
    pub scenes: Vec<SceneProgress>,
    pub final_asset_url: Option<String>,
    pub playback_id: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl WorkflowRecord {
    pub fn new(source_text: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            status: WorkflowStatus::Analyzing,
            source_text,
            analysis: None,
            script: None,
            scenes: Vec::new(),
            final_asset_url: None,
            playback_id: None,
            error: None,
            created_at: Utc::now(),
        }
    }
}

/// Workflow stages, a strict forward machine. `Error` is reachable from any
/// non-terminal state; `Ready` and `Error` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowStatus {
    Analyzing,
    Scripting,
    Generating,
    Finalizing,
    Ready,
    Error,
}

impl WorkflowStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkflowStatus::Ready | WorkflowStatus::Error)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SceneStatus {
    Pending,
    Generating,
    Ready,
    Failed,
}

/// Per-scene render progress. `scene_number` tracks the script scene by
/// value, not by reference; `job_id` stays empty until the render job is
/// submitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneProgress {
    pub scene_number: u32,
    pub job_id: String,
    pub status: SceneStatus,
    pub asset_url: Option<String>,
}

/// Structured summary extracted from the README by the analysis stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadmeAnalysis {
    pub project_name: String,
    pub tagline: String,
    pub problem: String,
    pub solution: String,
    pub features: Vec<String>,
    pub tech_stack: Vec<String>,
    pub target_audience: String,
}

/// Scene-by-scene plan produced by the scripting stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoScript {
    pub title: String,
    pub total_duration: u32,
    pub scenes: Vec<Scene>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scene {
    /// 1-based, contiguous across the script.
    pub scene_number: u32,
    /// Target length in seconds.
    pub duration: u32,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub narration_text: Option<String>,
    /// Generation prompt handed to the render backend.
    pub prompt: String,
}
