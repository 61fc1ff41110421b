//! The workflow orchestrator.
//!
//! One [`Pipeline`] instance drives one workflow through
//! `analyzing -> scripting -> generating -> finalizing -> ready`, invoking
//! the capability adapters and writing every transition to the store. It is
//! the sole writer of its record and the error boundary for the whole run:
//! `spawn` launches the pipeline as a detached task whose catch-all turns
//! any stage failure into a terminal `error` status. Nothing escapes to the
//! request handler that started it.
//!
//! Scene render jobs are submitted strictly in ascending scene order with a
//! fixed delay between submissions so the upstream API is not hammered, and
//! awaited in that same order. A later scene finishing first is simply
//! observed later; output order is reasserted by scene number at finalize
//! time regardless. One scene failing terminally aborts the entire workflow
//! and discards any scenes already rendered.

use std::sync::Arc;

use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::PipelineSettings;
use crate::error::{Error, Result};
use crate::llm::{LlmProvider, ScriptOptions};
use crate::merge::MediaMerger;
use crate::publish::AssetPublisher;
use crate::render::{QualityTier, RenderState, SceneRenderer};
use crate::store::{SceneStatus, VideoScript, WorkflowStatus, WorkflowStore};

pub struct Pipeline {
    store: Arc<WorkflowStore>,
    settings: PipelineSettings,
    llm: Box<dyn LlmProvider>,
    renderer: Arc<dyn SceneRenderer>,
    publisher: Arc<dyn AssetPublisher>,
    merger: Arc<dyn MediaMerger>,
}

impl Pipeline {
    pub fn new(
        store: Arc<WorkflowStore>,
        settings: PipelineSettings,
        llm: Box<dyn LlmProvider>,
        renderer: Arc<dyn SceneRenderer>,
        publisher: Arc<dyn AssetPublisher>,
        merger: Arc<dyn MediaMerger>,
    ) -> Self {
        Self {
            store,
            settings,
            llm,
            renderer,
            publisher,
            merger,
        }
    }

    /// Run the workflow on a detached task. Any error is converted into the
    /// workflow's terminal `error` status; the handle is returned for tests
    /// and is safe to drop.
    pub fn spawn(self, id: Uuid, options: ScriptOptions, quality: QualityTier) -> JoinHandle<()> {
        tokio::spawn(async move {
            if let Err(e) = self.run(id, options, quality).await {
                tracing::error!(workflow = %id, "pipeline failed: {e}");
                self.store
                    .set_status(id, WorkflowStatus::Error, Some(&e.to_string()));
            }
        })
    }

    async fn run(&self, id: Uuid, options: ScriptOptions, quality: QualityTier) -> Result<()> {
        let record = self
            .store
            .get(id)
            .ok_or_else(|| Error::not_found(format!("workflow {id}")))?;

        tracing::info!(workflow = %id, provider = self.llm.name(), "analyzing source text");
        self.store.set_status(id, WorkflowStatus::Analyzing, None);
        let analysis = self.llm.analyze(&record.source_text).await?;
        tracing::info!(workflow = %id, project = %analysis.project_name, "analysis complete");
        self.store.set_analysis(id, analysis.clone());

        self.store.set_status(id, WorkflowStatus::Scripting, None);
        let script = self.llm.generate_script(&analysis, options).await?;
        tracing::info!(workflow = %id, scenes = script.scenes.len(), "script generated");
        self.store.set_script(id, script.clone());

        self.store.set_status(id, WorkflowStatus::Generating, None);
        let asset_urls = self.render_scenes(id, &script, quality).await?;

        self.store.set_status(id, WorkflowStatus::Finalizing, None);
        self.finalize(id, asset_urls).await
    }

    /// Submit every scene in ascending order, then await them in that same
    /// order. Fail-fast: the first scene to fail terminally aborts the run.
    async fn render_scenes(
        &self,
        id: Uuid,
        script: &VideoScript,
        quality: QualityTier,
    ) -> Result<Vec<String>> {
        let mut jobs = Vec::with_capacity(script.scenes.len());
        for scene in &script.scenes {
            let job_id = self.renderer.submit(&scene.prompt, quality).await?;
            tracing::info!(
                workflow = %id,
                scene = scene.scene_number,
                job = %job_id,
                "render job submitted"
            );
            self.store.set_scene_job_id(id, scene.scene_number, &job_id);
            jobs.push((scene.scene_number, job_id));
            tokio::time::sleep(self.settings.scene_submit_delay()).await;
        }

        let mut asset_urls = Vec::with_capacity(jobs.len());
        for (scene_number, job_id) in jobs {
            match self.await_render(&job_id).await {
                Ok(url) => {
                    self.store
                        .set_scene_status(id, scene_number, SceneStatus::Ready, Some(&url));
                    tracing::info!(workflow = %id, scene = scene_number, "scene ready");
                    asset_urls.push(url);
                }
                Err(e) => {
                    self.store
                        .set_scene_status(id, scene_number, SceneStatus::Failed, None);
                    let message = format!("scene {scene_number} render failed: {e}");
                    return Err(match e {
                        Error::Timeout(_) => Error::timeout(message),
                        _ => Error::provider(message),
                    });
                }
            }
        }
        Ok(asset_urls)
    }

    /// Poll one render job to a terminal state within the configured budget.
    /// A transport error mid-poll is indistinguishable from "still pending".
    async fn await_render(&self, job_id: &str) -> Result<String> {
        for attempt in 1..=self.settings.render_poll_attempts {
            match self.renderer.poll(job_id).await {
                Ok(status) => match status.state {
                    RenderState::Succeeded => {
                        if let Some(url) = status.asset_url {
                            return Ok(url);
                        }
                        // Succeeded but the asset URL has not propagated yet.
                        tracing::warn!(job = %job_id, "job succeeded without an asset URL yet");
                    }
                    RenderState::Failed => {
                        return Err(Error::provider(
                            status.error.unwrap_or_else(|| "render job failed".to_string()),
                        ));
                    }
                    RenderState::Pending | RenderState::Processing => {
                        tracing::debug!(job = %job_id, attempt, "render job still running");
                    }
                },
                Err(e) => {
                    tracing::warn!(job = %job_id, attempt, "poll failed, treating as pending: {e}");
                }
            }
            tokio::time::sleep(self.settings.render_poll_interval()).await;
        }

        Err(Error::timeout(format!(
            "render job {job_id} did not finish within {} attempts",
            self.settings.render_poll_attempts
        )))
    }

    /// Merge (when there is more than one scene) and publish. The merged
    /// local file is released whether publishing succeeds or not.
    async fn finalize(&self, id: Uuid, asset_urls: Vec<String>) -> Result<()> {
        if asset_urls.is_empty() {
            return Err(Error::provider("no scene assets to publish"));
        }

        let asset = if asset_urls.len() > 1 {
            let merged = self.merger.merge(&asset_urls).await?;
            tracing::info!(workflow = %id, path = %merged.display(), "scenes merged");
            let published = self.publisher.publish_from_file(&merged).await;
            self.merger.cleanup(&merged).await;
            published?
        } else {
            self.publisher.publish_from_url(&asset_urls[0]).await?
        };

        tracing::info!(workflow = %id, asset = %asset.asset_id, "asset published");
        self.publisher.wait_until_ready(&asset.asset_id).await?;

        self.store
            .set_result(id, &asset.playback_id, asset_urls.first().map(String::as_str));
        tracing::info!(workflow = %id, playback = %asset.playback_id, "workflow ready");
        Ok(())
    }
}
