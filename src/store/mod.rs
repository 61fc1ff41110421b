//! In-memory workflow registry with per-record progress broadcasting.
//!
//! The store is the only state shared between request handlers and the
//! pipeline tasks. Each record carries its own broadcast channel; every
//! mutating operation sends the full updated snapshot to current
//! subscribers while the write lock is held, so per-record notifications
//! arrive in mutation order with no interleaved partial updates.
//!
//! Lookup by render job id is a linear scan over all records' scenes. That
//! is fine for the expected handful of concurrent workflows and is the
//! store's documented scaling limit.

mod types;

pub use types::*;

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Buffered snapshots per subscriber before it starts lagging.
const CHANNEL_CAPACITY: usize = 64;

struct Entry {
    record: WorkflowRecord,
    tx: broadcast::Sender<WorkflowRecord>,
}

pub struct WorkflowStore {
    entries: RwLock<HashMap<Uuid, Entry>>,
}

impl WorkflowStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            entries: RwLock::new(HashMap::new()),
        })
    }

    /// Allocate a new record with status `analyzing` and store it.
    pub fn create(&self, source_text: String) -> WorkflowRecord {
        let record = WorkflowRecord::new(source_text);
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        self.entries.write().insert(
            record.id,
            Entry {
                record: record.clone(),
                tx,
            },
        );
        record
    }

    pub fn get(&self, id: Uuid) -> Option<WorkflowRecord> {
        self.entries.read().get(&id).map(|e| e.record.clone())
    }

    /// Apply `f` to the record, then notify subscribers with the updated
    /// snapshot. No-op for unknown ids and for records already in a
    /// terminal state.
    fn mutate<F>(&self, id: Uuid, f: F)
    where
        F: FnOnce(&mut WorkflowRecord),
    {
        let mut entries = self.entries.write();
        let Some(entry) = entries.get_mut(&id) else {
            tracing::debug!(workflow = %id, "mutation on unknown workflow ignored");
            return;
        };
        if entry.record.status.is_terminal() {
            tracing::debug!(workflow = %id, "mutation on terminal workflow ignored");
            return;
        }
        f(&mut entry.record);
        // A send with no subscribers is not an error.
        let _ = entry.tx.send(entry.record.clone());
    }

    pub fn set_status(&self, id: Uuid, status: WorkflowStatus, error: Option<&str>) {
        self.mutate(id, |record| {
            record.status = status;
            if let Some(message) = error {
                record.error = Some(message.to_string());
            }
        });
    }

    pub fn set_analysis(&self, id: Uuid, analysis: ReadmeAnalysis) {
        self.mutate(id, |record| {
            record.analysis = Some(analysis);
        });
    }

    /// Store the script and materialize one pending scene-progress entry per
    /// script scene, in script order.
    pub fn set_script(&self, id: Uuid, script: VideoScript) {
        self.mutate(id, |record| {
            record.scenes = script
                .scenes
                .iter()
                .map(|scene| SceneProgress {
                    scene_number: scene.scene_number,
                    job_id: String::new(),
                    status: SceneStatus::Pending,
                    asset_url: None,
                })
                .collect();
            record.script = Some(script);
        });
    }

    /// Record the submitted render job id and flip the scene to `generating`.
    pub fn set_scene_job_id(&self, id: Uuid, scene_number: u32, job_id: &str) {
        self.mutate(id, |record| {
            if let Some(scene) = record
                .scenes
                .iter_mut()
                .find(|s| s.scene_number == scene_number)
            {
                scene.job_id = job_id.to_string();
                scene.status = SceneStatus::Generating;
            }
        });
    }

    pub fn set_scene_status(
        &self,
        id: Uuid,
        scene_number: u32,
        status: SceneStatus,
        asset_url: Option<&str>,
    ) {
        self.mutate(id, |record| {
            if let Some(scene) = record
                .scenes
                .iter_mut()
                .find(|s| s.scene_number == scene_number)
            {
                scene.status = status;
                if let Some(url) = asset_url {
                    scene.asset_url = Some(url.to_string());
                }
            }
        });
    }

    /// Record the published asset and force the terminal `ready` status.
    pub fn set_result(&self, id: Uuid, playback_id: &str, final_asset_url: Option<&str>) {
        self.mutate(id, |record| {
            record.status = WorkflowStatus::Ready;
            record.playback_id = Some(playback_id.to_string());
            if let Some(url) = final_asset_url {
                record.final_asset_url = Some(url.to_string());
            }
        });
    }

    /// True iff the scene list is non-empty and every scene is `ready`.
    pub fn all_scenes_ready(&self, id: Uuid) -> bool {
        let entries = self.entries.read();
        let Some(entry) = entries.get(&id) else {
            return false;
        };
        !entry.record.scenes.is_empty()
            && entry
                .record
                .scenes
                .iter()
                .all(|s| s.status == SceneStatus::Ready)
    }

    /// Asset URLs sorted by ascending scene number, skipping scenes that
    /// have no URL yet.
    pub fn ordered_scene_asset_urls(&self, id: Uuid) -> Vec<String> {
        let entries = self.entries.read();
        let Some(entry) = entries.get(&id) else {
            return Vec::new();
        };
        let mut scenes: Vec<&SceneProgress> = entry.record.scenes.iter().collect();
        scenes.sort_by_key(|s| s.scene_number);
        scenes
            .into_iter()
            .filter_map(|s| s.asset_url.clone())
            .collect()
    }

    /// Locate the workflow and scene that own a render job id.
    pub fn find_by_job_id(&self, job_id: &str) -> Option<(WorkflowRecord, u32)> {
        let entries = self.entries.read();
        for entry in entries.values() {
            if let Some(scene) = entry.record.scenes.iter().find(|s| s.job_id == job_id) {
                return Some((entry.record.clone(), scene.scene_number));
            }
        }
        None
    }

    /// Subscribe to a workflow's snapshots. Dropping the receiver is the
    /// unsubscribe path; the channel closes when the record is cleaned up.
    pub fn subscribe(&self, id: Uuid) -> Option<broadcast::Receiver<WorkflowRecord>> {
        self.entries.read().get(&id).map(|e| e.tx.subscribe())
    }

    /// Current snapshot plus a subscription, taken under one lock so a
    /// transition cannot slip between the two.
    pub fn watch(&self, id: Uuid) -> Option<(WorkflowRecord, broadcast::Receiver<WorkflowRecord>)> {
        self.entries
            .read()
            .get(&id)
            .map(|e| (e.record.clone(), e.tx.subscribe()))
    }

    /// Remove every record older than `max_age`, regardless of status.
    /// Dropping an entry drops its sender, which terminates all outstanding
    /// subscriptions. Returns the number of records removed.
    pub fn cleanup(&self, max_age: Duration) -> usize {
        let Ok(max_age) = chrono::Duration::from_std(max_age) else {
            return 0;
        };
        let cutoff = chrono::Utc::now() - max_age;
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| entry.record.created_at > cutoff);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

/// Periodically sweep expired workflows out of the store.
pub fn start_cleanup_task(store: Arc<WorkflowStore>, interval: Duration, max_age: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await; // first tick fires immediately
        loop {
            ticker.tick().await;
            let removed = store.cleanup(max_age);
            if removed > 0 {
                tracing::debug!(removed, "cleaned up expired workflows");
            }
        }
    });
}
