//! Run store that keeps one JSON record per run on disk.
//!
//! Each run is written to `<dir>/<run_id>.json` holding the run and all of
//! its steps. Writes go to a temporary file first and are then renamed
//! over the record, so a reader never observes a half-written file.

use crate::persistence::{
    apply_run_status, apply_step_update, new_run, new_step, RunStore, StepUpdate, StoreError,
};
use async_trait::async_trait;
use pl_protocol::run_models::{PipelineRun, RunStatus, RunStep};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

/// On-disk shape of a run record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRecord {
    pub run: PipelineRun,
    #[serde(default)]
    pub steps: Vec<RunStep>,
}

/// Persists runs as JSON files inside a directory.
pub struct FileRunStore {
    dir: PathBuf,
    /// Owning run of each non-terminal step, so step updates find the
    /// record without a directory scan.
    step_index: Mutex<HashMap<Uuid, Uuid>>,
}

impl FileRunStore {
    /// Create a store rooted at `dir`, creating the directory if needed.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| StoreError::Io {
                path: dir.clone(),
                source,
            })?;

        Ok(Self {
            dir,
            step_index: Mutex::new(HashMap::new()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, run_id: Uuid) -> PathBuf {
        self.dir.join(format!("{run_id}.json"))
    }

    /// Load a run record, `Ok(None)` when the file does not exist.
    pub async fn load_record(&self, run_id: Uuid) -> Result<Option<RunRecord>, StoreError> {
        let path = self.record_path(run_id);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(StoreError::Io { path, source }),
        };

        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| StoreError::Serde { path, source })
    }

    async fn require_record(&self, run_id: Uuid) -> Result<RunRecord, StoreError> {
        self.load_record(run_id)
            .await?
            .ok_or(StoreError::RunNotFound(run_id))
    }

    async fn save_record(&self, record: &RunRecord) -> Result<(), StoreError> {
        let path = self.record_path(record.run.id);
        let tmp = path.with_extension("json.tmp");

        let json = serde_json::to_vec_pretty(record).map_err(|source| StoreError::Serde {
            path: path.clone(),
            source,
        })?;
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|source| StoreError::Io {
                path: tmp.clone(),
                source,
            })?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|source| StoreError::Io { path, source })?;

        debug!(run_id = %record.run.id, steps = record.steps.len(), "run record saved");
        Ok(())
    }

    /// All run records in the directory, newest first.
    ///
    /// Files that are not valid records are skipped.
    pub async fn list_runs(&self) -> Result<Vec<PipelineRun>, StoreError> {
        let mut runs: Vec<PipelineRun> = self
            .read_records()
            .await?
            .into_iter()
            .map(|record| record.run)
            .collect();
        runs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(runs)
    }

    async fn read_records(&self) -> Result<Vec<RunRecord>, StoreError> {
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|source| StoreError::Io {
                path: self.dir.clone(),
                source,
            })?;

        let mut records = Vec::new();
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(source) => {
                    return Err(StoreError::Io {
                        path: self.dir.clone(),
                        source,
                    })
                }
            };

            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Ok(bytes) = tokio::fs::read(&path).await else {
                continue;
            };
            match serde_json::from_slice::<RunRecord>(&bytes) {
                Ok(record) => records.push(record),
                Err(e) => debug!(path = %path.display(), error = %e, "skipping unreadable run record"),
            }
        }

        Ok(records)
    }

    /// Find the run owning `step_id`, scanning the records on a cache miss
    /// (steps created by another process or before a reopen).
    async fn run_for_step(&self, step_id: Uuid) -> Result<Uuid, StoreError> {
        if let Some(run_id) = self.step_index.lock().await.get(&step_id).copied() {
            return Ok(run_id);
        }

        let run_id = self
            .read_records()
            .await?
            .into_iter()
            .find(|record| record.steps.iter().any(|s| s.id == step_id))
            .map(|record| record.run.id)
            .ok_or(StoreError::StepNotFound(step_id))?;
        self.step_index.lock().await.insert(step_id, run_id);
        Ok(run_id)
    }
}

#[async_trait]
impl RunStore for FileRunStore {
    async fn create_run(
        &self,
        pipeline_id: &str,
        project_id: &str,
    ) -> Result<PipelineRun, StoreError> {
        let run = new_run(pipeline_id, project_id);
        self.save_record(&RunRecord {
            run: run.clone(),
            steps: Vec::new(),
        })
        .await?;
        Ok(run)
    }

    async fn update_run_status(
        &self,
        run_id: Uuid,
        status: RunStatus,
    ) -> Result<PipelineRun, StoreError> {
        let mut record = self.require_record(run_id).await?;
        apply_run_status(&mut record.run, status)?;
        self.save_record(&record).await?;
        Ok(record.run)
    }

    async fn create_run_step(
        &self,
        run_id: Uuid,
        step_index: usize,
        framework_id: &str,
        label: &str,
    ) -> Result<RunStep, StoreError> {
        let mut record = self.require_record(run_id).await?;
        let step = new_step(run_id, record.steps.len(), step_index, framework_id, label)?;
        record.steps.push(step.clone());
        self.save_record(&record).await?;

        self.step_index.lock().await.insert(step.id, run_id);
        Ok(step)
    }

    async fn update_run_step(
        &self,
        step_id: Uuid,
        update: StepUpdate,
    ) -> Result<RunStep, StoreError> {
        let run_id = self.run_for_step(step_id).await?;
        let mut record = self.require_record(run_id).await?;
        let step = record
            .steps
            .iter_mut()
            .find(|s| s.id == step_id)
            .ok_or(StoreError::StepNotFound(step_id))?;

        apply_step_update(step, update)?;
        let updated = step.clone();
        self.save_record(&record).await?;

        if updated.status.is_terminal() {
            self.step_index.lock().await.remove(&step_id);
        }
        Ok(updated)
    }

    async fn get_run(&self, run_id: Uuid) -> Result<Option<PipelineRun>, StoreError> {
        Ok(self.load_record(run_id).await?.map(|record| record.run))
    }

    async fn list_run_steps(&self, run_id: Uuid) -> Result<Vec<RunStep>, StoreError> {
        Ok(self.require_record(run_id).await?.steps)
    }
}
