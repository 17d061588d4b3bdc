//! Run tracking: step records, output metadata and named outputs.
//!
//! Every run gets a directory `<artifacts>/runs/<run_name>/` holding
//! `run.json` (the [`RunRecord`]) and one JSON file per saved step output.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::PipelineError;
use super::options::{PipelineKind, RunOptions};

/// Receives metadata describing a step's named outputs.
///
/// Recording metadata never fails the step that produced it.
pub trait MetadataSink: Send + Sync {
    fn add_output_metadata(&self, output_name: &str, metadata: Value);
}

/// Final state of a run or step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Running => write!(f, "running"),
            RunStatus::Completed => write!(f, "completed"),
            RunStatus::Failed => write!(f, "failed"),
        }
    }
}

/// What happened in one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub name: String,
    pub status: RunStatus,
    /// Output came from the step cache.
    pub cached: bool,
    pub duration_ms: u64,
    /// Metadata per output name.
    pub outputs: BTreeMap<String, Value>,
    pub error: Option<String>,
}

/// Persistent description of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_name: String,
    pub pipeline: PipelineKind,
    pub enable_cache: bool,
    pub config_path: PathBuf,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub steps: Vec<StepRecord>,
    pub error: Option<String>,
}

impl RunRecord {
    pub fn step(&self, name: &str) -> Option<&StepRecord> {
        self.steps.iter().find(|s| s.name == name)
    }
}

/// Tracks one pipeline run.
pub struct RunTracker {
    run_dir: PathBuf,
    record: Mutex<RunRecord>,
}

impl RunTracker {
    pub fn new(artifact_root: &Path, pipeline: PipelineKind, options: &RunOptions) -> Self {
        Self {
            run_dir: artifact_root.join("runs").join(&options.run_name),
            record: Mutex::new(RunRecord {
                run_name: options.run_name.clone(),
                pipeline,
                enable_cache: options.enable_cache,
                config_path: options.config_path.clone(),
                status: RunStatus::Running,
                started_at: Utc::now(),
                finished_at: None,
                steps: Vec::new(),
                error: None,
            }),
        }
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    /// Starts timing a step. Metadata added through the returned context is
    /// attached to the step when it completes or fails.
    pub fn start_step(&self, name: impl Into<String>) -> StepContext<'_> {
        let name = name.into();
        tracing::info!(step = %name, "Step started");
        StepContext {
            tracker: self,
            name,
            started: Instant::now(),
            outputs: Mutex::new(BTreeMap::new()),
        }
    }

    /// Snapshot of the run record.
    pub fn record(&self) -> RunRecord {
        self.lock().clone()
    }

    /// Writes a named output of the run as pretty JSON.
    pub async fn save_output<T: Serialize>(
        &self,
        output_name: &str,
        value: &T,
    ) -> Result<PathBuf, PipelineError> {
        tokio::fs::create_dir_all(&self.run_dir).await?;
        let path = self.run_dir.join(format!("{}.json", output_name));
        let json = serde_json::to_vec_pretty(value)?;
        tokio::fs::write(&path, json).await?;
        tracing::debug!(output = output_name, path = %path.display(), "Saved output");
        Ok(path)
    }

    /// Marks the run completed and persists `run.json`.
    pub async fn complete(&self) -> Result<RunRecord, PipelineError> {
        self.finish(RunStatus::Completed, None).await
    }

    /// Marks the run failed and persists `run.json`.
    pub async fn fail(&self, error: &PipelineError) -> Result<RunRecord, PipelineError> {
        self.finish(RunStatus::Failed, Some(error.to_string())).await
    }

    async fn finish(
        &self,
        status: RunStatus,
        error: Option<String>,
    ) -> Result<RunRecord, PipelineError> {
        let record = {
            let mut record = self.lock();
            record.status = status;
            record.finished_at = Some(Utc::now());
            record.error = error;
            record.clone()
        };

        self.save_output("run", &record).await?;
        tracing::info!(run = %record.run_name, status = %record.status, "Run finished");
        Ok(record)
    }

    fn push_step(&self, step: StepRecord) {
        self.lock().steps.push(step);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RunRecord> {
        // A poisoned record is still the best description of the run.
        self.record.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// A step in progress.
pub struct StepContext<'a> {
    tracker: &'a RunTracker,
    name: String,
    started: Instant,
    outputs: Mutex<BTreeMap<String, Value>>,
}

impl StepContext<'_> {
    pub fn complete(self) {
        self.finish(RunStatus::Completed, false, None);
    }

    /// Completes the step with its output taken from the cache.
    pub fn complete_cached(self) {
        self.finish(RunStatus::Completed, true, None);
    }

    pub fn fail(self, error: &PipelineError) {
        self.finish(RunStatus::Failed, false, Some(error.to_string()));
    }

    fn finish(self, status: RunStatus, cached: bool, error: Option<String>) {
        let duration = self.started.elapsed();
        let outputs = self.outputs.into_inner().unwrap_or_else(|e| e.into_inner());

        match &error {
            Some(e) => tracing::error!(step = %self.name, error = %e, "Step failed"),
            None => tracing::info!(
                step = %self.name,
                cached = cached,
                duration_ms = duration_ms(duration),
                "Step completed"
            ),
        }

        self.tracker.push_step(StepRecord {
            name: self.name,
            status,
            cached,
            duration_ms: duration_ms(duration),
            outputs,
            error,
        });
    }
}

impl MetadataSink for StepContext<'_> {
    fn add_output_metadata(&self, output_name: &str, metadata: Value) {
        let mut outputs = self.outputs.lock().unwrap_or_else(|e| e.into_inner());
        merge_metadata(outputs.entry(output_name.to_string()).or_insert(Value::Null), metadata);
    }
}

/// Adds `incoming` into `existing`; object keys are merged, anything else
/// is replaced.
fn merge_metadata(existing: &mut Value, incoming: Value) {
    match (existing, incoming) {
        (Value::Object(current), Value::Object(new)) => {
            for (key, value) in new {
                current.insert(key, value);
            }
        }
        (slot, value) => *slot = value,
    }
}

fn duration_ms(duration: Duration) -> u64 {
    duration.as_millis().min(u64::MAX as u128) as u64
}
