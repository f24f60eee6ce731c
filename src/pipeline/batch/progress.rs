//! Batch progress tracking.
//!
//! `ProgressStore` is shared by the orchestrator (writer) and any number of
//! status pollers (readers). Every write replaces a whole entry under the
//! write lock and every read returns an owned clone, so observers never see
//! a half-updated task.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::BatchError;

/// Progress entry name for the synthesis step.
pub const SYNTHESIS_ENTRY: &str = "final";

/// Lifecycle of one task within a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Waiting,
    Processing,
    Completed,
    Errored,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Errored)
    }

    /// Per-task percent shown to observers.
    pub fn percent(&self) -> u8 {
        match self {
            Self::Waiting => 0,
            Self::Processing => 25,
            Self::Completed | Self::Errored => 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskProgress {
    pub state: TaskState,
    pub percent: u8,
    /// Present once terminal: the real output or the placeholder.
    pub output: Option<String>,
    pub error: Option<String>,
}

impl TaskProgress {
    pub fn waiting() -> Self {
        Self::in_state(TaskState::Waiting)
    }

    pub fn processing() -> Self {
        Self::in_state(TaskState::Processing)
    }

    pub fn completed(output: String) -> Self {
        Self {
            output: Some(output),
            ..Self::in_state(TaskState::Completed)
        }
    }

    pub fn errored(placeholder: String, error: String) -> Self {
        Self {
            output: Some(placeholder),
            error: Some(error),
            ..Self::in_state(TaskState::Errored)
        }
    }

    fn in_state(state: TaskState) -> Self {
        Self {
            state,
            percent: state.percent(),
            output: None,
            error: None,
        }
    }
}

/// Overall phase of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Starting,
    Extracting,
    RunningTasks,
    Synthesizing,
    Completed,
    Failed,
    Cancelled,
}

impl BatchStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Point-in-time view of one batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchProgress {
    pub batch_id: String,
    pub status: BatchStatus,
    pub percent: u8,
    pub tasks: BTreeMap<String, TaskProgress>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl BatchProgress {
    fn new(batch_id: &str) -> Self {
        Self {
            batch_id: batch_id.to_string(),
            status: BatchStatus::Starting,
            percent: 0,
            tasks: BTreeMap::new(),
            started_at: Utc::now(),
            finished_at: None,
            error: None,
        }
    }

    /// 30 + 50 * terminal / total over the analysis tasks.
    fn running_percent(&self) -> u8 {
        let analysis: Vec<_> = self
            .tasks
            .iter()
            .filter(|(name, _)| name.as_str() != SYNTHESIS_ENTRY)
            .collect();
        if analysis.is_empty() {
            return 30;
        }
        let terminal = analysis.iter().filter(|(_, t)| t.state.is_terminal()).count();
        (30 + 50 * terminal / analysis.len()) as u8
    }
}

/// Process-wide progress keyed by batch id.
#[derive(Debug, Default)]
pub struct ProgressStore {
    batches: RwLock<HashMap<String, BatchProgress>>,
}

impl ProgressStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a batch, replacing any previous entry with the same id.
    pub fn begin(&self, batch_id: &str) -> Result<(), BatchError> {
        let mut batches = self.batches.write().map_err(|_| BatchError::LockPoisoned)?;
        batches.insert(batch_id.to_string(), BatchProgress::new(batch_id));
        Ok(())
    }

    /// Set the phase and overall percent of a live batch.
    pub fn set_status(
        &self,
        batch_id: &str,
        status: BatchStatus,
        percent: u8,
    ) -> Result<(), BatchError> {
        self.with_live_batch(batch_id, |batch| {
            batch.status = status;
            batch.percent = percent;
        })
    }

    /// Register the analysis tasks (all `waiting`) plus the synthesis entry.
    /// Creates the batch if it was not begun explicitly.
    pub fn register_tasks(&self, batch_id: &str, names: &[&str]) -> Result<(), BatchError> {
        let mut batches = self.batches.write().map_err(|_| BatchError::LockPoisoned)?;
        let batch = batches
            .entry(batch_id.to_string())
            .or_insert_with(|| BatchProgress::new(batch_id));

        batch.tasks = names
            .iter()
            .map(|name| (name.to_string(), TaskProgress::waiting()))
            .chain(std::iter::once((
                SYNTHESIS_ENTRY.to_string(),
                TaskProgress::waiting(),
            )))
            .collect();
        batch.status = BatchStatus::RunningTasks;
        batch.percent = batch.running_percent();
        Ok(())
    }

    /// Replace one task's entry. While tasks run, the overall percent
    /// follows the share of terminal tasks. Ignored once the batch is terminal.
    pub fn update_task(
        &self,
        batch_id: &str,
        task: &str,
        progress: TaskProgress,
    ) -> Result<(), BatchError> {
        self.with_live_batch(batch_id, |batch| {
            batch.tasks.insert(task.to_string(), progress);
            if batch.status == BatchStatus::RunningTasks {
                batch.percent = batch.running_percent();
            }
        })
    }

    /// Mark a batch terminal. Completed batches report 100%.
    pub fn finish(
        &self,
        batch_id: &str,
        status: BatchStatus,
        error: Option<String>,
    ) -> Result<(), BatchError> {
        self.with_live_batch(batch_id, |batch| {
            batch.status = status;
            if status == BatchStatus::Completed {
                batch.percent = 100;
            }
            batch.error = error;
            batch.finished_at = Some(Utc::now());
        })
    }

    /// Owned copy of a batch's current progress.
    pub fn snapshot(&self, batch_id: &str) -> Result<Option<BatchProgress>, BatchError> {
        let batches = self.batches.read().map_err(|_| BatchError::LockPoisoned)?;
        Ok(batches.get(batch_id).cloned())
    }

    pub fn batch_ids(&self) -> Result<Vec<String>, BatchError> {
        let batches = self.batches.read().map_err(|_| BatchError::LockPoisoned)?;
        Ok(batches.keys().cloned().collect())
    }

    /// Apply `update` to a known, non-terminal batch. Unknown or finished
    /// batches are left untouched.
    fn with_live_batch(
        &self,
        batch_id: &str,
        update: impl FnOnce(&mut BatchProgress),
    ) -> Result<(), BatchError> {
        let mut batches = self.batches.write().map_err(|_| BatchError::LockPoisoned)?;
        match batches.get_mut(batch_id) {
            Some(batch) if !batch.status.is_terminal() => update(batch),
            Some(_) => {
                tracing::debug!(batch_id, "Ignoring update for finished batch");
            }
            None => {
                tracing::debug!(batch_id, "Ignoring update for unknown batch");
            }
        }
        Ok(())
    }
}
