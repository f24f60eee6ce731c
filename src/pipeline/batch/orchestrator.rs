//! Fan-out/fan-in batch runner.
//!
//! Every analysis task runs on its own OS thread and reports back over a
//! channel. The caller thread joins on all of them, then runs the single
//! synthesis step. Task failures and panics become placeholders; only an
//! invalid batch or a cancellation is returned as an error.

use std::collections::{BTreeMap, HashSet};
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::cancel::CancellationToken;
use super::progress::{BatchStatus, ProgressStore, TaskProgress, SYNTHESIS_ENTRY};
use super::BatchError;
use crate::pipeline::analysis::{
    AnalysisError, AnalysisTask, SynthesisInput, SynthesisTask, TaskOutput,
};
use crate::pipeline::panic_message;

/// Output substituted for a task that errored or panicked.
pub const TASK_PLACEHOLDER: &str = "No response.";

/// Output substituted for a failed or empty synthesis.
pub const SYNTHESIS_PLACEHOLDER: &str = "No diagnosis returned.";

/// How often the join loop wakes to check for cancellation.
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Final outcome of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResult {
    pub batch_id: String,
    /// Task name -> output, or `TASK_PLACEHOLDER` for failed tasks.
    pub outputs: BTreeMap<String, String>,
    /// Names of tasks whose output is a placeholder.
    pub failed_tasks: Vec<String>,
    pub synthesis: String,
    pub synthesis_succeeded: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Message from a worker thread to the join loop.
struct TaskDone {
    index: usize,
    result: Result<String, AnalysisError>,
}

/// Runs batches of independent analysis tasks feeding one synthesis step,
/// publishing progress to a shared store.
pub struct TaskOrchestrator {
    progress: Arc<ProgressStore>,
}

impl TaskOrchestrator {
    pub fn new(progress: Arc<ProgressStore>) -> Self {
        Self { progress }
    }

    pub fn progress(&self) -> &Arc<ProgressStore> {
        &self.progress
    }

    /// Run every task concurrently over `input`, wait for all of them, then
    /// run `synth` over their outputs in declaration order.
    ///
    /// Fails only on an invalid batch (no tasks, empty input, duplicate
    /// names) or when `cancel` fires before the result is produced. A
    /// cancelled batch's partial results are discarded.
    pub fn run_batch(
        &self,
        batch_id: &str,
        input: &str,
        tasks: &[AnalysisTask],
        synth: &SynthesisTask,
        cancel: &CancellationToken,
    ) -> Result<BatchResult, BatchError> {
        validate(input, tasks)?;
        if cancel.is_cancelled() {
            return Err(BatchError::Cancelled);
        }

        let started_at = Utc::now();
        let names: Vec<&str> = tasks.iter().map(AnalysisTask::name).collect();
        self.progress.register_tasks(batch_id, &names)?;

        tracing::info!(batch_id, tasks = tasks.len(), "Starting analysis batch");

        let results = match self.fan_out(batch_id, input, tasks, cancel) {
            Some(results) => results,
            None => return self.cancelled(batch_id),
        };

        let mut outputs = BTreeMap::new();
        let mut failed_tasks = Vec::new();
        let mut synthesis_input = SynthesisInput::default();

        for (task, result) in tasks.iter().zip(results) {
            let (output, succeeded) = match result {
                Ok(output) => (output, true),
                Err(_) => {
                    failed_tasks.push(task.name().to_string());
                    (TASK_PLACEHOLDER.to_string(), false)
                }
            };
            outputs.insert(task.name().to_string(), output.clone());
            synthesis_input.outputs.push(TaskOutput {
                name: task.name().to_string(),
                output,
                succeeded,
            });
        }

        if cancel.is_cancelled() {
            return self.cancelled(batch_id);
        }

        self.progress.set_status(batch_id, BatchStatus::Synthesizing, 80)?;
        self.progress
            .update_task(batch_id, SYNTHESIS_ENTRY, TaskProgress::processing())?;

        let (synthesis, synthesis_succeeded) = match run_guarded(|| synth.run(&synthesis_input)) {
            Ok(text) if !text.trim().is_empty() => {
                self.progress.update_task(
                    batch_id,
                    SYNTHESIS_ENTRY,
                    TaskProgress::completed(text.clone()),
                )?;
                (text, true)
            }
            outcome => {
                let error = match outcome {
                    Err(e) => e.to_string(),
                    Ok(_) => AnalysisError::EmptyResponse.to_string(),
                };
                tracing::warn!(
                    batch_id,
                    task = synth.name(),
                    error = %error,
                    "Synthesis failed, using placeholder"
                );
                self.progress.update_task(
                    batch_id,
                    SYNTHESIS_ENTRY,
                    TaskProgress::errored(SYNTHESIS_PLACEHOLDER.to_string(), error),
                )?;
                (SYNTHESIS_PLACEHOLDER.to_string(), false)
            }
        };

        if cancel.is_cancelled() {
            return self.cancelled(batch_id);
        }

        self.progress.finish(batch_id, BatchStatus::Completed, None)?;

        tracing::info!(
            batch_id,
            failed = failed_tasks.len(),
            synthesis_succeeded,
            "Analysis batch completed"
        );

        Ok(BatchResult {
            batch_id: batch_id.to_string(),
            outputs,
            failed_tasks,
            synthesis,
            synthesis_succeeded,
            started_at,
            finished_at: Utc::now(),
        })
    }

    /// Launch one thread per task and block until all report, indexed by
    /// declaration order. `None` when cancelled first.
    fn fan_out(
        &self,
        batch_id: &str,
        input: &str,
        tasks: &[AnalysisTask],
        cancel: &CancellationToken,
    ) -> Option<Vec<Result<String, AnalysisError>>> {
        let (tx, rx) = mpsc::channel::<TaskDone>();
        let input: Arc<str> = Arc::from(input);
        let mut pending = tasks.len();

        for (index, task) in tasks.iter().enumerate() {
            let task = task.clone();
            let input = Arc::clone(&input);
            let progress = Arc::clone(&self.progress);
            let batch = batch_id.to_string();
            let worker_tx = tx.clone();

            let spawned = std::thread::Builder::new()
                .name(format!("analysis-{}", task.name()))
                .spawn(move || {
                    let result = run_task(&progress, &batch, &task, &input);
                    let _ = worker_tx.send(TaskDone { index, result });
                });

            if let Err(e) = spawned {
                report_spawn_failure(&self.progress, batch_id, &tasks[index], index, &e, &tx);
            }
        }
        drop(tx);

        let mut results: Vec<Option<Result<String, AnalysisError>>> =
            (0..tasks.len()).map(|_| None).collect();

        while pending > 0 {
            if cancel.is_cancelled() {
                return None;
            }
            match rx.recv_timeout(CANCEL_POLL_INTERVAL) {
                Ok(done) => {
                    results[done.index] = Some(done.result);
                    pending -= 1;
                }
                Err(mpsc::RecvTimeoutError::Timeout) => continue,
                Err(mpsc::RecvTimeoutError::Disconnected) => break,
            }
        }

        Some(
            results
                .into_iter()
                .map(|r| r.unwrap_or_else(|| Err(AnalysisError::Failed("worker vanished".into()))))
                .collect(),
        )
    }

    fn cancelled(&self, batch_id: &str) -> Result<BatchResult, BatchError> {
        tracing::info!(batch_id, "Analysis batch cancelled, discarding results");
        self.progress.finish(batch_id, BatchStatus::Cancelled, None)?;
        Err(BatchError::Cancelled)
    }
}

fn validate(input: &str, tasks: &[AnalysisTask]) -> Result<(), BatchError> {
    if tasks.is_empty() {
        return Err(BatchError::EmptyTaskList);
    }
    if input.trim().is_empty() {
        return Err(BatchError::EmptyInput);
    }
    let mut seen = HashSet::new();
    for task in tasks {
        if !seen.insert(task.name()) {
            return Err(BatchError::DuplicateTaskName(task.name().to_string()));
        }
    }
    Ok(())
}

/// Worker body: mark processing, run, record the terminal state.
fn run_task(
    progress: &ProgressStore,
    batch_id: &str,
    task: &AnalysisTask,
    input: &str,
) -> Result<String, AnalysisError> {
    if let Err(e) = progress.update_task(batch_id, task.name(), TaskProgress::processing()) {
        tracing::warn!(batch_id, task = task.name(), error = %e, "Progress update failed");
    }

    let result = run_guarded(|| task.run(input));
    record_outcome(progress, batch_id, task.name(), &result);
    result
}

/// A worker that never started still owes the join loop one message.
fn report_spawn_failure(
    progress: &ProgressStore,
    batch_id: &str,
    task: &AnalysisTask,
    index: usize,
    error: &std::io::Error,
    tx: &mpsc::Sender<TaskDone>,
) {
    let result = Err(AnalysisError::Failed(format!("could not start worker: {error}")));
    record_outcome(progress, batch_id, task.name(), &result);
    let _ = tx.send(TaskDone { index, result });
}

fn record_outcome(
    progress: &ProgressStore,
    batch_id: &str,
    task: &str,
    result: &Result<String, AnalysisError>,
) {
    let entry = match result {
        Ok(output) => {
            tracing::debug!(batch_id, task, chars = output.len(), "Task completed");
            TaskProgress::completed(output.clone())
        }
        Err(e) => {
            tracing::warn!(batch_id, task, error = %e, "Task failed, using placeholder");
            TaskProgress::errored(TASK_PLACEHOLDER.to_string(), e.to_string())
        }
    };

    if let Err(e) = progress.update_task(batch_id, task, entry) {
        tracing::warn!(batch_id, task, error = %e, "Progress update failed");
    }
}

/// Run `f`, turning a panic into `AnalysisError::Panicked`.
fn run_guarded(
    f: impl FnOnce() -> Result<String, AnalysisError>,
) -> Result<String, AnalysisError> {
    panic::catch_unwind(AssertUnwindSafe(f))
        .unwrap_or_else(|payload| Err(AnalysisError::Panicked(panic_message(payload.as_ref()))))
}
