//! Analysis pipeline: document -> extraction -> specialist batch -> synthesis.
//!
//! Single entry point for callers (CLI, HTTP, tests). Engines are injected
//! as trait objects so the whole flow runs against mocks.

use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::JoinHandle;

use serde::Serialize;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::pipeline::analysis::{
    multidisciplinary_synthesis, standard_specialists, AnalysisError, AnalysisTask, LlmClient,
    OllamaClient, SynthesisTask,
};
use crate::pipeline::batch::{
    BatchError, BatchResult, BatchStatus, CancellationToken, ProgressStore, TaskOrchestrator,
};
use crate::pipeline::extraction::{
    format_for_agents, Document, DocumentExtractor, DocumentKind, ExtractionError,
    ExtractionMethod, ExtractionResult, ExtractorConfig,
};
use crate::pipeline::panic_message;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ProcessingError {
    #[error("Extraction failed: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("Could not extract usable text from {0}")]
    ExtractionFailed(String),

    #[error("Batch failed: {0}")]
    Batch(#[from] BatchError),

    #[error("Analysis backend error: {0}")]
    Analysis(#[from] AnalysisError),

    #[error("Failed to start background analysis: {0}")]
    Spawn(String),

    #[error("Analysis panicked: {0}")]
    Panicked(String),

    #[error("Model '{model}' is not installed in Ollama (available: {available})")]
    ModelUnavailable { model: String, available: String },
}

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// Extraction stage summary.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionSummary {
    pub method: ExtractionMethod,
    pub text_length: usize,
    pub fields: BTreeMap<String, String>,
    pub table_count: usize,
}

impl From<&ExtractionResult> for ExtractionSummary {
    fn from(result: &ExtractionResult) -> Self {
        Self {
            method: result.method,
            text_length: result.text.trim().chars().count(),
            fields: result.fields.clone(),
            table_count: result.tables.len(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisOutcome {
    pub document: String,
    pub extraction: ExtractionSummary,
    /// Exact text every specialist received.
    pub agent_input: String,
    pub result: BatchResult,
}

/// Handle on an analysis running in the background.
pub struct BackgroundAnalysis {
    batch_id: String,
    cancel: CancellationToken,
    handle: JoinHandle<Result<AnalysisOutcome, ProcessingError>>,
}

impl BackgroundAnalysis {
    pub fn batch_id(&self) -> &str {
        &self.batch_id
    }

    /// Abandon the batch; its results are discarded.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token shared with the running batch, for cancelling after `join`
    /// has taken the handle.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the analysis thread to finish.
    pub fn join(self) -> Result<AnalysisOutcome, ProcessingError> {
        self.handle.join().unwrap_or_else(|payload| {
            Err(ProcessingError::Panicked(panic_message(payload.as_ref())))
        })
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Fail fast when the backend answers but lacks `model`. An unreachable
/// backend only logs a warning; the batch then runs on placeholders.
pub fn check_model(client: &dyn LlmClient, model: &str) -> Result<(), ProcessingError> {
    let models = match client.list_models() {
        Ok(models) => models,
        Err(e) => {
            tracing::warn!(model, error = %e, "Could not list installed models");
            return Ok(());
        }
    };
    if models.iter().any(|m| m.starts_with(model)) {
        return Ok(());
    }
    Err(ProcessingError::ModelUnavailable {
        model: model.to_string(),
        available: if models.is_empty() {
            "none".to_string()
        } else {
            models.join(", ")
        },
    })
}

/// New batch identifier (`analysis_<uuid>`).
pub fn new_batch_id() -> String {
    format!("analysis_{}", Uuid::new_v4())
}

/// Extracts a document and runs the specialist batch over it, publishing
/// progress to a shared `ProgressStore`. Cheap to clone.
#[derive(Clone)]
pub struct AnalysisPipeline {
    extractor: Arc<DocumentExtractor>,
    tasks: Vec<AnalysisTask>,
    synthesis: SynthesisTask,
    orchestrator: Arc<TaskOrchestrator>,
}

impl AnalysisPipeline {
    pub fn new(
        extractor: DocumentExtractor,
        tasks: Vec<AnalysisTask>,
        synthesis: SynthesisTask,
        progress: Arc<ProgressStore>,
    ) -> Self {
        Self {
            extractor: Arc::new(extractor),
            tasks,
            synthesis,
            orchestrator: Arc::new(TaskOrchestrator::new(progress)),
        }
    }

    /// Default chain plus the three specialists and the multidisciplinary
    /// synthesis, all talking to one LLM client.
    pub fn with_client(
        config: &AppConfig,
        client: Arc<dyn LlmClient>,
        progress: Arc<ProgressStore>,
    ) -> Self {
        let extractor = DocumentExtractor::with_default_chain(ExtractorConfig::from(config));
        let tasks = standard_specialists(Arc::clone(&client), &config.model);
        let synthesis = multidisciplinary_synthesis(client, &config.model);
        Self::new(extractor, tasks, synthesis, progress)
    }

    /// `with_client` over an Ollama client built from config, after
    /// checking the configured model is installed.
    pub fn from_config(
        config: &AppConfig,
        progress: Arc<ProgressStore>,
    ) -> Result<Self, ProcessingError> {
        let client = OllamaClient::new(&config.ollama_url, config.timeout_secs)?;
        check_model(&client, &config.model)?;
        Ok(Self::with_client(config, Arc::new(client), progress))
    }

    pub fn progress(&self) -> &Arc<ProgressStore> {
        self.orchestrator.progress()
    }

    /// Run the whole pipeline on the calling thread.
    pub fn analyze_document(
        &self,
        batch_id: &str,
        doc: &Document,
        cancel: &CancellationToken,
    ) -> Result<AnalysisOutcome, ProcessingError> {
        let progress = self.progress();
        progress.begin(batch_id)?;

        let outcome = self.run_stages(batch_id, doc, cancel);
        if let Err(e) = &outcome {
            tracing::warn!(batch_id, document = doc.name(), error = %e, "Analysis failed");
            // No-op when the batch already ended as cancelled.
            progress.finish(batch_id, BatchStatus::Failed, Some(e.to_string()))?;
        }
        outcome
    }

    fn run_stages(
        &self,
        batch_id: &str,
        doc: &Document,
        cancel: &CancellationToken,
    ) -> Result<AnalysisOutcome, ProcessingError> {
        let progress = self.progress();

        progress.set_status(batch_id, BatchStatus::Extracting, 10)?;
        let extraction = self.extractor.extract(doc)?;
        if !extraction.succeeded {
            return Err(ProcessingError::ExtractionFailed(doc.name().to_string()));
        }
        progress.set_status(batch_id, BatchStatus::Extracting, 25)?;

        tracing::info!(
            batch_id,
            method = %extraction.method,
            text_length = extraction.text.len(),
            fields = extraction.fields.len(),
            "Document extracted"
        );

        // Plain text goes to the specialists verbatim.
        let input = match doc.kind() {
            DocumentKind::PlainText => extraction.text.clone(),
            _ => format_for_agents(&extraction),
        };

        let result =
            self.orchestrator
                .run_batch(batch_id, &input, &self.tasks, &self.synthesis, cancel)?;

        Ok(AnalysisOutcome {
            document: doc.name().to_string(),
            extraction: ExtractionSummary::from(&extraction),
            agent_input: input,
            result,
        })
    }

    /// Register a new batch and run it on a background thread. Progress is
    /// visible in the store immediately.
    pub fn start_analysis(&self, doc: Document) -> Result<BackgroundAnalysis, ProcessingError> {
        let batch_id = new_batch_id();
        self.progress().begin(&batch_id)?;

        let cancel = CancellationToken::new();
        let pipeline = self.clone();
        let thread_batch = batch_id.clone();
        let thread_cancel = cancel.clone();

        let handle = std::thread::Builder::new()
            .name(format!("pipeline-{batch_id}"))
            .spawn(move || {
                let progress = Arc::clone(pipeline.progress());
                contain_panic(&progress, &thread_batch, || {
                    pipeline.analyze_document(&thread_batch, &doc, &thread_cancel)
                })
            })
            .map_err(|e| ProcessingError::Spawn(e.to_string()))?;

        tracing::info!(batch_id = %batch_id, "Background analysis started");

        Ok(BackgroundAnalysis {
            batch_id,
            cancel,
            handle,
        })
    }
}

/// Run `f`, turning a panic into a failed batch so pollers never see it
/// stuck in a running state.
fn contain_panic(
    progress: &ProgressStore,
    batch_id: &str,
    f: impl FnOnce() -> Result<AnalysisOutcome, ProcessingError>,
) -> Result<AnalysisOutcome, ProcessingError> {
    panic::catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|payload| {
        let message = panic_message(payload.as_ref());
        tracing::error!(batch_id, error = %message, "Analysis thread panicked");
        if let Err(e) = progress.finish(batch_id, BatchStatus::Failed, Some(message.clone())) {
            tracing::warn!(batch_id, error = %e, "Could not mark panicked batch as failed");
        }
        Err(ProcessingError::Panicked(message))
    })
}
