use std::sync::Arc;

use super::ollama::LlmClient;
use super::prompt_templates::{specialist_prompt, synthesis_prompt, Specialist, SYNTHESIS_NAME};
use super::task::{AnalysisTask, SynthesisInput, SynthesisTask};
use super::AnalysisError;

/// One analysis task per specialist, all backed by the same client and model.
pub fn standard_specialists(client: Arc<dyn LlmClient>, model: &str) -> Vec<AnalysisTask> {
    Specialist::all()
        .iter()
        .map(|&specialist| {
            let client = Arc::clone(&client);
            let model = model.to_string();
            AnalysisTask::new(specialist.as_str(), move |report: &str| {
                let prompt = specialist_prompt(specialist, report);
                non_empty(client.generate(&model, &prompt, "")?)
            })
        })
        .collect()
}

/// The multidisciplinary step over every specialist output, placeholders included.
pub fn multidisciplinary_synthesis(client: Arc<dyn LlmClient>, model: &str) -> SynthesisTask {
    let model = model.to_string();
    SynthesisTask::new(SYNTHESIS_NAME, move |input: &SynthesisInput| {
        let prompt = synthesis_prompt(
            input
                .outputs
                .iter()
                .map(|o| (o.name.as_str(), o.output.as_str())),
        );
        non_empty(client.generate(&model, &prompt, "")?)
    })
}

fn non_empty(response: String) -> Result<String, AnalysisError> {
    if response.trim().is_empty() {
        Err(AnalysisError::EmptyResponse)
    } else {
        Ok(response)
    }
}
