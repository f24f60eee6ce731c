pub mod ollama;
pub mod task;
pub mod prompt_templates;
pub mod roster;

pub use ollama::*;
pub use task::*;
pub use roster::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Ollama is not running at {0}")]
    OllamaConnection(String),

    #[error("Ollama returned error (status {status}): {body}")]
    OllamaError { status: u16, body: String },

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Response parsing error: {0}")]
    ResponseParsing(String),

    #[error("Model returned an empty response")]
    EmptyResponse,

    #[error("Analysis failed: {0}")]
    Failed(String),

    #[error("Analysis panicked: {0}")]
    Panicked(String),
}
