//! Task specifications for a batch: named, stateless analysis functions
//! plus the one synthesis step that consumes their outputs.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::AnalysisError;

type AnalyzeFn = dyn Fn(&str) -> Result<String, AnalysisError> + Send + Sync;
type SynthesizeFn = dyn Fn(&SynthesisInput) -> Result<String, AnalysisError> + Send + Sync;

/// A named unit of analysis over the batch input text.
#[derive(Clone)]
pub struct AnalysisTask {
    name: String,
    run: Arc<AnalyzeFn>,
}

impl AnalysisTask {
    pub fn new<F>(name: impl Into<String>, run: F) -> Self
    where
        F: Fn(&str) -> Result<String, AnalysisError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            run: Arc::new(run),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn run(&self, input: &str) -> Result<String, AnalysisError> {
        (self.run)(input)
    }
}

impl fmt::Debug for AnalysisTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisTask").field("name", &self.name).finish()
    }
}

/// One task's contribution to the synthesis step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskOutput {
    pub name: String,
    /// Real output, or the failure placeholder.
    pub output: String,
    pub succeeded: bool,
}

/// Everything the synthesis step sees, in task declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynthesisInput {
    pub outputs: Vec<TaskOutput>,
}

/// The single join step run after every analysis task is terminal.
#[derive(Clone)]
pub struct SynthesisTask {
    name: String,
    run: Arc<SynthesizeFn>,
}

impl SynthesisTask {
    pub fn new<F>(name: impl Into<String>, run: F) -> Self
    where
        F: Fn(&SynthesisInput) -> Result<String, AnalysisError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            run: Arc::new(run),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn run(&self, input: &SynthesisInput) -> Result<String, AnalysisError> {
        (self.run)(input)
    }
}

impl fmt::Debug for SynthesisTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SynthesisTask").field("name", &self.name).finish()
    }
}
