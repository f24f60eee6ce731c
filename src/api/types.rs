use std::path::PathBuf;
use std::sync::Arc;

use crate::pipeline::batch::ProgressStore;

/// Shared state for all API routes.
#[derive(Clone)]
pub struct ApiContext {
    pub progress: Arc<ProgressStore>,
    /// Where saved reports are listed and served from.
    pub results_dir: PathBuf,
}

impl ApiContext {
    pub fn new(progress: Arc<ProgressStore>, results_dir: PathBuf) -> Self {
        Self {
            progress,
            results_dir,
        }
    }
}
