pub mod cancel;
pub mod orchestrator;
pub mod progress;

pub use cancel::*;
pub use orchestrator::*;
pub use progress::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BatchError {
    #[error("Batch has no tasks")]
    EmptyTaskList,

    #[error("Batch input text is empty")]
    EmptyInput,

    #[error("Duplicate task name in batch: {0}")]
    DuplicateTaskName(String),

    #[error("Batch was cancelled")]
    Cancelled,

    #[error("Progress store lock poisoned")]
    LockPoisoned,
}
