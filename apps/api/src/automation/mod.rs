//! Automation: the multi-phase background run (load → analyze → generate → apply)
//! and the process-wide status record it reports through.

use thiserror::Error;
use uuid::Uuid;

use crate::errors::AppError;

pub mod catalogue;
pub mod handlers;
pub mod pipeline;
pub mod status;

pub use pipeline::{AutomationConfig, AutomationPipeline, PipelineSettings};
pub use status::{AutomationMonitor, AutomationStatus};

#[derive(Debug, Error)]
pub enum AutomationError {
    #[error("Automation already running")]
    AlreadyRunning,

    #[error("Profile not found for user {0}. Complete the interview first.")]
    ProfileMissing(Uuid),

    #[error("Store error: {0}")]
    Store(#[from] anyhow::Error),

    #[error(transparent)]
    Generation(#[from] AppError),
}

impl From<AutomationError> for AppError {
    fn from(err: AutomationError) -> Self {
        match err {
            AutomationError::AlreadyRunning => AppError::Conflict(err.to_string()),
            AutomationError::ProfileMissing(_) => AppError::Validation(err.to_string()),
            AutomationError::Store(e) => AppError::Internal(e),
            AutomationError::Generation(e) => e,
        }
    }
}
