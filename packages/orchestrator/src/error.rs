// ABOUTME: Error types for the task execution orchestrator
// ABOUTME: Separates modeled staging failures (terminal for the task) from infrastructure errors

use cloudagent_artifacts::ArtifactError;
use cloudagent_sandbox::SandboxError;
use cloudagent_tasks::StorageError;
use thiserror::Error;

/// Staging failures are part of the task's outcome, not infrastructure
/// faults: the task fails with this message and is not retried.
#[derive(Error, Debug)]
pub enum StageError {
    #[error("Failed to clone repository: {0}")]
    CloneFailed(String),

    #[error("Failed to prepare branch: {0}")]
    BranchFailed(String),
}

/// Main error type for orchestrator operations. Errors that reach the
/// dispatch layer represent infrastructure problems eligible for retry.
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error(transparent)]
    Stage(#[from] StageError),

    #[error("Sandbox error: {0}")]
    Sandbox(#[from] SandboxError),

    #[error("Task storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Artifact error: {0}")]
    Artifacts(#[from] ArtifactError),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

/// Type alias for Results that return OrchestratorError
pub type Result<T> = std::result::Result<T, OrchestratorError>;
