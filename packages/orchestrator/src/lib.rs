// ABOUTME: Task execution orchestrator for cloudagent
// ABOUTME: Runs one coding task end to end inside an ephemeral sandbox

pub mod config;
pub mod coordinator;
pub mod error;
pub mod types;

mod prepare;
mod reconcile;
mod runner;
mod stage;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export commonly used types
pub use config::OrchestratorConfig;
pub use coordinator::{ExecutionCoordinator, ExecutionOutcome};
pub use error::{OrchestratorError, Result, StageError};
pub use types::{AgentRunOutput, FinalState};
