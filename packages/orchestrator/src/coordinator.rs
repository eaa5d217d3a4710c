// ABOUTME: Execution coordinator: runs one task end to end in an ephemeral sandbox
// ABOUTME: Unconditional sandbox teardown; infrastructure errors propagate to the dispatcher

use std::sync::Arc;
use tracing::{info, warn};

use cloudagent_artifacts::ArtifactStore;
use cloudagent_sandbox::{SandboxHandle, SandboxProvider, SandboxSpec};
use cloudagent_tasks::{StorageError, Task, TaskStatus, TaskStorage, TaskUpdate};

use crate::config::OrchestratorConfig;
use crate::error::{OrchestratorError, Result};
use crate::prepare::prepare_environment;
use crate::reconcile::reconcile;
use crate::runner::run_agent;
use crate::stage::stage_repository;
use crate::types::FinalState;

/// What the dispatch layer gets back from one execution
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub task_id: String,
    pub status: TaskStatus,
    pub result: Option<String>,
}

/// Drives a task through its full lifecycle: claim, sandbox, stage, agent
/// run, reconcile, teardown. One coordinator is shared by all workers.
pub struct ExecutionCoordinator {
    provider: Arc<dyn SandboxProvider>,
    tasks: TaskStorage,
    artifacts: ArtifactStore,
    config: OrchestratorConfig,
}

impl ExecutionCoordinator {
    pub fn new(
        provider: Arc<dyn SandboxProvider>,
        tasks: TaskStorage,
        artifacts: ArtifactStore,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            provider,
            tasks,
            artifacts,
            config,
        }
    }

    /// Execute one task. At-least-once delivery means this may be called
    /// again for a task that already finished; terminal tasks are returned
    /// as-is instead of re-executed.
    ///
    /// An `Err` here means infrastructure trouble: the task row stays
    /// `running` and the dispatch layer decides whether to retry or to mark
    /// it failed.
    pub async fn execute(&self, task_id: &str) -> Result<ExecutionOutcome> {
        let task = self.tasks.get_task(task_id).await?;
        if task.status.is_terminal() {
            info!("Task {} already {}, skipping re-execution", task_id, task.status);
            return Ok(ExecutionOutcome {
                task_id: task.id,
                status: task.status,
                result: task.result,
            });
        }

        info!("Executing task {}", task_id);
        self.tasks
            .update_task(task_id, TaskUpdate::status(TaskStatus::Running))
            .await?;

        let spec = SandboxSpec {
            template: self.config.sandbox_template.clone(),
            timeout_secs: self.config.sandbox_timeout.as_secs(),
            env: self.config.sandbox_env()?,
        };
        let handle = self.provider.create(&spec).await?;
        info!("Created sandbox {} for task {}", handle.id, task_id);

        let pipeline_result = self.run_pipeline(&task, &handle).await;

        // Teardown happens no matter how the pipeline went; a failed destroy
        // never overrides the computed outcome
        if let Err(e) = self.provider.destroy(&handle).await {
            warn!("Failed to destroy sandbox {}: {}", handle.id, e);
        }

        let final_state = pipeline_result?;
        let updated = self
            .tasks
            .update_task(
                task_id,
                TaskUpdate {
                    status: Some(final_state.status),
                    result: Some(final_state.result),
                    session_id: final_state.session_id,
                    branch_name: final_state.branch_name,
                    ..Default::default()
                },
            )
            .await?;

        info!("Task {} finished with status {}", task_id, updated.status);
        Ok(ExecutionOutcome {
            task_id: updated.id,
            status: updated.status,
            result: updated.result,
        })
    }

    async fn run_pipeline(&self, task: &Task, handle: &SandboxHandle) -> Result<FinalState> {
        self.tasks
            .update_task(&task.id, TaskUpdate::sandbox_id(handle.id.clone()))
            .await?;

        prepare_environment(self.provider.as_ref(), handle, &self.config).await;

        let parent = self.resolve_parent(task).await?;

        let staged = match stage_repository(
            self.provider.as_ref(),
            handle,
            task,
            parent.as_ref(),
            &self.artifacts,
        )
        .await
        {
            Ok(staged) => staged,
            // Clone and branch failures are part of the task's outcome, not
            // infrastructure faults worth retrying
            Err(OrchestratorError::Stage(e)) => {
                warn!("Staging failed for task {}: {}", task.id, e);
                return Ok(FinalState {
                    status: TaskStatus::Failed,
                    result: e.to_string(),
                    session_id: None,
                    branch_name: None,
                });
            }
            Err(e) => return Err(e),
        };

        let output = run_agent(
            self.provider.as_ref(),
            handle,
            &task.id,
            &task.prompt,
            staged.resume_session_id.as_deref(),
            self.config.agent_timeout,
            &self.artifacts,
        )
        .await?;

        Ok(reconcile(
            self.provider.as_ref(),
            handle,
            task,
            &staged.branch_name,
            &output,
            &self.artifacts,
        )
        .await)
    }

    /// A dangling parent reference degrades to a fresh run rather than
    /// failing the child.
    async fn resolve_parent(&self, task: &Task) -> Result<Option<Task>> {
        let parent_id = match &task.parent_task_id {
            Some(parent_id) => parent_id,
            None => return Ok(None),
        };
        match self.tasks.get_task(parent_id).await {
            Ok(parent) => Ok(Some(parent)),
            Err(StorageError::NotFound(_)) => {
                warn!("Parent task {} not found, running fresh", parent_id);
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }
}
