// ABOUTME: Repository stager: clone, branch preparation, parent-state restoration
// ABOUTME: Clone and branch failures terminate the task before any agent run

use std::time::Duration;
use tracing::{debug, info, warn};

use cloudagent_artifacts::ArtifactStore;
use cloudagent_sandbox::{SandboxHandle, SandboxProvider};
use cloudagent_tasks::Task;

use crate::error::{Result, StageError};
use crate::types::{sh_quote, task_branch, REPO_PATH, SESSION_DIR};

const CLONE_TIMEOUT: Duration = Duration::from_secs(300);
const GIT_TIMEOUT: Duration = Duration::from_secs(60);

/// Repository state the agent will run against
#[derive(Debug, Clone)]
pub(crate) struct StagedRepo {
    pub branch_name: String,
    /// Session to resume, set only when the parent's transcript was restored
    pub resume_session_id: Option<String>,
}

/// Clone the task's repository, put it on the task's branch, and restore any
/// state left behind by a parent task.
pub(crate) async fn stage_repository(
    provider: &dyn SandboxProvider,
    handle: &SandboxHandle,
    task: &Task,
    parent: Option<&Task>,
    artifacts: &ArtifactStore,
) -> Result<StagedRepo> {
    clone_repository(provider, handle, &task.repository_url).await?;
    let branch_name = prepare_branch(provider, handle, task).await?;

    let resume_session_id = match parent {
        Some(parent) => restore_parent_state(provider, handle, parent, artifacts).await,
        None => None,
    };

    Ok(StagedRepo {
        branch_name,
        resume_session_id,
    })
}

async fn clone_repository(
    provider: &dyn SandboxProvider,
    handle: &SandboxHandle,
    repository_url: &str,
) -> Result<()> {
    info!("Cloning {} into {}", repository_url, REPO_PATH);
    let cmd = format!("git clone {} {}", sh_quote(repository_url), REPO_PATH);
    let output = provider.run(handle, &cmd, CLONE_TIMEOUT).await?;
    if !output.success() {
        return Err(StageError::CloneFailed(output.stderr.trim().to_string()).into());
    }
    Ok(())
}

/// Check out the task's branch. A task resumed on the same row keeps its
/// recorded branch; otherwise a fresh branch is created, falling back to a
/// plain checkout when a redelivered attempt already created it.
async fn prepare_branch(
    provider: &dyn SandboxProvider,
    handle: &SandboxHandle,
    task: &Task,
) -> Result<String> {
    if let Some(branch) = &task.branch_name {
        let cmd = format!("cd {} && git checkout {}", REPO_PATH, sh_quote(branch));
        let output = provider.run(handle, &cmd, GIT_TIMEOUT).await?;
        if !output.success() {
            return Err(StageError::BranchFailed(output.stderr.trim().to_string()).into());
        }
        debug!("Checked out existing branch {}", branch);
        return Ok(branch.clone());
    }

    let branch = task_branch(&task.id);
    let create = format!(
        "cd {} && git checkout -b {}",
        REPO_PATH,
        sh_quote(&branch)
    );
    let output = provider.run(handle, &create, GIT_TIMEOUT).await?;
    if output.success() {
        debug!("Created branch {}", branch);
        return Ok(branch);
    }

    debug!("Branch {} may already exist, trying plain checkout", branch);
    let checkout = format!("cd {} && git checkout {}", REPO_PATH, sh_quote(&branch));
    let output = provider.run(handle, &checkout, GIT_TIMEOUT).await?;
    if output.success() {
        Ok(branch)
    } else {
        Err(StageError::BranchFailed(output.stderr.trim().to_string()).into())
    }
}

/// Copy the parent task's stored files and transcript into the sandbox.
/// Missing or unreadable parent artifacts degrade the run to a fresh start;
/// they never fail it.
async fn restore_parent_state(
    provider: &dyn SandboxProvider,
    handle: &SandboxHandle,
    parent: &Task,
    artifacts: &ArtifactStore,
) -> Option<String> {
    match artifacts.list_files(&parent.id).await {
        Ok(files) if files.is_empty() => {
            debug!("Parent task {} stored no files", parent.id);
        }
        Ok(files) => {
            let mut restored = 0usize;
            for relative in &files {
                let bytes = match artifacts.read_file(&parent.id, relative).await {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        warn!("Failed to read parent file {}: {}", relative, e);
                        continue;
                    }
                };
                let dest = format!("{}/{}", REPO_PATH, relative);
                match provider.write_file(handle, &dest, &bytes).await {
                    Ok(()) => restored += 1,
                    Err(e) => warn!("Failed to restore parent file {}: {}", relative, e),
                }
            }
            info!(
                "Restored {}/{} files from parent task {}",
                restored,
                files.len(),
                parent.id
            );
        }
        Err(e) => {
            warn!("Failed to list parent task {} files: {}", parent.id, e);
        }
    }

    let session_id = match &parent.session_id {
        Some(session_id) => session_id,
        None => {
            debug!("Parent task {} has no session to resume", parent.id);
            return None;
        }
    };

    match artifacts.read_transcript(&parent.id).await {
        Ok(Some(transcript)) => {
            let dest = format!("{}/{}.jsonl", SESSION_DIR, session_id);
            match provider.write_file(handle, &dest, &transcript).await {
                Ok(()) => {
                    info!(
                        "Restored session {} from parent task {}",
                        session_id, parent.id
                    );
                    Some(session_id.clone())
                }
                Err(e) => {
                    warn!("Failed to restore parent transcript: {}", e);
                    None
                }
            }
        }
        Ok(None) => {
            warn!(
                "Parent task {} has session {} but no stored transcript",
                parent.id, session_id
            );
            None
        }
        Err(e) => {
            warn!("Failed to read parent transcript: {}", e);
            None
        }
    }
}
