// ABOUTME: Result reconciler: folds agent output and repository state into a final task state
// ABOUTME: Commit/push failures drop the branch metadata but never the agent's result

use std::time::Duration;
use tracing::{info, warn};

use cloudagent_artifacts::ArtifactStore;
use cloudagent_sandbox::{SandboxHandle, SandboxProvider};
use cloudagent_tasks::{Task, TaskStatus};

use crate::types::{prompt_excerpt, sh_quote, AgentRunOutput, FinalState, REPO_PATH};

const GIT_TIMEOUT: Duration = Duration::from_secs(60);
const PUSH_TIMEOUT: Duration = Duration::from_secs(120);
const COMMIT_EXCERPT_CHARS: usize = 50;

/// Decide the task's terminal state and, on completion, publish its changes.
///
/// The branch is recorded on the task only when the push succeeded, so a
/// stored branch name always points at real remote content.
pub(crate) async fn reconcile(
    provider: &dyn SandboxProvider,
    handle: &SandboxHandle,
    task: &Task,
    branch_name: &str,
    output: &AgentRunOutput,
    artifacts: &ArtifactStore,
) -> FinalState {
    let (status, result) = decide(output);

    let branch_name = if status == TaskStatus::Completed {
        info!(
            "Task {} completed (cost: ${:.4}, turns: {})",
            task.id, output.cost_usd, output.num_turns
        );
        publish_changes(provider, handle, task, branch_name, artifacts)
            .await
            .then(|| branch_name.to_string())
    } else {
        None
    };

    FinalState {
        status,
        result,
        session_id: output.session_id.clone(),
        branch_name,
    }
}

/// Terminal status and result text for an agent run. A timed-out run failed
/// even when partial output was salvaged.
fn decide(output: &AgentRunOutput) -> (TaskStatus, String) {
    if output.timed_out {
        let result = match &output.result_text {
            Some(partial) => format!("Task timed out. Partial result: {}", partial),
            None => "Task timed out before producing a result".to_string(),
        };
        return (TaskStatus::Failed, result);
    }

    match &output.result_text {
        Some(text) => (TaskStatus::Completed, text.clone()),
        None => (TaskStatus::Failed, "Agent returned no result".to_string()),
    }
}

/// Commit and push the agent's changes. Returns whether the push landed;
/// any failure along the way is logged and the changes stay local to the
/// dying sandbox.
async fn publish_changes(
    provider: &dyn SandboxProvider,
    handle: &SandboxHandle,
    task: &Task,
    branch_name: &str,
    artifacts: &ArtifactStore,
) -> bool {
    let status_cmd = format!("cd {} && git status --porcelain", REPO_PATH);
    let porcelain = match provider.run(handle, &status_cmd, GIT_TIMEOUT).await {
        Ok(output) if output.success() => output.stdout,
        Ok(output) => {
            warn!(
                "git status failed for task {} (exit {}): {}",
                task.id,
                output.exit_code,
                output.stderr.trim()
            );
            return false;
        }
        Err(e) => {
            warn!("git status failed for task {}: {}", task.id, e);
            return false;
        }
    };

    if porcelain.trim().is_empty() {
        info!("Task {} made no repository changes", task.id);
        return false;
    }

    // Snapshot changed files into the artifact store before the sandbox and
    // its filesystem go away
    extract_changed_files(provider, handle, &task.id, &porcelain, artifacts).await;

    let message = commit_message(task);
    let commit_cmd = format!(
        "cd {} && git add -A && git commit -m {}",
        REPO_PATH,
        sh_quote(&message)
    );
    match provider.run(handle, &commit_cmd, GIT_TIMEOUT).await {
        Ok(output) if output.success() => {}
        Ok(output) => {
            warn!(
                "Commit failed for task {} (exit {}): {}",
                task.id,
                output.exit_code,
                output.stderr.trim()
            );
            return false;
        }
        Err(e) => {
            warn!("Commit failed for task {}: {}", task.id, e);
            return false;
        }
    }

    let push_cmd = format!(
        "cd {} && git push -u origin {}",
        REPO_PATH,
        sh_quote(branch_name)
    );
    match provider.run(handle, &push_cmd, PUSH_TIMEOUT).await {
        Ok(output) if output.success() => {
            info!("Pushed task {} changes to {}", task.id, branch_name);
            true
        }
        Ok(output) => {
            warn!(
                "Push failed for task {} (exit {}): {}",
                task.id,
                output.exit_code,
                output.stderr.trim()
            );
            false
        }
        Err(e) => {
            warn!("Push failed for task {}: {}", task.id, e);
            false
        }
    }
}

/// Copy each changed file out of the sandbox, keyed by its repository-relative
/// path. Deletions have no content to copy and are skipped.
async fn extract_changed_files(
    provider: &dyn SandboxProvider,
    handle: &SandboxHandle,
    task_id: &str,
    porcelain: &str,
    artifacts: &ArtifactStore,
) {
    let mut stored = 0usize;
    for relative in changed_paths(porcelain) {
        let path = format!("{}/{}", REPO_PATH, relative);
        let bytes = match provider.read_file(handle, &path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Failed to read changed file {}: {}", relative, e);
                continue;
            }
        };
        match artifacts.store_file(task_id, &relative, &bytes).await {
            Ok(()) => stored += 1,
            Err(e) => warn!("Failed to store changed file {}: {}", relative, e),
        }
    }
    info!("Extracted {} changed files for task {}", stored, task_id);
}

/// Paths from `git status --porcelain` output, skipping deletions and
/// resolving renames to their new name.
fn changed_paths(porcelain: &str) -> Vec<String> {
    porcelain
        .lines()
        .filter_map(|line| {
            if line.len() < 4 {
                return None;
            }
            let (code, rest) = line.split_at(3);
            if code[..2].contains('D') {
                return None;
            }
            let path = match rest.split_once(" -> ") {
                Some((_, renamed_to)) => renamed_to,
                None => rest,
            };
            Some(path.trim().to_string())
        })
        .collect()
}

fn commit_message(task: &Task) -> String {
    let short_id: String = task.id.chars().take(8).collect();
    format!(
        "ca: task {} - {}",
        short_id,
        prompt_excerpt(&task.prompt, COMMIT_EXCERPT_CHARS)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn make_task(id: &str, prompt: &str) -> Task {
        Task {
            id: id.to_string(),
            prompt: prompt.to_string(),
            repository_url: "https://github.com/acme/api.git".to_string(),
            status: TaskStatus::Running,
            result: None,
            sandbox_id: None,
            session_id: None,
            branch_name: None,
            parent_task_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_decide_completed() {
        let output = AgentRunOutput {
            result_text: Some("added the endpoint".to_string()),
            ..Default::default()
        };
        let (status, result) = decide(&output);
        assert_eq!(status, TaskStatus::Completed);
        assert_eq!(result, "added the endpoint");
    }

    #[test]
    fn test_decide_timeout_keeps_partial_result() {
        let output = AgentRunOutput {
            result_text: Some("got halfway".to_string()),
            timed_out: true,
            ..Default::default()
        };
        let (status, result) = decide(&output);
        assert_eq!(status, TaskStatus::Failed);
        assert!(result.contains("timed out"));
        assert!(result.contains("got halfway"));
    }

    #[test]
    fn test_decide_timeout_without_result() {
        let output = AgentRunOutput {
            timed_out: true,
            ..Default::default()
        };
        let (status, result) = decide(&output);
        assert_eq!(status, TaskStatus::Failed);
        assert_eq!(result, "Task timed out before producing a result");
    }

    #[test]
    fn test_decide_no_result_fails() {
        let (status, result) = decide(&AgentRunOutput::default());
        assert_eq!(status, TaskStatus::Failed);
        assert_eq!(result, "Agent returned no result");
    }

    #[test]
    fn test_changed_paths_skips_deletions_and_resolves_renames() {
        let porcelain = " M src/main.rs\n?? src/new.rs\n D gone.txt\nR  old.rs -> new.rs\n";
        assert_eq!(
            changed_paths(porcelain),
            vec!["src/main.rs", "src/new.rs", "new.rs"]
        );
    }

    #[test]
    fn test_commit_message_truncates_prompt() {
        let task = make_task(
            "0a1b2c3d-4e5f-6071-8293-a4b5c6d7e8f9",
            &"describe the work ".repeat(10),
        );
        let message = commit_message(&task);
        assert!(message.starts_with("ca: task 0a1b2c3d - "));
        assert!(message.len() < 80);
    }
}
