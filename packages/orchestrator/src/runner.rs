// ABOUTME: Agent runner: non-interactive agent CLI invocation in JSON mode
// ABOUTME: Salvages the session transcript whether or not the agent survived

use serde::Deserialize;
use std::time::Duration;
use tracing::{info, warn};

use cloudagent_artifacts::ArtifactStore;
use cloudagent_sandbox::{SandboxError, SandboxHandle, SandboxProvider};

use crate::error::Result;
use crate::types::{prompt_excerpt, sh_quote, AgentRunOutput, PROMPT_PATH, REPO_PATH, SESSION_DIR};

const DISCOVER_TIMEOUT: Duration = Duration::from_secs(30);
const PROMPT_LOG_CHARS: usize = 100;

/// Final machine-parsable message the agent CLI prints in JSON output mode
#[derive(Debug, Deserialize)]
struct AgentResultMessage {
    #[serde(rename = "type")]
    message_type: String,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    total_cost_usd: Option<f64>,
    #[serde(default)]
    num_turns: Option<i64>,
    #[serde(default)]
    duration_ms: Option<i64>,
}

/// Run the agent against the staged repository and store its transcript.
///
/// A timeout, or the sandbox reaching its hard lifetime mid-run, is a normal
/// outcome recorded as `timed_out`; the transcript is salvaged either way.
/// Only transport-level failures propagate as errors.
pub(crate) async fn run_agent(
    provider: &dyn SandboxProvider,
    handle: &SandboxHandle,
    task_id: &str,
    prompt: &str,
    resume_session_id: Option<&str>,
    timeout: Duration,
    artifacts: &ArtifactStore,
) -> Result<AgentRunOutput> {
    info!(
        "Running agent for task {} ({}s budget): {}",
        task_id,
        timeout.as_secs(),
        prompt_excerpt(prompt, PROMPT_LOG_CHARS)
    );

    // The prompt goes through a file so arbitrary user text never needs
    // shell escaping
    provider
        .write_file(handle, PROMPT_PATH, prompt.as_bytes())
        .await?;

    let mut command = format!(
        "cd {} && claude -p \"$(cat {})\" --output-format json --permission-mode bypassPermissions",
        REPO_PATH, PROMPT_PATH
    );
    if let Some(session_id) = resume_session_id {
        command.push_str(&format!(" --resume {}", sh_quote(session_id)));
    }

    let mut output = AgentRunOutput::default();
    match provider.run(handle, &command, timeout).await {
        Ok(result) => {
            info!(
                "Agent for task {} exited with code {}",
                task_id, result.exit_code
            );
            match parse_final_message(&result.stdout) {
                Some(message) => {
                    output.session_id = message.session_id;
                    output.result_text = message.result;
                    output.cost_usd = message.total_cost_usd.unwrap_or(0.0);
                    output.num_turns = message.num_turns.unwrap_or(0);
                    output.duration_ms = message.duration_ms.unwrap_or(0);
                }
                None => {
                    warn!("Agent for task {} produced no parsable result message", task_id);
                }
            }
        }
        Err(SandboxError::CommandTimeout { seconds }) => {
            warn!("Agent for task {} timed out after {}s", task_id, seconds);
            output.timed_out = true;
        }
        Err(SandboxError::NotFound(sandbox_id)) => {
            // The provider killed the sandbox at its hard lifetime while the
            // agent was still running
            warn!(
                "Sandbox {} expired while agent for task {} was running",
                sandbox_id, task_id
            );
            output.timed_out = true;
        }
        Err(e) => return Err(e.into()),
    }

    salvage_transcript(provider, handle, task_id, &mut output, artifacts).await?;
    Ok(output)
}

/// Copy whatever transcript exists out of the sandbox. The transcript is the
/// only durable record of the work performed, so this runs whether or not
/// the agent process survived. When nothing can be read, an empty transcript
/// is stored so the artifact always exists.
async fn salvage_transcript(
    provider: &dyn SandboxProvider,
    handle: &SandboxHandle,
    task_id: &str,
    output: &mut AgentRunOutput,
    artifacts: &ArtifactStore,
) -> Result<()> {
    if output.session_id.is_none() {
        output.session_id = discover_session_id(provider, handle).await;
    }

    let session_id = match &output.session_id {
        Some(session_id) => session_id,
        None => {
            warn!("No session found for task {}, storing empty transcript", task_id);
            artifacts.store_transcript(task_id, b"").await?;
            return Ok(());
        }
    };

    let path = format!("{}/{}.jsonl", SESSION_DIR, session_id);
    match provider.read_file(handle, &path).await {
        Ok(bytes) => {
            info!(
                "Stored transcript for task {} ({} bytes)",
                task_id,
                bytes.len()
            );
            artifacts.store_transcript(task_id, &bytes).await?;
        }
        Err(e) => {
            warn!("Failed to read transcript for task {}: {}", task_id, e);
            artifacts.store_transcript(task_id, b"").await?;
        }
    }
    Ok(())
}

/// The agent names the transcript file after its session id, so even when
/// the process died before printing a result the id is discoverable on disk.
async fn discover_session_id(
    provider: &dyn SandboxProvider,
    handle: &SandboxHandle,
) -> Option<String> {
    let command = format!("ls -t {} 2>/dev/null | head -n 1", SESSION_DIR);
    match provider.run(handle, &command, DISCOVER_TIMEOUT).await {
        Ok(output) if output.success() => output
            .stdout
            .trim()
            .strip_suffix(".jsonl")
            .filter(|name| !name.is_empty())
            .map(|name| name.to_string()),
        Ok(_) => None,
        Err(e) => {
            warn!("Failed to list session directory: {}", e);
            None
        }
    }
}

/// Scan stdout bottom-up for the final `result` message. The CLI may print
/// other JSON lines and stray non-JSON output around it.
fn parse_final_message(stdout: &str) -> Option<AgentResultMessage> {
    stdout.lines().rev().find_map(|line| {
        let line = line.trim();
        if !line.starts_with('{') {
            return None;
        }
        serde_json::from_str::<AgentResultMessage>(line)
            .ok()
            .filter(|message| message.message_type == "result")
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeProvider;
    use cloudagent_artifacts::ArtifactStore;

    const RESULT_LINE: &str = "{\"type\":\"result\",\"subtype\":\"success\",\"result\":\"done\",\"session_id\":\"sess-1\",\"total_cost_usd\":0.12,\"num_turns\":4,\"duration_ms\":8000}";

    fn fixture() -> (FakeProvider, SandboxHandle, tempfile::TempDir, ArtifactStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        (FakeProvider::new(), SandboxHandle::new("sbx-test"), dir, store)
    }

    #[test]
    fn test_parse_final_message_ignores_noise() {
        let stdout = format!(
            "npm warn something\n{{\"type\":\"system\",\"subtype\":\"init\"}}\n{}\ntrailing noise",
            RESULT_LINE
        );
        let message = parse_final_message(&stdout).unwrap();
        assert_eq!(message.result.as_deref(), Some("done"));
        assert_eq!(message.session_id.as_deref(), Some("sess-1"));
        assert_eq!(message.num_turns, Some(4));
    }

    #[test]
    fn test_parse_final_message_none_without_result() {
        assert!(parse_final_message("{\"type\":\"system\"}\nplain text\n").is_none());
        assert!(parse_final_message("").is_none());
    }

    #[tokio::test]
    async fn test_successful_run_stores_transcript() {
        let (provider, handle, _dir, artifacts) = fixture();
        provider.on("claude -p", 0, RESULT_LINE, "");
        provider.seed_file(
            "/home/user/.claude/projects/-home-user-repo/sess-1.jsonl",
            b"{\"type\":\"system\"}\n{\"type\":\"result\"}\n",
        );

        let output = run_agent(&provider, &handle, "t-1", "do it", None, Duration::from_secs(300), &artifacts)
            .await
            .unwrap();

        assert_eq!(output.result_text.as_deref(), Some("done"));
        assert_eq!(output.session_id.as_deref(), Some("sess-1"));
        assert!(!output.timed_out);
        assert!((output.cost_usd - 0.12).abs() < f64::EPSILON);

        let transcript = artifacts.read_transcript("t-1").await.unwrap().unwrap();
        assert_eq!(transcript, b"{\"type\":\"system\"}\n{\"type\":\"result\"}\n");
    }

    #[tokio::test]
    async fn test_prompt_is_written_to_file_not_escaped() {
        let (provider, handle, _dir, artifacts) = fixture();
        provider.on("claude -p", 0, RESULT_LINE, "");
        provider.seed_file(
            "/home/user/.claude/projects/-home-user-repo/sess-1.jsonl",
            b"{}\n",
        );

        let prompt = "rename `foo`; echo \"don't break\"";
        run_agent(&provider, &handle, "t-1", prompt, None, Duration::from_secs(300), &artifacts)
            .await
            .unwrap();

        assert_eq!(provider.file(PROMPT_PATH).unwrap(), prompt.as_bytes());
    }

    #[tokio::test]
    async fn test_resume_passes_session_flag() {
        let (provider, handle, _dir, artifacts) = fixture();
        provider.on("claude -p", 0, RESULT_LINE, "");
        provider.seed_file(
            "/home/user/.claude/projects/-home-user-repo/sess-1.jsonl",
            b"{}\n",
        );

        run_agent(
            &provider,
            &handle,
            "t-1",
            "continue",
            Some("sess-0"),
            Duration::from_secs(300),
            &artifacts,
        )
        .await
        .unwrap();

        assert!(provider.ran("--resume 'sess-0'"));
    }

    #[tokio::test]
    async fn test_timeout_salvages_partial_transcript() {
        let (provider, handle, _dir, artifacts) = fixture();
        provider.timeout_on("claude -p");
        provider.on("ls -t", 0, "sess-7.jsonl\n", "");
        provider.seed_file(
            "/home/user/.claude/projects/-home-user-repo/sess-7.jsonl",
            b"{\"n\":1}\n{\"n\":2}\n{\"n\":3}\n{\"n\":4,\"partial",
        );

        let output = run_agent(&provider, &handle, "t-1", "do it", None, Duration::from_secs(300), &artifacts)
            .await
            .unwrap();

        assert!(output.timed_out);
        assert!(output.result_text.is_none());
        assert_eq!(output.session_id.as_deref(), Some("sess-7"));

        let transcript = artifacts.read_transcript("t-1").await.unwrap().unwrap();
        let text = String::from_utf8(transcript).unwrap();
        assert_eq!(text.lines().count(), 3);
        for line in text.lines() {
            serde_json::from_str::<serde_json::Value>(line).unwrap();
        }
    }

    #[tokio::test]
    async fn test_sandbox_expiry_treated_as_timeout() {
        let (provider, handle, _dir, artifacts) = fixture();
        provider.expire_on("claude -p");
        provider.on("ls -t", 0, "", "");

        let output = run_agent(&provider, &handle, "t-1", "do it", None, Duration::from_secs(300), &artifacts)
            .await
            .unwrap();

        assert!(output.timed_out);
        // Nothing readable, but the artifact still exists
        let transcript = artifacts.read_transcript("t-1").await.unwrap().unwrap();
        assert!(transcript.is_empty());
    }

    #[tokio::test]
    async fn test_no_session_stores_empty_transcript() {
        let (provider, handle, _dir, artifacts) = fixture();
        provider.on("claude -p", 1, "segfault", "");
        provider.on("ls -t", 0, "", "");

        let output = run_agent(&provider, &handle, "t-1", "do it", None, Duration::from_secs(300), &artifacts)
            .await
            .unwrap();

        assert!(output.session_id.is_none());
        assert!(output.result_text.is_none());
        let transcript = artifacts.read_transcript("t-1").await.unwrap().unwrap();
        assert!(transcript.is_empty());
    }
}
