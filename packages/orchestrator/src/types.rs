// ABOUTME: Shared orchestrator types and in-sandbox path constants
// ABOUTME: Agent run outputs, final task state, and small shell helpers

use cloudagent_tasks::TaskStatus;

/// Working copy location inside the sandbox
pub const REPO_PATH: &str = "/home/user/repo";

/// Where the agent CLI writes session transcripts; the directory name is
/// derived from the working directory path
pub const SESSION_DIR: &str = "/home/user/.claude/projects/-home-user-repo";

/// Prompt file handed to the agent CLI, avoiding shell-escaping the prompt
pub const PROMPT_PATH: &str = "/tmp/task_prompt.txt";

/// Checkout location for the auxiliary command toolkit
pub(crate) const TOOLKIT_PATH: &str = "/tmp/claude-toolkit";

/// Branch namespace for task work
pub const BRANCH_PREFIX: &str = "ca/task/";

/// Branch a task's changes are committed to
pub fn task_branch(task_id: &str) -> String {
    format!("{}{}", BRANCH_PREFIX, task_id)
}

/// What came out of one agent invocation, before reconciliation
#[derive(Debug, Clone, Default)]
pub struct AgentRunOutput {
    /// Conversation handle, from the result message or transcript discovery
    pub session_id: Option<String>,
    /// Agent's final answer text, if it produced one
    pub result_text: Option<String>,
    /// The agent was killed by a timeout or sandbox lifetime expiry
    pub timed_out: bool,
    pub cost_usd: f64,
    pub num_turns: i64,
    pub duration_ms: i64,
}

/// Reconciled terminal state folded back into the task row
#[derive(Debug, Clone)]
pub struct FinalState {
    pub status: TaskStatus,
    pub result: String,
    pub session_id: Option<String>,
    /// Set only when the task completed and its changes were pushed
    pub branch_name: Option<String>,
}

/// Single-quote a string for safe interpolation into a shell command
pub(crate) fn sh_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}

/// First line of a prompt, truncated for logs and commit messages
pub(crate) fn prompt_excerpt(prompt: &str, max_chars: usize) -> String {
    let first_line = prompt.lines().next().unwrap_or("");
    if first_line.chars().count() <= max_chars {
        return first_line.to_string();
    }
    let truncated: String = first_line.chars().take(max_chars).collect();
    format!("{}...", truncated)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_branch_uses_prefix() {
        assert_eq!(task_branch("abc-123"), "ca/task/abc-123");
    }

    #[test]
    fn test_sh_quote_plain() {
        assert_eq!(sh_quote("hello"), "'hello'");
    }

    #[test]
    fn test_sh_quote_embedded_quote() {
        assert_eq!(sh_quote("it's"), "'it'\\''s'");
    }

    #[test]
    fn test_prompt_excerpt_truncates() {
        let long = "a".repeat(150);
        let excerpt = prompt_excerpt(&long, 100);
        assert_eq!(excerpt.chars().count(), 103);
        assert!(excerpt.ends_with("..."));
    }

    #[test]
    fn test_prompt_excerpt_first_line_only() {
        assert_eq!(prompt_excerpt("fix the bug\nthen run tests", 100), "fix the bug");
    }
}
