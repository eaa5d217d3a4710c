// ABOUTME: Core type definitions for the sandbox gateway
// ABOUTME: Sandbox specs, handles, and command results for remote execution

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Specification for a new sandbox
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxSpec {
    /// Provider template to boot (agent CLI, git, and language runtimes preinstalled)
    pub template: String,
    /// Hard wall-clock lifetime in seconds; the provider kills the sandbox
    /// after this regardless of what the orchestrator is doing
    pub timeout_secs: u64,
    /// Environment variables injected at boot, secrets included
    pub env: HashMap<String, String>,
}

/// Handle to a live sandbox
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxHandle {
    /// Provider-assigned sandbox id
    pub id: String,
}

impl SandboxHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// Result of a command run inside a sandbox.
///
/// A non-zero exit code is a normal result, not an error; callers inspect
/// `exit_code` themselves. Timeouts never produce a `CommandOutput` because
/// the killed process has no exit code.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommandOutput {
    pub exit_code: i64,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_output_success() {
        let ok = CommandOutput {
            exit_code: 0,
            stdout: "done".to_string(),
            stderr: String::new(),
        };
        assert!(ok.success());

        let failed = CommandOutput {
            exit_code: 128,
            stdout: String::new(),
            stderr: "fatal: repository not found".to_string(),
        };
        assert!(!failed.success());
    }
}
