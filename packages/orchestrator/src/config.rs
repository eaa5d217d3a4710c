// ABOUTME: Orchestrator configuration loaded from environment variables
// ABOUTME: Timeouts, sandbox template, git identity, and credentials passed into sandboxes

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

use crate::error::{OrchestratorError, Result};

const DEFAULT_SANDBOX_TIMEOUT_SECS: u64 = 600;
const DEFAULT_AGENT_TIMEOUT_SECS: u64 = 300;
const DEFAULT_SANDBOX_TEMPLATE: &str = "cloud-agent-v1";
const DEFAULT_TOOLKIT_REPO_URL: &str = "https://github.com/cloudagent-dev/agent-toolkit.git";
const DEFAULT_GIT_AUTHOR_NAME: &str = "Cloud Agent";
const DEFAULT_GIT_AUTHOR_EMAIL: &str = "agent@cloudagent.dev";
const DEFAULT_ARTIFACTS_DIR: &str = "logs/tasks";

/// Runtime configuration for the execution coordinator
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// API key credential for the agent CLI
    pub anthropic_api_key: Option<String>,
    /// OAuth token credential for the agent CLI; either credential suffices
    pub claude_code_oauth_token: Option<String>,
    /// Token for cloning and pushing repositories
    pub github_token: Option<String>,
    pub git_author_name: String,
    pub git_author_email: String,
    pub toolkit_repo_url: String,
    /// Provider template to boot sandboxes from
    pub sandbox_template: String,
    /// Hard sandbox lifetime; the provider kills the sandbox after this
    pub sandbox_timeout: Duration,
    /// Wall-clock budget for the agent process, shorter than the sandbox
    /// lifetime so salvage and teardown still have room to run
    pub agent_timeout: Duration,
    /// Local root for stored task artifacts
    pub artifacts_dir: PathBuf,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            anthropic_api_key: None,
            claude_code_oauth_token: None,
            github_token: None,
            git_author_name: DEFAULT_GIT_AUTHOR_NAME.to_string(),
            git_author_email: DEFAULT_GIT_AUTHOR_EMAIL.to_string(),
            toolkit_repo_url: DEFAULT_TOOLKIT_REPO_URL.to_string(),
            sandbox_template: DEFAULT_SANDBOX_TEMPLATE.to_string(),
            sandbox_timeout: Duration::from_secs(DEFAULT_SANDBOX_TIMEOUT_SECS),
            agent_timeout: Duration::from_secs(DEFAULT_AGENT_TIMEOUT_SECS),
            artifacts_dir: PathBuf::from(DEFAULT_ARTIFACTS_DIR),
        }
    }
}

impl OrchestratorConfig {
    /// Load configuration from the environment, reading a .env file if present
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let config = Self {
            anthropic_api_key: env_nonempty("SYSTEM_ANTHROPIC_API_KEY"),
            claude_code_oauth_token: env_nonempty("SYSTEM_CLAUDE_CODE_OAUTH_TOKEN"),
            github_token: env_nonempty("SYSTEM_GITHUB_TOKEN"),
            git_author_name: env_nonempty("GIT_AUTHOR_NAME")
                .unwrap_or_else(|| DEFAULT_GIT_AUTHOR_NAME.to_string()),
            git_author_email: env_nonempty("GIT_AUTHOR_EMAIL")
                .unwrap_or_else(|| DEFAULT_GIT_AUTHOR_EMAIL.to_string()),
            toolkit_repo_url: env_nonempty("TOOLKIT_REPO_URL")
                .unwrap_or_else(|| DEFAULT_TOOLKIT_REPO_URL.to_string()),
            sandbox_template: env_nonempty("SANDBOX_TEMPLATE")
                .unwrap_or_else(|| DEFAULT_SANDBOX_TEMPLATE.to_string()),
            sandbox_timeout: env_duration_secs("SANDBOX_TIMEOUT", DEFAULT_SANDBOX_TIMEOUT_SECS),
            agent_timeout: env_duration_secs("CLAUDE_CODE_TIMEOUT", DEFAULT_AGENT_TIMEOUT_SECS),
            artifacts_dir: env_nonempty("ARTIFACTS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_ARTIFACTS_DIR)),
        };

        debug!(
            "Loaded orchestrator config (sandbox timeout: {}s, agent timeout: {}s)",
            config.sandbox_timeout.as_secs(),
            config.agent_timeout.as_secs()
        );
        config
    }

    /// Environment injected into each sandbox at boot.
    ///
    /// The agent needs one of its two credentials and git operations need a
    /// token; a misconfigured worker fails here, before any sandbox is paid
    /// for.
    pub fn sandbox_env(&self) -> Result<HashMap<String, String>> {
        if self.anthropic_api_key.is_none() && self.claude_code_oauth_token.is_none() {
            return Err(OrchestratorError::InvalidConfiguration(
                "Either ANTHROPIC_API_KEY or CLAUDE_CODE_OAUTH_TOKEN is required".to_string(),
            ));
        }
        let github_token = self.github_token.as_ref().ok_or_else(|| {
            OrchestratorError::InvalidConfiguration("GITHUB_TOKEN is required".to_string())
        })?;

        let mut env = HashMap::new();
        if let Some(key) = &self.anthropic_api_key {
            env.insert("ANTHROPIC_API_KEY".to_string(), key.clone());
        }
        if let Some(token) = &self.claude_code_oauth_token {
            env.insert("CLAUDE_CODE_OAUTH_TOKEN".to_string(), token.clone());
        }
        env.insert("GITHUB_TOKEN".to_string(), github_token.clone());
        Ok(env)
    }
}

fn env_nonempty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_duration_secs(name: &str, default_secs: u64) -> Duration {
    let secs = std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|&v| v > 0)
        .unwrap_or(default_secs);
    Duration::from_secs(secs)
}
