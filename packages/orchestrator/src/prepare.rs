// ABOUTME: Environment preparer for freshly created sandboxes
// ABOUTME: Git identity and best-effort toolkit install; failures never block the task

use std::time::Duration;
use tracing::{debug, warn};

use cloudagent_sandbox::{SandboxHandle, SandboxProvider};

use crate::config::OrchestratorConfig;
use crate::types::{sh_quote, TOOLKIT_PATH};

const SETUP_TIMEOUT: Duration = Duration::from_secs(60);
const INSTALL_TIMEOUT: Duration = Duration::from_secs(120);

/// Configure git identity and install the auxiliary command toolkit.
///
/// Never fails: a broken auxiliary tool must not block the primary task, so
/// every failure here is logged and the run proceeds without it.
pub(crate) async fn prepare_environment(
    provider: &dyn SandboxProvider,
    handle: &SandboxHandle,
    config: &OrchestratorConfig,
) {
    configure_git_identity(provider, handle, config).await;
    install_toolkit(provider, handle, config).await;
}

async fn configure_git_identity(
    provider: &dyn SandboxProvider,
    handle: &SandboxHandle,
    config: &OrchestratorConfig,
) {
    let email_cmd = format!(
        "git config --global user.email {}",
        sh_quote(&config.git_author_email)
    );
    match provider.run(handle, &email_cmd, SETUP_TIMEOUT).await {
        Ok(output) if output.success() => {}
        Ok(output) => {
            warn!(
                "Failed to set git author email (exit {}): {}",
                output.exit_code,
                output.stderr.trim()
            );
            return;
        }
        Err(e) => {
            warn!("Failed to set git author email: {}", e);
            return;
        }
    }

    let name_cmd = format!(
        "git config --global user.name {}",
        sh_quote(&config.git_author_name)
    );
    match provider.run(handle, &name_cmd, SETUP_TIMEOUT).await {
        Ok(output) if output.success() => {
            debug!("Configured git identity for {}", config.git_author_email);
        }
        Ok(output) => warn!(
            "Failed to set git author name (exit {}): {}",
            output.exit_code,
            output.stderr.trim()
        ),
        Err(e) => warn!("Failed to set git author name: {}", e),
    }
}

async fn install_toolkit(
    provider: &dyn SandboxProvider,
    handle: &SandboxHandle,
    config: &OrchestratorConfig,
) {
    let clone_cmd = format!(
        "git clone {} {}",
        sh_quote(&config.toolkit_repo_url),
        TOOLKIT_PATH
    );
    match provider.run(handle, &clone_cmd, SETUP_TIMEOUT).await {
        Ok(output) if output.success() => {}
        Ok(output) => {
            warn!(
                "Toolkit clone failed (exit {}): {}",
                output.exit_code,
                output.stderr.trim()
            );
            return;
        }
        Err(e) => {
            warn!("Toolkit clone failed: {}", e);
            return;
        }
    }

    let install_cmd = format!("cd {} && ./install.sh", TOOLKIT_PATH);
    match provider.run(handle, &install_cmd, INSTALL_TIMEOUT).await {
        Ok(output) if output.success() => debug!("Installed agent toolkit"),
        Ok(output) => warn!(
            "Toolkit install failed (exit {}): {}",
            output.exit_code,
            output.stderr.trim()
        ),
        Err(e) => warn!("Toolkit install failed: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeProvider;
    use cloudagent_sandbox::SandboxHandle;

    fn fixture() -> (FakeProvider, SandboxHandle, OrchestratorConfig) {
        (
            FakeProvider::new(),
            SandboxHandle::new("sbx-test"),
            OrchestratorConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_runs_all_setup_steps_in_order() {
        let (provider, handle, config) = fixture();

        prepare_environment(&provider, &handle, &config).await;

        let commands = provider.commands();
        assert_eq!(commands.len(), 4);
        assert!(commands[0].contains("git config --global user.email"));
        assert!(commands[1].contains("git config --global user.name"));
        assert!(commands[2].contains("git clone"));
        assert!(commands[3].contains("./install.sh"));
    }

    #[tokio::test]
    async fn test_email_failure_skips_name_but_not_toolkit() {
        let (provider, handle, config) = fixture();
        provider.on("user.email", 1, "", "error: could not lock config file");

        prepare_environment(&provider, &handle, &config).await;

        assert!(!provider.ran("user.name"));
        assert!(provider.ran("git clone"));
    }

    #[tokio::test]
    async fn test_toolkit_clone_failure_skips_install() {
        let (provider, handle, config) = fixture();
        provider.on("git clone", 128, "", "fatal: unable to access");

        prepare_environment(&provider, &handle, &config).await;

        assert!(!provider.ran("./install.sh"));
    }
}
