// ABOUTME: Provider trait for ephemeral sandbox backends
// ABOUTME: Abstract create/run/file/destroy contract the orchestrator depends on

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;
use crate::types::{CommandOutput, SandboxHandle, SandboxSpec};

/// Capability interface to an ephemeral-compute provider.
///
/// Implementations are network clients; every method may block for up to its
/// configured timeout. Ownership of a handle passes linearly through the
/// execution pipeline, so implementations do not need per-sandbox locking.
#[async_trait]
pub trait SandboxProvider: Send + Sync {
    /// Provision an isolated environment with injected secrets and a hard
    /// wall-clock lifetime, after which the provider self-terminates it.
    async fn create(&self, spec: &SandboxSpec) -> Result<SandboxHandle>;

    /// Execute a shell command, capturing exit code, stdout, and stderr.
    ///
    /// A non-zero exit code is returned as a normal `CommandOutput`. Exceeding
    /// `timeout` returns `SandboxError::CommandTimeout`; the process is killed
    /// and no exit code is available.
    async fn run(
        &self,
        handle: &SandboxHandle,
        command: &str,
        timeout: Duration,
    ) -> Result<CommandOutput>;

    /// Read a file from the sandbox filesystem.
    async fn read_file(&self, handle: &SandboxHandle, path: &str) -> Result<Vec<u8>>;

    /// Write a file into the sandbox filesystem, creating parent directories.
    async fn write_file(&self, handle: &SandboxHandle, path: &str, contents: &[u8]) -> Result<()>;

    /// Tear down the sandbox. Destroying an already-destroyed sandbox is not
    /// an error; callers treat any failure here as best-effort.
    async fn destroy(&self, handle: &SandboxHandle) -> Result<()>;
}
