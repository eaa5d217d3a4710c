// ABOUTME: Sandbox gateway for cloudagent
// ABOUTME: Defines the provider contract the orchestrator drives ephemeral sandboxes through

pub mod error;
pub mod provider;
pub mod remote;
pub mod types;

// Re-export commonly used types
pub use error::{Result, SandboxError};
pub use provider::SandboxProvider;
pub use remote::RemoteProvider;
pub use types::{CommandOutput, SandboxHandle, SandboxSpec};
