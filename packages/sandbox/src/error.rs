// ABOUTME: Error types for sandbox gateway operations
// ABOUTME: Separates command timeouts (no exit code exists) from transport and provider failures

use thiserror::Error;

/// Main error type for sandbox operations
#[derive(Error, Debug)]
pub enum SandboxError {
    /// Sandbox creation failed at the provider
    #[error("Sandbox creation failed: {0}")]
    CreateFailed(String),

    /// Sandbox no longer exists (destroyed, or its hard lifetime expired)
    #[error("Sandbox not found: {0}")]
    NotFound(String),

    /// Command exceeded its timeout. The process was killed, so no exit
    /// code or captured output is available.
    #[error("Command timed out after {seconds} seconds")]
    CommandTimeout { seconds: u64 },

    /// File read/write inside the sandbox failed
    #[error("Sandbox file error at {path}: {message}")]
    File { path: String, message: String },

    /// Missing or invalid provider configuration
    #[error("Invalid sandbox configuration: {0}")]
    InvalidConfiguration(String),

    /// HTTP transport error talking to the provider
    #[error("Provider transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Provider returned a response we could not interpret
    #[error("Unexpected provider response: {0}")]
    UnexpectedResponse(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Type alias for Results that return SandboxError
pub type Result<T> = std::result::Result<T, SandboxError>;
