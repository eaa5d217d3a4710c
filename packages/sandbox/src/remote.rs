// ABOUTME: HTTP client for the hosted sandbox provider API
// ABOUTME: Implements the SandboxProvider trait over the provider's REST endpoints

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{Result, SandboxError};
use crate::provider::SandboxProvider;
use crate::types::{CommandOutput, SandboxHandle, SandboxSpec};

/// Extra slack added to the HTTP request deadline so the provider's own
/// command timeout fires first and we get a proper 408 back.
const REQUEST_TIMEOUT_MARGIN: Duration = Duration::from_secs(15);

/// Timeout for control-plane calls (create, files, destroy)
const CONTROL_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Serialize)]
struct CreateRequest<'a> {
    template: &'a str,
    timeout_secs: u64,
    env: &'a std::collections::HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct CreateResponse {
    sandbox_id: String,
}

#[derive(Debug, Serialize)]
struct ExecRequest<'a> {
    command: &'a str,
    timeout_secs: u64,
}

#[derive(Debug, Deserialize)]
struct ExecResponse {
    exit_code: i64,
    #[serde(default)]
    stdout: String,
    #[serde(default)]
    stderr: String,
}

/// Client for the hosted sandbox provider's REST API
pub struct RemoteProvider {
    http: Client,
    base_url: String,
    api_key: String,
}

impl RemoteProvider {
    /// Create a new provider client
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(SandboxError::InvalidConfiguration(
                "provider API key is required".to_string(),
            ));
        }

        let http = Client::builder()
            .timeout(CONTROL_TIMEOUT)
            .build()
            .map_err(SandboxError::Transport)?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn error_body(response: reqwest::Response) -> String {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        format!("HTTP {}: {}", status, body)
    }
}

#[async_trait]
impl SandboxProvider for RemoteProvider {
    async fn create(&self, spec: &SandboxSpec) -> Result<SandboxHandle> {
        debug!("Creating sandbox from template {}", spec.template);

        let request = CreateRequest {
            template: &spec.template,
            timeout_secs: spec.timeout_secs,
            env: &spec.env,
        };

        let response = self
            .http
            .post(self.url("/v1/sandboxes"))
            .header("X-API-Key", &self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SandboxError::CreateFailed(Self::error_body(response).await));
        }

        let created: CreateResponse = response.json().await?;
        info!(
            "Created sandbox {} with {}s lifetime",
            created.sandbox_id, spec.timeout_secs
        );
        Ok(SandboxHandle::new(created.sandbox_id))
    }

    async fn run(
        &self,
        handle: &SandboxHandle,
        command: &str,
        timeout: Duration,
    ) -> Result<CommandOutput> {
        debug!("Running command in sandbox {}: {}", handle.id, command);

        let request = ExecRequest {
            command,
            timeout_secs: timeout.as_secs(),
        };

        let response = self
            .http
            .post(self.url(&format!("/v1/sandboxes/{}/exec", handle.id)))
            .header("X-API-Key", &self.api_key)
            .timeout(timeout + REQUEST_TIMEOUT_MARGIN)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SandboxError::CommandTimeout {
                        seconds: timeout.as_secs(),
                    }
                } else {
                    SandboxError::Transport(e)
                }
            })?;

        match response.status() {
            StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => {
                Err(SandboxError::CommandTimeout {
                    seconds: timeout.as_secs(),
                })
            }
            StatusCode::NOT_FOUND => Err(SandboxError::NotFound(handle.id.clone())),
            status if status.is_success() => {
                let exec: ExecResponse = response.json().await?;
                Ok(CommandOutput {
                    exit_code: exec.exit_code,
                    stdout: exec.stdout,
                    stderr: exec.stderr,
                })
            }
            _ => Err(SandboxError::UnexpectedResponse(
                Self::error_body(response).await,
            )),
        }
    }

    async fn read_file(&self, handle: &SandboxHandle, path: &str) -> Result<Vec<u8>> {
        debug!("Reading file {} from sandbox {}", path, handle.id);

        let response = self
            .http
            .get(self.url(&format!("/v1/sandboxes/{}/files", handle.id)))
            .header("X-API-Key", &self.api_key)
            .query(&[("path", path)])
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => Ok(response.bytes().await?.to_vec()),
            StatusCode::NOT_FOUND => Err(SandboxError::File {
                path: path.to_string(),
                message: "file not found".to_string(),
            }),
            _ => Err(SandboxError::File {
                path: path.to_string(),
                message: Self::error_body(response).await,
            }),
        }
    }

    async fn write_file(&self, handle: &SandboxHandle, path: &str, contents: &[u8]) -> Result<()> {
        debug!(
            "Writing {} bytes to {} in sandbox {}",
            contents.len(),
            path,
            handle.id
        );

        let response = self
            .http
            .put(self.url(&format!("/v1/sandboxes/{}/files", handle.id)))
            .header("X-API-Key", &self.api_key)
            .query(&[("path", path)])
            .body(contents.to_vec())
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SandboxError::File {
                path: path.to_string(),
                message: Self::error_body(response).await,
            });
        }
        Ok(())
    }

    async fn destroy(&self, handle: &SandboxHandle) -> Result<()> {
        debug!("Destroying sandbox {}", handle.id);

        let response = self
            .http
            .delete(self.url(&format!("/v1/sandboxes/{}", handle.id)))
            .header("X-API-Key", &self.api_key)
            .send()
            .await?;

        match response.status() {
            // Already gone is not an error
            StatusCode::NOT_FOUND => {
                debug!("Sandbox {} already destroyed", handle.id);
                Ok(())
            }
            status if status.is_success() => {
                info!("Destroyed sandbox {}", handle.id);
                Ok(())
            }
            _ => Err(SandboxError::UnexpectedResponse(
                Self::error_body(response).await,
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_api_key() {
        let result = RemoteProvider::new("https://api.sandbox.example", "");
        assert!(matches!(
            result,
            Err(SandboxError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let provider = RemoteProvider::new("https://api.sandbox.example/", "key").unwrap();
        assert_eq!(
            provider.url("/v1/sandboxes"),
            "https://api.sandbox.example/v1/sandboxes"
        );
    }

    #[test]
    fn test_exec_response_defaults() {
        let exec: ExecResponse = serde_json::from_str(r#"{"exit_code": 0}"#).unwrap();
        assert_eq!(exec.exit_code, 0);
        assert!(exec.stdout.is_empty());
        assert!(exec.stderr.is_empty());
    }
}
