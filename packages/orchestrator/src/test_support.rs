// ABOUTME: Scripted sandbox provider for orchestrator tests
// ABOUTME: Matches commands by substring and serves an in-memory sandbox filesystem

use async_trait::async_trait;
use cloudagent_sandbox::{
    CommandOutput, Result as SandboxResult, SandboxError, SandboxHandle, SandboxProvider,
    SandboxSpec,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub const FAKE_SANDBOX_ID: &str = "sbx-test";

#[derive(Clone)]
enum Scripted {
    Output(CommandOutput),
    Timeout,
    Expired,
}

/// Provider double whose command results are scripted per test. Commands are
/// matched against rules by substring, first match wins; unmatched commands
/// succeed with empty output.
pub struct FakeProvider {
    rules: Mutex<Vec<(String, Scripted)>>,
    commands: Mutex<Vec<String>>,
    files: Mutex<HashMap<String, Vec<u8>>>,
    destroy_calls: AtomicU32,
    fail_destroy: AtomicBool,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self {
            rules: Mutex::new(Vec::new()),
            commands: Mutex::new(Vec::new()),
            files: Mutex::new(HashMap::new()),
            destroy_calls: AtomicU32::new(0),
            fail_destroy: AtomicBool::new(false),
        }
    }

    pub fn on(&self, pattern: &str, exit_code: i64, stdout: &str, stderr: &str) {
        self.rules.lock().unwrap().push((
            pattern.to_string(),
            Scripted::Output(CommandOutput {
                exit_code,
                stdout: stdout.to_string(),
                stderr: stderr.to_string(),
            }),
        ));
    }

    pub fn timeout_on(&self, pattern: &str) {
        self.rules
            .lock()
            .unwrap()
            .push((pattern.to_string(), Scripted::Timeout));
    }

    pub fn expire_on(&self, pattern: &str) {
        self.rules
            .lock()
            .unwrap()
            .push((pattern.to_string(), Scripted::Expired));
    }

    pub fn seed_file(&self, path: &str, contents: &[u8]) {
        self.files
            .lock()
            .unwrap()
            .insert(path.to_string(), contents.to_vec());
    }

    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.files.lock().unwrap().get(path).cloned()
    }

    pub fn ran(&self, pattern: &str) -> bool {
        self.commands
            .lock()
            .unwrap()
            .iter()
            .any(|c| c.contains(pattern))
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    pub fn destroy_calls(&self) -> u32 {
        self.destroy_calls.load(Ordering::SeqCst)
    }

    pub fn fail_destroy(&self) {
        self.fail_destroy.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl SandboxProvider for FakeProvider {
    async fn create(&self, _spec: &SandboxSpec) -> SandboxResult<SandboxHandle> {
        Ok(SandboxHandle::new(FAKE_SANDBOX_ID))
    }

    async fn run(
        &self,
        _handle: &SandboxHandle,
        command: &str,
        timeout: Duration,
    ) -> SandboxResult<CommandOutput> {
        self.commands.lock().unwrap().push(command.to_string());

        let matched = self
            .rules
            .lock()
            .unwrap()
            .iter()
            .find(|(pattern, _)| command.contains(pattern.as_str()))
            .map(|(_, scripted)| scripted.clone());

        match matched {
            Some(Scripted::Output(output)) => Ok(output),
            Some(Scripted::Timeout) => Err(SandboxError::CommandTimeout {
                seconds: timeout.as_secs(),
            }),
            Some(Scripted::Expired) => Err(SandboxError::NotFound(FAKE_SANDBOX_ID.to_string())),
            None => Ok(CommandOutput::default()),
        }
    }

    async fn read_file(&self, _handle: &SandboxHandle, path: &str) -> SandboxResult<Vec<u8>> {
        self.files
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| SandboxError::File {
                path: path.to_string(),
                message: "no such file".to_string(),
            })
    }

    async fn write_file(
        &self,
        _handle: &SandboxHandle,
        path: &str,
        contents: &[u8],
    ) -> SandboxResult<()> {
        self.files
            .lock()
            .unwrap()
            .insert(path.to_string(), contents.to_vec());
        Ok(())
    }

    async fn destroy(&self, handle: &SandboxHandle) -> SandboxResult<()> {
        self.destroy_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_destroy.load(Ordering::SeqCst) {
            return Err(SandboxError::NotFound(handle.id.clone()));
        }
        Ok(())
    }
}
