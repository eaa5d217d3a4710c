// ABOUTME: Filesystem-backed artifact store keyed by task id
// ABOUTME: Persists session transcripts and extracted changed files for later resumption

use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// Transcript filename inside a task's artifact directory
const TRANSCRIPT_FILE: &str = "session.jsonl";

/// Subdirectory holding extracted changed files
const FILES_DIR: &str = "files";

#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("Invalid artifact path: {0}")]
    InvalidPath(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ArtifactError>;

/// Store for per-task artifacts: the agent session transcript and the files
/// the agent changed. Written by a task's run, read back when a child task
/// resumes from it.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory holding all artifacts for one task
    pub fn task_dir(&self, task_id: &str) -> PathBuf {
        self.root.join(task_id)
    }

    fn transcript_path(&self, task_id: &str) -> PathBuf {
        self.task_dir(task_id).join(TRANSCRIPT_FILE)
    }

    fn files_dir(&self, task_id: &str) -> PathBuf {
        self.task_dir(task_id).join(FILES_DIR)
    }

    /// Store a session transcript for a task.
    ///
    /// The transcript is line-delimited JSON written progressively by the
    /// agent; if the copy raced a mid-line write, the trailing partial line is
    /// dropped so every stored line is complete. An empty input writes the
    /// empty placeholder file downstream code expects to exist.
    pub async fn store_transcript(&self, task_id: &str, contents: &[u8]) -> Result<PathBuf> {
        let path = self.transcript_path(task_id);
        tokio::fs::create_dir_all(self.task_dir(task_id)).await?;

        let complete = match contents.iter().rposition(|&b| b == b'\n') {
            Some(pos) => &contents[..=pos],
            None => {
                if !contents.is_empty() {
                    warn!(
                        "Transcript for task {} has no complete lines ({} bytes dropped)",
                        task_id,
                        contents.len()
                    );
                }
                &[]
            }
        };

        let mut file = tokio::fs::File::create(&path).await?;
        file.write_all(complete).await?;
        file.flush().await?;

        debug!(
            "Stored transcript for task {} ({} bytes)",
            task_id,
            complete.len()
        );
        Ok(path)
    }

    /// Read a task's stored transcript, or None if it was never written
    pub async fn read_transcript(&self, task_id: &str) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(self.transcript_path(task_id)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Store one extracted file under the task's files/ tree, preserving its
    /// repository-relative path
    pub async fn store_file(&self, task_id: &str, relative_path: &str, contents: &[u8]) -> Result<()> {
        let relative = Self::validate_relative(relative_path)?;
        let path = self.files_dir(task_id).join(relative);

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, contents).await?;

        debug!(
            "Stored file {} for task {} ({} bytes)",
            relative_path,
            task_id,
            contents.len()
        );
        Ok(())
    }

    /// Read one stored file by its repository-relative path
    pub async fn read_file(&self, task_id: &str, relative_path: &str) -> Result<Vec<u8>> {
        let relative = Self::validate_relative(relative_path)?;
        Ok(tokio::fs::read(self.files_dir(task_id).join(relative)).await?)
    }

    /// List the repository-relative paths of all stored files for a task.
    /// Returns an empty list when the task stored no files.
    pub async fn list_files(&self, task_id: &str) -> Result<Vec<String>> {
        let base = self.files_dir(task_id);
        if !base.exists() {
            return Ok(Vec::new());
        }

        let mut found = Vec::new();
        let mut pending = vec![base.clone()];
        while let Some(dir) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    pending.push(path);
                } else if let Ok(relative) = path.strip_prefix(&base) {
                    found.push(relative.to_string_lossy().replace('\\', "/"));
                }
            }
        }

        found.sort();
        Ok(found)
    }

    /// Reject absolute paths and parent-directory traversal
    fn validate_relative(relative_path: &str) -> Result<&Path> {
        let path = Path::new(relative_path);
        let safe = !path.as_os_str().is_empty()
            && path
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if safe {
            Ok(path)
        } else {
            Err(ArtifactError::InvalidPath(relative_path.to_string()))
        }
    }
}
