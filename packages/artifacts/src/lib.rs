// ABOUTME: Stored artifacts for cloudagent tasks
// ABOUTME: Filesystem tree keyed by task id holding transcripts and changed files

pub mod store;

pub use store::{ArtifactError, ArtifactStore, Result};
