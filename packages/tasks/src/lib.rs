// ABOUTME: Task registry for cloudagent
// ABOUTME: Task model, status lifecycle, and SQLite storage

pub mod storage;
pub mod types;

pub use storage::{run_migrations, StorageError, TaskStorage};
pub use types::{Task, TaskCreateInput, TaskStatus, TaskUpdate};
