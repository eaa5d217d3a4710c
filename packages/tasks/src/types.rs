// ABOUTME: Task type definitions
// ABOUTME: Task rows, status lifecycle rules, and storage input structs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Task lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    /// Whether this status is terminal (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    /// Forward-only lifecycle: pending -> running -> {completed, failed}.
    /// `cancelled` may be reached from any non-terminal state. Re-claiming a
    /// running task (at-least-once dispatch) is allowed as a self-transition.
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        match (self, next) {
            (TaskStatus::Pending, TaskStatus::Running) => true,
            (TaskStatus::Pending, TaskStatus::Cancelled) => true,
            (TaskStatus::Running, TaskStatus::Running) => true,
            (TaskStatus::Running, TaskStatus::Completed) => true,
            (TaskStatus::Running, TaskStatus::Failed) => true,
            (TaskStatus::Running, TaskStatus::Cancelled) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

/// A dispatched agent task and its durable record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    /// Natural-language prompt describing the work (immutable)
    pub prompt: String,
    /// Repository to clone and work on (immutable)
    pub repository_url: String,
    pub status: TaskStatus,
    /// Free-text outcome or error summary, set once terminal
    pub result: Option<String>,
    /// Provider id of the sandbox this attempt ran in (observability only)
    pub sandbox_id: Option<String>,
    /// Agent conversation handle, required to resume the conversation later
    pub session_id: Option<String>,
    /// Branch carrying this task's pushed changes; set only on completion
    pub branch_name: Option<String>,
    /// Task this one resumes from; resumption is a forward chain, never a cycle
    pub parent_task_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a new task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskCreateInput {
    pub prompt: String,
    pub repository_url: String,
    pub parent_task_id: Option<String>,
}

/// Partial update applied to a task row; only provided fields are written.
/// `updated_at` is always bumped.
#[derive(Debug, Clone, Default)]
pub struct TaskUpdate {
    pub status: Option<TaskStatus>,
    pub result: Option<String>,
    pub sandbox_id: Option<String>,
    pub session_id: Option<String>,
    pub branch_name: Option<String>,
}

impl TaskUpdate {
    pub fn status(status: TaskStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn sandbox_id(sandbox_id: impl Into<String>) -> Self {
        Self {
            sandbox_id: Some(sandbox_id.into()),
            ..Default::default()
        }
    }
}
