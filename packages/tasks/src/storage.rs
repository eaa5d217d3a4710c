// ABOUTME: Task storage layer using SQLite
// ABOUTME: CRUD operations for task rows with lifecycle-transition validation

use chrono::Utc;
use sqlx::{Row, SqlitePool};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::types::{Task, TaskCreateInput, TaskStatus, TaskUpdate};

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Task not found: {0}")]
    NotFound(String),

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: TaskStatus, to: TaskStatus },

    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Apply the task-registry migrations to a pool
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), StorageError> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub struct TaskStorage {
    pool: SqlitePool,
}

impl TaskStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a new task in `pending` status
    pub async fn create_task(&self, input: TaskCreateInput) -> Result<Task, StorageError> {
        let task_id = Uuid::new_v4().to_string();
        let now = Utc::now();

        debug!("Creating task: {}", task_id);

        sqlx::query(
            r#"
            INSERT INTO tasks (
                id, prompt, repository_url, status, parent_task_id, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&task_id)
        .bind(&input.prompt)
        .bind(&input.repository_url)
        .bind(TaskStatus::Pending)
        .bind(&input.parent_task_id)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.get_task(&task_id).await
    }

    /// Get a single task by ID
    pub async fn get_task(&self, task_id: &str) -> Result<Task, StorageError> {
        debug!("Fetching task: {}", task_id);

        let row = sqlx::query("SELECT * FROM tasks WHERE id = ?")
            .bind(task_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StorageError::NotFound(task_id.to_string()))?;

        Self::row_to_task(&row)
    }

    /// List tasks ordered by creation time (newest first) with pagination
    pub async fn list_tasks_paginated(
        &self,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Task>, i64), StorageError> {
        debug!("Listing tasks (limit: {}, offset: {})", limit, offset);

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tasks")
            .fetch_one(&self.pool)
            .await?;

        let rows = sqlx::query("SELECT * FROM tasks ORDER BY created_at DESC LIMIT ? OFFSET ?")
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        let tasks = rows
            .iter()
            .map(Self::row_to_task)
            .collect::<Result<Vec<_>, _>>()?;

        Ok((tasks, count))
    }

    /// Apply a partial update to a task.
    ///
    /// Status changes are validated against the forward-only lifecycle; the
    /// orchestrator is the sole writer of these fields after creation.
    pub async fn update_task(
        &self,
        task_id: &str,
        update: TaskUpdate,
    ) -> Result<Task, StorageError> {
        debug!("Updating task: {}", task_id);

        let current = self.get_task(task_id).await?;
        if let Some(next) = update.status {
            if !current.status.can_transition_to(next) {
                return Err(StorageError::InvalidTransition {
                    from: current.status,
                    to: next,
                });
            }
        }

        let now = Utc::now();
        let mut updates = vec!["updated_at = ?"];

        if update.status.is_some() {
            updates.push("status = ?");
        }
        if update.result.is_some() {
            updates.push("result = ?");
        }
        if update.sandbox_id.is_some() {
            updates.push("sandbox_id = ?");
        }
        if update.session_id.is_some() {
            updates.push("session_id = ?");
        }
        if update.branch_name.is_some() {
            updates.push("branch_name = ?");
        }

        let query_str = format!("UPDATE tasks SET {} WHERE id = ?", updates.join(", "));
        let mut query = sqlx::query(&query_str).bind(now);

        if let Some(status) = update.status {
            query = query.bind(status);
        }
        if let Some(result) = update.result {
            query = query.bind(result);
        }
        if let Some(sandbox_id) = update.sandbox_id {
            query = query.bind(sandbox_id);
        }
        if let Some(session_id) = update.session_id {
            query = query.bind(session_id);
        }
        if let Some(branch_name) = update.branch_name {
            query = query.bind(branch_name);
        }

        query = query.bind(task_id);
        query.execute(&self.pool).await?;

        self.get_task(task_id).await
    }

    fn row_to_task(row: &sqlx::sqlite::SqliteRow) -> Result<Task, StorageError> {
        Ok(Task {
            id: row.try_get("id")?,
            prompt: row.try_get("prompt")?,
            repository_url: row.try_get("repository_url")?,
            status: row.try_get("status")?,
            result: row.try_get("result")?,
            sandbox_id: row.try_get("sandbox_id")?,
            session_id: row.try_get("session_id")?,
            branch_name: row.try_get("branch_name")?,
            parent_task_id: row.try_get("parent_task_id")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}
