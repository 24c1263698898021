use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::RepositoryError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "task_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Todo,
    InProgress,
    Review,
    Done,
    Blocked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "task_priority", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Task {
    pub id: Uuid,
    pub project_id: Uuid,
    pub board_id: Uuid,
    pub column_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub assignee_id: Option<Uuid>,
    pub reporter_id: Option<Uuid>,
    pub position: i32,
    pub due_date: Option<DateTime<Utc>>,
    pub estimated_hours: Option<f64>,
    pub actual_minutes: i32,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewTask {
    pub project_id: Uuid,
    pub board_id: Uuid,
    pub column_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub assignee_id: Option<Uuid>,
    pub reporter_id: Option<Uuid>,
    pub due_date: Option<DateTime<Utc>>,
    pub estimated_hours: Option<f64>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Partial task update. Nullable fields use `Some(None)` to clear.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateTaskData {
    pub title: Option<String>,
    #[serde(default, deserialize_with = "utils::serde_helpers::double_option")]
    pub description: Option<Option<String>>,
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    #[serde(default, deserialize_with = "utils::serde_helpers::double_option")]
    pub assignee_id: Option<Option<Uuid>>,
    #[serde(default, deserialize_with = "utils::serde_helpers::double_option")]
    pub due_date: Option<Option<DateTime<Utc>>>,
    #[serde(default, deserialize_with = "utils::serde_helpers::double_option")]
    pub estimated_hours: Option<Option<f64>>,
    /// Derived from `status` by the task service.
    #[serde(skip)]
    pub completed_at: Option<Option<DateTime<Utc>>>,
}

impl UpdateTaskData {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.status.is_none()
            && self.priority.is_none()
            && self.assignee_id.is_none()
            && self.due_date.is_none()
            && self.estimated_hours.is_none()
            && self.completed_at.is_none()
    }
}

/// Task listing filter. All criteria are combined with AND.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskFilter {
    pub project_id: Option<Uuid>,
    pub board_id: Option<Uuid>,
    pub column_id: Option<Uuid>,
    pub assignee_id: Option<Uuid>,
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    /// Case-insensitive substring match on title and description.
    pub search: Option<String>,
    /// Restricts results to these projects; set by the service, never by clients.
    #[serde(skip)]
    pub project_ids: Option<Vec<Uuid>>,
    #[serde(default)]
    pub include_deleted: bool,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub const DEFAULT_TASK_LIMIT: i64 = 100;
pub const MAX_TASK_LIMIT: i64 = 500;

impl TaskFilter {
    pub fn effective_limit(&self) -> i64 {
        self.limit
            .filter(|&n| n > 0)
            .map(|n| n.min(MAX_TASK_LIMIT))
            .unwrap_or(DEFAULT_TASK_LIMIT)
    }

    pub fn effective_offset(&self) -> i64 {
        self.offset.filter(|&n| n > 0).unwrap_or(0)
    }

    pub fn search_term(&self) -> Option<&str> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Appends the task at the end of its column.
    async fn create(&self, data: NewTask) -> Result<Task, RepositoryError>;

    async fn find_by_id(
        &self,
        id: Uuid,
        include_deleted: bool,
    ) -> Result<Option<Task>, RepositoryError>;

    /// Ordered by board, column and position.
    async fn list(&self, filter: &TaskFilter) -> Result<Vec<Task>, RepositoryError>;

    async fn update(&self, id: Uuid, data: UpdateTaskData) -> Result<Task, RepositoryError>;

    /// Moves a task to `position` in `column_id`, shifting siblings in the
    /// source and target columns. The position is clamped to the valid range.
    async fn move_to(
        &self,
        id: Uuid,
        column_id: Uuid,
        board_id: Uuid,
        position: i32,
    ) -> Result<Task, RepositoryError>;

    async fn count_in_column(&self, column_id: Uuid) -> Result<i64, RepositoryError>;

    async fn count_in_board(&self, board_id: Uuid) -> Result<i64, RepositoryError>;

    async fn soft_delete(&self, id: Uuid) -> Result<(), RepositoryError>;

    async fn restore(&self, id: Uuid) -> Result<Task, RepositoryError>;

    async fn add_minutes(&self, id: Uuid, minutes: i32) -> Result<Task, RepositoryError>;
}

/// Target slot for a task moving within one column of `len` live tasks.
pub fn clamp_same_column(position: i32, len: i64) -> i32 {
    let max = (len - 1).max(0) as i32;
    position.clamp(0, max)
}

/// Target slot for a task entering a column holding `len` other live tasks.
pub fn clamp_new_column(position: i32, len: i64) -> i32 {
    position.clamp(0, len.max(0) as i32)
}
