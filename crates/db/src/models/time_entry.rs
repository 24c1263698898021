use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::RepositoryError;

/// Time spent on a task. A running timer has `ended_at = None`.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TimeEntry {
    pub id: Uuid,
    pub task_id: Uuid,
    pub user_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_minutes: Option<i32>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TimeEntry {
    pub fn is_running(&self) -> bool {
        self.ended_at.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct NewTimeEntry {
    pub task_id: Uuid,
    pub user_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_minutes: Option<i32>,
    pub description: Option<String>,
}

#[async_trait]
pub trait TimeEntryStore: Send + Sync {
    async fn create(&self, data: NewTimeEntry) -> Result<TimeEntry, RepositoryError>;

    async fn find_running(
        &self,
        task_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<TimeEntry>, RepositoryError>;

    async fn stop(
        &self,
        id: Uuid,
        ended_at: DateTime<Utc>,
        duration_minutes: i32,
    ) -> Result<TimeEntry, RepositoryError>;

    /// Newest first.
    async fn list_by_task(&self, task_id: Uuid) -> Result<Vec<TimeEntry>, RepositoryError>;
}
