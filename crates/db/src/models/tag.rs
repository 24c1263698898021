use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::RepositoryError;

/// A tag. `project_id = None` marks a global tag usable in every project.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Tag {
    pub id: Uuid,
    pub project_id: Option<Uuid>,
    pub name: String,
    pub color: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewTag {
    pub project_id: Option<Uuid>,
    pub name: String,
    pub color: String,
}

/// Junction row between tasks and tags.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TaskTag {
    pub task_id: Uuid,
    pub tag_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait TagStore: Send + Sync {
    /// `Conflict` when the name is taken in the same scope.
    async fn create(&self, data: NewTag) -> Result<Tag, RepositoryError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Tag>, RepositoryError>;

    /// Global tags, plus the project's own tags when `project_id` is given.
    async fn list(&self, project_id: Option<Uuid>) -> Result<Vec<Tag>, RepositoryError>;

    async fn delete(&self, id: Uuid) -> Result<(), RepositoryError>;

    async fn list_for_task(&self, task_id: Uuid) -> Result<Vec<Tag>, RepositoryError>;

    /// Replaces every tag on the task.
    async fn set_for_task(&self, task_id: Uuid, tag_ids: &[Uuid])
    -> Result<Vec<Tag>, RepositoryError>;
}
