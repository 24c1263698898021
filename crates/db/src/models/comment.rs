use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::RepositoryError;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Comment {
    pub id: Uuid,
    pub task_id: Uuid,
    pub author_id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewComment {
    pub task_id: Uuid,
    pub author_id: Uuid,
    pub content: String,
}

#[async_trait]
pub trait CommentStore: Send + Sync {
    async fn create(&self, data: NewComment) -> Result<Comment, RepositoryError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Comment>, RepositoryError>;

    /// Live comments, oldest first.
    async fn list_by_task(&self, task_id: Uuid) -> Result<Vec<Comment>, RepositoryError>;

    async fn update(&self, id: Uuid, content: &str) -> Result<Comment, RepositoryError>;

    async fn soft_delete(&self, id: Uuid) -> Result<(), RepositoryError>;
}
