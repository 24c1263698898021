use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::RepositoryError;

/// Attachment metadata. File bytes live in external storage at `storage_path`.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Attachment {
    pub id: Uuid,
    pub task_id: Uuid,
    pub uploaded_by: Uuid,
    pub file_name: String,
    pub file_size: i64,
    pub mime_type: String,
    pub storage_path: String,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewAttachment {
    pub id: Uuid,
    pub task_id: Uuid,
    pub uploaded_by: Uuid,
    pub file_name: String,
    pub file_size: i64,
    pub mime_type: String,
    pub storage_path: String,
}

#[async_trait]
pub trait AttachmentStore: Send + Sync {
    async fn create(&self, data: NewAttachment) -> Result<Attachment, RepositoryError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Attachment>, RepositoryError>;

    async fn list_by_task(&self, task_id: Uuid) -> Result<Vec<Attachment>, RepositoryError>;

    async fn soft_delete(&self, id: Uuid) -> Result<(), RepositoryError>;
}
