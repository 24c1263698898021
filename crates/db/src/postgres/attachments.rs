use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    RepositoryError,
    models::attachment::{Attachment, AttachmentStore, NewAttachment},
};

const ATTACHMENT_COLUMNS: &str = "id, task_id, uploaded_by, file_name, file_size, mime_type, \
    storage_path, created_at, deleted_at";

pub struct PgAttachmentRepository {
    pool: PgPool,
}

impl PgAttachmentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AttachmentStore for PgAttachmentRepository {
    async fn create(&self, data: NewAttachment) -> Result<Attachment, RepositoryError> {
        let attachment = sqlx::query_as::<_, Attachment>(&format!(
            r#"
            INSERT INTO attachments (
                id, task_id, uploaded_by, file_name, file_size, mime_type, storage_path
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {ATTACHMENT_COLUMNS}
            "#
        ))
        .bind(data.id)
        .bind(data.task_id)
        .bind(data.uploaded_by)
        .bind(data.file_name)
        .bind(data.file_size)
        .bind(data.mime_type)
        .bind(data.storage_path)
        .fetch_one(&self.pool)
        .await?;

        Ok(attachment)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Attachment>, RepositoryError> {
        let attachment = sqlx::query_as::<_, Attachment>(&format!(
            "SELECT {ATTACHMENT_COLUMNS} FROM attachments WHERE id = $1 AND deleted_at IS NULL"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(attachment)
    }

    async fn list_by_task(&self, task_id: Uuid) -> Result<Vec<Attachment>, RepositoryError> {
        let attachments = sqlx::query_as::<_, Attachment>(&format!(
            r#"
            SELECT {ATTACHMENT_COLUMNS}
            FROM attachments
            WHERE task_id = $1 AND deleted_at IS NULL
            ORDER BY created_at ASC
            "#
        ))
        .bind(task_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(attachments)
    }

    async fn soft_delete(&self, id: Uuid) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE attachments SET deleted_at = NOW() WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}
