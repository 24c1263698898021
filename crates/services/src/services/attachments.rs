//! Attachment metadata. File contents are stored outside the database under
//! `storage_path`.

use db::models::{
    attachment::{Attachment, NewAttachment},
    user::User,
};
use serde::Deserialize;
use uuid::Uuid;

use super::{
    ServiceContext,
    error::ServiceError,
    events::EventKind,
    permissions::{Permission, check},
    tasks::{load_task, task_with_permission},
    validation::{FILE_SIZE_MAX, MIME_TYPE_MAX, Validator},
};

#[derive(Debug, Clone, Deserialize)]
pub struct CreateAttachment {
    pub file_name: String,
    pub file_size: i64,
    pub mime_type: String,
}

impl CreateAttachment {
    pub fn validate(&self) -> Result<(), ServiceError> {
        let mut v = Validator::new();
        v.file_name("file_name", &self.file_name)
            .int_range("file_size", self.file_size, 0, FILE_SIZE_MAX)
            .required_text("mime_type", &self.mime_type, MIME_TYPE_MAX);
        v.finish()
    }
}

pub fn storage_path(task_id: Uuid, attachment_id: Uuid, file_name: &str) -> String {
    format!("tasks/{task_id}/{attachment_id}/{file_name}")
}

#[derive(Clone)]
pub struct AttachmentService {
    ctx: ServiceContext,
}

impl AttachmentService {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    pub async fn list(&self, actor: &User, task_id: Uuid) -> Result<Vec<Attachment>, ServiceError> {
        task_with_permission(&self.ctx, actor, task_id, Permission::ViewProject).await?;
        Ok(self.ctx.stores.attachments.list_by_task(task_id).await?)
    }

    pub async fn create(
        &self,
        actor: &User,
        task_id: Uuid,
        req: CreateAttachment,
    ) -> Result<Attachment, ServiceError> {
        let task = task_with_permission(&self.ctx, actor, task_id, Permission::EditTasks).await?;
        req.validate()?;

        let id = Uuid::new_v4();
        let file_name = req.file_name.trim().to_string();
        let attachment = self
            .ctx
            .stores
            .attachments
            .create(NewAttachment {
                id,
                task_id,
                uploaded_by: actor.id,
                storage_path: storage_path(task_id, id, &file_name),
                file_name,
                file_size: req.file_size,
                mime_type: req.mime_type.trim().to_string(),
            })
            .await?;
        self.ctx.events.emit(
            EventKind::AttachmentCreated,
            Some(task.project_id),
            attachment.id,
            actor.id,
        );
        Ok(attachment)
    }

    /// The uploader or a ManageBoards holder.
    pub async fn delete(&self, actor: &User, id: Uuid) -> Result<(), ServiceError> {
        let attachment = self
            .ctx
            .stores
            .attachments
            .find_by_id(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("ATTACHMENT_NOT_FOUND", "Вложение не найдено"))?;
        let task = load_task(&self.ctx, attachment.task_id).await?;
        let permission = if attachment.uploaded_by == actor.id {
            Permission::EditTasks
        } else {
            Permission::ManageBoards
        };
        let role = self.ctx.access.role_of(task.project_id, actor.id).await?;
        check(actor, role, permission)?;

        self.ctx.stores.attachments.soft_delete(id).await?;
        self.ctx.events.emit(
            EventKind::AttachmentDeleted,
            Some(task.project_id),
            id,
            actor.id,
        );
        Ok(())
    }
}
