use db::models::{
    comment::{Comment, NewComment},
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
    validation::{COMMENT_MAX, Validator},
};

#[derive(Debug, Clone, Deserialize)]
pub struct CommentBody {
    pub content: String,
}

impl CommentBody {
    pub fn validate(&self) -> Result<(), ServiceError> {
        let mut v = Validator::new();
        v.required_text("content", &self.content, COMMENT_MAX);
        v.finish()
    }
}

fn comment_not_found() -> ServiceError {
    ServiceError::not_found("COMMENT_NOT_FOUND", "Комментарий не найден")
}

#[derive(Clone)]
pub struct CommentService {
    ctx: ServiceContext,
}

impl CommentService {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    async fn load(&self, id: Uuid) -> Result<Comment, ServiceError> {
        self.ctx
            .stores
            .comments
            .find_by_id(id)
            .await?
            .ok_or_else(comment_not_found)
    }

    pub async fn list(&self, actor: &User, task_id: Uuid) -> Result<Vec<Comment>, ServiceError> {
        task_with_permission(&self.ctx, actor, task_id, Permission::ViewProject).await?;
        Ok(self.ctx.stores.comments.list_by_task(task_id).await?)
    }

    pub async fn create(
        &self,
        actor: &User,
        task_id: Uuid,
        body: CommentBody,
    ) -> Result<Comment, ServiceError> {
        let task = task_with_permission(&self.ctx, actor, task_id, Permission::Comment).await?;
        body.validate()?;
        let comment = self
            .ctx
            .stores
            .comments
            .create(NewComment {
                task_id,
                author_id: actor.id,
                content: body.content.trim().to_string(),
            })
            .await?;
        self.ctx.events.emit(
            EventKind::CommentCreated,
            Some(task.project_id),
            comment.id,
            actor.id,
        );
        Ok(comment)
    }

    /// Only the author edits a comment.
    pub async fn update(
        &self,
        actor: &User,
        id: Uuid,
        body: CommentBody,
    ) -> Result<Comment, ServiceError> {
        let comment = self.load(id).await?;
        let task = task_with_permission(
            &self.ctx,
            actor,
            comment.task_id,
            Permission::Comment,
        )
        .await?;
        if comment.author_id != actor.id {
            return Err(ServiceError::forbidden(
                "NOT_COMMENT_AUTHOR",
                "Редактировать комментарий может только его автор",
            ));
        }
        body.validate()?;

        let comment = self
            .ctx
            .stores
            .comments
            .update(id, body.content.trim())
            .await?;
        self.ctx.events.emit(
            EventKind::CommentUpdated,
            Some(task.project_id),
            id,
            actor.id,
        );
        Ok(comment)
    }

    /// The author or anyone allowed to manage the project's members.
    pub async fn delete(&self, actor: &User, id: Uuid) -> Result<(), ServiceError> {
        let comment = self.load(id).await?;
        let task = load_task(&self.ctx, comment.task_id).await?;
        if comment.author_id != actor.id {
            let role = self.ctx.access.role_of(task.project_id, actor.id).await?;
            check(actor, role, Permission::ManageMembers)?;
        } else {
            self.ctx
                .access
                .require(actor, task.project_id, Permission::Comment)
                .await?;
        }

        self.ctx.stores.comments.soft_delete(id).await?;
        self.ctx.events.emit(
            EventKind::CommentDeleted,
            Some(task.project_id),
            id,
            actor.id,
        );
        Ok(())
    }
}
