use db::models::{
    tag::{NewTag, Tag},
    user::User,
};
use serde::Deserialize;
use uuid::Uuid;

use super::{
    ServiceContext,
    error::ServiceError,
    events::EventKind,
    permissions::Permission,
    validation::{TAG_NAME_MAX, Validator},
};

pub const DEFAULT_TAG_COLOR: &str = "#6b7280";

#[derive(Debug, Clone, Deserialize)]
pub struct CreateTag {
    /// `None` creates a global tag.
    pub project_id: Option<Uuid>,
    pub name: String,
    pub color: Option<String>,
}

impl CreateTag {
    pub fn validate(&self) -> Result<(), ServiceError> {
        let mut v = Validator::new();
        v.required_text("name", &self.name, TAG_NAME_MAX);
        if let Some(color) = &self.color {
            v.color("color", color);
        }
        v.finish()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TagQuery {
    pub project_id: Option<Uuid>,
}

#[derive(Clone)]
pub struct TagService {
    ctx: ServiceContext,
}

impl TagService {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    /// Global tags managed by admins; project tags by ManageBoards holders.
    async fn require_manage(
        &self,
        actor: &User,
        project_id: Option<Uuid>,
    ) -> Result<(), ServiceError> {
        match project_id {
            Some(project_id) => {
                self.ctx
                    .access
                    .require(actor, project_id, Permission::ManageBoards)
                    .await?;
                Ok(())
            }
            None if actor.is_admin() => Ok(()),
            None => Err(ServiceError::insufficient_permissions()),
        }
    }

    /// Global tags, plus the project's own when `project_id` is given.
    pub async fn list(
        &self,
        actor: &User,
        project_id: Option<Uuid>,
    ) -> Result<Vec<Tag>, ServiceError> {
        if let Some(project_id) = project_id {
            self.ctx
                .access
                .require(actor, project_id, Permission::ViewProject)
                .await?;
        }
        Ok(self.ctx.stores.tags.list(project_id).await?)
    }

    pub async fn create(&self, actor: &User, req: CreateTag) -> Result<Tag, ServiceError> {
        self.require_manage(actor, req.project_id).await?;
        req.validate()?;

        let tag = self
            .ctx
            .stores
            .tags
            .create(NewTag {
                project_id: req.project_id,
                name: req.name.trim().to_string(),
                color: req
                    .color
                    .map(|c| c.trim().to_string())
                    .unwrap_or_else(|| DEFAULT_TAG_COLOR.to_string()),
            })
            .await
            .map_err(|e| match ServiceError::from(e) {
                ServiceError::Conflict { .. } => {
                    ServiceError::conflict("TAG_EXISTS", "Тег с таким названием уже существует")
                }
                other => other,
            })?;
        self.ctx
            .events
            .emit(EventKind::TagCreated, tag.project_id, tag.id, actor.id);
        Ok(tag)
    }

    pub async fn delete(&self, actor: &User, id: Uuid) -> Result<(), ServiceError> {
        let tag = self
            .ctx
            .stores
            .tags
            .find_by_id(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("TAG_NOT_FOUND", "Тег не найден"))?;
        self.require_manage(actor, tag.project_id).await?;

        self.ctx.stores.tags.delete(id).await?;
        self.ctx
            .events
            .emit(EventKind::TagDeleted, tag.project_id, id, actor.id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use db::models::project::ProjectRole;

    use super::*;
    use crate::services::{
        projects::tests::{add, create_project},
        test_support::{register, services},
    };

    fn tag(project_id: Option<Uuid>, name: &str) -> CreateTag {
        CreateTag {
            project_id,
            name: name.to_string(),
            color: None,
        }
    }

    #[tokio::test]
    async fn test_global_tags_are_admin_only() {
        let services = services();
        let admin = register(&services, "Admin").await;
        let alice = register(&services, "Alice").await;

        let err = services
            .tags
            .create(&alice, tag(None, "bug"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INSUFFICIENT_PERMISSIONS");

        let created = services.tags.create(&admin, tag(None, "bug")).await.unwrap();
        assert_eq!(created.color, DEFAULT_TAG_COLOR);

        let err = services
            .tags
            .create(&admin, tag(None, "BUG"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "TAG_EXISTS");
    }

    #[tokio::test]
    async fn test_project_tags() {
        let services = services();
        let admin = register(&services, "Admin").await;
        let alice = register(&services, "Alice").await;
        let bob = register(&services, "Bob").await;
        let project = create_project(&services, &alice, "P").await;
        add(&services, &project, &alice, &bob, ProjectRole::Member).await;
        services.tags.create(&admin, tag(None, "global")).await.unwrap();

        let local = services
            .tags
            .create(&alice, tag(Some(project.id), "local"))
            .await
            .unwrap();
        let err = services
            .tags
            .create(&bob, tag(Some(project.id), "nope"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INSUFFICIENT_PERMISSIONS");

        assert_eq!(
            services
                .tags
                .list(&bob, Some(project.id))
                .await
                .unwrap()
                .len(),
            2
        );
        assert_eq!(services.tags.list(&bob, None).await.unwrap().len(), 1);

        let err = services.tags.delete(&bob, local.id).await.unwrap_err();
        assert_eq!(err.code(), "INSUFFICIENT_PERMISSIONS");
        services.tags.delete(&alice, local.id).await.unwrap();
        let err = services.tags.delete(&alice, local.id).await.unwrap_err();
        assert_eq!(err.code(), "TAG_NOT_FOUND");
    }
}
