use db::models::{
    project::{
        NewProject, Project, ProjectMember, ProjectMemberWithUser, ProjectRole, UpdateProjectData,
    },
    user::User,
};
use serde::Deserialize;
use tracing::{info, instrument};
use utils::response::FieldError;
use uuid::Uuid;

use super::{
    ServiceContext,
    error::ServiceError,
    events::EventKind,
    permissions::{Permission, project_not_found},
    users::user_not_found,
    validation::{DESCRIPTION_MAX, ICON_MAX, PROJECT_NAME_MAX, Validator, normalize_optional},
};

pub const DEFAULT_PROJECT_COLOR: &str = "#3b82f6";

#[derive(Debug, Clone, Deserialize)]
pub struct CreateProject {
    pub name: String,
    pub description: Option<String>,
    pub color: Option<String>,
    pub icon: Option<String>,
}

impl CreateProject {
    pub fn validate(&self) -> Result<(), ServiceError> {
        let mut v = Validator::new();
        v.required_text("name", &self.name, PROJECT_NAME_MAX)
            .optional_text("description", self.description.as_deref(), DESCRIPTION_MAX)
            .optional_text("icon", self.icon.as_deref(), ICON_MAX);
        if let Some(color) = &self.color {
            v.color("color", color);
        }
        v.finish()
    }
}

fn validate_update(data: &UpdateProjectData) -> Result<(), ServiceError> {
    let mut v = Validator::new();
    if let Some(name) = &data.name {
        v.required_text("name", name, PROJECT_NAME_MAX);
    }
    if let Some(Some(description)) = &data.description {
        v.optional_text("description", Some(description), DESCRIPTION_MAX);
    }
    if let Some(color) = &data.color {
        v.color("color", color);
    }
    if let Some(Some(icon)) = &data.icon {
        v.optional_text("icon", Some(icon), ICON_MAX);
    }
    v.finish()
}

fn default_member_role() -> ProjectRole {
    ProjectRole::Member
}

#[derive(Debug, Clone, Deserialize)]
pub struct AddMember {
    pub user_id: Uuid,
    #[serde(default = "default_member_role")]
    pub role: ProjectRole,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateMemberRole {
    pub role: ProjectRole,
}

fn reject_owner_role(role: ProjectRole) -> Result<(), ServiceError> {
    if role == ProjectRole::Owner {
        return Err(ServiceError::validation(vec![FieldError::new(
            "role",
            "Роль владельца не может быть назначена",
        )]));
    }
    Ok(())
}

fn member_not_found() -> ServiceError {
    ServiceError::not_found("MEMBER_NOT_FOUND", "Участник проекта не найден")
}

#[derive(Clone)]
pub struct ProjectService {
    ctx: ServiceContext,
}

impl ProjectService {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    pub async fn list(&self, actor: &User) -> Result<Vec<Project>, ServiceError> {
        let projects = &self.ctx.stores.projects;
        let list = if actor.is_admin() {
            projects.list_all().await?
        } else {
            projects.list_for_user(actor.id).await?
        };
        Ok(list)
    }

    #[instrument(name = "projects.create", skip(self, actor, req), fields(actor_id = %actor.id))]
    pub async fn create(&self, actor: &User, req: CreateProject) -> Result<Project, ServiceError> {
        req.validate()?;
        let project = self
            .ctx
            .stores
            .projects
            .create(
                NewProject {
                    name: req.name.trim().to_string(),
                    description: normalize_optional(req.description),
                    color: req
                        .color
                        .map(|c| c.trim().to_string())
                        .unwrap_or_else(|| DEFAULT_PROJECT_COLOR.to_string()),
                    icon: normalize_optional(req.icon),
                },
                actor.id,
            )
            .await?;

        info!(project_id = %project.id, "project created");
        self.ctx.caches().invalidate_membership(project.id, actor.id);
        self.ctx
            .events
            .emit(EventKind::ProjectCreated, Some(project.id), project.id, actor.id);
        Ok(project)
    }

    pub async fn get(&self, actor: &User, id: Uuid) -> Result<Project, ServiceError> {
        Ok(self
            .ctx
            .access
            .require(actor, id, Permission::ViewProject)
            .await?
            .project)
    }

    #[instrument(name = "projects.update", skip(self, actor, data), fields(actor_id = %actor.id))]
    pub async fn update(
        &self,
        actor: &User,
        id: Uuid,
        mut data: UpdateProjectData,
    ) -> Result<Project, ServiceError> {
        self.ctx
            .access
            .require(actor, id, Permission::EditProject)
            .await?;
        validate_update(&data)?;
        data.name = data.name.map(|n| n.trim().to_string());
        data.description = data.description.map(normalize_optional);
        data.color = data.color.map(|c| c.trim().to_string());
        data.icon = data.icon.map(normalize_optional);

        let project = self.ctx.stores.projects.update(id, data).await?;
        self.ctx.caches().invalidate_project(id);
        self.ctx
            .events
            .emit(EventKind::ProjectUpdated, Some(id), id, actor.id);
        Ok(project)
    }

    #[instrument(name = "projects.delete", skip(self, actor), fields(actor_id = %actor.id))]
    pub async fn delete(&self, actor: &User, id: Uuid) -> Result<(), ServiceError> {
        self.ctx
            .access
            .require(actor, id, Permission::DeleteProject)
            .await?;
        self.ctx.stores.projects.soft_delete(id).await?;
        self.ctx.caches().invalidate_project(id);
        info!(project_id = %id, "project deleted");
        self.ctx
            .events
            .emit(EventKind::ProjectDeleted, Some(id), id, actor.id);
        Ok(())
    }

    /// Only the owner or a global admin may bring a project back.
    pub async fn restore(&self, actor: &User, id: Uuid) -> Result<Project, ServiceError> {
        let project = self
            .ctx
            .stores
            .projects
            .find_by_id(id, true)
            .await?
            .ok_or_else(project_not_found)?;
        if project.owner_id != actor.id && !actor.is_admin() {
            return Err(ServiceError::insufficient_permissions());
        }
        if project.deleted_at.is_none() {
            return Ok(project);
        }

        let project = self.ctx.stores.projects.restore(id).await?;
        self.ctx.caches().invalidate_project(id);
        self.ctx
            .events
            .emit(EventKind::ProjectRestored, Some(id), id, actor.id);
        Ok(project)
    }

    pub async fn list_members(
        &self,
        actor: &User,
        project_id: Uuid,
    ) -> Result<Vec<ProjectMemberWithUser>, ServiceError> {
        self.ctx
            .access
            .require(actor, project_id, Permission::ViewProject)
            .await?;
        Ok(self.ctx.stores.projects.list_members(project_id).await?)
    }

    #[instrument(name = "projects.add_member", skip(self, actor, req), fields(actor_id = %actor.id))]
    pub async fn add_member(
        &self,
        actor: &User,
        project_id: Uuid,
        req: AddMember,
    ) -> Result<ProjectMember, ServiceError> {
        self.ctx
            .access
            .require(actor, project_id, Permission::ManageMembers)
            .await?;
        reject_owner_role(req.role)?;

        match self.ctx.stores.users.find_by_id(req.user_id).await? {
            Some(user) if user.is_approved => {}
            _ => return Err(user_not_found()),
        }

        let member = self
            .ctx
            .stores
            .projects
            .add_member(project_id, req.user_id, req.role)
            .await
            .map_err(|e| match ServiceError::from(e) {
                ServiceError::Conflict { .. } => ServiceError::conflict(
                    "MEMBER_EXISTS",
                    "Пользователь уже является участником проекта",
                ),
                other => other,
            })?;
        self.ctx
            .caches()
            .invalidate_membership(project_id, req.user_id);
        self.ctx
            .events
            .emit(EventKind::MemberAdded, Some(project_id), req.user_id, actor.id);
        Ok(member)
    }

    pub async fn update_member_role(
        &self,
        actor: &User,
        project_id: Uuid,
        user_id: Uuid,
        role: ProjectRole,
    ) -> Result<ProjectMember, ServiceError> {
        self.ctx
            .access
            .require(actor, project_id, Permission::ManageMembers)
            .await?;
        reject_owner_role(role)?;

        let member = self
            .ctx
            .stores
            .projects
            .find_member(project_id, user_id)
            .await?
            .ok_or_else(member_not_found)?;
        if member.role == ProjectRole::Owner {
            return Err(ServiceError::conflict(
                "CANNOT_CHANGE_OWNER_ROLE",
                "Нельзя изменить роль владельца проекта",
            ));
        }

        let member = self
            .ctx
            .stores
            .projects
            .update_member_role(project_id, user_id, role)
            .await?;
        self.ctx.caches().invalidate_membership(project_id, user_id);
        self.ctx
            .events
            .emit(EventKind::MemberRoleChanged, Some(project_id), user_id, actor.id);
        Ok(member)
    }

    /// Members may always leave; removing others needs ManageMembers.
    pub async fn remove_member(
        &self,
        actor: &User,
        project_id: Uuid,
        user_id: Uuid,
    ) -> Result<(), ServiceError> {
        let permission = if actor.id == user_id {
            Permission::ViewProject
        } else {
            Permission::ManageMembers
        };
        self.ctx
            .access
            .require(actor, project_id, permission)
            .await?;

        let member = self
            .ctx
            .stores
            .projects
            .find_member(project_id, user_id)
            .await?
            .ok_or_else(member_not_found)?;
        if member.role == ProjectRole::Owner {
            return Err(ServiceError::conflict(
                "CANNOT_REMOVE_OWNER",
                "Нельзя удалить владельца проекта",
            ));
        }

        self.ctx
            .stores
            .projects
            .remove_member(project_id, user_id)
            .await?;
        self.ctx.caches().invalidate_membership(project_id, user_id);
        self.ctx
            .events
            .emit(EventKind::MemberRemoved, Some(project_id), user_id, actor.id);
        Ok(())
    }
}
