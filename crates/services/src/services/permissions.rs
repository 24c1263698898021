//! Project-scoped authorization.
//!
//! Roles map to a fixed permission set; a global admin bypasses every
//! project check.

use std::sync::Arc;

use db::models::{
    project::{Project, ProjectRole, ProjectStore},
    user::User,
};
use strum_macros::{AsRefStr, Display};
use uuid::Uuid;

use super::{cache::Caches, error::ServiceError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum Permission {
    ViewProject,
    EditProject,
    DeleteProject,
    ManageMembers,
    ManageBoards,
    EditTasks,
    Comment,
}

pub trait RolePermissions {
    fn allows(self, permission: Permission) -> bool;
}

impl RolePermissions for ProjectRole {
    fn allows(self, permission: Permission) -> bool {
        use Permission::*;

        match self {
            ProjectRole::Owner => true,
            ProjectRole::Admin => permission != DeleteProject,
            ProjectRole::Member => matches!(permission, ViewProject | EditTasks | Comment),
            ProjectRole::Viewer => matches!(permission, ViewProject | Comment),
        }
    }
}

/// Outcome of a successful check. `role` is `None` when a global admin
/// acts on a project they are not a member of.
#[derive(Debug, Clone)]
pub struct ProjectAccess {
    pub project: Project,
    pub role: Option<ProjectRole>,
}

impl ProjectAccess {
    pub fn is_owner(&self) -> bool {
        self.role == Some(ProjectRole::Owner)
    }
}

/// Membership decision without any lookups.
pub fn check(
    actor: &User,
    role: Option<ProjectRole>,
    permission: Permission,
) -> Result<(), ServiceError> {
    if actor.is_admin() {
        return Ok(());
    }
    match role {
        None => Err(ServiceError::forbidden(
            "ACCESS_DENIED",
            "Нет доступа к проекту",
        )),
        Some(role) if role.allows(permission) => Ok(()),
        Some(_) => Err(ServiceError::insufficient_permissions()),
    }
}

#[derive(Clone)]
pub struct Access {
    projects: Arc<dyn ProjectStore>,
    caches: Caches,
}

impl Access {
    pub fn new(projects: Arc<dyn ProjectStore>, caches: Caches) -> Self {
        Self { projects, caches }
    }

    pub fn caches(&self) -> &Caches {
        &self.caches
    }

    /// Live project by id, `PROJECT_NOT_FOUND` otherwise.
    pub async fn project(&self, project_id: Uuid) -> Result<Project, ServiceError> {
        let projects = Arc::clone(&self.projects);
        let loaded = self
            .caches
            .projects
            .get_or_try_insert_with(project_id, || async move {
                projects
                    .find_by_id(project_id, false)
                    .await?
                    .ok_or_else(project_not_found)
            })
            .await?;
        Ok(loaded)
    }

    pub async fn role_of(
        &self,
        project_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<ProjectRole>, ServiceError> {
        let projects = Arc::clone(&self.projects);
        self.caches
            .memberships
            .get_or_try_insert_with((project_id, user_id), || async move {
                Ok::<_, ServiceError>(
                    projects
                        .find_member(project_id, user_id)
                        .await?
                        .map(|member| member.role),
                )
            })
            .await
    }

    pub async fn require(
        &self,
        actor: &User,
        project_id: Uuid,
        permission: Permission,
    ) -> Result<ProjectAccess, ServiceError> {
        let project = self.project(project_id).await?;
        let role = self.role_of(project_id, actor.id).await?;
        check(actor, role, permission).inspect_err(|_| {
            tracing::debug!(
                user_id = %actor.id,
                project_id = %project_id,
                permission = %permission,
                "project permission denied"
            );
        })?;
        Ok(ProjectAccess { project, role })
    }
}

pub fn project_not_found() -> ServiceError {
    ServiceError::not_found("PROJECT_NOT_FOUND", "Проект не найден")
}
