use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::RepositoryError;

/// Role of a user inside one project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "project_role", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ProjectRole {
    Owner,
    Admin,
    Member,
    Viewer,
}

impl ProjectRole {
    /// Higher is more privileged: owner > admin > member > viewer.
    pub fn rank(self) -> u8 {
        match self {
            Self::Owner => 3,
            Self::Admin => 2,
            Self::Member => 1,
            Self::Viewer => 0,
        }
    }

    pub fn at_least(self, other: Self) -> bool {
        self.rank() >= other.rank()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub color: String,
    pub icon: Option<String>,
    pub owner_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewProject {
    pub name: String,
    pub description: Option<String>,
    pub color: String,
    pub icon: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateProjectData {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "utils::serde_helpers::double_option")]
    pub description: Option<Option<String>>,
    pub color: Option<String>,
    #[serde(default, deserialize_with = "utils::serde_helpers::double_option")]
    pub icon: Option<Option<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ProjectMember {
    pub project_id: Uuid,
    pub user_id: Uuid,
    pub role: ProjectRole,
    pub joined_at: DateTime<Utc>,
}

/// Membership joined with the member's public profile.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ProjectMemberWithUser {
    pub project_id: Uuid,
    pub user_id: Uuid,
    pub role: ProjectRole,
    pub joined_at: DateTime<Utc>,
    pub name: String,
    pub email: String,
}

#[async_trait]
pub trait ProjectStore: Send + Sync {
    /// Inserts the project and the owner's membership in one transaction.
    async fn create(&self, data: NewProject, owner_id: Uuid) -> Result<Project, RepositoryError>;

    async fn find_by_id(
        &self,
        id: Uuid,
        include_deleted: bool,
    ) -> Result<Option<Project>, RepositoryError>;

    /// Live projects the user is a member of.
    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Project>, RepositoryError>;

    async fn list_all(&self) -> Result<Vec<Project>, RepositoryError>;

    async fn update(&self, id: Uuid, data: UpdateProjectData)
    -> Result<Project, RepositoryError>;

    async fn soft_delete(&self, id: Uuid) -> Result<(), RepositoryError>;

    async fn restore(&self, id: Uuid) -> Result<Project, RepositoryError>;

    async fn list_members(
        &self,
        project_id: Uuid,
    ) -> Result<Vec<ProjectMemberWithUser>, RepositoryError>;

    async fn find_member(
        &self,
        project_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<ProjectMember>, RepositoryError>;

    /// `Conflict` when the user is already a member.
    async fn add_member(
        &self,
        project_id: Uuid,
        user_id: Uuid,
        role: ProjectRole,
    ) -> Result<ProjectMember, RepositoryError>;

    async fn update_member_role(
        &self,
        project_id: Uuid,
        user_id: Uuid,
        role: ProjectRole,
    ) -> Result<ProjectMember, RepositoryError>;

    async fn remove_member(&self, project_id: Uuid, user_id: Uuid) -> Result<(), RepositoryError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_ordering() {
        assert!(ProjectRole::Owner.at_least(ProjectRole::Admin));
        assert!(ProjectRole::Admin.at_least(ProjectRole::Member));
        assert!(ProjectRole::Member.at_least(ProjectRole::Viewer));
        assert!(!ProjectRole::Viewer.at_least(ProjectRole::Member));
        assert!(ProjectRole::Member.at_least(ProjectRole::Member));
    }

    #[test]
    fn test_role_wire_format() {
        let role: ProjectRole = serde_json::from_str("\"viewer\"").unwrap();
        assert_eq!(role, ProjectRole::Viewer);
        assert_eq!(serde_json::to_string(&ProjectRole::Owner).unwrap(), "\"owner\"");
    }
}
