use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::RepositoryError;

/// Global account role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Admin,
    Manager,
    User,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub role: UserRole,
    pub is_approved: bool,
    pub avatar_url: Option<String>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}

/// Data for inserting a user. `email` is stored lowercased.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub name: String,
    pub password_hash: String,
    pub role: UserRole,
    pub is_approved: bool,
}

/// Profile changes; `avatar_url: Some(None)` clears the avatar.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateUserData {
    pub name: Option<String>,
    pub email: Option<String>,
    #[serde(default, deserialize_with = "utils::serde_helpers::double_option")]
    pub avatar_url: Option<Option<String>>,
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create(&self, data: NewUser) -> Result<User, RepositoryError>;

    /// Live users only.
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, RepositoryError>;

    /// Case-insensitive lookup among live users.
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError>;

    async fn list(&self, include_unapproved: bool) -> Result<Vec<User>, RepositoryError>;

    /// Number of users ever created, deleted ones included.
    async fn count(&self) -> Result<i64, RepositoryError>;

    async fn update(&self, id: Uuid, data: UpdateUserData) -> Result<User, RepositoryError>;

    async fn set_password(&self, id: Uuid, password_hash: &str) -> Result<(), RepositoryError>;

    async fn set_role(&self, id: Uuid, role: UserRole) -> Result<User, RepositoryError>;

    async fn set_approved(&self, id: Uuid, approved: bool) -> Result<User, RepositoryError>;

    async fn touch_login(&self, id: Uuid) -> Result<(), RepositoryError>;

    async fn soft_delete(&self, id: Uuid) -> Result<(), RepositoryError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_hash_is_never_serialized() {
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            email: "a@b.io".to_string(),
            name: "A".to_string(),
            password_hash: "secret".to_string(),
            role: UserRole::Manager,
            is_approved: true,
            avatar_url: None,
            last_login_at: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["role"], "manager");
    }
}
