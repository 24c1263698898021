use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::RepositoryError;

/// A login session. Only the SHA-256 of the bearer token is persisted.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(skip_serializing, default)]
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

#[derive(Debug, Clone)]
pub struct NewSession {
    pub user_id: Uuid,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create(&self, data: NewSession) -> Result<Session, RepositoryError>;

    async fn find_by_token_hash(&self, token_hash: &str)
    -> Result<Option<Session>, RepositoryError>;

    /// Slide the expiry forward and record activity.
    async fn touch(&self, id: Uuid, expires_at: DateTime<Utc>) -> Result<(), RepositoryError>;

    async fn delete(&self, id: Uuid) -> Result<(), RepositoryError>;

    async fn delete_for_user(&self, user_id: Uuid) -> Result<u64, RepositoryError>;

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, RepositoryError>;
}
