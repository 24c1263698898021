use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::RepositoryError;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Column {
    pub id: Uuid,
    pub board_id: Uuid,
    pub title: String,
    pub color: String,
    pub position: i32,
    /// Maximum number of live tasks; `None` means unlimited.
    pub wip_limit: Option<i32>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewColumn {
    pub board_id: Uuid,
    pub title: String,
    pub color: String,
    pub wip_limit: Option<i32>,
    pub created_by: Option<Uuid>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateColumnData {
    pub title: Option<String>,
    pub color: Option<String>,
    #[serde(default, deserialize_with = "utils::serde_helpers::double_option")]
    pub wip_limit: Option<Option<i32>>,
}

#[async_trait]
pub trait ColumnStore: Send + Sync {
    async fn create(&self, data: NewColumn) -> Result<Column, RepositoryError>;

    async fn find_by_id(
        &self,
        id: Uuid,
        include_deleted: bool,
    ) -> Result<Option<Column>, RepositoryError>;

    async fn list_by_board(&self, board_id: Uuid) -> Result<Vec<Column>, RepositoryError>;

    async fn update(&self, id: Uuid, data: UpdateColumnData) -> Result<Column, RepositoryError>;

    async fn soft_delete(&self, id: Uuid) -> Result<(), RepositoryError>;

    async fn reorder(&self, board_id: Uuid, ids: &[Uuid]) -> Result<Vec<Column>, RepositoryError>;
}
