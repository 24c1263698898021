use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{RepositoryError, models::column::Column};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Board {
    pub id: Uuid,
    pub project_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub position: i32,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewBoard {
    pub project_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub created_by: Option<Uuid>,
}

/// Column created in the same write as its board.
#[derive(Debug, Clone)]
pub struct SeedColumn {
    pub title: String,
    pub color: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateBoardData {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "utils::serde_helpers::double_option")]
    pub description: Option<Option<String>>,
}

#[async_trait]
pub trait BoardStore: Send + Sync {
    /// Appends the board after the project's last live board.
    async fn create(&self, data: NewBoard) -> Result<Board, RepositoryError>;

    /// Creates the board and its columns atomically; columns take positions
    /// `0..columns.len()`.
    async fn create_with_columns(
        &self,
        data: NewBoard,
        columns: Vec<SeedColumn>,
    ) -> Result<(Board, Vec<Column>), RepositoryError>;

    async fn find_by_id(
        &self,
        id: Uuid,
        include_deleted: bool,
    ) -> Result<Option<Board>, RepositoryError>;

    /// Live boards ordered by position.
    async fn list_by_project(&self, project_id: Uuid) -> Result<Vec<Board>, RepositoryError>;

    async fn update(&self, id: Uuid, data: UpdateBoardData) -> Result<Board, RepositoryError>;

    /// Soft-deletes and closes the gap in the remaining positions.
    async fn soft_delete(&self, id: Uuid) -> Result<(), RepositoryError>;

    async fn restore(&self, id: Uuid) -> Result<Board, RepositoryError>;

    /// Assigns positions `0..ids.len()` in the given order.
    async fn reorder(&self, project_id: Uuid, ids: &[Uuid]) -> Result<Vec<Board>, RepositoryError>;
}
