use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use super::{Tx, columns::COLUMN_COLUMNS};
use crate::{
    RepositoryError,
    models::{
        board::{Board, BoardStore, NewBoard, SeedColumn, UpdateBoardData},
        column::Column,
    },
};

const BOARD_COLUMNS: &str =
    "id, project_id, name, description, position, created_by, created_at, updated_at, deleted_at";

pub struct PgBoardRepository {
    pool: PgPool,
}

impl PgBoardRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn next_position(tx: &mut Tx<'_>, project_id: Uuid) -> Result<i32, RepositoryError> {
        let next: i32 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(position) + 1, 0) FROM boards \
             WHERE project_id = $1 AND deleted_at IS NULL",
        )
        .bind(project_id)
        .fetch_one(&mut **tx)
        .await?;
        Ok(next)
    }

    async fn insert(tx: &mut Tx<'_>, data: NewBoard) -> Result<Board, RepositoryError> {
        let position = Self::next_position(tx, data.project_id).await?;

        let board = sqlx::query_as::<_, Board>(&format!(
            r#"
            INSERT INTO boards (id, project_id, name, description, position, created_by)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {BOARD_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(data.project_id)
        .bind(data.name)
        .bind(data.description)
        .bind(position)
        .bind(data.created_by)
        .fetch_one(&mut **tx)
        .await?;

        Ok(board)
    }
}

#[async_trait]
impl BoardStore for PgBoardRepository {
    async fn create(&self, data: NewBoard) -> Result<Board, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let board = Self::insert(&mut tx, data).await?;
        tx.commit().await?;
        Ok(board)
    }

    async fn create_with_columns(
        &self,
        data: NewBoard,
        columns: Vec<SeedColumn>,
    ) -> Result<(Board, Vec<Column>), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let board = Self::insert(&mut tx, data).await?;

        let mut created = Vec::with_capacity(columns.len());
        for (position, seed) in (0_i32..).zip(columns) {
            let column = sqlx::query_as::<_, Column>(&format!(
                r#"
                INSERT INTO columns (id, board_id, title, color, position, created_by)
                VALUES ($1, $2, $3, $4, $5, $6)
                RETURNING {COLUMN_COLUMNS}
                "#
            ))
            .bind(Uuid::new_v4())
            .bind(board.id)
            .bind(seed.title)
            .bind(seed.color)
            .bind(position)
            .bind(board.created_by)
            .fetch_one(&mut *tx)
            .await?;
            created.push(column);
        }

        tx.commit().await?;
        Ok((board, created))
    }

    async fn find_by_id(
        &self,
        id: Uuid,
        include_deleted: bool,
    ) -> Result<Option<Board>, RepositoryError> {
        let board = sqlx::query_as::<_, Board>(&format!(
            "SELECT {BOARD_COLUMNS} FROM boards WHERE id = $1 AND ($2 OR deleted_at IS NULL)"
        ))
        .bind(id)
        .bind(include_deleted)
        .fetch_optional(&self.pool)
        .await?;

        Ok(board)
    }

    async fn list_by_project(&self, project_id: Uuid) -> Result<Vec<Board>, RepositoryError> {
        let boards = sqlx::query_as::<_, Board>(&format!(
            r#"
            SELECT {BOARD_COLUMNS}
            FROM boards
            WHERE project_id = $1 AND deleted_at IS NULL
            ORDER BY position ASC, created_at ASC
            "#
        ))
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(boards)
    }

    async fn update(&self, id: Uuid, data: UpdateBoardData) -> Result<Board, RepositoryError> {
        let mut builder = QueryBuilder::<Postgres>::new("UPDATE boards SET updated_at = NOW()");

        if let Some(name) = data.name {
            builder.push(", name = ").push_bind(name);
        }
        if let Some(description) = data.description {
            builder.push(", description = ").push_bind(description);
        }

        builder
            .push(" WHERE id = ")
            .push_bind(id)
            .push(" AND deleted_at IS NULL RETURNING ")
            .push(BOARD_COLUMNS);

        builder
            .build_query_as::<Board>()
            .fetch_optional(&self.pool)
            .await?
            .ok_or(RepositoryError::NotFound)
    }

    async fn soft_delete(&self, id: Uuid) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let (project_id, position): (Uuid, i32) = sqlx::query_as(
            r#"
            UPDATE boards
            SET deleted_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND deleted_at IS NULL
            RETURNING project_id, position
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        sqlx::query(
            "UPDATE boards SET position = position - 1 \
             WHERE project_id = $1 AND deleted_at IS NULL AND position > $2",
        )
        .bind(project_id)
        .bind(position)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn restore(&self, id: Uuid) -> Result<Board, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let project_id: Uuid = sqlx::query_scalar(
            "SELECT project_id FROM boards WHERE id = $1 AND deleted_at IS NOT NULL FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        let position = Self::next_position(&mut tx, project_id).await?;

        let board = sqlx::query_as::<_, Board>(&format!(
            r#"
            UPDATE boards
            SET deleted_at = NULL, position = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING {BOARD_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(position)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(board)
    }

    async fn reorder(&self, project_id: Uuid, ids: &[Uuid]) -> Result<Vec<Board>, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        for (position, &id) in ids.iter().enumerate() {
            let result = sqlx::query(
                r#"
                UPDATE boards
                SET position = $1, updated_at = NOW()
                WHERE id = $2 AND project_id = $3 AND deleted_at IS NULL
                "#,
            )
            .bind(position as i32)
            .bind(id)
            .bind(project_id)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                return Err(RepositoryError::NotFound);
            }
        }

        tx.commit().await?;
        self.list_by_project(project_id).await
    }
}
