use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::{
    RepositoryError,
    models::column::{Column, ColumnStore, NewColumn, UpdateColumnData},
};

pub(super) const COLUMN_COLUMNS: &str =
    "id, board_id, title, color, position, wip_limit, created_by, created_at, updated_at, \
     deleted_at";

pub struct PgColumnRepository {
    pool: PgPool,
}

impl PgColumnRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ColumnStore for PgColumnRepository {
    async fn create(&self, data: NewColumn) -> Result<Column, RepositoryError> {
        let column = sqlx::query_as::<_, Column>(&format!(
            r#"
            INSERT INTO columns (id, board_id, title, color, position, wip_limit, created_by)
            VALUES (
                $1, $2, $3, $4,
                (SELECT COALESCE(MAX(position) + 1, 0) FROM columns
                 WHERE board_id = $2 AND deleted_at IS NULL),
                $5, $6
            )
            RETURNING {COLUMN_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(data.board_id)
        .bind(data.title)
        .bind(data.color)
        .bind(data.wip_limit)
        .bind(data.created_by)
        .fetch_one(&self.pool)
        .await?;

        Ok(column)
    }

    async fn find_by_id(
        &self,
        id: Uuid,
        include_deleted: bool,
    ) -> Result<Option<Column>, RepositoryError> {
        let column = sqlx::query_as::<_, Column>(&format!(
            "SELECT {COLUMN_COLUMNS} FROM columns WHERE id = $1 AND ($2 OR deleted_at IS NULL)"
        ))
        .bind(id)
        .bind(include_deleted)
        .fetch_optional(&self.pool)
        .await?;

        Ok(column)
    }

    async fn list_by_board(&self, board_id: Uuid) -> Result<Vec<Column>, RepositoryError> {
        let columns = sqlx::query_as::<_, Column>(&format!(
            r#"
            SELECT {COLUMN_COLUMNS}
            FROM columns
            WHERE board_id = $1 AND deleted_at IS NULL
            ORDER BY position ASC, created_at ASC
            "#
        ))
        .bind(board_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(columns)
    }

    async fn update(&self, id: Uuid, data: UpdateColumnData) -> Result<Column, RepositoryError> {
        let mut builder = QueryBuilder::<Postgres>::new("UPDATE columns SET updated_at = NOW()");

        if let Some(title) = data.title {
            builder.push(", title = ").push_bind(title);
        }
        if let Some(color) = data.color {
            builder.push(", color = ").push_bind(color);
        }
        if let Some(wip_limit) = data.wip_limit {
            builder.push(", wip_limit = ").push_bind(wip_limit);
        }

        builder
            .push(" WHERE id = ")
            .push_bind(id)
            .push(" AND deleted_at IS NULL RETURNING ")
            .push(COLUMN_COLUMNS);

        builder
            .build_query_as::<Column>()
            .fetch_optional(&self.pool)
            .await?
            .ok_or(RepositoryError::NotFound)
    }

    async fn soft_delete(&self, id: Uuid) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let (board_id, position): (Uuid, i32) = sqlx::query_as(
            r#"
            UPDATE columns
            SET deleted_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND deleted_at IS NULL
            RETURNING board_id, position
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        sqlx::query(
            "UPDATE columns SET position = position - 1 \
             WHERE board_id = $1 AND deleted_at IS NULL AND position > $2",
        )
        .bind(board_id)
        .bind(position)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn reorder(&self, board_id: Uuid, ids: &[Uuid]) -> Result<Vec<Column>, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        for (position, &id) in ids.iter().enumerate() {
            let result = sqlx::query(
                r#"
                UPDATE columns
                SET position = $1, updated_at = NOW()
                WHERE id = $2 AND board_id = $3 AND deleted_at IS NULL
                "#,
            )
            .bind(position as i32)
            .bind(id)
            .bind(board_id)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                return Err(RepositoryError::NotFound);
            }
        }

        tx.commit().await?;
        self.list_by_board(board_id).await
    }
}
