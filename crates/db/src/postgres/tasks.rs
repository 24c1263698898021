use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use super::{Tx, like_pattern};
use crate::{
    RepositoryError,
    models::task::{
        NewTask, Task, TaskFilter, TaskStore, UpdateTaskData, clamp_new_column, clamp_same_column,
    },
};

const TASK_COLUMNS: &str = "id, project_id, board_id, column_id, title, description, status, \
    priority, assignee_id, reporter_id, position, due_date, estimated_hours, actual_minutes, \
    completed_at, created_at, updated_at, deleted_at";

pub struct PgTaskRepository {
    pool: PgPool,
}

impl PgTaskRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn live_count(tx: &mut Tx<'_>, column_id: Uuid) -> Result<i64, RepositoryError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM tasks WHERE column_id = $1 AND deleted_at IS NULL",
        )
        .bind(column_id)
        .fetch_one(&mut **tx)
        .await?;
        Ok(count)
    }

    async fn next_position(tx: &mut Tx<'_>, column_id: Uuid) -> Result<i32, RepositoryError> {
        let next: i32 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(position) + 1, 0) FROM tasks \
             WHERE column_id = $1 AND deleted_at IS NULL",
        )
        .bind(column_id)
        .fetch_one(&mut **tx)
        .await?;
        Ok(next)
    }
}

#[async_trait]
impl TaskStore for PgTaskRepository {
    async fn create(&self, data: NewTask) -> Result<Task, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let position = Self::next_position(&mut tx, data.column_id).await?;

        let task = sqlx::query_as::<_, Task>(&format!(
            r#"
            INSERT INTO tasks (
                id, project_id, board_id, column_id, title, description, status, priority,
                assignee_id, reporter_id, position, due_date, estimated_hours, completed_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            RETURNING {TASK_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(data.project_id)
        .bind(data.board_id)
        .bind(data.column_id)
        .bind(data.title)
        .bind(data.description)
        .bind(data.status)
        .bind(data.priority)
        .bind(data.assignee_id)
        .bind(data.reporter_id)
        .bind(position)
        .bind(data.due_date)
        .bind(data.estimated_hours)
        .bind(data.completed_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(task)
    }

    async fn find_by_id(
        &self,
        id: Uuid,
        include_deleted: bool,
    ) -> Result<Option<Task>, RepositoryError> {
        let task = sqlx::query_as::<_, Task>(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE id = $1 AND ($2 OR deleted_at IS NULL)"
        ))
        .bind(id)
        .bind(include_deleted)
        .fetch_optional(&self.pool)
        .await?;

        Ok(task)
    }

    async fn list(&self, filter: &TaskFilter) -> Result<Vec<Task>, RepositoryError> {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT ");
        builder.push(TASK_COLUMNS).push(" FROM tasks WHERE TRUE");

        if !filter.include_deleted {
            builder.push(" AND deleted_at IS NULL");
        }
        if let Some(project_id) = filter.project_id {
            builder.push(" AND project_id = ").push_bind(project_id);
        }
        if let Some(project_ids) = &filter.project_ids {
            builder
                .push(" AND project_id = ANY(")
                .push_bind(project_ids.clone())
                .push(")");
        }
        if let Some(board_id) = filter.board_id {
            builder.push(" AND board_id = ").push_bind(board_id);
        }
        if let Some(column_id) = filter.column_id {
            builder.push(" AND column_id = ").push_bind(column_id);
        }
        if let Some(assignee_id) = filter.assignee_id {
            builder.push(" AND assignee_id = ").push_bind(assignee_id);
        }
        if let Some(status) = filter.status {
            builder.push(" AND status = ").push_bind(status);
        }
        if let Some(priority) = filter.priority {
            builder.push(" AND priority = ").push_bind(priority);
        }
        if let Some(term) = filter.search_term() {
            let pattern = like_pattern(term);
            builder
                .push(" AND (title ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR description ILIKE ")
                .push_bind(pattern)
                .push(")");
        }

        builder
            .push(" ORDER BY board_id, column_id, position ASC, created_at ASC LIMIT ")
            .push_bind(filter.effective_limit())
            .push(" OFFSET ")
            .push_bind(filter.effective_offset());

        let tasks = builder
            .build_query_as::<Task>()
            .fetch_all(&self.pool)
            .await?;

        Ok(tasks)
    }

    async fn update(&self, id: Uuid, data: UpdateTaskData) -> Result<Task, RepositoryError> {
        let mut builder = QueryBuilder::<Postgres>::new("UPDATE tasks SET updated_at = NOW()");

        if let Some(title) = data.title {
            builder.push(", title = ").push_bind(title);
        }
        if let Some(description) = data.description {
            builder.push(", description = ").push_bind(description);
        }
        if let Some(status) = data.status {
            builder.push(", status = ").push_bind(status);
        }
        if let Some(priority) = data.priority {
            builder.push(", priority = ").push_bind(priority);
        }
        if let Some(assignee_id) = data.assignee_id {
            builder.push(", assignee_id = ").push_bind(assignee_id);
        }
        if let Some(due_date) = data.due_date {
            builder.push(", due_date = ").push_bind(due_date);
        }
        if let Some(estimated_hours) = data.estimated_hours {
            builder.push(", estimated_hours = ").push_bind(estimated_hours);
        }
        if let Some(completed_at) = data.completed_at {
            builder.push(", completed_at = ").push_bind(completed_at);
        }

        builder
            .push(" WHERE id = ")
            .push_bind(id)
            .push(" AND deleted_at IS NULL RETURNING ")
            .push(TASK_COLUMNS);

        builder
            .build_query_as::<Task>()
            .fetch_optional(&self.pool)
            .await?
            .ok_or(RepositoryError::NotFound)
    }

    async fn move_to(
        &self,
        id: Uuid,
        column_id: Uuid,
        board_id: Uuid,
        position: i32,
    ) -> Result<Task, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let current = sqlx::query_as::<_, Task>(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE id = $1 AND deleted_at IS NULL FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        let target = if current.column_id == column_id {
            let len = Self::live_count(&mut tx, column_id).await?;
            let target = clamp_same_column(position, len);

            if target < current.position {
                sqlx::query(
                    r#"
                    UPDATE tasks SET position = position + 1
                    WHERE column_id = $1 AND deleted_at IS NULL AND id <> $2
                      AND position >= $3 AND position < $4
                    "#,
                )
                .bind(column_id)
                .bind(id)
                .bind(target)
                .bind(current.position)
                .execute(&mut *tx)
                .await?;
            } else if target > current.position {
                sqlx::query(
                    r#"
                    UPDATE tasks SET position = position - 1
                    WHERE column_id = $1 AND deleted_at IS NULL AND id <> $2
                      AND position > $3 AND position <= $4
                    "#,
                )
                .bind(column_id)
                .bind(id)
                .bind(current.position)
                .bind(target)
                .execute(&mut *tx)
                .await?;
            }
            target
        } else {
            sqlx::query(
                "UPDATE tasks SET position = position - 1 \
                 WHERE column_id = $1 AND deleted_at IS NULL AND position > $2",
            )
            .bind(current.column_id)
            .bind(current.position)
            .execute(&mut *tx)
            .await?;

            let len = Self::live_count(&mut tx, column_id).await?;
            let target = clamp_new_column(position, len);

            sqlx::query(
                "UPDATE tasks SET position = position + 1 \
                 WHERE column_id = $1 AND deleted_at IS NULL AND position >= $2",
            )
            .bind(column_id)
            .bind(target)
            .execute(&mut *tx)
            .await?;
            target
        };

        let task = sqlx::query_as::<_, Task>(&format!(
            r#"
            UPDATE tasks
            SET column_id = $2, board_id = $3, position = $4, updated_at = NOW()
            WHERE id = $1
            RETURNING {TASK_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(column_id)
        .bind(board_id)
        .bind(target)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(task)
    }

    async fn count_in_column(&self, column_id: Uuid) -> Result<i64, RepositoryError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM tasks WHERE column_id = $1 AND deleted_at IS NULL",
        )
        .bind(column_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn count_in_board(&self, board_id: Uuid) -> Result<i64, RepositoryError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM tasks WHERE board_id = $1 AND deleted_at IS NULL",
        )
        .bind(board_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn soft_delete(&self, id: Uuid) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let (column_id, position): (Uuid, i32) = sqlx::query_as(
            r#"
            UPDATE tasks
            SET deleted_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND deleted_at IS NULL
            RETURNING column_id, position
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        sqlx::query(
            "UPDATE tasks SET position = position - 1 \
             WHERE column_id = $1 AND deleted_at IS NULL AND position > $2",
        )
        .bind(column_id)
        .bind(position)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn restore(&self, id: Uuid) -> Result<Task, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let column_id: Uuid = sqlx::query_scalar(
            "SELECT column_id FROM tasks WHERE id = $1 AND deleted_at IS NOT NULL FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        let position = Self::next_position(&mut tx, column_id).await?;

        let task = sqlx::query_as::<_, Task>(&format!(
            r#"
            UPDATE tasks
            SET deleted_at = NULL, position = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING {TASK_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(position)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(task)
    }

    async fn add_minutes(&self, id: Uuid, minutes: i32) -> Result<Task, RepositoryError> {
        sqlx::query_as::<_, Task>(&format!(
            r#"
            UPDATE tasks
            SET actual_minutes = actual_minutes + $2, updated_at = NOW()
            WHERE id = $1 AND deleted_at IS NULL
            RETURNING {TASK_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(minutes)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)
    }
}
