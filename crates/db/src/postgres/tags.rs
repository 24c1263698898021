use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    RepositoryError,
    models::tag::{NewTag, Tag, TagStore},
};

pub struct PgTagRepository {
    pool: PgPool,
}

impl PgTagRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TagStore for PgTagRepository {
    async fn create(&self, data: NewTag) -> Result<Tag, RepositoryError> {
        let tag = sqlx::query_as::<_, Tag>(
            r#"
            INSERT INTO tags (id, project_id, name, color)
            VALUES ($1, $2, $3, $4)
            RETURNING id, project_id, name, color, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(data.project_id)
        .bind(data.name)
        .bind(data.color)
        .fetch_one(&self.pool)
        .await?;

        Ok(tag)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Tag>, RepositoryError> {
        let tag = sqlx::query_as::<_, Tag>(
            "SELECT id, project_id, name, color, created_at FROM tags WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(tag)
    }

    async fn list(&self, project_id: Option<Uuid>) -> Result<Vec<Tag>, RepositoryError> {
        let tags = sqlx::query_as::<_, Tag>(
            r#"
            SELECT id, project_id, name, color, created_at
            FROM tags
            WHERE project_id IS NULL OR project_id = $1
            ORDER BY name ASC
            "#,
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(tags)
    }

    async fn delete(&self, id: Uuid) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM tags WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn list_for_task(&self, task_id: Uuid) -> Result<Vec<Tag>, RepositoryError> {
        let tags = sqlx::query_as::<_, Tag>(
            r#"
            SELECT t.id, t.project_id, t.name, t.color, t.created_at
            FROM tags t
            JOIN task_tags tt ON tt.tag_id = t.id
            WHERE tt.task_id = $1
            ORDER BY t.name ASC
            "#,
        )
        .bind(task_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(tags)
    }

    async fn set_for_task(
        &self,
        task_id: Uuid,
        tag_ids: &[Uuid],
    ) -> Result<Vec<Tag>, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM task_tags WHERE task_id = $1")
            .bind(task_id)
            .execute(&mut *tx)
            .await?;

        if !tag_ids.is_empty() {
            sqlx::query(
                r#"
                INSERT INTO task_tags (task_id, tag_id)
                SELECT $1, UNNEST($2::uuid[])
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(task_id)
            .bind(tag_ids.to_vec())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        self.list_for_task(task_id).await
    }
}
