use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    RepositoryError,
    models::time_entry::{NewTimeEntry, TimeEntry, TimeEntryStore},
};

const TIME_ENTRY_COLUMNS: &str =
    "id, task_id, user_id, started_at, ended_at, duration_minutes, description, created_at";

pub struct PgTimeEntryRepository {
    pool: PgPool,
}

impl PgTimeEntryRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TimeEntryStore for PgTimeEntryRepository {
    async fn create(&self, data: NewTimeEntry) -> Result<TimeEntry, RepositoryError> {
        let entry = sqlx::query_as::<_, TimeEntry>(&format!(
            r#"
            INSERT INTO time_entries (
                id, task_id, user_id, started_at, ended_at, duration_minutes, description
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {TIME_ENTRY_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(data.task_id)
        .bind(data.user_id)
        .bind(data.started_at)
        .bind(data.ended_at)
        .bind(data.duration_minutes)
        .bind(data.description)
        .fetch_one(&self.pool)
        .await?;

        Ok(entry)
    }

    async fn find_running(
        &self,
        task_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<TimeEntry>, RepositoryError> {
        let entry = sqlx::query_as::<_, TimeEntry>(&format!(
            r#"
            SELECT {TIME_ENTRY_COLUMNS}
            FROM time_entries
            WHERE task_id = $1 AND user_id = $2 AND ended_at IS NULL
            "#
        ))
        .bind(task_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(entry)
    }

    async fn stop(
        &self,
        id: Uuid,
        ended_at: DateTime<Utc>,
        duration_minutes: i32,
    ) -> Result<TimeEntry, RepositoryError> {
        sqlx::query_as::<_, TimeEntry>(&format!(
            r#"
            UPDATE time_entries
            SET ended_at = $2, duration_minutes = $3
            WHERE id = $1 AND ended_at IS NULL
            RETURNING {TIME_ENTRY_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(ended_at)
        .bind(duration_minutes)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)
    }

    async fn list_by_task(&self, task_id: Uuid) -> Result<Vec<TimeEntry>, RepositoryError> {
        let entries = sqlx::query_as::<_, TimeEntry>(&format!(
            r#"
            SELECT {TIME_ENTRY_COLUMNS}
            FROM time_entries
            WHERE task_id = $1
            ORDER BY started_at DESC
            "#
        ))
        .bind(task_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }
}
