use chrono::{DateTime, Duration, Utc};
use db::models::{
    time_entry::{NewTimeEntry, TimeEntry},
    user::User,
};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use super::{
    ServiceContext,
    error::ServiceError,
    events::EventKind,
    permissions::Permission,
    tasks::task_with_permission,
    validation::{TIME_ENTRY_DESCRIPTION_MAX, TIME_ENTRY_MINUTES_MAX, Validator, normalize_optional},
};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StartTimer {
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogTime {
    pub duration_minutes: i32,
    pub description: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
}

impl LogTime {
    pub fn validate(&self) -> Result<(), ServiceError> {
        let mut v = Validator::new();
        v.int_range(
            "duration_minutes",
            self.duration_minutes.into(),
            1,
            TIME_ENTRY_MINUTES_MAX,
        )
        .optional_text(
            "description",
            self.description.as_deref(),
            TIME_ENTRY_DESCRIPTION_MAX,
        );
        v.finish()
    }
}

/// Whole minutes, rounded up, never less than one.
pub fn billable_minutes(elapsed: Duration) -> i32 {
    let seconds = elapsed.num_seconds().max(0);
    ((seconds + 59) / 60).clamp(1, i64::from(i32::MAX)) as i32
}

fn timer_running() -> ServiceError {
    ServiceError::conflict(
        "TIMER_ALREADY_RUNNING",
        "Таймер для этой задачи уже запущен",
    )
}

#[derive(Clone)]
pub struct TimeTrackingService {
    ctx: ServiceContext,
}

impl TimeTrackingService {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    pub async fn list(&self, actor: &User, task_id: Uuid) -> Result<Vec<TimeEntry>, ServiceError> {
        task_with_permission(&self.ctx, actor, task_id, Permission::ViewProject).await?;
        Ok(self.ctx.stores.time_entries.list_by_task(task_id).await?)
    }

    pub async fn start_timer(
        &self,
        actor: &User,
        task_id: Uuid,
        req: StartTimer,
    ) -> Result<TimeEntry, ServiceError> {
        let task = task_with_permission(&self.ctx, actor, task_id, Permission::EditTasks).await?;
        let mut v = Validator::new();
        v.optional_text(
            "description",
            req.description.as_deref(),
            TIME_ENTRY_DESCRIPTION_MAX,
        );
        v.finish()?;

        let entries = &self.ctx.stores.time_entries;
        if entries.find_running(task_id, actor.id).await?.is_some() {
            return Err(timer_running());
        }
        let entry = entries
            .create(NewTimeEntry {
                task_id,
                user_id: actor.id,
                started_at: Utc::now(),
                ended_at: None,
                duration_minutes: None,
                description: normalize_optional(req.description),
            })
            .await
            .map_err(|e| match ServiceError::from(e) {
                ServiceError::Conflict { .. } => timer_running(),
                other => other,
            })?;
        self.ctx.events.emit(
            EventKind::TimerStarted,
            Some(task.project_id),
            entry.id,
            actor.id,
        );
        Ok(entry)
    }

    /// Closes the running entry and adds its minutes to the task.
    pub async fn stop_timer(&self, actor: &User, task_id: Uuid) -> Result<TimeEntry, ServiceError> {
        let task = task_with_permission(&self.ctx, actor, task_id, Permission::EditTasks).await?;
        let running = self
            .ctx
            .stores
            .time_entries
            .find_running(task_id, actor.id)
            .await?
            .ok_or_else(|| {
                ServiceError::not_found("TIMER_NOT_RUNNING", "Нет запущенного таймера")
            })?;

        let ended_at = Utc::now();
        let minutes = billable_minutes(ended_at - running.started_at);
        let entry = self
            .ctx
            .stores
            .time_entries
            .stop(running.id, ended_at, minutes)
            .await?;
        self.ctx.stores.tasks.add_minutes(task_id, minutes).await?;

        info!(task_id = %task_id, minutes, "timer stopped");
        self.ctx.events.emit(
            EventKind::TimerStopped,
            Some(task.project_id),
            entry.id,
            actor.id,
        );
        Ok(entry)
    }

    pub async fn log_time(
        &self,
        actor: &User,
        task_id: Uuid,
        req: LogTime,
    ) -> Result<TimeEntry, ServiceError> {
        let task = task_with_permission(&self.ctx, actor, task_id, Permission::EditTasks).await?;
        req.validate()?;

        let duration = Duration::minutes(req.duration_minutes.into());
        let started_at = req.started_at.unwrap_or_else(|| Utc::now() - duration);
        let entry = self
            .ctx
            .stores
            .time_entries
            .create(NewTimeEntry {
                task_id,
                user_id: actor.id,
                started_at,
                ended_at: Some(started_at + duration),
                duration_minutes: Some(req.duration_minutes),
                description: normalize_optional(req.description),
            })
            .await?;
        self.ctx
            .stores
            .tasks
            .add_minutes(task_id, req.duration_minutes)
            .await?;
        self.ctx.events.emit(
            EventKind::TimeLogged,
            Some(task.project_id),
            entry.id,
            actor.id,
        );
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{
        boards::tests::create_board,
        projects::tests::create_project,
        tasks::tests::create_task,
        test_support::{register, services},
    };

    #[test]
    fn test_billable_minutes_rounds_up() {
        assert_eq!(billable_minutes(Duration::seconds(0)), 1);
        assert_eq!(billable_minutes(Duration::seconds(59)), 1);
        assert_eq!(billable_minutes(Duration::seconds(60)), 1);
        assert_eq!(billable_minutes(Duration::seconds(61)), 2);
        assert_eq!(billable_minutes(Duration::minutes(90)), 90);
        assert_eq!(billable_minutes(Duration::seconds(-5)), 1);
    }

    #[tokio::test]
    async fn test_timer_lifecycle() {
        let services = services();
        let admin = register(&services, "Admin").await;
        let project = create_project(&services, &admin, "P").await;
        let board = create_board(&services, &admin, &project, "B").await;
        let task = create_task(&services, &admin, board.columns[0].id, "t").await;

        let err = services
            .time_tracking
            .stop_timer(&admin, task.id)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "TIMER_NOT_RUNNING");

        let started = services
            .time_tracking
            .start_timer(&admin, task.id, StartTimer::default())
            .await
            .unwrap();
        assert!(started.is_running());

        let err = services
            .time_tracking
            .start_timer(&admin, task.id, StartTimer::default())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "TIMER_ALREADY_RUNNING");

        let stopped = services
            .time_tracking
            .stop_timer(&admin, task.id)
            .await
            .unwrap();
        assert_eq!(stopped.duration_minutes, Some(1));

        let task = services.tasks.get(&admin, task.id).await.unwrap();
        assert_eq!(task.actual_minutes, 1);
    }

    #[tokio::test]
    async fn test_log_time() {
        let services = services();
        let admin = register(&services, "Admin").await;
        let project = create_project(&services, &admin, "P").await;
        let board = create_board(&services, &admin, &project, "B").await;
        let task = create_task(&services, &admin, board.columns[0].id, "t").await;

        let err = services
            .time_tracking
            .log_time(
                &admin,
                task.id,
                LogTime {
                    duration_minutes: 1441,
                    description: None,
                    started_at: None,
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");

        let entry = services
            .time_tracking
            .log_time(
                &admin,
                task.id,
                LogTime {
                    duration_minutes: 45,
                    description: Some("review".to_string()),
                    started_at: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(entry.duration_minutes, Some(45));
        assert!(!entry.is_running());

        let entries = services.time_tracking.list(&admin, task.id).await.unwrap();
        assert_eq!(entries.len(), 1);
        let task = services.tasks.get(&admin, task.id).await.unwrap();
        assert_eq!(task.actual_minutes, 45);
    }
}
