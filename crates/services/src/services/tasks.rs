//! Task lifecycle, ordering within columns and tag assignment.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use db::models::{
    column::Column,
    tag::Tag,
    task::{NewTask, Task, TaskFilter, TaskPriority, TaskStatus, UpdateTaskData},
    user::User,
};
use serde::Deserialize;
use tracing::{debug, instrument};
use uuid::Uuid;

use super::{
    ServiceContext,
    boards::load_board,
    columns::load_column,
    error::ServiceError,
    events::EventKind,
    permissions::Permission,
    validation::{
        ESTIMATED_HOURS_MAX, TASK_DESCRIPTION_MAX, TASK_TITLE_MAX, Validator, normalize_optional,
    },
};

#[derive(Debug, Clone, Deserialize)]
pub struct CreateTask {
    pub column_id: Uuid,
    /// Checked against the column when given.
    pub board_id: Option<Uuid>,
    pub project_id: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub priority: TaskPriority,
    pub assignee_id: Option<Uuid>,
    pub due_date: Option<DateTime<Utc>>,
    pub estimated_hours: Option<f64>,
}

impl CreateTask {
    pub fn validate(&self) -> Result<(), ServiceError> {
        let mut v = Validator::new();
        v.required_text("title", &self.title, TASK_TITLE_MAX)
            .optional_text(
                "description",
                self.description.as_deref(),
                TASK_DESCRIPTION_MAX,
            );
        if let Some(hours) = self.estimated_hours {
            v.float_range("estimated_hours", hours, 0.0, ESTIMATED_HOURS_MAX);
        }
        v.finish()
    }
}

fn validate_update(data: &UpdateTaskData) -> Result<(), ServiceError> {
    let mut v = Validator::new();
    if let Some(title) = &data.title {
        v.required_text("title", title, TASK_TITLE_MAX);
    }
    if let Some(Some(description)) = &data.description {
        v.optional_text("description", Some(description), TASK_DESCRIPTION_MAX);
    }
    if let Some(Some(hours)) = data.estimated_hours {
        v.float_range("estimated_hours", hours, 0.0, ESTIMATED_HOURS_MAX);
    }
    v.finish()
}

#[derive(Debug, Clone, Deserialize)]
pub struct MoveTask {
    pub column_id: Uuid,
    #[serde(default)]
    pub position: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SetTags {
    pub tag_ids: Vec<Uuid>,
}

pub(crate) fn task_not_found() -> ServiceError {
    ServiceError::not_found("TASK_NOT_FOUND", "Задача не найдена")
}

fn column_mismatch() -> ServiceError {
    ServiceError::unprocessable(
        "COLUMN_MISMATCH",
        "Колонка не принадлежит указанной доске или проекту",
    )
}

/// `completed_at` change implied by moving from `from` to `to`.
fn completion_change(
    from: TaskStatus,
    to: TaskStatus,
    now: DateTime<Utc>,
) -> Option<Option<DateTime<Utc>>> {
    match (from == TaskStatus::Done, to == TaskStatus::Done) {
        (false, true) => Some(Some(now)),
        (true, false) => Some(None),
        _ => None,
    }
}

/// Live task by id.
pub(crate) async fn load_task(ctx: &ServiceContext, id: Uuid) -> Result<Task, ServiceError> {
    ctx.stores
        .tasks
        .find_by_id(id, false)
        .await?
        .ok_or_else(task_not_found)
}

/// Live task the actor holds `permission` for.
pub(crate) async fn task_with_permission(
    ctx: &ServiceContext,
    actor: &User,
    id: Uuid,
    permission: Permission,
) -> Result<Task, ServiceError> {
    let task = load_task(ctx, id).await?;
    ctx.access.require(actor, task.project_id, permission).await?;
    Ok(task)
}

#[derive(Clone)]
pub struct TaskService {
    ctx: ServiceContext,
}

impl TaskService {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    async fn ensure_assignee(
        &self,
        project_id: Uuid,
        assignee_id: Option<Uuid>,
    ) -> Result<(), ServiceError> {
        let Some(assignee_id) = assignee_id else {
            return Ok(());
        };
        if self
            .ctx
            .access
            .role_of(project_id, assignee_id)
            .await?
            .is_none()
        {
            return Err(ServiceError::unprocessable(
                "ASSIGNEE_NOT_MEMBER",
                "Исполнитель должен быть участником проекта",
            ));
        }
        Ok(())
    }

    async fn ensure_wip_capacity(&self, column: &Column) -> Result<(), ServiceError> {
        if let Some(limit) = column.wip_limit {
            let count = self.ctx.stores.tasks.count_in_column(column.id).await?;
            if count >= i64::from(limit) {
                return Err(ServiceError::conflict(
                    "WIP_LIMIT_EXCEEDED",
                    format!("Превышен WIP-лимит колонки ({limit})"),
                ));
            }
        }
        Ok(())
    }

    /// Lists tasks in the most specific scope of the filter. Without any
    /// scope the search covers the live projects the actor can see: all of
    /// them for admins, their own for everyone else.
    pub async fn list(
        &self,
        actor: &User,
        mut filter: TaskFilter,
    ) -> Result<Vec<Task>, ServiceError> {
        let mut scoped = false;
        if let Some(column_id) = filter.column_id {
            let column = load_column(&self.ctx, column_id).await?;
            let board = load_board(&self.ctx, column.board_id).await?;
            self.ctx
                .access
                .require(actor, board.project_id, Permission::ViewProject)
                .await?;
            scoped = true;
        }
        if let Some(board_id) = filter.board_id {
            let board = load_board(&self.ctx, board_id).await?;
            self.ctx
                .access
                .require(actor, board.project_id, Permission::ViewProject)
                .await?;
            scoped = true;
        }
        if let Some(project_id) = filter.project_id {
            self.ctx
                .access
                .require(actor, project_id, Permission::ViewProject)
                .await?;
            scoped = true;
        }
        if !scoped {
            let projects = if actor.is_admin() {
                self.ctx.stores.projects.list_all().await?
            } else {
                self.ctx.stores.projects.list_for_user(actor.id).await?
            };
            filter.project_ids = Some(projects.into_iter().map(|p| p.id).collect());
        }
        Ok(self.ctx.stores.tasks.list(&filter).await?)
    }

    #[instrument(name = "tasks.create", skip(self, actor, req), fields(actor_id = %actor.id, column_id = %req.column_id))]
    pub async fn create(&self, actor: &User, req: CreateTask) -> Result<Task, ServiceError> {
        let column = load_column(&self.ctx, req.column_id).await?;
        let board = load_board(&self.ctx, column.board_id).await?;
        if req.board_id.is_some_and(|id| id != board.id)
            || req.project_id.is_some_and(|id| id != board.project_id)
        {
            return Err(column_mismatch());
        }
        self.ctx
            .access
            .require(actor, board.project_id, Permission::EditTasks)
            .await?;
        req.validate()?;
        self.ensure_assignee(board.project_id, req.assignee_id)
            .await?;
        self.ensure_wip_capacity(&column).await?;

        let completed_at = (req.status == TaskStatus::Done).then(Utc::now);
        let task = self
            .ctx
            .stores
            .tasks
            .create(NewTask {
                project_id: board.project_id,
                board_id: board.id,
                column_id: column.id,
                title: req.title.trim().to_string(),
                description: normalize_optional(req.description),
                status: req.status,
                priority: req.priority,
                assignee_id: req.assignee_id,
                reporter_id: Some(actor.id),
                due_date: req.due_date,
                estimated_hours: req.estimated_hours,
                completed_at,
            })
            .await?;
        self.ctx.events.emit(
            EventKind::TaskCreated,
            Some(task.project_id),
            task.id,
            actor.id,
        );
        Ok(task)
    }

    pub async fn get(&self, actor: &User, id: Uuid) -> Result<Task, ServiceError> {
        task_with_permission(&self.ctx, actor, id, Permission::ViewProject).await
    }

    /// Entering `done` stamps `completed_at`; leaving it clears the stamp.
    #[instrument(name = "tasks.update", skip(self, actor, data), fields(actor_id = %actor.id))]
    pub async fn update(
        &self,
        actor: &User,
        id: Uuid,
        mut data: UpdateTaskData,
    ) -> Result<Task, ServiceError> {
        let task = task_with_permission(&self.ctx, actor, id, Permission::EditTasks).await?;
        validate_update(&data)?;
        if let Some(assignee) = data.assignee_id {
            self.ensure_assignee(task.project_id, assignee).await?;
        }
        data.title = data.title.map(|t| t.trim().to_string());
        data.description = data.description.map(normalize_optional);
        data.completed_at = data
            .status
            .and_then(|status| completion_change(task.status, status, Utc::now()));
        if data.is_empty() {
            return Ok(task);
        }

        let task = self.ctx.stores.tasks.update(id, data).await?;
        self.ctx.events.emit(
            EventKind::TaskUpdated,
            Some(task.project_id),
            task.id,
            actor.id,
        );
        Ok(task)
    }

    /// The target column must be on a board of the same project. Positions
    /// outside the column are clamped to its ends.
    #[instrument(name = "tasks.move", skip(self, actor, req), fields(actor_id = %actor.id, column_id = %req.column_id))]
    pub async fn move_task(
        &self,
        actor: &User,
        id: Uuid,
        req: MoveTask,
    ) -> Result<Task, ServiceError> {
        let task = task_with_permission(&self.ctx, actor, id, Permission::EditTasks).await?;
        let column = load_column(&self.ctx, req.column_id).await?;
        let board = load_board(&self.ctx, column.board_id).await?;
        if board.project_id != task.project_id {
            return Err(column_mismatch());
        }
        if column.id != task.column_id {
            self.ensure_wip_capacity(&column).await?;
        }

        let moved = self
            .ctx
            .stores
            .tasks
            .move_to(id, column.id, board.id, req.position)
            .await?;
        debug!(
            task_id = %id,
            from = %task.column_id,
            to = %moved.column_id,
            position = moved.position,
            "task moved"
        );
        self.ctx.events.emit(
            EventKind::TaskMoved,
            Some(moved.project_id),
            moved.id,
            actor.id,
        );
        Ok(moved)
    }

    pub async fn delete(&self, actor: &User, id: Uuid) -> Result<(), ServiceError> {
        let task = task_with_permission(&self.ctx, actor, id, Permission::EditTasks).await?;
        self.ctx.stores.tasks.soft_delete(id).await?;
        self.ctx.events.emit(
            EventKind::TaskDeleted,
            Some(task.project_id),
            id,
            actor.id,
        );
        Ok(())
    }

    /// A task only comes back into a live column on a live board.
    pub async fn restore(&self, actor: &User, id: Uuid) -> Result<Task, ServiceError> {
        let task = self
            .ctx
            .stores
            .tasks
            .find_by_id(id, true)
            .await?
            .ok_or_else(task_not_found)?;
        self.ctx
            .access
            .require(actor, task.project_id, Permission::EditTasks)
            .await?;
        if task.deleted_at.is_none() {
            return Ok(task);
        }

        let column_deleted = || {
            ServiceError::conflict(
                "COLUMN_DELETED",
                "Колонка задачи удалена, восстановление невозможно",
            )
        };
        let column = match load_column(&self.ctx, task.column_id).await {
            Ok(column) => column,
            Err(ServiceError::NotFound { .. }) => return Err(column_deleted()),
            Err(other) => return Err(other),
        };
        if load_board(&self.ctx, column.board_id).await.is_err() {
            return Err(column_deleted());
        }

        let task = self.ctx.stores.tasks.restore(id).await?;
        self.ctx.events.emit(
            EventKind::TaskRestored,
            Some(task.project_id),
            task.id,
            actor.id,
        );
        Ok(task)
    }

    pub async fn list_tags(&self, actor: &User, id: Uuid) -> Result<Vec<Tag>, ServiceError> {
        task_with_permission(&self.ctx, actor, id, Permission::ViewProject).await?;
        Ok(self.ctx.stores.tags.list_for_task(id).await?)
    }

    /// Replaces the task's tags. Tags must be global or belong to the
    /// task's project.
    pub async fn set_tags(
        &self,
        actor: &User,
        id: Uuid,
        tag_ids: Vec<Uuid>,
    ) -> Result<Vec<Tag>, ServiceError> {
        let task = task_with_permission(&self.ctx, actor, id, Permission::EditTasks).await?;

        let mut seen = HashSet::with_capacity(tag_ids.len());
        let tag_ids: Vec<Uuid> = tag_ids.into_iter().filter(|id| seen.insert(*id)).collect();
        for tag_id in &tag_ids {
            let tag = self
                .ctx
                .stores
                .tags
                .find_by_id(*tag_id)
                .await?
                .ok_or_else(|| ServiceError::not_found("TAG_NOT_FOUND", "Тег не найден"))?;
            if tag.project_id.is_some_and(|p| p != task.project_id) {
                return Err(ServiceError::unprocessable(
                    "TAG_PROJECT_MISMATCH",
                    "Тег принадлежит другому проекту",
                ));
            }
        }

        let tags = self.ctx.stores.tags.set_for_task(id, &tag_ids).await?;
        self.ctx.events.emit(
            EventKind::TaskTagsChanged,
            Some(task.project_id),
            id,
            actor.id,
        );
        Ok(tags)
    }
}
