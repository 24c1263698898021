use axum::{
    Extension, Router,
    extract::State,
    routing::{get, post},
};
use db::models::{
    tag::Tag,
    task::{Task, TaskFilter, UpdateTaskData},
};
use services::services::tasks::{CreateTask, MoveTask, SetTags};
use tracing::instrument;
use uuid::Uuid;

use super::{ApiResult, Created, created, ok};
use crate::{
    AppState,
    error::{ApiJson, ApiPath, ApiQuery},
    middleware::RequestContext,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/tasks", get(list_tasks).post(create_task))
        .route(
            "/tasks/{id}",
            get(get_task).put(update_task).delete(delete_task),
        )
        .route("/tasks/{id}/restore", post(restore_task))
        .route("/tasks/{id}/move", post(move_task))
        .route("/tasks/{id}/tags", get(list_task_tags).put(set_task_tags))
}

#[instrument(name = "tasks.list", skip(state, ctx, filter), fields(user_id = %ctx.user.id))]
pub async fn list_tasks(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    ApiQuery(filter): ApiQuery<TaskFilter>,
) -> ApiResult<Vec<Task>> {
    ok(state.services().tasks.list(&ctx.user, filter).await?)
}

#[instrument(name = "tasks.create", skip(state, ctx, payload), fields(user_id = %ctx.user.id, column_id = %payload.column_id))]
pub async fn create_task(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    ApiJson(payload): ApiJson<CreateTask>,
) -> Created<Task> {
    created(state.services().tasks.create(&ctx.user, payload).await?)
}

pub async fn get_task(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Task> {
    ok(state.services().tasks.get(&ctx.user, id).await?)
}

#[instrument(name = "tasks.update", skip(state, ctx, payload), fields(user_id = %ctx.user.id, task_id = %id))]
pub async fn update_task(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<UpdateTaskData>,
) -> ApiResult<Task> {
    ok(state.services().tasks.update(&ctx.user, id, payload).await?)
}

#[instrument(name = "tasks.delete", skip(state, ctx), fields(user_id = %ctx.user.id, task_id = %id))]
pub async fn delete_task(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<()> {
    state.services().tasks.delete(&ctx.user, id).await?;
    ok(())
}

#[instrument(name = "tasks.restore", skip(state, ctx), fields(user_id = %ctx.user.id, task_id = %id))]
pub async fn restore_task(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Task> {
    ok(state.services().tasks.restore(&ctx.user, id).await?)
}

#[instrument(name = "tasks.move", skip(state, ctx, payload), fields(user_id = %ctx.user.id, task_id = %id))]
pub async fn move_task(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<MoveTask>,
) -> ApiResult<Task> {
    ok(state
        .services()
        .tasks
        .move_task(&ctx.user, id, payload)
        .await?)
}

pub async fn list_task_tags(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Vec<Tag>> {
    ok(state.services().tasks.list_tags(&ctx.user, id).await?)
}

#[instrument(name = "tasks.set_tags", skip(state, ctx, payload), fields(user_id = %ctx.user.id, task_id = %id))]
pub async fn set_task_tags(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<SetTags>,
) -> ApiResult<Vec<Tag>> {
    ok(state
        .services()
        .tasks
        .set_tags(&ctx.user, id, payload.tag_ids)
        .await?)
}
