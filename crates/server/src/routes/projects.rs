use axum::{
    Extension, Router,
    extract::State,
    routing::{get, post, put},
};
use db::models::{
    board::Board,
    project::{Project, ProjectMember, ProjectMemberWithUser, UpdateProjectData},
};
use services::services::{
    boards::ReorderRequest,
    projects::{AddMember, CreateProject, UpdateMemberRole},
};
use tracing::instrument;
use uuid::Uuid;

use super::{ApiResult, Created, created, ok};
use crate::{
    AppState,
    error::{ApiJson, ApiPath},
    middleware::RequestContext,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/projects", get(list_projects).post(create_project))
        .route(
            "/projects/{id}",
            get(get_project).put(update_project).delete(delete_project),
        )
        .route("/projects/{id}/restore", post(restore_project))
        .route("/projects/{id}/members", get(list_members).post(add_member))
        .route(
            "/projects/{id}/members/{user_id}",
            put(update_member_role).delete(remove_member),
        )
        .route("/projects/{id}/boards", get(list_boards))
        .route("/projects/{id}/boards/order", put(reorder_boards))
}

#[instrument(name = "projects.list", skip(state, ctx), fields(user_id = %ctx.user.id))]
pub async fn list_projects(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
) -> ApiResult<Vec<Project>> {
    ok(state.services().projects.list(&ctx.user).await?)
}

#[instrument(name = "projects.create", skip(state, ctx, payload), fields(user_id = %ctx.user.id))]
pub async fn create_project(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    ApiJson(payload): ApiJson<CreateProject>,
) -> Created<Project> {
    created(state.services().projects.create(&ctx.user, payload).await?)
}

pub async fn get_project(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Project> {
    ok(state.services().projects.get(&ctx.user, id).await?)
}

#[instrument(name = "projects.update", skip(state, ctx, payload), fields(user_id = %ctx.user.id, project_id = %id))]
pub async fn update_project(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<UpdateProjectData>,
) -> ApiResult<Project> {
    ok(state
        .services()
        .projects
        .update(&ctx.user, id, payload)
        .await?)
}

#[instrument(name = "projects.delete", skip(state, ctx), fields(user_id = %ctx.user.id, project_id = %id))]
pub async fn delete_project(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<()> {
    state.services().projects.delete(&ctx.user, id).await?;
    ok(())
}

#[instrument(name = "projects.restore", skip(state, ctx), fields(user_id = %ctx.user.id, project_id = %id))]
pub async fn restore_project(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Project> {
    ok(state.services().projects.restore(&ctx.user, id).await?)
}

pub async fn list_members(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Vec<ProjectMemberWithUser>> {
    ok(state.services().projects.list_members(&ctx.user, id).await?)
}

#[instrument(name = "projects.add_member", skip(state, ctx, payload), fields(user_id = %ctx.user.id, project_id = %id))]
pub async fn add_member(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<AddMember>,
) -> Created<ProjectMember> {
    created(
        state
            .services()
            .projects
            .add_member(&ctx.user, id, payload)
            .await?,
    )
}

#[instrument(name = "projects.update_member_role", skip(state, ctx, payload), fields(user_id = %ctx.user.id, project_id = %id, member_id = %user_id))]
pub async fn update_member_role(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    ApiPath((id, user_id)): ApiPath<(Uuid, Uuid)>,
    ApiJson(payload): ApiJson<UpdateMemberRole>,
) -> ApiResult<ProjectMember> {
    ok(state
        .services()
        .projects
        .update_member_role(&ctx.user, id, user_id, payload.role)
        .await?)
}

#[instrument(name = "projects.remove_member", skip(state, ctx), fields(user_id = %ctx.user.id, project_id = %id, member_id = %user_id))]
pub async fn remove_member(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    ApiPath((id, user_id)): ApiPath<(Uuid, Uuid)>,
) -> ApiResult<()> {
    state
        .services()
        .projects
        .remove_member(&ctx.user, id, user_id)
        .await?;
    ok(())
}

pub async fn list_boards(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Vec<Board>> {
    ok(state.services().boards.list(&ctx.user, id).await?)
}

#[instrument(name = "boards.reorder", skip(state, ctx, payload), fields(user_id = %ctx.user.id, project_id = %id))]
pub async fn reorder_boards(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<ReorderRequest>,
) -> ApiResult<Vec<Board>> {
    ok(state
        .services()
        .boards
        .reorder(&ctx.user, id, payload.ids)
        .await?)
}
