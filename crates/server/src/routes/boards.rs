use axum::{
    Extension, Router,
    extract::State,
    routing::{get, post, put},
};
use db::models::{
    board::{Board, UpdateBoardData},
    column::Column,
};
use services::services::boards::{BoardWithColumns, CreateBoard, ReorderRequest};
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
        .route("/boards", post(create_board))
        .route(
            "/boards/{id}",
            get(get_board).put(update_board).delete(delete_board),
        )
        .route("/boards/{id}/restore", post(restore_board))
        .route("/boards/{id}/columns", get(list_columns))
        .route("/boards/{id}/columns/order", put(reorder_columns))
}

#[instrument(name = "boards.create", skip(state, ctx, payload), fields(user_id = %ctx.user.id, project_id = %payload.project_id))]
pub async fn create_board(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    ApiJson(payload): ApiJson<CreateBoard>,
) -> Created<BoardWithColumns> {
    created(state.services().boards.create(&ctx.user, payload).await?)
}

pub async fn get_board(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Board> {
    ok(state.services().boards.get(&ctx.user, id).await?)
}

#[instrument(name = "boards.update", skip(state, ctx, payload), fields(user_id = %ctx.user.id, board_id = %id))]
pub async fn update_board(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<UpdateBoardData>,
) -> ApiResult<Board> {
    ok(state.services().boards.update(&ctx.user, id, payload).await?)
}

#[instrument(name = "boards.delete", skip(state, ctx), fields(user_id = %ctx.user.id, board_id = %id))]
pub async fn delete_board(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<()> {
    state.services().boards.delete(&ctx.user, id).await?;
    ok(())
}

#[instrument(name = "boards.restore", skip(state, ctx), fields(user_id = %ctx.user.id, board_id = %id))]
pub async fn restore_board(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Board> {
    ok(state.services().boards.restore(&ctx.user, id).await?)
}

pub async fn list_columns(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Vec<Column>> {
    ok(state.services().columns.list(&ctx.user, id).await?)
}

#[instrument(name = "columns.reorder", skip(state, ctx, payload), fields(user_id = %ctx.user.id, board_id = %id))]
pub async fn reorder_columns(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<ReorderRequest>,
) -> ApiResult<Vec<Column>> {
    ok(state
        .services()
        .columns
        .reorder(&ctx.user, id, payload.ids)
        .await?)
}
