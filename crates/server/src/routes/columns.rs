use axum::{
    Extension, Router,
    extract::State,
    routing::{get, post},
};
use db::models::column::{Column, UpdateColumnData};
use services::services::columns::CreateColumn;
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
        .route("/columns", post(create_column))
        .route(
            "/columns/{id}",
            get(get_column).put(update_column).delete(delete_column),
        )
}

#[instrument(name = "columns.create", skip(state, ctx, payload), fields(user_id = %ctx.user.id, board_id = %payload.board_id))]
pub async fn create_column(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    ApiJson(payload): ApiJson<CreateColumn>,
) -> Created<Column> {
    created(state.services().columns.create(&ctx.user, payload).await?)
}

pub async fn get_column(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Column> {
    ok(state.services().columns.get(&ctx.user, id).await?)
}

#[instrument(name = "columns.update", skip(state, ctx, payload), fields(user_id = %ctx.user.id, column_id = %id))]
pub async fn update_column(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<UpdateColumnData>,
) -> ApiResult<Column> {
    ok(state
        .services()
        .columns
        .update(&ctx.user, id, payload)
        .await?)
}

#[instrument(name = "columns.delete", skip(state, ctx), fields(user_id = %ctx.user.id, column_id = %id))]
pub async fn delete_column(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<()> {
    state.services().columns.delete(&ctx.user, id).await?;
    ok(())
}
