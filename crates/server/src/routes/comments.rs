use axum::{Extension, Router, extract::State, routing::{get, put}};
use db::models::comment::Comment;
use services::services::comments::CommentBody;
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
        .route(
            "/tasks/{id}/comments",
            get(list_comments).post(create_comment),
        )
        .route("/comments/{id}", put(update_comment).delete(delete_comment))
}

pub async fn list_comments(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    ApiPath(task_id): ApiPath<Uuid>,
) -> ApiResult<Vec<Comment>> {
    ok(state.services().comments.list(&ctx.user, task_id).await?)
}

#[instrument(name = "comments.create", skip(state, ctx, payload), fields(user_id = %ctx.user.id, task_id = %task_id))]
pub async fn create_comment(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    ApiPath(task_id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<CommentBody>,
) -> Created<Comment> {
    created(
        state
            .services()
            .comments
            .create(&ctx.user, task_id, payload)
            .await?,
    )
}

#[instrument(name = "comments.update", skip(state, ctx, payload), fields(user_id = %ctx.user.id, comment_id = %id))]
pub async fn update_comment(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<CommentBody>,
) -> ApiResult<Comment> {
    ok(state
        .services()
        .comments
        .update(&ctx.user, id, payload)
        .await?)
}

#[instrument(name = "comments.delete", skip(state, ctx), fields(user_id = %ctx.user.id, comment_id = %id))]
pub async fn delete_comment(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<()> {
    state.services().comments.delete(&ctx.user, id).await?;
    ok(())
}
