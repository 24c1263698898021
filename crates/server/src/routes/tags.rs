use axum::{Extension, Router, extract::State, routing::{delete, get}};
use db::models::tag::Tag;
use services::services::tags::{CreateTag, TagQuery};
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
        .route("/tags", get(list_tags).post(create_tag))
        .route("/tags/{id}", delete(delete_tag))
}

pub async fn list_tags(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    ApiQuery(query): ApiQuery<TagQuery>,
) -> ApiResult<Vec<Tag>> {
    ok(state
        .services()
        .tags
        .list(&ctx.user, query.project_id)
        .await?)
}

#[instrument(name = "tags.create", skip(state, ctx, payload), fields(user_id = %ctx.user.id))]
pub async fn create_tag(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    ApiJson(payload): ApiJson<CreateTag>,
) -> Created<Tag> {
    created(state.services().tags.create(&ctx.user, payload).await?)
}

#[instrument(name = "tags.delete", skip(state, ctx), fields(user_id = %ctx.user.id, tag_id = %id))]
pub async fn delete_tag(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<()> {
    state.services().tags.delete(&ctx.user, id).await?;
    ok(())
}
