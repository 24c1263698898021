use axum::{Extension, Router, extract::State, routing::{delete, get}};
use db::models::attachment::Attachment;
use services::services::attachments::CreateAttachment;
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
            "/tasks/{id}/attachments",
            get(list_attachments).post(create_attachment),
        )
        .route("/attachments/{id}", delete(delete_attachment))
}

pub async fn list_attachments(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    ApiPath(task_id): ApiPath<Uuid>,
) -> ApiResult<Vec<Attachment>> {
    ok(state.services().attachments.list(&ctx.user, task_id).await?)
}

/// Records metadata; the upload itself goes to `storage_path`.
#[instrument(name = "attachments.create", skip(state, ctx, payload), fields(user_id = %ctx.user.id, task_id = %task_id))]
pub async fn create_attachment(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    ApiPath(task_id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<CreateAttachment>,
) -> Created<Attachment> {
    created(
        state
            .services()
            .attachments
            .create(&ctx.user, task_id, payload)
            .await?,
    )
}

#[instrument(name = "attachments.delete", skip(state, ctx), fields(user_id = %ctx.user.id, attachment_id = %id))]
pub async fn delete_attachment(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<()> {
    state.services().attachments.delete(&ctx.user, id).await?;
    ok(())
}
