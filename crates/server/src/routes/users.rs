use axum::{
    Extension, Router,
    extract::State,
    routing::{get, post, put},
};
use db::models::user::{UpdateUserData, User};
use serde::Serialize;
use services::services::users::{ChangePasswordRequest, SetRoleRequest};
use tracing::instrument;
use uuid::Uuid;

use super::{ApiResult, ok};
use crate::{
    AppState,
    error::{ApiJson, ApiPath},
    middleware::RequestContext,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users))
        .route(
            "/users/{id}",
            get(get_user).put(update_user).delete(delete_user),
        )
        .route("/users/{id}/password", put(change_password))
        .route("/users/{id}/role", put(set_role))
        .route("/users/{id}/approve", post(approve_user))
}

#[derive(Debug, Serialize)]
pub struct PasswordChanged {
    pub revoked_sessions: u64,
}

pub async fn list_users(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
) -> ApiResult<Vec<User>> {
    ok(state.services().users.list(&ctx.user).await?)
}

pub async fn get_user(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<User> {
    ok(state.services().users.get(id).await?)
}

#[instrument(name = "users.update", skip(state, ctx, payload), fields(user_id = %ctx.user.id, target_id = %id))]
pub async fn update_user(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<UpdateUserData>,
) -> ApiResult<User> {
    ok(state
        .services()
        .users
        .update_profile(&ctx.user, id, payload)
        .await?)
}

#[instrument(name = "users.delete", skip(state, ctx), fields(user_id = %ctx.user.id, target_id = %id))]
pub async fn delete_user(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<()> {
    state.services().users.delete(&ctx.user, id).await?;
    ok(())
}

#[instrument(name = "users.change_password", skip(state, ctx, payload), fields(user_id = %ctx.user.id, target_id = %id))]
pub async fn change_password(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<ChangePasswordRequest>,
) -> ApiResult<PasswordChanged> {
    let revoked_sessions = state
        .services()
        .users
        .change_password(&ctx.user, id, payload)
        .await?;
    ok(PasswordChanged { revoked_sessions })
}

#[instrument(name = "users.set_role", skip(state, ctx, payload), fields(user_id = %ctx.user.id, target_id = %id))]
pub async fn set_role(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<SetRoleRequest>,
) -> ApiResult<User> {
    ok(state
        .services()
        .users
        .set_role(&ctx.user, id, payload.role)
        .await?)
}

#[instrument(name = "users.approve", skip(state, ctx), fields(user_id = %ctx.user.id, target_id = %id))]
pub async fn approve_user(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<User> {
    ok(state.services().users.approve(&ctx.user, id).await?)
}
