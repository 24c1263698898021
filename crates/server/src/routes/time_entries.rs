use axum::{
    Extension, Router,
    body::Bytes,
    extract::State,
    routing::{get, post},
};
use db::models::time_entry::TimeEntry;
use services::services::{
    error::ServiceError,
    time_tracking::{LogTime, StartTimer},
};
use tracing::instrument;
use utils::response::FieldError;
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
            "/tasks/{id}/time-entries",
            get(list_time_entries).post(log_time),
        )
        .route("/tasks/{id}/timer/start", post(start_timer))
        .route("/tasks/{id}/timer/stop", post(stop_timer))
}

/// The start body is optional; an empty body starts a timer without a note.
fn parse_start(body: &[u8]) -> Result<StartTimer, ServiceError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(StartTimer::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| ServiceError::validation(vec![FieldError::new("body", e.to_string())]))
}

pub async fn list_time_entries(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    ApiPath(task_id): ApiPath<Uuid>,
) -> ApiResult<Vec<TimeEntry>> {
    ok(state
        .services()
        .time_tracking
        .list(&ctx.user, task_id)
        .await?)
}

#[instrument(name = "time.log", skip(state, ctx, payload), fields(user_id = %ctx.user.id, task_id = %task_id))]
pub async fn log_time(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    ApiPath(task_id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<LogTime>,
) -> Created<TimeEntry> {
    created(
        state
            .services()
            .time_tracking
            .log_time(&ctx.user, task_id, payload)
            .await?,
    )
}

#[instrument(name = "time.start", skip(state, ctx, body), fields(user_id = %ctx.user.id, task_id = %task_id))]
pub async fn start_timer(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    ApiPath(task_id): ApiPath<Uuid>,
    body: Bytes,
) -> Created<TimeEntry> {
    let req = parse_start(&body)?;
    created(
        state
            .services()
            .time_tracking
            .start_timer(&ctx.user, task_id, req)
            .await?,
    )
}

#[instrument(name = "time.stop", skip(state, ctx), fields(user_id = %ctx.user.id, task_id = %task_id))]
pub async fn stop_timer(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    ApiPath(task_id): ApiPath<Uuid>,
) -> ApiResult<TimeEntry> {
    ok(state
        .services()
        .time_tracking
        .stop_timer(&ctx.user, task_id)
        .await?)
}
