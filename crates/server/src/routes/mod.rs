use axum::{
    Json, Router,
    http::{HeaderName, HeaderValue, Method, Request, StatusCode, header},
    middleware,
    response::{IntoResponse, Json as ResponseJson},
};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, RequestId, SetRequestIdLayer},
    trace::{DefaultOnFailure, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, field, warn};
use utils::response::ApiResponse;

use crate::{
    AppState,
    error::ApiError,
    middleware::{CSRF_HEADER, require_csrf, require_session},
};

pub mod attachments;
pub mod auth;
pub mod boards;
pub mod columns;
pub mod comments;
pub mod csrf;
pub mod health;
pub mod projects;
pub mod tags;
pub mod tasks;
pub mod time_entries;
pub mod users;

pub type ApiResult<T> = Result<ResponseJson<ApiResponse<T>>, ApiError>;
pub type Created<T> = Result<(StatusCode, ResponseJson<ApiResponse<T>>), ApiError>;

pub(crate) fn ok<T>(data: T) -> ApiResult<T> {
    Ok(ResponseJson(ApiResponse::success(data)))
}

pub(crate) fn created<T>(data: T) -> Created<T> {
    Ok((StatusCode::CREATED, ResponseJson(ApiResponse::success(data))))
}

const REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

pub fn router(state: AppState) -> Router {
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(|request: &Request<_>| {
            let request_id = request
                .extensions()
                .get::<RequestId>()
                .and_then(|id| id.header_value().to_str().ok());
            let span = tracing::info_span!(
                "http_request",
                method = %request.method(),
                uri = %request.uri(),
                request_id = field::Empty
            );
            if let Some(request_id) = request_id {
                span.record("request_id", field::display(request_id));
            }
            span
        })
        .on_response(DefaultOnResponse::new().level(Level::INFO))
        .on_failure(DefaultOnFailure::new().level(Level::ERROR));

    let public = Router::<AppState>::new()
        .merge(health::router())
        .merge(csrf::router())
        .merge(auth::public_router());

    let protected = Router::<AppState>::new()
        .merge(auth::protected_router())
        .merge(users::router())
        .merge(projects::router())
        .merge(boards::router())
        .merge(columns::router())
        .merge(tasks::router())
        .merge(comments::router())
        .merge(attachments::router())
        .merge(time_entries::router())
        .merge(tags::router())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            require_session,
        ));

    let cors = cors_layer(state.config().cors_origin.as_deref());

    Router::<AppState>::new()
        .nest("/api", public.merge(protected))
        .fallback(route_not_found)
        .layer(middleware::from_fn(require_csrf))
        .layer(cors)
        .layer(trace_layer)
        .layer(PropagateRequestIdLayer::new(REQUEST_ID))
        .layer(SetRequestIdLayer::new(REQUEST_ID, MakeRequestUuid {}))
        .with_state(state)
}

/// Credentialed CORS for a single configured origin; permissive otherwise.
fn cors_layer(origin: Option<&str>) -> CorsLayer {
    let Some(origin) = origin else {
        return CorsLayer::permissive();
    };
    match HeaderValue::from_str(origin) {
        Ok(origin) => CorsLayer::new()
            .allow_origin(AllowOrigin::exact(origin))
            .allow_credentials(true)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::PATCH,
                Method::DELETE,
            ])
            .allow_headers([
                header::CONTENT_TYPE,
                header::AUTHORIZATION,
                HeaderName::from_static(CSRF_HEADER),
            ]),
        Err(error) => {
            warn!(?error, origin, "ignoring unusable CORS origin");
            CorsLayer::permissive()
        }
    }
}

async fn route_not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(ApiResponse::<()>::error("Маршрут не найден", "ROUTE_NOT_FOUND")),
    )
}
