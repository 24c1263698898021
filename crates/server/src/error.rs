use axum::{
    Json,
    extract::{
        FromRequest, FromRequestParts, Path, Query,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use services::services::error::ServiceError;
use thiserror::Error;
use utils::response::ApiResponse;

pub const CSRF_TOKEN_INVALID: &str = "CSRF_TOKEN_INVALID";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Service(#[from] ServiceError),
    #[error("Недействительный CSRF-токен")]
    Csrf,
    #[error("Некорректное тело запроса: {0}")]
    Body(#[from] JsonRejection),
    #[error("Некорректный параметр пути: {0}")]
    Path(#[from] PathRejection),
    #[error("Некорректные параметры запроса: {0}")]
    Query(#[from] QueryRejection),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Service(err) => service_status(err),
            Self::Csrf => StatusCode::FORBIDDEN,
            Self::Body(rejection) => rejection.status(),
            Self::Path(_) | Self::Query(_) => StatusCode::BAD_REQUEST,
        }
    }
}

pub fn service_status(err: &ServiceError) -> StatusCode {
    match err {
        ServiceError::Validation { .. } | ServiceError::Unprocessable { .. } => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        ServiceError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
        ServiceError::Forbidden { .. } => StatusCode::FORBIDDEN,
        ServiceError::NotFound { .. } => StatusCode::NOT_FOUND,
        ServiceError::Conflict { .. } => StatusCode::CONFLICT,
        ServiceError::Internal(_) | ServiceError::Repository(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body: ApiResponse<()> = match &self {
            ApiError::Service(err) if status.is_server_error() => {
                tracing::error!(error = %err, "request failed");
                ApiResponse::error("Внутренняя ошибка сервера", err.code())
            }
            ApiError::Service(err) => {
                ApiResponse::error(err.to_string(), err.code()).with_details(err.details().to_vec())
            }
            ApiError::Csrf => ApiResponse::error(self.to_string(), CSRF_TOKEN_INVALID),
            ApiError::Body(rejection) => {
                tracing::debug!(error = %rejection, "rejected request body");
                ApiResponse::error(self.to_string(), "INVALID_REQUEST_BODY")
            }
            ApiError::Path(_) => ApiResponse::error(self.to_string(), "INVALID_PATH"),
            ApiError::Query(_) => ApiResponse::error(self.to_string(), "INVALID_QUERY"),
        };
        (status, Json(body)).into_response()
    }
}

/// `Json` extractor whose rejections use the API envelope.
#[derive(Debug, FromRequest)]
#[from_request(via(Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

#[derive(Debug, FromRequestParts)]
#[from_request(via(Path), rejection(ApiError))]
pub struct ApiPath<T>(pub T);

#[derive(Debug, FromRequestParts)]
#[from_request(via(Query), rejection(ApiError))]
pub struct ApiQuery<T>(pub T);
