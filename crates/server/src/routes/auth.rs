use axum::{
    Extension, Router,
    extract::State,
    http::{HeaderMap, header::USER_AGENT},
    response::Json as ResponseJson,
    routing::{get, post},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{DateTime, Utc};
use db::models::user::User;
use serde::Serialize;
use services::services::auth::{LoginRequest, RegisterRequest};
use tracing::instrument;
use utils::response::ApiResponse;

use super::{ApiResult, Created, created, ok};
use crate::{
    AppState,
    error::{ApiError, ApiJson},
    middleware::{RequestContext, SESSION_COOKIE},
};

pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
}

pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/auth/logout", post(logout))
        .route("/auth/me", get(me))
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user: User,
    /// Also usable as `Authorization: Bearer` by non-browser clients.
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

fn session_cookie(token: String, secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .build()
}

fn client_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .or_else(|| headers.get("x-real-ip").and_then(|v| v.to_str().ok()))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[instrument(name = "auth.register", skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<RegisterRequest>,
) -> Created<User> {
    let user = state.services().auth.register(payload).await?;
    created(user)
}

#[instrument(name = "auth.login", skip_all)]
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    headers: HeaderMap,
    ApiJson(payload): ApiJson<LoginRequest>,
) -> Result<(CookieJar, ResponseJson<ApiResponse<LoginResponse>>), ApiError> {
    let user_agent = headers
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let result = state
        .services()
        .auth
        .login(payload, user_agent, client_ip(&headers))
        .await?;

    let jar = jar.add(session_cookie(
        result.token.clone(),
        state.config().cookie_secure,
    ));
    Ok((
        jar,
        ResponseJson(ApiResponse::success(LoginResponse {
            user: result.user,
            token: result.token,
            expires_at: result.expires_at,
        })),
    ))
}

#[instrument(name = "auth.logout", skip(state, ctx, jar), fields(user_id = %ctx.user.id))]
pub async fn logout(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    jar: CookieJar,
) -> Result<(CookieJar, ResponseJson<ApiResponse<()>>), ApiError> {
    state.services().auth.logout(&ctx.token).await?;
    let jar = jar.remove(Cookie::build(SESSION_COOKIE).path("/"));
    Ok((jar, ResponseJson(ApiResponse::success(()))))
}

pub async fn me(Extension(ctx): Extension<RequestContext>) -> ApiResult<User> {
    ok(ctx.user)
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn test_client_ip_prefers_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("10.0.0.1, 10.0.0.2"));
        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.3"));
        assert_eq!(client_ip(&headers).as_deref(), Some("10.0.0.1"));

        headers.remove("x-forwarded-for");
        assert_eq!(client_ip(&headers).as_deref(), Some("10.0.0.3"));

        assert_eq!(client_ip(&HeaderMap::new()), None);
    }

    #[test]
    fn test_session_cookie_attributes() {
        let cookie = session_cookie("tok".to_string(), true);
        assert_eq!(cookie.name(), SESSION_COOKIE);
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
    }
}
