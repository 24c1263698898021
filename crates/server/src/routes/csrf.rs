use axum::{Router, extract::State, response::Json as ResponseJson, routing::get};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Serialize;
use utils::{response::ApiResponse, tokens::generate_token};

use crate::{AppState, middleware::CSRF_COOKIE};

pub fn router() -> Router<AppState> {
    Router::new().route("/csrf", get(issue_token))
}

#[derive(Debug, Serialize)]
pub struct CsrfToken {
    pub token: String,
}

/// Readable by scripts so the value can be echoed in `x-csrf-token`.
pub fn csrf_cookie(token: String, secure: bool) -> Cookie<'static> {
    Cookie::build((CSRF_COOKIE, token))
        .path("/")
        .same_site(SameSite::Strict)
        .secure(secure)
        .http_only(false)
        .build()
}

pub async fn issue_token(
    State(state): State<AppState>,
    jar: CookieJar,
) -> (CookieJar, ResponseJson<ApiResponse<CsrfToken>>) {
    let token = generate_token();
    let jar = jar.add(csrf_cookie(token.clone(), state.config().cookie_secure));
    (jar, ResponseJson(ApiResponse::success(CsrfToken { token })))
}
