use axum::{
    extract::Request,
    http::{HeaderMap, Method},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use tracing::debug;
use utils::tokens::constant_time_eq;

use crate::error::ApiError;

pub const CSRF_COOKIE: &str = "csrf-token";
pub const CSRF_HEADER: &str = "x-csrf-token";

fn is_safe(method: &Method) -> bool {
    method.is_safe()
}

/// Double-submit check: the `csrf-token` cookie must equal the
/// `x-csrf-token` header.
pub fn tokens_match(jar: &CookieJar, headers: &HeaderMap) -> bool {
    let cookie = jar.get(CSRF_COOKIE).map(|c| c.value()).unwrap_or_default();
    let header = headers
        .get(CSRF_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    !cookie.is_empty() && constant_time_eq(cookie, header)
}

pub async fn require_csrf(jar: CookieJar, req: Request, next: Next) -> Result<Response, ApiError> {
    if is_safe(req.method()) {
        return Ok(next.run(req).await);
    }
    if !tokens_match(&jar, req.headers()) {
        debug!(method = %req.method(), uri = %req.uri(), "csrf token mismatch");
        return Err(ApiError::Csrf);
    }
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use axum::http::{HeaderValue, header::COOKIE};

    use super::*;

    fn request_parts(cookie: Option<&str>, header: Option<&str>) -> (CookieJar, HeaderMap) {
        let mut headers = HeaderMap::new();
        if let Some(cookie) = cookie {
            let value = HeaderValue::from_str(&format!("{CSRF_COOKIE}={cookie}")).unwrap();
            headers.insert(COOKIE, value);
        }
        let jar = CookieJar::from_headers(&headers);
        if let Some(header) = header {
            headers.insert(CSRF_HEADER, HeaderValue::from_str(header).unwrap());
        }
        (jar, headers)
    }

    #[test]
    fn test_tokens_match() {
        let (jar, headers) = request_parts(Some("abc"), Some("abc"));
        assert!(tokens_match(&jar, &headers));

        let (jar, headers) = request_parts(Some("abc"), Some("abd"));
        assert!(!tokens_match(&jar, &headers));

        let (jar, headers) = request_parts(Some("abc"), None);
        assert!(!tokens_match(&jar, &headers));

        let (jar, headers) = request_parts(None, Some("abc"));
        assert!(!tokens_match(&jar, &headers));

        let (jar, headers) = request_parts(Some(""), Some(""));
        assert!(!tokens_match(&jar, &headers));
    }

    #[test]
    fn test_safe_methods() {
        assert!(is_safe(&Method::GET));
        assert!(is_safe(&Method::OPTIONS));
        assert!(!is_safe(&Method::POST));
        assert!(!is_safe(&Method::PATCH));
        assert!(!is_safe(&Method::DELETE));
    }
}
