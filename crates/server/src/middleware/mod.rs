mod csrf;
mod session;

pub use csrf::{CSRF_COOKIE, CSRF_HEADER, require_csrf};
pub use session::{RequestContext, SESSION_COOKIE, require_session};
