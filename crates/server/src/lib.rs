pub mod config;
pub mod error;
pub mod file_logging;
pub mod middleware;
pub mod routes;
pub mod state;

use axum::Router;

pub use state::AppState;

/// The complete `/api` application.
pub fn build_router(state: AppState) -> Router {
    routes::router(state)
}
