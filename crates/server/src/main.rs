use std::time::Duration;

use anyhow::{Context, Error as AnyhowError};
use db::{DbConfig, DbConfigError, Stores};
use server::{AppState, build_router, config::ConfigError, config::ServerConfig, file_logging};
use services::services::auth::AuthService;
use sqlx::{Error as SqlxError, migrate::MigrateError};
use thiserror::Error;

const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(15 * 60);

#[derive(Debug, Error)]
pub enum EncoreTasksError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    DbConfig(#[from] DbConfigError),
    #[error(transparent)]
    Sqlx(#[from] SqlxError),
    #[error(transparent)]
    Migrate(#[from] MigrateError),
    #[error(transparent)]
    Other(#[from] AnyhowError),
}

#[tokio::main]
async fn main() -> Result<(), EncoreTasksError> {
    // Load .env file if present (for development)
    dotenvy::dotenv().ok();

    // The guard must outlive the server so file logs are flushed
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let _file_log_guard = file_logging::init_logging(&log_level);

    let config = ServerConfig::from_env()?;
    let db_config = DbConfig::from_env()?;

    let pool = db::create_pool(&db_config).await?;
    db::migrate(&pool).await?;
    tracing::info!("Database migrations applied");

    let state = AppState::new(Stores::postgres(pool.clone()), config.clone());
    let event_logger = state.services().events.spawn_event_logger();
    let sweeper = spawn_session_sweeper(state.services().auth.clone());

    let bind_address = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("failed to bind {bind_address}"))?;
    let addr = listener.local_addr()?;
    tracing::info!(
        "Encore Tasks {} running on http://{addr}",
        utils::build_info::BUILD_INFO.describe()
    );

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.abort();
    event_logger.abort();

    tracing::info!("Closing database connection pool...");
    pool.close().await;
    tracing::info!("Database connection pool closed");
    Ok(())
}

/// Deletes expired sessions periodically.
fn spawn_session_sweeper(auth: AuthService) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SESSION_SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            if let Err(e) = auth.purge_expired().await {
                tracing::warn!("Failed to purge expired sessions: {}", e);
            }
        }
    })
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
        }
    };

    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let terminate = async {
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
            } else {
                tracing::error!("Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        };

        tokio::select! {
            _ = ctrl_c => {},
            _ = terminate => {},
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await;
    }
}
