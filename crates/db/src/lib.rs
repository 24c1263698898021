use std::{str::FromStr, sync::Arc, time::Duration};

use sqlx::{
    PgPool,
    migrate::MigrateError,
    postgres::{PgConnectOptions, PgPoolOptions, PgSslMode},
};
use thiserror::Error;
use tracing::info;

pub mod error;
#[cfg(any(test, feature = "test-utils"))]
pub mod memory;
pub mod models;
pub mod postgres;

pub use error::RepositoryError;
use models::{
    attachment::AttachmentStore, board::BoardStore, column::ColumnStore, comment::CommentStore,
    project::ProjectStore, session::SessionStore, tag::TagStore, task::TaskStore,
    time_entry::TimeEntryStore, user::UserStore,
};

// ============================================================================
// Connection Pool Configuration
// ============================================================================

/// Default number of PostgreSQL connections in the pool.
/// Can be overridden via the `DB_MAX_CONNECTIONS` environment variable.
const DEFAULT_MAX_CONNECTIONS: u32 = 20;

/// Connection acquisition timeout in seconds.
const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 30;

/// Idle connection timeout in seconds (10 minutes).
const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 600;

#[derive(Debug, Error)]
pub enum DbConfigError {
    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
    #[error("invalid DATABASE_URL: {0}")]
    Url(#[source] sqlx::Error),
}

/// Connection settings read from `DB_*` environment variables.
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub url: Option<String>,
    pub host: String,
    pub port: u16,
    pub name: String,
    pub user: String,
    pub password: String,
    pub ssl: bool,
    pub max_connections: u32,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: None,
            host: "localhost".to_string(),
            port: 5432,
            name: "encore_tasks".to_string(),
            user: "postgres".to_string(),
            password: String::new(),
            ssl: false,
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }
}

impl DbConfig {
    /// Read configuration from the process environment.
    ///
    /// `DATABASE_URL`, when set, takes precedence over the individual
    /// `DB_HOST` / `DB_PORT` / `DB_NAME` / `DB_USER` / `DB_PASSWORD` / `DB_SSL`
    /// variables.
    pub fn from_env() -> Result<Self, DbConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup (used by tests).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, DbConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let port = match lookup("DB_PORT") {
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .map_err(|_| DbConfigError::Invalid {
                    key: "DB_PORT",
                    value: raw,
                })?,
            None => defaults.port,
        };

        Ok(Self {
            url: lookup("DATABASE_URL").filter(|s| !s.trim().is_empty()),
            host: lookup("DB_HOST").unwrap_or(defaults.host),
            port,
            name: lookup("DB_NAME").unwrap_or(defaults.name),
            user: lookup("DB_USER").unwrap_or(defaults.user),
            password: lookup("DB_PASSWORD").unwrap_or(defaults.password),
            ssl: lookup("DB_SSL").map(|v| parse_ssl_flag(&v)).unwrap_or(false),
            max_connections: lookup("DB_MAX_CONNECTIONS")
                .and_then(|s| s.trim().parse::<u32>().ok())
                .filter(|&n| n > 0)
                .unwrap_or(DEFAULT_MAX_CONNECTIONS),
        })
    }

    /// Connection options for sqlx.
    pub fn connect_options(&self) -> Result<PgConnectOptions, DbConfigError> {
        if let Some(url) = &self.url {
            return PgConnectOptions::from_str(url).map_err(DbConfigError::Url);
        }

        let ssl_mode = if self.ssl {
            PgSslMode::Require
        } else {
            PgSslMode::Prefer
        };

        Ok(PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .database(&self.name)
            .username(&self.user)
            .password(&self.password)
            .ssl_mode(ssl_mode))
    }
}

fn parse_ssl_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes" | "require"
    )
}

pub async fn create_pool(config: &DbConfig) -> Result<PgPool, sqlx::Error> {
    let options = config
        .connect_options()
        .map_err(|e| sqlx::Error::Configuration(Box::new(e)))?;

    info!(
        host = %config.host,
        port = config.port,
        database = %config.name,
        ssl = config.ssl,
        max_connections = config.max_connections,
        "connecting to PostgreSQL"
    );

    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(DEFAULT_ACQUIRE_TIMEOUT_SECS))
        .idle_timeout(Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS))
        .connect_with(options)
        .await
}

pub async fn migrate(pool: &PgPool) -> Result<(), MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

// ============================================================================
// Store bundle
// ============================================================================

/// Every repository the services depend on, behind trait objects.
#[derive(Clone)]
pub struct Stores {
    pub users: Arc<dyn UserStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub projects: Arc<dyn ProjectStore>,
    pub boards: Arc<dyn BoardStore>,
    pub columns: Arc<dyn ColumnStore>,
    pub tasks: Arc<dyn TaskStore>,
    pub comments: Arc<dyn CommentStore>,
    pub tags: Arc<dyn TagStore>,
    pub attachments: Arc<dyn AttachmentStore>,
    pub time_entries: Arc<dyn TimeEntryStore>,
}

impl Stores {
    pub fn postgres(pool: PgPool) -> Self {
        use postgres::*;

        Self {
            users: Arc::new(PgUserRepository::new(pool.clone())),
            sessions: Arc::new(PgSessionRepository::new(pool.clone())),
            projects: Arc::new(PgProjectRepository::new(pool.clone())),
            boards: Arc::new(PgBoardRepository::new(pool.clone())),
            columns: Arc::new(PgColumnRepository::new(pool.clone())),
            tasks: Arc::new(PgTaskRepository::new(pool.clone())),
            comments: Arc::new(PgCommentRepository::new(pool.clone())),
            tags: Arc::new(PgTagRepository::new(pool.clone())),
            attachments: Arc::new(PgAttachmentRepository::new(pool.clone())),
            time_entries: Arc::new(PgTimeEntryRepository::new(pool)),
        }
    }

    /// All stores backed by one shared in-memory state.
    #[cfg(any(test, feature = "test-utils"))]
    pub fn memory() -> Self {
        Self::from_memory(Arc::new(memory::MemoryStore::new()))
    }

    /// Wrap an existing in-memory store so callers keep a handle to it.
    #[cfg(any(test, feature = "test-utils"))]
    pub fn from_memory(store: Arc<memory::MemoryStore>) -> Self {
        Self {
            users: store.clone(),
            sessions: store.clone(),
            projects: store.clone(),
            boards: store.clone(),
            columns: store.clone(),
            tasks: store.clone(),
            comments: store.clone(),
            tags: store.clone(),
            attachments: store.clone(),
            time_entries: store,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_env_empty() {
        let config = DbConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 5432);
        assert_eq!(config.name, "encore_tasks");
        assert_eq!(config.user, "postgres");
        assert!(!config.ssl);
        assert_eq!(config.max_connections, DEFAULT_MAX_CONNECTIONS);
        assert!(config.url.is_none());
    }

    #[test]
    fn test_reads_db_variables() {
        let config = DbConfig::from_lookup(lookup(&[
            ("DB_HOST", "db.internal"),
            ("DB_PORT", "6543"),
            ("DB_NAME", "tasks"),
            ("DB_USER", "encore"),
            ("DB_PASSWORD", "secret"),
            ("DB_SSL", "true"),
            ("DB_MAX_CONNECTIONS", "7"),
        ]))
        .unwrap();
        assert_eq!(config.host, "db.internal");
        assert_eq!(config.port, 6543);
        assert_eq!(config.name, "tasks");
        assert_eq!(config.user, "encore");
        assert_eq!(config.password, "secret");
        assert!(config.ssl);
        assert_eq!(config.max_connections, 7);
    }

    #[test]
    fn test_invalid_port_is_rejected() {
        let err = DbConfig::from_lookup(lookup(&[("DB_PORT", "not-a-port")])).unwrap_err();
        assert!(matches!(err, DbConfigError::Invalid { key: "DB_PORT", .. }));
    }

    #[test]
    fn test_zero_max_connections_uses_default() {
        let config = DbConfig::from_lookup(lookup(&[("DB_MAX_CONNECTIONS", "0")])).unwrap();
        assert_eq!(config.max_connections, DEFAULT_MAX_CONNECTIONS);
    }

    #[test]
    fn test_ssl_flag_parsing() {
        assert!(parse_ssl_flag("require"));
        assert!(parse_ssl_flag("1"));
        assert!(parse_ssl_flag("TRUE"));
        assert!(!parse_ssl_flag("false"));
        assert!(!parse_ssl_flag("disable"));
    }

    #[test]
    fn test_database_url_takes_precedence() {
        let config = DbConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://u:p@remote:5433/other"),
            ("DB_HOST", "ignored"),
        ]))
        .unwrap();
        assert!(config.connect_options().is_ok());
        assert_eq!(
            config.url.as_deref(),
            Some("postgres://u:p@remote:5433/other")
        );
    }
}
