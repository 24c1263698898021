//! Console logging plus optional JSON file logging.
//!
//! - `ENCORE_FILE_LOGGING`: "true" or "1" enables daily rotating log files
//! - `ENCORE_LOG_DIR`: log directory (default `./logs`)
//! - `ENCORE_LOG_MAX_FILES`: daily files to keep (default 7)

use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

const LOG_FILE_PREFIX: &str = "encore-tasks.log";
const DEFAULT_MAX_FILES: usize = 7;

#[derive(Debug, Clone)]
pub struct FileLoggingConfig {
    pub enabled: bool,
    pub log_dir: PathBuf,
    pub max_files: usize,
}

impl Default for FileLoggingConfig {
    fn default() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }
}

impl FileLoggingConfig {
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            enabled: lookup("ENCORE_FILE_LOGGING")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
            log_dir: lookup("ENCORE_LOG_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("logs")),
            max_files: lookup("ENCORE_LOG_MAX_FILES")
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_MAX_FILES),
        }
    }
}

/// Per-crate filter at `log_level`; the analytics event log is always on.
pub fn filter_directives(log_level: &str) -> String {
    format!(
        "warn,server={level},services={level},db={level},utils={level},client={level},encore_tasks::analytics=info",
        level = log_level
    )
}

fn env_filter(log_level: &str) -> EnvFilter {
    EnvFilter::try_new(filter_directives(log_level)).unwrap_or_else(|e| {
        eprintln!("Invalid log level {log_level:?} ({e}); falling back to info");
        EnvFilter::new(filter_directives("info"))
    })
}

/// Install the global subscriber. Keep the returned guard alive for the
/// lifetime of the process so buffered file output is flushed.
pub fn init_logging(log_level: &str) -> Option<WorkerGuard> {
    let config = FileLoggingConfig::default();
    let console_layer = tracing_subscriber::fmt::layer().with_filter(env_filter(log_level));

    if !config.enabled {
        tracing_subscriber::registry().with(console_layer).init();
        return None;
    }

    if let Err(e) = std::fs::create_dir_all(&config.log_dir) {
        eprintln!("Failed to create log directory {:?}: {}", config.log_dir, e);
        tracing_subscriber::registry().with(console_layer).init();
        return None;
    }

    let file_appender = tracing_appender::rolling::daily(&config.log_dir, LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let file_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(env_filter(log_level));

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .init();

    tracing::info!(
        log_dir = ?config.log_dir,
        max_files = config.max_files,
        "File logging enabled"
    );

    let log_dir = config.log_dir.clone();
    let max_files = config.max_files;
    std::thread::spawn(move || cleanup_old_logs(&log_dir, max_files));

    Some(guard)
}

/// Keep only the newest `max_files` log files.
fn cleanup_old_logs(log_dir: &Path, max_files: usize) {
    let Ok(entries) = std::fs::read_dir(log_dir) else {
        return;
    };

    let mut log_files: Vec<_> = entries
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.file_name()
                .to_str()
                .is_some_and(|n| n.starts_with(LOG_FILE_PREFIX))
        })
        .filter_map(|e| {
            e.metadata()
                .ok()
                .and_then(|m| m.modified().ok())
                .map(|t| (e.path(), t))
        })
        .collect();

    log_files.sort_by(|a, b| b.1.cmp(&a.1));

    for (path, _) in log_files.into_iter().skip(max_files) {
        match std::fs::remove_file(&path) {
            Ok(()) => tracing::debug!("Removed old log file: {:?}", path),
            Err(e) => tracing::warn!("Failed to remove old log file {:?}: {}", path, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_lookup() {
        let config = FileLoggingConfig::from_lookup(|key| match key {
            "ENCORE_FILE_LOGGING" => Some("1".to_string()),
            "ENCORE_LOG_DIR" => Some("/var/log/encore".to_string()),
            "ENCORE_LOG_MAX_FILES" => Some("3".to_string()),
            _ => None,
        });
        assert!(config.enabled);
        assert_eq!(config.log_dir, PathBuf::from("/var/log/encore"));
        assert_eq!(config.max_files, 3);

        let config = FileLoggingConfig::from_lookup(|_| None);
        assert!(!config.enabled);
        assert_eq!(config.max_files, DEFAULT_MAX_FILES);
    }

    #[test]
    fn test_filter_directives_cover_workspace_crates() {
        let directives = filter_directives("debug");
        for krate in ["server", "services", "db", "utils"] {
            assert!(directives.contains(&format!("{krate}=debug")));
        }
        assert!(EnvFilter::try_new(directives).is_ok());
    }
}
