//! Server settings read from the environment.
//!
//! | variable              | default     |
//! |-----------------------|-------------|
//! | `HOST` / `PORT`       | `127.0.0.1` / `3000` |
//! | `SESSION_TTL_HOURS`   | `168`       |
//! | `COOKIE_SECURE`       | `false`     |
//! | `REQUIRE_APPROVAL`    | `false`     |
//! | `CACHE_ENABLED`       | `true`      |
//! | `CACHE_TTL_SECS`      | `60`        |
//! | `PASSWORD_ITERATIONS` | `100000`    |
//! | `CORS_ORIGIN`         | unset, permissive CORS |

use std::{str::FromStr, time::Duration};

use axum::http::HeaderValue;
use services::services::{
    DEFAULT_SESSION_TTL_HOURS, ServiceConfig,
    cache::{CacheConfig, DEFAULT_CACHE_TTL},
    password::DEFAULT_ITERATIONS,
};
use thiserror::Error;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 3000;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Adds the `Secure` attribute to session and CSRF cookies.
    pub cookie_secure: bool,
    pub cors_origin: Option<String>,
    pub services: ServiceConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            cookie_secure: false,
            cors_origin: None,
            services: ServiceConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let session_ttl_hours: i64 = parse(&get, "SESSION_TTL_HOURS", DEFAULT_SESSION_TTL_HOURS)?;
        if session_ttl_hours <= 0 {
            return Err(invalid("SESSION_TTL_HOURS", session_ttl_hours.to_string()));
        }
        let password_iterations: u32 = parse(&get, "PASSWORD_ITERATIONS", DEFAULT_ITERATIONS)?;
        if password_iterations == 0 {
            return Err(invalid("PASSWORD_ITERATIONS", "0".to_string()));
        }
        let cache_ttl_secs: u64 =
            parse(&get, "CACHE_TTL_SECS", DEFAULT_CACHE_TTL.as_secs())?;
        let cors_origin = get("CORS_ORIGIN").map(|v| v.trim().to_string());
        if let Some(origin) = &cors_origin
            && HeaderValue::from_str(origin).is_err()
        {
            return Err(invalid("CORS_ORIGIN", origin.clone()));
        }

        Ok(Self {
            host: get("HOST").unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: parse(&get, "PORT", DEFAULT_PORT)?,
            cookie_secure: flag(&get, "COOKIE_SECURE", false)?,
            cors_origin,
            services: ServiceConfig {
                session_ttl: chrono::Duration::hours(session_ttl_hours),
                require_approval: flag(&get, "REQUIRE_APPROVAL", false)?,
                password_iterations,
                cache: CacheConfig {
                    enabled: flag(&get, "CACHE_ENABLED", true)?,
                    ttl: Duration::from_secs(cache_ttl_secs),
                    ..CacheConfig::default()
                },
            },
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn invalid(key: &'static str, value: String) -> ConfigError {
    ConfigError::Invalid { key, value }
}

fn parse<T, G>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw.trim().parse().map_err(|_| invalid(key, raw)),
        None => Ok(default),
    }
}

fn flag<G>(get: &G, key: &'static str, default: bool) -> Result<bool, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    let Some(raw) = get(key) else {
        return Ok(default);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(invalid(key, raw)),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use serial_test::serial;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ServerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.bind_address(), "127.0.0.1:3000");
        assert!(!config.cookie_secure);
        assert!(config.cors_origin.is_none());
        assert_eq!(config.services.session_ttl, chrono::Duration::hours(168));
        assert_eq!(config.services.password_iterations, 100_000);
        assert!(config.services.cache.enabled);
        assert_eq!(config.services.cache.ttl, Duration::from_secs(60));
    }

    #[test]
    fn test_overrides() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("HOST", "0.0.0.0"),
            ("PORT", "8080"),
            ("SESSION_TTL_HOURS", "12"),
            ("COOKIE_SECURE", "yes"),
            ("REQUIRE_APPROVAL", "1"),
            ("CACHE_ENABLED", "off"),
            ("CACHE_TTL_SECS", "5"),
            ("PASSWORD_ITERATIONS", "1000"),
            ("CORS_ORIGIN", " https://tasks.example.com "),
        ]))
        .unwrap();
        assert_eq!(config.bind_address(), "0.0.0.0:8080");
        assert!(config.cookie_secure);
        assert!(config.services.require_approval);
        assert!(!config.services.cache.enabled);
        assert_eq!(config.services.cache.ttl, Duration::from_secs(5));
        assert_eq!(config.services.session_ttl, chrono::Duration::hours(12));
        assert_eq!(config.services.password_iterations, 1000);
        assert_eq!(
            config.cors_origin.as_deref(),
            Some("https://tasks.example.com")
        );
    }

    #[test]
    fn test_invalid_values() {
        let err = ServerConfig::from_lookup(lookup(&[("PORT", "http")])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::Invalid {
                key: "PORT",
                value: "http".to_string()
            }
        );

        let err = ServerConfig::from_lookup(lookup(&[("COOKIE_SECURE", "maybe")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "COOKIE_SECURE", .. }));

        let err = ServerConfig::from_lookup(lookup(&[("SESSION_TTL_HOURS", "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "SESSION_TTL_HOURS", .. }));

        let err = ServerConfig::from_lookup(lookup(&[("PASSWORD_ITERATIONS", "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "PASSWORD_ITERATIONS", .. }));

        let err = ServerConfig::from_lookup(lookup(&[("CORS_ORIGIN", "http://a\nb")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "CORS_ORIGIN", .. }));
    }

    #[test]
    fn test_blank_values_fall_back_to_defaults() {
        let config = ServerConfig::from_lookup(lookup(&[("PORT", "  "), ("HOST", "")])).unwrap();
        assert_eq!(config.bind_address(), "127.0.0.1:3000");
    }

    #[test]
    #[serial]
    fn test_from_env_reads_process_environment() {
        let original = std::env::var("PORT").ok();
        // SAFETY: serialized with the other environment tests.
        unsafe { std::env::set_var("PORT", "4321") };

        let config = ServerConfig::from_env().unwrap();
        assert_eq!(config.port, 4321);

        // SAFETY: as above.
        unsafe {
            match original {
                Some(value) => std::env::set_var("PORT", value),
                None => std::env::remove_var("PORT"),
            }
        }
    }
}
