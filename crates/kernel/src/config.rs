//! Configuration loaded from environment variables.

use std::env;
use std::time::Duration;

use anyhow::{Context, Result};

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server port (default: 3000).
    pub port: u16,

    /// PostgreSQL connection URL.
    pub database_url: String,

    /// Maximum database connections in pool (default: 10).
    pub database_max_connections: u32,

    /// Redis connection URL for sessions.
    pub redis_url: String,

    /// CORS allowed origins (comma-separated, default: "*").
    pub cors_allowed_origins: Vec<String>,

    /// Cookie SameSite policy: "strict", "lax", or "none" (default: "strict").
    pub cookie_same_site: String,

    /// Ant patterns served without authorization (default: /login,/health).
    pub public_paths: Vec<String>,

    /// How long the path rule set is cached; zero reads it on every request.
    pub rule_cache_ttl: Duration,

    /// Account validity in days when a new user has none (default: 7).
    pub default_valid_days: i64,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let port = env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .context("PORT must be a valid u16")?;

        let database_url =
            env::var("DATABASE_URL").context("DATABASE_URL environment variable is required")?;

        let database_max_connections = env::var("DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .context("DATABASE_MAX_CONNECTIONS must be a valid u32")?;

        let redis_url =
            env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());

        let cors_allowed_origins = env::var("CORS_ALLOWED_ORIGINS")
            .map(|v| split_list(&v))
            .unwrap_or_else(|_| vec!["*".to_string()]);

        let cookie_same_site = env::var("COOKIE_SAME_SITE")
            .unwrap_or_else(|_| "strict".to_string())
            .to_lowercase();

        let public_paths = env::var("PUBLIC_PATHS")
            .map(|v| split_list(&v))
            .unwrap_or_else(|_| default_public_paths());

        let rule_cache_secs: u64 = env::var("RULE_CACHE_TTL_SECS")
            .unwrap_or_else(|_| "0".to_string())
            .parse()
            .context("RULE_CACHE_TTL_SECS must be a valid u64")?;

        let default_valid_days = env::var("DEFAULT_VALID_DAYS")
            .unwrap_or_else(|_| "7".to_string())
            .parse()
            .context("DEFAULT_VALID_DAYS must be a valid i64")?;

        Ok(Self {
            port,
            database_url,
            database_max_connections,
            redis_url,
            cors_allowed_origins,
            cookie_same_site,
            public_paths,
            rule_cache_ttl: Duration::from_secs(rule_cache_secs),
            default_valid_days,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            database_url: String::new(),
            database_max_connections: 10,
            redis_url: "redis://127.0.0.1:6379".to_string(),
            cors_allowed_origins: vec!["*".to_string()],
            cookie_same_site: "strict".to_string(),
            public_paths: default_public_paths(),
            rule_cache_ttl: Duration::ZERO,
            default_valid_days: 7,
        }
    }
}

fn default_public_paths() -> Vec<String> {
    vec!["/login".to_string(), "/health".to_string()]
}

/// Split a comma-separated list, dropping blank entries.
fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn split_list_trims_and_drops_blanks() {
        assert_eq!(
            split_list(" /login, /health/** ,,"),
            vec!["/login".to_string(), "/health/**".to_string()]
        );
        assert!(split_list("").is_empty());
    }

    #[test]
    fn defaults_disable_rule_cache() {
        let config = Config::default();
        assert!(config.rule_cache_ttl.is_zero());
        assert_eq!(config.default_valid_days, 7);
        assert_eq!(config.public_paths, vec!["/login", "/health"]);
    }
}
