//! Application state shared across all handlers.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use crate::access::{AuthorizationResolver, PathMatcher};
use crate::config::Config;
use crate::db;
use crate::menu::MenuAggregator;
use crate::store::{PgUserStore, UserStore};

/// Shared application state.
///
/// Wrapped in Arc internally so Clone is cheap.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// Persistence for users, roles, menus and grants.
    store: Arc<dyn UserStore>,

    /// Shared so public-path checks reuse compiled segments.
    matcher: PathMatcher,

    resolver: AuthorizationResolver,

    menus: MenuAggregator,

    /// Patterns served without authorization.
    public_paths: Vec<String>,

    /// Validity given to accounts created without one.
    default_valid_days: i64,
}

impl AppState {
    /// Connect to PostgreSQL, apply migrations and build the state.
    pub async fn new(config: &Config) -> Result<Self> {
        let pool = db::create_pool(config)
            .await
            .context("failed to create database pool")?;

        db::run_migrations(&pool)
            .await
            .context("failed to run migrations")?;

        info!(
            max_connections = config.database_max_connections,
            "database ready"
        );

        Ok(Self::with_store(Arc::new(PgUserStore::new(pool)), config))
    }

    /// Build the state around an existing store.
    pub fn with_store(store: Arc<dyn UserStore>, config: &Config) -> Self {
        let matcher = PathMatcher::new();
        let resolver =
            AuthorizationResolver::new(store.clone(), matcher.clone(), config.rule_cache_ttl);
        let menus = MenuAggregator::new(store.clone());

        Self {
            inner: Arc::new(AppStateInner {
                store,
                matcher,
                resolver,
                menus,
                public_paths: config.public_paths.clone(),
                default_valid_days: config.default_valid_days,
            }),
        }
    }

    /// Get the user store.
    pub fn store(&self) -> &Arc<dyn UserStore> {
        &self.inner.store
    }

    /// Get the authorization resolver.
    pub fn resolver(&self) -> &AuthorizationResolver {
        &self.inner.resolver
    }

    /// Get the menu aggregator.
    pub fn menus(&self) -> &MenuAggregator {
        &self.inner.menus
    }

    /// Check if a path bypasses authorization.
    pub fn is_public(&self, path: &str) -> bool {
        self.inner
            .public_paths
            .iter()
            .any(|pattern| self.inner.matcher.matches(pattern, path))
    }

    pub fn default_valid_days(&self) -> i64 {
        self.inner.default_valid_days
    }

    /// Check if the store is reachable.
    pub async fn store_healthy(&self) -> bool {
        self.inner.store.is_healthy().await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::store::MemoryUserStore;

    #[test]
    fn public_paths_use_ant_patterns() {
        let config = Config {
            public_paths: vec!["/login".to_string(), "/static/**".to_string()],
            ..Config::default()
        };
        let state = AppState::with_store(Arc::new(MemoryUserStore::new()), &config);

        assert!(state.is_public("/login"));
        assert!(state.is_public("/static/css/site.css"));
        assert!(!state.is_public("/login/extra"));
        assert!(!state.is_public("/admin/users"));
    }
}
