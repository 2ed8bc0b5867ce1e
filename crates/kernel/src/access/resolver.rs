//! Dynamic resolution of the roles a request path requires.
//!
//! Rules are (pattern, role) pairs read from the user store. Every rule whose
//! pattern matches the path contributes its role. A path no rule matches
//! requires only that the caller is logged in.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use moka::future::Cache;
use tracing::debug;

use super::PathMatcher;
use crate::store::{PathRule, UserStore};

/// Required-role token meaning "any authenticated principal".
pub const ROLE_LOGIN: &str = "ROLE_LOGIN";

/// Source of per-path access requirements consulted before each request.
#[async_trait]
pub trait SecurityMetadataSource: Send + Sync {
    /// Roles any one of which grants access to `path`.
    async fn required_roles(&self, path: &str) -> Result<HashSet<String>>;

    /// Every requirement the source knows about, or `None` when listing is
    /// unsupported.
    fn all_requirements(&self) -> Option<HashSet<String>> {
        None
    }
}

/// Resolves required roles from the rules held in the user store.
#[derive(Clone)]
pub struct AuthorizationResolver {
    inner: Arc<ResolverInner>,
}

struct ResolverInner {
    store: Arc<dyn UserStore>,
    matcher: PathMatcher,
    /// Rule set cache keyed by generation; `None` reads the store on every
    /// call.
    rules: Option<Cache<u64, Arc<Vec<PathRule>>>>,
    /// Bumped on every invalidation. A load started under an older
    /// generation can only populate a key no later lookup uses.
    generation: AtomicU64,
}

impl AuthorizationResolver {
    /// Create a resolver. A zero `cache_ttl` disables rule caching.
    pub fn new(store: Arc<dyn UserStore>, matcher: PathMatcher, cache_ttl: Duration) -> Self {
        let rules = (!cache_ttl.is_zero()).then(|| {
            Cache::builder()
                .max_capacity(2)
                .time_to_live(cache_ttl)
                .build()
        });

        Self {
            inner: Arc::new(ResolverInner {
                store,
                matcher,
                rules,
                generation: AtomicU64::new(0),
            }),
        }
    }

    /// Roles required to access `path`.
    ///
    /// Returns `{ROLE_LOGIN}` when no rule matches. Store failures propagate.
    pub async fn resolve_required_roles(&self, path: &str) -> Result<HashSet<String>> {
        let rules = self.load_rules().await?;

        let mut roles: HashSet<String> = rules
            .iter()
            .filter(|rule| self.inner.matcher.matches(&rule.pattern, path))
            .map(|rule| rule.required_role.clone())
            .collect();

        if roles.is_empty() {
            roles.insert(ROLE_LOGIN.to_string());
        }

        Ok(roles)
    }

    /// Drop the cached rule set.
    ///
    /// Call after any write to roles, menus or their grants.
    pub fn invalidate_rules(&self) {
        if let Some(cache) = &self.inner.rules {
            let generation = self.inner.generation.fetch_add(1, Ordering::AcqRel) + 1;
            cache.invalidate_all();
            debug!(generation, "path rule cache invalidated");
        }
    }

    async fn load_rules(&self) -> Result<Arc<Vec<PathRule>>> {
        let Some(cache) = &self.inner.rules else {
            return Ok(Arc::new(self.inner.store.list_all_path_rules().await?));
        };

        let generation = self.inner.generation.load(Ordering::Acquire);
        let store = Arc::clone(&self.inner.store);
        cache
            .try_get_with(generation, async move {
                let rules = store.list_all_path_rules().await?;
                debug!(count = rules.len(), generation, "path rules loaded");
                Ok::<_, anyhow::Error>(Arc::new(rules))
            })
            .await
            .map_err(|e| anyhow!("{e:#}"))
    }
}

#[async_trait]
impl SecurityMetadataSource for AuthorizationResolver {
    async fn required_roles(&self, path: &str) -> Result<HashSet<String>> {
        self.resolve_required_roles(path).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::store::MemoryUserStore;

    fn set(items: &[&str]) -> HashSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    /// Store holding one grant per (pattern, role) pair.
    fn store_with_rules(rules: &[(&str, &str)]) -> Arc<MemoryUserStore> {
        let store = MemoryUserStore::new();
        for (pattern, role) in rules {
            let menu = store.seed_menu(pattern, pattern, None);
            let role = store.seed_role(role);
            store.seed_grant(menu, role);
        }
        Arc::new(store)
    }

    fn resolver(store: &Arc<MemoryUserStore>, ttl: Duration) -> AuthorizationResolver {
        AuthorizationResolver::new(store.clone(), PathMatcher::new(), ttl)
    }

    #[tokio::test]
    async fn admin_and_public_scenario() {
        let store = store_with_rules(&[("/admin/**", "ROLE_ADMIN"), ("/public/*", "ROLE_LOGIN")]);
        let resolver = resolver(&store, Duration::ZERO);

        assert_eq!(
            resolver.resolve_required_roles("/admin/users").await.unwrap(),
            set(&["ROLE_ADMIN"])
        );
        assert_eq!(
            resolver.resolve_required_roles("/public/info").await.unwrap(),
            set(&["ROLE_LOGIN"])
        );
        assert_eq!(
            resolver.resolve_required_roles("/other").await.unwrap(),
            set(&[ROLE_LOGIN])
        );
    }

    #[tokio::test]
    async fn empty_rule_set_requires_login_only() {
        let store = Arc::new(MemoryUserStore::new());
        let resolver = resolver(&store, Duration::ZERO);
        assert_eq!(
            resolver.resolve_required_roles("/anything").await.unwrap(),
            set(&[ROLE_LOGIN])
        );
    }

    #[tokio::test]
    async fn collects_every_matching_rule() {
        let store = store_with_rules(&[
            ("/**", "ROLE_SUPER"),
            ("/admin/**", "ROLE_ADMIN"),
            ("/admin/users/{id}", "ROLE_USER_ADMIN"),
            ("/admin/users/{id}", "ROLE_ADMIN"),
            ("/report/*", "ROLE_REPORT"),
        ]);
        let resolver = resolver(&store, Duration::ZERO);

        assert_eq!(
            resolver.resolve_required_roles("/admin/users/42").await.unwrap(),
            set(&["ROLE_SUPER", "ROLE_ADMIN", "ROLE_USER_ADMIN"])
        );
        assert_eq!(
            resolver.resolve_required_roles("/report/a/b").await.unwrap(),
            set(&["ROLE_SUPER"])
        );
    }

    #[tokio::test]
    async fn double_star_matches_every_path() {
        let store = store_with_rules(&[("/**", "ROLE_SUPER")]);
        let resolver = resolver(&store, Duration::ZERO);
        for path in ["/", "/a", "/a/b/c", "/admin/users/1/edit"] {
            assert_eq!(
                resolver.resolve_required_roles(path).await.unwrap(),
                set(&["ROLE_SUPER"]),
                "path {path}"
            );
        }
    }

    #[tokio::test]
    async fn malformed_pattern_never_matches() {
        let store = store_with_rules(&[("/broken/{id", "ROLE_X")]);
        let resolver = resolver(&store, Duration::ZERO);
        assert_eq!(
            resolver.resolve_required_roles("/broken/1").await.unwrap(),
            set(&[ROLE_LOGIN])
        );
    }

    #[tokio::test]
    async fn resolution_is_idempotent() {
        let store = store_with_rules(&[("/admin/**", "ROLE_ADMIN"), ("/admin/*", "ROLE_OPS")]);
        let resolver = resolver(&store, Duration::ZERO);
        let first = resolver.resolve_required_roles("/admin/x").await.unwrap();
        let second = resolver.resolve_required_roles("/admin/x").await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn uncached_resolver_sees_new_rules_immediately() {
        let store = store_with_rules(&[]);
        let resolver = resolver(&store, Duration::ZERO);
        assert_eq!(
            resolver.resolve_required_roles("/ops").await.unwrap(),
            set(&[ROLE_LOGIN])
        );

        let menu = store.seed_menu("/ops", "Ops", None);
        let role = store.seed_role("ROLE_OPS");
        store.seed_grant(menu, role);

        assert_eq!(
            resolver.resolve_required_roles("/ops").await.unwrap(),
            set(&["ROLE_OPS"])
        );
        assert_eq!(store.rule_reads(), 2);
    }

    #[tokio::test]
    async fn cached_resolver_reloads_after_invalidation() {
        let store = store_with_rules(&[]);
        let resolver = resolver(&store, Duration::from_secs(300));

        resolver.resolve_required_roles("/ops").await.unwrap();
        resolver.resolve_required_roles("/ops").await.unwrap();
        assert_eq!(store.rule_reads(), 1);

        let menu = store.seed_menu("/ops", "Ops", None);
        let role = store.seed_role("ROLE_OPS");
        store.seed_grant(menu, role);
        resolver.invalidate_rules();

        assert_eq!(
            resolver.resolve_required_roles("/ops").await.unwrap(),
            set(&["ROLE_OPS"])
        );
        assert_eq!(store.rule_reads(), 2);
    }

    #[tokio::test]
    async fn invalidation_during_a_load_is_not_lost() {
        let store = store_with_rules(&[]);
        let resolver = resolver(&store, Duration::from_secs(300));

        // The first load snapshots the empty rule set, then stalls.
        let release = store.hold_next_rule_read();
        let stale = tokio::spawn({
            let resolver = resolver.clone();
            async move { resolver.resolve_required_roles("/ops").await }
        });
        store.rule_read_parked().await;

        let menu = store.seed_menu("/ops", "Ops", None);
        let role = store.seed_role("ROLE_OPS");
        store.seed_grant(menu, role);
        resolver.invalidate_rules();

        release.send(()).unwrap();
        assert_eq!(stale.await.unwrap().unwrap(), set(&[ROLE_LOGIN]));

        assert_eq!(
            resolver.resolve_required_roles("/ops").await.unwrap(),
            set(&["ROLE_OPS"])
        );
        assert_eq!(store.rule_reads(), 2);
    }

    #[tokio::test]
    async fn store_failure_propagates() {
        let store = store_with_rules(&[("/admin/**", "ROLE_ADMIN")]);
        store.set_unavailable(true);

        for ttl in [Duration::ZERO, Duration::from_secs(300)] {
            let err = resolver(&store, ttl)
                .resolve_required_roles("/admin/users")
                .await
                .unwrap_err();
            assert!(err.to_string().contains("unavailable"), "{err}");
        }
    }

    #[tokio::test]
    async fn listing_requirements_is_unsupported() {
        let store = store_with_rules(&[("/admin/**", "ROLE_ADMIN")]);
        let source: &dyn SecurityMetadataSource = &resolver(&store, Duration::ZERO);
        assert!(source.all_requirements().is_none());
        assert_eq!(
            source.required_roles("/admin").await.unwrap(),
            set(&["ROLE_ADMIN"])
        );
    }
}
