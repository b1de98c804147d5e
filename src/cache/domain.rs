use std::future::Future;

use uuid::Uuid;

use crate::cache::keys::{self, FORM_KINDS, KeyKind};
use crate::cache::store::CacheStore;
use crate::error::Result;
use crate::models::form::{DashboardSummary, FormCategory, FormHierarchy};

/// TTL for a tenant's category list, in seconds.
pub const FORM_CATEGORIES_TTL: u64 = 600;
/// TTL for a category hierarchy, in seconds.
pub const FORM_HIERARCHY_TTL: u64 = 600;
/// TTL for dashboards, in seconds.
pub const DASHBOARD_TTL: u64 = 300;

/// Read-through caching for read-heavy domain lookups.
///
/// Every read falls back to the origin `fetch` when the cache misses or is
/// unavailable, so results are correct with the cache gone. Invalidation is
/// best-effort and reports `0` when the cache cannot be reached.
#[derive(Clone)]
pub struct DomainCache {
    cache: CacheStore,
}

impl DomainCache {
    /// Creates a new `DomainCache`.
    pub fn new(cache: CacheStore) -> Self {
        Self { cache }
    }

    pub async fn form_categories<F, Fut>(&self, tenant_id: Uuid, fetch: F) -> Result<Vec<FormCategory>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<FormCategory>>>,
    {
        self.cache
            .get_or_set(&keys::form_categories(tenant_id), FORM_CATEGORIES_TTL, fetch)
            .await
    }

    pub async fn form_hierarchy<F, Fut>(
        &self,
        tenant_id: Uuid,
        category_id: Uuid,
        fetch: F,
    ) -> Result<FormHierarchy>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<FormHierarchy>>,
    {
        let key = keys::form_hierarchy(tenant_id, &category_id.to_string());
        self.cache.get_or_set(&key, FORM_HIERARCHY_TTL, fetch).await
    }

    pub async fn dashboard<F, Fut>(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
        fetch: F,
    ) -> Result<DashboardSummary>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<DashboardSummary>>,
    {
        let key = keys::dashboard(tenant_id, user_id, "summary");
        self.cache.get_or_set(&key, DASHBOARD_TTL, fetch).await
    }

    async fn drop_pattern(&self, pattern: &str) -> u64 {
        match self.cache.delete_pattern(pattern).await {
            Ok(removed) => removed,
            Err(e) => {
                tracing::warn!("⚠️ Cache invalidation skipped for {}: {}", pattern, e);
                0
            }
        }
    }

    /// Drops every cached form category and hierarchy of a tenant.
    pub async fn invalidate_forms(&self, tenant_id: Uuid) -> u64 {
        let mut removed = 0;
        for kind in FORM_KINDS {
            removed += self.drop_pattern(&keys::kind_pattern(kind, tenant_id)).await;
        }
        tracing::info!("🧹 Invalidated {} form cache key(s) for tenant {}", removed, tenant_id);
        removed
    }

    /// Drops every cached dashboard of a tenant.
    pub async fn invalidate_dashboards(&self, tenant_id: Uuid) -> u64 {
        self.drop_pattern(&keys::kind_pattern(KeyKind::Dashboard, tenant_id))
            .await
    }

    /// Drops everything cached for a tenant.
    pub async fn invalidate_tenant(&self, tenant_id: Uuid) -> u64 {
        let removed = self.drop_pattern(&keys::tenant_pattern(tenant_id)).await;
        tracing::info!("🧹 Invalidated {} cache key(s) for tenant {}", removed, tenant_id);
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::memory::MemoryCacheBackend;
    use crate::config::CacheConfig;
    use crate::error::AppError;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn domain() -> DomainCache {
        DomainCache::new(CacheStore::new(
            Arc::new(MemoryCacheBackend::new()),
            CacheConfig::default(),
        ))
    }

    fn category(tenant_id: Uuid, name: &str) -> FormCategory {
        FormCategory {
            id: Uuid::new_v4(),
            tenant_id,
            name: name.to_string(),
            description: None,
            sort_order: 0,
        }
    }

    #[tokio::test]
    async fn categories_are_served_from_cache_until_invalidated() {
        let cache = domain();
        let tenant = Uuid::new_v4();
        let fetches = Arc::new(AtomicUsize::new(0));

        let load = |fetches: Arc<AtomicUsize>| async move {
            fetches.fetch_add(1, Ordering::SeqCst);
            Ok(vec![category(tenant, "Intake")])
        };

        let first = cache
            .form_categories(tenant, || load(fetches.clone()))
            .await
            .unwrap();
        let second = cache
            .form_categories(tenant, || load(fetches.clone()))
            .await
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(fetches.load(Ordering::SeqCst), 1);

        assert_eq!(cache.invalidate_forms(tenant).await, 1);
        cache
            .form_categories(tenant, || load(fetches.clone()))
            .await
            .unwrap();
        assert_eq!(fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn invalidation_is_tenant_scoped() {
        let cache = domain();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        for tenant in [a, b] {
            cache
                .form_categories(tenant, || async move { Ok(vec![category(tenant, "Intake")]) })
                .await
                .unwrap();
        }

        assert_eq!(cache.invalidate_tenant(a).await, 1);
        assert!(cache.cache.exists(&keys::form_categories(b)).await);
        assert!(!cache.cache.exists(&keys::form_categories(a)).await);
    }

    #[tokio::test]
    async fn missing_hierarchy_is_not_cached() {
        let cache = domain();
        let tenant = Uuid::new_v4();
        let category_id = Uuid::new_v4();

        let result = cache
            .form_hierarchy(tenant, category_id, || async { Err(AppError::NotFound) })
            .await;
        assert!(matches!(result, Err(AppError::NotFound)));
        assert!(
            !cache
                .cache
                .exists(&keys::form_hierarchy(tenant, &category_id.to_string()))
                .await
        );
    }
}
