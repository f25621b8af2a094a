//! Cache registry.
//!
//! A [`CacheRegistry`] turns a [`RegistryConfig`] into live adapters on
//! demand. Every configured profile is validated when the registry is
//! built, so a malformed namespace or GC interval fails fast instead of
//! on first use; the adapters themselves are constructed lazily and
//! memoized, and each cache's name doubles as its namespace. Memory
//! adapters share one store per adapter entry, mirroring how every
//! Redis cache on one adapter entry shares that server.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use satchel_core::{
    AdapterCapabilities, AdapterKind, CapabilityError, ConfigError, Keyspace, RegistryConfig,
    SatchelResult, StoreError,
};
use satchel_redis::RedisStore;
use satchel_store::MemoryStore;

use crate::adapter::{CacheAdapter, TaggedCache};
use crate::gc::{GcPolicy, OptimizeReport};

// =============================================================================
// Cache Registry
// =============================================================================

pub struct CacheRegistry {
    config: RegistryConfig,
    memory_stores: HashMap<String, MemoryStore>,
    caches: RwLock<HashMap<String, Arc<dyn CacheAdapter>>>,
}

impl CacheRegistry {
    /// Build a registry, validating every configured cache profile.
    pub fn new(config: RegistryConfig) -> SatchelResult<Self> {
        for (name, profile) in &config.caches {
            if !config.adapters.contains_key(&profile.adapter) {
                return Err(ConfigError::AdapterNotConfigured {
                    name: profile.adapter.clone(),
                }
                .into());
            }
            let options = profile.to_options(name);
            Keyspace::with_separator(
                options.namespace.as_str(),
                options.namespace_separator.as_str(),
            )?;
            GcPolicy::from_options(&options)?;
        }

        let memory_stores = config
            .adapters
            .iter()
            .filter(|(_, spec)| spec.kind == AdapterKind::Memory)
            .map(|(name, _)| (name.clone(), MemoryStore::new()))
            .collect();

        Ok(Self {
            config,
            memory_stores,
            caches: RwLock::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Configured and registered cache names, sorted.
    pub fn cache_names(&self) -> SatchelResult<Vec<String>> {
        let caches = self.caches.read().map_err(|_| StoreError::LockPoisoned)?;
        let mut names: Vec<String> = self.config.caches.keys().cloned().collect();
        for name in caches.keys() {
            if !self.config.caches.contains_key(name) {
                names.push(name.clone());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Adapter for `name`, building and memoizing it on first use.
    pub fn get_cache(&self, name: &str) -> SatchelResult<Arc<dyn CacheAdapter>> {
        {
            let caches = self.caches.read().map_err(|_| StoreError::LockPoisoned)?;
            if let Some(cache) = caches.get(name) {
                return Ok(Arc::clone(cache));
            }
        }
        let adapter = self.build_adapter(name)?;
        let mut caches = self.caches.write().map_err(|_| StoreError::LockPoisoned)?;
        Ok(Arc::clone(caches.entry(name.to_string()).or_insert(adapter)))
    }

    /// Attach an externally built adapter under `name`, replacing any
    /// previous entry.
    pub fn register_cache(
        &self,
        name: impl Into<String>,
        adapter: Arc<dyn CacheAdapter>,
    ) -> SatchelResult<()> {
        let mut caches = self.caches.write().map_err(|_| StoreError::LockPoisoned)?;
        caches.insert(name.into(), adapter);
        Ok(())
    }

    /// Flush one cache. Errors when the adapter does not support it.
    pub async fn drop_cache(&self, name: &str) -> SatchelResult<u64> {
        let cache = self.get_cache(name)?;
        require_capability(name, &cache, AdapterCapabilities::DELETE_ALL, "delete_all")?;
        cache.delete_all().await
    }

    /// Flush every cache that supports it, returning the total number
    /// of items removed. Adapters without the capability are skipped.
    pub async fn drop_all_caches(&self) -> SatchelResult<u64> {
        let mut total = 0;
        for name in self.cache_names()? {
            let cache = self.get_cache(&name)?;
            if !cache.capabilities().contains(AdapterCapabilities::DELETE_ALL) {
                tracing::debug!(cache = %name, "Adapter cannot flush, skipping");
                continue;
            }
            total += cache.delete_all().await?;
        }
        Ok(total)
    }

    /// Reconcile one cache now. Errors when the adapter does not
    /// support it.
    pub async fn optimize_cache(&self, name: &str) -> SatchelResult<OptimizeReport> {
        let cache = self.get_cache(name)?;
        require_capability(name, &cache, AdapterCapabilities::OPTIMIZE, "optimize")?;
        cache.optimize().await
    }

    /// Reconcile every cache that supports it, returning one report per
    /// cache visited. Adapters without the capability are skipped.
    pub async fn optimize_all_caches(&self) -> SatchelResult<Vec<(String, OptimizeReport)>> {
        let mut reports = Vec::new();
        for name in self.cache_names()? {
            let cache = self.get_cache(&name)?;
            if !cache.capabilities().contains(AdapterCapabilities::OPTIMIZE) {
                tracing::debug!(cache = %name, "Adapter cannot optimize, skipping");
                continue;
            }
            reports.push((name, cache.optimize().await?));
        }
        Ok(reports)
    }

    fn build_adapter(&self, name: &str) -> SatchelResult<Arc<dyn CacheAdapter>> {
        let profile = self
            .config
            .caches
            .get(name)
            .ok_or_else(|| ConfigError::CacheNotConfigured {
                name: name.to_string(),
            })?;
        let spec = self.config.adapters.get(&profile.adapter).ok_or_else(|| {
            ConfigError::AdapterNotConfigured {
                name: profile.adapter.clone(),
            }
        })?;
        let options = profile.to_options(name);

        let adapter: Arc<dyn CacheAdapter> = match spec.kind {
            AdapterKind::Memory => match self.memory_stores.get(&profile.adapter) {
                Some(store) => Arc::new(TaggedCache::new(store.clone(), options)?),
                None => {
                    return Err(ConfigError::AdapterNotConfigured {
                        name: profile.adapter.clone(),
                    }
                    .into())
                }
            },
            AdapterKind::Redis => {
                Arc::new(TaggedCache::new(RedisStore::new(spec.connection.clone()), options)?)
            }
        };
        Ok(adapter)
    }
}

fn require_capability(
    name: &str,
    cache: &Arc<dyn CacheAdapter>,
    needed: AdapterCapabilities,
    operation: &str,
) -> SatchelResult<()> {
    if cache.capabilities().contains(needed) {
        return Ok(());
    }
    Err(CapabilityError::Unsupported {
        adapter: name.to_string(),
        operation: operation.to_string(),
    }
    .into())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{SetOptions, TagMatch};
    use async_trait::async_trait;
    use satchel_core::SatchelError;
    use serde_json::json;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn config(value: serde_json::Value) -> RegistryConfig {
        serde_json::from_value(value).unwrap()
    }

    fn memory_registry() -> CacheRegistry {
        CacheRegistry::new(config(json!({
            "adapters": {
                "main": { "kind": "memory" }
            },
            "caches": {
                "sessions": { "adapter": "main", "ttl": 30 },
                "profiles": { "adapter": "main" }
            }
        })))
        .unwrap()
    }

    struct StubAdapter {
        caps: AdapterCapabilities,
        flushes: AtomicU64,
    }

    impl StubAdapter {
        fn new(caps: AdapterCapabilities) -> Self {
            Self {
                caps,
                flushes: AtomicU64::new(0),
            }
        }
    }

    #[async_trait]
    impl CacheAdapter for StubAdapter {
        fn namespace(&self) -> &str {
            "stub"
        }

        fn capabilities(&self) -> AdapterCapabilities {
            self.caps
        }

        async fn set(&self, _: &str, _: &[u8], _: &SetOptions) -> SatchelResult<()> {
            Ok(())
        }

        async fn add(&self, _: &str, _: &[u8], _: &SetOptions) -> SatchelResult<bool> {
            Ok(false)
        }

        async fn get(&self, _: &str) -> SatchelResult<Option<Vec<u8>>> {
            Ok(None)
        }

        async fn exists(&self, _: &str) -> SatchelResult<bool> {
            Ok(false)
        }

        async fn delete(&self, _: &str) -> SatchelResult<bool> {
            Ok(false)
        }

        async fn delete_by_tags(&self, _: &[String], _: TagMatch) -> SatchelResult<u64> {
            Ok(0)
        }

        async fn delete_all(&self) -> SatchelResult<u64> {
            self.flushes.fetch_add(1, Ordering::SeqCst);
            Ok(7)
        }

        async fn optimize(&self) -> SatchelResult<OptimizeReport> {
            Ok(OptimizeReport::default())
        }

        async fn collect_garbage(&self) -> SatchelResult<Option<OptimizeReport>> {
            Ok(None)
        }
    }

    #[test]
    fn test_new_rejects_profiles_with_unknown_adapters() {
        let result = CacheRegistry::new(config(json!({
            "adapters": {},
            "caches": {
                "sessions": { "adapter": "missing" }
            }
        })));
        assert!(matches!(
            result,
            Err(SatchelError::Config(ConfigError::AdapterNotConfigured { .. }))
        ));
    }

    #[test]
    fn test_new_rejects_malformed_gc_intervals() {
        let result = CacheRegistry::new(config(json!({
            "adapters": {
                "main": { "kind": "memory" }
            },
            "caches": {
                "sessions": { "adapter": "main", "optimize_after": "whenever" }
            }
        })));
        assert!(matches!(result, Err(SatchelError::Time(_))));
    }

    #[test]
    fn test_new_rejects_empty_separators() {
        let result = CacheRegistry::new(config(json!({
            "adapters": {
                "main": { "kind": "memory" }
            },
            "caches": {
                "sessions": { "adapter": "main", "namespace_separator": "" }
            }
        })));
        assert!(matches!(result, Err(SatchelError::Config(_))));
    }

    #[test]
    fn test_get_cache_memoizes_adapters() {
        let registry = memory_registry();
        let first = registry.get_cache("sessions").unwrap();
        let second = registry.get_cache("sessions").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_get_cache_rejects_unknown_names() {
        let registry = memory_registry();
        let result = registry.get_cache("nope");
        assert!(matches!(
            result,
            Err(SatchelError::Config(ConfigError::CacheNotConfigured { .. }))
        ));
    }

    #[test]
    fn test_cache_name_becomes_the_namespace() {
        let registry = memory_registry();
        assert_eq!(registry.get_cache("sessions").unwrap().namespace(), "sessions");
        assert_eq!(registry.get_cache("profiles").unwrap().namespace(), "profiles");
    }

    #[test]
    fn test_cache_names_are_sorted_and_include_registered() {
        let registry = memory_registry();
        registry
            .register_cache("zz-extra", Arc::new(StubAdapter::new(AdapterCapabilities::empty())))
            .unwrap();
        assert_eq!(
            registry.cache_names().unwrap(),
            vec![
                "profiles".to_string(),
                "sessions".to_string(),
                "zz-extra".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn test_drop_cache_flushes_one_namespace() {
        let registry = memory_registry();
        let sessions = registry.get_cache("sessions").unwrap();
        let profiles = registry.get_cache("profiles").unwrap();
        sessions.set("k", b"v", &SetOptions::new()).await.unwrap();
        profiles.set("k", b"v", &SetOptions::new()).await.unwrap();

        assert_eq!(registry.drop_cache("sessions").await.unwrap(), 1);
        assert_eq!(sessions.get("k").await.unwrap(), None);
        assert_eq!(profiles.get("k").await.unwrap(), Some(b"v".to_vec()));
    }

    #[tokio::test]
    async fn test_drop_cache_requires_the_capability() {
        let registry = memory_registry();
        registry
            .register_cache("stub", Arc::new(StubAdapter::new(AdapterCapabilities::empty())))
            .unwrap();

        let result = registry.drop_cache("stub").await;
        assert!(matches!(
            result,
            Err(SatchelError::Capability(CapabilityError::Unsupported { .. }))
        ));
    }

    #[tokio::test]
    async fn test_drop_all_skips_incapable_adapters() {
        let registry = memory_registry();
        let sessions = registry.get_cache("sessions").unwrap();
        sessions.set("k", b"v", &SetOptions::new()).await.unwrap();

        let incapable = Arc::new(StubAdapter::new(AdapterCapabilities::OPTIMIZE));
        let capable = Arc::new(StubAdapter::new(AdapterCapabilities::DELETE_ALL));
        registry.register_cache("incapable", incapable.clone()).unwrap();
        registry.register_cache("capable", capable.clone()).unwrap();

        let total = registry.drop_all_caches().await.unwrap();
        assert_eq!(total, 8);
        assert_eq!(incapable.flushes.load(Ordering::SeqCst), 0);
        assert_eq!(capable.flushes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_optimize_cache_requires_the_capability() {
        let registry = memory_registry();
        registry
            .register_cache("stub", Arc::new(StubAdapter::new(AdapterCapabilities::DELETE_ALL)))
            .unwrap();

        assert!(registry.optimize_cache("sessions").await.is_ok());
        let result = registry.optimize_cache("stub").await;
        assert!(matches!(
            result,
            Err(SatchelError::Capability(CapabilityError::Unsupported { .. }))
        ));
    }

    #[tokio::test]
    async fn test_optimize_all_reports_per_cache() {
        let registry = memory_registry();
        registry
            .register_cache("stub", Arc::new(StubAdapter::new(AdapterCapabilities::empty())))
            .unwrap();

        let reports = registry.optimize_all_caches().await.unwrap();
        let names: Vec<&str> = reports.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, vec!["profiles", "sessions"]);
        assert!(reports.iter().all(|(_, report)| report.is_clean()));
    }
}
