//! Provider instance cache with per-provider single-flight construction.
//!
//! Each provider id owns a slot guarded by an async mutex, held across
//! resolution and construction so concurrent cold callers share one build.
//! Entries are stamped with the provider's configuration generation, which
//! the store bumps on every mutation; a generation or fingerprint mismatch
//! forces a rebuild. An LRU over provider ids bounds the number of live
//! instances and an optional TTL expires old ones.

use lru::LruCache;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::Mutex as TokioMutex;

use super::{BuildContext, ProviderFactory, ProviderInstance};
use crate::catalog::ProviderCatalog;
use crate::config::CacheOptions;
use crate::error::{HubError, Result};
use crate::resolver::resolve;
use crate::store::{ConfigChange, ConfigObserver, ConfigStore};

struct CacheEntry {
    instance: ProviderInstance,
    generation: u64,
}

impl CacheEntry {
    fn is_expired(&self, ttl: Option<Duration>) -> bool {
        ttl.is_some_and(|ttl| self.instance.age() > ttl)
    }
}

type Slot = Arc<TokioMutex<Option<CacheEntry>>>;

pub struct InstanceCache {
    catalog: Arc<ProviderCatalog>,
    store: Arc<ConfigStore>,
    factories: HashMap<String, Arc<dyn ProviderFactory>>,
    http_client: reqwest::Client,
    client_ttl: Option<Duration>,
    slots: Mutex<HashMap<String, Slot>>,
    /// Recency of live entries; an id missing here has no usable entry.
    recency: Mutex<LruCache<String, ()>>,
    generations: Mutex<HashMap<String, u64>>,
}

impl InstanceCache {
    pub(crate) fn new(
        catalog: Arc<ProviderCatalog>,
        store: Arc<ConfigStore>,
        factories: HashMap<String, Arc<dyn ProviderFactory>>,
        http_client: reqwest::Client,
        options: &CacheOptions,
    ) -> Arc<Self> {
        let capacity = NonZeroUsize::new(options.max_entries).unwrap_or(NonZeroUsize::MIN);
        let cache = Arc::new(Self {
            catalog,
            store: store.clone(),
            factories,
            http_client,
            client_ttl: options.client_ttl,
            slots: Mutex::new(HashMap::new()),
            recency: Mutex::new(LruCache::new(capacity)),
            generations: Mutex::new(HashMap::new()),
        });
        let observer: Arc<dyn ConfigObserver> = cache.clone();
        store.add_observer(Arc::downgrade(&observer));
        cache
    }

    /// Return the live instance for `provider_id`, building it if needed.
    pub async fn get_instance(&self, provider_id: &str) -> Result<ProviderInstance> {
        let descriptor = self.catalog.get_descriptor(provider_id)?;
        let id = descriptor.id.as_str();
        let slot = self.slot(id);
        let mut entry = slot.lock().await;

        // Generation first: a mutation landing after this read is caught next call.
        let generation = self.generation(id);
        let config = resolve(&descriptor, self.store.get(id).as_ref());

        if !config.is_complete() {
            if let Some(stale) = entry.take() {
                self.forget(id);
                release(stale, "unconfigured");
            }
            return Err(HubError::NotConfigured {
                provider_id: id.to_string(),
                missing: config.unset().to_vec(),
            });
        }
        let fingerprint = config.fingerprint();

        if let Some(cached) = entry.as_ref()
            && cached.generation == generation
            && cached.instance.fingerprint() == fingerprint
            && !cached.is_expired(self.client_ttl)
            && self.touch(id)
        {
            tracing::debug!(provider = %id, instance = %cached.instance.id(), "Instance cache hit");
            return Ok(cached.instance.clone());
        }

        if let Some(stale) = entry.take() {
            self.forget(id);
            release(stale, "stale");
        }

        let factory = self
            .factories
            .get(id)
            .ok_or_else(|| HubError::FactoryMissing(id.to_string()))?;
        let ctx = BuildContext {
            provider_id: id.to_string(),
            http_client: self.http_client.clone(),
        };

        tracing::debug!(provider = %id, fingerprint = %config.fingerprint_hex(), "Building provider instance");
        let client = factory
            .build(&config, &ctx)
            .await
            .map_err(|e| HubError::provider(id, e))?;
        let instance = ProviderInstance::new(client, config);
        tracing::debug!(provider = %id, instance = %instance.id(), "Provider instance ready");

        *entry = Some(CacheEntry {
            instance: instance.clone(),
            generation,
        });
        drop(entry);
        self.track(id);

        Ok(instance)
    }

    /// Drop the cached instance for `provider_id`; the next access rebuilds it.
    /// Returns whether an instance was released.
    pub async fn invalidate(&self, provider_id: &str) -> bool {
        let Some(descriptor) = self.catalog.resolve(provider_id) else {
            return false;
        };
        let id = descriptor.id.clone();
        self.bump_generation(&id);

        let slot = self.slot(&id);
        let taken = slot.lock().await.take();
        self.forget(&id);
        match taken {
            Some(entry) => {
                release(entry, "invalidated");
                true
            }
            None => false,
        }
    }

    pub async fn invalidate_all(&self) {
        let ids: Vec<String> = self.lock_slots().keys().cloned().collect();
        for id in ids {
            self.invalidate(&id).await;
        }
    }

    /// Provider ids with a live cached instance, most recently used first.
    pub fn cached_ids(&self) -> Vec<String> {
        self.lock_recency().iter().map(|(id, _)| id.clone()).collect()
    }

    pub fn has_factory(&self, provider_id: &str) -> bool {
        self.factories
            .contains_key(&self.catalog.canonical_id(provider_id))
    }

    fn slot(&self, id: &str) -> Slot {
        self.lock_slots().entry(id.to_string()).or_default().clone()
    }

    fn generation(&self, id: &str) -> u64 {
        self.generations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .copied()
            .unwrap_or(0)
    }

    fn bump_generation(&self, id: &str) {
        *self
            .generations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(id.to_string())
            .or_insert(0) += 1;
    }

    /// Mark `id` as used; false if it was evicted meanwhile.
    fn touch(&self, id: &str) -> bool {
        self.lock_recency().get(id).is_some()
    }

    fn forget(&self, id: &str) {
        self.lock_recency().pop(id);
    }

    /// Record a fresh entry and evict the least recently used one if over capacity.
    fn track(&self, id: &str) {
        let evicted = self.lock_recency().push(id.to_string(), ());
        if let Some((old, ())) = evicted
            && old != id
        {
            self.evict(&old);
        }
    }

    fn evict(&self, id: &str) {
        let Some(slot) = self.lock_slots().get(id).cloned() else {
            return;
        };
        // A busy slot is already out of the recency list, so its holder
        // rebuilds on the next access instead of reusing the entry.
        match slot.try_lock() {
            Ok(mut entry) => {
                if let Some(stale) = entry.take() {
                    release(stale, "evicted");
                }
            }
            Err(_) => tracing::debug!(provider = %id, "Evicted slot busy, deferring release"),
        }
    }

    fn lock_slots(&self) -> std::sync::MutexGuard<'_, HashMap<String, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_recency(&self) -> std::sync::MutexGuard<'_, LruCache<String, ()>> {
        self.recency.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ConfigObserver for InstanceCache {
    fn on_config_change(&self, change: &ConfigChange) {
        let id = change.provider_id.as_str();
        self.bump_generation(id);

        let Some(slot) = self.lock_slots().get(id).cloned() else {
            return;
        };
        // If a caller holds the slot, the generation bump makes it rebuild later.
        if let Ok(mut entry) = slot.try_lock()
            && let Some(stale) = entry.take()
        {
            self.forget(id);
            release(stale, "configuration changed");
        }
    }
}

fn release(entry: CacheEntry, reason: &'static str) {
    let instance = entry.instance;
    tracing::debug!(
        provider = %instance.provider_id(),
        instance = %instance.id(),
        reason,
        "Releasing provider instance"
    );
    if let Err(e) = instance.client().release() {
        tracing::warn!(
            provider = %instance.provider_id(),
            instance = %instance.id(),
            error = %e,
            "Provider client failed to release resources"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{FieldSpec, ProviderDescriptor};
    use crate::error::BoxError;
    use crate::resolver::EffectiveConfig;
    use crate::store::ConfigPatch;
    use crate::traits::ProviderClient;
    use crate::types::Capability;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct NoopClient {
        releases: Arc<AtomicUsize>,
    }

    impl ProviderClient for NoopClient {
        fn provider_id(&self) -> &str {
            "p"
        }

        fn release(&self) -> std::result::Result<(), BoxError> {
            self.releases.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[derive(Default)]
    struct CountingFactory {
        builds: AtomicUsize,
        releases: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ProviderFactory for CountingFactory {
        async fn build(
            &self,
            _config: &EffectiveConfig,
            _ctx: &BuildContext,
        ) -> std::result::Result<Arc<dyn ProviderClient>, BoxError> {
            self.builds.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(NoopClient {
                releases: self.releases.clone(),
            }))
        }
    }

    async fn fixture(ids: &[&str], options: CacheOptions) -> (Arc<InstanceCache>, Arc<ConfigStore>, Arc<CountingFactory>) {
        let mut catalog = ProviderCatalog::new();
        let factory = Arc::new(CountingFactory::default());
        let mut factories: HashMap<String, Arc<dyn ProviderFactory>> = HashMap::new();
        let store = Arc::new(ConfigStore::in_memory().await.unwrap());
        for id in ids {
            catalog.register(
                ProviderDescriptor::builder(*id)
                    .capability(Capability::Chat)
                    .field(FieldSpec::api_key())
                    .build()
                    .unwrap(),
            );
            factories.insert(id.to_string(), factory.clone());
            store
                .update(id, ConfigPatch::new().api_key("k"))
                .await
                .unwrap();
        }
        let cache = InstanceCache::new(
            Arc::new(catalog),
            store.clone(),
            factories,
            reqwest::Client::new(),
            &options,
        );
        (cache, store, factory)
    }

    #[tokio::test]
    async fn lru_bound_evicts_least_recently_used() {
        let options = CacheOptions {
            max_entries: 2,
            client_ttl: None,
        };
        let (cache, _store, factory) = fixture(&["a", "b", "c"], options).await;

        cache.get_instance("a").await.unwrap();
        cache.get_instance("b").await.unwrap();
        cache.get_instance("a").await.unwrap();
        cache.get_instance("c").await.unwrap();

        let mut ids = cache.cached_ids();
        ids.sort();
        assert_eq!(ids, vec!["a", "c"]);
        assert_eq!(factory.releases.load(Ordering::SeqCst), 1);

        // b is rebuilt on demand.
        cache.get_instance("b").await.unwrap();
        assert_eq!(factory.builds.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn ttl_expires_instances() {
        let options = CacheOptions {
            max_entries: 10,
            client_ttl: Some(Duration::from_millis(20)),
        };
        let (cache, _store, factory) = fixture(&["a"], options).await;

        let first = cache.get_instance("a").await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        let second = cache.get_instance("a").await.unwrap();

        assert!(!ProviderInstance::ptr_eq(&first, &second));
        assert_eq!(factory.builds.load(Ordering::SeqCst), 2);
        assert_eq!(factory.releases.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn store_mutation_releases_eagerly() {
        let (cache, store, factory) = fixture(&["a"], CacheOptions::default()).await;
        cache.get_instance("a").await.unwrap();

        store.update("a", ConfigPatch::new().api_key("k2")).await.unwrap();
        assert_eq!(factory.releases.load(Ordering::SeqCst), 1);
        assert!(cache.cached_ids().is_empty());
    }

    #[tokio::test]
    async fn invalidate_all_clears_every_slot() {
        let (cache, _store, factory) = fixture(&["a", "b"], CacheOptions::default()).await;
        cache.get_instance("a").await.unwrap();
        cache.get_instance("b").await.unwrap();

        cache.invalidate_all().await;
        assert!(cache.cached_ids().is_empty());
        assert_eq!(factory.releases.load(Ordering::SeqCst), 2);
        assert!(!cache.invalidate("a").await);
    }

    #[tokio::test]
    async fn invalidating_unknown_ids_leaves_no_trace() {
        let (cache, _store, _factory) = fixture(&["a"], CacheOptions::default()).await;

        for i in 0..10 {
            assert!(!cache.invalidate(&format!("ghost-{i}")).await);
        }
        assert!(cache.lock_slots().is_empty());
        assert!(
            cache
                .generations
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .keys()
                .all(|id| id == "a")
        );
    }
}
