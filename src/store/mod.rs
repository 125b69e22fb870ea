//! Configuration store.
//!
//! Holds the latest persisted record per provider id in memory, backed by a
//! [`ConfigBackend`]. All mutation goes through [`ConfigStore::update`],
//! [`ConfigStore::reset`] and [`ConfigStore::remove`]; writes for one provider
//! id are serialized and durable before the call returns. Every successful
//! mutation notifies registered observers (the instance cache) synchronously and
//! then broadcasts a [`ConfigChange`] to subscribers.

pub mod backend;
pub mod record;

pub use backend::{ConfigBackend, JsonFileBackend, MemoryBackend};
pub use record::PersistedProviderConfig;

use chrono::Utc;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};
use tokio::sync::{Mutex as TokioMutex, broadcast};

use crate::error::{HubError, Result};
use crate::types::Capability;

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// What a store mutation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Updated,
    Reset(ResetScope),
    Removed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigChange {
    pub provider_id: String,
    pub kind: ChangeKind,
}

/// Receives store mutations before the mutating call returns.
pub(crate) trait ConfigObserver: Send + Sync {
    fn on_config_change(&self, change: &ConfigChange);
}

/// Which overrides [`ConfigStore::reset_with`] removes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResetScope {
    /// Every capability override; credentials and endpoint are kept.
    #[default]
    CapabilitySettings,
    /// Only the overrides of one capability.
    Capability(Capability),
    /// Everything, credentials included. The record is deleted.
    All,
}

/// A partial update in the persisted-record shape.
///
/// Outer `Option` is "touch this field", inner `None` clears it.
#[derive(Clone, Default)]
pub struct ConfigPatch {
    api_key: Option<Option<String>>,
    base_url: Option<Option<String>>,
    capability_settings: BTreeMap<String, BTreeMap<String, Option<Value>>>,
}

impl ConfigPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(Some(key.into()));
        self
    }

    pub fn clear_api_key(mut self) -> Self {
        self.api_key = Some(None);
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(Some(url.into()));
        self
    }

    pub fn clear_base_url(mut self) -> Self {
        self.base_url = Some(None);
        self
    }

    /// Set one capability field.
    pub fn set(mut self, capability: Capability, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.capability_settings
            .entry(capability.as_str().to_string())
            .or_default()
            .insert(key.into(), Some(value.into()));
        self
    }

    /// Drop one capability override so the descriptor default applies again.
    pub fn clear(mut self, capability: Capability, key: impl Into<String>) -> Self {
        self.capability_settings
            .entry(capability.as_str().to_string())
            .or_default()
            .insert(key.into(), None);
        self
    }

    /// Build a patch from a partial record as sent by a settings form:
    /// `{"apiKey": .., "baseUrl": .., "capabilitySettings": {tag: {key: value}}}`.
    /// `null` clears a field; absent fields are left alone.
    pub fn from_json(value: &Value) -> Result<Self> {
        let obj = value.as_object().ok_or_else(|| {
            HubError::InvalidParameter("Configuration patch must be a JSON object".to_string())
        })?;

        let mut patch = Self::new();
        if let Some(v) = obj.get("apiKey") {
            patch.api_key = Some(optional_string("apiKey", v)?);
        }
        if let Some(v) = obj.get("baseUrl") {
            patch.base_url = Some(optional_string("baseUrl", v)?);
        }
        if let Some(caps) = obj.get("capabilitySettings") {
            let caps = caps.as_object().ok_or_else(|| {
                HubError::InvalidParameter("capabilitySettings must be an object".to_string())
            })?;
            for (tag, fields) in caps {
                let fields = fields.as_object().ok_or_else(|| {
                    HubError::InvalidParameter(format!("capabilitySettings.{tag} must be an object"))
                })?;
                let tag = Capability::parse(tag)
                    .map(|c| c.as_str().to_string())
                    .unwrap_or_else(|| tag.clone());
                let entry = patch.capability_settings.entry(tag).or_default();
                for (key, v) in fields {
                    entry.insert(key.clone(), (!v.is_null()).then(|| v.clone()));
                }
            }
        }
        Ok(patch)
    }

    pub fn is_empty(&self) -> bool {
        self.api_key.is_none() && self.base_url.is_none() && self.capability_settings.is_empty()
    }

    fn apply(&self, record: &mut PersistedProviderConfig) {
        if let Some(key) = &self.api_key {
            record.api_key = key.clone();
        }
        if let Some(url) = &self.base_url {
            record.base_url = url.clone();
        }
        for (tag, fields) in &self.capability_settings {
            let settings = record.capability_settings.entry(tag.clone()).or_default();
            for (key, value) in fields {
                match value {
                    Some(v) => {
                        settings.insert(key.clone(), v.clone());
                    }
                    None => {
                        settings.remove(key);
                    }
                }
            }
            if settings.is_empty() {
                record.capability_settings.remove(tag);
            }
        }
    }
}

fn optional_string(field: &str, value: &Value) -> Result<Option<String>> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s.clone())),
        _ => Err(HubError::InvalidParameter(format!("{field} must be a string or null"))),
    }
}

impl fmt::Debug for ConfigPatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigPatch")
            .field(
                "api_key",
                &self.api_key.as_ref().map(|k| k.as_ref().map(|_| "[REDACTED]")),
            )
            .field("base_url", &self.base_url)
            .field("capability_settings", &self.capability_settings)
            .finish()
    }
}

pub struct ConfigStore {
    backend: Arc<dyn ConfigBackend>,
    records: RwLock<HashMap<String, PersistedProviderConfig>>,
    /// Single writer per provider id.
    writers: Mutex<HashMap<String, Arc<TokioMutex<()>>>>,
    observers: RwLock<Vec<Weak<dyn ConfigObserver>>>,
    events: broadcast::Sender<ConfigChange>,
}

impl ConfigStore {
    /// Open a store, loading every record the backend holds.
    pub async fn open(backend: Arc<dyn ConfigBackend>) -> Result<Self> {
        let records: HashMap<_, _> = backend
            .load_all()
            .await?
            .into_iter()
            .map(|r| (r.provider_id.clone(), r))
            .collect();
        tracing::debug!(records = records.len(), "Loaded provider configurations");

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Ok(Self {
            backend,
            records: RwLock::new(records),
            writers: Mutex::new(HashMap::new()),
            observers: RwLock::new(Vec::new()),
            events,
        })
    }

    /// In-memory store, for tests and ephemeral playgrounds.
    pub async fn in_memory() -> Result<Self> {
        Self::open(Arc::new(MemoryBackend::new())).await
    }

    /// Latest completed write for `provider_id`, or `None` if never configured.
    pub fn get(&self, provider_id: &str) -> Option<PersistedProviderConfig> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(provider_id)
            .cloned()
    }

    /// Provider ids with a stored record, sorted.
    pub fn configured_ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self
            .records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConfigChange> {
        self.events.subscribe()
    }

    /// Merge `patch` into the record for `provider_id`, creating it if absent.
    pub async fn update(&self, provider_id: &str, patch: ConfigPatch) -> Result<()> {
        let lock = self.writer(provider_id);
        let _guard = lock.lock().await;

        let mut record = self
            .get(provider_id)
            .unwrap_or_else(|| PersistedProviderConfig::new(provider_id));
        patch.apply(&mut record);
        record.provider_id = provider_id.to_string();
        record.updated_at = Some(Utc::now());

        self.backend.save(provider_id, &record).await?;
        self.records_mut().insert(provider_id.to_string(), record);
        tracing::info!(provider = %provider_id, "Updated provider configuration");

        self.notify(provider_id, ChangeKind::Updated);
        Ok(())
    }

    /// Drop every capability override; credentials and endpoint stay.
    pub async fn reset(&self, provider_id: &str) -> Result<()> {
        self.reset_with(provider_id, ResetScope::CapabilitySettings)
            .await
    }

    pub async fn reset_with(&self, provider_id: &str, scope: ResetScope) -> Result<()> {
        if scope == ResetScope::All {
            return self.remove(provider_id).await;
        }

        let lock = self.writer(provider_id);
        let _guard = lock.lock().await;

        if let Some(mut record) = self.get(provider_id) {
            match scope {
                ResetScope::Capability(cap) => record
                    .capability_settings
                    .retain(|tag, _| Capability::parse(tag) != Some(cap)),
                _ => record.capability_settings.clear(),
            }
            record.updated_at = Some(Utc::now());
            self.backend.save(provider_id, &record).await?;
            self.records_mut().insert(provider_id.to_string(), record);
        }
        tracing::info!(provider = %provider_id, ?scope, "Reset provider configuration");

        self.notify(provider_id, ChangeKind::Reset(scope));
        Ok(())
    }

    /// Forget a provider entirely, credentials included.
    pub async fn remove(&self, provider_id: &str) -> Result<()> {
        let lock = self.writer(provider_id);
        let _guard = lock.lock().await;

        self.backend.remove(provider_id).await?;
        self.records_mut().remove(provider_id);
        tracing::info!(provider = %provider_id, "Removed provider configuration");

        self.notify(provider_id, ChangeKind::Removed);
        Ok(())
    }

    pub(crate) fn add_observer(&self, observer: Weak<dyn ConfigObserver>) {
        self.observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(observer);
    }

    fn writer(&self, provider_id: &str) -> Arc<TokioMutex<()>> {
        self.writers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(provider_id.to_string())
            .or_default()
            .clone()
    }

    fn records_mut(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, PersistedProviderConfig>> {
        self.records.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self, provider_id: &str, kind: ChangeKind) {
        let change = ConfigChange {
            provider_id: provider_id.to_string(),
            kind,
        };

        let mut observers = self.observers.write().unwrap_or_else(PoisonError::into_inner);
        observers.retain(|weak| match weak.upgrade() {
            Some(observer) => {
                observer.on_config_change(&change);
                true
            }
            None => false,
        });
        drop(observers);

        // No subscribers is fine.
        let _ = self.events.send(change);
    }
}

impl fmt::Debug for ConfigStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigStore")
            .field("configured", &self.configured_ids())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tracing_test::traced_test;

    #[derive(Default)]
    struct CountingObserver(AtomicUsize);

    impl ConfigObserver for CountingObserver {
        fn on_config_change(&self, _change: &ConfigChange) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn update_merges_and_preserves_unspecified_fields() {
        let store = ConfigStore::in_memory().await.unwrap();
        store
            .update(
                "elevenlabs",
                ConfigPatch::new()
                    .api_key("k")
                    .set(Capability::Speech, "stability", 0.9),
            )
            .await
            .unwrap();
        store
            .update(
                "elevenlabs",
                ConfigPatch::new().set(Capability::Speech, "speed", 1.1),
            )
            .await
            .unwrap();

        let record = store.get("elevenlabs").unwrap();
        assert_eq!(record.api_key(), Some("k"));
        assert_eq!(record.capability_settings["speech"]["stability"], json!(0.9));
        assert_eq!(record.capability_settings["speech"]["speed"], json!(1.1));
        assert!(record.updated_at.is_some());
    }

    #[tokio::test]
    async fn clearing_the_last_field_drops_the_capability_entry() {
        let store = ConfigStore::in_memory().await.unwrap();
        store
            .update("p", ConfigPatch::new().set(Capability::Speech, "speed", 1.0))
            .await
            .unwrap();
        store
            .update("p", ConfigPatch::new().clear(Capability::Speech, "speed"))
            .await
            .unwrap();
        assert!(store.get("p").unwrap().capability_settings.is_empty());
    }

    #[tokio::test]
    async fn reset_keeps_credentials_by_default() {
        let store = ConfigStore::in_memory().await.unwrap();
        let patch = ConfigPatch::from_json(&json!({
            "apiKey": "k",
            "baseUrl": "https://proxy.local",
            "capabilitySettings": {"tts": {"stability": 0.9}, "chat": {"model": "x"}}
        }))
        .unwrap();
        store.update("p", patch).await.unwrap();

        store.reset_with("p", ResetScope::Capability(Capability::Chat)).await.unwrap();
        let record = store.get("p").unwrap();
        assert!(record.capability_settings.contains_key("speech"));
        assert!(!record.capability_settings.contains_key("chat"));

        store.reset("p").await.unwrap();
        let record = store.get("p").unwrap();
        assert!(record.capability_settings.is_empty());
        assert_eq!(record.api_key(), Some("k"));
        assert_eq!(record.base_url.as_deref(), Some("https://proxy.local"));

        store.reset_with("p", ResetScope::All).await.unwrap();
        assert!(store.get("p").is_none());
    }

    #[tokio::test]
    async fn from_json_null_clears_fields() {
        let store = ConfigStore::in_memory().await.unwrap();
        store
            .update("p", ConfigPatch::new().api_key("k").base_url("https://a.test"))
            .await
            .unwrap();
        store
            .update("p", ConfigPatch::from_json(&json!({"apiKey": null})).unwrap())
            .await
            .unwrap();
        let record = store.get("p").unwrap();
        assert_eq!(record.api_key, None);
        assert_eq!(record.base_url.as_deref(), Some("https://a.test"));
    }

    #[test]
    fn from_json_rejects_wrong_shapes() {
        assert!(ConfigPatch::from_json(&json!([])).is_err());
        assert!(ConfigPatch::from_json(&json!({"apiKey": 5})).is_err());
        assert!(ConfigPatch::from_json(&json!({"capabilitySettings": {"speech": 1}})).is_err());
    }

    #[tokio::test]
    #[traced_test]
    async fn writes_are_logged_without_secrets() {
        let store = ConfigStore::in_memory().await.unwrap();
        store
            .update("p", ConfigPatch::new().api_key("sk-very-secret"))
            .await
            .unwrap();
        assert!(logs_contain("Updated provider configuration"));
        assert!(!logs_contain("sk-very-secret"));
    }

    #[test]
    fn patch_debug_redacts_key() {
        let rendered = format!("{:?}", ConfigPatch::new().api_key("sk-secret"));
        assert!(!rendered.contains("sk-secret"));
    }

    #[tokio::test]
    async fn mutations_notify_observers_and_subscribers() {
        let store = ConfigStore::in_memory().await.unwrap();
        let observer = Arc::new(CountingObserver::default());
        let weak: Weak<dyn ConfigObserver> = Arc::downgrade(&observer) as Weak<dyn ConfigObserver>;
        store.add_observer(weak);
        let mut events = store.subscribe();

        store.update("p", ConfigPatch::new().api_key("k")).await.unwrap();
        store.reset("p").await.unwrap();
        store.remove("p").await.unwrap();

        assert_eq!(observer.0.load(Ordering::SeqCst), 3);
        assert_eq!(events.recv().await.unwrap().kind, ChangeKind::Updated);
        assert_eq!(
            events.recv().await.unwrap().kind,
            ChangeKind::Reset(ResetScope::CapabilitySettings)
        );
        assert_eq!(events.recv().await.unwrap().kind, ChangeKind::Removed);
        assert!(store.configured_ids().is_empty());
    }

    #[tokio::test]
    async fn concurrent_updates_to_one_provider_all_land() {
        let store = Arc::new(ConfigStore::in_memory().await.unwrap());
        let mut tasks = Vec::new();
        for i in 0..16 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                store
                    .update(
                        "p",
                        ConfigPatch::new().set(Capability::Chat, format!("k{i}"), i),
                    )
                    .await
            }));
        }
        for t in tasks {
            t.await.unwrap().unwrap();
        }
        assert_eq!(store.get("p").unwrap().capability_settings["chat"].len(), 16);
    }
}
