//! Capability invocation facade.
//!
//! [`ProviderHub`] ties the catalog, the configuration store and the instance
//! cache together. Every entry point canonicalizes the provider id, checks the
//! descriptor's capability set before touching configuration, obtains the
//! cached instance and merges request-scoped overrides over the resolved
//! capability settings before delegating to the provider client.

use futures::{Stream, StreamExt};
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::broadcast;

use crate::catalog::{ProviderCatalog, ProviderDescriptor};
use crate::config::HubOptions;
use crate::error::{HubError, Result};
use crate::registry::{InstanceCache, ProviderFactory, ProviderInstance};
use crate::resolver::{EffectiveConfig, merge_overrides, resolve};
use crate::store::{
    ConfigBackend, ConfigChange, ConfigPatch, ConfigStore, JsonFileBackend, MemoryBackend,
    PersistedProviderConfig, ResetScope,
};
use crate::types::{
    AudioArtifact, Capability, ChatRequest, ChatResponse, EmbeddingRequest, EmbeddingResponse,
    SettingsMap, SpeechRequest, TextStream, TranscriptionRequest, TranscriptionResponse,
    VoiceSettings,
};
use crate::utils::cancel::{CancelHandle, make_cancellable_stream, run_cancellable};

/// A capability call with its arguments, for callers that dispatch dynamically.
#[derive(Debug, Clone)]
pub enum CapabilityCall {
    Chat(ChatRequest),
    TextStream(ChatRequest),
    Speech(SpeechRequest),
    Transcription(TranscriptionRequest),
    Embedding(EmbeddingRequest),
}

impl CapabilityCall {
    pub fn capability(&self) -> Capability {
        match self {
            Self::Chat(_) => Capability::Chat,
            Self::TextStream(_) => Capability::TextStream,
            Self::Speech(_) => Capability::Speech,
            Self::Transcription(_) => Capability::Transcription,
            Self::Embedding(_) => Capability::Embedding,
        }
    }
}

#[derive(Debug)]
pub enum CapabilityOutput {
    Chat(ChatResponse),
    TextStream(TextStreamHandle),
    Speech(AudioArtifact),
    Transcription(TranscriptionResponse),
    Embedding(EmbeddingResponse),
}

/// Streamed text plus the handle that stops it.
pub struct TextStreamHandle {
    stream: TextStream,
    cancel: CancelHandle,
}

impl TextStreamHandle {
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn into_parts(self) -> (TextStream, CancelHandle) {
        (self.stream, self.cancel)
    }
}

impl std::fmt::Debug for TextStreamHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextStreamHandle")
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl Stream for TextStreamHandle {
    type Item = Result<String>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.stream.as_mut().poll_next(cx)
    }
}

pub struct ProviderHub {
    catalog: Arc<ProviderCatalog>,
    store: Arc<ConfigStore>,
    cache: Arc<InstanceCache>,
}

impl ProviderHub {
    pub fn builder() -> ProviderHubBuilder {
        ProviderHubBuilder::default()
    }

    pub fn catalog(&self) -> &ProviderCatalog {
        &self.catalog
    }

    pub fn cache(&self) -> &InstanceCache {
        &self.cache
    }

    // --- Catalog and store surface --------------------------------------

    pub fn get_descriptor(&self, provider_id: &str) -> Result<Arc<ProviderDescriptor>> {
        self.catalog.get_descriptor(provider_id)
    }

    pub fn list_descriptors(&self, capability: Option<Capability>) -> Vec<Arc<ProviderDescriptor>> {
        self.catalog.list_descriptors(capability)
    }

    /// Stored record for a provider, or `None` if it was never configured.
    pub fn get_config(&self, provider_id: &str) -> Option<PersistedProviderConfig> {
        self.store.get(&self.catalog.canonical_id(provider_id))
    }

    /// Ids of catalog providers that have a stored record, sorted.
    pub fn configured_ids(&self) -> Vec<String> {
        self.store
            .configured_ids()
            .into_iter()
            .filter(|id| self.catalog.resolve(id).is_some_and(|d| d.id == *id))
            .collect()
    }

    pub async fn update_config(&self, provider_id: &str, patch: ConfigPatch) -> Result<()> {
        let descriptor = self.catalog.get_descriptor(provider_id)?;
        self.store.update(&descriptor.id, patch).await
    }

    /// Restore descriptor defaults for every capability setting; keeps credentials.
    pub async fn reset_config(&self, provider_id: &str) -> Result<()> {
        self.reset_config_with(provider_id, ResetScope::default())
            .await
    }

    pub async fn reset_config_with(&self, provider_id: &str, scope: ResetScope) -> Result<()> {
        let descriptor = self.catalog.get_descriptor(provider_id)?;
        self.store.reset_with(&descriptor.id, scope).await
    }

    pub async fn remove_config(&self, provider_id: &str) -> Result<()> {
        let descriptor = self.catalog.get_descriptor(provider_id)?;
        self.store.remove(&descriptor.id).await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConfigChange> {
        self.store.subscribe()
    }

    // --- Derived settings -----------------------------------------------

    /// Resolved configuration, whether or not it is complete.
    pub fn effective_config(&self, provider_id: &str) -> Result<EffectiveConfig> {
        let descriptor = self.catalog.get_descriptor(provider_id)?;
        Ok(resolve(&descriptor, self.store.get(&descriptor.id).as_ref()))
    }

    /// Voice parameters a speech call would use, with `overrides` applied.
    pub fn voice_settings(&self, provider_id: &str, overrides: &SettingsMap) -> Result<VoiceSettings> {
        let descriptor = self.supporting(provider_id, Capability::Speech)?;
        let config = resolve(&descriptor, self.store.get(&descriptor.id).as_ref());
        let base = config
            .settings(Capability::Speech)
            .cloned()
            .unwrap_or_default();
        let merged = merge_overrides(&descriptor, Capability::Speech, &base, overrides);
        Ok(VoiceSettings::from_settings(&merged))
    }

    // --- Instances ------------------------------------------------------

    pub async fn get_instance(&self, provider_id: &str) -> Result<ProviderInstance> {
        self.cache.get_instance(provider_id).await
    }

    pub async fn invalidate(&self, provider_id: &str) -> bool {
        self.cache.invalidate(provider_id).await
    }

    pub async fn invalidate_all(&self) {
        self.cache.invalidate_all().await
    }

    /// Build (or reuse) the instance and run the client's health check.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn check(&self, provider_id: &str) -> Result<()> {
        let instance = self.cache.get_instance(provider_id).await?;
        instance
            .client()
            .health_check()
            .await
            .map_err(|e| HubError::provider(instance.provider_id(), e))
    }

    // --- Capability calls -----------------------------------------------

    #[tracing::instrument(level = "debug", skip(self, request))]
    pub async fn chat(&self, provider_id: &str, request: ChatRequest) -> Result<ChatResponse> {
        let (instance, settings) = self
            .prepare(provider_id, Capability::Chat, &request.settings)
            .await?;
        let client = instance
            .client()
            .as_chat_capability()
            .ok_or_else(|| unsupported(&instance, Capability::Chat))?;
        client
            .chat(ChatRequest { settings, ..request })
            .await
            .map_err(|e| HubError::provider(instance.provider_id(), e))
    }

    pub async fn chat_with_cancel(
        &self,
        provider_id: &str,
        request: ChatRequest,
        cancel: &CancelHandle,
    ) -> Result<ChatResponse> {
        run_cancellable(cancel, self.chat(provider_id, request)).await
    }

    #[tracing::instrument(level = "debug", skip(self, request))]
    pub async fn stream_text(&self, provider_id: &str, request: ChatRequest) -> Result<TextStreamHandle> {
        let (instance, settings) = self
            .prepare(provider_id, Capability::TextStream, &request.settings)
            .await?;
        let client = instance
            .client()
            .as_text_stream_capability()
            .ok_or_else(|| unsupported(&instance, Capability::TextStream))?;
        let id = instance.provider_id().to_string();
        let upstream = client
            .chat_stream(ChatRequest { settings, ..request })
            .await
            .map_err(|e| HubError::provider(&id, e))?;

        let mapped: TextStream =
            Box::pin(upstream.map(move |item| item.map_err(|e| HubError::provider(&id, e))));
        let (stream, cancel) = make_cancellable_stream(mapped);
        Ok(TextStreamHandle { stream, cancel })
    }

    #[tracing::instrument(level = "debug", skip(self, request))]
    pub async fn speak(&self, provider_id: &str, request: SpeechRequest) -> Result<AudioArtifact> {
        let (instance, settings) = self
            .prepare(provider_id, Capability::Speech, &request.settings)
            .await?;
        let client = instance
            .client()
            .as_speech_capability()
            .ok_or_else(|| unsupported(&instance, Capability::Speech))?;
        let response = client
            .text_to_speech(SpeechRequest { settings, ..request })
            .await
            .map_err(|e| HubError::provider(instance.provider_id(), e))?;
        Ok(AudioArtifact::from_response(instance.provider_id(), response))
    }

    /// Like [`ProviderHub::speak`], but stops when `cancel` fires. Nothing is
    /// returned for a cancelled call, so no audio buffer outlives it.
    pub async fn speak_with_cancel(
        &self,
        provider_id: &str,
        request: SpeechRequest,
        cancel: &CancelHandle,
    ) -> Result<AudioArtifact> {
        run_cancellable(cancel, self.speak(provider_id, request)).await
    }

    #[tracing::instrument(level = "debug", skip(self, request))]
    pub async fn transcribe(
        &self,
        provider_id: &str,
        request: TranscriptionRequest,
    ) -> Result<TranscriptionResponse> {
        let (instance, settings) = self
            .prepare(provider_id, Capability::Transcription, &request.settings)
            .await?;
        let client = instance
            .client()
            .as_transcription_capability()
            .ok_or_else(|| unsupported(&instance, Capability::Transcription))?;
        client
            .speech_to_text(TranscriptionRequest { settings, ..request })
            .await
            .map_err(|e| HubError::provider(instance.provider_id(), e))
    }

    #[tracing::instrument(level = "debug", skip(self, request))]
    pub async fn embed(&self, provider_id: &str, request: EmbeddingRequest) -> Result<EmbeddingResponse> {
        let (instance, settings) = self
            .prepare(provider_id, Capability::Embedding, &request.settings)
            .await?;
        let client = instance
            .client()
            .as_embedding_capability()
            .ok_or_else(|| unsupported(&instance, Capability::Embedding))?;
        client
            .embed(EmbeddingRequest { settings, ..request })
            .await
            .map_err(|e| HubError::provider(instance.provider_id(), e))
    }

    /// Dispatch a capability call chosen at runtime.
    pub async fn invoke(&self, provider_id: &str, call: CapabilityCall) -> Result<CapabilityOutput> {
        match call {
            CapabilityCall::Chat(r) => self.chat(provider_id, r).await.map(CapabilityOutput::Chat),
            CapabilityCall::TextStream(r) => self
                .stream_text(provider_id, r)
                .await
                .map(CapabilityOutput::TextStream),
            CapabilityCall::Speech(r) => self.speak(provider_id, r).await.map(CapabilityOutput::Speech),
            CapabilityCall::Transcription(r) => self
                .transcribe(provider_id, r)
                .await
                .map(CapabilityOutput::Transcription),
            CapabilityCall::Embedding(r) => self.embed(provider_id, r).await.map(CapabilityOutput::Embedding),
        }
    }

    fn supporting(&self, provider_id: &str, capability: Capability) -> Result<Arc<ProviderDescriptor>> {
        let descriptor = self.catalog.get_descriptor(provider_id)?;
        if !descriptor.supports(capability) {
            return Err(HubError::UnsupportedCapability {
                provider_id: descriptor.id.clone(),
                capability,
            });
        }
        Ok(descriptor)
    }

    async fn prepare(
        &self,
        provider_id: &str,
        capability: Capability,
        overrides: &SettingsMap,
    ) -> Result<(ProviderInstance, SettingsMap)> {
        let descriptor = self.supporting(provider_id, capability)?;
        let instance = self.cache.get_instance(&descriptor.id).await?;
        let base = instance
            .config()
            .settings(capability)
            .cloned()
            .unwrap_or_default();
        let settings = merge_overrides(&descriptor, capability, &base, overrides);
        Ok((instance, settings))
    }
}

fn unsupported(instance: &ProviderInstance, capability: Capability) -> HubError {
    tracing::warn!(
        provider = %instance.provider_id(),
        capability = %capability,
        "Client does not implement a capability its descriptor declares"
    );
    HubError::UnsupportedCapability {
        provider_id: instance.provider_id().to_string(),
        capability,
    }
}

impl std::fmt::Debug for ProviderHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderHub")
            .field("providers", &self.catalog.len())
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

/// Wires catalog, persistence, factories and options into a [`ProviderHub`].
#[derive(Default)]
pub struct ProviderHubBuilder {
    catalog: Option<ProviderCatalog>,
    extra_descriptors: Vec<ProviderDescriptor>,
    backend: Option<Arc<dyn ConfigBackend>>,
    factories: Vec<(String, Arc<dyn ProviderFactory>)>,
    options: HubOptions,
    http_client: Option<reqwest::Client>,
}

impl ProviderHubBuilder {
    /// Replace the built-in catalog entirely.
    pub fn catalog(mut self, catalog: ProviderCatalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Register an additional descriptor on top of the catalog.
    pub fn descriptor(mut self, descriptor: ProviderDescriptor) -> Self {
        self.extra_descriptors.push(descriptor);
        self
    }

    /// Persistence medium; overrides `options.store_dir`.
    pub fn backend(mut self, backend: Arc<dyn ConfigBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Register the client factory for a provider id (or alias).
    pub fn factory(mut self, provider_id: impl Into<String>, factory: Arc<dyn ProviderFactory>) -> Self {
        self.factories.push((provider_id.into(), factory));
        self
    }

    pub fn options(mut self, options: HubOptions) -> Self {
        self.options = options;
        self
    }

    /// Shared HTTP client handed to factories.
    pub fn http_client(mut self, client: reqwest::Client) -> Self {
        self.http_client = Some(client);
        self
    }

    pub async fn build(self) -> Result<ProviderHub> {
        let mut catalog = self
            .catalog
            .unwrap_or_else(ProviderCatalog::with_builtin_providers);
        for descriptor in self.extra_descriptors {
            catalog.register(descriptor);
        }

        let mut factories = HashMap::new();
        for (id, factory) in self.factories {
            let canonical = catalog.canonical_id(&id);
            if catalog.resolve(&canonical).is_none() {
                tracing::warn!(provider = %id, "Factory registered for a provider without descriptor");
            }
            factories.insert(canonical, factory);
        }

        let backend: Arc<dyn ConfigBackend> = match (self.backend, &self.options.store_dir) {
            (Some(backend), _) => backend,
            (None, Some(dir)) => Arc::new(JsonFileBackend::new(dir, &self.options.namespace)),
            (None, None) => Arc::new(MemoryBackend::new()),
        };
        let store = Arc::new(ConfigStore::open(backend).await?);

        let catalog = Arc::new(catalog);
        let cache = InstanceCache::new(
            catalog.clone(),
            store.clone(),
            factories,
            self.http_client.unwrap_or_default(),
            &self.options.cache,
        );

        tracing::debug!(
            providers = catalog.len(),
            configured = store.configured_ids().len(),
            "Provider hub ready"
        );
        Ok(ProviderHub {
            catalog,
            store,
            cache,
        })
    }
}
