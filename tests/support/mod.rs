//! Shared fixtures: a mock provider factory/client and a hub wired to them.
#![allow(dead_code)]

use async_trait::async_trait;
use std::result::Result;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use provider_hub::prelude::*;
use provider_hub::store::ConfigBackend;
use provider_hub::types::{ClientTextStream, SettingsMap};

pub const VOICE: &str = "mockvoice";
pub const CHAT_ONLY: &str = "chatonly";

#[derive(Debug, thiserror::Error)]
#[error("upstream rejected request: {0}")]
pub struct UpstreamError(pub String);

/// Observable state shared by the factory and every client it builds.
#[derive(Default)]
pub struct Probe {
    pub builds: AtomicUsize,
    pub releases: AtomicUsize,
    pub calls: AtomicUsize,
    pub fail_calls: AtomicBool,
    pub fail_builds: AtomicBool,
    /// Streams yield their words and then an error.
    pub fail_stream: AtomicBool,
    pub last_settings: Mutex<Option<SettingsMap>>,
    pub last_api_key: Mutex<Option<String>>,
}

impl Probe {
    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    pub fn last_settings(&self) -> SettingsMap {
        self.last_settings.lock().unwrap().clone().unwrap_or_default()
    }

    fn record(&self, settings: &SettingsMap) -> Result<(), BoxError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_settings.lock().unwrap() = Some(settings.clone());
        if self.fail_calls.load(Ordering::SeqCst) {
            return Err(Box::new(UpstreamError("quota exceeded".into())));
        }
        Ok(())
    }
}

pub struct MockFactory {
    pub probe: Arc<Probe>,
    pub build_delay: Duration,
    pub call_delay: Duration,
}

impl MockFactory {
    pub fn new(probe: Arc<Probe>) -> Self {
        Self {
            probe,
            build_delay: Duration::ZERO,
            call_delay: Duration::ZERO,
        }
    }

    pub fn with_build_delay(mut self, delay: Duration) -> Self {
        self.build_delay = delay;
        self
    }

    pub fn with_call_delay(mut self, delay: Duration) -> Self {
        self.call_delay = delay;
        self
    }
}

#[async_trait]
impl ProviderFactory for MockFactory {
    async fn build(
        &self,
        config: &EffectiveConfig,
        ctx: &BuildContext,
    ) -> Result<Arc<dyn ProviderClient>, BoxError> {
        use secrecy::ExposeSecret;

        if !self.build_delay.is_zero() {
            tokio::time::sleep(self.build_delay).await;
        }
        self.probe.builds.fetch_add(1, Ordering::SeqCst);
        if self.probe.fail_builds.load(Ordering::SeqCst) {
            return Err(Box::new(UpstreamError("invalid credentials".into())));
        }
        *self.probe.last_api_key.lock().unwrap() =
            config.api_key().map(|k| k.expose_secret().to_string());

        Ok(Arc::new(MockClient {
            provider_id: ctx.provider_id.clone(),
            probe: self.probe.clone(),
            call_delay: self.call_delay,
        }))
    }
}

pub struct MockClient {
    provider_id: String,
    probe: Arc<Probe>,
    call_delay: Duration,
}

impl MockClient {
    async fn pause(&self) {
        if !self.call_delay.is_zero() {
            tokio::time::sleep(self.call_delay).await;
        }
    }
}

#[async_trait]
impl ProviderClient for MockClient {
    fn provider_id(&self) -> &str {
        &self.provider_id
    }

    fn as_chat_capability(&self) -> Option<&dyn ChatCapability> {
        Some(self)
    }

    fn as_text_stream_capability(&self) -> Option<&dyn TextStreamCapability> {
        Some(self)
    }

    fn as_speech_capability(&self) -> Option<&dyn SpeechCapability> {
        Some(self)
    }

    async fn health_check(&self) -> Result<(), BoxError> {
        self.probe.record(&SettingsMap::new())
    }

    fn release(&self) -> Result<(), BoxError> {
        self.probe.releases.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl ChatCapability for MockClient {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, BoxError> {
        self.pause().await;
        self.probe.record(&request.settings)?;
        let last = request
            .messages
            .last()
            .map(|m| m.content.clone())
            .unwrap_or_default();
        Ok(ChatResponse::new(format!("echo: {last}")))
    }
}

#[async_trait]
impl TextStreamCapability for MockClient {
    async fn chat_stream(&self, request: ChatRequest) -> Result<ClientTextStream, BoxError> {
        self.probe.record(&request.settings)?;
        let delay = self.call_delay;
        let fail = self.probe.fail_stream.load(Ordering::SeqCst);
        let stream = async_stream::stream! {
            for word in ["one", "two", "three", "four"] {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                yield Ok::<_, BoxError>(word.to_string());
            }
            if fail {
                yield Err::<String, BoxError>(Box::new(UpstreamError("stream cut".into())));
            }
        };
        Ok(Box::pin(stream))
    }
}

#[async_trait]
impl SpeechCapability for MockClient {
    async fn text_to_speech(&self, request: SpeechRequest) -> Result<SpeechResponse, BoxError> {
        self.pause().await;
        self.probe.record(&request.settings)?;
        Ok(SpeechResponse {
            audio_data: request.text.into_bytes(),
            format: "mp3".into(),
            sample_rate: Some(44_100),
            duration: None,
        })
    }
}

/// Speech + chat + stream provider with voice sliders.
pub fn voice_descriptor() -> ProviderDescriptor {
    ProviderDescriptor::builder(VOICE)
        .name("en", "Mock Voice")
        .alias("mv")
        .capabilities([Capability::Chat, Capability::TextStream, Capability::Speech])
        .field(FieldSpec::api_key())
        .field(FieldSpec::base_url("https://api.mockvoice.test/v1"))
        .field(FieldSpec::text(Capability::Chat, "model").with_default("mock-1"))
        .field(
            FieldSpec::number(Capability::Speech, "stability", 0.5)
                .range(0.0, 1.0)
                .step(0.01),
        )
        .field(
            FieldSpec::number(Capability::Speech, "speed", 1.0)
                .range(0.7, 1.2)
                .step(0.01),
        )
        .field(FieldSpec::text(Capability::Speech, "voice_id").with_default("rachel"))
        .field(FieldSpec::boolean(Capability::Speech, "use_speaker_boost", true))
        .build()
        .expect("valid descriptor")
}

pub fn chat_only_descriptor() -> ProviderDescriptor {
    ProviderDescriptor::builder(CHAT_ONLY)
        .name("en", "Chat Only")
        .capability(Capability::Chat)
        .field(FieldSpec::api_key())
        .build()
        .expect("valid descriptor")
}

pub fn catalog() -> ProviderCatalog {
    let mut catalog = ProviderCatalog::new();
    catalog.register(voice_descriptor());
    catalog.register(chat_only_descriptor());
    catalog
}

pub async fn hub_with(factory: MockFactory) -> ProviderHub {
    let factory = Arc::new(factory);
    ProviderHub::builder()
        .catalog(catalog())
        .factory(VOICE, factory.clone())
        .factory(CHAT_ONLY, factory)
        .build()
        .await
        .expect("hub builds")
}

pub async fn hub_with_backend(factory: MockFactory, backend: Arc<dyn ConfigBackend>) -> ProviderHub {
    let factory = Arc::new(factory);
    ProviderHub::builder()
        .catalog(catalog())
        .backend(backend)
        .factory(VOICE, factory.clone())
        .factory(CHAT_ONLY, factory)
        .build()
        .await
        .expect("hub builds")
}

/// Hub plus probe, with `VOICE` already holding an api key.
pub async fn configured_hub() -> (ProviderHub, Arc<Probe>) {
    let probe = Arc::new(Probe::default());
    let hub = hub_with(MockFactory::new(probe.clone())).await;
    hub.update_config(VOICE, ConfigPatch::new().api_key("k"))
        .await
        .expect("update");
    (hub, probe)
}
