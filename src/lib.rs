//! # provider-hub
//!
//! Configure, persist and invoke a heterogeneous set of AI service providers
//! through one interface.
//!
//! ## Layers
//!
//! - **Catalog** ([`catalog`]): static descriptors per provider with localized
//!   names, capability tags and a field schema carrying defaults and constraints.
//! - **Store** ([`store`]): persisted per-provider records with partial updates,
//!   resets and change notifications.
//! - **Resolver** ([`resolver`]): pure merge of descriptor defaults and stored
//!   values into an [`EffectiveConfig`] with a stable fingerprint.
//! - **Instance cache** ([`registry`]): one lazily built client per provider,
//!   rebuilt when its configuration changes, with single-flight construction.
//! - **Facade** ([`ProviderHub`]): capability calls with request-scoped overrides.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use provider_hub::prelude::*;
//!
//! let hub = ProviderHub::builder()
//!     .factory("elevenlabs", Arc::new(MyElevenLabsFactory))
//!     .build()
//!     .await?;
//!
//! hub.update_config(
//!     "elevenlabs",
//!     ConfigPatch::new()
//!         .api_key("xi-...")
//!         .set(Capability::Speech, "stability", 0.8),
//! )
//! .await?;
//!
//! let audio = hub
//!     .speak("elevenlabs", SpeechRequest::new("Hello").with_setting("speed", 1.1))
//!     .await?;
//! let file = audio.to_temp_file()?;
//! ```

#![deny(unsafe_code)]

pub mod catalog;
pub mod config;
pub mod error;
pub mod hub;
pub mod registry;
pub mod resolver;
pub mod store;
#[cfg(feature = "telemetry")]
pub mod telemetry;
pub mod traits;
pub mod types;
pub mod utils;

pub use catalog::{FieldKind, FieldScope, FieldSpec, ProviderCatalog, ProviderDescriptor};
pub use config::{CacheOptions, HubOptions};
pub use error::{ErrorCategory, HubError, Result};
pub use hub::{CapabilityCall, CapabilityOutput, ProviderHub, ProviderHubBuilder, TextStreamHandle};
pub use registry::{BuildContext, InstanceCache, ProviderFactory, ProviderInstance};
pub use resolver::{EffectiveConfig, resolve};
pub use store::{
    ChangeKind, ConfigBackend, ConfigChange, ConfigPatch, ConfigStore, JsonFileBackend,
    MemoryBackend, PersistedProviderConfig, ResetScope,
};
pub use utils::cancel::CancelHandle;

pub mod prelude {
    pub use crate::catalog::{FieldSpec, ProviderCatalog, ProviderDescriptor};
    pub use crate::error::{BoxError, ErrorCategory, HubError, Result};
    pub use crate::hub::{CapabilityCall, CapabilityOutput, ProviderHub, TextStreamHandle};
    pub use crate::registry::{BuildContext, ProviderFactory, ProviderInstance};
    pub use crate::resolver::EffectiveConfig;
    pub use crate::store::{ConfigPatch, ResetScope};
    pub use crate::traits::{
        ChatCapability, EmbeddingCapability, ProviderClient, SpeechCapability,
        TextStreamCapability, TranscriptionCapability,
    };
    pub use crate::types::{
        AudioArtifact, Capability, ChatMessage, ChatRequest, ChatResponse, EmbeddingRequest,
        EmbeddingResponse, SpeechRequest, SpeechResponse, TranscriptionRequest,
        TranscriptionResponse, VoiceSettings,
    };
    pub use crate::utils::cancel::CancelHandle;
    pub use std::sync::Arc;
}
