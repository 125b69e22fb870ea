//! Shared request/response types and capability tags.

pub mod audio;
pub mod capability;
pub mod chat;
pub mod embedding;

pub use audio::{
    AudioArtifact, SpeechRequest, SpeechResponse, TempAudioFile, TranscriptionRequest,
    TranscriptionResponse, VoiceSettings,
};
pub use capability::Capability;
pub use chat::{ChatMessage, ChatRequest, ChatResponse, ChatRole, ClientTextStream, TextStream};
pub use embedding::{EmbeddingRequest, EmbeddingResponse};

use std::collections::BTreeMap;

/// Field key → value mapping for one capability's settings.
///
/// `BTreeMap` keeps serialization order stable, which the fingerprint relies on.
pub type SettingsMap = BTreeMap<String, serde_json::Value>;

/// Capability tag → settings mapping as persisted (tags kept verbatim).
pub type CapabilitySettingsMap = BTreeMap<String, SettingsMap>;
