//! Capability client traits
//!
//! Provider SDK wrappers implement these; the hub only ever calls through them.
//! A client advertises what it implements via the `as_*_capability` accessors
//! on [`ProviderClient`].

use async_trait::async_trait;

use crate::error::BoxError;
use crate::types::{
    ChatRequest, ChatResponse, ClientTextStream, EmbeddingRequest, EmbeddingResponse,
    SpeechRequest, SpeechResponse, TranscriptionRequest, TranscriptionResponse,
};

#[async_trait]
pub trait ChatCapability: Send + Sync {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, BoxError>;
}

#[async_trait]
pub trait TextStreamCapability: Send + Sync {
    async fn chat_stream(&self, request: ChatRequest) -> Result<ClientTextStream, BoxError>;
}

#[async_trait]
pub trait SpeechCapability: Send + Sync {
    async fn text_to_speech(&self, request: SpeechRequest) -> Result<SpeechResponse, BoxError>;
}

#[async_trait]
pub trait TranscriptionCapability: Send + Sync {
    async fn speech_to_text(
        &self,
        request: TranscriptionRequest,
    ) -> Result<TranscriptionResponse, BoxError>;
}

#[async_trait]
pub trait EmbeddingCapability: Send + Sync {
    async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse, BoxError>;
}

/// A ready-to-use provider client built by a [`crate::registry::ProviderFactory`].
#[async_trait]
pub trait ProviderClient: Send + Sync {
    fn provider_id(&self) -> &str;

    fn as_chat_capability(&self) -> Option<&dyn ChatCapability> {
        None
    }

    fn as_text_stream_capability(&self) -> Option<&dyn TextStreamCapability> {
        None
    }

    fn as_speech_capability(&self) -> Option<&dyn SpeechCapability> {
        None
    }

    fn as_transcription_capability(&self) -> Option<&dyn TranscriptionCapability> {
        None
    }

    fn as_embedding_capability(&self) -> Option<&dyn EmbeddingCapability> {
        None
    }

    /// Cheap connectivity/credential probe used by playground "test" buttons.
    async fn health_check(&self) -> Result<(), BoxError> {
        Ok(())
    }

    /// Release held resources. Called once when the cache drops this client
    /// on replacement, invalidation, expiry or eviction.
    fn release(&self) -> Result<(), BoxError> {
        Ok(())
    }
}
