//! Built-in provider descriptors.
//!
//! Each provider is compiled in behind its cargo feature so the catalog only
//! advertises providers the application was built with.

use super::descriptor::{FieldSpec, ProviderDescriptor, ProviderDescriptorBuilder};
#[allow(unused_imports)]
use crate::types::Capability;

pub const OPENAI: &str = "openai";
pub const ANTHROPIC: &str = "anthropic";
pub const GEMINI: &str = "gemini";
pub const OLLAMA: &str = "ollama";
pub const DEEPSEEK: &str = "deepseek";
pub const GROQ: &str = "groq";
pub const ELEVENLABS: &str = "elevenlabs";

/// Descriptors for every provider enabled in this build, in listing order.
#[allow(clippy::vec_init_then_push)]
pub fn builtin_descriptors() -> Vec<ProviderDescriptor> {
    #[allow(unused_mut)]
    let mut out = Vec::new();

    #[cfg(feature = "openai")]
    push(&mut out, openai());
    #[cfg(feature = "anthropic")]
    push(&mut out, anthropic());
    #[cfg(feature = "google")]
    push(&mut out, gemini());
    #[cfg(feature = "deepseek")]
    push(&mut out, deepseek());
    #[cfg(feature = "groq")]
    push(&mut out, groq());
    #[cfg(feature = "ollama")]
    push(&mut out, ollama());
    #[cfg(feature = "elevenlabs")]
    push(&mut out, elevenlabs());

    out
}

#[allow(dead_code)]
fn push(out: &mut Vec<ProviderDescriptor>, builder: ProviderDescriptorBuilder) {
    match builder.build() {
        Ok(descriptor) => out.push(descriptor),
        Err(e) => tracing::error!(error = %e, "Skipping invalid built-in provider descriptor"),
    }
}

#[allow(dead_code)]
fn api_key() -> FieldSpec {
    FieldSpec::api_key().label("en", "API Key").label("zh-CN", "API 密钥")
}

#[allow(dead_code)]
fn base_url(default: &str) -> FieldSpec {
    FieldSpec::base_url(default)
        .label("en", "Base URL")
        .label("zh-CN", "接口地址")
}

#[allow(dead_code)]
fn temperature(capability: Capability, default: f64, max: f64) -> FieldSpec {
    FieldSpec::number(capability, "temperature", default)
        .range(0.0, max)
        .step(0.1)
        .label("en", "Temperature")
}

#[cfg(feature = "openai")]
fn openai() -> ProviderDescriptorBuilder {
    ProviderDescriptor::builder(OPENAI)
        .name("en", "OpenAI")
        .description("GPT chat models, TTS voices, Whisper transcription and embeddings")
        .capabilities([
            Capability::Chat,
            Capability::TextStream,
            Capability::Speech,
            Capability::Transcription,
            Capability::Embedding,
        ])
        .field(api_key())
        .field(base_url("https://api.openai.com/v1"))
        .field(FieldSpec::text(Capability::Chat, "model").with_default("gpt-4o-mini"))
        .field(temperature(Capability::Chat, 0.7, 2.0))
        .field(FieldSpec::text(Capability::TextStream, "model").with_default("gpt-4o-mini"))
        .field(temperature(Capability::TextStream, 0.7, 2.0))
        .field(
            FieldSpec::enumeration(
                Capability::Speech,
                "voice",
                ["alloy", "echo", "fable", "onyx", "nova", "shimmer"],
            )
            .with_default("alloy")
            .label("en", "Voice"),
        )
        .field(
            FieldSpec::enumeration(Capability::Speech, "model", ["tts-1", "tts-1-hd"])
                .with_default("tts-1"),
        )
        .field(
            FieldSpec::enumeration(
                Capability::Speech,
                "format",
                ["mp3", "opus", "aac", "flac", "wav"],
            )
            .with_default("mp3"),
        )
        .field(
            FieldSpec::number(Capability::Speech, "speed", 1.0)
                .range(0.25, 4.0)
                .step(0.05)
                .label("en", "Speed"),
        )
        .field(FieldSpec::text(Capability::Transcription, "model").with_default("whisper-1"))
        .field(
            FieldSpec::text(Capability::Embedding, "model").with_default("text-embedding-3-small"),
        )
}

#[cfg(feature = "anthropic")]
fn anthropic() -> ProviderDescriptorBuilder {
    ProviderDescriptor::builder(ANTHROPIC)
        .name("en", "Anthropic")
        .description("Claude models")
        .alias("claude")
        .capabilities([Capability::Chat, Capability::TextStream])
        .field(api_key())
        .field(base_url("https://api.anthropic.com"))
        .field(FieldSpec::text(Capability::Chat, "model").with_default("claude-3-5-sonnet-latest"))
        .field(
            FieldSpec::number(Capability::Chat, "max_tokens", 1024.0)
                .range(1.0, 8192.0)
                .step(1.0),
        )
        .field(temperature(Capability::Chat, 0.7, 1.0))
        .field(
            FieldSpec::text(Capability::TextStream, "model")
                .with_default("claude-3-5-sonnet-latest"),
        )
        .field(temperature(Capability::TextStream, 0.7, 1.0))
}

#[cfg(feature = "google")]
fn gemini() -> ProviderDescriptorBuilder {
    ProviderDescriptor::builder(GEMINI)
        .name("en", "Google Gemini")
        .name("zh-CN", "谷歌 Gemini")
        .description("Gemini multimodal models and text embeddings")
        .alias("google")
        .capabilities([Capability::Chat, Capability::TextStream, Capability::Embedding])
        .field(api_key())
        .field(base_url("https://generativelanguage.googleapis.com/v1beta"))
        .field(FieldSpec::text(Capability::Chat, "model").with_default("gemini-2.0-flash"))
        .field(temperature(Capability::Chat, 0.7, 2.0))
        .field(FieldSpec::text(Capability::TextStream, "model").with_default("gemini-2.0-flash"))
        .field(FieldSpec::text(Capability::Embedding, "model").with_default("text-embedding-004"))
}

#[cfg(feature = "deepseek")]
fn deepseek() -> ProviderDescriptorBuilder {
    ProviderDescriptor::builder(DEEPSEEK)
        .name("en", "DeepSeek")
        .name("zh-CN", "深度求索")
        .capabilities([Capability::Chat, Capability::TextStream])
        .field(api_key())
        .field(base_url("https://api.deepseek.com/v1"))
        .field(
            FieldSpec::enumeration(Capability::Chat, "model", ["deepseek-chat", "deepseek-reasoner"])
                .with_default("deepseek-chat"),
        )
        .field(temperature(Capability::Chat, 1.0, 2.0))
        .field(
            FieldSpec::enumeration(
                Capability::TextStream,
                "model",
                ["deepseek-chat", "deepseek-reasoner"],
            )
            .with_default("deepseek-chat"),
        )
}

#[cfg(feature = "groq")]
fn groq() -> ProviderDescriptorBuilder {
    ProviderDescriptor::builder(GROQ)
        .name("en", "Groq")
        .description("Low-latency hosted open models")
        .capabilities([
            Capability::Chat,
            Capability::TextStream,
            Capability::Transcription,
        ])
        .field(api_key())
        .field(base_url("https://api.groq.com/openai/v1"))
        .field(FieldSpec::text(Capability::Chat, "model").with_default("llama-3.3-70b-versatile"))
        .field(
            FieldSpec::text(Capability::TextStream, "model")
                .with_default("llama-3.3-70b-versatile"),
        )
        .field(
            FieldSpec::text(Capability::Transcription, "model").with_default("whisper-large-v3"),
        )
}

#[cfg(feature = "ollama")]
fn ollama() -> ProviderDescriptorBuilder {
    // Local runtime: no credential needed.
    ProviderDescriptor::builder(OLLAMA)
        .name("en", "Ollama")
        .description("Locally hosted models")
        .capabilities([Capability::Chat, Capability::TextStream, Capability::Embedding])
        .field(api_key().optional())
        .field(base_url("http://localhost:11434"))
        .field(FieldSpec::text(Capability::Chat, "model").with_default("llama3.2"))
        .field(FieldSpec::text(Capability::TextStream, "model").with_default("llama3.2"))
        .field(FieldSpec::text(Capability::Embedding, "model").with_default("nomic-embed-text"))
}

#[cfg(feature = "elevenlabs")]
fn elevenlabs() -> ProviderDescriptorBuilder {
    ProviderDescriptor::builder(ELEVENLABS)
        .name("en", "ElevenLabs")
        .description("Expressive multilingual speech synthesis")
        .alias("11labs")
        .capabilities([Capability::Speech, Capability::Transcription])
        .field(api_key())
        .field(base_url("https://api.elevenlabs.io/v1"))
        .field(
            FieldSpec::text(Capability::Speech, "voice_id")
                .with_default("21m00Tcm4TlvDq8ikWAM")
                .label("en", "Voice"),
        )
        .field(
            FieldSpec::enumeration(
                Capability::Speech,
                "model_id",
                [
                    "eleven_multilingual_v2",
                    "eleven_turbo_v2_5",
                    "eleven_flash_v2_5",
                ],
            )
            .with_default("eleven_multilingual_v2")
            .label("en", "Model"),
        )
        .field(
            FieldSpec::enumeration(
                Capability::Speech,
                "output_format",
                ["mp3_44100_128", "mp3_22050_32", "pcm_16000", "pcm_24000"],
            )
            .with_default("mp3_44100_128"),
        )
        .field(
            FieldSpec::number(Capability::Speech, "stability", 0.5)
                .range(0.0, 1.0)
                .step(0.01)
                .label("en", "Stability")
                .label("zh-CN", "稳定性"),
        )
        .field(
            FieldSpec::number(Capability::Speech, "similarity_boost", 0.75)
                .range(0.0, 1.0)
                .step(0.01)
                .label("en", "Similarity"),
        )
        .field(
            FieldSpec::number(Capability::Speech, "style", 0.0)
                .range(0.0, 1.0)
                .step(0.01)
                .label("en", "Style exaggeration"),
        )
        .field(
            FieldSpec::number(Capability::Speech, "speed", 1.0)
                .range(0.7, 1.2)
                .step(0.01)
                .label("en", "Speed")
                .label("zh-CN", "语速"),
        )
        .field(
            FieldSpec::boolean(Capability::Speech, "use_speaker_boost", true)
                .label("en", "Speaker boost"),
        )
        .field(FieldSpec::text(Capability::Transcription, "model_id").with_default("scribe_v1"))
}
