//! Capability tags

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::HubError;

/// A named function a provider may support.
///
/// Ordering follows declaration order so capability sets iterate stably.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Single-shot text generation
    Chat,
    /// Streamed text generation
    #[serde(alias = "stream", alias = "streaming")]
    TextStream,
    /// Text-to-speech
    #[serde(alias = "tts")]
    Speech,
    /// Speech-to-text
    #[serde(alias = "stt")]
    Transcription,
    Embedding,
}

impl Capability {
    pub const ALL: [Capability; 5] = [
        Capability::Chat,
        Capability::TextStream,
        Capability::Speech,
        Capability::Transcription,
        Capability::Embedding,
    ];

    /// Canonical tag used in persisted records.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::TextStream => "text_stream",
            Self::Speech => "speech",
            Self::Transcription => "transcription",
            Self::Embedding => "embedding",
        }
    }

    /// Parse a tag, accepting legacy aliases (`tts`, `stt`, `stream`).
    pub fn parse(tag: &str) -> Option<Self> {
        match tag.trim() {
            "chat" => Some(Self::Chat),
            "text_stream" | "stream" | "streaming" => Some(Self::TextStream),
            "speech" | "tts" => Some(Self::Speech),
            "transcription" | "stt" => Some(Self::Transcription),
            "embedding" => Some(Self::Embedding),
            _ => None,
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Capability {
    type Err = HubError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| HubError::InvalidParameter(format!("Unknown capability: {s}")))
    }
}
