//! Audio processing types for TTS and STT

use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;

use crate::error::Result;
use crate::types::SettingsMap;

/// Text-to-speech request
#[derive(Debug, Clone, Default)]
pub struct SpeechRequest {
    /// Text to convert to speech
    pub text: String,
    /// Request-scoped overrides on the way in, merged speech settings on the way
    /// to the provider client.
    pub settings: SettingsMap,
}

impl SpeechRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            settings: SettingsMap::new(),
        }
    }

    /// Set a request-scoped override (e.g. `"speed"`, `"voice"`).
    pub fn with_setting(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.settings.insert(key.into(), value.into());
        self
    }

    /// Typed view over the merged settings.
    pub fn voice_settings(&self) -> VoiceSettings {
        VoiceSettings::from_settings(&self.settings)
    }
}

/// Text-to-speech response as produced by a provider client
#[derive(Debug, Clone, Default)]
pub struct SpeechResponse {
    /// Generated audio data
    pub audio_data: Vec<u8>,
    /// Audio format (mp3, wav, etc.)
    pub format: String,
    pub sample_rate: Option<u32>,
    /// Duration in seconds
    pub duration: Option<f32>,
}

/// Speech-to-text request
#[derive(Debug, Clone, Default)]
pub struct TranscriptionRequest {
    pub audio_data: Vec<u8>,
    /// Container/codec hint (e.g. `"wav"`)
    pub format: Option<String>,
    pub settings: SettingsMap,
}

impl TranscriptionRequest {
    pub fn new(audio_data: Vec<u8>) -> Self {
        Self {
            audio_data,
            format: None,
            settings: SettingsMap::new(),
        }
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    pub fn with_setting(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.settings.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct TranscriptionResponse {
    pub text: String,
    pub language: Option<String>,
    pub duration: Option<f32>,
}

/// Synthesized audio handed back to the caller.
///
/// The artifact owns its bytes. Materializing it on disk goes through
/// [`AudioArtifact::to_temp_file`], whose guard deletes the file when dropped.
#[derive(Debug, Clone)]
pub struct AudioArtifact {
    pub provider_id: String,
    pub data: Vec<u8>,
    pub format: String,
    pub sample_rate: Option<u32>,
    pub duration: Option<f32>,
}

impl AudioArtifact {
    pub(crate) fn from_response(provider_id: &str, response: SpeechResponse) -> Self {
        Self {
            provider_id: provider_id.to_string(),
            data: response.audio_data,
            format: response.format,
            sample_rate: response.sample_rate,
            duration: response.duration,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Write the audio to a temporary file that is removed when the returned
    /// guard goes out of scope.
    pub fn to_temp_file(&self) -> Result<TempAudioFile> {
        let suffix = format!(".{}", self.format.trim_start_matches('.'));
        let mut file = tempfile::Builder::new()
            .prefix("provider-hub-audio-")
            .suffix(&suffix)
            .tempfile()?;
        file.write_all(&self.data)?;
        file.flush()?;
        Ok(TempAudioFile { file })
    }
}

/// Temporary on-disk copy of an [`AudioArtifact`]; deleted on drop.
#[derive(Debug)]
pub struct TempAudioFile {
    file: tempfile::NamedTempFile,
}

impl TempAudioFile {
    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

/// Typed view of merged `speech` settings.
///
/// Fields the provider's schema does not declare stay `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VoiceSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stability: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity_boost: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_speaker_boost: Option<bool>,
}

impl VoiceSettings {
    pub fn from_settings(settings: &SettingsMap) -> Self {
        let text = |key: &str| settings.get(key).and_then(|v| v.as_str()).map(str::to_string);
        let number = |key: &str| settings.get(key).and_then(|v| v.as_f64());
        Self {
            voice: text("voice").or_else(|| text("voice_id")),
            model: text("model").or_else(|| text("model_id")),
            format: text("format").or_else(|| text("output_format")),
            stability: number("stability"),
            similarity_boost: number("similarity_boost"),
            style: number("style"),
            speed: number("speed"),
            use_speaker_boost: settings.get("use_speaker_boost").and_then(|v| v.as_bool()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn voice_settings_reads_known_keys() {
        let mut settings = SettingsMap::new();
        settings.insert("voice_id".into(), json!("rachel"));
        settings.insert("stability".into(), json!(0.8));
        settings.insert("speed".into(), json!(1.0));
        settings.insert("use_speaker_boost".into(), json!(true));

        let voice = VoiceSettings::from_settings(&settings);
        assert_eq!(voice.voice.as_deref(), Some("rachel"));
        assert_eq!(voice.stability, Some(0.8));
        assert_eq!(voice.speed, Some(1.0));
        assert_eq!(voice.use_speaker_boost, Some(true));
        assert_eq!(voice.style, None);
    }

    #[test]
    fn temp_file_is_removed_on_drop() {
        let artifact = AudioArtifact {
            provider_id: "mock".into(),
            data: vec![1, 2, 3],
            format: "mp3".into(),
            sample_rate: None,
            duration: None,
        };
        let path = {
            let temp = artifact.to_temp_file().unwrap();
            assert_eq!(std::fs::read(temp.path()).unwrap(), vec![1, 2, 3]);
            assert!(temp.path().to_string_lossy().ends_with(".mp3"));
            temp.path().to_path_buf()
        };
        assert!(!path.exists());
    }
}
