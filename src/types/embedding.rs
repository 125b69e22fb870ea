//! Embedding types

use crate::types::SettingsMap;

#[derive(Debug, Clone, Default)]
pub struct EmbeddingRequest {
    pub input: Vec<String>,
    pub settings: SettingsMap,
}

impl EmbeddingRequest {
    pub fn new(input: Vec<String>) -> Self {
        Self {
            input,
            settings: SettingsMap::new(),
        }
    }

    pub fn with_setting(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.settings.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct EmbeddingResponse {
    pub vectors: Vec<Vec<f32>>,
    pub model: Option<String>,
}
