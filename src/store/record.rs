//! Persisted per-provider configuration records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{Capability, CapabilitySettingsMap, SettingsMap};

/// A partially filled configuration record, as written by the settings UI.
///
/// Every field is optional on load so records written by older builds (or
/// with fields this build does not know) stay readable.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedProviderConfig {
    #[serde(default)]
    pub provider_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default)]
    pub capability_settings: CapabilitySettingsMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl PersistedProviderConfig {
    pub fn new(provider_id: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
            ..Default::default()
        }
    }

    /// The stored key, treating blank strings as absent.
    pub fn api_key(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }

    /// Persisted settings for `capability`, folding legacy tag spellings
    /// (`tts` for `speech`) under the canonical one. The canonical tag wins
    /// field by field.
    pub fn settings_for(&self, capability: Capability) -> SettingsMap {
        let mut merged = SettingsMap::new();
        let mut canonical = None;
        for (tag, settings) in &self.capability_settings {
            if tag == capability.as_str() {
                canonical = Some(settings);
            } else if Capability::parse(tag) == Some(capability) {
                merged.extend(settings.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
        }
        if let Some(settings) = canonical {
            merged.extend(settings.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        merged
    }
}

impl fmt::Debug for PersistedProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistedProviderConfig")
            .field("provider_id", &self.provider_id)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("base_url", &self.base_url)
            .field("capability_settings", &self.capability_settings)
            .field("updated_at", &self.updated_at)
            .finish()
    }
}
