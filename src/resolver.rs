//! Effective configuration resolution.
//!
//! [`resolve`] merges a descriptor's defaults with a persisted record. Per
//! field the priority is: persisted value (if it passes the field's check),
//! descriptor default, then unset. Numbers outside `[min, max]` are clamped,
//! not rejected. Resolution is pure: the same inputs always produce the same
//! [`EffectiveConfig`] and therefore the same fingerprint.

use secrecy::{ExposeSecret, SecretString};
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{DefaultHasher, Hash, Hasher};

use crate::catalog::{
    API_KEY_FIELD, BASE_URL_FIELD, FieldKind, FieldScope, FieldSpec, ProviderDescriptor,
};
use crate::store::PersistedProviderConfig;
use crate::types::{Capability, SettingsMap, VoiceSettings};

/// Fully resolved configuration used to build and invoke a provider client.
#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectiveConfig {
    provider_id: String,
    #[serde(serialize_with = "redact_secret")]
    api_key: Option<SecretString>,
    base_url: String,
    capability_settings: BTreeMap<Capability, SettingsMap>,
    /// Required fields left without a value, as `api_key`, `base_url` or `<capability>.<key>`.
    unset: Vec<String>,
}

fn redact_secret<S: Serializer>(key: &Option<SecretString>, s: S) -> Result<S::Ok, S::Error> {
    match key {
        Some(_) => s.serialize_some("[REDACTED]"),
        None => s.serialize_none(),
    }
}

impl EffectiveConfig {
    pub fn provider_id(&self) -> &str {
        &self.provider_id
    }

    pub fn api_key(&self) -> Option<&SecretString> {
        self.api_key.as_ref()
    }

    /// Resolved endpoint; empty when neither the record nor the descriptor has one.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn settings(&self, capability: Capability) -> Option<&SettingsMap> {
        self.capability_settings.get(&capability)
    }

    pub fn capability_settings(&self) -> &BTreeMap<Capability, SettingsMap> {
        &self.capability_settings
    }

    pub fn unset(&self) -> &[String] {
        &self.unset
    }

    pub fn is_complete(&self) -> bool {
        self.unset.is_empty()
    }

    /// Typed voice parameters from the resolved `speech` settings.
    pub fn voice_settings(&self) -> VoiceSettings {
        self.settings(Capability::Speech)
            .map(VoiceSettings::from_settings)
            .unwrap_or_default()
    }

    /// Stable digest of the whole configuration, secret included.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        // Canonical form: BTreeMap keys are ordered, the secret is redacted here
        // and hashed separately below.
        serde_json::to_string(self)
            .unwrap_or_default()
            .hash(&mut hasher);
        self.api_key
            .as_ref()
            .map(|k| k.expose_secret().to_string())
            .hash(&mut hasher);
        hasher.finish()
    }

    /// Render a fingerprint for logs.
    pub fn fingerprint_hex(&self) -> String {
        format!("{:016x}", self.fingerprint())
    }
}

impl PartialEq for EffectiveConfig {
    fn eq(&self, other: &Self) -> bool {
        self.provider_id == other.provider_id
            && self.api_key.as_ref().map(|k| k.expose_secret())
                == other.api_key.as_ref().map(|k| k.expose_secret())
            && self.base_url == other.base_url
            && self.capability_settings == other.capability_settings
            && self.unset == other.unset
    }
}

impl fmt::Debug for EffectiveConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectiveConfig")
            .field("provider_id", &self.provider_id)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("base_url", &self.base_url)
            .field("capability_settings", &self.capability_settings)
            .field("unset", &self.unset)
            .finish()
    }
}

/// Merge descriptor defaults with a persisted record.
pub fn resolve(
    descriptor: &ProviderDescriptor,
    persisted: Option<&PersistedProviderConfig>,
) -> EffectiveConfig {
    let mut unset = Vec::new();

    let api_key = resolve_api_key(descriptor, persisted, &mut unset);
    let base_url = resolve_base_url(descriptor, persisted, &mut unset);

    let mut capability_settings = BTreeMap::new();
    for &capability in &descriptor.capabilities {
        let stored = persisted
            .map(|p| p.settings_for(capability))
            .unwrap_or_default();
        let mut settings = SettingsMap::new();
        for field in descriptor.capability_fields(capability) {
            let value = stored
                .get(&field.key)
                .and_then(|v| apply_constraints(field, v))
                .or_else(|| field.default.clone());
            match value {
                Some(v) => {
                    settings.insert(field.key.clone(), v);
                }
                None if field.required => unset.push(format!("{capability}.{}", field.key)),
                None => {}
            }
        }
        capability_settings.insert(capability, settings);
    }

    EffectiveConfig {
        provider_id: descriptor.id.clone(),
        api_key,
        base_url,
        capability_settings,
        unset,
    }
}

fn resolve_api_key(
    descriptor: &ProviderDescriptor,
    persisted: Option<&PersistedProviderConfig>,
    unset: &mut Vec<String>,
) -> Option<SecretString> {
    let stored = persisted.and_then(|p| p.api_key());
    let Some(field) = descriptor.field(FieldScope::Credential, API_KEY_FIELD) else {
        return stored.map(|k| SecretString::from(k.to_string()));
    };

    let value = stored
        .map(|k| serde_json::Value::String(k.to_string()))
        .and_then(|v| apply_constraints(field, &v))
        .or_else(|| field.default.clone())
        .and_then(|v| v.as_str().map(str::to_string));

    if value.is_none() && field.required {
        unset.push(API_KEY_FIELD.to_string());
    }
    value.map(SecretString::from)
}

fn resolve_base_url(
    descriptor: &ProviderDescriptor,
    persisted: Option<&PersistedProviderConfig>,
    unset: &mut Vec<String>,
) -> String {
    let field = descriptor.field(FieldScope::Endpoint, BASE_URL_FIELD);
    let stored = persisted
        .and_then(|p| p.base_url.as_deref())
        .map(|u| serde_json::Value::String(u.to_string()))
        .and_then(|v| match field {
            Some(field) => apply_constraints(field, &v),
            None => check_url(&v),
        })
        .and_then(|v| v.as_str().map(str::to_string));

    let url = stored
        .or_else(|| descriptor.default_options().base_url)
        .unwrap_or_default();

    if url.is_empty() && field.is_some_and(|f| f.required) {
        unset.push(BASE_URL_FIELD.to_string());
    }
    url
}

/// Check `value` against `spec`; returns the accepted (possibly clamped) value,
/// or `None` when the value must be ignored.
pub fn apply_constraints(spec: &FieldSpec, value: &serde_json::Value) -> Option<serde_json::Value> {
    match spec.kind {
        FieldKind::Number => {
            let original = value.as_f64()?;
            let mut n = original;
            if let Some(min) = spec.constraints.min {
                n = n.max(min);
            }
            if let Some(max) = spec.constraints.max {
                n = n.min(max);
            }
            if n == original {
                return Some(value.clone());
            }
            // Integers stay integers when the bound allows it.
            if (value.is_i64() || value.is_u64()) && n.fract() == 0.0 {
                return Some(serde_json::Value::from(n as i64));
            }
            serde_json::Number::from_f64(n).map(serde_json::Value::Number)
        }
        FieldKind::Boolean => value.is_boolean().then(|| value.clone()),
        FieldKind::Enum => {
            let s = value.as_str()?;
            match &spec.constraints.allowed_values {
                Some(allowed) => allowed.iter().any(|a| a == s).then(|| value.clone()),
                None => non_empty_string(value),
            }
        }
        FieldKind::Url => check_url(value),
        FieldKind::Secret | FieldKind::Text => non_empty_string(value),
    }
}

fn non_empty_string(value: &serde_json::Value) -> Option<serde_json::Value> {
    let s = value.as_str()?.trim();
    (!s.is_empty()).then(|| serde_json::Value::String(s.to_string()))
}

fn check_url(value: &serde_json::Value) -> Option<serde_json::Value> {
    let s = value.as_str()?.trim();
    let url = reqwest::Url::parse(s).ok()?;
    matches!(url.scheme(), "http" | "https")
        .then(|| serde_json::Value::String(s.trim_end_matches('/').to_string()))
}

/// Layer request-scoped overrides over resolved capability settings.
///
/// Overrides for schema fields pass the same checks as persisted values
/// (invalid ones are dropped, numbers clamped); keys the schema does not
/// declare are passed through untouched. `null` leaves the base value alone.
pub fn merge_overrides(
    descriptor: &ProviderDescriptor,
    capability: Capability,
    base: &SettingsMap,
    overrides: &SettingsMap,
) -> SettingsMap {
    let mut merged = base.clone();
    for (key, value) in overrides {
        if value.is_null() {
            continue;
        }
        match descriptor.field(FieldScope::Capability(capability), key) {
            Some(field) => match apply_constraints(field, value) {
                Some(accepted) => {
                    merged.insert(key.clone(), accepted);
                }
                None => tracing::debug!(
                    provider = %descriptor.id,
                    capability = %capability,
                    field = %key,
                    "Ignoring invalid request override"
                ),
            },
            None => {
                merged.insert(key.clone(), value.clone());
            }
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use serde_json::json;

    fn voice_descriptor() -> ProviderDescriptor {
        ProviderDescriptor::builder("voicebox")
            .capability(Capability::Speech)
            .field(FieldSpec::api_key())
            .field(FieldSpec::base_url("https://api.voicebox.test/v1"))
            .field(FieldSpec::number(Capability::Speech, "stability", 0.5).range(0.0, 1.0))
            .field(FieldSpec::number(Capability::Speech, "speed", 1.0).range(0.7, 1.2))
            .field(
                FieldSpec::enumeration(Capability::Speech, "format", ["mp3", "wav"])
                    .with_default("mp3"),
            )
            .field(FieldSpec::boolean(Capability::Speech, "use_speaker_boost", true))
            .build()
            .unwrap()
    }

    fn record(value: serde_json::Value) -> PersistedProviderConfig {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn partial_update_keeps_sibling_defaults() {
        let p = record(json!({"apiKey": "k", "capabilitySettings": {"speech": {"stability": 0.8}}}));
        let cfg = resolve(&voice_descriptor(), Some(&p));
        let speech = cfg.settings(Capability::Speech).unwrap();
        assert_eq!(speech["stability"], json!(0.8));
        assert_eq!(speech["speed"], json!(1.0));
    }

    #[test]
    fn out_of_range_numbers_are_clamped() {
        let p = record(json!({"apiKey": "k", "capabilitySettings": {"speech": {"speed": 5.0, "stability": -1}}}));
        let cfg = resolve(&voice_descriptor(), Some(&p));
        let speech = cfg.settings(Capability::Speech).unwrap();
        assert_eq!(speech["speed"], json!(1.2));
        assert_eq!(speech["stability"], json!(0));
    }

    #[test]
    fn integer_settings_stay_integers() {
        let descriptor = ProviderDescriptor::builder("writer")
            .capability(Capability::Chat)
            .field(FieldSpec::api_key())
            .field(
                FieldSpec::number(Capability::Chat, "max_tokens", 1024.0)
                    .with_default(json!(1024))
                    .range(1.0, 4096.0),
            )
            .build()
            .unwrap();

        let p = record(json!({"apiKey": "k", "capabilitySettings": {"chat": {"max_tokens": 2048}}}));
        let chat = resolve(&descriptor, Some(&p)).settings(Capability::Chat).unwrap().clone();
        assert_eq!(chat["max_tokens"], json!(2048));
        assert!(chat["max_tokens"].is_u64());

        let p = record(json!({"apiKey": "k", "capabilitySettings": {"chat": {"max_tokens": 100000}}}));
        let chat = resolve(&descriptor, Some(&p)).settings(Capability::Chat).unwrap().clone();
        assert_eq!(chat["max_tokens"], json!(4096));

        let defaulted = resolve(&descriptor, Some(&record(json!({"apiKey": "k"}))));
        assert_eq!(defaulted.settings(Capability::Chat).unwrap()["max_tokens"], json!(1024));
    }

    #[test]
    fn invalid_values_fall_back_to_defaults() {
        let p = record(json!({
            "apiKey": "k",
            "baseUrl": "ftp://nope",
            "capabilitySettings": {"speech": {
                "format": "ogg",
                "use_speaker_boost": "yes",
                "speed": "fast",
                "unknown": 1,
            }}
        }));
        let cfg = resolve(&voice_descriptor(), Some(&p));
        let speech = cfg.settings(Capability::Speech).unwrap();
        assert_eq!(speech["format"], json!("mp3"));
        assert_eq!(speech["use_speaker_boost"], json!(true));
        assert_eq!(speech["speed"], json!(1.0));
        assert!(!speech.contains_key("unknown"));
        assert_eq!(cfg.base_url(), "https://api.voicebox.test/v1");
    }

    #[test]
    fn persisted_base_url_wins() {
        let p = record(json!({"apiKey": "k", "baseUrl": "https://proxy.local/v1/"}));
        let cfg = resolve(&voice_descriptor(), Some(&p));
        assert_eq!(cfg.base_url(), "https://proxy.local/v1");
    }

    #[test]
    fn missing_key_is_reported_unset() {
        let cfg = resolve(&voice_descriptor(), None);
        assert!(cfg.api_key().is_none());
        assert_eq!(cfg.unset(), ["api_key".to_string()]);
        assert!(!cfg.is_complete());
    }

    #[test]
    fn base_url_is_empty_without_any_default() {
        let d = ProviderDescriptor::builder("bare")
            .capability(Capability::Chat)
            .build()
            .unwrap();
        let cfg = resolve(&d, None);
        assert_eq!(cfg.base_url(), "");
        assert!(cfg.is_complete());
    }

    #[test]
    fn serialization_redacts_key_but_fingerprint_tracks_it() {
        let a = resolve(&voice_descriptor(), Some(&record(json!({"apiKey": "k1"}))));
        let b = resolve(&voice_descriptor(), Some(&record(json!({"apiKey": "k2"}))));
        let a_json = serde_json::to_string(&a).unwrap();
        assert!(!a_json.contains("k1"));
        assert_eq!(a_json, serde_json::to_string(&b).unwrap());
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn overrides_win_field_by_field() {
        let d = voice_descriptor();
        let cfg = resolve(&d, Some(&record(json!({"apiKey": "k"}))));
        let base = cfg.settings(Capability::Speech).unwrap();
        let overrides: SettingsMap = [
            ("speed".to_string(), json!(9.0)),
            ("format".to_string(), json!("flac")),
            ("seed".to_string(), json!(42)),
        ]
        .into_iter()
        .collect();

        let merged = merge_overrides(&d, Capability::Speech, base, &overrides);
        assert_eq!(merged["speed"], json!(1.2));
        assert_eq!(merged["format"], json!("mp3"));
        assert_eq!(merged["seed"], json!(42));
        assert_eq!(merged["stability"], json!(0.5));
    }

    proptest! {
        #[test]
        fn resolve_is_deterministic(
            key in proptest::option::of("[a-z0-9]{0,12}"),
            stability in proptest::option::of(-2.0f64..3.0),
            speed in proptest::option::of(-2.0f64..3.0),
            boost in proptest::option::of(any::<bool>()),
        ) {
            let mut speech = serde_json::Map::new();
            if let Some(v) = stability { speech.insert("stability".into(), json!(v)); }
            if let Some(v) = speed { speech.insert("speed".into(), json!(v)); }
            if let Some(v) = boost { speech.insert("use_speaker_boost".into(), json!(v)); }
            let p = record(json!({"apiKey": key, "capabilitySettings": {"speech": speech}}));

            let d = voice_descriptor();
            let first = resolve(&d, Some(&p));
            let second = resolve(&d, Some(&p));
            prop_assert_eq!(
                serde_json::to_string(&first).unwrap(),
                serde_json::to_string(&second).unwrap()
            );
            prop_assert_eq!(first.fingerprint(), second.fingerprint());

            let s = first.settings(Capability::Speech).unwrap();
            let clamped = s["speed"].as_f64().unwrap();
            prop_assert!((0.7..=1.2).contains(&clamped));
        }
    }
}
