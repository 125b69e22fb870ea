//! Provider descriptors and field schemas.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::{HubError, Result};
use crate::types::{Capability, CapabilitySettingsMap};

/// Key of the credential field in every schema.
pub const API_KEY_FIELD: &str = "api_key";
/// Key of the endpoint field in every schema.
pub const BASE_URL_FIELD: &str = "base_url";

const DEFAULT_LOCALE: &str = "en";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Secret,
    Url,
    Number,
    Boolean,
    Enum,
    /// Free-form string (voice ids, model names outside a fixed list).
    Text,
}

/// Where a field lives inside a persisted record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "scope", content = "capability")]
pub enum FieldScope {
    /// The `apiKey` slot.
    Credential,
    /// The `baseUrl` slot.
    Endpoint,
    /// `capabilitySettings[<tag>][<key>]`.
    Capability(Capability),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldConstraints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    /// Slider granularity; presentation metadata only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_values: Option<Vec<String>>,
}

/// One configurable field of a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSpec {
    pub key: String,
    pub kind: FieldKind,
    pub scope: FieldScope,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
    #[serde(default)]
    pub constraints: FieldConstraints,
    /// Unset after resolution means the provider cannot be instantiated.
    #[serde(default)]
    pub required: bool,
    /// Locale → label, for settings forms.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

impl FieldSpec {
    fn new(scope: FieldScope, key: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            key: key.into(),
            kind,
            scope,
            default: None,
            constraints: FieldConstraints::default(),
            required: false,
            labels: BTreeMap::new(),
        }
    }

    /// The credential field; required unless relaxed with [`FieldSpec::optional`].
    pub fn api_key() -> Self {
        Self::new(FieldScope::Credential, API_KEY_FIELD, FieldKind::Secret).required()
    }

    /// The endpoint field with its default URL.
    pub fn base_url(default: impl Into<String>) -> Self {
        Self::new(FieldScope::Endpoint, BASE_URL_FIELD, FieldKind::Url)
            .with_default(serde_json::Value::String(default.into()))
    }

    pub fn number(capability: Capability, key: impl Into<String>, default: f64) -> Self {
        Self::new(FieldScope::Capability(capability), key, FieldKind::Number)
            .with_default(serde_json::json!(default))
    }

    pub fn boolean(capability: Capability, key: impl Into<String>, default: bool) -> Self {
        Self::new(FieldScope::Capability(capability), key, FieldKind::Boolean)
            .with_default(serde_json::Value::Bool(default))
    }

    pub fn enumeration<I, S>(capability: Capability, key: impl Into<String>, allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut spec = Self::new(FieldScope::Capability(capability), key, FieldKind::Enum);
        spec.constraints.allowed_values = Some(allowed.into_iter().map(Into::into).collect());
        spec
    }

    pub fn text(capability: Capability, key: impl Into<String>) -> Self {
        Self::new(FieldScope::Capability(capability), key, FieldKind::Text)
    }

    pub fn with_default(mut self, value: impl Into<serde_json::Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn range(mut self, min: f64, max: f64) -> Self {
        self.constraints.min = Some(min);
        self.constraints.max = Some(max);
        self
    }

    pub fn step(mut self, step: f64) -> Self {
        self.constraints.step = Some(step);
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn label(mut self, locale: impl Into<String>, text: impl Into<String>) -> Self {
        self.labels.insert(locale.into(), text.into());
        self
    }

    pub fn capability(&self) -> Option<Capability> {
        match self.scope {
            FieldScope::Capability(cap) => Some(cap),
            _ => None,
        }
    }
}

/// Descriptor defaults in the persisted-record shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DefaultOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    pub capability_settings: CapabilitySettingsMap,
}

/// Static metadata describing one provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderDescriptor {
    pub id: String,
    /// Locale → display name.
    pub names: BTreeMap<String, String>,
    #[serde(default)]
    pub description: String,
    pub capabilities: BTreeSet<Capability>,
    pub field_schema: Vec<FieldSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
}

impl ProviderDescriptor {
    pub fn builder(id: impl Into<String>) -> ProviderDescriptorBuilder {
        ProviderDescriptorBuilder {
            id: id.into(),
            names: BTreeMap::new(),
            description: String::new(),
            capabilities: BTreeSet::new(),
            field_schema: Vec::new(),
            aliases: Vec::new(),
        }
    }

    /// Display name for `locale`, falling back to English, then to the id.
    pub fn name(&self, locale: &str) -> &str {
        self.names
            .get(locale)
            .or_else(|| self.names.get(DEFAULT_LOCALE))
            .map(String::as_str)
            .unwrap_or(&self.id)
    }

    pub fn supports(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    pub fn field(&self, scope: FieldScope, key: &str) -> Option<&FieldSpec> {
        self.field_schema
            .iter()
            .find(|f| f.scope == scope && f.key == key)
    }

    /// Fields belonging to one capability, in schema order.
    pub fn capability_fields(&self, capability: Capability) -> impl Iterator<Item = &FieldSpec> {
        self.field_schema
            .iter()
            .filter(move |f| f.scope == FieldScope::Capability(capability))
    }

    /// Defaults assembled from the schema.
    pub fn default_options(&self) -> DefaultOptions {
        let mut options = DefaultOptions::default();
        for field in &self.field_schema {
            match (field.scope, &field.default) {
                (FieldScope::Endpoint, Some(serde_json::Value::String(url))) => {
                    options.base_url = Some(url.trim().trim_end_matches('/').to_string());
                }
                (FieldScope::Capability(cap), Some(value)) => {
                    options
                        .capability_settings
                        .entry(cap.as_str().to_string())
                        .or_default()
                        .insert(field.key.clone(), value.clone());
                }
                _ => {}
            }
        }
        options
    }
}

pub struct ProviderDescriptorBuilder {
    id: String,
    names: BTreeMap<String, String>,
    description: String,
    capabilities: BTreeSet<Capability>,
    field_schema: Vec<FieldSpec>,
    aliases: Vec<String>,
}

impl ProviderDescriptorBuilder {
    pub fn name(mut self, locale: impl Into<String>, name: impl Into<String>) -> Self {
        self.names.insert(locale.into(), name.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn capability(mut self, capability: Capability) -> Self {
        self.capabilities.insert(capability);
        self
    }

    pub fn capabilities<I: IntoIterator<Item = Capability>>(mut self, caps: I) -> Self {
        self.capabilities.extend(caps);
        self
    }

    pub fn field(mut self, field: FieldSpec) -> Self {
        self.field_schema.push(field);
        self
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    /// Validate and freeze the descriptor.
    pub fn build(self) -> Result<ProviderDescriptor> {
        if self.id.trim().is_empty() {
            return Err(HubError::InvalidParameter(
                "Provider id cannot be empty".to_string(),
            ));
        }

        let mut seen = BTreeSet::new();
        for field in &self.field_schema {
            let scope_tag = match field.scope {
                FieldScope::Credential => "credential".to_string(),
                FieldScope::Endpoint => "endpoint".to_string(),
                FieldScope::Capability(cap) => cap.as_str().to_string(),
            };
            if !seen.insert((scope_tag.clone(), field.key.clone())) {
                return Err(HubError::InvalidParameter(format!(
                    "Duplicate field '{}' in scope '{}' for provider {}",
                    field.key, scope_tag, self.id
                )));
            }
            if let Some(cap) = field.capability()
                && !self.capabilities.contains(&cap)
            {
                return Err(HubError::InvalidParameter(format!(
                    "Field '{}' targets capability '{}' which provider {} does not declare",
                    field.key, cap, self.id
                )));
            }
            if let Some(default) = &field.default
                && !default_is_valid(field, default)
            {
                return Err(HubError::InvalidParameter(format!(
                    "Default for field '{}' of provider {} violates its own constraints",
                    field.key, self.id
                )));
            }
        }

        Ok(ProviderDescriptor {
            id: self.id,
            names: self.names,
            description: self.description,
            capabilities: self.capabilities,
            field_schema: self.field_schema,
            aliases: self.aliases,
        })
    }
}

fn default_is_valid(field: &FieldSpec, default: &serde_json::Value) -> bool {
    match crate::resolver::apply_constraints(field, default) {
        Some(accepted) if accepted.is_number() => accepted.as_f64() == default.as_f64(),
        // URLs are accepted in normalized form (no trailing slash).
        Some(_) if field.kind == FieldKind::Url => true,
        Some(accepted) => accepted == *default,
        None => false,
    }
}
