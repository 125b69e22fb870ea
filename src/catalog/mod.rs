//! Provider descriptor catalog.
//!
//! The catalog is built once (usually via [`ProviderCatalog::with_builtin_providers`]
//! plus any application-specific registrations) and shared read-only by the hub.
//! Lookups go through an alias index so `"google"` and `"gemini"` resolve to the
//! same descriptor.

pub mod builtin;
pub mod descriptor;

pub use descriptor::{
    API_KEY_FIELD, BASE_URL_FIELD, DefaultOptions, FieldConstraints, FieldKind, FieldScope,
    FieldSpec, ProviderDescriptor, ProviderDescriptorBuilder,
};

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{HubError, Result};
use crate::types::Capability;

#[derive(Debug, Clone, Default)]
pub struct ProviderCatalog {
    /// Registration order.
    descriptors: Vec<Arc<ProviderDescriptor>>,
    by_id: HashMap<String, usize>,
    /// alias -> canonical id, and id -> id for O(1) canonical lookups.
    alias_index: HashMap<String, String>,
}

impl ProviderCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a catalog with every compiled-in provider pre-registered.
    pub fn with_builtin_providers() -> Self {
        let mut catalog = Self::new();
        for descriptor in builtin::builtin_descriptors() {
            catalog.register(descriptor);
        }
        catalog
    }

    /// Register a descriptor. A descriptor with the same id replaces the
    /// previous one in place, keeping its position in the listing order.
    pub fn register(&mut self, descriptor: ProviderDescriptor) {
        let id = descriptor.id.clone();
        let aliases = descriptor.aliases.clone();
        let descriptor = Arc::new(descriptor);

        match self.by_id.get(&id) {
            Some(&idx) => self.descriptors[idx] = descriptor,
            None => {
                self.by_id.insert(id.clone(), self.descriptors.len());
                self.descriptors.push(descriptor);
            }
        }

        // Ids take precedence over any alias registered earlier.
        self.alias_index.insert(id.clone(), id.clone());
        for alias in aliases {
            self.insert_alias(&id, &alias);
        }
    }

    /// Map an extra alias onto an existing provider id.
    pub fn add_alias(&mut self, id: &str, alias: impl Into<String>) {
        self.insert_alias(id, &alias.into());
    }

    /// An alias never shadows a registered id or another provider's alias.
    fn insert_alias(&mut self, id: &str, alias: &str) {
        let alias = alias.trim().to_lowercase();
        match self.alias_index.get(&alias) {
            Some(owner) if owner != id => {
                tracing::warn!(
                    provider = %id,
                    alias = %alias,
                    taken_by = %owner,
                    "Ignoring provider alias that is already taken"
                );
            }
            Some(_) => {}
            None => {
                self.alias_index.insert(alias, id.to_string());
            }
        }
    }

    /// Canonical id for `id_or_alias`; unknown ids are returned unchanged.
    pub fn canonical_id(&self, id_or_alias: &str) -> String {
        let key = id_or_alias.trim();
        self.alias_index
            .get(key)
            .or_else(|| self.alias_index.get(&key.to_lowercase()))
            .cloned()
            .unwrap_or_else(|| key.to_string())
    }

    /// Look up by id or alias.
    pub fn resolve(&self, id_or_alias: &str) -> Option<&Arc<ProviderDescriptor>> {
        let id = self.canonical_id(id_or_alias);
        self.by_id.get(&id).map(|&idx| &self.descriptors[idx])
    }

    pub fn get_descriptor(&self, id_or_alias: &str) -> Result<Arc<ProviderDescriptor>> {
        self.resolve(id_or_alias)
            .cloned()
            .ok_or_else(|| HubError::NotFound(id_or_alias.to_string()))
    }

    /// Descriptors in registration order, optionally filtered by capability.
    pub fn list_descriptors(&self, capability: Option<Capability>) -> Vec<Arc<ProviderDescriptor>> {
        self.descriptors
            .iter()
            .filter(|d| capability.is_none_or(|cap| d.supports(cap)))
            .cloned()
            .collect()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.descriptors.iter().map(|d| d.id.as_str())
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}
