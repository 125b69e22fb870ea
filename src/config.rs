//! Hub options.
//!
//! Options can be built in code, deserialized from an application config file,
//! or read from `PROVIDER_HUB_*` environment variables.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{HubError, Result};

pub const DEFAULT_NAMESPACE: &str = "provider-hub";
pub const DEFAULT_MAX_ENTRIES: usize = 100;

pub const ENV_NAMESPACE: &str = "PROVIDER_HUB_NAMESPACE";
pub const ENV_STORE_DIR: &str = "PROVIDER_HUB_STORE_DIR";
pub const ENV_CACHE_MAX_ENTRIES: &str = "PROVIDER_HUB_CACHE_MAX_ENTRIES";
pub const ENV_CLIENT_TTL_SECS: &str = "PROVIDER_HUB_CLIENT_TTL_SECS";

/// Instance cache bounds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheOptions {
    /// Maximum number of live provider instances (LRU eviction beyond).
    pub max_entries: usize,
    /// Rebuild instances older than this, even if their configuration is unchanged.
    #[serde(with = "optional_secs")]
    pub client_ttl: Option<Duration>,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
            client_ttl: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HubOptions {
    /// Storage namespace; records live under `<store_dir>/<namespace>/`.
    pub namespace: String,
    /// Directory for the JSON file store. `None` keeps configuration in memory.
    pub store_dir: Option<PathBuf>,
    pub cache: CacheOptions,
}

impl Default for HubOptions {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            store_dir: None,
            cache: CacheOptions::default(),
        }
    }
}

impl HubOptions {
    /// Read options from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read options through `lookup`; unset or blank variables keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let mut options = Self::default();
        if let Some(namespace) = get(ENV_NAMESPACE) {
            options.namespace = namespace;
        }
        if let Some(dir) = get(ENV_STORE_DIR) {
            options.store_dir = Some(PathBuf::from(dir));
        }
        if let Some(max) = get(ENV_CACHE_MAX_ENTRIES) {
            options.cache.max_entries = parse_number(ENV_CACHE_MAX_ENTRIES, &max)?;
        }
        if let Some(secs) = get(ENV_CLIENT_TTL_SECS) {
            let secs: u64 = parse_number(ENV_CLIENT_TTL_SECS, &secs)?;
            options.cache.client_ttl = (secs > 0).then(|| Duration::from_secs(secs));
        }
        Ok(options)
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| HubError::InvalidParameter(format!("{key} must be a non-negative integer, got '{value}'")))
}

mod optional_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(ttl: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match ttl {
            Some(d) => s.serialize_some(&d.as_secs()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs))
    }
}
