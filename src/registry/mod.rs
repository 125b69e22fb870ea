//! Client factories and cached provider instances.
//!
//! A [`ProviderFactory`] turns an [`EffectiveConfig`] into a ready-to-use
//! [`ProviderClient`]. The [`InstanceCache`] owns the resulting
//! [`ProviderInstance`]s and decides when to reuse or rebuild them.

pub mod cache;

pub use cache::InstanceCache;

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::error::BoxError;
use crate::resolver::EffectiveConfig;
use crate::traits::ProviderClient;

/// Everything a factory gets besides the provider's own configuration.
#[derive(Debug, Clone)]
pub struct BuildContext {
    /// Canonical provider id being built.
    pub provider_id: String,
    /// Shared HTTP client. Factories should prefer it over building their own
    /// so connection pools are reused across providers.
    pub http_client: reqwest::Client,
}

/// Builds clients for one provider id.
///
/// Construction may suspend (e.g. to validate credentials). Errors are
/// surfaced to callers as [`crate::HubError::Provider`] with the cause intact.
#[async_trait]
pub trait ProviderFactory: Send + Sync {
    async fn build(
        &self,
        config: &EffectiveConfig,
        ctx: &BuildContext,
    ) -> Result<Arc<dyn ProviderClient>, BoxError>;
}

/// A live client plus the configuration it was built from.
///
/// Cloning is cheap and keeps identity: use [`ProviderInstance::ptr_eq`] to
/// tell whether two handles refer to the same construction.
#[derive(Clone)]
pub struct ProviderInstance {
    inner: Arc<InstanceInner>,
}

struct InstanceInner {
    id: Uuid,
    client: Arc<dyn ProviderClient>,
    config: EffectiveConfig,
    fingerprint: u64,
    created_at: Instant,
}

impl ProviderInstance {
    pub(crate) fn new(client: Arc<dyn ProviderClient>, config: EffectiveConfig) -> Self {
        let fingerprint = config.fingerprint();
        Self {
            inner: Arc::new(InstanceInner {
                id: Uuid::new_v4(),
                client,
                config,
                fingerprint,
                created_at: Instant::now(),
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn provider_id(&self) -> &str {
        self.inner.config.provider_id()
    }

    pub fn client(&self) -> &Arc<dyn ProviderClient> {
        &self.inner.client
    }

    pub fn config(&self) -> &EffectiveConfig {
        &self.inner.config
    }

    pub fn fingerprint(&self) -> u64 {
        self.inner.fingerprint
    }

    pub fn age(&self) -> Duration {
        self.inner.created_at.elapsed()
    }

    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }
}

impl fmt::Debug for ProviderInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderInstance")
            .field("id", &self.inner.id)
            .field("provider_id", &self.provider_id())
            .field("fingerprint", &format_args!("{:016x}", self.inner.fingerprint))
            .finish_non_exhaustive()
    }
}
