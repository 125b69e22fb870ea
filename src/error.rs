//! Error Handling Module
//!
//! A single error enum covers every failure the hub can surface:
//! - Configuration errors (`NotFound`, `FactoryMissing`)
//! - User-actionable errors (`NotConfigured`)
//! - Programming errors (`UnsupportedCapability`, `InvalidParameter`)
//! - Downstream failures (`Provider`) with the original cause preserved
//!
//! # Example
//!
//! ```rust,ignore
//! use provider_hub::error::{ErrorCategory, HubError};
//!
//! let error = HubError::NotConfigured {
//!     provider_id: "openai".into(),
//!     missing: vec!["api_key".into()],
//! };
//! assert_eq!(error.category(), ErrorCategory::User);
//! assert!(error.is_user_actionable());
//! ```

use thiserror::Error;

use crate::types::Capability;

/// Boxed error type returned by provider clients and factories.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type used across the crate.
pub type Result<T> = std::result::Result<T, HubError>;

/// Coarse classification of a [`HubError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Catalog or wiring problem (unknown provider, missing factory).
    Configuration,
    /// The user has to supply something (credentials, required settings).
    User,
    /// Caller misuse (capability mismatch, malformed parameters).
    Programming,
    /// Failure reported by the downstream provider.
    Provider,
    /// Persistence medium failure.
    Storage,
    /// The caller cancelled the operation.
    Cancelled,
}

#[derive(Debug, Error)]
pub enum HubError {
    /// No descriptor is registered for the provider id.
    #[error("Unknown provider: {0}")]
    NotFound(String),

    /// A required field resolved to the unset sentinel.
    #[error("Provider {provider_id} is not configured (missing: {})", missing.join(", "))]
    NotConfigured {
        provider_id: String,
        missing: Vec<String>,
    },

    /// The descriptor does not declare the requested capability.
    #[error("Provider {provider_id} does not support capability '{capability}'")]
    UnsupportedCapability {
        provider_id: String,
        capability: Capability,
    },

    /// Downstream failure; `source` is the untouched original cause.
    #[error("Provider {provider_id} failed: {source}")]
    Provider {
        provider_id: String,
        #[source]
        source: BoxError,
    },

    /// A descriptor exists but no factory was registered to build clients for it.
    #[error("No client factory registered for provider: {0}")]
    FactoryMissing(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

impl HubError {
    /// Wrap a downstream error for `provider_id` without altering it.
    pub fn provider(provider_id: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Provider {
            provider_id: provider_id.into(),
            source: source.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::NotFound(_) | Self::FactoryMissing(_) => ErrorCategory::Configuration,
            Self::NotConfigured { .. } => ErrorCategory::User,
            Self::UnsupportedCapability { .. } | Self::InvalidParameter(_) => {
                ErrorCategory::Programming
            }
            Self::Provider { .. } => ErrorCategory::Provider,
            Self::Storage(_) | Self::Serialization(_) | Self::Io(_) => ErrorCategory::Storage,
            Self::Cancelled => ErrorCategory::Cancelled,
        }
    }

    /// Whether the error should be surfaced as a prompt to the user
    /// (e.g. "enter your API key") rather than as a fault.
    pub fn is_user_actionable(&self) -> bool {
        matches!(self.category(), ErrorCategory::User)
    }

    /// Downcast the preserved downstream cause, if this is a provider error.
    pub fn provider_cause<E: std::error::Error + 'static>(&self) -> Option<&E> {
        match self {
            Self::Provider { source, .. } => source.downcast_ref::<E>(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Error)]
    #[error("quota exceeded")]
    struct QuotaExceeded;

    #[test]
    fn provider_error_keeps_original_cause() {
        let err = HubError::provider("elevenlabs", QuotaExceeded);
        assert_eq!(err.category(), ErrorCategory::Provider);
        assert!(err.provider_cause::<QuotaExceeded>().is_some());

        let source = std::error::Error::source(&err).expect("source");
        assert_eq!(source.to_string(), "quota exceeded");
        assert_eq!(err.to_string(), "Provider elevenlabs failed: quota exceeded");
    }

    #[test]
    fn not_configured_lists_missing_fields() {
        let err = HubError::NotConfigured {
            provider_id: "openai".into(),
            missing: vec!["api_key".into(), "region".into()],
        };
        assert!(err.is_user_actionable());
        assert_eq!(
            err.to_string(),
            "Provider openai is not configured (missing: api_key, region)"
        );
    }

    #[test]
    fn serde_json_errors_convert() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: HubError = json_err.into();
        assert!(matches!(err, HubError::Serialization(_)));
        assert_eq!(err.category(), ErrorCategory::Storage);
    }
}
