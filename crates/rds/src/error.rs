//! Error types for RDS DSN configuration
use iamdsn_cache::{BoxError, GenerationError};
use thiserror::Error;

/// Result type for configuration and DSN operations
pub type Result<T> = std::result::Result<T, Error>;

/// Settings error types
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Invalid configuration value
    #[error("Invalid configuration: {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    /// Missing required configuration
    #[error("Missing required configuration: {field}")]
    MissingRequired { field: String },
}

impl ConfigError {
    pub(crate) fn invalid(field: &str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn missing(field: &str) -> Self {
        Self::MissingRequired {
            field: field.to_string(),
        }
    }
}

/// Errors raised while building or using a [`SecretBackedConfig`](crate::SecretBackedConfig)
#[derive(Debug, Error)]
pub enum Error {
    /// Settings are incomplete or malformed
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Certificate material could not be loaded or parsed
    #[error("store: could not load certificates: {reason}")]
    TrustMaterial {
        /// The failure reason
        reason: String,
        /// The underlying error
        #[source]
        source: Option<BoxError>,
    },

    /// The TLS profile registry refused the profile
    #[error("store: could not register TLS profile '{profile}': {reason}")]
    Registration {
        /// The profile name
        profile: String,
        /// The rejection reason
        reason: String,
    },

    /// Generating a DSN failed
    #[error(transparent)]
    Generation(#[from] GenerationError),

    /// The forced refresh performed during construction failed
    #[error("could not get first DSN: {0}")]
    InitialRefresh(#[source] GenerationError),
}

impl Error {
    /// Create a trust material error without an underlying source
    pub fn trust_material<S: Into<String>>(reason: S) -> Self {
        Self::TrustMaterial {
            reason: reason.into(),
            source: None,
        }
    }

    /// Create a trust material error wrapping the loader or parser failure
    pub fn trust_material_with<S, E>(reason: S, source: E) -> Self
    where
        S: Into<String>,
        E: Into<BoxError>,
    {
        Self::TrustMaterial {
            reason: reason.into(),
            source: Some(source.into()),
        }
    }

    /// Create a registration error
    pub fn registration(profile: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Registration {
            profile: profile.into(),
            reason: reason.into(),
        }
    }

    /// Check if this error can go away by calling `get` again
    ///
    /// Construction-time failures (settings, trust material, registration) are
    /// fatal; per-call generation failures defer to
    /// [`GenerationError::is_retryable`].
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Generation(e) | Self::InitialRefresh(e) => e.is_retryable(),
            Self::Config(_) | Self::TrustMaterial { .. } | Self::Registration { .. } => false,
        }
    }

    /// Underlying generation failure, if this error came from a refresh
    #[must_use]
    pub fn generation(&self) -> Option<&GenerationError> {
        match self {
            Self::Generation(e) | Self::InitialRefresh(e) => Some(e),
            _ => None,
        }
    }
}
