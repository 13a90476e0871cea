//! Error types for value generation
use thiserror::Error;

/// Boxed error used for collaborator failures (providers, builders, loaders).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result type for generation operations
pub type Result<T> = std::result::Result<T, GenerationError>;

/// Failure raised while producing a fresh cached value.
///
/// A failed generation never touches the cached state, so every variant can be
/// retried by calling [`CredentialCache::get`](crate::CredentialCache::get)
/// again.
#[derive(Error, Debug)]
pub enum GenerationError {
    /// The credential provider failed to issue credentials
    #[error("credential issuance failed: {reason}")]
    Issuance {
        /// The failure reason
        reason: String,
        /// The underlying error
        #[source]
        source: Option<BoxError>,
    },

    /// The connection string could not be built
    #[error("could not build connection string: {reason}")]
    Build {
        /// The failure reason
        reason: String,
        /// The underlying error
        #[source]
        source: Option<BoxError>,
    },

    /// Generation reported success but produced nothing usable
    #[error("unknown error building connection string (bad credentials?): result was empty")]
    Empty,
}

impl GenerationError {
    /// Create an issuance error without an underlying source
    pub fn issuance<S: Into<String>>(reason: S) -> Self {
        Self::Issuance {
            reason: reason.into(),
            source: None,
        }
    }

    /// Create an issuance error wrapping the provider's failure
    pub fn issuance_with<S, E>(reason: S, source: E) -> Self
    where
        S: Into<String>,
        E: Into<BoxError>,
    {
        Self::Issuance {
            reason: reason.into(),
            source: Some(source.into()),
        }
    }

    /// Create a build error without an underlying source
    pub fn build<S: Into<String>>(reason: S) -> Self {
        Self::Build {
            reason: reason.into(),
            source: None,
        }
    }

    /// Create a build error wrapping the builder's failure
    pub fn build_with<S, E>(reason: S, source: E) -> Self
    where
        S: Into<String>,
        E: Into<BoxError>,
    {
        Self::Build {
            reason: reason.into(),
            source: Some(source.into()),
        }
    }

    /// Stage of the refresh pipeline that failed, for log fields and metrics labels
    #[must_use]
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Issuance { .. } => "issuance",
            Self::Build { .. } | Self::Empty => "build",
        }
    }

    /// Check if calling `get` again may succeed without outside intervention
    ///
    /// Issuance failures are usually transient (throttling, network). A build
    /// failure means the inputs themselves are unusable.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Issuance { .. } | Self::Empty => true,
            Self::Build { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn issuance_with_keeps_source() {
        let err = GenerationError::issuance_with(
            "sts unavailable",
            std::io::Error::other("connection reset"),
        );

        assert_eq!(err.to_string(), "credential issuance failed: sts unavailable");
        assert_eq!(
            err.source().map(ToString::to_string).as_deref(),
            Some("connection reset")
        );
        assert_eq!(err.stage(), "issuance");
        assert!(err.is_retryable());
    }

    #[test]
    fn build_errors_are_not_retryable() {
        let err = GenerationError::build("bad endpoint");

        assert!(err.source().is_none());
        assert_eq!(err.stage(), "build");
        assert!(!err.is_retryable());
    }

    #[test]
    fn empty_is_a_build_stage_failure() {
        let err = GenerationError::Empty;

        assert_eq!(err.stage(), "build");
        assert!(err.to_string().contains("bad credentials?"));
    }
}
