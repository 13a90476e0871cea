//! iamdsn rds - IAM-authenticated MySQL DSNs for Amazon RDS
//!
//! [`SecretBackedConfig`] owns a [`CredentialCache`](iamdsn_cache::CredentialCache)
//! whose strategy asks a [`CredentialProvider`] for AWS credentials, signs an
//! RDS IAM authentication token with them and renders a go-sql-driver style
//! DSN that uses the token as password:
//!
//! ```text
//! app:<host:port/?Action=connect&...&X-Amz-Signature=..>@tcp(host:port)/orders?tls=rds
//! ```
//!
//! Every DSN requests TLS through a named profile. The profile is a
//! `rustls::ClientConfig` trusting the configured CA bundle, registered in a
//! [`TlsRegistry`] once at construction.
//!
//! ## Collaborators
//!
//! | Seam | Default |
//! |------|---------|
//! | [`CredentialProvider`] | [`EnvCredentialProvider`] |
//! | [`TrustMaterialLoader`] | [`PemFile`] when `ca_bundle` is set, else [`RdsCaBundle`] |
//! | [`TlsRegistry`] | [`TlsProfiles::global`] |
//! | [`DsnBuilder`] | [`IamDsnBuilder`] |
//! | [`Clock`](iamdsn_cache::Clock) | [`SystemClock`](iamdsn_cache::SystemClock) |
#![forbid(unsafe_code)]

pub mod config;
pub mod dsn;
pub mod error;
pub mod provider;
pub mod registry;
pub mod settings;
pub mod signer;
pub mod strategy;
pub mod trust;

pub use crate::config::{SecretBackedConfig, SecretBackedConfigBuilder};
pub use crate::dsn::{DsnBuilder, DsnRequest, DsnTarget, IamDsnBuilder, format_dsn};
pub use crate::error::{ConfigError, Error, Result};
pub use crate::provider::{
    AwsCredentials, CredentialProvider, EnvCredentialProvider, IssuedCredentials,
    StaticCredentialProvider,
};
pub use crate::registry::{TlsProfiles, TlsRegistry};
pub use crate::settings::{DEFAULT_PORT, DEFAULT_TLS_PROFILE, RdsSecret, RdsSettings};
pub use crate::signer::{AuthTokenSigner, TOKEN_LIFETIME};
pub use crate::strategy::IamDsnStrategy;
pub use crate::trust::{
    NativeRoots, PemBytes, PemFile, RDS_GLOBAL_BUNDLE_URL, RdsCaBundle, TrustMaterial,
    TrustMaterialLoader,
};

pub use iamdsn_cache::{CacheSnapshot, GenerationError};
