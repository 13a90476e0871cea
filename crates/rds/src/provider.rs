//! Credential providers: where the short-lived AWS credentials come from.
//!
//! Resolving a full provider chain (profiles, IMDS, web identity, ...) is the
//! caller's job. This module defines the seam and ships two single-source
//! providers.

use std::fmt;

use iamdsn_cache::GenerationError;
use secrecy::{ExposeSecret, SecretString};

use crate::dsn::DsnTarget;

/// AWS credentials used to sign an authentication token.
pub struct AwsCredentials {
    access_key_id: String,
    secret_access_key: SecretString,
    session_token: Option<SecretString>,
}

impl AwsCredentials {
    /// Long-term (or already-resolved) key pair.
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: SecretString::from(secret_access_key.into()),
            session_token: None,
        }
    }

    /// Attach the session token issued alongside temporary credentials.
    pub fn with_session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(SecretString::from(token.into()));
        self
    }

    /// Access key id, safe to log.
    pub fn access_key_id(&self) -> &str {
        &self.access_key_id
    }

    /// Secret access key, exposed only for signing.
    pub fn secret_access_key(&self) -> &SecretString {
        &self.secret_access_key
    }

    /// Session token of temporary credentials.
    pub fn session_token(&self) -> Option<&SecretString> {
        self.session_token.as_ref()
    }
}

impl fmt::Debug for AwsCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"[REDACTED]")
            .field("session_token", &self.session_token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Credentials plus the region they should be used in.
#[derive(Debug)]
pub struct IssuedCredentials {
    pub credentials: AwsCredentials,
    pub region: String,
}

impl IssuedCredentials {
    /// Pair `credentials` with the region they are valid in.
    pub fn new(credentials: AwsCredentials, region: impl Into<String>) -> Self {
        Self {
            credentials,
            region: region.into(),
        }
    }
}

/// Issues credentials for a database target.
///
/// Called on every cache refresh, never concurrently for the same cache.
/// Closures `Fn(&DsnTarget) -> Result<IssuedCredentials, GenerationError>`
/// implement this trait.
#[cfg_attr(test, mockall::automock)]
pub trait CredentialProvider: Send + Sync {
    /// Issue credentials usable to reach `target`.
    fn issue(&self, target: &DsnTarget) -> Result<IssuedCredentials, GenerationError>;
}

impl<F> CredentialProvider for F
where
    F: Fn(&DsnTarget) -> Result<IssuedCredentials, GenerationError> + Send + Sync,
{
    fn issue(&self, target: &DsnTarget) -> Result<IssuedCredentials, GenerationError> {
        self(target)
    }
}

/// Always hands out the same key pair.
pub struct StaticCredentialProvider {
    access_key_id: String,
    secret_access_key: SecretString,
    session_token: Option<SecretString>,
    region: String,
}

impl StaticCredentialProvider {
    /// Provider returning this key pair for `region` on every issue.
    pub fn new(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: SecretString::from(secret_access_key.into()),
            session_token: None,
            region: region.into(),
        }
    }

    /// Hand out temporary credentials with this session token.
    pub fn with_session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(SecretString::from(token.into()));
        self
    }
}

impl CredentialProvider for StaticCredentialProvider {
    fn issue(&self, _target: &DsnTarget) -> Result<IssuedCredentials, GenerationError> {
        let mut credentials = AwsCredentials::new(
            self.access_key_id.clone(),
            self.secret_access_key.expose_secret(),
        );
        if let Some(token) = &self.session_token {
            credentials = credentials.with_session_token(token.expose_secret());
        }
        Ok(IssuedCredentials::new(credentials, self.region.clone()))
    }
}

impl fmt::Debug for StaticCredentialProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticCredentialProvider")
            .field("access_key_id", &self.access_key_id)
            .field("region", &self.region)
            .finish()
    }
}

type Lookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Reads the standard `AWS_*` environment variables on every issue, so
/// rotated credentials injected into the environment are picked up.
pub struct EnvCredentialProvider {
    lookup: Lookup,
}

impl EnvCredentialProvider {
    /// Read from the process environment.
    pub fn new() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read from an arbitrary key/value source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            lookup: Box::new(lookup),
        }
    }

    fn var(&self, key: &str) -> Option<String> {
        (self.lookup)(key).filter(|v| !v.is_empty())
    }

    fn required(&self, key: &str) -> Result<String, GenerationError> {
        self.var(key)
            .ok_or_else(|| GenerationError::issuance(format!("{key} is not set")))
    }
}

impl Default for EnvCredentialProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialProvider for EnvCredentialProvider {
    fn issue(&self, _target: &DsnTarget) -> Result<IssuedCredentials, GenerationError> {
        let access_key_id = self.required("AWS_ACCESS_KEY_ID")?;
        let secret_access_key = self.required("AWS_SECRET_ACCESS_KEY")?;
        let region = self
            .var("AWS_REGION")
            .or_else(|| self.var("AWS_DEFAULT_REGION"))
            .ok_or_else(|| GenerationError::issuance("neither AWS_REGION nor AWS_DEFAULT_REGION is set"))?;

        let mut credentials = AwsCredentials::new(access_key_id, secret_access_key);
        if let Some(token) = self.var("AWS_SESSION_TOKEN") {
            credentials = credentials.with_session_token(token);
        }

        Ok(IssuedCredentials::new(credentials, region))
    }
}

impl fmt::Debug for EnvCredentialProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EnvCredentialProvider")
    }
}
