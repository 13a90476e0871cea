//! Connection string construction.
//!
//! Output follows the go-sql-driver/mysql TCP format understood by most
//! MySQL-compatible clients:
//!
//! ```text
//! user:password@tcp(host:port)/dbname?param1=value1&param2=value2
//! ```
//!
//! Parameters are form-encoded and emitted sorted by key, so the same inputs
//! always yield the same string.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use iamdsn_cache::{Clock, GenerationError, SystemClock};

use crate::provider::AwsCredentials;
use crate::signer::AuthTokenSigner;

/// Immutable description of the database a DSN points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DsnTarget {
    /// Endpoint host name
    pub host: String,
    /// Endpoint port
    pub port: u16,
    /// Database user the token is issued for
    pub user: String,
    /// Default schema, empty for none
    pub db_name: String,
    /// Driver parameters; ordering of insertion is irrelevant
    pub params: BTreeMap<String, String>,
}

impl DsnTarget {
    /// Target without driver parameters.
    pub fn new(
        host: impl Into<String>,
        port: u16,
        user: impl Into<String>,
        db_name: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            user: user.into(),
            db_name: db_name.into(),
            params: BTreeMap::new(),
        }
    }

    /// Add or replace driver parameters.
    pub fn with_params<I, K, V>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.params
            .extend(params.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// `host:port`
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Everything a [`DsnBuilder`] needs for one connection string.
pub struct DsnRequest<'a> {
    /// `host:port`
    pub endpoint: &'a str,
    /// Region the credentials were issued for
    pub region: &'a str,
    pub user: &'a str,
    pub db_name: &'a str,
    /// Driver parameters, `tls` included
    pub params: &'a BTreeMap<String, String>,
    /// Credentials to sign with
    pub credentials: &'a AwsCredentials,
}

impl fmt::Debug for DsnRequest<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DsnRequest")
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .field("user", &self.user)
            .field("db_name", &self.db_name)
            .field("params", &self.params)
            .finish()
    }
}

/// Turns issued credentials into a connection string.
///
/// Returning an empty string means "built but unusable"; the caller reports
/// it as [`GenerationError::Empty`].
pub trait DsnBuilder: Send + Sync {
    fn build(&self, request: &DsnRequest<'_>) -> Result<String, GenerationError>;
}

impl<B: DsnBuilder + ?Sized> DsnBuilder for Arc<B> {
    fn build(&self, request: &DsnRequest<'_>) -> Result<String, GenerationError> {
        (**self).build(request)
    }
}

/// Default builder: signs an RDS IAM token and uses it as the password.
pub struct IamDsnBuilder<C = SystemClock> {
    signer: AuthTokenSigner,
    clock: C,
}

impl IamDsnBuilder {
    /// Builder timestamping tokens with the system clock.
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl Default for IamDsnBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> IamDsnBuilder<C> {
    /// Builder whose tokens are timestamped by `clock`.
    pub fn with_clock(clock: C) -> Self {
        Self {
            signer: AuthTokenSigner::new(),
            clock,
        }
    }

    /// Use a differently configured signer, e.g. a shorter expiry.
    pub fn with_signer(mut self, signer: AuthTokenSigner) -> Self {
        self.signer = signer;
        self
    }
}

impl<C: Clock> DsnBuilder for IamDsnBuilder<C> {
    fn build(&self, request: &DsnRequest<'_>) -> Result<String, GenerationError> {
        let token = self.signer.presign(
            request.endpoint,
            request.region,
            request.user,
            request.credentials,
            self.clock.now(),
        )?;

        Ok(format_dsn(
            request.user,
            &token,
            request.endpoint,
            request.db_name,
            request.params,
        ))
    }
}

impl<C> fmt::Debug for IamDsnBuilder<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IamDsnBuilder")
            .field("signer", &self.signer)
            .finish()
    }
}

/// Render `user:password@tcp(endpoint)/db_name?params`.
pub fn format_dsn(
    user: &str,
    password: &str,
    endpoint: &str,
    db_name: &str,
    params: &BTreeMap<String, String>,
) -> String {
    let mut dsn = format!("{user}:{password}@tcp({endpoint})/{db_name}");
    if !params.is_empty() {
        let query = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(params.iter())
            .finish();
        dsn.push('?');
        dsn.push_str(&query);
    }
    dsn
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use iamdsn_cache::ManualClock;
    use pretty_assertions::assert_eq;

    #[test]
    fn formats_without_params() {
        let dsn = format_dsn("app", "pw", "db:3306", "orders", &BTreeMap::new());
        assert_eq!(dsn, "app:pw@tcp(db:3306)/orders");
    }

    #[test]
    fn empty_db_name_leaves_schema_blank() {
        let params = BTreeMap::from([("tls".to_string(), "rds".to_string())]);

        let dsn = format_dsn("app", "pw", "db:3306", "", &params);

        assert_eq!(dsn, "app:pw@tcp(db:3306)/?tls=rds");
    }

    #[test]
    fn params_are_sorted_and_encoded() {
        let target = DsnTarget::new("db", 3306, "app", "orders").with_params([
            ("tls", "rds"),
            ("allowCleartextPasswords", "true"),
            ("loc", "Europe/Berlin"),
            ("charset", "utf8mb4 general"),
        ]);

        let dsn = format_dsn("app", "pw", &target.endpoint(), "orders", &target.params);

        assert_eq!(
            dsn,
            "app:pw@tcp(db:3306)/orders?allowCleartextPasswords=true&charset=utf8mb4+general&loc=Europe%2FBerlin&tls=rds"
        );
    }

    #[test]
    fn with_params_replaces_existing_keys() {
        let target = DsnTarget::new("db", 3306, "app", "orders")
            .with_params([("tls", "skip-verify")])
            .with_params([("tls", "rds")]);

        assert_eq!(target.params.get("tls").map(String::as_str), Some("rds"));
        assert_eq!(target.params.len(), 1);
    }

    #[test]
    fn iam_builder_embeds_signed_token_as_password() {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap());
        let builder = IamDsnBuilder::with_clock(clock);
        let credentials = AwsCredentials::new("AKID", "secret");
        let params = BTreeMap::from([("tls".to_string(), "rds".to_string())]);

        let dsn = builder
            .build(&DsnRequest {
                endpoint: "db.example.com:3306",
                region: "eu-west-1",
                user: "app",
                db_name: "orders",
                params: &params,
                credentials: &credentials,
            })
            .unwrap();

        assert!(dsn.starts_with("app:db.example.com:3306/?Action=connect&DBUser=app&"));
        assert!(dsn.contains("X-Amz-Date=20240601T120000Z"));
        assert!(dsn.ends_with("@tcp(db.example.com:3306)/orders?tls=rds"));
    }

    #[test]
    fn iam_builder_surfaces_signing_failures() {
        let builder = IamDsnBuilder::new();
        let credentials = AwsCredentials::new("AKID", "secret");
        let params = BTreeMap::new();

        let err = builder
            .build(&DsnRequest {
                endpoint: "db.example.com:3306",
                region: "",
                user: "app",
                db_name: "orders",
                params: &params,
                credentials: &credentials,
            })
            .unwrap_err();

        assert!(matches!(err, GenerationError::Build { .. }));
    }
}
