//! The public facade: a TLS-enforcing, TTL-cached IAM DSN for one database.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use iamdsn_cache::{CacheSnapshot, Clock, CredentialCache, SystemClock};
use rustls::ClientConfig;

use crate::dsn::{DsnBuilder, DsnTarget, IamDsnBuilder};
use crate::error::{Error, Result};
use crate::provider::{CredentialProvider, EnvCredentialProvider};
use crate::registry::{TlsProfiles, TlsRegistry};
use crate::settings::RdsSettings;
use crate::strategy::IamDsnStrategy;
use crate::trust::{self, TrustMaterialLoader};

/// DSN source for an RDS MySQL database using IAM authentication.
///
/// Construction registers a TLS profile, adds `tls=<profile>` to the driver
/// parameters and generates the first DSN. A value is only ever returned once
/// all of that succeeded, so a `SecretBackedConfig` is always ready to serve.
///
/// # Examples
///
/// ```no_run
/// use iamdsn_rds::{EnvCredentialProvider, SecretBackedConfig};
///
/// let config = SecretBackedConfig::new(
///     "orders",
///     "orders.cluster-abc.eu-west-1.rds.amazonaws.com",
///     3306,
///     "app",
///     [("parseTime", "true")],
///     EnvCredentialProvider::new(),
/// )?;
///
/// let dsn = config.get(false)?;
/// assert!(dsn.contains("tls=rds"));
/// # Ok::<(), iamdsn_rds::Error>(())
/// ```
pub struct SecretBackedConfig {
    target: DsnTarget,
    tls_profile: String,
    client_config: Arc<ClientConfig>,
    cache: CredentialCache<IamDsnStrategy, Arc<dyn Clock>>,
}

impl SecretBackedConfig {
    /// Build with default collaborators: the Amazon RDS CA bundle, the
    /// process-wide TLS profile table, IAM-signed tokens and the system clock.
    ///
    /// `db_name` may be empty to connect without a default schema. A `tls`
    /// entry in `params` is replaced by the registered profile name.
    pub fn new<I, K, V>(
        db_name: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        user: impl Into<String>,
        params: I,
        provider: impl CredentialProvider + 'static,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let settings = RdsSettings {
            params: params
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            ..RdsSettings::new(host, port, user, db_name)
        };
        Self::builder(settings).credential_provider(provider).build()
    }

    /// Start a builder where every collaborator can be replaced.
    pub fn builder(settings: RdsSettings) -> SecretBackedConfigBuilder {
        SecretBackedConfigBuilder::new(settings)
    }

    /// Current DSN, regenerated when older than the TTL or when `force` is set.
    #[tracing::instrument(skip_all, fields(db = %self.target.db_name, force = force))]
    pub fn get(&self, force: bool) -> Result<String> {
        Ok(self.cache.get(force)?)
    }

    /// Successful generations, including the one made during construction.
    pub fn calls_made(&self) -> u64 {
        self.cache.calls_made()
    }

    /// Cached DSN with its refresh time and expiry.
    pub fn snapshot(&self) -> Option<CacheSnapshot> {
        self.cache.snapshot()
    }

    /// Drop the cached DSN; the next `get` regenerates it.
    pub fn invalidate(&self) {
        self.cache.invalidate();
    }

    /// Database the DSNs point at, `tls` parameter included.
    pub fn target(&self) -> &DsnTarget {
        &self.target
    }

    /// Name the TLS profile was registered under.
    pub fn tls_profile(&self) -> &str {
        &self.tls_profile
    }

    /// The registered client configuration, for drivers that take a
    /// `rustls::ClientConfig` directly.
    pub fn client_config(&self) -> Arc<ClientConfig> {
        Arc::clone(&self.client_config)
    }

    /// How long a DSN is reused before it is regenerated.
    pub fn ttl(&self) -> Duration {
        self.cache.ttl()
    }
}

impl fmt::Debug for SecretBackedConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretBackedConfig")
            .field("target", &self.target)
            .field("tls_profile", &self.tls_profile)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

/// Builder for [`SecretBackedConfig`].
///
/// Unset collaborators fall back to:
/// - credentials: [`EnvCredentialProvider`]
/// - trust material: `settings.ca_bundle`, else [`RdsCaBundle`](crate::trust::RdsCaBundle)
/// - TLS registry: [`TlsProfiles::global`]
/// - DSN builder: [`IamDsnBuilder`] on the configured clock
/// - clock: [`SystemClock`]
#[must_use = "call `build` to create the config"]
pub struct SecretBackedConfigBuilder {
    settings: RdsSettings,
    provider: Option<Arc<dyn CredentialProvider>>,
    trust: Option<Box<dyn TrustMaterialLoader>>,
    registry: Option<Arc<dyn TlsRegistry>>,
    dsn_builder: Option<Arc<dyn DsnBuilder>>,
    clock: Arc<dyn Clock>,
}

impl SecretBackedConfigBuilder {
    fn new(settings: RdsSettings) -> Self {
        Self {
            settings,
            provider: None,
            trust: None,
            registry: None,
            dsn_builder: None,
            clock: Arc::new(SystemClock),
        }
    }

    /// Source of the AWS credentials used to sign tokens.
    pub fn credential_provider(mut self, provider: impl CredentialProvider + 'static) -> Self {
        self.provider = Some(Arc::new(provider));
        self
    }

    /// CA bundle trusted by the TLS profile.
    pub fn trust_material(mut self, loader: impl TrustMaterialLoader + 'static) -> Self {
        self.trust = Some(Box::new(loader));
        self
    }

    /// Table the TLS profile is registered in.
    pub fn tls_registry(mut self, registry: impl TlsRegistry + 'static) -> Self {
        self.registry = Some(Arc::new(registry));
        self
    }

    /// Replace the IAM token DSN builder.
    pub fn dsn_builder(mut self, builder: impl DsnBuilder + 'static) -> Self {
        self.dsn_builder = Some(Arc::new(builder));
        self
    }

    /// Clock for cache freshness and token timestamps.
    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Override `settings.ttl`.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.settings.ttl = ttl;
        self
    }

    /// Override `settings.tls_profile`.
    pub fn tls_profile(mut self, name: impl Into<String>) -> Self {
        self.settings.tls_profile = name.into();
        self
    }

    /// Validate, register the TLS profile and generate the first DSN.
    pub fn build(self) -> Result<SecretBackedConfig> {
        let Self {
            settings,
            provider,
            trust: loader,
            registry,
            dsn_builder,
            clock,
        } = self;

        settings.validate()?;

        let loader = loader.unwrap_or_else(|| settings.trust_loader());
        let material = loader
            .load()
            .map_err(|e| Error::trust_material_with("could not load trust material", e))?;
        let roots = trust::root_store(material)?;
        let client_config = trust::client_config(roots)
            .map(Arc::new)
            .map_err(|e| Error::registration(&settings.tls_profile, e.to_string()))?;

        let registry = registry.unwrap_or_else(|| Arc::new(TlsProfiles::global()));
        registry.register(&settings.tls_profile, Arc::clone(&client_config))?;

        let target = settings
            .target()
            .with_params([("tls", settings.tls_profile.as_str())]);

        let provider: Arc<dyn CredentialProvider> =
            provider.unwrap_or_else(|| Arc::new(EnvCredentialProvider::new()));
        let dsn_builder: Arc<dyn DsnBuilder> = dsn_builder
            .unwrap_or_else(|| Arc::new(IamDsnBuilder::with_clock(Arc::clone(&clock))));

        let strategy = IamDsnStrategy::new(target.clone(), provider, dsn_builder);
        let cache = CredentialCache::with_clock(strategy, clock).with_ttl(settings.ttl);
        cache.get(true).map_err(Error::InitialRefresh)?;

        tracing::info!(
            endpoint = %target.endpoint(),
            db = %target.db_name,
            profile = %settings.tls_profile,
            ttl = %humantime::format_duration(settings.ttl),
            "secret-backed DSN ready"
        );

        Ok(SecretBackedConfig {
            target,
            tls_profile: settings.tls_profile,
            client_config,
            cache,
        })
    }
}

impl fmt::Debug for SecretBackedConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretBackedConfigBuilder")
            .field("settings", &self.settings)
            .field("custom_provider", &self.provider.is_some())
            .field("custom_trust", &self.trust.is_some())
            .field("custom_registry", &self.registry.is_some())
            .field("custom_dsn_builder", &self.dsn_builder.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsn::DsnRequest;
    use crate::provider::{MockCredentialProvider, StaticCredentialProvider};
    use crate::trust::PemBytes;
    use iamdsn_cache::{GenerationError, ManualClock};
    use pretty_assertions::assert_eq;

    fn pem() -> PemBytes {
        let pem = rcgen::generate_simple_self_signed(vec!["db.example.com".to_string()])
            .unwrap()
            .cert
            .pem();
        PemBytes(pem.into_bytes().into())
    }

    fn settings() -> RdsSettings {
        RdsSettings::new("db.example.com", 3306, "app", "orders")
    }

    fn isolated() -> SecretBackedConfigBuilder {
        SecretBackedConfig::builder(settings())
            .trust_material(pem())
            .tls_registry(Arc::new(TlsProfiles::new()))
            .credential_provider(StaticCredentialProvider::new("AKID", "secret", "eu-west-1"))
    }

    #[test]
    fn send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SecretBackedConfig>();
    }

    #[test]
    fn construction_generates_first_dsn() {
        let config = isolated().build().unwrap();

        assert_eq!(config.calls_made(), 1);
        assert_eq!(config.tls_profile(), "rds");
        assert_eq!(config.target().params.get("tls").map(String::as_str), Some("rds"));
        assert!(config.snapshot().is_some());
    }

    #[test]
    fn custom_builder_sees_tls_param() {
        struct EchoTls;
        impl DsnBuilder for EchoTls {
            fn build(
                &self,
                request: &DsnRequest<'_>,
            ) -> std::result::Result<String, GenerationError> {
                Ok(format!("{}?tls={}", request.db_name, request.params["tls"]))
            }
        }

        let config = isolated()
            .tls_profile("rds-eu")
            .dsn_builder(EchoTls)
            .build()
            .unwrap();

        assert_eq!(config.get(false).unwrap(), "orders?tls=rds-eu");
    }

    #[test]
    fn caller_tls_param_is_replaced_by_profile() {
        let mut settings = settings();
        settings.params.insert("tls".into(), "true".into());

        let config = SecretBackedConfig::builder(settings)
            .trust_material(pem())
            .tls_registry(Arc::new(TlsProfiles::new()))
            .credential_provider(StaticCredentialProvider::new("AKID", "secret", "eu-west-1"))
            .build()
            .unwrap();

        assert_eq!(config.target().params.get("tls").map(String::as_str), Some("rds"));
        assert!(config.get(false).unwrap().ends_with("/orders?tls=rds"));
    }

    #[test]
    fn empty_db_name_connects_without_schema() {
        let config = SecretBackedConfig::builder(RdsSettings::new("db.example.com", 3306, "app", ""))
            .trust_material(pem())
            .tls_registry(Arc::new(TlsProfiles::new()))
            .credential_provider(StaticCredentialProvider::new("AKID", "secret", "eu-west-1"))
            .build()
            .unwrap();

        assert!(config.get(false).unwrap().ends_with("@tcp(db.example.com:3306)/?tls=rds"));
    }

    #[test]
    fn ttl_override_applies_to_cache() {
        let config = isolated()
            .ttl(Duration::from_secs(60))
            .clock(ManualClock::starting_now())
            .build()
            .unwrap();

        assert_eq!(config.ttl(), Duration::from_secs(60));
    }

    #[test]
    fn invalid_settings_fail_before_any_work() {
        let mut provider = MockCredentialProvider::new();
        provider.expect_issue().never();

        let err = SecretBackedConfig::builder(RdsSettings::new("", 3306, "app", "orders"))
            .trust_material(pem())
            .tls_registry(Arc::new(TlsProfiles::new()))
            .credential_provider(provider)
            .build()
            .unwrap_err();

        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn debug_output_does_not_leak_dsn() {
        let config = isolated().build().unwrap();
        let dsn = config.get(false).unwrap();

        let rendered = format!("{config:?}");

        assert!(rendered.contains("orders"));
        assert!(!rendered.contains(&dsn));
    }
}
