//! Settings for an RDS-backed DSN.
//!
//! Settings can be deserialized (TTL in humantime form, e.g. `"14m"`), read
//! from `IAMDSN_*` environment variables, or derived from the JSON secret
//! AWS Secrets Manager keeps for an RDS instance.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use iamdsn_cache::DEFAULT_TTL;
use serde::{Deserialize, Serialize};

use crate::dsn::DsnTarget;
use crate::error::ConfigError;
use crate::signer::TOKEN_LIFETIME;
use crate::trust::{PemFile, RdsCaBundle, TrustMaterialLoader};

/// Profile name registered for RDS connections unless configured otherwise.
pub const DEFAULT_TLS_PROFILE: &str = "rds";
/// Default MySQL port.
pub const DEFAULT_PORT: u16 = 3306;

/// Database host (required)
pub const ENV_HOST: &str = "IAMDSN_DB_HOST";
/// Database port, [`DEFAULT_PORT`] when unset
pub const ENV_PORT: &str = "IAMDSN_DB_PORT";
/// Database user (required)
pub const ENV_USER: &str = "IAMDSN_DB_USER";
/// Default schema; the connection has none when unset
pub const ENV_DB_NAME: &str = "IAMDSN_DB_NAME";
/// Cache TTL in humantime form (`14m`, `90s`)
pub const ENV_TTL: &str = "IAMDSN_TTL";
/// TLS profile name, [`DEFAULT_TLS_PROFILE`] when unset
pub const ENV_TLS_PROFILE: &str = "IAMDSN_TLS_PROFILE";
/// Path of the PEM bundle to trust
pub const ENV_CA_BUNDLE: &str = "IAMDSN_CA_BUNDLE";
/// Driver parameters, form-encoded (`k1=v1&k2=v2`)
pub const ENV_PARAMS: &str = "IAMDSN_PARAMS";

/// Backend parameters plus cache and TLS knobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RdsSettings {
    /// Database endpoint host name
    pub host: String,

    /// Database port
    pub port: u16,

    /// Database user the IAM token authenticates as
    pub user: String,

    /// Default schema; empty connects without one
    pub db_name: String,

    /// Extra driver parameters; any `tls` entry is replaced by `tls_profile`
    pub params: BTreeMap<String, String>,

    /// How long a generated DSN is reused
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,

    /// Name the TLS profile is registered under
    pub tls_profile: String,

    /// PEM bundle to trust; the Amazon RDS CA bundle when unset
    pub ca_bundle: Option<PathBuf>,
}

impl Default for RdsSettings {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: DEFAULT_PORT,
            user: String::new(),
            db_name: String::new(),
            params: BTreeMap::new(),
            ttl: DEFAULT_TTL,
            tls_profile: DEFAULT_TLS_PROFILE.to_string(),
            ca_bundle: None,
        }
    }
}

impl RdsSettings {
    /// Settings for a target with every other knob at its default.
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
            ..Self::default()
        }
    }

    /// Read settings from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings from an arbitrary key/value source using the `IAMDSN_*`
    /// names.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &str| var(key).ok_or_else(|| ConfigError::missing(key));

        let port = match var(ENV_PORT) {
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .map_err(|e| ConfigError::invalid(ENV_PORT, e.to_string()))?,
            None => DEFAULT_PORT,
        };
        let ttl = match var(ENV_TTL) {
            Some(raw) => humantime::parse_duration(raw.trim())
                .map_err(|e| ConfigError::invalid(ENV_TTL, e.to_string()))?,
            None => DEFAULT_TTL,
        };
        let params: BTreeMap<String, String> = var(ENV_PARAMS)
            .map(|raw| {
                url::form_urlencoded::parse(raw.as_bytes())
                    .into_owned()
                    .collect()
            })
            .unwrap_or_default();

        let settings = Self {
            host: required(ENV_HOST)?,
            port,
            user: required(ENV_USER)?,
            db_name: var(ENV_DB_NAME).unwrap_or_default(),
            params,
            ttl,
            tls_profile: var(ENV_TLS_PROFILE).unwrap_or_else(|| DEFAULT_TLS_PROFILE.to_string()),
            ca_bundle: var(ENV_CA_BUNDLE).map(PathBuf::from),
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Check every field, reporting the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::missing("host"));
        }
        if self.port == 0 {
            return Err(ConfigError::invalid("port", "must be greater than 0"));
        }
        if self.user.trim().is_empty() {
            return Err(ConfigError::missing("user"));
        }
        if self.ttl.is_zero() {
            return Err(ConfigError::invalid("ttl", "must be greater than 0"));
        }
        if self.ttl >= TOKEN_LIFETIME {
            return Err(ConfigError::invalid(
                "ttl",
                format!(
                    "must be shorter than the {} token lifetime",
                    humantime::format_duration(TOKEN_LIFETIME)
                ),
            ));
        }
        if self.tls_profile.trim().is_empty() {
            return Err(ConfigError::missing("tls_profile"));
        }
        Ok(())
    }

    /// The database the generated DSNs point at.
    pub fn target(&self) -> DsnTarget {
        DsnTarget::new(&self.host, self.port, &self.user, &self.db_name)
            .with_params(self.params.clone())
    }

    /// Loader for `ca_bundle`, or the Amazon RDS CA bundle from its
    /// well-known locations.
    pub fn trust_loader(&self) -> Box<dyn TrustMaterialLoader> {
        match &self.ca_bundle {
            Some(path) => Box::new(PemFile(path.clone())),
            None => Box::new(RdsCaBundle::default()),
        }
    }
}

/// JSON document AWS Secrets Manager stores for an RDS instance.
///
/// The `password` field is deliberately not read: IAM authentication replaces
/// it with a signed token.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RdsSecret {
    /// Master (or application) user name
    pub username: String,
    /// Database engine, e.g. `mysql` or `aurora-mysql`
    pub engine: String,
    /// Instance or cluster endpoint
    pub host: String,
    pub port: u16,
    /// Present for Aurora clusters
    #[serde(default)]
    pub db_cluster_identifier: Option<String>,
}

impl RdsSecret {
    const MYSQL_ENGINES: [&'static str; 4] = ["mysql", "mariadb", "aurora", "aurora-mysql"];

    /// Parse the secret string as stored by Secrets Manager.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::invalid("secret", e.to_string()))
    }

    /// Settings for `db_name` on the instance this secret describes.
    pub fn into_settings(self, db_name: impl Into<String>) -> Result<RdsSettings, ConfigError> {
        if !Self::MYSQL_ENGINES
            .iter()
            .any(|engine| engine.eq_ignore_ascii_case(&self.engine))
        {
            return Err(ConfigError::invalid(
                "engine",
                format!("'{}' is not MySQL-compatible", self.engine),
            ));
        }
        let settings = RdsSettings::new(self.host, self.port, self.username, db_name);
        settings.validate()?;
        Ok(settings)
    }
}
