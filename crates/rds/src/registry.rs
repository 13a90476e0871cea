//! Named TLS profiles shared with the database driver.
//!
//! A DSN refers to its TLS settings by name (`tls=rds`); the driver looks the
//! name up in a process-wide table when it opens a connection.
//! [`TlsProfiles::global`] is that table. Tests and embedders that need
//! isolation inject their own [`TlsProfiles`] instead.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;
use rustls::ClientConfig;

use crate::error::{Error, Result};

/// Values the MySQL driver interprets itself and never looks up.
const RESERVED_NAMES: [&str; 4] = ["true", "false", "skip-verify", "preferred"];

/// Registry of TLS client configurations keyed by profile name.
pub trait TlsRegistry: Send + Sync {
    /// Register `config` under `name`, replacing any previous entry.
    fn register(&self, name: &str, config: Arc<ClientConfig>) -> Result<()>;

    /// Look a profile up by name.
    fn get(&self, name: &str) -> Option<Arc<ClientConfig>>;
}

impl<R: TlsRegistry + ?Sized> TlsRegistry for &R {
    fn register(&self, name: &str, config: Arc<ClientConfig>) -> Result<()> {
        (**self).register(name, config)
    }

    fn get(&self, name: &str) -> Option<Arc<ClientConfig>> {
        (**self).get(name)
    }
}

impl<R: TlsRegistry + ?Sized> TlsRegistry for Arc<R> {
    fn register(&self, name: &str, config: Arc<ClientConfig>) -> Result<()> {
        (**self).register(name, config)
    }

    fn get(&self, name: &str) -> Option<Arc<ClientConfig>> {
        (**self).get(name)
    }
}

/// In-memory profile table.
#[derive(Debug, Default)]
pub struct TlsProfiles {
    profiles: RwLock<HashMap<String, Arc<ClientConfig>>>,
}

impl TlsProfiles {
    /// Empty table, independent of [`global`](Self::global).
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide table, created on first use.
    pub fn global() -> &'static Self {
        static GLOBAL: OnceLock<TlsProfiles> = OnceLock::new();
        GLOBAL.get_or_init(Self::new)
    }

    /// Registered profile names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.profiles.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Remove a profile, returning it if it was present.
    pub fn deregister(&self, name: &str) -> Option<Arc<ClientConfig>> {
        self.profiles.write().remove(name)
    }
}

impl TlsRegistry for TlsProfiles {
    fn register(&self, name: &str, config: Arc<ClientConfig>) -> Result<()> {
        if name.is_empty() {
            return Err(Error::registration(name, "profile name must not be empty"));
        }
        if RESERVED_NAMES
            .iter()
            .any(|reserved| reserved.eq_ignore_ascii_case(name))
        {
            return Err(Error::registration(name, "profile name is reserved by the driver"));
        }

        let replaced = self
            .profiles
            .write()
            .insert(name.to_string(), config)
            .is_some();
        tracing::info!(profile = name, replaced, "registered TLS profile");
        Ok(())
    }

    fn get(&self, name: &str) -> Option<Arc<ClientConfig>> {
        self.profiles.read().get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trust::{TrustMaterial, client_config, root_store};
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn config() -> Arc<ClientConfig> {
        let pem = rcgen::generate_simple_self_signed(vec!["db".to_string()])
            .unwrap()
            .cert
            .pem();
        let roots = root_store(TrustMaterial::Pem(pem.into_bytes())).unwrap();
        Arc::new(client_config(roots).unwrap())
    }

    #[test]
    fn register_then_get() {
        let profiles = TlsProfiles::new();
        let cfg = config();

        profiles.register("rds", Arc::clone(&cfg)).unwrap();

        let found = profiles.get("rds").unwrap();
        assert!(Arc::ptr_eq(&found, &cfg));
        assert!(profiles.get("other").is_none());
    }

    #[test]
    fn re_registering_replaces_entry() {
        let profiles = TlsProfiles::new();
        let first = config();
        let second = config();

        profiles.register("rds", first).unwrap();
        profiles.register("rds", Arc::clone(&second)).unwrap();

        assert!(Arc::ptr_eq(&profiles.get("rds").unwrap(), &second));
        assert_eq!(profiles.names(), vec!["rds".to_string()]);
    }

    #[rstest]
    #[case("")]
    #[case("true")]
    #[case("FALSE")]
    #[case("skip-verify")]
    #[case("Preferred")]
    fn rejects_reserved_and_empty_names(#[case] name: &str) {
        let profiles = TlsProfiles::new();

        let err = profiles.register(name, config()).unwrap_err();

        assert!(matches!(err, Error::Registration { .. }));
        assert!(profiles.names().is_empty());
    }

    #[test]
    fn deregister_removes_profile() {
        let profiles = TlsProfiles::new();
        profiles.register("rds", config()).unwrap();

        assert!(profiles.deregister("rds").is_some());
        assert!(profiles.get("rds").is_none());
    }

    #[test]
    fn global_is_a_single_instance() {
        assert!(std::ptr::eq(TlsProfiles::global(), TlsProfiles::global()));
    }

    #[test]
    fn shared_handles_see_the_same_table() {
        let profiles = Arc::new(TlsProfiles::new());
        let handle: Arc<dyn TlsRegistry> = Arc::clone(&profiles) as Arc<dyn TlsRegistry>;

        handle.register("rds", config()).unwrap();

        assert!(profiles.get("rds").is_some());
    }
}
