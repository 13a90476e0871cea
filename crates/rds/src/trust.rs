//! Certificate authorities trusted when the driver validates the server.

use std::borrow::Cow;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use iamdsn_cache::BoxError;
use rustls::pki_types::CertificateDer;
use rustls::{ClientConfig, RootCertStore};

use crate::error::{Error, Result};

/// Raw trust material as handed over by a loader.
pub enum TrustMaterial {
    /// One or more PEM `CERTIFICATE` blocks
    Pem(Vec<u8>),
    /// Already-decoded DER certificates
    Der(Vec<CertificateDer<'static>>),
}

impl fmt::Debug for TrustMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pem(bytes) => write!(f, "TrustMaterial::Pem({} bytes)", bytes.len()),
            Self::Der(certs) => write!(f, "TrustMaterial::Der({} certs)", certs.len()),
        }
    }
}

/// Produces the CA bundle for the TLS profile.
///
/// Closures `Fn() -> Result<TrustMaterial, BoxError>` implement this trait.
pub trait TrustMaterialLoader: Send + Sync {
    /// Read the bundle; called once per construction.
    fn load(&self) -> std::result::Result<TrustMaterial, BoxError>;
}

impl<F> TrustMaterialLoader for F
where
    F: Fn() -> std::result::Result<TrustMaterial, BoxError> + Send + Sync,
{
    fn load(&self) -> std::result::Result<TrustMaterial, BoxError> {
        self()
    }
}

/// PEM bundle read from disk, e.g. the RDS `global-bundle.pem`.
#[derive(Debug, Clone)]
pub struct PemFile(pub PathBuf);

impl TrustMaterialLoader for PemFile {
    fn load(&self) -> std::result::Result<TrustMaterial, BoxError> {
        let bytes = std::fs::read(&self.0)
            .map_err(|e| format!("could not read {}: {e}", self.0.display()))?;
        Ok(TrustMaterial::Pem(bytes))
    }
}

/// PEM bundle compiled into the binary (`include_bytes!`) or held in memory.
#[derive(Debug, Clone)]
pub struct PemBytes(pub Cow<'static, [u8]>);

impl PemBytes {
    /// Wrap a bundle embedded with `include_bytes!`.
    pub fn from_static(bytes: &'static [u8]) -> Self {
        Self(Cow::Borrowed(bytes))
    }
}

impl TrustMaterialLoader for PemBytes {
    fn load(&self) -> std::result::Result<TrustMaterial, BoxError> {
        Ok(TrustMaterial::Pem(self.0.to_vec()))
    }
}

/// Where AWS publishes the Amazon RDS global CA bundle.
pub const RDS_GLOBAL_BUNDLE_URL: &str =
    "https://truststore.pki.rds.amazonaws.com/global/global-bundle.pem";

/// Locations searched for the RDS bundle, in order.
pub const RDS_BUNDLE_PATHS: [&str; 3] = [
    "/etc/ssl/certs/rds-global-bundle.pem",
    "/etc/pki/tls/certs/rds-global-bundle.pem",
    "/usr/local/share/ca-certificates/rds-global-bundle.pem",
];

/// The Amazon RDS global CA bundle, read from the first location that exists.
///
/// RDS server certificates chain to Amazon RDS certificate authorities that
/// are not part of operating system trust stores, so this is the default
/// trust material. Loading fails, naming the download URL, when the bundle is
/// in none of the locations.
#[derive(Debug, Clone)]
pub struct RdsCaBundle {
    candidates: Vec<PathBuf>,
}

impl Default for RdsCaBundle {
    fn default() -> Self {
        Self::with_candidates(RDS_BUNDLE_PATHS)
    }
}

impl RdsCaBundle {
    /// Search `candidates` instead of [`RDS_BUNDLE_PATHS`].
    pub fn with_candidates<I, P>(candidates: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            candidates: candidates.into_iter().map(Into::into).collect(),
        }
    }

    /// Paths searched, in order.
    pub fn candidates(&self) -> &[PathBuf] {
        &self.candidates
    }
}

impl TrustMaterialLoader for RdsCaBundle {
    fn load(&self) -> std::result::Result<TrustMaterial, BoxError> {
        let Some(path) = self.candidates.iter().find(|path| path.is_file()) else {
            let searched = self
                .candidates
                .iter()
                .map(|path| path.display().to_string())
                .collect::<Vec<_>>()
                .join(", ");
            return Err(format!(
                "Amazon RDS CA bundle not found (searched: {searched}); \
                 download it from {RDS_GLOBAL_BUNDLE_URL} and set ca_bundle"
            )
            .into());
        };
        tracing::debug!(path = %path.display(), "using Amazon RDS CA bundle");
        PemFile(path.clone()).load()
    }
}

/// The operating system's trust store.
///
/// Opt-in: suits RDS Proxy endpoints and other servers whose certificates
/// chain to public authorities.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeRoots;

impl TrustMaterialLoader for NativeRoots {
    fn load(&self) -> std::result::Result<TrustMaterial, BoxError> {
        let loaded = rustls_native_certs::load_native_certs();
        if loaded.certs.is_empty() {
            let reason = loaded
                .errors
                .first()
                .map_or_else(|| "no certificates found".to_string(), ToString::to_string);
            return Err(format!("could not load native roots: {reason}").into());
        }
        if !loaded.errors.is_empty() {
            tracing::debug!(
                errors = loaded.errors.len(),
                "ignored unreadable entries in native trust store"
            );
        }
        Ok(TrustMaterial::Der(loaded.certs))
    }
}

/// Parse trust material into a root store.
///
/// Fails if the PEM is malformed or if not a single certificate could be
/// used as a trust anchor.
pub fn root_store(material: TrustMaterial) -> Result<RootCertStore> {
    let certs = match material {
        TrustMaterial::Pem(bytes) => rustls_pemfile::certs(&mut bytes.as_slice())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::trust_material_with("could not parse PEM certificates", e))?,
        TrustMaterial::Der(certs) => certs,
    };

    let mut store = RootCertStore::empty();
    let (added, ignored) = store.add_parsable_certificates(certs);
    tracing::debug!(added, ignored, "loaded trust anchors");

    if added == 0 {
        return Err(Error::trust_material(
            "could not append certificates from PEM: no usable certificates",
        ));
    }
    Ok(store)
}

/// Client configuration trusting exactly `roots`, without client auth.
pub fn client_config(roots: RootCertStore) -> std::result::Result<ClientConfig, rustls::Error> {
    Ok(
        ClientConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
            .with_safe_default_protocol_versions()?
            .with_root_certificates(roots)
            .with_no_client_auth(),
    )
}
