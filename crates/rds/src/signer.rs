//! RDS IAM authentication tokens.
//!
//! A token is an AWS Signature Version 4 presigned `connect` request for the
//! `rds-db` service, with the `https://` scheme stripped:
//!
//! ```text
//! host:port/?Action=connect&DBUser=app&X-Amz-Algorithm=AWS4-HMAC-SHA256
//!   &X-Amz-Credential=AKID%2F20240601%2Feu-west-1%2Frds-db%2Faws4_request
//!   &X-Amz-Date=20240601T120000Z&X-Amz-Expires=900&X-Amz-SignedHeaders=host
//!   &X-Amz-Signature=<64 hex chars>
//! ```
//!
//! The database accepts the token as the password for `user` until it
//! expires.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use iamdsn_cache::GenerationError;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use secrecy::ExposeSecret;
use sha2::{Digest, Sha256};

use crate::provider::AwsCredentials;

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";
const SERVICE: &str = "rds-db";
const EMPTY_PAYLOAD_SHA256: &str =
    "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

/// RFC 3986 unreserved characters stay literal; everything else is escaped.
const AWS_QUERY: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Lifetime the database grants a token.
pub const TOKEN_LIFETIME: Duration = Duration::from_secs(15 * 60);

/// Presigns RDS `connect` requests.
#[derive(Debug, Clone)]
pub struct AuthTokenSigner {
    expires_in: Duration,
}

impl Default for AuthTokenSigner {
    fn default() -> Self {
        Self {
            expires_in: TOKEN_LIFETIME,
        }
    }
}

impl AuthTokenSigner {
    /// Signer producing tokens valid for [`TOKEN_LIFETIME`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the advertised token lifetime (RDS caps it at 15 minutes).
    pub fn with_expiry(mut self, expires_in: Duration) -> Self {
        self.expires_in = expires_in.min(TOKEN_LIFETIME);
        self
    }

    /// Build a token for `user` at `endpoint` (`host:port`) signed at `now`.
    pub fn presign(
        &self,
        endpoint: &str,
        region: &str,
        user: &str,
        credentials: &AwsCredentials,
        now: DateTime<Utc>,
    ) -> Result<String, GenerationError> {
        validate_endpoint(endpoint)?;
        if region.is_empty() {
            return Err(GenerationError::build("region is required to sign a token"));
        }
        if user.is_empty() {
            return Err(GenerationError::build("database user is required to sign a token"));
        }
        if credentials.access_key_id().is_empty() {
            return Err(GenerationError::build("access key id is empty"));
        }

        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date = now.format("%Y%m%d").to_string();
        let scope = format!("{date}/{region}/{SERVICE}/aws4_request");

        let mut query = BTreeMap::new();
        query.insert("Action", "connect".to_string());
        query.insert("DBUser", user.to_string());
        query.insert("X-Amz-Algorithm", ALGORITHM.to_string());
        query.insert(
            "X-Amz-Credential",
            format!("{}/{scope}", credentials.access_key_id()),
        );
        query.insert("X-Amz-Date", amz_date.clone());
        query.insert("X-Amz-Expires", self.expires_in.as_secs().to_string());
        if let Some(token) = credentials.session_token() {
            query.insert("X-Amz-Security-Token", token.expose_secret().to_string());
        }
        query.insert("X-Amz-SignedHeaders", "host".to_string());

        let canonical_query = query
            .iter()
            .map(|(k, v)| format!("{}={}", encode(k), encode(v)))
            .collect::<Vec<_>>()
            .join("&");

        let canonical_request = format!(
            "GET\n/\n{canonical_query}\nhost:{endpoint}\n\nhost\n{EMPTY_PAYLOAD_SHA256}"
        );
        let string_to_sign = format!(
            "{ALGORITHM}\n{amz_date}\n{scope}\n{}",
            hex::encode(Sha256::digest(canonical_request.as_bytes()))
        );

        let secret = format!("AWS4{}", credentials.secret_access_key().expose_secret());
        let k_date = hmac(secret.as_bytes(), date.as_bytes())?;
        let k_region = hmac(&k_date, region.as_bytes())?;
        let k_service = hmac(&k_region, SERVICE.as_bytes())?;
        let k_signing = hmac(&k_service, b"aws4_request")?;
        let signature = hex::encode(hmac(&k_signing, string_to_sign.as_bytes())?);

        Ok(format!(
            "{endpoint}/?{canonical_query}&X-Amz-Signature={signature}"
        ))
    }
}

fn validate_endpoint(endpoint: &str) -> Result<(), GenerationError> {
    match endpoint.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok_and(|p| p > 0) => {
            Ok(())
        }
        _ => Err(GenerationError::build(format!(
            "endpoint '{endpoint}' must be host:port"
        ))),
    }
}

fn encode(value: &str) -> String {
    utf8_percent_encode(value, AWS_QUERY).to_string()
}

fn hmac(key: &[u8], data: &[u8]) -> Result<Vec<u8>, GenerationError> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| GenerationError::build_with("could not initialise HMAC", e.to_string()))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}
