//! HMAC-signed retrieval links for self-hosted blob backends.
//!
//! A link has the form `{base}/v1/blobs/{path}?expires={unix_ms}&sig={hex}`.
//! The signature covers the length-prefixed path and the expiry, so a link
//! cannot be re-pointed at another blob or extended.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use rand_core::{OsRng, RngCore};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::BlobError;

type HmacSha256 = Hmac<Sha256>;

/// Route under which signed blobs are served.
pub const BLOB_ROUTE_PREFIX: &str = "/v1/blobs/";

/// Minimum accepted secret length in bytes.
pub const MIN_SECRET_LEN: usize = 16;

const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Issues and verifies signed retrieval links.
#[derive(Clone)]
pub struct UrlSigner {
    secret: Vec<u8>,
    base_url: String,
}

impl fmt::Debug for UrlSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UrlSigner")
            .field("secret", &"[redacted]")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl UrlSigner {
    /// Create a signer from raw key bytes.
    pub fn new(secret: impl Into<Vec<u8>>, base_url: impl Into<String>) -> Result<Self, BlobError> {
        let secret = secret.into();
        if secret.len() < MIN_SECRET_LEN {
            return Err(BlobError::Signing(format!(
                "signing secret must be at least {MIN_SECRET_LEN} bytes"
            )));
        }
        Ok(Self {
            secret,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
        })
    }

    /// Create a signer from a hex-encoded key.
    pub fn from_hex(secret_hex: &str, base_url: impl Into<String>) -> Result<Self, BlobError> {
        let secret = hex::decode(secret_hex.trim())
            .map_err(|e| BlobError::Signing(format!("invalid hex signing secret: {e}")))?;
        Self::new(secret, base_url)
    }

    /// Create a signer with a fresh random 32-byte key.
    ///
    /// Links issued by one process are not valid in another.
    pub fn random(base_url: impl Into<String>) -> Result<Self, BlobError> {
        let mut secret = vec![0u8; 32];
        OsRng.fill_bytes(&mut secret);
        Self::new(secret, base_url)
    }

    /// Base URL links are issued under.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn signature(&self, path: &str, expires: i64) -> Result<String, BlobError> {
        let msg = format!("{}:{}\n{}", path.len(), path, expires);
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| BlobError::Signing(e.to_string()))?;
        mac.update(msg.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Issue a link for `path` valid from `now` for exactly `ttl`.
    pub fn url_at(&self, path: &str, ttl: Duration, now: DateTime<Utc>) -> Result<String, BlobError> {
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let expires = now.timestamp_millis().saturating_add(ttl_ms);
        let sig = self.signature(path, expires)?;

        let encoded: Vec<String> = path
            .split('/')
            .map(|seg| utf8_percent_encode(seg, PATH_SEGMENT).to_string())
            .collect();

        Ok(format!(
            "{}{}{}?expires={expires}&sig={sig}",
            self.base_url,
            BLOB_ROUTE_PREFIX,
            encoded.join("/")
        ))
    }

    /// Issue a link valid from the current time.
    pub fn url(&self, path: &str, ttl: Duration) -> Result<String, BlobError> {
        self.url_at(path, ttl, Utc::now())
    }

    /// Check a presented signature and expiry (unix milliseconds) at `now`.
    ///
    /// The link is accepted strictly before its expiry instant.
    pub fn verify_at(&self, path: &str, expires: i64, sig: &str, now: DateTime<Utc>) -> bool {
        if now.timestamp_millis() >= expires {
            return false;
        }
        let Ok(expected) = self.signature(path, expires) else {
            return false;
        };
        expected.as_bytes().ct_eq(sig.as_bytes()).into()
    }

    /// Check a presented signature and expiry at the current time.
    pub fn verify(&self, path: &str, expires: i64, sig: &str) -> bool {
        self.verify_at(path, expires, sig, Utc::now())
    }
}
