//! Credential configuration types.
//!
//! [`Credentials`] is set once per client and immutable thereafter; every
//! operation borrows it. Validation happens up front via
//! [`Credentials::validate`] so that configuration mistakes (a malformed AES
//! key, a certificate without its private key) fail before any network or
//! cipher call.

use std::{path::PathBuf, str::FromStr};

use serde::Deserialize;

use crate::error::{BridgeError, Result};

/// Number of base64 characters in a message-encoding AES key, before the
/// single padding character is appended for decoding.
pub const ENCODING_AES_KEY_LEN: usize = 43;

/// Signature algorithm selector.
///
/// `HmacSha256` is a true keyed HMAC, which is what the gateway's
/// `HMAC-SHA256` selector means on the wire. `Sha256` reproduces the legacy
/// behavior of clients that computed a plain unkeyed SHA-256 digest under
/// that selector; keep it only for interop with such a peer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum SignType {
    /// MD5 digest of the canonical string (the gateway default).
    #[default]
    #[serde(rename = "MD5")]
    Md5,
    /// Keyed HMAC-SHA256 over the canonical string.
    #[serde(rename = "HMAC-SHA256")]
    HmacSha256,
    /// Legacy unkeyed SHA-256 digest (interop fallback).
    #[serde(rename = "SHA256")]
    Sha256,
}

impl SignType {
    /// Wire value carried in the `sign_type` request field.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Md5 => "MD5",
            Self::HmacSha256 => "HMAC-SHA256",
            Self::Sha256 => "SHA256",
        }
    }
}

impl FromStr for SignType {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "MD5" => Ok(Self::Md5),
            "HMAC-SHA256" => Ok(Self::HmacSha256),
            "SHA256" => Ok(Self::Sha256),
            other => Err(BridgeError::Config(format!("unknown signature algorithm: {other}"))),
        }
    }
}

/// Merchant credentials and per-account settings.
///
/// Immutable once constructed. Deserializable from TOML for test fixtures
/// and deployment configuration.
///
/// # Examples
///
/// ```
/// use wxpay_bridge::config::Credentials;
///
/// let toml = r#"
///     app_id = "wx001"
///     mch_id = "10000100"
///     api_key = "k3y"
/// "#;
///
/// let credentials = Credentials::from_toml(toml).unwrap();
/// assert_eq!(credentials.app_id, "wx001");
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct Credentials {
    /// Public-account or open-platform application id.
    pub app_id: String,

    /// Merchant account id assigned by the gateway.
    pub mch_id: String,

    /// API secret used for canonical signing.
    pub api_key: String,

    /// Signature algorithm (defaults to MD5).
    #[serde(default)]
    pub sign_type: SignType,

    /// Webhook verification token.
    #[serde(default)]
    pub token: Option<String>,

    /// 43-character base64 message-encoding AES key (no trailing padding).
    #[serde(default)]
    pub encoding_aes_key: Option<String>,

    /// Client certificate path (PEM), for operations that require one.
    #[serde(default)]
    pub ssl_cert_path: Option<PathBuf>,

    /// Client private key path (PEM).
    #[serde(default)]
    pub ssl_key_path: Option<PathBuf>,

    /// Wire-log directory. When set, every exchange is appended to a
    /// month-directory log file.
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// Terminal IP reported in `spbill_create_ip` / `client_ip` fields.
    #[serde(default)]
    pub client_ip: Option<String>,
}

impl Credentials {
    /// Parses credentials from a TOML document and validates them.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Config`] on syntax errors or failed
    /// validation.
    pub fn from_toml(toml: &str) -> Result<Self> {
        let credentials: Self = ::toml::from_str(toml)
            .map_err(|e| BridgeError::Config(format!("bad credentials document: {e}")))?;
        credentials.validate()?;
        Ok(credentials)
    }

    /// Validates credential shape.
    ///
    /// Checks that:
    /// - `encoding_aes_key`, when present, is exactly 43 base64 characters
    ///   decoding to 32 raw bytes
    /// - certificate and key paths are either both present or both absent
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Config`] describing the first violation.
    pub fn validate(&self) -> Result<()> {
        if let Some(key) = &self.encoding_aes_key {
            crate::cipher::EncodingAesKey::parse(key)?;
        }
        match (&self.ssl_cert_path, &self.ssl_key_path) {
            (Some(_), None) => {
                return Err(BridgeError::Config(
                    "ssl_cert_path set without ssl_key_path".to_owned(),
                ));
            }
            (None, Some(_)) => {
                return Err(BridgeError::Config(
                    "ssl_key_path set without ssl_cert_path".to_owned(),
                ));
            }
            _ => {}
        }
        Ok(())
    }

    /// IP reported to the gateway; falls back to loopback when unset,
    /// matching the reference behavior for hosts that cannot determine
    /// their own address.
    #[must_use]
    pub fn reported_ip(&self) -> &str {
        self.client_ip.as_deref().unwrap_or("127.0.0.1")
    }

    /// True when a client certificate pair is configured.
    #[must_use]
    pub fn has_client_certificate(&self) -> bool {
        self.ssl_cert_path.is_some() && self.ssl_key_path.is_some()
    }
}
