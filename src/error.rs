//! Error types for the WeChat Pay bridge.
//!
//! This module defines all error types that can occur during bridge operations.
//! All errors implement the standard [`std::error::Error`] trait via [`thiserror::Error`].
//!
//! # Error Categories
//!
//! - **Configuration** ([`BridgeError::Config`]): bad AES key shape, missing
//!   certificate material; fails fast, before any network or cipher call
//! - **Cryptographic** ([`BridgeError::Cipher`], [`BridgeError::AppIdMismatch`],
//!   [`BridgeError::Signature`]): AES or signature verification failures
//! - **Transport** ([`BridgeError::Http`], [`BridgeError::Status`],
//!   [`BridgeError::Transport`]): network failures, non-200 responses, and the
//!   gateway's own communication-failure flag
//! - **Business** ([`BridgeError::Business`]): the gateway accepted the request
//!   but refused the operation
//! - **Protocol** ([`BridgeError::Protocol`]): malformed XML or cipher frames
//!
//! Every variant carries a distinct, stable [`code`](BridgeError::code) so
//! callers can branch without string matching.

use thiserror::Error;

/// Result type alias for bridge operations.
///
/// This is a convenience type that uses [`BridgeError`] as the error type.
/// All fallible functions in this crate return this type.
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Errors that can occur in the WeChat Pay bridge.
///
/// No operation retries internally: every condition surfaces immediately as
/// one of these variants, and retry/backoff policy belongs to the caller.
///
/// # Error Recovery
///
/// - **Transient errors** ([`Http`](Self::Http), [`Status`](Self::Status)):
///   retry with backoff at the call site
/// - **Configuration errors** ([`Config`](Self::Config)): fix credentials and
///   retry; nothing was sent
/// - **Signature errors** ([`Signature`](Self::Signature)): check the API key
///   and signature algorithm selection
/// - **Business errors** ([`Business`](Self::Business)): inspect the remote
///   error code; usually requires an operator decision
#[must_use = "errors should be handled, propagated, or explicitly panicked"]
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Credential or certificate configuration is unusable.
    ///
    /// Raised before any cryptographic or network operation: a malformed
    /// `encoding_aes_key` (must be exactly 43 base64 characters decoding to
    /// 32 bytes), a certificate path without its key path, or an unknown
    /// signature-algorithm selector.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// AES encryption or decryption failed.
    ///
    /// Covers base64 decoding of ciphertext, block alignment, and cipher
    /// execution. A well-formed ciphertext that decrypts to a short frame is
    /// NOT this error; that decodes to the protocol's empty result.
    #[error("cipher operation failed: {0}")]
    Cipher(String),

    /// The app identifier embedded in a decrypted frame does not match the
    /// configured one.
    ///
    /// The decrypted payload is withheld: a mismatched identifier means the
    /// message was encrypted for a different account.
    #[error("embedded app id does not match the configured app id")]
    AppIdMismatch,

    /// Signature verification failed.
    ///
    /// Either an inbound webhook signature or a payment-response signature
    /// did not match the locally recomputed value. Treat the message as
    /// untrusted; do not fall back to its payload.
    #[error("signature verification failed: {0}")]
    Signature(String),

    /// HTTP request failed at the network level.
    ///
    /// Wraps [`reqwest::Error`]: timeouts, connection refusals, DNS and TLS
    /// failures. Retry with backoff if the operation is idempotent.
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The gateway answered with a non-200 HTTP status.
    #[error("unexpected http status {status}: {body}")]
    Status {
        /// HTTP status code returned by the gateway.
        status: u16,
        /// Response body, for diagnostics.
        body: String,
    },

    /// The gateway reported a communication-level failure
    /// (`return_code = FAIL`).
    ///
    /// Distinct from [`Business`](Self::Business): the request never reached
    /// business processing.
    #[error("gateway refused the request: {0}")]
    Transport(String),

    /// The gateway processed the request and refused it
    /// (`result_code = FAIL`).
    #[error("business failure {code}: {description}")]
    Business {
        /// Remote error code (`err_code`).
        code: String,
        /// Remote human-readable description (`err_code_des`).
        description: String,
    },

    /// Malformed wire data: unparseable XML or a cipher frame whose declared
    /// length exceeds the available payload.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// A request was rejected locally before signing.
    ///
    /// Raised when a per-operation schema rule fails: neither order
    /// identifier supplied, a forced name check without a recipient name, or
    /// an out-of-range red packet without a scene.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl BridgeError {
    /// Stable numeric code for caller branching.
    ///
    /// Positive codes mirror the payment result-handling convention
    /// (100 network, 200 status, 300 gateway refusal, 400 signature,
    /// 500 business, 700 local validation); negative codes mirror the
    /// message-cipher convention (-40004 key, -40005 app id, -40007 cipher,
    /// -40008 frame).
    #[must_use]
    pub fn code(&self) -> i32 {
        match self {
            Self::Config(_) => -40004,
            Self::AppIdMismatch => -40005,
            Self::Cipher(_) => -40007,
            Self::Protocol(_) => -40008,
            Self::Http(_) => 100,
            Self::Status { .. } => 200,
            Self::Transport(_) => 300,
            Self::Signature(_) => 400,
            Self::Business { .. } => 500,
            Self::InvalidRequest(_) => 700,
        }
    }
}
