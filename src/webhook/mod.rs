//! Inbound webhook verification and message handling.
//!
//! The platform calls the webhook in two modes, both authenticated by the
//! same sort-then-SHA1 signature over `(ciphertext-or-empty, token,
//! timestamp, nonce)`:
//!
//! - **Handshake probe**: a GET carrying `signature`/`timestamp`/`nonce`/
//!   `echostr`; the endpoint proves ownership by echoing `echostr` after
//!   verifying the signature (empty ciphertext slot).
//! - **Message delivery**: a POST whose XML body optionally carries an
//!   `Encrypt` element (when `encrypt_type=aes`); the encrypted form adds a
//!   `msg_signature` query field computed over the ciphertext.
//!
//! Signature failures terminate handling immediately and carry no detail
//! about which input mismatched.

use serde::Deserialize;

pub mod envelope;
pub mod handler;
pub mod verifier;

pub use envelope::SignedEnvelope;
pub use handler::WebhookHandler;
pub use verifier::{message_signature, verify};

/// Query fields the platform sends with every webhook call.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InboundQuery {
    /// Plaintext-channel signature over `(token, timestamp, nonce)`.
    #[serde(default)]
    pub signature: String,
    /// Signature timestamp, passed through verbatim.
    #[serde(default)]
    pub timestamp: String,
    /// Signature nonce, passed through verbatim.
    #[serde(default)]
    pub nonce: String,
    /// Handshake probe value; present only on the verification GET.
    #[serde(default)]
    pub echostr: Option<String>,
    /// Encryption mode; `"aes"` selects the encrypted pipeline.
    #[serde(default)]
    pub encrypt_type: Option<String>,
    /// Signature over the ciphertext, present in encrypted mode.
    #[serde(default)]
    pub msg_signature: Option<String>,
}

impl InboundQuery {
    /// True when the sender declared the AES-encrypted pipeline.
    #[must_use]
    pub fn is_encrypted(&self) -> bool {
        self.encrypt_type.as_deref() == Some("aes")
    }
}
