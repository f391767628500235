//! Inbound webhook flow: handshake, message intake, encrypted replies.

use tracing::{debug, instrument, warn};

use crate::{
    cipher::MsgCipher,
    codec::{self, Params},
    config::Credentials,
    error::{BridgeError, Result},
    webhook::{verifier, InboundQuery, SignedEnvelope},
};

/// Handles webhook traffic for one account.
///
/// Holds the verification token and, when the account uses encrypted
/// messaging, the message cipher. Immutable after construction; safe to
/// share across concurrent webhook deliveries.
///
/// # Examples
///
/// ```
/// use wxpay_bridge::{
///     cipher::{EncodingAesKey, MsgCipher},
///     webhook::WebhookHandler,
/// };
///
/// let key = EncodingAesKey::parse("abcdefghijklmnopqrstuvwxyz0123456789ABCDEFG").unwrap();
/// let handler = WebhookHandler::new("t0k3n").with_cipher(MsgCipher::new(key, "wx001"));
/// ```
#[derive(Debug, Clone)]
pub struct WebhookHandler {
    token: String,
    cipher: Option<MsgCipher>,
}

impl WebhookHandler {
    /// Creates a plaintext-only handler with the given verification token.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self { token: token.into(), cipher: None }
    }

    /// Attaches a message cipher for the encrypted pipeline.
    #[must_use]
    pub fn with_cipher(mut self, cipher: MsgCipher) -> Self {
        self.cipher = Some(cipher);
        self
    }

    /// Builds a handler from credentials.
    ///
    /// Requires a configured `token`; attaches a cipher when
    /// `encoding_aes_key` is present.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Config`] when the token is missing or the
    /// AES key is malformed.
    pub fn from_credentials(credentials: &Credentials) -> Result<Self> {
        let token = credentials
            .token
            .as_deref()
            .ok_or_else(|| BridgeError::Config("webhook token is not configured".to_owned()))?;
        let mut handler = Self::new(token);
        if credentials.encoding_aes_key.is_some() {
            handler = handler.with_cipher(MsgCipher::from_credentials(credentials)?);
        }
        Ok(handler)
    }

    /// Verifies that a call originates from the platform.
    ///
    /// Uses the plaintext-channel signature (empty ciphertext slot). The
    /// error carries no detail about which input mismatched.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Signature`] on mismatch.
    pub fn verify_source(&self, query: &InboundQuery) -> Result<()> {
        if verifier::verify("", &self.token, &query.timestamp, &query.nonce, &query.signature) {
            Ok(())
        } else {
            warn!("webhook source signature rejected");
            Err(BridgeError::Signature("webhook signature mismatch".to_owned()))
        }
    }

    /// Answers the handshake probe.
    ///
    /// Verifies the source signature and returns the `echostr` value to be
    /// echoed back verbatim.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Signature`] on a bad signature and
    /// [`BridgeError::Protocol`] when the probe carries no `echostr`.
    pub fn handshake<'q>(&self, query: &'q InboundQuery) -> Result<&'q str> {
        self.verify_source(query)?;
        query
            .echostr
            .as_deref()
            .ok_or_else(|| BridgeError::Protocol("handshake probe without echostr".to_owned()))
    }

    /// Processes an inbound message delivery and returns the decoded
    /// message map.
    ///
    /// Plaintext deliveries decode the body directly. Encrypted deliveries
    /// (`encrypt_type=aes`) extract the `Encrypt` element, check
    /// `msg_signature` when the platform sent one, decrypt, and decode the
    /// inner document.
    ///
    /// # Errors
    ///
    /// - [`BridgeError::Signature`]: source or message signature mismatch
    /// - [`BridgeError::Config`]: encrypted delivery without a cipher
    /// - cipher/codec errors are propagated unchanged
    #[instrument(skip(self, body), fields(encrypted = query.is_encrypted()))]
    pub fn handle_message(&self, query: &InboundQuery, body: &str) -> Result<Params> {
        self.verify_source(query)?;

        if !query.is_encrypted() {
            return codec::decode(body);
        }

        let cipher = self.cipher.as_ref().ok_or_else(|| {
            BridgeError::Config("encrypted delivery but no encoding_aes_key configured".to_owned())
        })?;

        let envelope = SignedEnvelope::from_body(
            body,
            query.msg_signature.as_deref().unwrap_or_default(),
            &query.timestamp,
            &query.nonce,
        )?;

        // The platform signs the ciphertext separately in encrypted mode;
        // a missing or empty msg_signature skips this check.
        if !envelope.msg_signature.is_empty() && !envelope.verify(&self.token) {
            warn!("webhook message signature rejected");
            return Err(BridgeError::Signature("message signature mismatch".to_owned()));
        }

        let plaintext = cipher.decrypt(&envelope.encrypt)?;
        if plaintext.is_empty() {
            debug!("encrypted delivery decoded to the empty signal");
            return Ok(Params::new());
        }
        codec::decode(&plaintext)
    }

    /// Builds an encrypted, signed reply document for `reply`.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Config`] when no cipher is attached, or
    /// cipher errors from encryption.
    pub fn encrypted_reply(&self, reply: &Params, nonce: Option<&str>) -> Result<String> {
        let cipher = self.cipher.as_ref().ok_or_else(|| {
            BridgeError::Config("encrypted reply requested but no encoding_aes_key configured".to_owned())
        })?;
        let plaintext = codec::encode(reply);
        let envelope = SignedEnvelope::seal(cipher, &self.token, &plaintext, nonce)?;
        Ok(envelope.to_xml())
    }

    /// Builds a plaintext reply document for `reply`.
    #[must_use]
    pub fn plain_reply(&self, reply: &Params) -> String {
        codec::encode(reply)
    }
}
