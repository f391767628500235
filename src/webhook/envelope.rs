//! Signed ciphertext envelopes.
//!
//! An envelope couples the base64 ciphertext with the signature material
//! that authenticates it: `(signature, timestamp, nonce)`. Inbound, the
//! ciphertext arrives in the XML body's `Encrypt` element while the
//! signature fields ride in the query string; outbound, all four travel in
//! one `<xml>` reply document.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::{
    cipher::MsgCipher,
    codec::{self, Params},
    error::{BridgeError, Result},
    nonce::nonce_str,
    webhook::verifier,
};

/// A ciphertext with its authenticating signature, timestamp and nonce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedEnvelope {
    /// Base64 AES ciphertext.
    pub encrypt: String,
    /// Sort-then-SHA1 signature over `(encrypt, token, timestamp, nonce)`.
    pub msg_signature: String,
    /// Signature timestamp (seconds since the epoch, as a string).
    pub timestamp: String,
    /// Signature nonce.
    pub nonce: String,
}

impl SignedEnvelope {
    /// Encrypts `plaintext` and signs the resulting ciphertext.
    ///
    /// `nonce` defaults to a fresh 16-character value when not supplied.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Cipher`] when encryption fails.
    pub fn seal(
        cipher: &MsgCipher,
        token: &str,
        plaintext: &str,
        nonce: Option<&str>,
    ) -> Result<Self> {
        let encrypt = cipher.encrypt(plaintext)?;
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| BridgeError::Cipher(format!("system time error: {e}")))?
            .as_secs()
            .to_string();
        let nonce = nonce.map_or_else(|| nonce_str(16), str::to_owned);
        let msg_signature = verifier::message_signature(&encrypt, token, &timestamp, &nonce);
        Ok(Self { encrypt, msg_signature, timestamp, nonce })
    }

    /// Serializes the envelope to its reply XML form.
    #[must_use]
    pub fn to_xml(&self) -> String {
        let mut params = Params::new();
        params.insert("Encrypt", self.encrypt.as_str());
        params.insert("MsgSignature", self.msg_signature.as_str());
        params.insert("TimeStamp", self.timestamp.as_str());
        params.insert("Nonce", self.nonce.as_str());
        codec::encode(&params)
    }

    /// Reassembles an inbound envelope from the XML body and the query's
    /// signature fields.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Protocol`] when the body has no `Encrypt`
    /// element.
    pub fn from_body(
        body: &str,
        msg_signature: &str,
        timestamp: &str,
        nonce: &str,
    ) -> Result<Self> {
        let params = codec::decode(body)?;
        let encrypt = params
            .get_str("Encrypt")
            .ok_or_else(|| BridgeError::Protocol("body carries no Encrypt element".to_owned()))?;
        Ok(Self {
            encrypt: encrypt.to_owned(),
            msg_signature: msg_signature.to_owned(),
            timestamp: timestamp.to_owned(),
            nonce: nonce.to_owned(),
        })
    }

    /// Verifies the envelope signature against `token`.
    #[must_use]
    pub fn verify(&self, token: &str) -> bool {
        verifier::verify(&self.encrypt, token, &self.timestamp, &self.nonce, &self.msg_signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cipher::EncodingAesKey;

    const TEST_KEY: &str = "abcdefghijklmnopqrstuvwxyz0123456789ABCDEFG";

    fn cipher() -> MsgCipher {
        MsgCipher::new(EncodingAesKey::parse(TEST_KEY).unwrap(), "wx001")
    }

    #[test]
    fn test_seal_produces_verifiable_envelope() {
        let envelope = SignedEnvelope::seal(&cipher(), "t0k3n", "<xml></xml>", None).unwrap();
        assert!(envelope.verify("t0k3n"));
        assert!(!envelope.verify("other"));
        assert_eq!(envelope.nonce.len(), 16);
    }

    #[test]
    fn test_seal_honors_caller_nonce() {
        let envelope =
            SignedEnvelope::seal(&cipher(), "t0k3n", "<xml></xml>", Some("fixednonce")).unwrap();
        assert_eq!(envelope.nonce, "fixednonce");
        assert!(envelope.verify("t0k3n"));
    }

    #[test]
    fn test_to_xml_roundtrips_through_codec() {
        let envelope = SignedEnvelope::seal(&cipher(), "t0k3n", "<xml></xml>", None).unwrap();
        let xml = envelope.to_xml();
        let reparsed =
            SignedEnvelope::from_body(&xml, &envelope.msg_signature, &envelope.timestamp, &envelope.nonce)
                .unwrap();
        assert_eq!(reparsed, envelope);
    }

    #[test]
    fn test_from_body_requires_encrypt_element() {
        let err = SignedEnvelope::from_body("<xml><Other>1</Other></xml>", "s", "t", "n")
            .unwrap_err();
        assert!(matches!(err, BridgeError::Protocol(_)));
    }

    #[test]
    fn test_sealed_payload_decrypts() {
        let envelope = SignedEnvelope::seal(&cipher(), "t0k3n", "<xml><a>1</a></xml>", None).unwrap();
        assert_eq!(cipher().decrypt(&envelope.encrypt).unwrap(), "<xml><a>1</a></xml>");
    }
}
