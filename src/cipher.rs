//! AES-256-CBC message cipher with the gateway's framing.
//!
//! Encrypted webhook payloads are framed as
//! `random(16) ‖ u32_be(len) ‖ payload ‖ app_id`, padded with a byte-count
//! scheme to a 32-byte boundary, encrypted with AES-256-CBC (IV = first 16
//! key bytes) and base64-encoded.
//!
//! Decryption is tolerant on the padding byte: a value outside `1..=32` is
//! clamped to 0 rather than rejected, and a frame shorter than 16 bytes
//! after unpadding decodes to the protocol's empty result, not an error.
//! The embedded app id is always checked before the payload is released.

use aes::Aes256;
use base64::{
    alphabet,
    engine::{general_purpose, GeneralPurpose, GeneralPurposeConfig},
    Engine,
};
use cbc::{
    cipher::{block_padding::NoPadding, BlockDecryptMut, BlockEncryptMut, KeyIvInit},
    Decryptor, Encryptor,
};
use rand::RngCore;

use crate::{
    config::{Credentials, ENCODING_AES_KEY_LEN},
    error::{BridgeError, Result},
};

/// Frame padding block size. Larger than the AES block so the pad byte can
/// range over `1..=32`, matching the decrypt-side tolerance window.
const FRAME_BLOCK: usize = 32;

/// Length of the random prefix and of the IV.
const PREFIX_LEN: usize = 16;

/// Key decoding is lenient about the 2 trailing bits the 43rd character
/// carries past the 256th: keys are arbitrary characters, not canonical
/// base64 output.
const KEY_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_allow_trailing_bits(true),
);

/// Validated 32-byte message-encoding key.
///
/// The configured form is 43 base64 characters without trailing padding;
/// [`parse`](Self::parse) appends the single `=` and requires the decoded
/// key to be exactly 32 bytes. Construction is the only place key shape is
/// checked; every cipher operation starts from a valid key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodingAesKey([u8; 32]);

impl EncodingAesKey {
    /// Parses and validates the 43-character configured key.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Config`] when the key is not 43 characters,
    /// is not valid base64, or does not decode to 32 bytes. This fires
    /// before any AES call.
    pub fn parse(encoded: &str) -> Result<Self> {
        if encoded.len() != ENCODING_AES_KEY_LEN {
            return Err(BridgeError::Config(format!(
                "encoding_aes_key must be {ENCODING_AES_KEY_LEN} characters, got {}",
                encoded.len()
            )));
        }
        let raw = KEY_ENGINE
            .decode(format!("{encoded}="))
            .map_err(|e| BridgeError::Config(format!("encoding_aes_key is not base64: {e}")))?;
        let key: [u8; 32] = raw
            .try_into()
            .map_err(|_| BridgeError::Config("encoding_aes_key must decode to 32 bytes".to_owned()))?;
        Ok(Self(key))
    }

    /// Raw key bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// The cipher IV: the first 16 key bytes.
    fn iv(&self) -> [u8; PREFIX_LEN] {
        let mut iv = [0u8; PREFIX_LEN];
        iv.copy_from_slice(&self.0[..PREFIX_LEN]);
        iv
    }
}

/// AES-256-CBC cipher bound to one account's key and app id.
#[derive(Debug, Clone)]
pub struct MsgCipher {
    key: EncodingAesKey,
    app_id: String,
}

impl MsgCipher {
    /// Creates a cipher from a validated key and the owning app id.
    #[must_use]
    pub fn new(key: EncodingAesKey, app_id: impl Into<String>) -> Self {
        Self { key, app_id: app_id.into() }
    }

    /// Creates a cipher from credentials.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Config`] when no `encoding_aes_key` is
    /// configured or the configured key is malformed.
    pub fn from_credentials(credentials: &Credentials) -> Result<Self> {
        let encoded = credentials
            .encoding_aes_key
            .as_deref()
            .ok_or_else(|| BridgeError::Config("encoding_aes_key is not configured".to_owned()))?;
        Ok(Self::new(EncodingAesKey::parse(encoded)?, credentials.app_id.clone()))
    }

    /// Encrypts a plaintext message into base64 ciphertext.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Cipher`] when the frame cannot be encrypted.
    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let declared = u32::try_from(plaintext.len())
            .map_err(|_| BridgeError::Cipher("plaintext exceeds frame length field".to_owned()))?;

        let mut frame =
            Vec::with_capacity(PREFIX_LEN + 4 + plaintext.len() + self.app_id.len() + FRAME_BLOCK);
        let mut prefix = [0u8; PREFIX_LEN];
        rand::thread_rng().fill_bytes(&mut prefix);
        frame.extend_from_slice(&prefix);
        frame.extend_from_slice(&declared.to_be_bytes());
        frame.extend_from_slice(plaintext.as_bytes());
        frame.extend_from_slice(self.app_id.as_bytes());

        // Byte-count padding over the 32-byte frame block: always pads,
        // value = length, 1..=32.
        let pad = FRAME_BLOCK - (frame.len() % FRAME_BLOCK);
        frame.resize(frame.len() + pad, pad as u8);

        let len = frame.len();
        let ciphertext = Encryptor::<Aes256>::new(self.key.as_bytes().into(), &self.key.iv().into())
            .encrypt_padded_mut::<NoPadding>(&mut frame, len)
            .map_err(|_| BridgeError::Cipher("frame is not block aligned".to_owned()))?;
        Ok(general_purpose::STANDARD.encode(ciphertext))
    }

    /// Decrypts base64 ciphertext and returns the framed payload.
    ///
    /// Returns an empty string for the protocol's "empty" signal (fewer
    /// than 16 bytes remain after unpadding).
    ///
    /// # Errors
    ///
    /// - [`BridgeError::Cipher`]: bad base64 or block-misaligned data
    /// - [`BridgeError::Protocol`]: frame header truncated, or a declared
    ///   length exceeding the available payload
    /// - [`BridgeError::AppIdMismatch`]: embedded app id differs; the
    ///   payload is withheld
    pub fn decrypt(&self, ciphertext: &str) -> Result<String> {
        let mut data = general_purpose::STANDARD
            .decode(ciphertext.trim())
            .map_err(|e| BridgeError::Cipher(format!("ciphertext is not base64: {e}")))?;
        if data.is_empty() || data.len() % 16 != 0 {
            return Err(BridgeError::Cipher("ciphertext is not block aligned".to_owned()));
        }

        let plain = Decryptor::<Aes256>::new(self.key.as_bytes().into(), &self.key.iv().into())
            .decrypt_padded_mut::<NoPadding>(&mut data)
            .map_err(|_| BridgeError::Cipher("aes decryption failed".to_owned()))?;

        // Tolerant unpad: out-of-range pad byte is clamped to 0, never an error.
        let pad = plain.last().map_or(0, |b| usize::from(*b));
        let pad = if (1..=FRAME_BLOCK).contains(&pad) { pad } else { 0 };
        let body = &plain[..plain.len() - pad];

        if body.len() < PREFIX_LEN {
            return Ok(String::new());
        }

        let content = &body[PREFIX_LEN..];
        if content.len() < 4 {
            return Err(BridgeError::Protocol("frame shorter than its length field".to_owned()));
        }
        let declared =
            u32::from_be_bytes([content[0], content[1], content[2], content[3]]) as usize;
        let rest = &content[4..];
        if declared > rest.len() {
            return Err(BridgeError::Protocol(format!(
                "declared payload length {declared} exceeds frame remainder {}",
                rest.len()
            )));
        }

        let payload = &rest[..declared];
        let embedded = &rest[declared..];
        if embedded != self.app_id.as_bytes() {
            return Err(BridgeError::AppIdMismatch);
        }

        String::from_utf8(payload.to_vec())
            .map_err(|_| BridgeError::Protocol("payload is not valid utf-8".to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    const TEST_KEY: &str = "abcdefghijklmnopqrstuvwxyz0123456789ABCDEFG";

    fn cipher() -> MsgCipher {
        MsgCipher::new(EncodingAesKey::parse(TEST_KEY).unwrap(), "wx001")
    }

    /// Encrypts a raw, pre-padded frame directly, bypassing `encrypt`.
    fn encrypt_raw(frame: &[u8]) -> String {
        let key = EncodingAesKey::parse(TEST_KEY).unwrap();
        let mut buf = frame.to_vec();
        let len = buf.len();
        let ciphertext = Encryptor::<Aes256>::new(key.as_bytes().into(), &key.iv().into())
            .encrypt_padded_mut::<NoPadding>(&mut buf, len)
            .unwrap();
        general_purpose::STANDARD.encode(ciphertext)
    }

    #[test]
    fn test_key_must_be_43_chars() {
        let err = EncodingAesKey::parse(&"a".repeat(42)).unwrap_err();
        assert_eq!(err.code(), -40004);
        assert!(EncodingAesKey::parse(&"a".repeat(44)).is_err());
        assert!(EncodingAesKey::parse(TEST_KEY).is_ok());
    }

    #[test]
    fn test_key_must_be_base64() {
        assert!(EncodingAesKey::parse(&"!".repeat(43)).is_err());
    }

    #[test]
    fn test_roundtrip() {
        let plaintext = "<xml><MsgType><![CDATA[text]]></MsgType></xml>";
        let encrypted = cipher().encrypt(plaintext).unwrap();
        assert_eq!(cipher().decrypt(&encrypted).unwrap(), plaintext);
    }

    #[test]
    fn test_roundtrip_empty_plaintext() {
        let encrypted = cipher().encrypt("").unwrap();
        assert_eq!(cipher().decrypt(&encrypted).unwrap(), "");
    }

    #[test]
    fn test_random_prefix_varies_ciphertext() {
        let a = cipher().encrypt("same message").unwrap();
        let b = cipher().encrypt("same message").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_app_id_mismatch_withholds_payload() {
        let encrypted = cipher().encrypt("secret payload").unwrap();
        let other = MsgCipher::new(EncodingAesKey::parse(TEST_KEY).unwrap(), "wx999");
        let err = other.decrypt(&encrypted).unwrap_err();
        assert!(matches!(err, BridgeError::AppIdMismatch));
    }

    #[test]
    fn test_short_frame_is_empty_result() {
        // A single 16-byte block of pad value 16 strips to nothing.
        let encrypted = encrypt_raw(&[16u8; 16]);
        assert_eq!(cipher().decrypt(&encrypted).unwrap(), "");
    }

    #[test]
    fn test_out_of_range_pad_clamped_to_zero() {
        // 32-byte frame ending in the app id; last byte 0x31 ('1') is outside
        // 1..=32, so no padding is stripped and the frame parses whole.
        let mut frame = Vec::new();
        frame.extend_from_slice(&[0u8; 16]);
        frame.extend_from_slice(&7u32.to_be_bytes());
        frame.extend_from_slice(b"payload");
        frame.extend_from_slice(b"wx001");
        assert_eq!(frame.len(), 32);

        let encrypted = encrypt_raw(&frame);
        assert_eq!(cipher().decrypt(&encrypted).unwrap(), "payload");
    }

    #[test]
    fn test_declared_length_must_bound_payload() {
        let mut frame = Vec::new();
        frame.extend_from_slice(&[0u8; 16]);
        frame.extend_from_slice(&1000u32.to_be_bytes());
        frame.extend_from_slice(b"tiny");
        let pad = 32 - (frame.len() % 32);
        frame.resize(frame.len() + pad, pad as u8);

        let encrypted = encrypt_raw(&frame);
        let err = cipher().decrypt(&encrypted).unwrap_err();
        assert!(matches!(err, BridgeError::Protocol(_)));
    }

    #[test]
    fn test_garbage_base64_is_cipher_error() {
        let err = cipher().decrypt("not base64 at all!!!").unwrap_err();
        assert!(matches!(err, BridgeError::Cipher(_)));
    }

    #[test]
    fn test_misaligned_ciphertext_rejected() {
        let b64 = general_purpose::STANDARD.encode([1u8; 15]);
        assert!(matches!(cipher().decrypt(&b64).unwrap_err(), BridgeError::Cipher(_)));
    }

    #[test]
    fn test_from_credentials_requires_key() {
        let credentials = Credentials::from_toml(
            r#"
                app_id = "wx001"
                mch_id = "10000100"
                api_key = "k3y"
            "#,
        )
        .unwrap();
        assert!(MsgCipher::from_credentials(&credentials).is_err());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn test_roundtrip_property(plaintext in "[ -~]{0,512}") {
            let c = cipher();
            let encrypted = c.encrypt(&plaintext).unwrap();
            prop_assert_eq!(c.decrypt(&encrypted).unwrap(), plaintext);
        }
    }
}
