//! Sort-then-SHA1 webhook signature verification.

use sha1::{Digest, Sha1};

/// Computes the webhook signature over the four protocol inputs.
///
/// The inputs are sorted lexicographically as strings, concatenated with no
/// separator, and SHA1-hashed to lowercase hex. The plaintext handshake
/// passes an empty string in the ciphertext slot; the encrypted-message
/// signature passes the base64 ciphertext.
///
/// # Examples
///
/// ```
/// use wxpay_bridge::webhook::message_signature;
///
/// let signature = message_signature("", "t0k3n", "1604400000", "n0nc3");
/// assert_eq!(signature.len(), 40);
/// ```
#[must_use]
pub fn message_signature(encrypt: &str, token: &str, timestamp: &str, nonce: &str) -> String {
    let mut parts = [encrypt, token, timestamp, nonce];
    parts.sort_unstable();
    let mut hasher = Sha1::new();
    for part in parts {
        hasher.update(part.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Verifies a provided webhook signature. Comparison is case-sensitive.
#[must_use]
pub fn verify(
    encrypt: &str,
    token: &str,
    timestamp: &str,
    nonce: &str,
    provided: &str,
) -> bool {
    message_signature(encrypt, token, timestamp, nonce) == provided
}

#[cfg(test)]
mod tests {
    use sha1::{Digest, Sha1};

    use super::*;

    #[test]
    fn test_signature_is_sorted_concatenation_sha1() {
        // Inputs chosen so the sorted order differs from argument order.
        let expected = hex::encode(Sha1::digest(b"123abcnnntok"));
        assert_eq!(message_signature("abc", "tok", "123", "nnn"), expected);
    }

    #[test]
    fn test_handshake_uses_empty_ciphertext_slot() {
        let expected = hex::encode(Sha1::digest(b"1604400000n0nc3t0k3n"));
        assert_eq!(message_signature("", "t0k3n", "1604400000", "n0nc3"), expected);
    }

    #[test]
    fn test_verify_accepts_own_signature() {
        let signature = message_signature("cipher", "tok", "160", "abc");
        assert!(verify("cipher", "tok", "160", "abc", &signature));
    }

    #[test]
    fn test_single_character_change_flips_result() {
        let signature = message_signature("cipher", "tok", "160", "abc");
        assert!(!verify("ciphes", "tok", "160", "abc", &signature));
        assert!(!verify("cipher", "toj", "160", "abc", &signature));
        assert!(!verify("cipher", "tok", "161", "abc", &signature));
        assert!(!verify("cipher", "tok", "160", "abd", &signature));
    }

    #[test]
    fn test_comparison_is_case_sensitive() {
        let signature = message_signature("", "tok", "160", "abc");
        assert!(!verify("", "tok", "160", "abc", &signature.to_ascii_uppercase()));
    }
}
