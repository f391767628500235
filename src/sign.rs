//! Canonical parameter signing.
//!
//! The gateway signs requests and responses the same way: drop empty and
//! composite entries, sort the remaining keys bytewise, join them as
//! `k1=v1&k2=v2`, append `&key=<secret>`, digest, uppercase the hex. The
//! function is pure: the same map (in any insertion order) always produces
//! the same signature.

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use crate::{
    codec::{Params, Value},
    config::SignType,
};

/// Computes the canonical signature over `params`.
///
/// Entries with empty-string values and nested composites are excluded from
/// the preimage; a `sign` entry, if present, must be removed by the caller
/// before verification.
///
/// # Examples
///
/// ```
/// use wxpay_bridge::{codec::Params, config::SignType, sign::sign};
///
/// let mut params = Params::new();
/// params.insert("b", "2");
/// params.insert("a", "1");
/// // preimage: a=1&b=2&key=k3y
/// assert_eq!(sign(&params, "k3y", SignType::Md5), "905FA76FBA6386E09A56579F7B595A3D");
/// ```
#[must_use]
pub fn sign(params: &Params, secret: &str, algorithm: SignType) -> String {
    let preimage = canonical_string(params, secret);
    let digest = match algorithm {
        SignType::Md5 => format!("{:x}", md5::compute(preimage.as_bytes())),
        SignType::HmacSha256 => {
            let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
                .expect("HMAC accepts keys of any length");
            mac.update(preimage.as_bytes());
            hex::encode(mac.finalize().into_bytes())
        }
        SignType::Sha256 => hex::encode(Sha256::digest(preimage.as_bytes())),
    };
    digest.to_ascii_uppercase()
}

/// Verifies a provided signature against the canonical recomputation.
///
/// Comparison is exact and case-sensitive (signatures are always uppercase
/// hex on the wire).
#[must_use]
pub fn verify(params: &Params, secret: &str, algorithm: SignType, provided: &str) -> bool {
    sign(params, secret, algorithm) == provided
}

/// Builds the sorted `k=v&...&key=secret` preimage.
fn canonical_string(params: &Params, secret: &str) -> String {
    let mut pairs: Vec<(&str, &str)> = params
        .iter()
        .filter_map(|(key, value)| match value {
            Value::Leaf(s) if !s.is_empty() => Some((key, s.as_str())),
            _ => None,
        })
        .collect();
    pairs.sort_unstable_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));

    let mut out = String::new();
    for (i, (key, value)) in pairs.iter().enumerate() {
        if i > 0 {
            out.push('&');
        }
        out.push_str(key);
        out.push('=');
        out.push_str(value);
    }
    out.push_str("&key=");
    out.push_str(secret);
    out
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::codec::Params;

    fn two_params() -> Params {
        let mut params = Params::new();
        params.insert("a", "1");
        params.insert("b", "2");
        params
    }

    #[test]
    fn test_md5_reference_scenario() {
        // MD5("a=1&b=2&key=k3y"), uppercased.
        let expected = format!("{:x}", md5::compute(b"a=1&b=2&key=k3y")).to_ascii_uppercase();
        assert_eq!(sign(&two_params(), "k3y", SignType::Md5), expected);
    }

    #[test]
    fn test_insertion_order_irrelevant() {
        let mut reversed = Params::new();
        reversed.insert("b", "2");
        reversed.insert("a", "1");
        assert_eq!(
            sign(&two_params(), "k3y", SignType::Md5),
            sign(&reversed, "k3y", SignType::Md5)
        );
    }

    #[test]
    fn test_empty_values_excluded() {
        let mut with_empty = two_params();
        with_empty.insert("attach", "");
        assert_eq!(
            sign(&with_empty, "k3y", SignType::Md5),
            sign(&two_params(), "k3y", SignType::Md5)
        );
    }

    #[test]
    fn test_composite_values_excluded() {
        let mut inner = Params::new();
        inner.insert("id", "1");
        let mut with_nested = two_params();
        with_nested.insert("scene_info", crate::codec::Value::Composite(inner));
        assert_eq!(
            sign(&with_nested, "k3y", SignType::Md5),
            sign(&two_params(), "k3y", SignType::Md5)
        );
    }

    #[test]
    fn test_value_change_changes_signature() {
        let mut changed = two_params();
        changed.insert("b", "3");
        assert_ne!(sign(&two_params(), "k3y", SignType::Md5), sign(&changed, "k3y", SignType::Md5));
    }

    #[test]
    fn test_secret_change_changes_signature() {
        assert_ne!(sign(&two_params(), "k3y", SignType::Md5), sign(&two_params(), "k4y", SignType::Md5));
    }

    #[test]
    fn test_hmac_differs_from_unkeyed_sha256() {
        let params = two_params();
        assert_ne!(
            sign(&params, "k3y", SignType::HmacSha256),
            sign(&params, "k3y", SignType::Sha256)
        );
    }

    #[test]
    fn test_sha256_legacy_is_plain_digest() {
        use sha2::{Digest, Sha256};
        let expected = hex::encode(Sha256::digest(b"a=1&b=2&key=k3y")).to_ascii_uppercase();
        assert_eq!(sign(&two_params(), "k3y", SignType::Sha256), expected);
    }

    #[test]
    fn test_output_is_uppercase_hex() {
        let signature = sign(&two_params(), "k3y", SignType::HmacSha256);
        assert_eq!(signature.len(), 64);
        assert!(signature.chars().all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
    }

    #[test]
    fn test_verify_roundtrip() {
        let params = two_params();
        let signature = sign(&params, "k3y", SignType::Md5);
        assert!(verify(&params, "k3y", SignType::Md5, &signature));
        assert!(!verify(&params, "k3y", SignType::Md5, &signature.to_ascii_lowercase()));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn test_signature_is_permutation_invariant(
            entries in proptest::collection::btree_map("[a-z_]{1,12}", "[a-zA-Z0-9]{1,16}", 1..8),
            secret in "[a-zA-Z0-9]{8,32}",
        ) {
            let forward: Params = entries.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
            let backward: Params = entries.iter().rev().map(|(k, v)| (k.clone(), v.clone())).collect();
            prop_assert_eq!(
                sign(&forward, &secret, SignType::Md5),
                sign(&backward, &secret, SignType::Md5)
            );
        }

        #[test]
        fn test_any_value_change_flips_signature(
            entries in proptest::collection::btree_map("[a-z_]{1,12}", "[a-zA-Z0-9]{1,16}", 1..8),
            secret in "[a-zA-Z0-9]{8,32}",
        ) {
            let base: Params = entries.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
            let reference = sign(&base, &secret, SignType::Md5);
            for (key, value) in &entries {
                let mut mutated = base.clone();
                mutated.insert(key.clone(), format!("{value}X"));
                prop_assert_ne!(&sign(&mutated, &secret, SignType::Md5), &reference);
            }
        }
    }
}
