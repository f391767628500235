//! Gateway response validation.
//!
//! Every response walks the same ladder: decode, check the communication
//! flag, re-verify the declared signature over the remaining fields, check
//! the business flag, then strip transport bookkeeping. Each rung maps to
//! its own error class so callers can branch on [`BridgeError::code`].

use tracing::warn;

use crate::{
    codec::{self, Params, Value},
    config::Credentials,
    error::{BridgeError, Result},
    sign,
};

/// Bookkeeping fields stripped from a validated success payload.
const BOOKKEEPING_FIELDS: &[&str] = &["return_code", "return_msg", "nonce_str", "result_code"];

/// Validates a raw response body and returns the success payload.
///
/// The signature check runs before the business check: a response whose
/// recomputed signature mismatches the declared one is rejected even when
/// its business fields indicate success.
///
/// # Errors
///
/// - [`BridgeError::Protocol`]: unparseable body
/// - [`BridgeError::Transport`]: `return_code = FAIL`
/// - [`BridgeError::Signature`]: declared signature mismatch
/// - [`BridgeError::Business`]: `result_code = FAIL`
pub fn validate(body: &str, credentials: &Credentials) -> Result<Params> {
    let mut response = codec::decode(body)?;

    if response.get_str("return_code") == Some("FAIL") {
        let message = response
            .get_str("return_msg")
            .unwrap_or("gateway returned FAIL with no message")
            .to_owned();
        return Err(BridgeError::Transport(message));
    }

    match response.remove("sign") {
        Some(Value::Leaf(declared)) => {
            let recomputed = sign::sign(&response, &credentials.api_key, credentials.sign_type);
            if recomputed != declared {
                warn!("response signature did not verify");
                return Err(BridgeError::Signature("response signature mismatch".to_owned()));
            }
        }
        Some(Value::Composite(_)) => {
            return Err(BridgeError::Signature("response sign field is not a scalar".to_owned()));
        }
        None => {}
    }

    if response.get_str("result_code") == Some("FAIL") {
        return Err(BridgeError::Business {
            code: response.get_str("err_code").unwrap_or_default().to_owned(),
            description: response.get_str("err_code_des").unwrap_or_default().to_owned(),
        });
    }

    for field in BOOKKEEPING_FIELDS {
        response.remove(field);
    }
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SignType;

    fn credentials() -> Credentials {
        Credentials::from_toml(
            r#"
                app_id = "wx001"
                mch_id = "10000100"
                api_key = "k3y"
            "#,
        )
        .unwrap()
    }

    /// Serializes `params` plus a freshly computed `sign` field.
    fn signed_body(params: &Params) -> String {
        let mut signed = params.clone();
        signed.insert("sign", sign::sign(params, "k3y", SignType::Md5));
        codec::encode(&signed)
    }

    fn success_params() -> Params {
        let mut params = Params::new();
        params.insert("return_code", "SUCCESS");
        params.insert("return_msg", "OK");
        params.insert("result_code", "SUCCESS");
        params.insert("nonce_str", "abc123");
        params.insert("prepay_id", "wx20201127");
        params
    }

    #[test]
    fn test_success_strips_bookkeeping() {
        let payload = validate(&signed_body(&success_params()), &credentials()).unwrap();
        assert_eq!(payload.get_str("prepay_id"), Some("wx20201127"));
        assert!(payload.get("return_code").is_none());
        assert!(payload.get("return_msg").is_none());
        assert!(payload.get("nonce_str").is_none());
        assert!(payload.get("result_code").is_none());
        assert!(payload.get("sign").is_none());
    }

    #[test]
    fn test_return_fail_is_transport_error() {
        let body = "<xml>\
            <return_code><![CDATA[FAIL]]></return_code>\
            <return_msg><![CDATA[appid not found]]></return_msg>\
            </xml>";
        let err = validate(body, &credentials()).unwrap_err();
        assert_eq!(err.code(), 300);
        assert!(err.to_string().contains("appid not found"));
    }

    #[test]
    fn test_signature_mismatch_rejected_despite_success_flags() {
        let mut params = success_params();
        params.insert("sign", "F".repeat(32));
        let err = validate(&codec::encode(&params), &credentials()).unwrap_err();
        assert_eq!(err.code(), 400);
    }

    #[test]
    fn test_tampered_field_breaks_signature() {
        let body = signed_body(&success_params());
        let tampered = body.replace("wx20201127", "wx99999999");
        let err = validate(&tampered, &credentials()).unwrap_err();
        assert_eq!(err.code(), 400);
    }

    #[test]
    fn test_result_fail_is_business_error() {
        let mut params = success_params();
        params.insert("result_code", "FAIL");
        params.insert("err_code", "NOTENOUGH");
        params.insert("err_code_des", "insufficient balance");
        let err = validate(&signed_body(&params), &credentials()).unwrap_err();
        let BridgeError::Business { code, description } = err else {
            panic!("expected business error");
        };
        assert_eq!(code, "NOTENOUGH");
        assert_eq!(description, "insufficient balance");
    }

    #[test]
    fn test_unsigned_response_accepted() {
        // Some gateway failure bodies omit the signature entirely.
        let body = "<xml>\
            <return_code><![CDATA[SUCCESS]]></return_code>\
            <openid><![CDATA[oUpF8]]></openid>\
            </xml>";
        let payload = validate(body, &credentials()).unwrap();
        assert_eq!(payload.get_str("openid"), Some("oUpF8"));
    }

    #[test]
    fn test_garbage_body_is_protocol_error() {
        let err = validate("not xml", &credentials()).unwrap_err();
        assert_eq!(err.code(), -40008);
    }

    #[test]
    fn test_hmac_signed_response_verifies() {
        let hmac_credentials = Credentials::from_toml(
            r#"
                app_id = "wx001"
                mch_id = "10000100"
                api_key = "k3y"
                sign_type = "HMAC-SHA256"
            "#,
        )
        .unwrap();
        let params = success_params();
        let mut signed = params.clone();
        signed.insert("sign", sign::sign(&params, "k3y", SignType::HmacSha256));
        let payload = validate(&codec::encode(&signed), &hmac_credentials).unwrap();
        assert_eq!(payload.get_str("prepay_id"), Some("wx20201127"));
    }
}
