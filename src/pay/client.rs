//! Payment client: build, sign, serialize, dispatch, validate.

use tracing::{debug, instrument};

use crate::{
    audit::WireLog,
    codec::{self, Params},
    config::Credentials,
    error::Result,
    pay::{
        request::{
            sign_package, AuthCodeToOpenid, OrderQuery, PayRequest, RedPackQuery, ReverseOrder,
            SendGroupRedPack, SendRedPack, TradeType, Transfer, TransferQuery, UnifiedOrder,
        },
        response,
    },
    sign,
    transport::{HttpTransport, Transport},
};

/// Client for the payment gateway, bound to one merchant's credentials.
///
/// Credentials are validated at construction and immutable afterwards; the
/// client is safe to share across concurrent calls. Each call owns its own
/// parameter map, performs exactly one transport exchange, and surfaces
/// failures without retrying.
///
/// # Examples
///
/// ```rust,no_run
/// use wxpay_bridge::{
///     codec::Params,
///     config::Credentials,
///     pay::{TradeType, UnifiedOrder, WxPayClient},
/// };
///
/// # async fn example() -> wxpay_bridge::error::Result<()> {
/// let credentials = Credentials::from_toml(r#"
///     app_id = "wx001"
///     mch_id = "10000100"
///     api_key = "k3y"
/// "#)?;
/// let client = WxPayClient::new(credentials)?;
///
/// let order = UnifiedOrder {
///     trade_type: TradeType::Native,
///     out_trade_no: "ORDER-7".to_owned(),
///     total_fee: 100,
///     body: "store-checkout".to_owned(),
///     notify_url: "https://example.com/notify".to_owned(),
///     openid: None,
///     auth_code: None,
///     valid_minutes: Some(30),
///     profit_sharing: None,
///     options: Params::new(),
/// };
///
/// let payload = client.unified_order(&order).await?;
/// println!("prepay_id: {:?}", payload.get_str("prepay_id"));
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct WxPayClient<T = HttpTransport> {
    credentials: Credentials,
    transport: T,
    wire_log: Option<WireLog>,
}

impl WxPayClient<HttpTransport> {
    /// Creates a client with the built-in HTTP transport, loading the
    /// client certificate pair when the credentials configure one.
    ///
    /// # Errors
    ///
    /// Returns [`crate::BridgeError::Config`] on invalid credentials or
    /// unreadable certificate material.
    pub fn new(credentials: Credentials) -> Result<Self> {
        let transport = HttpTransport::from_credentials(&credentials)?;
        Self::with_transport(credentials, transport)
    }
}

impl<T: Transport> WxPayClient<T> {
    /// Creates a client over a caller-supplied transport.
    ///
    /// # Errors
    ///
    /// Returns [`crate::BridgeError::Config`] on invalid credentials.
    pub fn with_transport(credentials: Credentials, transport: T) -> Result<Self> {
        credentials.validate()?;
        let wire_log = credentials.log_dir.clone().map(WireLog::new);
        Ok(Self { credentials, transport, wire_log })
    }

    /// The credentials this client was built with.
    #[must_use]
    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Executes any [`PayRequest`]: build, sign, serialize, dispatch,
    /// validate.
    ///
    /// # Errors
    ///
    /// Propagates schema, transport, signature and business errors; see
    /// [`crate::BridgeError`].
    #[instrument(skip(self, request), fields(operation = ?request.operation()))]
    pub async fn execute<R: PayRequest>(&self, request: &R) -> Result<Params> {
        let operation = request.operation();
        let mut params = request.build(&self.credentials)?;
        let signature = sign::sign(&params, &self.credentials.api_key, self.credentials.sign_type);
        params.insert("sign", signature);
        let body = codec::encode(&params);
        debug!(url = operation.url(), certified = operation.requires_certificate(), "dispatching");

        let result = self
            .transport
            .send(operation.url(), body.as_bytes(), operation.requires_certificate())
            .await;

        if let Some(log) = &self.wire_log {
            let response_text = match &result {
                Ok(response) => response.body_text(),
                Err(e) => format!("error: {e}"),
            };
            log.append(operation.url(), &body, &response_text);
        }

        let response = result?;
        response::validate(&response.body_text(), &self.credentials)
    }

    /// Creates a prepay transaction (or charges a payment code for
    /// `MICROPAY` orders).
    ///
    /// # Errors
    ///
    /// See [`execute`](Self::execute).
    pub async fn unified_order(&self, request: &UnifiedOrder) -> Result<Params> {
        self.execute(request).await
    }

    /// Resolves a payment auth code to the payer's openid.
    ///
    /// # Errors
    ///
    /// See [`execute`](Self::execute).
    pub async fn auth_code_to_openid(&self, request: &AuthCodeToOpenid) -> Result<Params> {
        self.execute(request).await
    }

    /// Queries an order.
    ///
    /// # Errors
    ///
    /// See [`execute`](Self::execute).
    pub async fn order_query(&self, request: &OrderQuery) -> Result<Params> {
        self.execute(request).await
    }

    /// Reverses an order. Requires the merchant certificate.
    ///
    /// # Errors
    ///
    /// See [`execute`](Self::execute).
    pub async fn reverse_order(&self, request: &ReverseOrder) -> Result<Params> {
        self.execute(request).await
    }

    /// Pays out to a user's balance. Requires the merchant certificate.
    ///
    /// # Errors
    ///
    /// See [`execute`](Self::execute).
    pub async fn transfer(&self, request: &Transfer) -> Result<Params> {
        self.execute(request).await
    }

    /// Queries a payout. Requires the merchant certificate.
    ///
    /// # Errors
    ///
    /// See [`execute`](Self::execute).
    pub async fn transfer_query(&self, request: &TransferQuery) -> Result<Params> {
        self.execute(request).await
    }

    /// Sends a single red packet. Requires the merchant certificate.
    ///
    /// # Errors
    ///
    /// See [`execute`](Self::execute).
    pub async fn send_red_pack(&self, request: &SendRedPack) -> Result<Params> {
        self.execute(request).await
    }

    /// Sends a group red packet. Requires the merchant certificate.
    ///
    /// # Errors
    ///
    /// See [`execute`](Self::execute).
    pub async fn send_group_red_pack(&self, request: &SendGroupRedPack) -> Result<Params> {
        self.execute(request).await
    }

    /// Queries a red packet. Requires the merchant certificate.
    ///
    /// # Errors
    ///
    /// See [`execute`](Self::execute).
    pub async fn red_pack_query(&self, request: &RedPackQuery) -> Result<Params> {
        self.execute(request).await
    }

    /// Builds the client-side pay sign package for a prepay id; pure, no
    /// dispatch.
    #[must_use]
    pub fn sign_package(&self, trade_type: TradeType, prepay_id: &str) -> Params {
        sign_package(&self.credentials, trade_type, prepay_id)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::{
        config::SignType,
        error::BridgeError,
        transport::TransportResponse,
    };

    /// Canned-response transport that records what was sent.
    #[derive(Debug)]
    struct MockTransport {
        response_body: String,
        sent: Mutex<Vec<(String, String, bool)>>,
    }

    impl MockTransport {
        fn new(response_body: impl Into<String>) -> Self {
            Self { response_body: response_body.into(), sent: Mutex::new(Vec::new()) }
        }
    }

    impl Transport for MockTransport {
        async fn send<'a>(
            &'a self,
            url: &'a str,
            body: &'a [u8],
            use_client_cert: bool,
        ) -> Result<TransportResponse> {
            self.sent.lock().unwrap().push((
                url.to_owned(),
                String::from_utf8_lossy(body).into_owned(),
                use_client_cert,
            ));
            Ok(TransportResponse { status: 200, body: self.response_body.clone().into_bytes() })
        }
    }

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

    fn signed_response(extra: &[(&str, &str)]) -> String {
        let mut params = Params::new();
        params.insert("return_code", "SUCCESS");
        params.insert("result_code", "SUCCESS");
        for (k, v) in extra {
            params.insert(*k, *v);
        }
        let signature = sign::sign(&params, "k3y", SignType::Md5);
        params.insert("sign", signature);
        codec::encode(&params)
    }

    fn order() -> UnifiedOrder {
        UnifiedOrder {
            trade_type: TradeType::Native,
            out_trade_no: "ORDER-7".to_owned(),
            total_fee: 100,
            body: "store-checkout".to_owned(),
            notify_url: "https://example.com/notify".to_owned(),
            openid: None,
            auth_code: None,
            valid_minutes: None,
            profit_sharing: None,
            options: Params::new(),
        }
    }

    #[tokio::test]
    async fn test_unified_order_roundtrip() {
        let transport = MockTransport::new(signed_response(&[("prepay_id", "wx20201127")]));
        let client = WxPayClient::with_transport(credentials(), transport).unwrap();

        let payload = client.unified_order(&order()).await.unwrap();
        assert_eq!(payload.get_str("prepay_id"), Some("wx20201127"));

        let sent = client.transport.sent.lock().unwrap();
        let (url, body, certified) = &sent[0];
        assert_eq!(url, "https://api.mch.weixin.qq.com/pay/unifiedorder");
        assert!(!certified);
        // The dispatched body carries a verifiable signature.
        let mut dispatched = codec::decode(body).unwrap();
        let declared = dispatched.remove("sign").unwrap();
        let recomputed = sign::sign(&dispatched, "k3y", SignType::Md5);
        assert_eq!(declared.as_leaf(), Some(recomputed.as_str()));
    }

    #[tokio::test]
    async fn test_certified_operation_flags_transport() {
        let transport = MockTransport::new(signed_response(&[]));
        let client = WxPayClient::with_transport(credentials(), transport).unwrap();

        client
            .reverse_order(&ReverseOrder {
                transaction_id: None,
                out_trade_no: Some("ORDER-7".to_owned()),
            })
            .await
            .unwrap();

        let sent = client.transport.sent.lock().unwrap();
        assert_eq!(sent[0].0, "https://api.mch.weixin.qq.com/secapi/pay/reverse");
        assert!(sent[0].2, "reversal must request the client certificate");
    }

    #[tokio::test]
    async fn test_micropay_order_uses_charge_endpoint() {
        let transport = MockTransport::new(signed_response(&[]));
        let client = WxPayClient::with_transport(credentials(), transport).unwrap();

        let mut micropay = order();
        micropay.trade_type = TradeType::Micropay;
        micropay.auth_code = Some("120061098828009406".to_owned());
        client.unified_order(&micropay).await.unwrap();

        let sent = client.transport.sent.lock().unwrap();
        assert_eq!(sent[0].0, "https://api.mch.weixin.qq.com/pay/micropay");
    }

    #[tokio::test]
    async fn test_business_failure_surfaces() {
        let mut params = Params::new();
        params.insert("return_code", "SUCCESS");
        params.insert("result_code", "FAIL");
        params.insert("err_code", "ORDERPAID");
        params.insert("err_code_des", "order already paid");
        let signature = sign::sign(&params, "k3y", SignType::Md5);
        params.insert("sign", signature);

        let transport = MockTransport::new(codec::encode(&params));
        let client = WxPayClient::with_transport(credentials(), transport).unwrap();

        let err = client.unified_order(&order()).await.unwrap_err();
        assert!(matches!(err, BridgeError::Business { .. }));
        assert_eq!(err.code(), 500);
    }

    #[tokio::test]
    async fn test_invalid_request_never_dispatches() {
        let transport = MockTransport::new(signed_response(&[]));
        let client = WxPayClient::with_transport(credentials(), transport).unwrap();

        let err = client.order_query(&OrderQuery::default()).await.unwrap_err();
        assert!(matches!(err, BridgeError::InvalidRequest(_)));
        assert!(client.transport.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_wire_log_records_exchange() {
        let root = tempfile::tempdir().unwrap();
        let mut creds = credentials();
        creds.log_dir = Some(root.path().to_path_buf());

        let transport = MockTransport::new(signed_response(&[]));
        let client = WxPayClient::with_transport(creds, transport).unwrap();
        client.unified_order(&order()).await.unwrap();

        let month_dir =
            root.path().join(chrono::Local::now().format("%Y%m").to_string());
        assert!(month_dir.is_dir());
    }

    #[test]
    fn test_construction_rejects_bad_credentials() {
        let mut creds = credentials();
        creds.encoding_aes_key = Some("too-short".to_owned());
        let err =
            WxPayClient::with_transport(creds, MockTransport::new(String::new())).unwrap_err();
        assert_eq!(err.code(), -40004);
    }
}
