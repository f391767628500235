//! HTTP transport implementation on reqwest.
//!
//! Server TLS verification is always enabled. A client identity, when
//! configured, lives in a second client instance and is attached only to
//! exchanges that request it.

use std::{sync::LazyLock, time::Duration};

use reqwest::{Client, Identity};
use tracing::instrument;
use url::Url;

use crate::{
    config::Credentials,
    error::{BridgeError, Result},
    transport::{Transport, TransportResponse},
};

/// Default HTTP client with connection pooling enabled.
///
/// Using a singleton avoids recreating the client per transport instance,
/// preserving connection pooling across all default transports.
static DEFAULT_HTTP_CLIENT: LazyLock<Client> = LazyLock::new(|| {
    Client::builder()
        .use_rustls_tls()
        .pool_max_idle_per_host(16)
        .timeout(Duration::from_secs(30))
        .connect_timeout(Duration::from_secs(10))
        .build()
        .expect("default HTTP client construction cannot fail")
});

/// Validates URL scheme and host.
fn validate_url(url: &str) -> Result<Url> {
    let parsed = Url::parse(url)
        .map_err(|e| BridgeError::Transport(format!("invalid gateway url '{url}': {e}")))?;
    if parsed.scheme() != "https" {
        return Err(BridgeError::Transport("only HTTPS gateway urls are allowed".to_owned()));
    }
    Ok(parsed)
}

/// HTTP transport for gateway exchanges.
///
/// # Examples
///
/// ```rust,no_run
/// use wxpay_bridge::{config::Credentials, transport::HttpTransport};
///
/// let credentials = Credentials::from_toml(r#"
///     app_id = "wx001"
///     mch_id = "10000100"
///     api_key = "k3y"
/// "#).unwrap();
/// let transport = HttpTransport::from_credentials(&credentials).unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    /// Client carrying the merchant identity; present only when certificate
    /// paths are configured.
    cert_client: Option<Client>,
}

impl HttpTransport {
    /// Creates a transport without a client certificate.
    ///
    /// Uses a shared singleton client for connection pooling efficiency.
    ///
    /// # Errors
    ///
    /// This method is infallible but returns `Result` for API consistency.
    pub fn new() -> Result<Self> {
        Ok(Self { client: DEFAULT_HTTP_CLIENT.clone(), cert_client: None })
    }

    /// Creates a transport, loading the client certificate pair when the
    /// credentials configure one.
    ///
    /// The certificate and key PEM files are read eagerly so a bad path
    /// fails here, not on the first certificate-bearing operation.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Config`] when certificate material cannot be
    /// read or parsed.
    pub fn from_credentials(credentials: &Credentials) -> Result<Self> {
        let mut transport = Self::new()?;
        if let (Some(cert_path), Some(key_path)) =
            (&credentials.ssl_cert_path, &credentials.ssl_key_path)
        {
            let mut pem = std::fs::read(cert_path).map_err(|e| {
                BridgeError::Config(format!("cannot read {}: {e}", cert_path.display()))
            })?;
            let key = std::fs::read(key_path).map_err(|e| {
                BridgeError::Config(format!("cannot read {}: {e}", key_path.display()))
            })?;
            pem.extend_from_slice(&key);
            let identity = Identity::from_pem(&pem)
                .map_err(|e| BridgeError::Config(format!("bad client certificate: {e}")))?;
            let client = Client::builder()
                .use_rustls_tls()
                .identity(identity)
                .timeout(Duration::from_secs(30))
                .connect_timeout(Duration::from_secs(10))
                .build()
                .map_err(BridgeError::Http)?;
            transport.cert_client = Some(client);
        }
        Ok(transport)
    }
}

impl Transport for HttpTransport {
    #[instrument(skip(self, body), fields(url, use_client_cert, body_len = body.len()))]
    async fn send<'a>(
        &'a self,
        url: &'a str,
        body: &'a [u8],
        use_client_cert: bool,
    ) -> Result<TransportResponse> {
        validate_url(url)?;

        let client = if use_client_cert {
            self.cert_client.as_ref().ok_or_else(|| {
                BridgeError::Config(
                    "operation requires a client certificate but none is configured".to_owned(),
                )
            })?
        } else {
            &self.client
        };

        let response = client
            .post(url)
            .header("Content-Type", "text/xml")
            .body(body.to_vec())
            .send()
            .await?;

        let status = response.status().as_u16();
        let bytes = response.bytes().await.map_err(BridgeError::Http)?;
        if status != 200 {
            return Err(BridgeError::Status {
                status,
                body: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }
        Ok(TransportResponse { status, body: bytes.to_vec() })
    }
}
