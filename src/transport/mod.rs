//! Transport collaborator seam.
//!
//! The payment client hands a fully signed, serialized request body to a
//! [`Transport`] and gets back the raw status and body. Everything above
//! this seam is synchronous and pure; the transport call is the sole
//! suspension point. The transport enforces no retries and no
//! bridge-specific timeout; bounding the call is the caller's
//! responsibility (configure the HTTP client, or wrap the future).
//!
//! # Examples
//!
//! ```rust,no_run
//! use wxpay_bridge::transport::{HttpTransport, Transport};
//!
//! # async fn example() -> wxpay_bridge::error::Result<()> {
//! let transport = HttpTransport::new()?;
//! let response = transport
//!     .send("https://api.mch.weixin.qq.com/pay/unifiedorder", b"<xml></xml>", false)
//!     .await?;
//! println!("status: {}", response.status);
//! # Ok(())
//! # }
//! ```

use std::future::Future;

use crate::error::Result;

pub mod http;

pub use http::HttpTransport;

/// Response from a transport exchange.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    /// HTTP status code.
    pub status: u16,
    /// Raw response body bytes.
    pub body: Vec<u8>,
}

impl TransportResponse {
    /// Body decoded as UTF-8, lossily.
    #[must_use]
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Transport protocol abstraction.
///
/// Implementations must always verify the server's TLS certificate and
/// attach the client certificate pair only when `use_client_cert` is set:
/// the operations that move money out of the merchant account (reversal,
/// transfers, red packets) require it, the rest must not send it.
///
/// Implement this trait to substitute a recording or canned-response
/// transport in tests.
pub trait Transport: Send + Sync {
    /// Posts `body` to `url` and returns the raw response.
    ///
    /// # Errors
    ///
    /// Returns a transport-class error on network failure or a non-200
    /// status; never inspects the body.
    fn send<'a>(
        &'a self,
        url: &'a str,
        body: &'a [u8],
        use_client_cert: bool,
    ) -> impl Future<Output = Result<TransportResponse>> + Send + 'a;
}
