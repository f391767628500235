//! WeChat Pay Bridge: request signing and message security for the WeChat
//! platform's v2 APIs.
//!
//! This library implements the two protocol surfaces a WeChat integration
//! has to get byte-exact:
//!
//! - **Payment pipeline**: canonical parameter signing (MD5 / HMAC-SHA256),
//!   the gateway's flat/nested XML wire dialect, per-operation request
//!   schemas with optional-field allow-lists, and response validation with
//!   distinct transport/signature/business failure classes.
//! - **Webhook message security**: sort-then-SHA1 handshake and message
//!   signatures, plus the AES-256-CBC cipher with the platform's framing
//!   (random prefix ‖ length ‖ payload ‖ app id) for encrypted deliveries
//!   and replies.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐         ┌───────────────────┐
//! │  Your service    │         │  WeChat platform  │
//! └───────┬──────────┘         └─────────▲─────────┘
//!         │                              │ XML + signatures
//! ┌───────▼──────────────────────────────┴─────────┐
//! │              wxpay-bridge (this crate)         │
//! │  ┌───────────┐  ┌──────────┐  ┌─────────────┐  │
//! │  │ pay       │──│ sign     │  │ webhook     │  │
//! │  │ (schemas, │  │ (MD5/    │  │ (SHA1 +     │  │
//! │  │  client)  │  │  HMAC)   │  │  cipher)    │  │
//! │  └─────┬─────┘  └──────────┘  └──────┬──────┘  │
//! │  ┌─────▼─────┐  ┌──────────┐  ┌──────▼──────┐  │
//! │  │ transport │  │ codec    │  │ cipher      │  │
//! │  │ (reqwest) │  │ (XML)    │  │ (AES-CBC)   │  │
//! │  └───────────┘  └──────────┘  └─────────────┘  │
//! └────────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ## 1. Create an order
//!
//! ```rust,no_run
//! use wxpay_bridge::{
//!     codec::Params,
//!     config::Credentials,
//!     pay::{TradeType, UnifiedOrder, WxPayClient},
//! };
//!
//! # async fn example() -> wxpay_bridge::error::Result<()> {
//! let credentials = Credentials::from_toml(r#"
//!     app_id = "wx001"
//!     mch_id = "10000100"
//!     api_key = "k3y"
//! "#)?;
//! let client = WxPayClient::new(credentials)?;
//!
//! let order = UnifiedOrder {
//!     trade_type: TradeType::Native,
//!     out_trade_no: "ORDER-7".to_owned(),
//!     total_fee: 100, // minor currency units
//!     body: "store-checkout".to_owned(),
//!     notify_url: "https://example.com/notify".to_owned(),
//!     openid: None,
//!     auth_code: None,
//!     valid_minutes: Some(30),
//!     profit_sharing: None,
//!     options: Params::new(),
//! };
//!
//! let payload = client.unified_order(&order).await?;
//! println!("prepay_id: {:?}", payload.get_str("prepay_id"));
//! # Ok(())
//! # }
//! ```
//!
//! ## 2. Serve the webhook
//!
//! ```rust
//! use wxpay_bridge::{
//!     cipher::{EncodingAesKey, MsgCipher},
//!     webhook::{InboundQuery, WebhookHandler},
//! };
//!
//! # fn example(query: InboundQuery, body: &str) -> wxpay_bridge::error::Result<()> {
//! let key = EncodingAesKey::parse("abcdefghijklmnopqrstuvwxyz0123456789ABCDEFG")?;
//! let handler = WebhookHandler::new("t0k3n").with_cipher(MsgCipher::new(key, "wx001"));
//!
//! // GET probe: echo back after verification.
//! if let Some(_echostr) = &query.echostr {
//!     let echo = handler.handshake(&query)?;
//!     println!("{echo}");
//!     return Ok(());
//! }
//!
//! // POST delivery: plaintext or AES, decided by the query.
//! let message = handler.handle_message(&query, body)?;
//! println!("MsgType: {:?}", message.get_str("MsgType"));
//! # Ok(())
//! # }
//! ```
//!
//! # Module Organization
//!
//! - [`codec`]: the XML wire dialect over an ordered parameter map
//! - [`sign`]: canonical parameter signing and verification
//! - [`cipher`]: AES-256-CBC message cipher with protocol framing
//! - [`webhook`]: handshake/message verification, envelopes, replies
//! - [`pay`]: per-operation request schemas, client, response validation
//! - [`transport`]: the HTTP collaborator seam (swap in a mock for tests)
//! - [`config`]: immutable credentials
//! - [`audit`]: optional append-only wire log
//! - [`error`]: error taxonomy with stable codes
//!
//! # Security Notes
//!
//! - Server TLS verification is always on; the merchant client certificate
//!   is attached only to the operations that require it (reversal,
//!   transfers, red packets).
//! - The AES key is validated (43 base64 characters → 32 bytes) before any
//!   cipher call; a bad key never reaches AES.
//! - Webhook signature failures terminate handling without detail about
//!   which input mismatched.
//! - XML decoding performs no external entity resolution.
//!
//! # Concurrency
//!
//! Credentials are immutable after construction; clients and handlers are
//! shareable across tasks. Each call owns its parameter map. The transport
//! exchange is the only suspension point; bound it with a timeout at the
//! call site; the bridge neither retries nor cancels internally.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

pub mod audit;
pub mod cipher;
pub mod codec;
pub mod config;
pub mod error;
pub mod nonce;
pub mod pay;
pub mod sign;
pub mod transport;
pub mod webhook;

pub use cipher::{EncodingAesKey, MsgCipher};
pub use codec::{Params, Value};
pub use config::{Credentials, SignType};
pub use error::{BridgeError, Result};
pub use pay::WxPayClient;
pub use webhook::WebhookHandler;
