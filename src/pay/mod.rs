//! Payment request pipeline.
//!
//! A typed request ([`UnifiedOrder`], [`Transfer`], …) builds a parameter
//! map from the immutable [`crate::config::Credentials`] and the call
//! inputs; the client signs it, serializes it to the XML dialect, posts it
//! through the transport collaborator (attaching the merchant certificate
//! for the operations that require it), and validates the response through
//! the decode → signature → business-result ladder.

pub mod client;
pub mod request;
pub mod response;

pub use client::WxPayClient;
pub use request::{
    sign_package, AuthCodeToOpenid, CheckName, Operation, OrderQuery, PayRequest, RedPackQuery,
    RedPackScene, ReverseOrder, SendGroupRedPack, SendRedPack, TradeType, Transfer, TransferQuery,
    UnifiedOrder,
};
pub use response::validate;
