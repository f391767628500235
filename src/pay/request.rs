//! Per-operation request schemas.
//!
//! Each gateway operation is a typed struct: required fields are plain
//! struct members, conditional rules are checked in [`PayRequest::build`],
//! and free-form extras pass through an explicit per-operation allow-list;
//! caller-supplied keys outside the list are silently dropped.

use chrono::{Duration, Local};
use tracing::debug;

use crate::{
    codec::Params,
    config::Credentials,
    error::{BridgeError, Result},
    nonce::nonce_str,
};

/// Gateway operation classification.
///
/// Determines the endpoint URL and whether the exchange must present the
/// merchant client certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Create a prepay transaction (JSAPI/NATIVE/APP/MWEB).
    UnifiedOrder,
    /// Charge a scanned payment code directly.
    Micropay,
    /// Resolve a payment auth code to the payer's openid.
    AuthCodeToOpenid,
    /// Query an order by gateway or merchant id.
    OrderQuery,
    /// Reverse an order with no definite payment result.
    ReverseOrder,
    /// Pay out to a user's balance.
    Transfer,
    /// Query a payout result.
    TransferQuery,
    /// Send a single red packet.
    SendRedPack,
    /// Send a splittable group red packet.
    SendGroupRedPack,
    /// Query a red packet by merchant bill number.
    RedPackQuery,
}

impl Operation {
    /// Fixed endpoint URL for the operation.
    #[must_use]
    pub const fn url(self) -> &'static str {
        match self {
            Self::UnifiedOrder => "https://api.mch.weixin.qq.com/pay/unifiedorder",
            Self::Micropay => "https://api.mch.weixin.qq.com/pay/micropay",
            Self::AuthCodeToOpenid => "https://api.mch.weixin.qq.com/tools/authcodetoopenid",
            Self::OrderQuery => "https://api.mch.weixin.qq.com/pay/orderquery",
            Self::ReverseOrder => "https://api.mch.weixin.qq.com/secapi/pay/reverse",
            Self::Transfer => {
                "https://api.mch.weixin.qq.com/mmpaymkttransfers/promotion/transfers"
            }
            Self::TransferQuery => {
                "https://api.mch.weixin.qq.com/mmpaymkttransfers/gettransferinfo"
            }
            Self::SendRedPack => "https://api.mch.weixin.qq.com/mmpaymkttransfers/sendredpack",
            Self::SendGroupRedPack => {
                "https://api.mch.weixin.qq.com/mmpaymkttransfers/sendgroupredpack"
            }
            Self::RedPackQuery => "https://api.mch.weixin.qq.com/mmpaymkttransfers/gethbinfo",
        }
    }

    /// True for operations that must present the merchant certificate:
    /// reversal, transfers, and red packets.
    #[must_use]
    pub const fn requires_certificate(self) -> bool {
        matches!(
            self,
            Self::ReverseOrder
                | Self::Transfer
                | Self::TransferQuery
                | Self::SendRedPack
                | Self::SendGroupRedPack
                | Self::RedPackQuery
        )
    }
}

/// A request that can be built into a signable parameter map.
pub trait PayRequest {
    /// Operation classification.
    fn operation(&self) -> Operation;

    /// Builds the unsigned parameter map from credentials and call inputs.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::InvalidRequest`] when a schema rule fails.
    fn build(&self, credentials: &Credentials) -> Result<Params>;
}

/// Transaction type for order creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeType {
    /// In-app (official account / mini program) payment.
    Jsapi,
    /// QR-code payment.
    Native,
    /// Mobile app payment.
    App,
    /// Mobile web payment.
    Mweb,
    /// Payment-code (scanned barcode) payment.
    Micropay,
}

impl TradeType {
    /// Wire value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Jsapi => "JSAPI",
            Self::Native => "NATIVE",
            Self::App => "APP",
            Self::Mweb => "MWEB",
            Self::Micropay => "MICROPAY",
        }
    }
}

/// Recipient name verification mode for transfers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckName {
    /// Do not verify the recipient's real name.
    NoCheck,
    /// Verify the recipient's real name; requires `user_name`.
    ForceCheck,
}

impl CheckName {
    /// Wire value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NoCheck => "NO_CHECK",
            Self::ForceCheck => "FORCE_CHECK",
        }
    }
}

/// Red packet usage scene, mandatory for out-of-range amounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedPackScene {
    /// Product promotion.
    Product1,
    /// Lottery.
    Product2,
    /// Virtual-goods prize.
    Product3,
    /// Internal welfare.
    Product4,
    /// Channel commission.
    Product5,
    /// Insurance rebate.
    Product6,
    /// Lottery payout.
    Product7,
    /// Tax scratch card.
    Product8,
}

impl RedPackScene {
    /// Wire value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Product1 => "PRODUCT_1",
            Self::Product2 => "PRODUCT_2",
            Self::Product3 => "PRODUCT_3",
            Self::Product4 => "PRODUCT_4",
            Self::Product5 => "PRODUCT_5",
            Self::Product6 => "PRODUCT_6",
            Self::Product7 => "PRODUCT_7",
            Self::Product8 => "PRODUCT_8",
        }
    }
}

/// Red packet amount band (minor units) inside which no scene is required.
const RED_PACK_FREE_RANGE: std::ops::RangeInclusive<u64> = 100..=20_000;

/// Copies `options` entries whose keys appear in `allowed` into `params`;
/// everything else is dropped.
fn merge_allowed(params: &mut Params, options: &Params, allowed: &[&str]) {
    for (key, value) in options.iter() {
        if allowed.contains(&key) {
            params.insert(key, value.clone());
        } else {
            debug!(key, "dropping option outside the operation allow-list");
        }
    }
}

/// Order creation request.
///
/// Amounts are integers in minor currency units. `MICROPAY` orders are
/// dispatched to the dedicated charge endpoint; every other trade type goes
/// to the unified order endpoint.
#[derive(Debug, Clone)]
pub struct UnifiedOrder {
    /// Transaction type.
    pub trade_type: TradeType,
    /// Merchant order number, unique per merchant account.
    pub out_trade_no: String,
    /// Order total in minor currency units.
    pub total_fee: u64,
    /// Short order description.
    pub body: String,
    /// Asynchronous notification URL.
    pub notify_url: String,
    /// Payer openid; required by some trade types.
    pub openid: Option<String>,
    /// Scanned payment auth code; `MICROPAY` only.
    pub auth_code: Option<String>,
    /// Order validity window in minutes; sets `time_start`/`time_expire`.
    pub valid_minutes: Option<u32>,
    /// Profit-sharing flag.
    pub profit_sharing: Option<bool>,
    /// Extra fields filtered through [`UnifiedOrder::OPTIONAL_FIELDS`].
    pub options: Params,
}

impl UnifiedOrder {
    /// Optional fields this operation accepts from `options`.
    pub const OPTIONAL_FIELDS: &'static [&'static str] = &[
        "device_info",
        "detail",
        "attach",
        "fee_type",
        "goods_tag",
        "product_id",
        "limit_pay",
        "receipt",
        "scene_info",
    ];
}

impl PayRequest for UnifiedOrder {
    fn operation(&self) -> Operation {
        match self.trade_type {
            TradeType::Micropay => Operation::Micropay,
            _ => Operation::UnifiedOrder,
        }
    }

    fn build(&self, credentials: &Credentials) -> Result<Params> {
        let mut params = Params::new();
        params.insert("appid", credentials.app_id.as_str());
        params.insert("mch_id", credentials.mch_id.as_str());
        params.insert("trade_type", self.trade_type.as_str());
        params.insert("nonce_str", nonce_str(32));
        params.insert("out_trade_no", self.out_trade_no.as_str());
        params.insert("total_fee", self.total_fee.to_string());
        params.insert("sign_type", credentials.sign_type.as_str());
        params.insert("body", self.body.as_str());
        params.insert("notify_url", self.notify_url.as_str());
        params.insert("spbill_create_ip", credentials.reported_ip());

        if let Some(openid) = self.openid.as_deref().filter(|s| !s.is_empty()) {
            params.insert("openid", openid);
        }
        if let Some(auth_code) = self.auth_code.as_deref().filter(|s| !s.is_empty()) {
            params.insert("auth_code", auth_code);
        }
        if let Some(minutes) = self.valid_minutes {
            let start = Local::now();
            let expire = start + Duration::minutes(i64::from(minutes));
            params.insert("time_start", start.format("%Y%m%d%H%M%S").to_string());
            params.insert("time_expire", expire.format("%Y%m%d%H%M%S").to_string());
        }
        if let Some(sharing) = self.profit_sharing {
            params.insert("profit_sharing", if sharing { "Y" } else { "N" });
        }

        merge_allowed(&mut params, &self.options, Self::OPTIONAL_FIELDS);
        Ok(params)
    }
}

/// Resolves a payment auth code to the payer's openid.
#[derive(Debug, Clone)]
pub struct AuthCodeToOpenid {
    /// Scanned payment auth code.
    pub auth_code: String,
}

impl PayRequest for AuthCodeToOpenid {
    fn operation(&self) -> Operation {
        Operation::AuthCodeToOpenid
    }

    fn build(&self, credentials: &Credentials) -> Result<Params> {
        let mut params = Params::new();
        params.insert("appid", credentials.app_id.as_str());
        params.insert("mch_id", credentials.mch_id.as_str());
        params.insert("nonce_str", nonce_str(32));
        params.insert("auth_code", self.auth_code.as_str());
        Ok(params)
    }
}

/// Inserts order identifiers shared by query and reversal; at least one of
/// the two must be present.
fn insert_order_ref(
    params: &mut Params,
    transaction_id: Option<&str>,
    out_trade_no: Option<&str>,
) -> Result<()> {
    let transaction_id = transaction_id.filter(|s| !s.is_empty());
    let out_trade_no = out_trade_no.filter(|s| !s.is_empty());
    if transaction_id.is_none() && out_trade_no.is_none() {
        return Err(BridgeError::InvalidRequest(
            "either transaction_id or out_trade_no is required".to_owned(),
        ));
    }
    if let Some(id) = transaction_id {
        params.insert("transaction_id", id);
    }
    if let Some(no) = out_trade_no {
        params.insert("out_trade_no", no);
    }
    Ok(())
}

/// Order status query.
#[derive(Debug, Clone, Default)]
pub struct OrderQuery {
    /// Gateway transaction number (preferred).
    pub transaction_id: Option<String>,
    /// Merchant order number.
    pub out_trade_no: Option<String>,
}

impl PayRequest for OrderQuery {
    fn operation(&self) -> Operation {
        Operation::OrderQuery
    }

    fn build(&self, credentials: &Credentials) -> Result<Params> {
        let mut params = Params::new();
        params.insert("appid", credentials.app_id.as_str());
        params.insert("mch_id", credentials.mch_id.as_str());
        params.insert("nonce_str", nonce_str(32));
        insert_order_ref(&mut params, self.transaction_id.as_deref(), self.out_trade_no.as_deref())?;
        Ok(params)
    }
}

/// Order reversal for transactions with no definite payment result.
///
/// Requires the merchant certificate.
#[derive(Debug, Clone, Default)]
pub struct ReverseOrder {
    /// Gateway transaction number (preferred).
    pub transaction_id: Option<String>,
    /// Merchant order number.
    pub out_trade_no: Option<String>,
}

impl PayRequest for ReverseOrder {
    fn operation(&self) -> Operation {
        Operation::ReverseOrder
    }

    fn build(&self, credentials: &Credentials) -> Result<Params> {
        let mut params = Params::new();
        params.insert("appid", credentials.app_id.as_str());
        params.insert("mch_id", credentials.mch_id.as_str());
        params.insert("nonce_str", nonce_str(32));
        insert_order_ref(&mut params, self.transaction_id.as_deref(), self.out_trade_no.as_deref())?;
        Ok(params)
    }
}

/// Enterprise payout to a user's balance.
///
/// Requires the merchant certificate. Note the operation's distinct key
/// spelling on the wire: `mch_appid` and `mchid`.
#[derive(Debug, Clone)]
pub struct Transfer {
    /// Merchant payout order number (letters and digits only).
    pub partner_trade_no: String,
    /// Recipient openid under this app.
    pub openid: String,
    /// Payout amount in minor currency units.
    pub amount: u64,
    /// Payout remark.
    pub desc: String,
    /// Recipient name verification mode.
    pub check_name: CheckName,
    /// Recipient real name; mandatory under [`CheckName::ForceCheck`].
    pub user_name: Option<String>,
    /// Originating device identifier.
    pub device_info: Option<String>,
}

impl PayRequest for Transfer {
    fn operation(&self) -> Operation {
        Operation::Transfer
    }

    fn build(&self, credentials: &Credentials) -> Result<Params> {
        let mut params = Params::new();
        params.insert("mch_appid", credentials.app_id.as_str());
        params.insert("mchid", credentials.mch_id.as_str());
        params.insert("nonce_str", nonce_str(32));
        params.insert("partner_trade_no", self.partner_trade_no.as_str());
        params.insert("openid", self.openid.as_str());
        params.insert("amount", self.amount.to_string());
        params.insert("desc", self.desc.as_str());
        params.insert("spbill_create_ip", credentials.reported_ip());
        if let Some(device) = self.device_info.as_deref().filter(|s| !s.is_empty()) {
            params.insert("device_info", device);
        }
        params.insert("check_name", self.check_name.as_str());
        if self.check_name == CheckName::ForceCheck {
            let name = self.user_name.as_deref().filter(|s| !s.is_empty()).ok_or_else(|| {
                BridgeError::InvalidRequest("FORCE_CHECK transfers require user_name".to_owned())
            })?;
            params.insert("re_user_name", name);
        }
        Ok(params)
    }
}

/// Payout result query. Requires the merchant certificate.
#[derive(Debug, Clone)]
pub struct TransferQuery {
    /// Merchant payout order number used in the transfer.
    pub partner_trade_no: String,
}

impl PayRequest for TransferQuery {
    fn operation(&self) -> Operation {
        Operation::TransferQuery
    }

    fn build(&self, credentials: &Credentials) -> Result<Params> {
        let mut params = Params::new();
        params.insert("appid", credentials.app_id.as_str());
        params.insert("mch_id", credentials.mch_id.as_str());
        params.insert("nonce_str", nonce_str(32));
        params.insert("partner_trade_no", self.partner_trade_no.as_str());
        Ok(params)
    }
}

/// Applies the red packet scene rule: amounts outside the free band require
/// a scene and carry it on the wire; in-band amounts never send one.
fn insert_red_pack_scene(
    params: &mut Params,
    total_amount: u64,
    scene_id: Option<RedPackScene>,
) -> Result<()> {
    if RED_PACK_FREE_RANGE.contains(&total_amount) {
        return Ok(());
    }
    let scene = scene_id.ok_or_else(|| {
        BridgeError::InvalidRequest(format!(
            "red packet amount {total_amount} is outside {}..={} and requires scene_id",
            RED_PACK_FREE_RANGE.start(),
            RED_PACK_FREE_RANGE.end()
        ))
    })?;
    params.insert("scene_id", scene.as_str());
    Ok(())
}

/// Single red packet. Requires the merchant certificate.
///
/// Uses the `wxappid` key spelling on the wire.
#[derive(Debug, Clone)]
pub struct SendRedPack {
    /// Merchant bill number, unique and re-entrant on timeout.
    pub mch_billno: String,
    /// Sender display name.
    pub send_name: String,
    /// Recipient openid.
    pub re_openid: String,
    /// Amount in minor currency units.
    pub total_amount: u64,
    /// Greeting text.
    pub wishing: String,
    /// Activity name.
    pub act_name: String,
    /// Remark.
    pub remark: String,
    /// Usage scene; mandatory when `total_amount` is outside 100..=20000.
    pub scene_id: Option<RedPackScene>,
    /// Risk-control info string (`key=value&…`, url-encoded).
    pub risk_info: Option<String>,
}

impl PayRequest for SendRedPack {
    fn operation(&self) -> Operation {
        Operation::SendRedPack
    }

    fn build(&self, credentials: &Credentials) -> Result<Params> {
        let mut params = Params::new();
        params.insert("wxappid", credentials.app_id.as_str());
        params.insert("mch_id", credentials.mch_id.as_str());
        params.insert("nonce_str", nonce_str(32));
        params.insert("mch_billno", self.mch_billno.as_str());
        params.insert("send_name", self.send_name.as_str());
        params.insert("re_openid", self.re_openid.as_str());
        params.insert("total_amount", self.total_amount.to_string());
        params.insert("total_num", "1");
        params.insert("wishing", self.wishing.as_str());
        params.insert("client_ip", credentials.reported_ip());
        params.insert("act_name", self.act_name.as_str());
        params.insert("remark", self.remark.as_str());
        insert_red_pack_scene(&mut params, self.total_amount, self.scene_id)?;
        if let Some(risk) = self.risk_info.as_deref().filter(|s| !s.is_empty()) {
            params.insert("risk_info", risk);
        }
        Ok(params)
    }
}

/// Group (splittable) red packet. Requires the merchant certificate.
///
/// The amount split is always `ALL_RAND`: the gateway draws each share.
#[derive(Debug, Clone)]
pub struct SendGroupRedPack {
    /// Merchant bill number.
    pub mch_billno: String,
    /// Sender display name.
    pub send_name: String,
    /// Seed recipient openid (first receiver, shares the rest).
    pub re_openid: String,
    /// Total amount in minor currency units.
    pub total_amount: u64,
    /// Number of recipients.
    pub total_num: u32,
    /// Greeting text.
    pub wishing: String,
    /// Activity name.
    pub act_name: String,
    /// Remark.
    pub remark: String,
    /// Usage scene; same rule as [`SendRedPack`].
    pub scene_id: Option<RedPackScene>,
    /// Risk-control info string.
    pub risk_info: Option<String>,
}

impl PayRequest for SendGroupRedPack {
    fn operation(&self) -> Operation {
        Operation::SendGroupRedPack
    }

    fn build(&self, credentials: &Credentials) -> Result<Params> {
        let mut params = Params::new();
        params.insert("wxappid", credentials.app_id.as_str());
        params.insert("mch_id", credentials.mch_id.as_str());
        params.insert("nonce_str", nonce_str(32));
        params.insert("mch_billno", self.mch_billno.as_str());
        params.insert("send_name", self.send_name.as_str());
        params.insert("re_openid", self.re_openid.as_str());
        params.insert("total_amount", self.total_amount.to_string());
        params.insert("total_num", self.total_num.to_string());
        params.insert("amt_type", "ALL_RAND");
        params.insert("wishing", self.wishing.as_str());
        params.insert("act_name", self.act_name.as_str());
        params.insert("remark", self.remark.as_str());
        insert_red_pack_scene(&mut params, self.total_amount, self.scene_id)?;
        if let Some(risk) = self.risk_info.as_deref().filter(|s| !s.is_empty()) {
            params.insert("risk_info", risk);
        }
        Ok(params)
    }
}

/// Red packet record query. Requires the merchant certificate.
#[derive(Debug, Clone)]
pub struct RedPackQuery {
    /// Merchant bill number used when sending the packet.
    pub mch_billno: String,
}

impl PayRequest for RedPackQuery {
    fn operation(&self) -> Operation {
        Operation::RedPackQuery
    }

    fn build(&self, credentials: &Credentials) -> Result<Params> {
        let mut params = Params::new();
        params.insert("appid", credentials.app_id.as_str());
        params.insert("mch_id", credentials.mch_id.as_str());
        params.insert("nonce_str", nonce_str(32));
        params.insert("mch_billno", self.mch_billno.as_str());
        params.insert("bill_type", "MCHT");
        Ok(params)
    }
}

/// Builds the client-side pay sign package for a prepay transaction.
///
/// The APP variant signs `appid/partnerid/prepayid/package/nonce_str/
/// timestamp` into `sign`; every other trade type uses the JSAPI shape,
/// signing `appId/timeStamp/nonceStr/package/signType` into `paySign`.
/// Pure; nothing is dispatched.
#[must_use]
pub fn sign_package(credentials: &Credentials, trade_type: TradeType, prepay_id: &str) -> Params {
    let timestamp = chrono::Utc::now().timestamp().to_string();
    let mut params = Params::new();
    match trade_type {
        TradeType::App => {
            params.insert("appid", credentials.app_id.as_str());
            params.insert("partnerid", credentials.mch_id.as_str());
            params.insert("prepayid", prepay_id);
            params.insert("package", "Sign=WXPay");
            params.insert("nonce_str", nonce_str(32));
            params.insert("timestamp", timestamp);
            let signature = crate::sign::sign(&params, &credentials.api_key, credentials.sign_type);
            params.insert("sign", signature);
        }
        _ => {
            params.insert("appId", credentials.app_id.as_str());
            params.insert("timeStamp", timestamp);
            params.insert("nonceStr", nonce_str(32));
            params.insert("package", format!("prepay_id={prepay_id}"));
            params.insert("signType", credentials.sign_type.as_str());
            let signature = crate::sign::sign(&params, &credentials.api_key, credentials.sign_type);
            params.insert("paySign", signature);
        }
    }
    params
}
