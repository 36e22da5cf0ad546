//! VNPay gateway: signed redirect URLs and callback verification.
//!
//! Signing: parameters sorted by key, form-urlencoded (space becomes `+`),
//! joined as `k=v&k=v`, HMAC-SHA512 with the merchant secret, hex encoded.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha512;
use thiserror::Error;
use url::form_urlencoded;
use uuid::Uuid;

use crate::config::VnpayConfig;

type HmacSha512 = Hmac<Sha512>;

pub const VERSION: &str = "2.1.0";
pub const SECURE_HASH: &str = "vnp_SecureHash";
pub const SECURE_HASH_TYPE: &str = "vnp_SecureHashType";
/// Payment links expire after this many minutes.
pub const EXPIRY_MINUTES: i64 = 15;
const DATE_FORMAT: &str = "%Y%m%d%H%M%S";
/// VNPay timestamps are local Vietnam time (GMT+7).
const VN_OFFSET_HOURS: i64 = 7;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VnpayError {
    #[error("invalid signature")]
    InvalidSignature,
    #[error("missing parameter {0}")]
    MissingParam(&'static str),
    #[error("invalid parameter {0}")]
    InvalidParam(&'static str),
}

/// Input for one payment redirect.
#[derive(Debug, Clone)]
pub struct PaymentRequest<'a> {
    pub order_id: Uuid,
    /// Order total in VND.
    pub amount: i64,
    pub order_info: &'a str,
    pub ip_addr: &'a str,
    pub locale: Option<&'a str>,
    pub bank_code: Option<&'a str>,
    pub created_at: DateTime<Utc>,
}

/// A callback whose signature checked out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedCallback {
    pub order_ref: String,
    /// Amount in VND (the wire value divided by 100).
    pub amount: i64,
    pub response_code: String,
    pub transaction_status: String,
    pub transaction_no: Option<String>,
    pub bank_code: Option<String>,
    pub pay_date: Option<DateTime<Utc>>,
}

impl VerifiedCallback {
    pub fn is_success(&self) -> bool { self.response_code == "00" && self.transaction_status == "00" }

    pub fn order_id(&self) -> Option<Uuid> { Uuid::parse_str(&self.order_ref).ok() }
}

#[derive(Clone)]
pub struct Vnpay {
    tmn_code: String,
    hash_secret: SecretString,
    payment_url: String,
    return_url: String,
}

impl Vnpay {
    pub fn new(config: &VnpayConfig) -> Self {
        Self {
            tmn_code: config.tmn_code.clone(),
            hash_secret: config.hash_secret.clone(),
            payment_url: config.payment_url.clone(),
            return_url: config.return_url.clone(),
        }
    }

    pub fn build_payment_url(&self, req: &PaymentRequest<'_>) -> String {
        let mut params: BTreeMap<&str, String> = BTreeMap::new();
        params.insert("vnp_Version", VERSION.to_string());
        params.insert("vnp_Command", "pay".to_string());
        params.insert("vnp_TmnCode", self.tmn_code.clone());
        params.insert("vnp_Locale", req.locale.filter(|l| !l.is_empty()).unwrap_or("vn").to_string());
        params.insert("vnp_CurrCode", "VND".to_string());
        params.insert("vnp_TxnRef", req.order_id.to_string());
        params.insert("vnp_OrderInfo", req.order_info.to_string());
        params.insert("vnp_OrderType", "other".to_string());
        params.insert("vnp_Amount", (req.amount * 100).to_string());
        params.insert("vnp_ReturnUrl", self.return_url.clone());
        params.insert("vnp_IpAddr", req.ip_addr.to_string());
        params.insert("vnp_CreateDate", format_vn_time(req.created_at));
        params.insert("vnp_ExpireDate", format_vn_time(req.created_at + Duration::minutes(EXPIRY_MINUTES)));
        if let Some(bank) = req.bank_code.filter(|b| !b.is_empty()) {
            params.insert("vnp_BankCode", bank.to_string());
        }

        let query = encode_sorted(params.iter().map(|(k, v)| (*k, v.as_str())));
        let signature = self.sign(&query);
        format!("{}?{query}&{SECURE_HASH}={signature}", self.payment_url)
    }

    /// Checks the signature of a return or IPN query and parses its fields.
    pub fn verify_callback(&self, params: &HashMap<String, String>) -> Result<VerifiedCallback, VnpayError> {
        let provided = params.get(SECURE_HASH).ok_or(VnpayError::MissingParam(SECURE_HASH))?;
        let provided = hex::decode(provided).map_err(|_| VnpayError::InvalidSignature)?;

        let signed: BTreeMap<&str, &str> = params
            .iter()
            .filter(|(k, _)| k.starts_with("vnp_") && *k != SECURE_HASH && *k != SECURE_HASH_TYPE)
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        let query = encode_sorted(signed.into_iter());

        let mut mac = self.mac()?;
        mac.update(query.as_bytes());
        mac.verify_slice(&provided).map_err(|_| VnpayError::InvalidSignature)?;

        let field = |key: &'static str| params.get(key).cloned().ok_or(VnpayError::MissingParam(key));
        let optional = |key: &str| params.get(key).filter(|v| !v.is_empty()).cloned();
        let wire_amount: i64 = field("vnp_Amount")?.parse().map_err(|_| VnpayError::InvalidParam("vnp_Amount"))?;
        let order_ref = field("vnp_TxnRef")?;
        let response_code = field("vnp_ResponseCode")?;
        // return URLs from older API versions omit the transaction status
        let transaction_status = optional("vnp_TransactionStatus").unwrap_or_else(|| response_code.clone());

        Ok(VerifiedCallback {
            order_ref,
            amount: wire_amount / 100,
            response_code,
            transaction_status,
            transaction_no: optional("vnp_TransactionNo"),
            bank_code: optional("vnp_BankCode"),
            pay_date: optional("vnp_PayDate").and_then(|d| parse_vn_time(&d)),
        })
    }

    fn sign(&self, data: &str) -> String {
        match self.mac() {
            Ok(mut mac) => {
                mac.update(data.as_bytes());
                hex::encode(mac.finalize().into_bytes())
            }
            Err(_) => String::new(),
        }
    }

    fn mac(&self) -> Result<HmacSha512, VnpayError> {
        HmacSha512::new_from_slice(self.hash_secret.expose_secret().as_bytes()).map_err(|_| VnpayError::InvalidSignature)
    }
}

fn encode_sorted<'a>(pairs: impl Iterator<Item = (&'a str, &'a str)>) -> String {
    form_urlencoded::Serializer::new(String::new()).extend_pairs(pairs).finish()
}

fn format_vn_time(at: DateTime<Utc>) -> String {
    (at + Duration::hours(VN_OFFSET_HOURS)).format(DATE_FORMAT).to_string()
}

fn parse_vn_time(raw: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw, DATE_FORMAT)
        .ok()
        .map(|local| local.and_utc() - Duration::hours(VN_OFFSET_HOURS))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn gateway() -> Vnpay {
        Vnpay::new(&VnpayConfig {
            tmn_code: "DEMO0001".into(),
            hash_secret: SecretString::from("SECRETKEYFORTESTS".to_string()),
            payment_url: "https://sandbox.vnpayment.vn/paymentv2/vpcpay.html".into(),
            return_url: "http://localhost:3000/payment/vnpay-return".into(),
        })
    }

    fn query_map(url: &str) -> HashMap<String, String> {
        let query = url.split_once('?').map(|(_, q)| q).unwrap_or_default();
        form_urlencoded::parse(query.as_bytes()).into_owned().collect()
    }

    fn signed_callback(vnp: &Vnpay, mut params: HashMap<String, String>) -> HashMap<String, String> {
        let sorted: BTreeMap<&str, &str> = params.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
        let signature = vnp.sign(&encode_sorted(sorted.into_iter()));
        params.insert(SECURE_HASH.into(), signature);
        params
    }

    fn callback_params(order_id: Uuid, amount: i64) -> HashMap<String, String> {
        [
            ("vnp_TxnRef", order_id.to_string()),
            ("vnp_Amount", (amount * 100).to_string()),
            ("vnp_ResponseCode", "00".to_string()),
            ("vnp_TransactionStatus", "00".to_string()),
            ("vnp_TransactionNo", "14226112".to_string()),
            ("vnp_BankCode", "NCB".to_string()),
            ("vnp_OrderInfo", "Thanh toan don hang".to_string()),
            ("vnp_PayDate", "20240115103000".to_string()),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
    }

    #[test]
    fn test_payment_url_fields() {
        let vnp = gateway();
        let order_id = Uuid::now_v7();
        let created_at = Utc.with_ymd_and_hms(2024, 1, 15, 3, 0, 0).unwrap();
        let url = vnp.build_payment_url(&PaymentRequest {
            order_id, amount: 150_000, order_info: "Order payment", ip_addr: "127.0.0.1",
            locale: None, bank_code: Some("NCB"), created_at,
        });
        assert!(url.starts_with("https://sandbox.vnpayment.vn/paymentv2/vpcpay.html?"));

        let params = query_map(&url);
        assert_eq!(params["vnp_Amount"], "15000000");
        assert_eq!(params["vnp_TxnRef"], order_id.to_string());
        assert_eq!(params["vnp_Locale"], "vn");
        assert_eq!(params["vnp_CreateDate"], "20240115100000");
        assert_eq!(params["vnp_ExpireDate"], "20240115101500");
        assert_eq!(params["vnp_BankCode"], "NCB");
        assert_eq!(params["vnp_SecureHash"].len(), 128);
    }

    #[test]
    fn test_spaces_encoded_as_plus() {
        let url = gateway().build_payment_url(&PaymentRequest {
            order_id: Uuid::now_v7(), amount: 1, order_info: "Thanh toan don", ip_addr: "::1",
            locale: Some("en"), bank_code: None, created_at: Utc::now(),
        });
        assert!(url.contains("vnp_OrderInfo=Thanh+toan+don"));
        assert!(!url.contains("vnp_BankCode"));
    }

    #[test]
    fn test_own_payment_url_verifies() {
        let vnp = gateway();
        let url = vnp.build_payment_url(&PaymentRequest {
            order_id: Uuid::now_v7(), amount: 2000, order_info: "Order", ip_addr: "127.0.0.1",
            locale: None, bank_code: None, created_at: Utc::now(),
        });
        let mut params = query_map(&url);
        params.insert("vnp_ResponseCode".into(), "00".into());
        // the response code was not part of the signed query
        assert_eq!(vnp.verify_callback(&params), Err(VnpayError::InvalidSignature));
        params.remove("vnp_ResponseCode");
        assert_eq!(vnp.verify_callback(&params), Err(VnpayError::MissingParam("vnp_ResponseCode")));
    }

    #[test]
    fn test_verify_callback() {
        let vnp = gateway();
        let order_id = Uuid::now_v7();
        let mut params = signed_callback(&vnp, callback_params(order_id, 2000));
        params.insert(SECURE_HASH_TYPE.into(), "HmacSHA512".into());

        let cb = vnp.verify_callback(&params).unwrap();
        assert_eq!(cb.order_id(), Some(order_id));
        assert_eq!(cb.amount, 2000);
        assert!(cb.is_success());
        assert_eq!(cb.bank_code.as_deref(), Some("NCB"));
        assert_eq!(cb.pay_date, Some(Utc.with_ymd_and_hms(2024, 1, 15, 3, 30, 0).unwrap()));
    }

    #[test]
    fn test_signature_is_case_insensitive() {
        let vnp = gateway();
        let mut params = signed_callback(&vnp, callback_params(Uuid::now_v7(), 10));
        let upper = params[SECURE_HASH].to_uppercase();
        params.insert(SECURE_HASH.into(), upper);
        assert!(vnp.verify_callback(&params).is_ok());
    }

    #[test]
    fn test_tampered_callback_rejected() {
        let vnp = gateway();
        let mut params = signed_callback(&vnp, callback_params(Uuid::now_v7(), 2000));
        params.insert("vnp_Amount".into(), "100".into());
        assert_eq!(vnp.verify_callback(&params), Err(VnpayError::InvalidSignature));

        params.remove(SECURE_HASH);
        assert_eq!(vnp.verify_callback(&params), Err(VnpayError::MissingParam(SECURE_HASH)));
    }
}
