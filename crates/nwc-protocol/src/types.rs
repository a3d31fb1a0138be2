//! NIP-47 wire types.
//!
//! Field names and omission rules follow the protocol exactly: amounts are
//! millisatoshis, timestamps are unix seconds, and zero-valued optional
//! fields are left off the wire.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub const INFO_KIND: u16 = 13194;
pub const REQUEST_KIND: u16 = 23194;
pub const RESPONSE_KIND: u16 = 23195;

pub const METHOD_PAY_INVOICE: &str = "pay_invoice";
pub const METHOD_GET_BALANCE: &str = "get_balance";
pub const METHOD_GET_INFO: &str = "get_info";
pub const METHOD_MAKE_INVOICE: &str = "make_invoice";
pub const METHOD_LOOKUP_INVOICE: &str = "lookup_invoice";
pub const METHOD_LIST_TRANSACTIONS: &str = "list_transactions";
pub const METHOD_PAY_KEYSEND: &str = "pay_keysend";
pub const METHOD_MULTI_PAY_INVOICE: &str = "multi_pay_invoice";
pub const METHOD_MULTI_PAY_KEYSEND: &str = "multi_pay_keysend";
pub const METHOD_SIGN_MESSAGE: &str = "sign_message";

/// Space-separated list of methods advertised in the kind-13194 info event.
pub const CAPABILITIES: &str =
    "pay_invoice get_balance make_invoice lookup_invoice get_info list_transactions";

/// Notification types advertised alongside the capabilities.
pub const NOTIFICATION_TYPES: &str = "payment_received";

/// Tag name carrying [`NOTIFICATION_TYPES`] on the info event.
pub const NOTIFICATIONS_TAG: &str = "notifications";

/// The fixed NIP-47 error code set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    RateLimited,
    NotImplemented,
    NotFound,
    InsufficientBalance,
    QuotaExceeded,
    Restricted,
    Unauthorized,
    Internal,
    Other,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::RateLimited => "RATE_LIMITED",
            ErrorCode::NotImplemented => "NOT_IMPLEMENTED",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::InsufficientBalance => "INSUFFICIENT_BALANCE",
            ErrorCode::QuotaExceeded => "QUOTA_EXCEEDED",
            ErrorCode::Restricted => "RESTRICTED",
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::Internal => "INTERNAL",
            ErrorCode::Other => "OTHER",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A protocol-level error, surfaced to the client as an encrypted
/// `{error: {code, message}}` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{code}: {message}")]
pub struct NwcError {
    pub code: ErrorCode,
    pub message: String,
}

impl NwcError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn not_implemented() -> Self {
        Self::new(ErrorCode::NotImplemented, "Not implemented.")
    }

    pub fn unauthorized() -> Self {
        Self::new(ErrorCode::Unauthorized, "The public key is not authorized")
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, message)
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Other, message)
    }
}

/// A decrypted request envelope: method name plus an opaque parameter blob.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

/// Response envelope; exactly one of `error` / `result` is set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Response {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<NwcError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

impl Response {
    /// A successful response echoing the request method as `result_type`.
    pub fn result(method: &str, result: Value) -> Self {
        Self {
            result_type: Some(method.to_string()),
            error: None,
            result: Some(result),
        }
    }

    /// An error response. `result_type` is omitted on the wire.
    pub fn error(error: NwcError) -> Self {
        Self {
            result_type: None,
            error: Some(error),
            result: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PayInvoiceParams {
    #[serde(default)]
    pub invoice: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MakeInvoiceParams {
    /// Amount in millisatoshis.
    #[serde(default)]
    pub amount: u64,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub description_hash: String,
    /// Invoice expiry in seconds; zero means backend default.
    #[serde(default)]
    pub expiry: u64,
}

/// At least one of `invoice` / `payment_hash` must be supplied.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LookupInvoiceParams {
    #[serde(default)]
    pub invoice: String,
    #[serde(default)]
    pub payment_hash: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListTransactionsParams {
    /// Unix seconds, inclusive lower bound.
    #[serde(default)]
    pub from: u64,
    /// Unix seconds, inclusive upper bound.
    #[serde(default)]
    pub until: u64,
    #[serde(default)]
    pub limit: u64,
    #[serde(default)]
    pub offset: u64,
    /// Include unsettled invoices.
    #[serde(default)]
    pub unpaid: bool,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub direction: Option<PaymentDirection>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentDirection {
    Incoming,
    Outgoing,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayInvoiceResult {
    pub preimage: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetBalanceResult {
    /// Balance in millisatoshis.
    pub balance: u64,
}

/// The full invoice object returned by `make_invoice`, `lookup_invoice`
/// and `list_transactions`. Timestamps are unix seconds, amounts msats.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceResult {
    #[serde(rename = "type")]
    pub direction: PaymentDirection,
    pub invoice: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description_hash: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub preimage: String,
    pub payment_hash: String,
    pub amount: u64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub fees_paid: u64,
    pub created_at: u64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub expires_at: u64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub settled_at: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListTransactionsResult {
    pub transactions: Vec<InvoiceResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetInfoResult {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub alias: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub color: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub pubkey: String,
    /// mainnet, testnet, signet, or regtest.
    pub network: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub block_height: u64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub block_hash: String,
    pub methods: Vec<String>,
}

fn is_zero(value: &u64) -> bool {
    *value == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_response_omits_result_type() {
        let response = Response::error(NwcError::unauthorized());
        let json = serde_json::to_string(&response).unwrap();
        assert_eq!(
            json,
            r#"{"error":{"code":"UNAUTHORIZED","message":"The public key is not authorized"}}"#
        );
    }

    #[test]
    fn not_implemented_shape() {
        let response = Response::error(NwcError::not_implemented());
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["error"]["code"], "NOT_IMPLEMENTED");
        assert_eq!(json["error"]["message"], "Not implemented.");
        assert!(json.get("result").is_none());
    }

    #[test]
    fn result_response_carries_result_type() {
        let result = serde_json::to_value(PayInvoiceResult {
            preimage: "00".repeat(32),
        })
        .unwrap();
        let response = Response::result(METHOD_PAY_INVOICE, result);
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["result_type"], "pay_invoice");
        assert_eq!(json["result"]["preimage"], "00".repeat(32));
        assert!(json.get("error").is_none());
    }

    #[test]
    fn invoice_result_omits_zero_fields() {
        let invoice = InvoiceResult {
            direction: PaymentDirection::Incoming,
            invoice: "lnbc1...".to_string(),
            description: String::new(),
            description_hash: String::new(),
            preimage: String::new(),
            payment_hash: "ab".repeat(32),
            amount: 21_000,
            fees_paid: 0,
            created_at: 1_700_000_000,
            expires_at: 0,
            settled_at: 0,
        };
        let json = serde_json::to_value(&invoice).unwrap();
        assert!(json.get("expires_at").is_none());
        assert!(json.get("settled_at").is_none());
        assert!(json.get("fees_paid").is_none());
        assert!(json.get("description").is_none());
        assert_eq!(json["type"], "incoming");
    }

    #[test]
    fn request_parses_with_missing_params() {
        let request: Request = serde_json::from_str(r#"{"method":"get_balance"}"#).unwrap();
        assert_eq!(request.method, METHOD_GET_BALANCE);
        assert!(request.params.is_null());
    }

    #[test]
    fn list_transactions_params_tolerate_partial_input() {
        let params: ListTransactionsParams =
            serde_json::from_str(r#"{"limit":10,"type":"incoming"}"#).unwrap();
        assert_eq!(params.limit, 10);
        assert_eq!(params.direction, Some(PaymentDirection::Incoming));
        assert_eq!(params.from, 0);
        assert!(!params.unpaid);
    }

    #[test]
    fn capability_string_matches_advertised_methods() {
        let methods: Vec<&str> = CAPABILITIES.split(' ').collect();
        assert_eq!(
            methods,
            vec![
                METHOD_PAY_INVOICE,
                METHOD_GET_BALANCE,
                METHOD_MAKE_INVOICE,
                METHOD_LOOKUP_INVOICE,
                METHOD_GET_INFO,
                METHOD_LIST_TRANSACTIONS,
            ]
        );
    }
}
