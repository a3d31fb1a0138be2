//! NIP-47 (Nostr Wallet Connect) protocol surface.
//!
//! This crate holds the wire types exchanged between a wallet service and
//! its clients — request/response payloads, the fixed error-code set, the
//! event kind numbers — plus the [`Envelope`] that encrypts payloads with
//! the NIP-04 shared secret and signs the resulting events.
//!
//! The rest of the bridge treats events as opaque blobs; everything
//! cryptographic lives here so it can be tested in isolation.

mod envelope;
mod error;
mod types;

pub use envelope::{build_info_event, Envelope};
pub use error::ProtocolError;
pub use types::{
    ErrorCode, GetBalanceResult, GetInfoResult, InvoiceResult, ListTransactionsParams,
    ListTransactionsResult, LookupInvoiceParams, MakeInvoiceParams, NwcError, PayInvoiceParams,
    PayInvoiceResult, PaymentDirection, Request, Response, CAPABILITIES, INFO_KIND,
    METHOD_GET_BALANCE, METHOD_GET_INFO, METHOD_LIST_TRANSACTIONS, METHOD_LOOKUP_INVOICE,
    METHOD_MAKE_INVOICE, METHOD_MULTI_PAY_INVOICE, METHOD_MULTI_PAY_KEYSEND, METHOD_PAY_INVOICE,
    METHOD_PAY_KEYSEND, METHOD_SIGN_MESSAGE, NOTIFICATIONS_TAG, NOTIFICATION_TYPES, REQUEST_KIND,
    RESPONSE_KIND,
};

/// Crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
