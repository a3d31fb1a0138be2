//! The backend capability trait and variant selection.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;

use nwc_protocol::{
    GetBalanceResult, GetInfoResult, InvoiceResult, ListTransactionsParams,
    ListTransactionsResult, LookupInvoiceParams, MakeInvoiceParams, NwcError, PayInvoiceParams,
    PayInvoiceResult,
};

use crate::error::BackendError;
use crate::phoenixd::PhoenixdBackend;

/// Supported Lightning node types, selected by the `kind` config string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Phoenix,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Phoenix => "phoenix",
        }
    }
}

impl FromStr for BackendKind {
    type Err = BackendError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "phoenix" => Ok(BackendKind::Phoenix),
            other => Err(BackendError::UnsupportedKind(other.to_string())),
        }
    }
}

/// Credentials for one backend instance.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub kind: BackendKind,
    /// Node API host, `host[:port]` without a scheme.
    pub host: String,
    /// API key / password for the node.
    pub key: String,
}

/// Uniform method surface over a Lightning node management API.
///
/// Every operation returns either a typed result or a typed NIP-47 error;
/// transport failures are mapped to `INTERNAL` by the implementation and
/// never leak raw node error bodies to the caller.
#[async_trait]
pub trait LightningBackend: Send + Sync {
    async fn pay_invoice(&self, params: PayInvoiceParams) -> Result<PayInvoiceResult, NwcError>;

    async fn get_balance(&self) -> Result<GetBalanceResult, NwcError>;

    async fn make_invoice(&self, params: MakeInvoiceParams) -> Result<InvoiceResult, NwcError>;

    async fn lookup_invoice(&self, params: LookupInvoiceParams)
        -> Result<InvoiceResult, NwcError>;

    async fn list_transactions(
        &self,
        params: ListTransactionsParams,
    ) -> Result<ListTransactionsResult, NwcError>;

    async fn get_info(&self) -> Result<GetInfoResult, NwcError>;
}

/// Build the backend for a user binding.
pub fn build_backend(config: BackendConfig) -> Result<Arc<dyn LightningBackend>, BackendError> {
    match config.kind {
        BackendKind::Phoenix => Ok(Arc::new(PhoenixdBackend::new(&config.host, &config.key)?)),
    }
}
