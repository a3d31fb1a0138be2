//! phoenixd HTTP backend.
//!
//! Speaks the phoenixd management API: form-encoded POSTs, basic auth with
//! the literal `phoenix-cli:` user, satoshi amounts and millisecond
//! timestamps. All values are normalized to the NIP-47 units
//! (millisatoshis, unix seconds) before they leave this module.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use lightning_invoice::Bolt11Invoice;
use reqwest::header::AUTHORIZATION;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::warn;

use nwc_protocol::{
    GetBalanceResult, GetInfoResult, InvoiceResult, ListTransactionsParams,
    ListTransactionsResult, LookupInvoiceParams, MakeInvoiceParams, NwcError, PayInvoiceParams,
    PayInvoiceResult, PaymentDirection, CAPABILITIES,
};

use crate::backend::LightningBackend;
use crate::error::BackendError;

const HTTP_TIMEOUT: Duration = Duration::from_secs(60);

/// Error bodies are truncated to this many bytes before logging.
const MAX_ERROR_BODY: usize = 300;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BalanceResponse {
    balance_sat: u64,
    #[serde(default)]
    #[allow(dead_code)]
    fee_credit_sat: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PayResponse {
    payment_preimage: String,
    #[serde(default)]
    #[allow(dead_code)]
    payment_hash: String,
    #[serde(default)]
    #[allow(dead_code)]
    routing_fee_sat: u64,
}

/// One row from `/payments/incoming` or `/payments/outgoing`.
/// Incoming rows carry `receivedSat`, outgoing rows carry `sent`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PaymentRecord {
    #[serde(default)]
    completed_at: u64,
    created_at: u64,
    #[serde(default)]
    description: String,
    #[serde(default)]
    description_hash: String,
    #[serde(default)]
    fees: u64,
    invoice: String,
    #[serde(default)]
    is_paid: bool,
    payment_hash: String,
    #[serde(default)]
    preimage: String,
    #[serde(default)]
    received_sat: u64,
    #[serde(default)]
    sent: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateInvoiceResponse {
    #[serde(default)]
    #[allow(dead_code)]
    amount_sat: u64,
    payment_hash: String,
    serialized: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NodeInfoResponse {
    #[serde(default)]
    node_id: String,
    chain: String,
    #[serde(default)]
    #[allow(dead_code)]
    version: String,
}

/// Adapter for a phoenixd node reachable over plain HTTP.
pub struct PhoenixdBackend {
    http: reqwest::Client,
    base_url: String,
    auth_header: String,
}

impl PhoenixdBackend {
    pub fn new(host: &str, key: &str) -> Result<Self, BackendError> {
        let http = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;
        Ok(Self {
            http,
            base_url: format!("http://{host}"),
            auth_header: basic_auth(key),
        })
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, BackendError> {
        let response = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .header(AUTHORIZATION, self.auth_header.as_str())
            .query(query)
            .send()
            .await?;
        decode(response).await
    }

    async fn post_form<T: DeserializeOwned>(
        &self,
        path: &str,
        form: &[(&str, String)],
    ) -> Result<T, BackendError> {
        let response = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .header(AUTHORIZATION, self.auth_header.as_str())
            .form(form)
            .send()
            .await?;
        decode(response).await
    }

    async fn list_payments(
        &self,
        path: &str,
        params: &ListTransactionsParams,
    ) -> Result<Vec<PaymentRecord>, BackendError> {
        let mut query: Vec<(&str, String)> = Vec::new();
        if params.from > 0 {
            query.push(("from", (params.from * 1000).to_string()));
        }
        if params.until > 0 {
            query.push(("to", (params.until * 1000).to_string()));
        }
        if params.limit > 0 {
            query.push(("limit", params.limit.to_string()));
        }
        query.push(("all", params.unpaid.to_string()));

        self.get(path, &query).await
    }
}

#[async_trait]
impl LightningBackend for PhoenixdBackend {
    async fn pay_invoice(&self, params: PayInvoiceParams) -> Result<PayInvoiceResult, NwcError> {
        let form = [("invoice", params.invoice)];
        let result: PayResponse = self
            .post_form("/payinvoice", &form)
            .await
            .map_err(|err| {
                warn!(error = %err, "payinvoice call failed");
                NwcError::internal("could not pay")
            })?;

        Ok(PayInvoiceResult {
            preimage: result.payment_preimage,
        })
    }

    async fn get_balance(&self) -> Result<GetBalanceResult, NwcError> {
        let result: BalanceResponse = self.get("/getbalance", &[]).await.map_err(|err| {
            warn!(error = %err, "getbalance call failed");
            NwcError::internal("could not get balance")
        })?;

        Ok(GetBalanceResult {
            balance: result.balance_sat * 1000,
        })
    }

    async fn make_invoice(&self, params: MakeInvoiceParams) -> Result<InvoiceResult, NwcError> {
        let mut form: Vec<(&str, String)> = Vec::new();
        if !params.description_hash.is_empty() {
            form.push(("descriptionHash", params.description_hash.clone()));
        } else {
            form.push(("description", params.description.clone()));
        }
        form.push(("amountSat", (params.amount / 1000).to_string()));
        if params.expiry > 0 {
            form.push(("expirySeconds", params.expiry.to_string()));
        }

        let result: CreateInvoiceResponse =
            self.post_form("/createinvoice", &form).await.map_err(|err| {
                warn!(error = %err, "createinvoice call failed");
                NwcError::internal("could not create invoice")
            })?;

        let bolt11 = decode_bolt11(&result.serialized)?;
        let created_at = bolt11.duration_since_epoch().as_secs();

        Ok(InvoiceResult {
            direction: PaymentDirection::Incoming,
            invoice: result.serialized,
            description: params.description,
            description_hash: params.description_hash,
            preimage: String::new(),
            payment_hash: result.payment_hash,
            amount: bolt11.amount_milli_satoshis().unwrap_or(params.amount),
            fees_paid: 0,
            created_at,
            expires_at: invoice_expiry(created_at, &bolt11),
            settled_at: 0,
        })
    }

    async fn lookup_invoice(
        &self,
        params: LookupInvoiceParams,
    ) -> Result<InvoiceResult, NwcError> {
        let payment_hash = if params.payment_hash.is_empty() {
            if params.invoice.is_empty() {
                return Err(NwcError::other("missing invoice or payment_hash"));
            }
            decode_bolt11(&params.invoice)?.payment_hash().to_string()
        } else {
            params.payment_hash
        };

        let path = format!("/payments/incoming/{payment_hash}");
        let record: PaymentRecord = self.get(&path, &[]).await.map_err(|err| {
            if err.is_not_found() {
                NwcError::not_found("could not find invoice")
            } else {
                warn!(error = %err, payment_hash = %payment_hash, "incoming payment lookup failed");
                NwcError::internal("could not load invoice")
            }
        })?;

        let bolt11 = decode_bolt11(&record.invoice)?;
        let mut result = record_to_invoice(PaymentDirection::Incoming, &record, &bolt11)?;
        // The invoice amount is authoritative here; `receivedSat` is zero
        // until the invoice settles.
        if let Some(msat) = bolt11.amount_milli_satoshis() {
            result.amount = msat;
        }
        result.payment_hash = payment_hash;

        Ok(result)
    }

    async fn list_transactions(
        &self,
        params: ListTransactionsParams,
    ) -> Result<ListTransactionsResult, NwcError> {
        let mut tagged: Vec<(PaymentDirection, PaymentRecord)> = Vec::new();

        if params.direction != Some(PaymentDirection::Outgoing) {
            let incoming = self
                .list_payments("/payments/incoming", &params)
                .await
                .map_err(|err| {
                    warn!(error = %err, "incoming payment list failed");
                    NwcError::internal("could not list transactions")
                })?;
            tagged.extend(incoming.into_iter().map(|r| (PaymentDirection::Incoming, r)));
        }

        if params.direction != Some(PaymentDirection::Incoming) {
            let outgoing = self
                .list_payments("/payments/outgoing", &params)
                .await
                .map_err(|err| {
                    warn!(error = %err, "outgoing payment list failed");
                    NwcError::internal("could not list payments")
                })?;
            tagged.extend(outgoing.into_iter().map(|r| (PaymentDirection::Outgoing, r)));
        }

        let transactions = merge_records(tagged, params.limit)?;
        Ok(ListTransactionsResult { transactions })
    }

    async fn get_info(&self) -> Result<GetInfoResult, NwcError> {
        let result: NodeInfoResponse = self.get("/getinfo", &[]).await.map_err(|err| {
            warn!(error = %err, "getinfo call failed");
            NwcError::internal("could not get information")
        })?;

        Ok(GetInfoResult {
            alias: String::new(),
            color: String::new(),
            pubkey: result.node_id,
            network: result.chain,
            block_height: 0,
            block_hash: String::new(),
            methods: CAPABILITIES.split(' ').map(String::from).collect(),
        })
    }
}

impl std::fmt::Debug for PhoenixdBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhoenixdBackend")
            .field("base_url", &self.base_url)
            .finish()
    }
}

fn basic_auth(key: &str) -> String {
    let encoded =
        base64::engine::general_purpose::STANDARD.encode(format!("phoenix-cli:{key}"));
    format!("Basic {encoded}")
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, BackendError> {
    let status = response.status().as_u16();
    if status >= 300 {
        let body = response.text().await.unwrap_or_default();
        return Err(BackendError::Api {
            status,
            body: truncate_body(&body).to_string(),
        });
    }
    Ok(response.json().await?)
}

fn truncate_body(body: &str) -> &str {
    if body.len() <= MAX_ERROR_BODY {
        return body;
    }
    let mut end = MAX_ERROR_BODY;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}

fn decode_bolt11(invoice: &str) -> Result<Bolt11Invoice, NwcError> {
    Bolt11Invoice::from_str(&invoice.to_lowercase()).map_err(|err| {
        warn!(error = %err, "bolt11 decode failed");
        NwcError::internal("could not decode invoice")
    })
}

/// `expires_at` in unix seconds: creation plus the invoice expiry.
fn invoice_expiry(created_at: u64, bolt11: &Bolt11Invoice) -> u64 {
    let expiry = bolt11.expiry_time().as_secs();
    if expiry > 0 {
        created_at + expiry
    } else {
        0
    }
}

fn record_to_invoice(
    direction: PaymentDirection,
    record: &PaymentRecord,
    bolt11: &Bolt11Invoice,
) -> Result<InvoiceResult, NwcError> {
    let created_at = record.created_at / 1000;
    let amount_sat = match direction {
        PaymentDirection::Incoming => record.received_sat,
        PaymentDirection::Outgoing => record.sent,
    };

    Ok(InvoiceResult {
        direction,
        invoice: record.invoice.clone(),
        description: record.description.clone(),
        description_hash: record.description_hash.clone(),
        preimage: if record.is_paid {
            record.preimage.clone()
        } else {
            String::new()
        },
        payment_hash: record.payment_hash.clone(),
        amount: amount_sat * 1000,
        fees_paid: record.fees * 1000,
        created_at,
        expires_at: invoice_expiry(created_at, bolt11),
        settled_at: if record.is_paid {
            record.completed_at / 1000
        } else {
            0
        },
    })
}

/// Merge incoming and outgoing records into one list sorted by creation
/// time descending, clamped to `limit` entries when a limit is given.
fn merge_records(
    tagged: Vec<(PaymentDirection, PaymentRecord)>,
    limit: u64,
) -> Result<Vec<InvoiceResult>, NwcError> {
    let mut transactions = Vec::with_capacity(tagged.len());
    for (direction, record) in &tagged {
        let bolt11 = decode_bolt11(&record.invoice)?;
        transactions.push(record_to_invoice(*direction, record, &bolt11)?);
    }

    transactions.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    let limit = limit as usize;
    if limit > 0 && transactions.len() > limit {
        transactions.truncate(limit);
    }

    Ok(transactions)
}
