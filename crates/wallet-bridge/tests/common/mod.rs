//! Shared test doubles: an in-memory relay and a canned Lightning backend.
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use nostr_sdk::prelude::*;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use lightning_backend::LightningBackend;
use nwc_protocol::{
    Envelope, GetBalanceResult, GetInfoResult, InvoiceResult, ListTransactionsParams,
    ListTransactionsResult, LookupInvoiceParams, MakeInvoiceParams, NwcError, PayInvoiceParams,
    PayInvoiceResult, REQUEST_KIND,
};
use wallet_bridge::{BridgeError, RelayHandle, UserBinding};

/// Relay double. Connection state, published events, and the subscription
/// feed are all inspectable from the test body.
pub struct MockRelay {
    url: String,
    connected: AtomicBool,
    failures_remaining: AtomicU32,
    started: tokio::time::Instant,
    connect_offsets: Mutex<Vec<Duration>>,
    published: Mutex<Vec<Event>>,
    subscription: Mutex<Option<mpsc::Sender<Event>>>,
    stored_info: Mutex<Option<Event>>,
}

impl MockRelay {
    pub fn connected() -> Arc<Self> {
        Arc::new(Self::new(true, 0))
    }

    /// A disconnected relay whose first `failures` connect attempts fail.
    pub fn flaky(failures: u32) -> Arc<Self> {
        Arc::new(Self::new(false, failures))
    }

    fn new(connected: bool, failures: u32) -> Self {
        Self {
            url: "wss://relay.test".to_string(),
            connected: AtomicBool::new(connected),
            failures_remaining: AtomicU32::new(failures),
            started: tokio::time::Instant::now(),
            connect_offsets: Mutex::new(Vec::new()),
            published: Mutex::new(Vec::new()),
            subscription: Mutex::new(None),
            stored_info: Mutex::new(None),
        }
    }

    pub fn published(&self) -> Vec<Event> {
        self.published.lock().unwrap().clone()
    }

    /// Seconds from relay creation to each connect attempt.
    pub fn connect_offsets(&self) -> Vec<f64> {
        self.connect_offsets
            .lock()
            .unwrap()
            .iter()
            .map(|offset| offset.as_secs_f64())
            .collect()
    }

    pub fn set_stored_info(&self, event: Event) {
        *self.stored_info.lock().unwrap() = Some(event);
    }

    /// Feed an event into the active subscription.
    pub async fn inject(&self, event: Event) {
        let sender = self
            .subscription
            .lock()
            .unwrap()
            .clone()
            .expect("no active subscription");
        sender.send(event).await.expect("subscription closed");
    }

    /// Wait for the listener to subscribe.
    pub async fn wait_subscribed(&self) {
        for _ in 0..500 {
            if self.subscription.lock().unwrap().is_some() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("listener never subscribed");
    }

    /// Wait until at least `count` events were published.
    pub async fn wait_published(&self, count: usize) -> Vec<Event> {
        for _ in 0..500 {
            let published = self.published();
            if published.len() >= count {
                return published;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!(
            "expected {} published events, got {}",
            count,
            self.published().len()
        );
    }
}

#[async_trait]
impl RelayHandle for MockRelay {
    fn url(&self) -> &str {
        &self.url
    }

    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn connect(&self) -> Result<(), BridgeError> {
        self.connect_offsets
            .lock()
            .unwrap()
            .push(self.started.elapsed());

        let remaining = self.failures_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures_remaining.store(remaining - 1, Ordering::SeqCst);
            return Err(BridgeError::Relay("connection refused".to_string()));
        }

        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn subscribe(
        &self,
        _filter: Filter,
        _shutdown: CancellationToken,
    ) -> Result<mpsc::Receiver<Event>, BridgeError> {
        let (tx, rx) = mpsc::channel(32);
        *self.subscription.lock().unwrap() = Some(tx);
        Ok(rx)
    }

    async fn publish(&self, event: Event) -> Result<(), BridgeError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(BridgeError::Relay("not connected".to_string()));
        }
        self.published.lock().unwrap().push(event);
        Ok(())
    }

    async fn fetch_latest(&self, _filter: Filter) -> Result<Option<Event>, BridgeError> {
        Ok(self.stored_info.lock().unwrap().clone())
    }
}

/// Backend double answering with fixed values.
pub struct MockBackend {
    pub preimage: String,
    pub balance_msat: u64,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self {
            preimage: "4f".repeat(32),
            balance_msat: 12_345_000,
        }
    }
}

#[async_trait]
impl LightningBackend for MockBackend {
    async fn pay_invoice(&self, _: PayInvoiceParams) -> Result<PayInvoiceResult, NwcError> {
        Ok(PayInvoiceResult {
            preimage: self.preimage.clone(),
        })
    }

    async fn get_balance(&self) -> Result<GetBalanceResult, NwcError> {
        Ok(GetBalanceResult {
            balance: self.balance_msat,
        })
    }

    async fn make_invoice(&self, _: MakeInvoiceParams) -> Result<InvoiceResult, NwcError> {
        Err(NwcError::internal("could not create invoice"))
    }

    async fn lookup_invoice(&self, _: LookupInvoiceParams) -> Result<InvoiceResult, NwcError> {
        Err(NwcError::not_found("could not find invoice"))
    }

    async fn list_transactions(
        &self,
        _: ListTransactionsParams,
    ) -> Result<ListTransactionsResult, NwcError> {
        Ok(ListTransactionsResult {
            transactions: vec![],
        })
    }

    async fn get_info(&self) -> Result<GetInfoResult, NwcError> {
        Ok(GetInfoResult {
            alias: String::new(),
            color: String::new(),
            pubkey: String::new(),
            network: "mainnet".to_string(),
            block_height: 0,
            block_hash: String::new(),
            methods: nwc_protocol::CAPABILITIES
                .split(' ')
                .map(String::from)
                .collect(),
        })
    }
}

pub fn user_binding(client_pubkey: &PublicKey) -> UserBinding {
    UserBinding {
        name: "alice".to_string(),
        kind: "phoenix".to_string(),
        host: "localhost:9740".to_string(),
        key: "hunter2".to_string(),
        nwc_pubkey: client_pubkey.to_hex(),
        relay: "wss://relay.test".to_string(),
    }
}

/// A kind-23194 request event: payload encrypted client→service, signed
/// by the client.
pub fn request_event(client: &Keys, service_pubkey: PublicKey, payload: &str) -> Event {
    let envelope = Envelope::new(client.clone(), service_pubkey);
    let content = envelope.encrypt(payload).unwrap();
    EventBuilder::new(Kind::Custom(REQUEST_KIND), content)
        .sign_with_keys(client)
        .unwrap()
}

/// Decrypt a response event addressed to `client`.
pub fn decrypt_response(
    client: &Keys,
    service_pubkey: PublicKey,
    event: &Event,
) -> serde_json::Value {
    let envelope = Envelope::new(client.clone(), service_pubkey);
    let plaintext = envelope.decrypt(&event.content).unwrap();
    serde_json::from_str(&plaintext).unwrap()
}

/// Tag values of `name` on an event.
pub fn tag_values(event: &Event, name: &str) -> Vec<String> {
    event
        .tags
        .iter()
        .filter_map(|tag| {
            let fields = tag.as_slice();
            if fields.first().map(String::as_str) == Some(name) {
                fields.get(1).cloned()
            } else {
                None
            }
        })
        .collect()
}
