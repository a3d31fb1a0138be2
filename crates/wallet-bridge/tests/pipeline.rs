//! End-to-end pipeline tests: listener → executor → publisher against an
//! in-memory relay, backend, and store.

mod common;

use std::sync::Arc;
use std::time::Duration;

use nostr_sdk::prelude::*;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use common::{decrypt_response, request_event, tag_values, user_binding, MockBackend, MockRelay};
use lightning_backend::LightningBackend;
use nwc_protocol::{Envelope, RESPONSE_KIND};
use nwc_store::{EventStore, RequestStatus};
use wallet_bridge::{
    run_executor, run_listener, run_publisher, RelayHandle, ReconnectPolicy, UserBinding,
    CHANNEL_CAPACITY,
};

struct Harness {
    store: EventStore,
    relay: Arc<MockRelay>,
    service: Keys,
    client: Keys,
    user: UserBinding,
    shutdown: CancellationToken,
}

impl Harness {
    async fn start(backend: Arc<dyn LightningBackend>) -> Self {
        let service = Keys::generate();
        let client = Keys::generate();
        let user = user_binding(&client.public_key());
        let store = EventStore::open_in_memory().unwrap();
        let relay = MockRelay::connected();
        let shutdown = CancellationToken::new();

        let (requests_tx, requests_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (responses_tx, responses_rx) = mpsc::channel(CHANNEL_CAPACITY);

        let relay_dyn: Arc<dyn RelayHandle> = relay.clone();
        tokio::spawn(run_listener(
            store.clone(),
            user.clone(),
            service.clone(),
            relay_dyn.clone(),
            requests_tx,
            responses_tx.clone(),
            shutdown.clone(),
        ));
        tokio::spawn(run_executor(
            store.clone(),
            user.clone(),
            Envelope::new(service.clone(), client.public_key()),
            backend,
            requests_rx,
            responses_tx,
            shutdown.clone(),
        ));
        tokio::spawn(run_publisher(
            store.clone(),
            user.clone(),
            relay_dyn,
            ReconnectPolicy::default(),
            responses_rx,
            shutdown.clone(),
        ));

        relay.wait_subscribed().await;

        Self {
            store,
            relay,
            service,
            client,
            user,
            shutdown,
        }
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[tokio::test]
async fn happy_path_pay_invoice() {
    let harness = Harness::start(Arc::new(MockBackend::default())).await;

    let request = request_event(
        &harness.client,
        harness.service.public_key(),
        r#"{"method":"pay_invoice","params":{"invoice":"lnbc10n1..."}}"#,
    );
    harness.relay.inject(request.clone()).await;

    let published = harness.relay.wait_published(1).await;
    let response = &published[0];

    assert_eq!(response.kind, Kind::Custom(RESPONSE_KIND));
    assert_eq!(response.pubkey, harness.service.public_key());
    response.verify().unwrap();
    assert_eq!(
        tag_values(response, "p"),
        vec![harness.client.public_key().to_hex()]
    );
    assert_eq!(tag_values(response, "e"), vec![request.id.to_hex()]);

    let content = decrypt_response(&harness.client, harness.service.public_key(), response);
    assert_eq!(content["result_type"], "pay_invoice");
    assert_eq!(content["result"]["preimage"], "4f".repeat(32));
    let preimage = content["result"]["preimage"].as_str().unwrap();
    assert_eq!(preimage.len(), 64);
    assert!(preimage.chars().all(|c| c.is_ascii_hexdigit()));

    // Durable state: request done, no open responses left behind.
    let row = harness
        .store
        .get_request(&request.id.to_hex())
        .unwrap()
        .unwrap();
    assert_eq!(row.status, RequestStatus::Done);
    assert!(harness
        .store
        .list_open_responses(&harness.user.name)
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn unauthorized_author_gets_encrypted_error_and_no_row() {
    let harness = Harness::start(Arc::new(MockBackend::default())).await;

    let stranger = Keys::generate();
    let request = request_event(
        &stranger,
        harness.service.public_key(),
        r#"{"method":"get_balance","params":{}}"#,
    );
    harness.relay.inject(request.clone()).await;

    let published = harness.relay.wait_published(1).await;
    let response = &published[0];

    // Encrypted to the purported author, not to the configured client.
    assert_eq!(
        tag_values(response, "p"),
        vec![stranger.public_key().to_hex()]
    );
    let content = decrypt_response(&stranger, harness.service.public_key(), response);
    assert_eq!(content["error"]["code"], "UNAUTHORIZED");
    assert_eq!(
        content["error"]["message"],
        "The public key is not authorized"
    );
    assert!(content.get("result").is_none());

    assert!(harness
        .store
        .get_request(&request.id.to_hex())
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn duplicate_delivery_yields_one_row_and_one_response() {
    let harness = Harness::start(Arc::new(MockBackend::default())).await;

    let request = request_event(
        &harness.client,
        harness.service.public_key(),
        r#"{"method":"get_balance","params":{}}"#,
    );
    harness.relay.inject(request.clone()).await;
    harness.relay.inject(request.clone()).await;

    harness.relay.wait_published(1).await;
    // Give the pipeline a moment to (incorrectly) process the duplicate.
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(harness.relay.published().len(), 1);
    let row = harness
        .store
        .get_request(&request.id.to_hex())
        .unwrap()
        .unwrap();
    assert_eq!(row.status, RequestStatus::Done);
}

#[tokio::test]
async fn get_balance_reports_msat() {
    let harness = Harness::start(Arc::new(MockBackend {
        balance_msat: 12_345_000,
        ..Default::default()
    }))
    .await;

    let request = request_event(
        &harness.client,
        harness.service.public_key(),
        r#"{"method":"get_balance","params":{}}"#,
    );
    harness.relay.inject(request).await;

    let published = harness.relay.wait_published(1).await;
    let content = decrypt_response(&harness.client, harness.service.public_key(), &published[0]);
    assert_eq!(content["result_type"], "get_balance");
    assert_eq!(content["result"]["balance"], 12_345_000);
}

#[tokio::test]
async fn unknown_method_is_not_implemented() {
    let harness = Harness::start(Arc::new(MockBackend::default())).await;

    let request = request_event(
        &harness.client,
        harness.service.public_key(),
        r#"{"method":"sign_message","params":{}}"#,
    );
    harness.relay.inject(request.clone()).await;

    let published = harness.relay.wait_published(1).await;
    let content = decrypt_response(&harness.client, harness.service.public_key(), &published[0]);
    assert_eq!(content["error"]["code"], "NOT_IMPLEMENTED");
    assert_eq!(content["error"]["message"], "Not implemented.");

    // The request itself was valid, so it is persisted and finished.
    let row = harness
        .store
        .get_request(&request.id.to_hex())
        .unwrap()
        .unwrap();
    assert_eq!(row.status, RequestStatus::Done);
}

#[tokio::test]
async fn requests_execute_in_delivery_order() {
    let harness = Harness::start(Arc::new(MockBackend::default())).await;

    let first = request_event(
        &harness.client,
        harness.service.public_key(),
        r#"{"method":"get_balance","params":{}}"#,
    );
    let second = request_event(
        &harness.client,
        harness.service.public_key(),
        r#"{"method":"pay_invoice","params":{"invoice":"lnbc10n1..."}}"#,
    );
    harness.relay.inject(first.clone()).await;
    harness.relay.inject(second.clone()).await;

    let published = harness.relay.wait_published(2).await;
    assert_eq!(tag_values(&published[0], "e"), vec![first.id.to_hex()]);
    assert_eq!(tag_values(&published[1], "e"), vec![second.id.to_hex()]);
}
