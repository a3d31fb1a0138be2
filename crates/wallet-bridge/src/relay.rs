//! Relay access for the pipeline stages.
//!
//! The stages talk to the relay through [`RelayHandle`] so the publisher's
//! reconnect loop and the listener's subscription can be exercised in
//! tests without a network. [`NostrRelayHandle`] is the production
//! implementation over a `nostr_sdk` client; reconnection state lives in
//! the SDK's relay pool, so a successful `connect` is visible to every
//! holder of the handle.

use std::time::Duration;

use async_trait::async_trait;
use nostr_sdk::prelude::*;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::BridgeError;
use crate::supervisor::CHANNEL_CAPACITY;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const FETCH_TIMEOUT: Duration = Duration::from_secs(3);

/// Reconnection backoff: 3 s after the first failed attempt, multiplied
/// by 1.7 for each further failure, retrying indefinitely.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    pub initial_delay: Duration,
    pub multiplier: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(3),
            multiplier: 1.7,
        }
    }
}

impl ReconnectPolicy {
    /// Delay to sleep after failed attempt number `attempt` (zero-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.initial_delay.mul_f64(self.multiplier.powi(attempt as i32))
    }
}

/// A per-user relay connection shared by the listener and publisher.
#[async_trait]
pub trait RelayHandle: Send + Sync {
    fn url(&self) -> &str;

    async fn is_connected(&self) -> bool;

    /// Attempt to (re)connect; returns an error when the relay is
    /// unreachable so callers can apply their backoff policy.
    async fn connect(&self) -> Result<(), BridgeError>;

    /// Subscribe with `filter` and stream matching events until the
    /// shutdown token fires or the receiver is dropped.
    async fn subscribe(
        &self,
        filter: Filter,
        shutdown: CancellationToken,
    ) -> Result<mpsc::Receiver<Event>, BridgeError>;

    async fn publish(&self, event: Event) -> Result<(), BridgeError>;

    /// The most recent stored event matching `filter`, if any.
    async fn fetch_latest(&self, filter: Filter) -> Result<Option<Event>, BridgeError>;
}

/// Production relay handle over a single-relay `nostr_sdk` client.
pub struct NostrRelayHandle {
    client: Client,
    url: String,
}

impl NostrRelayHandle {
    pub async fn new(url: &str) -> Result<Self, BridgeError> {
        let client = Client::default();
        client.add_relay(url).await?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl RelayHandle for NostrRelayHandle {
    fn url(&self) -> &str {
        &self.url
    }

    async fn is_connected(&self) -> bool {
        match self.client.relay(self.url.as_str()).await {
            Ok(relay) => relay.status() == RelayStatus::Connected,
            Err(_) => false,
        }
    }

    async fn connect(&self) -> Result<(), BridgeError> {
        let relay = self.client.relay(self.url.as_str()).await?;
        relay.connect(Some(CONNECT_TIMEOUT)).await;
        Ok(())
    }

    async fn subscribe(
        &self,
        filter: Filter,
        shutdown: CancellationToken,
    ) -> Result<mpsc::Receiver<Event>, BridgeError> {
        self.client.subscribe(vec![filter.clone()], None).await?;

        let mut notifications = self.client.notifications();
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let url = self.url.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    notification = notifications.recv() => match notification {
                        Ok(RelayPoolNotification::Event { event, .. }) => {
                            if filter_matches(&filter, &event) && tx.send(*event).await.is_err() {
                                break;
                            }
                        }
                        Ok(_) => {}
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(relay_url = %url, skipped, "notification stream lagged");
                        }
                        Err(RecvError::Closed) => break,
                    },
                }
            }
            debug!(relay_url = %url, "subscription forwarder stopped");
        });

        Ok(rx)
    }

    async fn publish(&self, event: Event) -> Result<(), BridgeError> {
        let output = self.client.send_event(event).await?;
        if output.success.is_empty() {
            return Err(BridgeError::Relay(format!(
                "publish rejected by {}",
                self.url
            )));
        }
        Ok(())
    }

    async fn fetch_latest(&self, filter: Filter) -> Result<Option<Event>, BridgeError> {
        let events = self.client.fetch_events(vec![filter], FETCH_TIMEOUT).await?;
        Ok(events.into_iter().next())
    }
}

/// The bridge only subscribes on kind and author, so that is all the
/// local re-check needs to cover.
fn filter_matches(filter: &Filter, event: &Event) -> bool {
    let kind_ok = filter
        .kinds
        .as_ref()
        .map(|kinds| kinds.contains(&event.kind))
        .unwrap_or(true);
    let author_ok = filter
        .authors
        .as_ref()
        .map(|authors| authors.contains(&event.pubkey))
        .unwrap_or(true);
    kind_ok && author_ok
}
