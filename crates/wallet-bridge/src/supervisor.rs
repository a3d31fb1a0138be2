//! Per-user wiring, info-event advertisement, shutdown propagation.

use std::sync::Arc;

use nostr_sdk::prelude::*;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use lightning_backend::{build_backend, BackendConfig};
use nwc_protocol::{
    build_info_event, Envelope, CAPABILITIES, INFO_KIND, NOTIFICATIONS_TAG, NOTIFICATION_TYPES,
};
use nwc_store::EventStore;

use crate::config::{BridgeConfig, UserBinding};
use crate::error::BridgeError;
use crate::executor::run_executor;
use crate::listener::run_listener;
use crate::publisher::run_publisher;
use crate::recovery::recover_user;
use crate::relay::{NostrRelayHandle, ReconnectPolicy, RelayHandle};

/// Capacity of the per-user request and response queues. A full queue
/// backpressures the listener; the relay-side subscription limit of 1000
/// bounds the backlog.
pub const CHANNEL_CAPACITY: usize = 32;

/// Owns the store and service keys and runs one pipeline per user.
pub struct Bridge {
    config: BridgeConfig,
    store: EventStore,
    keys: Keys,
}

impl Bridge {
    pub fn new(config: BridgeConfig) -> Result<Self, BridgeError> {
        let keys = config.keys()?;
        let store = EventStore::open(&config.db_path)?;
        Ok(Self {
            config,
            store,
            keys,
        })
    }

    pub fn service_pubkey(&self) -> PublicKey {
        self.keys.public_key()
    }

    /// Start every user pipeline and block until `shutdown` fires and all
    /// stages have unwound.
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), BridgeError> {
        info!(pubkey = %self.keys.public_key(), "starting wallet bridge");

        let mut handles: Vec<JoinHandle<()>> = Vec::new();

        for user in &self.config.users {
            if user.relay.is_empty() {
                warn!(user = %user.name, "no relay configured, skipping");
                continue;
            }

            match self.start_user(user.clone(), shutdown.clone()).await {
                Ok(mut user_handles) => handles.append(&mut user_handles),
                Err(err) => {
                    error!(user = %user.name, error = %err, "could not start user pipeline");
                    return Err(err);
                }
            }
        }

        shutdown.cancelled().await;
        info!("shutting down, waiting for stages to exit");
        for handle in handles {
            let _ = handle.await;
        }
        info!("wallet bridge stopped");

        Ok(())
    }

    async fn start_user(
        &self,
        user: UserBinding,
        shutdown: CancellationToken,
    ) -> Result<Vec<JoinHandle<()>>, BridgeError> {
        let client_pubkey = user.client_pubkey()?;
        let backend = build_backend(BackendConfig {
            kind: user.kind.parse()?,
            host: user.host.clone(),
            key: user.key.clone(),
        })?;

        let relay: Arc<dyn RelayHandle> = Arc::new(NostrRelayHandle::new(&user.relay).await?);
        if let Err(err) = relay.connect().await {
            warn!(relay_url = %user.relay, error = %err, "initial relay connect failed");
        }

        ensure_info_event(relay.as_ref(), &self.keys).await;

        info!(user = %user.name, pubkey = %client_pubkey, "filtering for requests from pubkey");

        let envelope = Envelope::new(self.keys.clone(), client_pubkey);
        let (requests_tx, requests_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (responses_tx, responses_rx) = mpsc::channel(CHANNEL_CAPACITY);

        let mut handles = Vec::new();

        {
            let store = self.store.clone();
            let user = user.clone();
            let envelope = envelope.clone();
            let requests = requests_tx.clone();
            let responses = responses_tx.clone();
            handles.push(tokio::spawn(async move {
                if let Err(err) =
                    recover_user(&store, &user, &envelope, &requests, &responses).await
                {
                    warn!(user = %user.name, error = %err, "recovery pass failed");
                }
            }));
        }

        {
            let store = self.store.clone();
            let user = user.clone();
            let keys = self.keys.clone();
            let relay = relay.clone();
            let responses = responses_tx.clone();
            let shutdown = shutdown.clone();
            handles.push(tokio::spawn(async move {
                let name = user.name.clone();
                if let Err(err) =
                    run_listener(store, user, keys, relay, requests_tx, responses, shutdown).await
                {
                    error!(user = %name, error = %err, "listener failed");
                }
            }));
        }

        {
            let store = self.store.clone();
            let user = user.clone();
            let shutdown = shutdown.clone();
            handles.push(tokio::spawn(run_executor(
                store,
                user,
                envelope,
                backend,
                requests_rx,
                responses_tx,
                shutdown,
            )));
        }

        {
            let store = self.store.clone();
            handles.push(tokio::spawn(run_publisher(
                store,
                user,
                relay,
                ReconnectPolicy::default(),
                responses_rx,
                shutdown,
            )));
        }

        Ok(handles)
    }
}

/// Publish the kind-13194 info event unless the relay already carries a
/// current one. The `notifications` tag is part of the advertisement
/// identity, so a stale tag forces a republish even when the capability
/// string matches.
pub async fn ensure_info_event(relay: &dyn RelayHandle, keys: &Keys) {
    let filter = Filter::new()
        .kind(Kind::Custom(INFO_KIND))
        .author(keys.public_key())
        .limit(1);

    let existing = match relay.fetch_latest(filter).await {
        Ok(existing) => existing,
        Err(err) => {
            warn!(error = %err, "could not get info event from relay");
            None
        }
    };

    if let Some(event) = existing {
        if info_event_is_current(&event) {
            info!(event_id = %event.id, "info event is current");
            return;
        }
    }

    let event = match build_info_event(keys) {
        Ok(event) => event,
        Err(err) => {
            error!(error = %err, "could not sign info event");
            return;
        }
    };

    match relay.publish(event.clone()).await {
        Ok(()) => info!(event_id = %event.id, "published info event"),
        Err(err) => warn!(error = %err, "could not publish info event"),
    }
}

fn info_event_is_current(event: &Event) -> bool {
    if event.content != CAPABILITIES {
        return false;
    }
    event.tags.iter().any(|tag| {
        let fields = tag.as_slice();
        fields.len() == 2 && fields[0] == NOTIFICATIONS_TAG && fields[1] == NOTIFICATION_TYPES
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_info_event_needs_content_and_tag() {
        let keys = Keys::generate();
        let current = build_info_event(&keys).unwrap();
        assert!(info_event_is_current(&current));

        let stale_content = EventBuilder::new(Kind::Custom(INFO_KIND), "pay_invoice")
            .tags([Tag::parse([NOTIFICATIONS_TAG, NOTIFICATION_TYPES]).unwrap()])
            .sign_with_keys(&keys)
            .unwrap();
        assert!(!info_event_is_current(&stale_content));

        let missing_tag = EventBuilder::new(Kind::Custom(INFO_KIND), CAPABILITIES)
            .sign_with_keys(&keys)
            .unwrap();
        assert!(!info_event_is_current(&missing_tag));
    }
}
