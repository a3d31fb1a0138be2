//! Listener stage: relay subscription → authenticated, persisted requests.

use nostr_sdk::prelude::*;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use nwc_protocol::{Envelope, NwcError, Response, REQUEST_KIND};
use nwc_store::{EventStore, NewRequest, NewResponse, RequestRow, ResponseRow, StoreError};

use crate::config::UserBinding;
use crate::error::BridgeError;
use crate::relay::RelayHandle;

/// Decide what to do with one incoming relay event.
///
/// - `Ok(Some(row))`: authenticated and persisted, ready for the executor.
/// - `Ok(None)`: duplicate delivery, dropped silently.
/// - `Err(e)`: protocol error to send back, encrypted to the event author.
///   No request row is persisted in this case.
pub fn accept_event(
    store: &EventStore,
    user: &UserBinding,
    client_pubkey: &PublicKey,
    event: &Event,
) -> Result<Option<RequestRow>, NwcError> {
    let event_id = event.id.to_hex();

    match store.has_request(&event_id) {
        Ok(true) => {
            warn!(event_id = %event_id, "event already processed");
            return Ok(None);
        }
        Ok(false) => {}
        Err(err) => {
            warn!(error = %err, event_id = %event_id, "dedupe lookup failed");
            return Err(NwcError::internal("Internal error"));
        }
    }

    if event.pubkey != *client_pubkey {
        warn!(
            user = %user.name,
            pubkey = %event.pubkey,
            "ignoring event, does not match pubkey"
        );
        return Err(NwcError::unauthorized());
    }

    let new = NewRequest {
        event_id,
        pubkey: event.pubkey.to_hex(),
        user: user.name.clone(),
        raw: event.as_json(),
        expires_at: expiration_tag(event),
    };

    match store.insert_request(new) {
        Ok(row) => Ok(Some(row)),
        Err(StoreError::Duplicate(_)) => Ok(None),
        Err(err) => {
            warn!(error = %err, event_id = %event.id, "could not save event");
            Err(NwcError::internal("Internal error"))
        }
    }
}

/// Run the listener until shutdown: subscribe for request events authored
/// by the user's client key, then dedupe / authenticate / persist /
/// enqueue each one.
pub async fn run_listener(
    store: EventStore,
    user: UserBinding,
    keys: Keys,
    relay: std::sync::Arc<dyn RelayHandle>,
    requests: mpsc::Sender<RequestRow>,
    responses: mpsc::Sender<ResponseRow>,
    shutdown: CancellationToken,
) -> Result<(), BridgeError> {
    let client_pubkey = user.client_pubkey()?;
    let filter = Filter::new()
        .kind(Kind::Custom(REQUEST_KIND))
        .author(client_pubkey)
        .limit(1000);

    let mut events = relay.subscribe(filter, shutdown.clone()).await?;
    info!(user = %user.name, "listener started");

    loop {
        let event = tokio::select! {
            _ = shutdown.cancelled() => break,
            maybe = events.recv() => match maybe {
                Some(event) => event,
                None => break,
            },
        };

        debug!(user = %user.name, event_id = %event.id, "handling event");

        match accept_event(&store, &user, &client_pubkey, &event) {
            Ok(Some(row)) => {
                if requests.send(row).await.is_err() {
                    break;
                }
            }
            Ok(None) => {}
            Err(nwc_err) => {
                if let Err(err) =
                    respond_with_error(&store, &user, &keys, &event, nwc_err, &responses).await
                {
                    warn!(user = %user.name, error = %err, "unable to create error response");
                }
            }
        }
    }

    info!(user = %user.name, "listener stopped");
    Ok(())
}

/// Commit and enqueue an error response encrypted to the event's
/// purported author (which may differ from the configured client key).
async fn respond_with_error(
    store: &EventStore,
    user: &UserBinding,
    keys: &Keys,
    event: &Event,
    error: NwcError,
    responses: &mpsc::Sender<ResponseRow>,
) -> Result<(), BridgeError> {
    let envelope = Envelope::new(keys.clone(), event.pubkey);
    let response_event =
        envelope.build_response(event.pubkey, event.id, &Response::error(error), vec![])?;

    let row = store.commit_response(NewResponse {
        event_id: response_event.id.to_hex(),
        request_event_id: event.id.to_hex(),
        pubkey: response_event.pubkey.to_hex(),
        user: user.name.clone(),
        raw: response_event.as_json(),
    })?;

    let _ = responses.send(row).await;
    Ok(())
}

/// NIP-40 expiration tag, when the client set one.
fn expiration_tag(event: &Event) -> Option<i64> {
    event.tags.iter().find_map(|tag| {
        let fields = tag.as_slice();
        if fields.first().map(String::as_str) == Some("expiration") {
            fields.get(1)?.parse().ok()
        } else {
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binding(pubkey: &PublicKey) -> UserBinding {
        UserBinding {
            name: "alice".to_string(),
            kind: "phoenix".to_string(),
            host: "localhost:9740".to_string(),
            key: "hunter2".to_string(),
            nwc_pubkey: pubkey.to_hex(),
            relay: "wss://relay.example.com".to_string(),
        }
    }

    fn signed_event(keys: &Keys, content: &str) -> Event {
        EventBuilder::new(Kind::Custom(REQUEST_KIND), content)
            .sign_with_keys(keys)
            .unwrap()
    }

    #[test]
    fn authorized_event_is_persisted() {
        let store = EventStore::open_in_memory().unwrap();
        let client = Keys::generate();
        let user = binding(&client.public_key());
        let event = signed_event(&client, "ciphertext");

        let row = accept_event(&store, &user, &client.public_key(), &event)
            .unwrap()
            .unwrap();
        assert_eq!(row.event_id, event.id.to_hex());
        assert_eq!(row.user, "alice");
        assert!(store.has_request(&event.id.to_hex()).unwrap());
    }

    #[test]
    fn duplicate_event_is_dropped_silently() {
        let store = EventStore::open_in_memory().unwrap();
        let client = Keys::generate();
        let user = binding(&client.public_key());
        let event = signed_event(&client, "ciphertext");

        accept_event(&store, &user, &client.public_key(), &event).unwrap();
        let second = accept_event(&store, &user, &client.public_key(), &event).unwrap();
        assert!(second.is_none());
    }

    #[test]
    fn unknown_author_is_rejected_without_a_row() {
        let store = EventStore::open_in_memory().unwrap();
        let client = Keys::generate();
        let stranger = Keys::generate();
        let user = binding(&client.public_key());
        let event = signed_event(&stranger, "ciphertext");

        let err = accept_event(&store, &user, &client.public_key(), &event).unwrap_err();
        assert_eq!(err, NwcError::unauthorized());
        assert!(!store.has_request(&event.id.to_hex()).unwrap());
    }

    #[test]
    fn expiration_tag_is_captured() {
        let store = EventStore::open_in_memory().unwrap();
        let client = Keys::generate();
        let user = binding(&client.public_key());

        let tag = Tag::parse(["expiration", "1700000123"]).unwrap();
        let event = EventBuilder::new(Kind::Custom(REQUEST_KIND), "ciphertext")
            .tags([tag])
            .sign_with_keys(&client)
            .unwrap();

        let row = accept_event(&store, &user, &client.public_key(), &event)
            .unwrap()
            .unwrap();
        assert_eq!(row.expires_at, Some(1_700_000_123));
    }
}
