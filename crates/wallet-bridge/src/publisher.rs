//! Publisher stage: response queue → relay, with reconnect backoff.

use std::sync::Arc;

use nostr_sdk::prelude::*;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use nwc_store::{EventStore, ResponseRow, ResponseStatus};

use crate::config::UserBinding;
use crate::error::BridgeError;
use crate::relay::{ReconnectPolicy, RelayHandle};

/// Publish one committed response.
///
/// Rows not in `created` are skipped. The row is moved to `sending`
/// before the publish attempt; on success it becomes `done`, on failure
/// it stays `sending` and the error is returned for the operator log.
pub async fn publish_response(
    store: &EventStore,
    relay: &dyn RelayHandle,
    policy: &ReconnectPolicy,
    response: &ResponseRow,
    shutdown: &CancellationToken,
) -> Result<(), BridgeError> {
    if response.status != ResponseStatus::Created {
        warn!(
            status = %response.status.as_str(),
            event_id = %response.event_id,
            "response must have 'created' status, ignoring"
        );
        return Ok(());
    }

    let event = Event::from_json(&response.raw)?;

    store.set_response_status(response.id, ResponseStatus::Sending)?;

    ensure_connected(relay, policy, shutdown).await?;

    relay.publish(event).await?;

    store.set_response_status(response.id, ResponseStatus::Done)?;
    Ok(())
}

/// Block until the relay is connected, sleeping 3 s after the first
/// failed attempt and 1.7× longer after each further one, indefinitely.
pub async fn ensure_connected(
    relay: &dyn RelayHandle,
    policy: &ReconnectPolicy,
    shutdown: &CancellationToken,
) -> Result<(), BridgeError> {
    if relay.is_connected().await {
        return Ok(());
    }

    let mut attempt: u32 = 0;
    loop {
        if shutdown.is_cancelled() {
            return Err(BridgeError::Relay("shutdown during reconnect".to_string()));
        }

        warn!(relay_url = %relay.url(), "relay is disconnected, attempting to reconnect");

        match relay.connect().await {
            Ok(()) => {
                info!(relay_url = %relay.url(), "connected");
                return Ok(());
            }
            Err(err) => {
                warn!(relay_url = %relay.url(), error = %err, "unable to connect");
            }
        }

        let delay = policy.delay_for_attempt(attempt);
        attempt += 1;

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.cancelled() => {
                return Err(BridgeError::Relay("shutdown during reconnect".to_string()));
            }
        }
    }
}

/// Drain the response queue until shutdown.
pub async fn run_publisher(
    store: EventStore,
    user: UserBinding,
    relay: Arc<dyn RelayHandle>,
    policy: ReconnectPolicy,
    mut responses: mpsc::Receiver<ResponseRow>,
    shutdown: CancellationToken,
) {
    info!(user = %user.name, "publisher started");

    loop {
        let response = tokio::select! {
            _ = shutdown.cancelled() => break,
            maybe = responses.recv() => match maybe {
                Some(response) => response,
                None => break,
            },
        };

        if let Err(err) =
            publish_response(&store, relay.as_ref(), &policy, &response, &shutdown).await
        {
            warn!(
                user = %user.name,
                event_id = %response.event_id,
                error = %err,
                "unable to publish response"
            );
        }
    }

    info!(user = %user.name, "publisher stopped");
}
