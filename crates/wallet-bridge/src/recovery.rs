//! Startup recovery: requeue interrupted work left behind by a crash.

use nostr_sdk::prelude::*;
use tokio::sync::mpsc;
use tracing::{info, warn};

use nwc_protocol::{Envelope, NwcError, Response, METHOD_PAY_INVOICE};
use nwc_store::{
    EventStore, NewResponse, RequestRow, RequestStatus, ResponseRow, ResponseStatus,
};

use crate::config::UserBinding;
use crate::error::BridgeError;

/// Scan the store for one user's unfinished rows and feed them back into
/// the pipeline.
///
/// - `received` requests simply re-enter the executor queue.
/// - `running` requests are reset to `received` and re-enqueued — except
///   `pay_invoice`, which is not idempotent: the payment may or may not
///   have left the node, so the client gets an `INTERNAL` error instead
///   of a blind retry. Requests whose envelope no longer decrypts are
///   answered the same way.
/// - `created` responses re-enter the publisher queue; `sending` ones are
///   reset to `created` first so the publisher's status guard passes.
pub async fn recover_user(
    store: &EventStore,
    user: &UserBinding,
    envelope: &Envelope,
    requests: &mpsc::Sender<RequestRow>,
    responses: &mpsc::Sender<ResponseRow>,
) -> Result<(), BridgeError> {
    let open_requests = store.list_open_requests(&user.name)?;
    let open_responses = store.list_open_responses(&user.name)?;

    if open_requests.is_empty() && open_responses.is_empty() {
        return Ok(());
    }

    info!(
        user = %user.name,
        requests = open_requests.len(),
        responses = open_responses.len(),
        "recovering unfinished events"
    );

    for row in open_requests {
        match row.status {
            RequestStatus::Received => {
                if requests.send(row).await.is_err() {
                    return Ok(());
                }
            }
            RequestStatus::Running => {
                if retry_is_safe(envelope, &row) {
                    store.set_request_status(row.id, RequestStatus::Received)?;
                    let row = RequestRow {
                        status: RequestStatus::Received,
                        ..row
                    };
                    if requests.send(row).await.is_err() {
                        return Ok(());
                    }
                } else {
                    warn!(
                        user = %user.name,
                        event_id = %row.event_id,
                        "interrupted non-idempotent request, answering with error"
                    );
                    let response = fail_interrupted(store, user, envelope, &row)?;
                    if responses.send(response).await.is_err() {
                        return Ok(());
                    }
                }
            }
            RequestStatus::Done => {}
        }
    }

    for row in open_responses {
        let row = match row.status {
            ResponseStatus::Sending => {
                store.set_response_status(row.id, ResponseStatus::Created)?;
                ResponseRow {
                    status: ResponseStatus::Created,
                    ..row
                }
            }
            _ => row,
        };
        if responses.send(row).await.is_err() {
            return Ok(());
        }
    }

    Ok(())
}

/// A `running` request may be retried only when replaying the backend
/// call cannot move funds twice.
fn retry_is_safe(envelope: &Envelope, row: &RequestRow) -> bool {
    let Ok(event) = Event::from_json(&row.raw) else {
        return false;
    };
    match envelope.decrypt_request(&event) {
        Ok(request) => request.method != METHOD_PAY_INVOICE,
        Err(_) => false,
    }
}

fn fail_interrupted(
    store: &EventStore,
    user: &UserBinding,
    envelope: &Envelope,
    row: &RequestRow,
) -> Result<ResponseRow, BridgeError> {
    let event = Event::from_json(&row.raw)?;
    let response = Response::error(NwcError::internal("request was interrupted"));
    let response_event = envelope.build_response(event.pubkey, event.id, &response, vec![])?;

    let committed = store.commit_response(NewResponse {
        event_id: response_event.id.to_hex(),
        request_event_id: row.event_id.clone(),
        pubkey: response_event.pubkey.to_hex(),
        user: user.name.clone(),
        raw: response_event.as_json(),
    })?;
    Ok(committed)
}
