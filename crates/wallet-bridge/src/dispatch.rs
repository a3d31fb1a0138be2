//! Method dispatch: decoded request → backend call → committed response.

use nostr_sdk::prelude::*;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{info, warn};

use lightning_backend::LightningBackend;
use nwc_protocol::{
    Envelope, NwcError, Request, Response, METHOD_GET_BALANCE, METHOD_GET_INFO,
    METHOD_LIST_TRANSACTIONS, METHOD_LOOKUP_INVOICE, METHOD_MAKE_INVOICE,
    METHOD_MULTI_PAY_INVOICE, METHOD_MULTI_PAY_KEYSEND, METHOD_PAY_INVOICE, METHOD_PAY_KEYSEND,
    METHOD_SIGN_MESSAGE,
};
use nwc_store::{EventStore, NewResponse, RequestRow, RequestStatus, ResponseRow};

use crate::config::UserBinding;
use crate::error::BridgeError;

/// Route a decoded request to the backend and shape the reply envelope.
pub async fn dispatch_method(backend: &dyn LightningBackend, request: &Request) -> Response {
    let outcome: Result<Value, NwcError> = match request.method.as_str() {
        METHOD_PAY_INVOICE => match parse_params(&request.params) {
            Ok(params) => backend.pay_invoice(params).await.and_then(to_value),
            Err(err) => Err(err),
        },
        METHOD_GET_BALANCE => backend.get_balance().await.and_then(to_value),
        METHOD_MAKE_INVOICE => match parse_params(&request.params) {
            Ok(params) => backend.make_invoice(params).await.and_then(to_value),
            Err(err) => Err(err),
        },
        METHOD_LOOKUP_INVOICE => match parse_params(&request.params) {
            Ok(params) => backend.lookup_invoice(params).await.and_then(to_value),
            Err(err) => Err(err),
        },
        METHOD_LIST_TRANSACTIONS => match parse_params(&request.params) {
            Ok(params) => backend.list_transactions(params).await.and_then(to_value),
            Err(err) => Err(err),
        },
        METHOD_GET_INFO => backend.get_info().await.and_then(to_value),
        METHOD_PAY_KEYSEND | METHOD_MULTI_PAY_INVOICE | METHOD_MULTI_PAY_KEYSEND
        | METHOD_SIGN_MESSAGE => Err(NwcError::not_implemented()),
        _ => Err(NwcError::not_implemented()),
    };

    match outcome {
        Ok(result) => {
            info!(result_type = %request.method, "created response");
            Response::result(&request.method, result)
        }
        Err(err) => {
            warn!(
                method = %request.method,
                code = %err.code,
                message = %err.message,
                "created error response"
            );
            Response::error(err)
        }
    }
}

/// Execute one persisted request end to end.
///
/// Verifies the row is still `received` (returns `Ok(None)` otherwise),
/// marks it `running`, dispatches, then commits the signed response event
/// together with the request's `done` transition in one transaction.
pub async fn execute_request(
    store: &EventStore,
    envelope: &Envelope,
    backend: &dyn LightningBackend,
    user: &UserBinding,
    request: &RequestRow,
) -> Result<Option<ResponseRow>, BridgeError> {
    let event = Event::from_json(&request.raw)?;
    let decoded = envelope.decrypt_request(&event)?;

    if request.status != RequestStatus::Received {
        warn!(
            status = %request.status.as_str(),
            event_id = %request.event_id,
            "request must have 'received' status, ignoring"
        );
        return Ok(None);
    }

    store.set_request_status(request.id, RequestStatus::Running)?;

    let response = dispatch_method(backend, &decoded).await;

    let response_event = envelope.build_response(event.pubkey, event.id, &response, vec![])?;
    let row = store.commit_response(NewResponse {
        event_id: response_event.id.to_hex(),
        request_event_id: request.event_id.clone(),
        pubkey: response_event.pubkey.to_hex(),
        user: user.name.clone(),
        raw: response_event.as_json(),
    })?;

    Ok(Some(row))
}

fn parse_params<T: DeserializeOwned + Default>(params: &Value) -> Result<T, NwcError> {
    if params.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(params.clone())
        .map_err(|err| NwcError::other(format!("invalid params: {err}")))
}

fn to_value<T: serde::Serialize>(result: T) -> Result<Value, NwcError> {
    serde_json::to_value(result).map_err(|_| NwcError::internal("could not encode result"))
}
