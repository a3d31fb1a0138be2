//! Executor stage: request queue → backend dispatch → response queue.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use lightning_backend::LightningBackend;
use nwc_protocol::Envelope;
use nwc_store::{EventStore, RequestRow, ResponseRow};

use crate::config::UserBinding;
use crate::dispatch::execute_request;

/// Drain the request queue serially; backend calls never overlap for one
/// user. Dispatch failures that are not typed protocol errors are logged
/// and the request row stays `running` for the recovery pass to handle.
pub async fn run_executor(
    store: EventStore,
    user: UserBinding,
    envelope: Envelope,
    backend: Arc<dyn LightningBackend>,
    mut requests: mpsc::Receiver<RequestRow>,
    responses: mpsc::Sender<ResponseRow>,
    shutdown: CancellationToken,
) {
    info!(user = %user.name, "executor started");

    loop {
        let request = tokio::select! {
            _ = shutdown.cancelled() => break,
            maybe = requests.recv() => match maybe {
                Some(request) => request,
                None => break,
            },
        };

        // The dispatch future is dropped on cancellation, aborting any
        // in-flight backend HTTP call with it.
        let result = tokio::select! {
            _ = shutdown.cancelled() => break,
            result = execute_request(&store, &envelope, backend.as_ref(), &user, &request) => result,
        };

        match result {
            Ok(Some(row)) => {
                if responses.send(row).await.is_err() {
                    break;
                }
            }
            Ok(None) => {}
            Err(err) => {
                warn!(
                    user = %user.name,
                    event_id = %request.event_id,
                    error = %err,
                    "unable to execute request"
                );
            }
        }
    }

    info!(user = %user.name, "executor stopped");
}
