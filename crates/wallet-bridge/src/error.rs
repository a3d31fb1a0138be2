use thiserror::Error;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("nostr client error: {0}")]
    NostrClient(#[from] nostr_sdk::client::Error),
    #[error("nostr key error: {0}")]
    Key(#[from] nostr_sdk::nostr::key::Error),
    #[error("nostr event error: {0}")]
    Event(#[from] nostr_sdk::nostr::event::Error),
    #[error("protocol error: {0}")]
    Protocol(#[from] nwc_protocol::ProtocolError),
    #[error("store error: {0}")]
    Store(#[from] nwc_store::StoreError),
    #[error("backend error: {0}")]
    Backend(#[from] lightning_backend::BackendError),
    #[error("serde json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("relay error: {0}")]
    Relay(String),
}
