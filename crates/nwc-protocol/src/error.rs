use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("nip04 error: {0}")]
    Nip04(#[from] nostr_sdk::nostr::nips::nip04::Error),
    #[error("nostr key error: {0}")]
    Key(#[from] nostr_sdk::nostr::key::Error),
    #[error("event builder error: {0}")]
    EventBuilder(#[from] nostr_sdk::nostr::event::builder::Error),
    #[error("nostr tag error: {0}")]
    Tag(#[from] nostr_sdk::nostr::event::tag::Error),
    #[error("serde json error: {0}")]
    Json(#[from] serde_json::Error),
}
