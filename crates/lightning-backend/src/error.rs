//! Transport-level backend errors.
//!
//! These never reach a wallet client directly; handlers map them to typed
//! NIP-47 errors with stable messages and log the detail for the operator.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackendError {
    /// HTTP request failed before a response arrived.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Response body could not be decoded.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The node answered with a non-success status.
    #[error("backend call failed ({status}): {body}")]
    Api { status: u16, body: String },

    /// The configured backend kind is not supported.
    #[error("unsupported backend kind: {0}")]
    UnsupportedKind(String),
}

impl BackendError {
    /// Whether this error is the node reporting "no such resource".
    pub fn is_not_found(&self) -> bool {
        matches!(self, BackendError::Api { status: 404, .. })
    }
}
