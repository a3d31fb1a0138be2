//! SQLite persistence for wallet-connect request and response events.
//!
//! A single-writer embedded store: every mutation runs in a transaction and
//! all access from the pipeline stages is serialized through one
//! connection. Rows are never deleted here; pruning is an external
//! concern.

mod error;
mod models;
mod store;

pub use error::StoreError;
pub use models::{
    NewRequest, NewResponse, RequestRow, RequestStatus, ResponseRow, ResponseStatus,
};
pub use store::EventStore;

use std::time::{SystemTime, UNIX_EPOCH};

/// Current unix time in seconds.
pub fn unix_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
