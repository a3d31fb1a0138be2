//! The Wallet Connect bridge.
//!
//! For each configured user this crate runs a three-stage pipeline against
//! the user's relay:
//!
//! 1. **listener** — subscribes for kind-23194 request events authored by
//!    the user's client key, authenticates and deduplicates them, persists
//!    a request row, and enqueues it;
//! 2. **executor** — drains the request queue, dispatches the decrypted
//!    method to the Lightning backend, and commits the encrypted response
//!    event atomically with marking the request done;
//! 3. **publisher** — drains the response queue and publishes each event,
//!    reconnecting to the relay with exponential backoff when needed.
//!
//! Stages communicate over bounded channels and share one durable store,
//! so a crash or disconnect never loses or duplicates an answer: delivery
//! is at-least-once with client-side dedup by event id.

mod config;
mod dispatch;
mod error;
mod executor;
mod listener;
mod publisher;
mod recovery;
mod relay;
mod supervisor;

pub use config::{BridgeConfig, UserBinding};
pub use dispatch::{dispatch_method, execute_request};
pub use error::BridgeError;
pub use executor::run_executor;
pub use listener::{accept_event, run_listener};
pub use publisher::{ensure_connected, publish_response, run_publisher};
pub use recovery::recover_user;
pub use relay::{NostrRelayHandle, ReconnectPolicy, RelayHandle};
pub use supervisor::{ensure_info_event, Bridge, CHANNEL_CAPACITY};

/// Crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
