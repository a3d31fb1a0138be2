//! Lightning node backends for the wallet bridge.
//!
//! A backend exposes the NIP-47 capability set (pay, balance, invoices,
//! transaction history, node info) over a node's management API. Variants
//! are selected by the `kind` string in a user's configuration; adding a
//! backend is strictly additive.
//!
//! The wallet-connect surface speaks millisatoshis and unix seconds, the
//! node APIs speak satoshis and unix milliseconds — every conversion
//! happens here, at the adapter boundary, and nowhere else.

mod backend;
mod error;
mod phoenixd;

pub use backend::{build_backend, BackendConfig, BackendKind, LightningBackend};
pub use error::BackendError;
pub use phoenixd::PhoenixdBackend;

/// Crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
