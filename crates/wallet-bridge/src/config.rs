//! Bridge configuration records, handed in by the external loader.

use std::path::PathBuf;

use nostr_sdk::prelude::*;

use crate::error::BridgeError;

/// One user's wallet binding: who may talk to us, where, and which node
/// answers.
#[derive(Debug, Clone)]
pub struct UserBinding {
    /// Username (the local part of the Lightning address).
    pub name: String,
    /// Backend kind, e.g. `phoenix`.
    pub kind: String,
    /// Backend API host.
    pub host: String,
    /// Backend API key.
    pub key: String,
    /// The authorized client public key (hex or bech32).
    pub nwc_pubkey: String,
    /// Relay URL to subscribe and publish on. Empty disables the bridge
    /// for this user.
    pub relay: String,
}

impl UserBinding {
    pub fn client_pubkey(&self) -> Result<PublicKey, BridgeError> {
        Ok(PublicKey::parse(&self.nwc_pubkey)?)
    }
}

/// Service-wide bridge configuration.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// The service private key (hex or bech32). Signs every response and
    /// info event and is one half of each shared-secret derivation.
    pub service_key: String,
    /// Location of the SQLite event log.
    pub db_path: PathBuf,
    pub users: Vec<UserBinding>,
}

impl BridgeConfig {
    pub fn keys(&self) -> Result<Keys, BridgeError> {
        Ok(Keys::parse(&self.service_key)?)
    }
}
