//! TOML configuration file loading.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use nostr_sdk::prelude::Keys;
use serde::{Deserialize, Serialize};
use tracing::warn;

use wallet_bridge::{BridgeConfig, UserBinding};

/// The on-disk configuration: service-wide `nostrprivatekey` and
/// `datadir`, plus one `[[users]]` table per wallet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub nostrprivatekey: String,
    #[serde(default = "default_datadir")]
    pub datadir: PathBuf,
    #[serde(default)]
    pub users: Vec<UserSettings>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserSettings {
    pub name: String,
    pub kind: String,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub key: String,
    /// The authorized client public key. May be omitted when `nwcsecret`
    /// is set; the pubkey is derived from it.
    #[serde(default)]
    pub nwcpubkey: String,
    #[serde(default)]
    pub nwcsecret: String,
    #[serde(default)]
    pub nwcrelay: String,
}

fn default_datadir() -> PathBuf {
    PathBuf::from("data")
}

impl Settings {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("could not read config file {}", path.display()))?;
        let settings: Self = toml::from_str(&content)
            .with_context(|| format!("could not parse config file {}", path.display()))?;
        if settings.nostrprivatekey.is_empty() {
            bail!("nostrprivatekey is required");
        }
        Ok(settings)
    }

    /// Map the file settings onto the bridge configuration, dropping
    /// users the bridge cannot serve.
    pub fn bridge_config(&self) -> anyhow::Result<BridgeConfig> {
        let mut users = Vec::with_capacity(self.users.len());

        for user in &self.users {
            if user.nwcrelay.is_empty() {
                warn!(user = %user.name, "no nwcrelay configured, skipping");
                continue;
            }

            let nwc_pubkey = if !user.nwcpubkey.is_empty() {
                user.nwcpubkey.clone()
            } else if !user.nwcsecret.is_empty() {
                Keys::parse(&user.nwcsecret)
                    .with_context(|| format!("invalid nwcsecret for user {}", user.name))?
                    .public_key()
                    .to_hex()
            } else {
                warn!(user = %user.name, "no nwcpubkey or nwcsecret configured, skipping");
                continue;
            };

            users.push(UserBinding {
                name: user.name.clone(),
                kind: user.kind.clone(),
                host: user.host.clone(),
                key: user.key.clone(),
                nwc_pubkey,
                relay: user.nwcrelay.clone(),
            });
        }

        Ok(BridgeConfig {
            service_key: self.nostrprivatekey.clone(),
            db_path: self.datadir.join("nwc.db"),
            users,
        })
    }
}
