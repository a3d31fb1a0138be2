//! NIP-04 encryption envelope and response/info event construction.

use nostr_sdk::nostr::nips::nip04;
use nostr_sdk::prelude::*;

use crate::error::ProtocolError;
use crate::types::{
    Request, Response, CAPABILITIES, INFO_KIND, NOTIFICATIONS_TAG, NOTIFICATION_TYPES,
    RESPONSE_KIND,
};

/// Encrypts and decrypts payloads between the service key and one
/// counterparty key, and signs the events that carry them.
///
/// The shared secret is derived per call by the NIP-04 primitives; the
/// envelope only pins down which two keys take part.
#[derive(Debug, Clone)]
pub struct Envelope {
    keys: Keys,
    counterparty: PublicKey,
}

impl Envelope {
    pub fn new(keys: Keys, counterparty: PublicKey) -> Self {
        Self { keys, counterparty }
    }

    /// The service-side public key (the author of every response event).
    pub fn service_pubkey(&self) -> PublicKey {
        self.keys.public_key()
    }

    pub fn counterparty(&self) -> PublicKey {
        self.counterparty
    }

    /// NIP-04 encrypt `plaintext` to the counterparty.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, ProtocolError> {
        Ok(nip04::encrypt(
            self.keys.secret_key(),
            &self.counterparty,
            plaintext,
        )?)
    }

    /// NIP-04 decrypt ciphertext produced by the counterparty.
    pub fn decrypt(&self, ciphertext: &str) -> Result<String, ProtocolError> {
        Ok(nip04::decrypt(
            self.keys.secret_key(),
            &self.counterparty,
            ciphertext,
        )?)
    }

    /// Decrypt and parse the content of a kind-23194 request event.
    pub fn decrypt_request(&self, event: &Event) -> Result<Request, ProtocolError> {
        let payload = self.decrypt(&event.content)?;
        Ok(serde_json::from_str(&payload)?)
    }

    /// Build a signed kind-23195 response event answering `ref_event_id`.
    ///
    /// Tags are `["p", ref_pubkey]`, `["e", ref_event_id]` plus any
    /// `extra_tags`; the content is the encrypted response payload.
    pub fn build_response(
        &self,
        ref_pubkey: PublicKey,
        ref_event_id: EventId,
        response: &Response,
        extra_tags: Vec<Tag>,
    ) -> Result<Event, ProtocolError> {
        let payload = serde_json::to_string(response)?;
        let content = self.encrypt(&payload)?;

        let mut tags = vec![Tag::public_key(ref_pubkey), Tag::event(ref_event_id)];
        tags.extend(extra_tags);

        let event = EventBuilder::new(Kind::Custom(RESPONSE_KIND), content)
            .tags(tags)
            .sign_with_keys(&self.keys)?;
        Ok(event)
    }
}

/// Build the signed kind-13194 info event advertising the capability
/// string and notification types.
pub fn build_info_event(keys: &Keys) -> Result<Event, ProtocolError> {
    let notifications = Tag::parse([NOTIFICATIONS_TAG, NOTIFICATION_TYPES])?;
    let event = EventBuilder::new(Kind::Custom(INFO_KIND), CAPABILITIES)
        .tags([notifications])
        .sign_with_keys(keys)?;
    Ok(event)
}
