use crate::{Kind, PubKey, Signature, Tags, Timestamp, ID};
use secp256k1::{global::SECP256K1, schnorr, Message, XOnlyPublicKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventError {
    #[error("id does not match the event contents")]
    IdMismatch,

    #[error("invalid signature")]
    InvalidSignature,
}

/// represents a signed nostr event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: ID,
    pub pubkey: PubKey,
    pub created_at: Timestamp,
    pub kind: Kind,
    pub tags: Tags,
    pub content: String,
    pub sig: Signature,
}

impl Event {
    /// check that the id is the hash of the contents and that the signature covers it
    pub fn verify(&self) -> Result<(), EventError> {
        if !self.check_id() {
            return Err(EventError::IdMismatch);
        }
        if !self.verify_signature() {
            return Err(EventError::InvalidSignature);
        }
        Ok(())
    }

    pub fn verify_signature(&self) -> bool {
        let pubkey = match XOnlyPublicKey::from_slice(self.pubkey.as_bytes()) {
            Ok(pk) => pk,
            Err(_) => return false,
        };

        let signature = match schnorr::Signature::from_slice(self.sig.as_bytes()) {
            Ok(sig) => sig,
            Err(_) => return false,
        };

        let message = Message::from_digest(self.id.0);
        SECP256K1.verify_schnorr(&signature, &message, &pubkey).is_ok()
    }

    /// check if the event ID matches the computed ID
    pub fn check_id(&self) -> bool {
        compute_id(&self.pubkey, self.created_at, self.kind, &self.tags, &self.content) == self.id
    }
}

/// hash of the canonical `[0, pubkey, created_at, kind, tags, content]` serialization
pub(crate) fn compute_id(
    pubkey: &PubKey,
    created_at: Timestamp,
    kind: Kind,
    tags: &Tags,
    content: &str,
) -> ID {
    let array = serde_json::json!([0, pubkey, created_at, kind, tags, content]);
    let hash = Sha256::digest(array.to_string().as_bytes());
    ID::from_bytes(hash.into())
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(self) {
            Ok(json) => write!(f, "{}", json),
            Err(err) => write!(f, "Event({} >> {})", self.id, err),
        }
    }
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Event {}

impl std::hash::Hash for Event {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}
