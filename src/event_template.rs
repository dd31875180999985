use crate::{event::compute_id, Event, Kind, PubKey, SecretKey, Signature, Tags, Timestamp};
use secp256k1::{global::SECP256K1, Message};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignError {
    #[error("invalid secret key")]
    InvalidSecretKey,

    #[error("template author {expected} does not belong to the signing key")]
    KeyMismatch { expected: PubKey },
}

/// represents an unsigned nostr event
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct EventTemplate {
    pub pubkey: PubKey,
    pub created_at: Timestamp,
    pub kind: Kind,
    pub tags: Tags,
    pub content: String,
}

impl EventTemplate {
    /// pure construction, nothing is hashed or signed yet
    pub fn new(
        kind: Kind,
        tags: Tags,
        content: impl Into<String>,
        created_at: Timestamp,
        pubkey: PubKey,
    ) -> Self {
        Self {
            pubkey,
            created_at,
            kind,
            tags,
            content: content.into(),
        }
    }

    /// the id this template will have once signed
    pub fn id(&self) -> crate::ID {
        compute_id(
            &self.pubkey,
            self.created_at,
            self.kind,
            &self.tags,
            &self.content,
        )
    }

    /// returns a signed event with id and sig
    pub fn sign(self, secret_key: &SecretKey) -> Result<Event, SignError> {
        if secret_key.pubkey() != self.pubkey {
            return Err(SignError::KeyMismatch {
                expected: self.pubkey,
            });
        }

        let id = self.id();
        let keypair = secret_key.keypair();
        let signature = SECP256K1.sign_schnorr_no_aux_rand(&Message::from_digest(id.0), &keypair);

        Ok(Event {
            id,
            pubkey: self.pubkey,
            sig: Signature::from_bytes(signature.serialize()),
            kind: self.kind,
            tags: self.tags,
            created_at: self.created_at,
            content: self.content,
        })
    }

    /// sign with raw secret bytes as they come out of storage
    pub fn sign_with_bytes(self, secret: &[u8]) -> Result<Event, SignError> {
        let secret_key = SecretKey::from_slice(secret).map_err(|_| SignError::InvalidSecretKey)?;
        self.sign(&secret_key)
    }
}

impl std::fmt::Display for EventTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "EventTemplate({}, {}, {}, {})",
            self.kind, self.created_at, self.tags, self.content
        )
    }
}
