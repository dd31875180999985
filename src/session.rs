use crate::nip19::{self, Nip19Error};
use crate::{PubKey, SecretKey};
use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;

/// name under which the encoded secret is kept
pub const SECRET_ENTRY: &str = "nostr_nsec";

/// opaque key-value storage for the identity secret, provided by the host
pub trait SecretStore: Send + Sync {
    fn get(&self, name: &str) -> Option<String>;
    fn set(&self, name: &str, value: &str);
    fn clear(&self);
}

/// process-local store, forgets everything on exit
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SecretStore for MemoryStore {
    fn get(&self, name: &str) -> Option<String> {
        self.entries
            .lock()
            .ok()
            .and_then(|entries| entries.get(name).cloned())
    }

    fn set(&self, name: &str, value: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(name.to_string(), value.to_string());
        }
    }

    fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }
}

/// the logged-in identity; the secret stays inside and is only used for signing
#[derive(Clone)]
pub struct Session {
    secret: SecretKey,
    pubkey: PubKey,
    npub: String,
}

impl Session {
    /// decode an nsec, derive the public identity and remember the secret
    pub fn login(store: &dyn SecretStore, nsec: &str) -> Result<Self, Nip19Error> {
        let session = Self::from_nsec(nsec)?;
        store.set(SECRET_ENTRY, nsec.trim());
        log::info!("logged in as {}", session.npub);
        Ok(session)
    }

    /// pick up a previously stored secret; a corrupt entry is wiped
    pub fn restore(store: &dyn SecretStore) -> Option<Self> {
        let nsec = store.get(SECRET_ENTRY)?;
        match Self::from_nsec(&nsec) {
            Ok(session) => Some(session),
            Err(err) => {
                log::warn!("discarding stored secret: {}", err);
                store.clear();
                None
            }
        }
    }

    pub fn logout(self, store: &dyn SecretStore) {
        store.clear();
        log::info!("logged out {}", self.npub);
    }

    /// a fresh identity, not persisted until `login` is called with its nsec
    pub fn generate() -> Result<(Self, String), Nip19Error> {
        let secret = SecretKey::generate();
        let nsec = nip19::encode_nsec(&secret)?;
        Ok((Self::from_secret(secret)?, nsec))
    }

    fn from_nsec(nsec: &str) -> Result<Self, Nip19Error> {
        Self::from_secret(nip19::decode_secret(nsec)?)
    }

    fn from_secret(secret: SecretKey) -> Result<Self, Nip19Error> {
        let pubkey = secret.pubkey();
        let npub = nip19::encode_npub(&pubkey)?;
        Ok(Self {
            secret,
            pubkey,
            npub,
        })
    }

    pub fn pubkey(&self) -> PubKey {
        self.pubkey
    }

    pub fn npub(&self) -> &str {
        &self.npub
    }

    pub(crate) fn secret(&self) -> &SecretKey {
        &self.secret
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session").field("npub", &self.npub).finish()
    }
}
