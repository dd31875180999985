use crate::{
    group::select_latest,
    metadata::ProfileContent,
    nip19::{self, Nip19Error},
    Event, Filter, Kind, Pointer, Pool, PubKey,
};
use std::cmp::Reverse;
use std::time::Duration;

/// notes fetched alongside a profile when the caller does not say
pub const DEFAULT_NOTE_LIMIT: usize = 10;

#[derive(Debug, Clone)]
pub struct Profile {
    pub pubkey: PubKey,
    /// `None` when no relay had a kind 0 for this key
    pub content: Option<ProfileContent>,
    pub event: Option<Event>,
    /// kind 1 notes, newest first
    pub notes: Vec<Event>,
}

impl Profile {
    pub fn blank_from_pubkey(pk: PubKey) -> Self {
        Profile {
            pubkey: pk,
            content: None,
            event: None,
            notes: Vec::new(),
        }
    }

    pub fn render_name(&self) -> String {
        match self.content.as_ref().and_then(ProfileContent::metadata) {
            Some(metadata) => metadata.render_name(),
            None => self.pubkey.short(),
        }
    }
}

impl std::fmt::Display for Profile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Profile({}, {})", self.pubkey.to_hex(), self.render_name())
    }
}

/// resolve an npub or nprofile and load its kind 0 and latest kind 1 events.
/// relay hints carried by an nprofile are queried in addition to `relays`.
pub async fn fetch_profile_and_notes(
    pool: &Pool,
    identifier: &str,
    relays: &[String],
    note_limit: usize,
    timeout: Duration,
) -> Result<Profile, Nip19Error> {
    let identifier = identifier.trim().trim_start_matches("nostr:");
    let pointer = match nip19::decode_public_or_address(identifier)? {
        Pointer::Profile(pointer) => pointer,
        _ => {
            return Err(Nip19Error::UnsupportedIdentifierType(
                identifier.split('1').next().unwrap_or_default().to_string(),
            ))
        }
    };

    let mut urls = relays.to_vec();
    urls.extend(pointer.relays.iter().cloned());
    let pk = pointer.public_key;

    let metadata_filter = Filter::new()
        .kind(Kind::PROFILE_METADATA)
        .authors([pk])
        .limit(1);
    let notes_filter = Filter::new()
        .kind(Kind::TEXT_NOTE)
        .authors([pk])
        .limit(note_limit);

    let (metadata, notes) = tokio::join!(
        pool.query(&urls, metadata_filter, timeout),
        pool.query(&urls, notes_filter, timeout),
    );
    for failure in metadata.failures.iter().chain(notes.failures.iter()) {
        log::info!("[{}] profile lookup failed: {}", failure.url, failure.reason);
    }

    let mut profile = Profile::blank_from_pubkey(pk);
    if let Some(event) = select_latest(&metadata.events) {
        profile.content = Some(ProfileContent::from_event(event));
        profile.event = Some(event.clone());
    }

    profile.notes = notes.events;
    glidesort::sort_by_key(&mut profile.notes, |event| Reverse(event.created_at));
    profile.notes.truncate(note_limit);

    Ok(profile)
}
