use crate::{Event, Filter, Kind, PubKey, ID};

/// any of the things a bech32 identifier can point to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pointer {
    Profile(ProfilePointer),
    Event(EventPointer),
    Address(AddressPointer),
}

/// Pointer to a Nostr profile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfilePointer {
    pub public_key: PubKey,
    pub relays: Vec<String>,
}

/// Pointer to a Nostr event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventPointer {
    pub id: ID,
    pub relays: Vec<String>,
    pub author: Option<PubKey>,
    pub kind: Option<Kind>,
}

/// Pointer to an addressable event, e.g. a NIP-29 group's metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressPointer {
    pub public_key: PubKey,
    pub kind: Kind,
    pub identifier: String,
    pub relays: Vec<String>,
}

impl AddressPointer {
    /// the `kind:pubkey:identifier` form used in `a` tags
    pub fn as_tag_reference(&self) -> String {
        format!("{}:{}:{}", self.kind, self.public_key.to_hex(), self.identifier)
    }

    /// the filter that fetches the latest version of the addressed event
    pub fn as_filter(&self) -> Filter {
        Filter::new()
            .kind(self.kind)
            .authors([self.public_key])
            .tag("d", &[self.identifier.as_str()])
            .limit(1)
    }

    pub fn matches_event(&self, event: &Event) -> bool {
        event.pubkey == self.public_key
            && event.kind == self.kind
            && event.tags.get_d() == self.identifier
    }
}

impl Pointer {
    /// converts the pointer to a Filter that can be used to query for it
    pub fn as_filter(&self) -> Filter {
        match self {
            Pointer::Profile(p) => Filter::new().authors([p.public_key]),
            Pointer::Event(p) => Filter::new().ids([p.id]),
            Pointer::Address(p) => p.as_filter(),
        }
    }

    /// relay hints carried by the pointer
    pub fn relays(&self) -> &[String] {
        match self {
            Pointer::Profile(p) => &p.relays,
            Pointer::Event(p) => &p.relays,
            Pointer::Address(p) => &p.relays,
        }
    }
}
