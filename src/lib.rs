//! # nip29-client
//!
//! a client for NIP-29 relay-based nostr groups
//!
//! this library loads a group's metadata, admins, chat messages and member profiles
//! from relays, and publishes chat messages and join requests for a logged-in identity.
//! every relay conversation is short-lived: connect, ask, close.

pub mod aggregator;
pub mod chat;
pub mod config;
pub mod envelopes;
pub mod event;
pub mod event_template;
pub mod filter;
pub mod group;
pub mod keys;
pub mod metadata;
pub mod nip19;
pub mod pointers;
pub mod pool;
pub mod profile;
pub mod publish;
pub mod relay;
pub mod session;
pub mod timestamp;

mod normalize;
mod tags;
mod types;

#[cfg(test)]
mod testing;

// re-export commonly used types
pub use aggregator::{FetchState, GroupAggregator, RefreshOutcome};
pub use chat::{GroupChat, SendOutcome};
pub use config::Config;
pub use event::Event;
pub use event_template::EventTemplate;
pub use filter::Filter;
pub use group::GroupSnapshot;
pub use keys::{PubKey, SecretKey};
pub use metadata::Metadata;
pub use normalize::*;
pub use pointers::{AddressPointer, EventPointer, Pointer, ProfilePointer};
pub use pool::Pool;
pub use relay::Relay;
pub use session::Session;
pub use tags::{Tag, Tags};
pub use timestamp::Timestamp;
pub use types::*;
