//! NIP-29 group records: metadata, admins, snapshots and the events we send to a group

use crate::{
    metadata::ProfileContent,
    nip19::{self, Nip19Error},
    pool::RelayFailure,
    AddressPointer, Event, EventTemplate, Filter, Kind, Metadata, Pointer, Pool, PubKey, Tags,
    Timestamp,
};
use std::collections::HashMap;
use std::time::Duration;

/// where the group's metadata came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataSource {
    /// a kind 39000 event signed by the group relay, the group is managed
    Relay,
    /// nothing on the relay, built locally from what we know
    Synthesized,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupMetadata {
    pub id: String,
    pub name: String,
    pub about: Option<String>,
    pub picture: Option<String>,
    /// `None` when the relay did not say
    pub public: Option<bool>,
    pub open: Option<bool>,
    pub created_at: Option<Timestamp>,
    pub source: MetadataSource,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupAdmin {
    pub pubkey: PubKey,
    pub roles: Vec<String>,
}

/// everything one refresh cycle found out about a group
#[derive(Debug, Clone)]
pub struct GroupSnapshot {
    pub group_id: String,
    pub metadata: GroupMetadata,
    pub managed: bool,
    pub admins: Vec<GroupAdmin>,
    /// newest first
    pub messages: Vec<Event>,
    pub profiles: HashMap<PubKey, Metadata>,
    /// relays that could not be used during the cycle
    pub relay_failures: Vec<RelayFailure>,
    pub generation: u64,
    pub fetched_at: Timestamp,
}

impl GroupSnapshot {
    pub fn is_admin(&self, pubkey: &PubKey) -> bool {
        self.admins.iter().any(|admin| &admin.pubkey == pubkey)
    }

    pub fn profile(&self, pubkey: &PubKey) -> Option<&Metadata> {
        self.profiles.get(pubkey)
    }
}

/// the event with the greatest `created_at`; on ties the one that came first wins
pub fn select_latest<'a, I>(events: I) -> Option<&'a Event>
where
    I: IntoIterator<Item = &'a Event>,
{
    events.into_iter().fold(None, |best: Option<&Event>, event| match best {
        Some(current) if event.created_at <= current.created_at => Some(current),
        _ => Some(event),
    })
}

/// admins listed in the `p` tags of a kind 39001 event, `["p", pubkey, role...]`
pub fn admins_from_event(event: &Event) -> Vec<GroupAdmin> {
    let mut admins: Vec<GroupAdmin> = Vec::new();
    for tag in event.tags.find_all("p") {
        let pubkey = match PubKey::from_hex(&tag[1]) {
            Ok(pk) => pk,
            Err(err) => {
                log::debug!("skipping admin entry '{}' in {}: {}", tag[1], event.id, err);
                continue;
            }
        };
        let roles = tag[2..].iter().filter(|r| !r.is_empty()).cloned();
        match admins.iter_mut().find(|a| a.pubkey == pubkey) {
            Some(existing) => existing.roles.extend(roles),
            None => admins.push(GroupAdmin {
                pubkey,
                roles: roles.collect(),
            }),
        }
    }
    admins
}

pub fn metadata_filters(group_id: &str) -> Vec<Filter> {
    vec![
        Filter::new().kind(Kind::GROUP_METADATA).tag("d", &[group_id]),
        Filter::new().kind(Kind::GROUP_METADATA).tag("h", &[group_id]),
    ]
}

/// relays publish the admin list under `d`, some older ones under `h`
pub fn admin_filters(group_id: &str) -> Vec<Filter> {
    vec![
        Filter::new().kind(Kind::GROUP_ADMINS).tag("h", &[group_id]),
        Filter::new().kind(Kind::GROUP_ADMINS).tag("d", &[group_id]),
    ]
}

pub fn messages_filter(group_id: &str, limit: usize) -> Filter {
    Filter::new()
        .kind(Kind::GROUP_CHAT_MESSAGE)
        .tag("h", &[group_id])
        .limit(limit)
}

pub fn profiles_filter(authors: impl IntoIterator<Item = PubKey>) -> Filter {
    Filter::new().kind(Kind::PROFILE_METADATA).authors(authors)
}

/// kind 9 chat message for a group
pub fn chat_message(group_id: &str, text: &str, pubkey: PubKey) -> EventTemplate {
    EventTemplate::new(
        Kind::GROUP_CHAT_MESSAGE,
        Tags::new().with("h", &[group_id]),
        text,
        Timestamp::now(),
        pubkey,
    )
}

/// kind 9021 request to be let into a group
pub fn join_request(group_id: &str, reason: &str, pubkey: PubKey) -> EventTemplate {
    EventTemplate::new(
        Kind::GROUP_JOIN_REQUEST,
        Tags::new().with("h", &[group_id]),
        reason,
        Timestamp::now(),
        pubkey,
    )
}

/// decides what a group's metadata is from whatever the relays gave us
#[derive(Debug, Clone)]
pub struct GroupMetadataResolver {
    group_id: String,
}

impl GroupMetadataResolver {
    pub fn new(group_id: impl Into<String>) -> Self {
        Self {
            group_id: group_id.into(),
        }
    }

    /// relay metadata when any kind 39000 event is present, otherwise a local stand-in
    pub fn resolve(&self, metadata_events: &[Event], messages: &[Event]) -> GroupMetadata {
        let relevant = metadata_events
            .iter()
            .filter(|e| e.kind == Kind::GROUP_METADATA)
            .filter(|e| {
                e.tags.get_d() == self.group_id || e.tags.get_h() == Some(self.group_id.as_str())
            });

        match select_latest(relevant) {
            Some(event) => self.from_relay(event),
            None => self.synthesize(messages),
        }
    }

    /// read a kind 39000 event: tags first, JSON content as a secondary source
    pub fn from_relay(&self, event: &Event) -> GroupMetadata {
        let content: serde_json::Map<String, serde_json::Value> =
            serde_json::from_str(&event.content).unwrap_or_default();
        let from_content = |key: &str| {
            content
                .get(key)
                .and_then(|v| v.as_str())
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        let from_tags = |key: &str| {
            event
                .tags
                .find_value(key)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        let public = if event.tags.has_flag("private") {
            Some(false)
        } else if event.tags.has_flag("public") {
            Some(true)
        } else {
            None
        };
        let open = if event.tags.has_flag("closed") {
            Some(false)
        } else if event.tags.has_flag("open") {
            Some(true)
        } else {
            None
        };

        GroupMetadata {
            id: self.group_id.clone(),
            name: from_tags("name")
                .or_else(|| from_content("name"))
                .unwrap_or_else(|| self.group_id.clone()),
            about: from_tags("about").or_else(|| from_content("about")),
            picture: from_tags("picture").or_else(|| from_content("picture")),
            public,
            open,
            created_at: Some(event.created_at),
            source: MetadataSource::Relay,
        }
    }

    /// unmanaged group: named after its id, born with its earliest known message
    pub fn synthesize(&self, messages: &[Event]) -> GroupMetadata {
        GroupMetadata {
            id: self.group_id.clone(),
            name: self.group_id.clone(),
            about: None,
            picture: None,
            public: None,
            open: None,
            created_at: messages.iter().map(|m| m.created_at).min(),
            source: MetadataSource::Synthesized,
        }
    }
}

/// an addressable group profile event and its decoded content
#[derive(Debug, Clone)]
pub struct GroupProfile {
    pub content: ProfileContent,
    pub event: Event,
}

/// look up the addressable event `kind:author:group_id` on the given relays
pub async fn fetch_group_profile_by_id(
    pool: &Pool,
    group_id: &str,
    author: PubKey,
    kind: Kind,
    relays: &[String],
    timeout: Duration,
) -> Option<GroupProfile> {
    let pointer = AddressPointer {
        public_key: author,
        kind,
        identifier: group_id.to_string(),
        relays: Vec::new(),
    };
    fetch_address(pool, &pointer, relays, timeout).await
}

/// like `fetch_group_profile_by_id`, with the address and relay hints taken from an naddr
pub async fn fetch_group_profile_by_naddr(
    pool: &Pool,
    naddr: &str,
    relays: &[String],
    timeout: Duration,
) -> Result<Option<GroupProfile>, Nip19Error> {
    let naddr = naddr.trim().trim_start_matches("nostr:");
    let pointer = match nip19::decode_public_or_address(naddr)? {
        Pointer::Address(pointer) => pointer,
        _ => {
            return Err(Nip19Error::UnsupportedIdentifierType(
                naddr.split('1').next().unwrap_or_default().to_string(),
            ))
        }
    };

    let mut urls = relays.to_vec();
    urls.extend(pointer.relays.iter().cloned());
    Ok(fetch_address(pool, &pointer, &urls, timeout).await)
}

async fn fetch_address(
    pool: &Pool,
    pointer: &AddressPointer,
    relays: &[String],
    timeout: Duration,
) -> Option<GroupProfile> {
    let outcome = pool.query(relays, pointer.as_filter(), timeout).await;
    let event = select_latest(outcome.events.iter().filter(|e| pointer.matches_event(e)))?;
    Some(GroupProfile {
        content: ProfileContent::from_event(event),
        event: event.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{signed_event, FixtureRelay};
    use crate::SecretKey;

    fn admins_event(sk: &SecretKey, created_at: u64, admin: &PubKey) -> Event {
        signed_event(
            sk,
            Kind::GROUP_ADMINS,
            Tags::new()
                .with("d", &["group1"])
                .with("p", &[admin.to_hex().as_str(), "ceo", "moderator"]),
            "",
            created_at,
        )
    }

    #[test]
    fn test_latest_admin_list_wins_regardless_of_order() {
        let relay = SecretKey::generate();
        let old_admin = SecretKey::generate().pubkey();
        let new_admin = SecretKey::generate().pubkey();
        let older = admins_event(&relay, 100, &old_admin);
        let newer = admins_event(&relay, 200, &new_admin);

        let forward = [older.clone(), newer.clone()];
        let backward = [newer.clone(), older.clone()];
        assert_eq!(select_latest(&forward).unwrap().id, newer.id);
        assert_eq!(select_latest(&backward).unwrap().id, newer.id);
        assert!(select_latest(&[] as &[Event]).is_none());
    }

    #[test]
    fn test_ties_keep_first_fetched() {
        let relay = SecretKey::generate();
        let first = admins_event(&relay, 100, &SecretKey::generate().pubkey());
        let second = admins_event(&relay, 100, &SecretKey::generate().pubkey());

        assert_eq!(select_latest(&[first.clone(), second.clone()]).unwrap().id, first.id);
        assert_eq!(select_latest(&[second.clone(), first]).unwrap().id, second.id);
    }

    #[test]
    fn test_admins_from_event() {
        let relay = SecretKey::generate();
        let alice = SecretKey::generate().pubkey();
        let bob = SecretKey::generate().pubkey();
        let event = signed_event(
            &relay,
            Kind::GROUP_ADMINS,
            Tags::new()
                .with("d", &["group1"])
                .with("p", &[alice.to_hex().as_str(), "ceo"])
                .with("p", &[bob.to_hex().as_str()])
                .with("p", &["not-a-pubkey", "admin"])
                .with("p", &[alice.to_hex().as_str(), "moderator"]),
            "",
            1,
        );

        assert_eq!(
            admins_from_event(&event),
            vec![
                GroupAdmin {
                    pubkey: alice,
                    roles: vec!["ceo".into(), "moderator".into()]
                },
                GroupAdmin {
                    pubkey: bob,
                    roles: vec![]
                },
            ]
        );
    }

    #[test]
    fn test_resolver_relay_metadata() {
        let relay = SecretKey::generate();
        let resolver = GroupMetadataResolver::new("group1");
        let event = signed_event(
            &relay,
            Kind::GROUP_METADATA,
            Tags::new()
                .with("d", &["group1"])
                .with("name", &["Pizza Lovers"])
                .with("picture", &["https://pizza.example/p.png"])
                .with("private", &[])
                .with("open", &[]),
            r#"{"about":"all things pizza","name":"ignored"}"#,
            50,
        );
        let other_group = signed_event(
            &relay,
            Kind::GROUP_METADATA,
            Tags::new().with("d", &["group2"]).with("name", &["Other"]),
            "",
            99,
        );

        let metadata = resolver.resolve(&[other_group, event], &[]);
        assert_eq!(metadata.source, MetadataSource::Relay);
        assert_eq!(metadata.name, "Pizza Lovers");
        assert_eq!(metadata.about.as_deref(), Some("all things pizza"));
        assert_eq!(metadata.picture.as_deref(), Some("https://pizza.example/p.png"));
        assert_eq!(metadata.public, Some(false));
        assert_eq!(metadata.open, Some(true));
        assert_eq!(metadata.created_at, Some(Timestamp(50)));
    }

    #[test]
    fn test_resolver_synthesizes_unmanaged() {
        let author = SecretKey::generate();
        let messages = vec![
            signed_event(&author, Kind::GROUP_CHAT_MESSAGE, Tags::new().with("h", &["g"]), "b", 300),
            signed_event(&author, Kind::GROUP_CHAT_MESSAGE, Tags::new().with("h", &["g"]), "a", 100),
        ];

        let metadata = GroupMetadataResolver::new("g").resolve(&[], &messages);
        assert_eq!(metadata.source, MetadataSource::Synthesized);
        assert_eq!(metadata.name, "g");
        assert_eq!(metadata.created_at, Some(Timestamp(100)));

        let empty = GroupMetadataResolver::new("g").resolve(&[], &[]);
        assert_eq!(empty.created_at, None);
    }

    #[test]
    fn test_builders() {
        let sk = SecretKey::generate();

        let message = chat_message("group1", "hello", sk.pubkey()).sign(&sk).unwrap();
        assert_eq!(message.kind, Kind::GROUP_CHAT_MESSAGE);
        assert_eq!(message.tags.get_h(), Some("group1"));
        assert_eq!(message.content, "hello");
        assert!(messages_filter("group1", 50).matches(&message));

        let join = join_request("group1", "let me in", sk.pubkey()).sign(&sk).unwrap();
        assert_eq!(join.kind, Kind::GROUP_JOIN_REQUEST);
        assert_eq!(join.tags.get_h(), Some("group1"));
        assert!(join.verify().is_ok());
    }

    #[tokio::test]
    async fn test_fetch_group_profile() {
        let owner = SecretKey::generate();
        let fixture = FixtureRelay::start().await;
        fixture.add_events(vec![
            signed_event(
                &owner,
                Kind::GROUP_METADATA,
                Tags::new().with("d", &["group1"]),
                r#"{"name":"old"}"#,
                10,
            ),
            signed_event(
                &owner,
                Kind::GROUP_METADATA,
                Tags::new().with("d", &["group1"]),
                r#"{"name":"Pizza Lovers"}"#,
                20,
            ),
            signed_event(
                &owner,
                Kind::GROUP_METADATA,
                Tags::new().with("d", &["group2"]),
                "raw text profile",
                30,
            ),
        ]);

        let pool = Pool::new();
        let timeout = Duration::from_secs(5);
        let relays = vec![fixture.url().to_string()];

        let found = fetch_group_profile_by_id(
            &pool,
            "group1",
            owner.pubkey(),
            Kind::GROUP_METADATA,
            &relays,
            timeout,
        )
        .await
        .unwrap();
        assert_eq!(
            found.content.metadata().and_then(|m| m.name.as_deref()),
            Some("Pizza Lovers")
        );

        let naddr = nip19::encode_naddr(&AddressPointer {
            public_key: owner.pubkey(),
            kind: Kind::GROUP_METADATA,
            identifier: "group2".into(),
            relays: relays.clone(),
        })
        .unwrap();
        let found = fetch_group_profile_by_naddr(&pool, &format!("nostr:{}", naddr), &[], timeout)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.content, ProfileContent::Raw("raw text profile".into()));

        let missing = fetch_group_profile_by_id(
            &pool,
            "group3",
            owner.pubkey(),
            Kind::GROUP_METADATA,
            &relays,
            timeout,
        )
        .await;
        assert!(missing.is_none());

        let npub = nip19::encode_npub(&owner.pubkey()).unwrap();
        assert_eq!(
            fetch_group_profile_by_naddr(&pool, &npub, &relays, timeout)
                .await
                .unwrap_err(),
            Nip19Error::UnsupportedIdentifierType("npub".into())
        );
    }
}
